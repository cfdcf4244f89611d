/*!
 * Multi-worker cracking sessions
 *
 * A session parses the handshake once, splits the job's line range into
 * contiguous sub-ranges and runs one [`CrackController`] per sub-range on a
 * dedicated rayon pool. Workers share the parsed record read-only and
 * coordinate only through the session's [`InterruptFlag`].
 */

use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::controller::{CrackController, CrackJob, CrackResult};
use crate::crypto::{KeyDerivation, WpaPskEngine};
use crate::handshake::HandshakeRecord;
use crate::interrupt::InterruptFlag;
use crate::wordlist::count_lines_until;

/// Tuning for a cracking session.
#[derive(Debug, Clone)]
pub struct CrackerConfig {
    /// Worker threads
    pub threads: usize,
    /// Candidates between interrupt checks
    pub poll_interval: u64,
    /// Candidates between per-worker progress log lines
    pub progress_interval: u64,
}

impl Default for CrackerConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
            poll_interval: 1,
            progress_interval: 1000,
        }
    }
}

/// Split `[start, end)` into at most `workers` contiguous, near-equal ranges.
pub fn partition(start: u64, end: u64, workers: usize) -> Vec<(u64, u64)> {
    let len = end.saturating_sub(start);
    if len == 0 {
        return Vec::new();
    }
    let workers = (workers.max(1) as u64).min(len);
    let base = len / workers;
    let extra = len % workers;

    let mut ranges = Vec::with_capacity(workers as usize);
    let mut cursor = start;
    for i in 0..workers {
        let size = base + u64::from(i < extra);
        ranges.push((cursor, cursor + size));
        cursor += size;
    }
    ranges
}

/// Fold per-worker results: Found beats Error beats Interrupted beats NotFound.
///
/// `tested` counts are summed. Among several finds the lowest line wins so
/// the outcome does not depend on scheduling.
pub fn merge_results(results: impl IntoIterator<Item = CrackResult>) -> CrackResult {
    let mut found: Option<(String, u64)> = None;
    let mut error = None;
    let mut interrupted = false;
    let mut tested = 0u64;

    for result in results {
        match result {
            CrackResult::Found { password, line } => {
                if found.as_ref().map_or(true, |(_, best)| line < *best) {
                    found = Some((password, line));
                }
            }
            CrackResult::Error(e) => {
                error.get_or_insert(e);
            }
            CrackResult::Interrupted { tested: n } => {
                interrupted = true;
                tested += n;
            }
            CrackResult::NotFound { tested: n } => tested += n,
        }
    }

    if let Some((password, line)) = found {
        CrackResult::Found { password, line }
    } else if let Some(e) = error {
        CrackResult::Error(e)
    } else if interrupted {
        CrackResult::Interrupted { tested }
    } else {
        CrackResult::NotFound { tested }
    }
}

/// Runs jobs across a pool of workers.
pub struct CrackSession<E = WpaPskEngine> {
    config: CrackerConfig,
    engine: E,
    progress: Option<Arc<AtomicU64>>,
}

impl CrackSession {
    pub fn new(config: CrackerConfig) -> Self {
        Self::with_engine(config, WpaPskEngine)
    }
}

impl<E: KeyDerivation> CrackSession<E> {
    pub fn with_engine(config: CrackerConfig, engine: E) -> Self {
        Self {
            config,
            engine,
            progress: None,
        }
    }

    /// Shared counter incremented once per tested candidate across all workers.
    pub fn with_progress(mut self, counter: Arc<AtomicU64>) -> Self {
        self.progress = Some(counter);
        self
    }

    pub fn config(&self) -> &CrackerConfig {
        &self.config
    }

    /// Run `job` to completion. Raising `interrupt` stops every worker.
    pub fn run(&self, job: &CrackJob, interrupt: &InterruptFlag) -> CrackResult {
        match job.load_handshake() {
            Ok(record) => self.run_with_record(&record, job, interrupt),
            Err(e) => CrackResult::Error(e),
        }
    }

    /// Run `job` against a handshake the caller already parsed. The job's
    /// handshake path is not read.
    pub fn run_with_record(
        &self,
        record: &HandshakeRecord,
        job: &CrackJob,
        interrupt: &InterruptFlag,
    ) -> CrackResult {
        let lines = match job.line_count() {
            Some(lines) => lines,
            None => match count_lines_until(job.wordlist_path(), interrupt) {
                Ok(Some(lines)) => lines,
                Ok(None) => return CrackResult::Interrupted { tested: 0 },
                Err(e) => return CrackResult::Error(e),
            },
        };
        let end = job.end().min(lines);
        let start = job.start().min(end);
        let ranges = partition(start, end, self.config.threads);

        tracing::info!(
            ssid = %record.ssid_lossy(),
            start,
            end,
            workers = ranges.len(),
            "Cracking session started"
        );
        let started = Instant::now();

        let wordlist = job.wordlist_path();
        let work = |&(from, to): &(u64, u64)| {
            let result = self.worker(interrupt).run_range(record, wordlist, from, to);
            if matches!(result, CrackResult::Error(_)) {
                interrupt.raise();
            }
            result
        };

        let results: Vec<CrackResult> = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.max(1))
            .thread_name(|i| format!("crack-worker-{}", i))
            .build()
        {
            Ok(pool) => pool.install(|| ranges.par_iter().map(work).collect()),
            Err(e) => {
                tracing::warn!("Worker pool unavailable ({}); cracking on the calling thread", e);
                ranges.iter().map(work).collect()
            }
        };

        let merged = merge_results(results);
        let elapsed = started.elapsed().as_secs_f64();
        match &merged {
            CrackResult::Found { line, .. } => {
                tracing::info!(line, elapsed, "Passphrase found")
            }
            CrackResult::Error(e) => tracing::warn!("Cracking session failed: {}", e),
            other => {
                tracing::info!(tested = ?other.tested(), elapsed, "Cracking session finished")
            }
        }
        merged
    }

    fn worker(&self, interrupt: &InterruptFlag) -> CrackController<&E> {
        let controller = CrackController::with_engine(&self.engine, interrupt.clone())
            .with_intervals(self.config.poll_interval, self.config.progress_interval);
        match &self.progress {
            Some(counter) => controller.with_progress(Arc::clone(counter)),
            None => controller,
        }
    }
}

/// Caller-facing cracker: one blocking `start_cracking` at a time, interruptible
/// from any thread.
pub struct Cracker<E = WpaPskEngine> {
    session: CrackSession<E>,
    current: Mutex<Option<InterruptFlag>>,
}

impl Cracker {
    pub fn new(config: CrackerConfig) -> Self {
        Self::from_session(CrackSession::new(config))
    }
}

impl<E: KeyDerivation> Cracker<E> {
    pub fn from_session(session: CrackSession<E>) -> Self {
        Self {
            session,
            current: Mutex::new(None),
        }
    }

    /// Crack lines `[start_line, end_line)` of `wordlist` against the
    /// handshake in `handshake`. Blocks until a terminal result.
    pub fn start_cracking(
        &self,
        handshake: &Path,
        wordlist: &Path,
        start_line: u64,
        end_line: u64,
    ) -> CrackResult {
        match CrackJob::new(handshake, wordlist, start_line, end_line) {
            Ok(job) => self.crack(&job),
            Err(e) => CrackResult::Error(e),
        }
    }

    /// Like [`start_cracking`](Self::start_cracking) for a prepared job.
    pub fn crack(&self, job: &CrackJob) -> CrackResult {
        self.with_fresh_flag(|flag| self.session.run(job, flag))
    }

    /// Crack a prepared job against a handshake the caller already parsed.
    pub fn crack_with_record(&self, record: &HandshakeRecord, job: &CrackJob) -> CrackResult {
        self.with_fresh_flag(|flag| self.session.run_with_record(record, job, flag))
    }

    fn with_fresh_flag(&self, run: impl FnOnce(&InterruptFlag) -> CrackResult) -> CrackResult {
        let flag = InterruptFlag::new();
        *self.current.lock() = Some(flag.clone());
        let result = run(&flag);
        self.current.lock().take();
        result
    }

    /// Stop the running session, if any. Safe to call repeatedly.
    pub fn request_interrupt(&self) {
        if let Some(flag) = self.current.lock().as_ref() {
            tracing::debug!("Interrupt requested");
            flag.raise();
        }
    }
}
