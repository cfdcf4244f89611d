/*!
 * Single-worker cracking job
 *
 * A [`CrackController`] drives the derive/compare loop over one line range
 * of a wordlist and settles on exactly one [`CrackResult`].
 */

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::crypto::{KeyDerivation, WpaPskEngine};
use crate::error::{CrackError, Result};
use crate::handshake::{HandshakeParser, HandshakeRecord, ParseOptions};
use crate::interrupt::InterruptFlag;
use crate::wordlist::{Candidate, CandidateSource};

/// What to crack: a handshake, a wordlist and the line range `[start, end)` to try.
#[derive(Debug, Clone)]
pub struct CrackJob {
    handshake: PathBuf,
    wordlist: PathBuf,
    start: u64,
    end: u64,
    options: ParseOptions,
    line_count: Option<u64>,
}

impl CrackJob {
    /// Fails with `InvalidRange` when `start > end`. Use `u64::MAX` as `end`
    /// to run to the end of the wordlist.
    pub fn new(
        handshake: impl Into<PathBuf>,
        wordlist: impl Into<PathBuf>,
        start: u64,
        end: u64,
    ) -> Result<Self> {
        if start > end {
            return Err(CrackError::InvalidRange { start, end });
        }
        Ok(Self {
            handshake: handshake.into(),
            wordlist: wordlist.into(),
            start,
            end,
            options: ParseOptions::default(),
            line_count: None,
        })
    }

    /// Override SSID or restrict the access point when selecting the handshake.
    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    /// Record an already known wordlist line count so sessions skip counting.
    pub fn with_line_count(mut self, lines: u64) -> Self {
        self.line_count = Some(lines);
        self
    }

    pub fn line_count(&self) -> Option<u64> {
        self.line_count
    }

    pub fn handshake_path(&self) -> &Path {
        &self.handshake
    }

    pub fn wordlist_path(&self) -> &Path {
        &self.wordlist
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Load the handshake this job targets.
    pub fn load_handshake(&self) -> Result<HandshakeRecord> {
        HandshakeParser::new(self.options.clone()).parse(&self.handshake)
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone)]
pub enum CrackResult {
    /// Passphrase matched; `line` is its zero-based wordlist line
    Found { password: String, line: u64 },
    /// Range exhausted; `tested` candidates reached the engine
    NotFound { tested: u64 },
    /// Stopped by the interrupt flag
    Interrupted { tested: u64 },
    Error(CrackError),
}

impl CrackResult {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }

    /// Candidates evaluated, when the outcome records it.
    pub fn tested(&self) -> Option<u64> {
        match self {
            Self::NotFound { tested } | Self::Interrupted { tested } => Some(*tested),
            _ => None,
        }
    }

    fn state(&self) -> ControllerState {
        match self {
            Self::Found { .. } => ControllerState::Found,
            Self::NotFound { .. } => ControllerState::NotFound,
            Self::Interrupted { .. } => ControllerState::Interrupted,
            Self::Error(_) => ControllerState::Error,
        }
    }
}

/// Lifecycle of a controller. Everything after `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    Found,
    NotFound,
    Interrupted,
    Error,
}

impl ControllerState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Idle | Self::Running)
    }
}

/// Runs one job (or one sub-range of a job) to a terminal result.
///
/// A controller runs once; later calls hand back the recorded result.
pub struct CrackController<E = WpaPskEngine> {
    engine: E,
    interrupt: InterruptFlag,
    progress: Option<Arc<AtomicU64>>,
    poll_interval: u64,
    progress_interval: u64,
    state: ControllerState,
    outcome: Option<CrackResult>,
}

impl CrackController {
    pub fn new(interrupt: InterruptFlag) -> Self {
        Self::with_engine(WpaPskEngine, interrupt)
    }
}

impl<E: KeyDerivation> CrackController<E> {
    pub fn with_engine(engine: E, interrupt: InterruptFlag) -> Self {
        Self {
            engine,
            interrupt,
            progress: None,
            poll_interval: 1,
            progress_interval: 1000,
            state: ControllerState::Idle,
            outcome: None,
        }
    }

    /// Shared counter bumped once per tested candidate.
    pub fn with_progress(mut self, counter: Arc<AtomicU64>) -> Self {
        self.progress = Some(counter);
        self
    }

    /// Check the interrupt flag every `poll` candidates and log every
    /// `progress` candidates. Zero is treated as one.
    pub fn with_intervals(mut self, poll: u64, progress: u64) -> Self {
        self.poll_interval = poll.max(1);
        self.progress_interval = progress.max(1);
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Parse the job's handshake, then crack its whole range.
    pub fn run(&mut self, job: &CrackJob) -> CrackResult {
        if let Some(done) = &self.outcome {
            return done.clone();
        }
        match job.load_handshake() {
            Ok(record) => self.run_range(&record, job.wordlist_path(), job.start(), job.end()),
            Err(e) => self.finish(CrackResult::Error(e)),
        }
    }

    /// Crack `[start, end)` of `wordlist` against an already parsed handshake.
    pub fn run_range(
        &mut self,
        record: &HandshakeRecord,
        wordlist: &Path,
        start: u64,
        end: u64,
    ) -> CrackResult {
        if let Some(done) = &self.outcome {
            return done.clone();
        }
        let source = match CandidateSource::open_until(wordlist, start, end, &self.interrupt) {
            Ok(source) => source,
            Err(e) => return self.finish(CrackResult::Error(e)),
        };
        if self.interrupt.is_raised() {
            return self.finish(CrackResult::Interrupted { tested: 0 });
        }

        self.state = ControllerState::Running;
        tracing::debug!(start, end, "Worker started");

        let result = self.drive(record, source);
        self.finish(result)
    }

    fn drive(
        &self,
        record: &HandshakeRecord,
        source: impl Iterator<Item = Result<Candidate>>,
    ) -> CrackResult {
        let mut tested = 0u64;
        let mut since_poll = self.poll_interval;

        for item in source {
            if since_poll >= self.poll_interval {
                since_poll = 0;
                if self.interrupt.is_raised() {
                    return CrackResult::Interrupted { tested };
                }
            }
            since_poll += 1;

            let candidate = match item {
                Ok(candidate) => candidate,
                Err(e) => return CrackResult::Error(e),
            };

            tested += 1;
            if let Some(counter) = &self.progress {
                counter.fetch_add(1, Ordering::Relaxed);
            }

            if self.engine.matches(&candidate.passphrase, record) {
                // Siblings share this flag and stop on their next poll
                self.interrupt.raise();
                return CrackResult::Found {
                    password: String::from_utf8_lossy(&candidate.passphrase).into_owned(),
                    line: candidate.line,
                };
            }

            if tested % self.progress_interval == 0 {
                tracing::debug!(tested, line = candidate.line, "Worker progress");
            }
        }

        CrackResult::NotFound { tested }
    }

    fn finish(&mut self, result: CrackResult) -> CrackResult {
        self.state = result.state();
        match &result {
            CrackResult::Found { line, .. } => tracing::debug!(line, "Worker found the passphrase"),
            CrackResult::Error(e) => tracing::debug!("Worker failed: {}", e),
            other => tracing::debug!(tested = ?other.tested(), "Worker finished without a match"),
        }
        self.outcome = Some(result.clone());
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fixtures::{self, Scenario};
    use parking_lot::Mutex;

    /// Engine that records every passphrase it sees and matches `target`.
    #[derive(Default)]
    pub(crate) struct CountingEngine {
        pub target: Option<Vec<u8>>,
        pub seen: Mutex<Vec<Vec<u8>>>,
        /// Raise this flag after this many evaluations
        pub raise_after: Option<(u64, InterruptFlag)>,
    }

    impl CountingEngine {
        pub fn matching(target: &str) -> Self {
            Self {
                target: Some(target.as_bytes().to_vec()),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> u64 {
            self.seen.lock().len() as u64
        }
    }

    impl KeyDerivation for CountingEngine {
        fn matches(&self, passphrase: &[u8], _record: &HandshakeRecord) -> bool {
            let calls = {
                let mut seen = self.seen.lock();
                seen.push(passphrase.to_vec());
                seen.len() as u64
            };
            if let Some((after, flag)) = &self.raise_after {
                if calls >= *after {
                    flag.raise();
                }
            }
            self.target.as_deref() == Some(passphrase)
        }
    }

    fn numbered(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("candidate{:04}", i)).collect()
    }

    fn lines(words: &[String]) -> Vec<&str> {
        words.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_job_rejects_inverted_range() {
        let err = CrackJob::new("hs.pcap", "words.txt", 10, 9).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRange);
        assert!(CrackJob::new("hs.pcap", "words.txt", 9, 9).is_ok());
    }

    #[test]
    fn test_empty_range_tests_nothing() {
        let record = Scenario::new(b"password123").record();
        let words = fixtures::wordlist(&["password123"]);
        let engine = CountingEngine::matching("password123");
        let mut controller = CrackController::with_engine(&engine, InterruptFlag::new());
        assert!(!controller.state().is_terminal());

        let result = controller.run_range(&record, words.path(), 0, 0);
        assert!(matches!(result, CrackResult::NotFound { tested: 0 }));
        assert_eq!(engine.calls(), 0);
        assert_eq!(controller.state(), ControllerState::NotFound);
        assert!(controller.state().is_terminal());
    }

    #[test]
    fn test_length_filter_never_reaches_engine() {
        let record = Scenario::new(b"password123").record();
        let seven = "s".repeat(7);
        let sixty_four = "l".repeat(64);
        let words = fixtures::wordlist(&[
            seven.as_str(),
            "validpass1",
            sixty_four.as_str(),
            "validpass2",
            "short",
        ]);
        let engine = CountingEngine::default();
        let mut controller = CrackController::with_engine(&engine, InterruptFlag::new());

        let result = controller.run_range(&record, words.path(), 0, u64::MAX);
        assert!(matches!(result, CrackResult::NotFound { tested: 2 }));
        let seen = engine.seen.lock();
        assert_eq!(*seen, vec![b"validpass1".to_vec(), b"validpass2".to_vec()]);
    }

    #[test]
    fn test_not_found_counts_range_only() {
        let record = Scenario::new(b"password123").record();
        let words = numbered(10);
        let file = fixtures::wordlist(&lines(&words));
        let engine = CountingEngine::default();
        let mut controller = CrackController::with_engine(&engine, InterruptFlag::new());

        let result = controller.run_range(&record, file.path(), 3, 7);
        assert!(matches!(result, CrackResult::NotFound { tested: 4 }));
        assert_eq!(engine.seen.lock()[0], b"candidate0003".to_vec());
    }

    #[test]
    fn test_found_reports_password_and_line() {
        let scenario = Scenario::new(b"correct horse");
        let capture = fixtures::capture_file(&scenario.radiotap_frames());
        let words = fixtures::wordlist(&["decoy-one", "decoy-two", "bad", "correct horse", "after-it"]);
        let flag = InterruptFlag::new();
        let job = CrackJob::new(capture.path(), words.path(), 0, u64::MAX).unwrap();

        let mut controller = CrackController::new(flag.clone());
        match controller.run(&job) {
            CrackResult::Found { password, line } => {
                assert_eq!(password, "correct horse");
                assert_eq!(line, 3);
            }
            other => panic!("expected Found, got {:?}", other),
        }
        assert!(flag.is_raised());
        assert_eq!(controller.state(), ControllerState::Found);
    }

    #[test]
    fn test_run_twice_returns_recorded_result() {
        let record = Scenario::new(b"password123").record();
        let file = fixtures::wordlist(&lines(&numbered(5)));
        let engine = CountingEngine::matching("candidate0002");
        let mut controller = CrackController::with_engine(&engine, InterruptFlag::new());

        let first = controller.run_range(&record, file.path(), 0, 5);
        let second = controller.run_range(&record, file.path(), 0, 5);
        assert!(first.is_found() && second.is_found());
        assert_eq!(engine.calls(), 3);
    }

    #[test]
    fn test_raised_flag_stops_before_any_work() {
        let record = Scenario::new(b"password123").record();
        let file = fixtures::wordlist(&lines(&numbered(5)));
        let flag = InterruptFlag::new();
        flag.raise();
        let engine = CountingEngine::default();
        let mut controller = CrackController::with_engine(&engine, flag);

        let result = controller.run_range(&record, file.path(), 0, 5);
        assert!(matches!(result, CrackResult::Interrupted { tested: 0 }));
        assert_eq!(controller.state(), ControllerState::Interrupted);
    }

    #[test]
    fn test_raised_flag_cuts_long_seek() {
        let record = Scenario::new(b"password123").record();
        let file = fixtures::wordlist(&lines(&numbered(9_000)));
        let flag = InterruptFlag::new();
        flag.raise();
        let engine = CountingEngine::default();
        let mut controller = CrackController::with_engine(&engine, flag);

        let result = controller.run_range(&record, file.path(), 8_500, 9_000);
        assert!(matches!(result, CrackResult::Interrupted { tested: 0 }));
        assert_eq!(engine.calls(), 0);
    }

    #[test]
    fn test_interrupt_latency_bounded_by_poll_interval() {
        let record = Scenario::new(b"password123").record();
        let file = fixtures::wordlist(&lines(&numbered(100)));

        for poll in [1u64, 4, 16] {
            let flag = InterruptFlag::new();
            let engine = CountingEngine {
                raise_after: Some((10, flag.clone())),
                ..Default::default()
            };
            let mut controller =
                CrackController::with_engine(&engine, flag).with_intervals(poll, 1000);

            match controller.run_range(&record, file.path(), 0, 100) {
                CrackResult::Interrupted { tested } => {
                    assert!(tested >= 10 && tested < 10 + poll, "poll {} tested {}", poll, tested);
                }
                other => panic!("expected Interrupted, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_progress_counter_tracks_tested() {
        let record = Scenario::new(b"password123").record();
        let file = fixtures::wordlist(&lines(&numbered(12)));
        let counter = Arc::new(AtomicU64::new(0));
        let engine = CountingEngine::default();
        let mut controller = CrackController::with_engine(&engine, InterruptFlag::new())
            .with_progress(Arc::clone(&counter));

        controller.run_range(&record, file.path(), 2, 12);
        assert_eq!(counter.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_missing_inputs_are_errors() {
        let scenario = Scenario::new(b"password123");
        let words = fixtures::wordlist(&["password123"]);
        let job = CrackJob::new("/nonexistent/capture.pcap", words.path(), 0, 1).unwrap();
        let mut controller = CrackController::new(InterruptFlag::new());
        match controller.run(&job) {
            CrackResult::Error(e) => assert_eq!(e.kind(), ErrorKind::NotFound),
            other => panic!("expected Error, got {:?}", other),
        }
        assert_eq!(controller.state(), ControllerState::Error);

        let mut controller = CrackController::new(InterruptFlag::new());
        let result =
            controller.run_range(&scenario.record(), Path::new("/nonexistent/words.txt"), 0, 1);
        assert!(matches!(result, CrackResult::Error(ref e) if e.kind() == ErrorKind::NotFound));
    }

    #[test]
    fn test_unparseable_capture_is_error() {
        let capture = fixtures::temp_file(b"definitely not a capture", ".pcap");
        let words = fixtures::wordlist(&["password123"]);
        let job = CrackJob::new(capture.path(), words.path(), 0, 1).unwrap();
        let mut controller = CrackController::new(InterruptFlag::new());
        match controller.run(&job) {
            CrackResult::Error(e) => assert_eq!(e.kind(), ErrorKind::Parse),
            other => panic!("expected Error, got {:?}", other),
        }
    }
}
