/*!
 * BrutyFi command-line interface
 *
 * Offline WPA/WPA2 cracking against a captured handshake:
 * - crack: wordlist attack over a line range, interruptible with Ctrl-C
 * - info: show the handshake selected from a capture
 * - export: print it as handshake JSON or a hashcat 22000 line
 */

mod cli;

use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use brutyfi_engine::crypto::to_hex;
use brutyfi_engine::{
    count_lines, CrackJob, CrackResult, CrackSession, Cracker, CrackerConfig, HandshakeParser,
    HandshakeRecord,
};
use cli::{Args, ExportFormat, HandshakeArgs, Mode};

const EXIT_FOUND: u8 = 0;
const EXIT_NOT_FOUND: u8 = 1;
const EXIT_ERROR: u8 = 2;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", "✗ Error:".bold().red(), e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn run(args: Args) -> Result<u8> {
    match args.mode {
        Mode::Crack {
            target,
            wordlist,
            start,
            end,
            threads,
            timeout,
        } => {
            let config = CrackerConfig {
                threads: threads.unwrap_or_else(num_cpus::get),
                ..CrackerConfig::default()
            };
            let job = CrackJob::new(&target.handshake, &wordlist, start, end.unwrap_or(u64::MAX))?
                .with_options(target.parse_options());
            handle_crack(job, config, timeout)
        }
        Mode::Info { target } => {
            let record = load(&target)?;
            print_handshake(&record);
            Ok(EXIT_FOUND)
        }
        Mode::Export { target, format } => {
            let record = load(&target)?;
            match format {
                ExportFormat::Json => println!("{}", record.to_json()?),
                ExportFormat::Hashcat => println!("{}", record.to_hashcat_22000()),
            }
            Ok(EXIT_FOUND)
        }
    }
}

fn load(target: &HandshakeArgs) -> Result<HandshakeRecord> {
    HandshakeParser::new(target.parse_options())
        .parse(&target.handshake)
        .with_context(|| format!("Failed to load handshake from {}", target.handshake.display()))
}

fn print_handshake(record: &HandshakeRecord) {
    println!("{}", "Handshake".bold());
    println!("  SSID:    {}", record.ssid_lossy().cyan());
    println!("  AP:      {}", record.ap_mac());
    println!("  Client:  {}", record.client_mac());
    println!("  Variant: {:?}", record.variant());
    println!("  ANonce:  {}", to_hex(record.anonce()).dimmed());
    println!("  SNonce:  {}", to_hex(record.snonce()).dimmed());
    println!("  MIC:     {}", to_hex(record.mic()).dimmed());
}

/// Progress bar fed from the shared tested-candidate counter until `done` is set.
fn spawn_progress(total: u64, counter: Arc<AtomicU64>, done: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) {eta} {msg}")
    {
        pb.set_style(style.progress_chars("█▓▒░-"));
    }

    thread::spawn(move || {
        while !done.load(Ordering::Acquire) {
            pb.set_position(counter.load(Ordering::Relaxed));
            thread::sleep(Duration::from_millis(100));
        }
        pb.set_position(counter.load(Ordering::Relaxed));
        pb.finish_and_clear();
    })
}

fn handle_crack(job: CrackJob, config: CrackerConfig, timeout: Option<u64>) -> Result<u8> {
    println!("\n{}", format!("🔓 BrutyFi v{}", env!("CARGO_PKG_VERSION")).bold().cyan());

    let record = job.load_handshake()?;
    print_handshake(&record);

    let lines = count_lines(job.wordlist_path())?;
    let job = job.with_line_count(lines);
    let total = job.end().min(lines).saturating_sub(job.start());
    println!(
        "\n{} {} lines from {} with {} threads",
        "Testing".yellow(),
        total.to_string().cyan(),
        display_name(job.wordlist_path()),
        config.threads.to_string().cyan()
    );

    let counter = Arc::new(AtomicU64::new(0));
    let cracker = Arc::new(Cracker::from_session(
        CrackSession::new(config).with_progress(Arc::clone(&counter)),
    ));

    {
        let cracker = Arc::clone(&cracker);
        ctrlc::set_handler(move || cracker.request_interrupt())
            .context("Failed to install Ctrl-C handler")?;
    }
    if let Some(secs) = timeout {
        let cracker = Arc::clone(&cracker);
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            tracing::info!("Timeout of {}s reached", secs);
            cracker.request_interrupt();
        });
    }

    let done = Arc::new(AtomicBool::new(false));
    let progress = spawn_progress(total, Arc::clone(&counter), Arc::clone(&done));

    let started = Instant::now();
    let result = cracker.crack_with_record(&record, &job);
    done.store(true, Ordering::Release);
    let _ = progress.join();

    let elapsed = started.elapsed().as_secs_f64();
    let tested = counter.load(Ordering::Relaxed);
    let rate = if elapsed > 0.0 { tested as f64 / elapsed } else { 0.0 };

    println!();
    let code = match result {
        CrackResult::Found { password, line } => {
            println!("{} {}", "✓ Password found:".bold().green(), password.bold().cyan());
            println!("  Wordlist line: {}", line.to_string().cyan());
            EXIT_FOUND
        }
        CrackResult::NotFound { .. } => {
            println!("{}", "✗ Password not found in the provided range".red());
            EXIT_NOT_FOUND
        }
        CrackResult::Interrupted { .. } => {
            println!("{}", "⏹ Interrupted before the range was exhausted".yellow());
            EXIT_NOT_FOUND
        }
        CrackResult::Error(e) => return Err(e).context("Cracking failed"),
    };

    println!("\n{}", "Statistics:".bold());
    println!("  Attempts: {}", tested.to_string().cyan());
    println!("  Duration: {:.2}s", elapsed);
    println!("  Speed: {} passwords/second", format!("{:.0}", rate).green());

    Ok(code)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
