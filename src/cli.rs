use brutyfi_engine::{MacAddr, ParseOptions};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "brutyfi")]
#[command(version)]
#[command(about = "Offline WPA/WPA2 handshake password recovery - Educational use only", long_about = None)]
pub struct Args {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub mode: Mode,
}

/// Handshake source plus selection overrides
#[derive(clap::Args)]
pub struct HandshakeArgs {
    /// Path to handshake file (.cap, .pcap, .pcapng or .json)
    #[arg(value_name = "HANDSHAKE")]
    pub handshake: PathBuf,

    /// Network SSID (needed when the capture has no beacon for the AP)
    #[arg(long)]
    pub ssid: Option<String>,

    /// Only use a handshake from this access point (aa:bb:cc:dd:ee:ff)
    #[arg(long)]
    pub bssid: Option<MacAddr>,
}

impl HandshakeArgs {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            ssid: self.ssid.as_ref().map(|s| s.as_bytes().to_vec()),
            bssid: self.bssid,
        }
    }
}

#[derive(Subcommand)]
pub enum Mode {
    /// Crack a captured handshake with a wordlist
    ///
    /// Tests every line of the wordlist in [--start, --end) against the
    /// handshake. Lines shorter than 8 or longer than 63 bytes are skipped.
    ///
    /// Example: brutyfi crack capture.pcap rockyou.txt --threads 8
    Crack {
        #[command(flatten)]
        target: HandshakeArgs,

        /// Path to wordlist file
        #[arg(value_name = "WORDLIST")]
        wordlist: PathBuf,

        /// First wordlist line to test (zero-based)
        #[arg(long, default_value_t = 0)]
        start: u64,

        /// Line to stop before (default: end of file)
        #[arg(long)]
        end: Option<u64>,

        /// Number of threads to use (default: CPU count)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Stop after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Show the handshake that would be cracked
    Info {
        #[command(flatten)]
        target: HandshakeArgs,
    },

    /// Print the selected handshake in another format
    ///
    /// Example: brutyfi export capture.pcap --format hashcat > hash.22000
    Export {
        #[command(flatten)]
        target: HandshakeArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExportFormat {
    /// Handshake JSON, accepted back as HANDSHAKE input
    Json,
    /// Hashcat mode 22000 line
    Hashcat,
}
