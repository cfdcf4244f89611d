/*!
 * Offline WPA/WPA2 handshake password recovery
 *
 * Given a captured 4-way EAPOL handshake and a wordlist, derive the PMK, PTK
 * and MIC for each candidate passphrase and compare against the MIC seen on
 * the wire. Work is split across workers by wordlist line range and can be
 * interrupted from any thread.
 */

// Core library modules
pub mod controller;
pub mod crypto;
pub mod eapol;
pub mod error;
pub mod handshake;
pub mod interrupt;
pub mod session;
pub mod wordlist;

#[cfg(test)]
mod fixtures;

// Re-exports
pub use controller::{ControllerState, CrackController, CrackJob, CrackResult};
pub use crypto::{
    calculate_kck, calculate_mic, calculate_pmk, calculate_ptk, derive_mic, KeyDerivation,
    KeyVariant, WpaPskEngine,
};
pub use eapol::MacAddr;
pub use error::{CrackError, ErrorKind, Result};
pub use handshake::{HandshakeParser, HandshakeRecord, ParseOptions};
pub use interrupt::InterruptFlag;
pub use session::{Cracker, CrackerConfig, CrackSession};
pub use wordlist::{count_lines, count_lines_until, Candidate, CandidateSource};
