/*!
 * WPA/WPA2 key derivation and MIC verification
 *
 * Implements the per-candidate work of an offline dictionary attack:
 * - PMK (Pairwise Master Key) derivation using PBKDF2-HMAC-SHA1
 * - PTK (Pairwise Transient Key) derivation using the 802.11i PRF
 * - MIC (Message Integrity Code) recomputation over the captured EAPOL frame
 *
 * References:
 * - IEEE 802.11i-2004 standard, section 8.5 and annex H
 * - RFC 2898 (PBKDF2)
 */

use hmac::{Hmac, Mac};
use md5::Md5;
use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use serde::{Deserialize, Serialize};

use crate::handshake::HandshakeRecord;

type HmacSha1 = Hmac<Sha1>;
type HmacMd5 = Hmac<Md5>;

/// Label for the pairwise PRF expansion
const PRF_LABEL: &[u8] = b"Pairwise key expansion";

/// PBKDF2 iteration count fixed by 802.11i for PSK
pub const PMK_ITERATIONS: u32 = 4096;

/// Length bounds of a WPA passphrase, in bytes
pub const MIN_PASSPHRASE_LEN: usize = 8;
pub const MAX_PASSPHRASE_LEN: usize = 63;

/// SHA1 output size, one PRF block
const SHA1_LEN: usize = 20;

/// Key derivation variant of a handshake.
///
/// Selected by the key descriptor version bits of the EAPOL key information
/// field. Both variants derive the PMK and PTK the same way; they differ only
/// in the keyed hash used for the MIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyVariant {
    /// Descriptor version 1 (WPA/TKIP): HMAC-MD5 MIC
    Md5,
    /// Descriptor version 2 (WPA2/CCMP): HMAC-SHA1-128 MIC
    Sha1,
}

impl KeyVariant {
    /// Map a key descriptor version to a variant, if this engine implements it.
    pub fn from_descriptor_version(version: u8) -> Option<Self> {
        match version {
            1 => Some(Self::Md5),
            2 => Some(Self::Sha1),
            _ => None,
        }
    }

    /// Key descriptor version carried on the wire.
    pub fn descriptor_version(self) -> u8 {
        match self {
            Self::Md5 => 1,
            Self::Sha1 => 2,
        }
    }
}

/// Calculate PMK (Pairwise Master Key) from passphrase and SSID
///
/// PMK = PBKDF2-HMAC-SHA1(passphrase, SSID, 4096 iterations, 256 bits)
///
/// This is the dominant cost of every candidate: 8192 SHA1 compressions.
#[inline]
pub fn calculate_pmk(passphrase: &[u8], ssid: &[u8]) -> [u8; 32] {
    let mut pmk = [0u8; 32];
    pbkdf2_hmac::<Sha1>(passphrase, ssid, PMK_ITERATIONS, &mut pmk);
    pmk
}

/// Build the PRF input: min(AA, SPA) || max(AA, SPA) || min(ANonce, SNonce) || max(ANonce, SNonce)
fn pairwise_seed(
    ap_mac: &[u8; 6],
    client_mac: &[u8; 6],
    anonce: &[u8; 32],
    snonce: &[u8; 32],
) -> [u8; 76] {
    let mut data = [0u8; 76];

    let (mac_lo, mac_hi) = if ap_mac < client_mac {
        (ap_mac, client_mac)
    } else {
        (client_mac, ap_mac)
    };
    data[0..6].copy_from_slice(mac_lo);
    data[6..12].copy_from_slice(mac_hi);

    let (nonce_lo, nonce_hi) = if anonce < snonce {
        (anonce, snonce)
    } else {
        (snonce, anonce)
    };
    data[12..44].copy_from_slice(nonce_lo);
    data[44..76].copy_from_slice(nonce_hi);

    data
}

/// 802.11i PRF: HMAC-SHA1(key, label || 0x00 || data || counter), counter from 0,
/// concatenated until `out` is filled.
fn prf_sha1(key: &[u8], label: &[u8], data: &[u8], out: &mut [u8]) {
    for (counter, chunk) in out.chunks_mut(SHA1_LEN).enumerate() {
        let mut mac = HmacSha1::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(label);
        mac.update(&[0x00]);
        mac.update(data);
        mac.update(&[counter as u8]);
        let block = mac.finalize().into_bytes();
        chunk.copy_from_slice(&block[..chunk.len()]);
    }
}

/// Calculate the full 512-bit PTK (KCK || KEK || TK || MIC keys)
pub fn calculate_ptk(
    pmk: &[u8; 32],
    ap_mac: &[u8; 6],
    client_mac: &[u8; 6],
    anonce: &[u8; 32],
    snonce: &[u8; 32],
) -> [u8; 64] {
    let seed = pairwise_seed(ap_mac, client_mac, anonce, snonce);
    let mut ptk = [0u8; 64];
    prf_sha1(pmk, PRF_LABEL, &seed, &mut ptk);
    ptk
}

/// Calculate only the KCK (first 16 bytes of the PTK).
///
/// Needs a single PRF block instead of four.
#[inline]
pub fn calculate_kck(
    pmk: &[u8; 32],
    ap_mac: &[u8; 6],
    client_mac: &[u8; 6],
    anonce: &[u8; 32],
    snonce: &[u8; 32],
) -> [u8; 16] {
    let seed = pairwise_seed(ap_mac, client_mac, anonce, snonce);
    let mut kck = [0u8; 16];
    prf_sha1(pmk, PRF_LABEL, &seed, &mut kck);
    kck
}

/// Calculate MIC (Message Integrity Code) for an EAPOL frame
///
/// MIC = HMAC-MD5(KCK, EAPOL_frame)          (KeyVariant::Md5)
/// MIC = HMAC-SHA1(KCK, EAPOL_frame)[0..16]  (KeyVariant::Sha1)
///
/// The frame must have its MIC field zeroed.
#[inline]
pub fn calculate_mic(kck: &[u8; 16], eapol_frame: &[u8], variant: KeyVariant) -> [u8; 16] {
    let mut result = [0u8; 16];

    match variant {
        KeyVariant::Md5 => {
            let mut mac = HmacMd5::new_from_slice(kck).expect("HMAC can take key of any size");
            mac.update(eapol_frame);
            result.copy_from_slice(&mac.finalize().into_bytes());
        }
        KeyVariant::Sha1 => {
            let mut mac = HmacSha1::new_from_slice(kck).expect("HMAC can take key of any size");
            mac.update(eapol_frame);
            let hash = mac.finalize().into_bytes();
            result.copy_from_slice(&hash[..16]);
        }
    }
    result
}

/// Derive the MIC a candidate passphrase would have produced for this handshake.
pub fn derive_mic(passphrase: &[u8], record: &HandshakeRecord) -> [u8; 16] {
    // Step 1: PMK
    let pmk = calculate_pmk(passphrase, record.ssid());

    // Step 2: KCK from the PTK expansion
    let kck = calculate_kck(
        &pmk,
        record.ap_mac().octets(),
        record.client_mac().octets(),
        record.anonce(),
        record.snonce(),
    );

    // Step 3: MIC over the zeroed frame
    calculate_mic(&kck, record.eapol_frame(), record.variant())
}

/// Per-candidate verification seam.
///
/// The controller only ever talks to this trait, so tests can swap in an
/// instrumented engine.
pub trait KeyDerivation: Sync {
    /// Whether `passphrase` reproduces the handshake's observed MIC.
    fn matches(&self, passphrase: &[u8], record: &HandshakeRecord) -> bool;
}

/// PSK engine: PBKDF2-HMAC-SHA1 → PRF-SHA1 → HMAC MIC.
#[derive(Debug, Clone, Copy, Default)]
pub struct WpaPskEngine;

impl KeyDerivation for WpaPskEngine {
    #[inline]
    fn matches(&self, passphrase: &[u8], record: &HandshakeRecord) -> bool {
        derive_mic(passphrase, record) == *record.mic()
    }
}

impl<T: KeyDerivation + ?Sized> KeyDerivation for &T {
    fn matches(&self, passphrase: &[u8], record: &HandshakeRecord) -> bool {
        (**self).matches(passphrase, record)
    }
}

/// Whether a candidate is within WPA passphrase length bounds.
#[inline]
pub fn is_valid_passphrase_len(len: usize) -> bool {
    (MIN_PASSPHRASE_LEN..=MAX_PASSPHRASE_LEN).contains(&len)
}

/// Lowercase hex rendering used by logs and exports.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Inverse of [`to_hex`]; `None` on odd length or a non-hex digit.
pub fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}
