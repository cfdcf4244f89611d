//! Synthetic captures and wordlists for tests.

use std::io::Write;

use tempfile::NamedTempFile;

use crate::crypto::{calculate_kck, calculate_mic, calculate_pmk, KeyVariant};
use crate::eapol::{MacAddr, MIC_OFFSET};
use crate::handshake::HandshakeRecord;

pub const SSID: &[u8] = b"TestNetwork";
pub const AP: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
pub const STA: MacAddr = MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// RSN IE: CCMP pairwise and group, PSK AKM
const RSN_IE: [u8; 22] = [
    0x30, 0x14, 0x01, 0x00, 0x00, 0x0f, 0xac, 0x04, 0x01, 0x00, 0x00, 0x0f, 0xac, 0x04, 0x01,
    0x00, 0x00, 0x0f, 0xac, 0x02, 0x00, 0x00,
];

/// Build an EAPOL-Key frame (version byte through key data).
pub fn eapol_key(key_info: u16, replay: u64, nonce: &[u8; 32], mic: &[u8; 16], key_data: &[u8]) -> Vec<u8> {
    let mut f = vec![0u8; 99 + key_data.len()];
    f[0] = 0x01;
    f[1] = 0x03;
    f[2..4].copy_from_slice(&((95 + key_data.len()) as u16).to_be_bytes());
    f[4] = if key_info & 0x7 == 1 { 254 } else { 2 };
    f[5..7].copy_from_slice(&key_info.to_be_bytes());
    f[7..9].copy_from_slice(&16u16.to_be_bytes());
    f[9..17].copy_from_slice(&replay.to_be_bytes());
    f[17..49].copy_from_slice(nonce);
    f[81..97].copy_from_slice(mic);
    f[97..99].copy_from_slice(&(key_data.len() as u16).to_be_bytes());
    f[99..].copy_from_slice(key_data);
    f
}

/// Raw 802.11 data frame carrying `body` behind an LLC/SNAP EAPOL header.
pub fn dot11_data(ap: MacAddr, sta: MacAddr, to_ap: bool, qos: bool, body: &[u8]) -> Vec<u8> {
    let mut f = Vec::new();
    f.push(if qos { 0x88 } else { 0x08 });
    f.push(if to_ap { 0x01 } else { 0x02 });
    f.extend_from_slice(&[0x3a, 0x01]);
    if to_ap {
        f.extend_from_slice(&ap.0);
        f.extend_from_slice(&sta.0);
    } else {
        f.extend_from_slice(&sta.0);
        f.extend_from_slice(&ap.0);
    }
    f.extend_from_slice(&ap.0);
    f.extend_from_slice(&[0x10, 0x00]);
    if qos {
        f.extend_from_slice(&[0x06, 0x00]);
    }
    f.extend_from_slice(&[0xAA, 0xAA, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8E]);
    f.extend_from_slice(body);
    f
}

/// Beacon (or solicited response) announcing `ssid` for `bssid`.
pub fn beacon(bssid: MacAddr, ssid: &[u8], solicited: bool) -> Vec<u8> {
    let mut f = vec![if solicited { 0x50 } else { 0x80 }, 0x00, 0x00, 0x00];
    f.extend_from_slice(&[0xff; 6]);
    f.extend_from_slice(&bssid.0);
    f.extend_from_slice(&bssid.0);
    f.extend_from_slice(&[0x00, 0x00]);
    f.extend_from_slice(&[0u8; 8]); // timestamp
    f.extend_from_slice(&[0x64, 0x00, 0x31, 0x04]); // interval, capabilities
    f.push(0x00);
    f.push(ssid.len() as u8);
    f.extend_from_slice(ssid);
    f.extend_from_slice(&[0x01, 0x02, 0x82, 0x84]);
    f
}

/// Prefix a minimal 8-byte radiotap header.
pub fn radiotap(frame: &[u8]) -> Vec<u8> {
    let mut p = vec![0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00];
    p.extend_from_slice(frame);
    p
}

pub fn ethernet(dst: MacAddr, src: MacAddr, eapol: &[u8]) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&dst.0);
    p.extend_from_slice(&src.0);
    p.extend_from_slice(&[0x88, 0x8E]);
    p.extend_from_slice(eapol);
    p
}

/// Legacy pcap container (microsecond, little-endian).
pub fn pcap_legacy(dlt: u32, packets: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&dlt.to_le_bytes());
    for (i, packet) in packets.iter().enumerate() {
        out.extend_from_slice(&(i as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(packet.len() as u32).to_le_bytes());
        out.extend_from_slice(&(packet.len() as u32).to_le_bytes());
        out.extend_from_slice(packet);
    }
    out
}

/// pcapng container with one interface.
pub fn pcapng(dlt: u16, packets: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();

    // Section Header Block
    out.extend_from_slice(&0x0A0D_0D0Au32.to_le_bytes());
    out.extend_from_slice(&28u32.to_le_bytes());
    out.extend_from_slice(&0x1A2B_3C4Du32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(-1i64).to_le_bytes());
    out.extend_from_slice(&28u32.to_le_bytes());

    // Interface Description Block
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&20u32.to_le_bytes());
    out.extend_from_slice(&dlt.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&20u32.to_le_bytes());

    // Enhanced Packet Blocks
    for packet in packets {
        let padded = (packet.len() + 3) & !3;
        let block_len = (32 + padded) as u32;
        out.extend_from_slice(&6u32.to_le_bytes());
        out.extend_from_slice(&block_len.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(packet.len() as u32).to_le_bytes());
        out.extend_from_slice(&(packet.len() as u32).to_le_bytes());
        out.extend_from_slice(packet);
        out.resize(out.len() + (padded - packet.len()), 0);
        out.extend_from_slice(&block_len.to_le_bytes());
    }
    out
}

/// One AP/station pair completing a 4-way handshake with a known passphrase.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub ssid: Vec<u8>,
    pub ap: MacAddr,
    pub sta: MacAddr,
    pub anonce: [u8; 32],
    pub snonce: [u8; 32],
    pub passphrase: Vec<u8>,
    pub version: u8,
}

impl Scenario {
    pub fn new(passphrase: &[u8]) -> Self {
        let mut anonce = [0u8; 32];
        let mut snonce = [0u8; 32];
        for i in 0..32 {
            anonce[i] = 0x10u8.wrapping_add(i as u8 * 7);
            snonce[i] = 0xC0u8.wrapping_sub(i as u8 * 3);
        }
        Self {
            ssid: SSID.to_vec(),
            ap: AP,
            sta: STA,
            anonce,
            snonce,
            passphrase: passphrase.to_vec(),
            version: 2,
        }
    }

    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn with_ap(mut self, ap: MacAddr, ssid: &[u8]) -> Self {
        self.ap = ap;
        self.ssid = ssid.to_vec();
        self
    }

    /// M2 with its MIC computed from the passphrase.
    pub fn m2(&self) -> Vec<u8> {
        let v = self.version as u16;
        let mut frame = eapol_key(0x0108 | v, 1, &self.snonce, &[0u8; 16], &RSN_IE);
        let pmk = calculate_pmk(&self.passphrase, &self.ssid);
        let kck = calculate_kck(&pmk, &self.ap.0, &self.sta.0, &self.anonce, &self.snonce);
        let variant = KeyVariant::from_descriptor_version(self.version).unwrap_or(KeyVariant::Sha1);
        let mic = calculate_mic(&kck, &frame, variant);
        frame[MIC_OFFSET..MIC_OFFSET + 16].copy_from_slice(&mic);
        frame
    }

    pub fn mic(&self) -> [u8; 16] {
        self.m2()[MIC_OFFSET..MIC_OFFSET + 16].try_into().unwrap()
    }

    /// M1..M4 as raw EAPOL frames.
    pub fn eapol_frames(&self) -> Vec<Vec<u8>> {
        let v = self.version as u16;
        let (m3_info, m4_info) = if self.version == 1 {
            (0x01c8 | v, 0x0108 | v)
        } else {
            (0x13c8 | v, 0x0308 | v)
        };
        vec![
            eapol_key(0x0088 | v, 1, &self.anonce, &[0u8; 16], &[]),
            self.m2(),
            eapol_key(m3_info, 2, &self.anonce, &[0x33; 16], &RSN_IE),
            eapol_key(m4_info, 2, &[0u8; 32], &[0x44; 16], &[]),
        ]
    }

    /// Beacon followed by the four handshake frames, as raw 802.11.
    pub fn dot11_frames(&self) -> Vec<Vec<u8>> {
        let mut frames = vec![beacon(self.ap, &self.ssid, false)];
        for (i, eapol) in self.eapol_frames().iter().enumerate() {
            let to_ap = i % 2 == 1;
            frames.push(dot11_data(self.ap, self.sta, to_ap, true, eapol));
        }
        frames
    }

    pub fn radiotap_frames(&self) -> Vec<Vec<u8>> {
        self.dot11_frames().iter().map(|f| radiotap(f)).collect()
    }

    pub fn record(&self) -> HandshakeRecord {
        HandshakeRecord::new(
            self.ssid.clone(),
            self.ap,
            self.sta,
            self.anonce,
            self.snonce,
            self.mic(),
            self.m2(),
            KeyVariant::from_descriptor_version(self.version).unwrap(),
        )
        .unwrap()
    }
}

pub fn temp_file(contents: &[u8], suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    file
}

pub fn capture_file(packets: &[Vec<u8>]) -> NamedTempFile {
    temp_file(&pcap_legacy(127, packets), ".pcap")
}

pub fn wordlist(lines: &[&str]) -> NamedTempFile {
    let mut body = lines.join("\n");
    body.push('\n');
    temp_file(body.as_bytes(), ".txt")
}
