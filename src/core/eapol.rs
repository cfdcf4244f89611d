/*!
 * Link-layer and EAPOL-Key frame decoding
 *
 * Turns one captured packet into either an EAPOL-Key message or an SSID
 * announcement (beacon or solicited response). Every header length is read from
 * the frame itself: radiotap, PPI and Prism headers carry their own length,
 * the 802.11 header grows with the fourth address, QoS and HT control fields,
 * and the EAPOL body length comes from the EAPOL header.
 */

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// LLC/SNAP header announcing an EAPOL payload (EtherType 0x888E)
const LLC_SNAP_EAPOL: [u8; 8] = [0xAA, 0xAA, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8E];

const ETHERTYPE_EAPOL: u16 = 0x888E;

/// EAPOL packet type for key frames
const EAPOL_TYPE_KEY: u8 = 3;

/// Key descriptor types: 802.11 RSN and legacy WPA
const DESCRIPTOR_RSN: u8 = 2;
const DESCRIPTOR_WPA: u8 = 254;

/// EAPOL header (4) + fixed key descriptor fields (95)
pub const EAPOL_KEY_MIN_LEN: usize = 99;

/// Offsets inside an EAPOL frame (from the EAPOL version byte)
pub const MIC_OFFSET: usize = 81;
pub const MIC_LEN: usize = 16;
const NONCE_OFFSET: usize = 17;
const KEY_DATA_LEN_OFFSET: usize = 97;

/// IEEE 802 MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub fn octets(&self) -> &[u8; 6] {
        &self.0
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.get(..6)?.try_into().ok().map(MacAddr)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = String;

    /// Accepts `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(|c| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(format!("invalid MAC address: {}", s));
        }
        let mut mac = [0u8; 6];
        for (slot, part) in mac.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(format!("invalid MAC address: {}", s));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| format!("invalid MAC address: {}", s))?;
        }
        Ok(MacAddr(mac))
    }
}

/// Link-layer header type of a capture interface (pcap DLT values)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    Ieee80211,
    Prism,
    Radiotap,
    Ppi,
}

impl LinkType {
    pub fn from_dlt(dlt: i32) -> Option<Self> {
        match dlt {
            1 => Some(Self::Ethernet),
            105 => Some(Self::Ieee80211),
            119 => Some(Self::Prism),
            127 => Some(Self::Radiotap),
            192 => Some(Self::Ppi),
            _ => None,
        }
    }
}

/// WPA Key Information flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfo(u16);

impl KeyInfo {
    pub fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Key descriptor version (1 = HMAC-MD5, 2 = HMAC-SHA1, 3 = AES-CMAC)
    pub fn descriptor_version(&self) -> u8 {
        (self.0 & 0x0007) as u8
    }

    pub fn is_pairwise(&self) -> bool {
        self.0 & 0x0008 != 0
    }

    pub fn install(&self) -> bool {
        self.0 & 0x0040 != 0
    }

    /// Set by the AP in messages 1 and 3
    pub fn ack(&self) -> bool {
        self.0 & 0x0080 != 0
    }

    pub fn mic(&self) -> bool {
        self.0 & 0x0100 != 0
    }

    pub fn secure(&self) -> bool {
        self.0 & 0x0200 != 0
    }
}

/// Position of a key frame in the 4-way handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeMessage {
    M1,
    M2,
    M3,
    M4,
}

/// Decoded EAPOL-Key frame with its addressing
#[derive(Debug, Clone)]
pub struct EapolKey {
    pub ap_mac: MacAddr,
    pub client_mac: MacAddr,
    pub key_info: KeyInfo,
    pub replay_counter: u64,
    pub nonce: [u8; 32],
    pub mic: [u8; 16],
    /// EAPOL frame truncated to its declared length
    pub frame: Vec<u8>,
}

impl EapolKey {
    /// Classify the frame, or `None` for group-key and malformed flag combinations.
    pub fn message(&self) -> Option<HandshakeMessage> {
        let info = self.key_info;
        if !info.is_pairwise() {
            return None;
        }
        match (info.ack(), info.mic()) {
            (true, false) => Some(HandshakeMessage::M1),
            (true, true) => Some(HandshakeMessage::M3),
            (false, true) => {
                // WPA1 leaves Secure clear in M4, but M4 never carries a nonce
                if info.secure() || is_zero(&self.nonce) {
                    Some(HandshakeMessage::M4)
                } else {
                    Some(HandshakeMessage::M2)
                }
            }
            (false, false) => None,
        }
    }
}

/// A frame relevant to handshake extraction
#[derive(Debug, Clone)]
pub enum Frame {
    Eapol(EapolKey),
    Ssid { bssid: MacAddr, ssid: Vec<u8> },
}

pub(crate) fn is_zero(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}

fn le_u16(data: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_le_bytes(data.get(at..at + 2)?.try_into().ok()?))
}

fn le_u32(data: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_le_bytes(data.get(at..at + 4)?.try_into().ok()?))
}

fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes(data.get(at..at + 2)?.try_into().ok()?))
}

/// Decode one captured packet.
pub fn decode(link: LinkType, packet: &[u8]) -> Option<Frame> {
    match link {
        LinkType::Ethernet => decode_ethernet(packet),
        LinkType::Ieee80211 => decode_80211(packet),
        LinkType::Radiotap => {
            let len = le_u16(packet, 2)? as usize;
            decode_80211(packet.get(len..)?)
        }
        LinkType::Ppi => {
            let len = le_u16(packet, 2)? as usize;
            // PPI carries the DLT of the encapsulated frame
            if le_u32(packet, 4)? != 105 {
                return None;
            }
            decode_80211(packet.get(len..)?)
        }
        LinkType::Prism => {
            let len = le_u32(packet, 4)? as usize;
            decode_80211(packet.get(len..)?)
        }
    }
}

fn decode_ethernet(packet: &[u8]) -> Option<Frame> {
    if be_u16(packet, 12)? != ETHERTYPE_EAPOL {
        return None;
    }
    let dst = MacAddr::from_slice(packet)?;
    let src = MacAddr::from_slice(packet.get(6..)?)?;

    // No DS bits on Ethernet: the AP is whoever sends frames with Ack set
    let provisional = parse_eapol_key(packet.get(14..)?, src, dst)?;
    if provisional.key_info.ack() {
        Some(Frame::Eapol(provisional))
    } else {
        Some(Frame::Eapol(EapolKey {
            ap_mac: dst,
            client_mac: src,
            ..provisional
        }))
    }
}

fn decode_80211(frame: &[u8]) -> Option<Frame> {
    let fc = le_u16(frame, 0)?;
    let frame_type = (fc >> 2) & 0x3;
    let subtype = (fc >> 4) & 0xF;

    match frame_type {
        0 => decode_management(frame, subtype),
        2 => decode_data(frame, fc, subtype),
        _ => None,
    }
}

fn decode_management(frame: &[u8], subtype: u16) -> Option<Frame> {
    // Beacon (8) or solicited response (5)
    if subtype != 8 && subtype != 5 {
        return None;
    }
    let bssid = MacAddr::from_slice(frame.get(16..)?)?;

    // Tagged parameters follow the 24-byte header and 12 bytes of fixed fields
    let mut pos = 36;
    while pos + 2 <= frame.len() {
        let id = frame[pos];
        let len = frame[pos + 1] as usize;
        let value = frame.get(pos + 2..pos + 2 + len)?;
        if id == 0 {
            if len > 32 {
                return None;
            }
            return Some(Frame::Ssid {
                bssid,
                ssid: value.to_vec(),
            });
        }
        pos += 2 + len;
    }
    None
}

fn decode_data(frame: &[u8], fc: u16, subtype: u16) -> Option<Frame> {
    let to_ds = fc & 0x0100 != 0;
    let from_ds = fc & 0x0200 != 0;
    let protected = fc & 0x4000 != 0;
    let order = fc & 0x8000 != 0;

    // Null-function subtypes carry no body; protected bodies are opaque
    if subtype & 0x4 != 0 || protected {
        return None;
    }

    let addr1 = MacAddr::from_slice(frame.get(4..)?)?;
    let addr2 = MacAddr::from_slice(frame.get(10..)?)?;
    let addr3 = MacAddr::from_slice(frame.get(16..)?)?;

    let (ap_mac, client_mac) = match (to_ds, from_ds) {
        (false, true) => (addr2, addr1), // AP → STA (M1, M3)
        (true, false) => (addr1, addr2), // STA → AP (M2, M4)
        (false, false) => {
            // Addr3 is the BSSID
            if addr2 == addr3 {
                (addr2, addr1)
            } else {
                (addr3, addr2)
            }
        }
        (true, true) => return None, // WDS
    };

    let is_qos = subtype & 0x8 != 0;
    let mut header_len = 24;
    if to_ds && from_ds {
        header_len += 6;
    }
    if is_qos {
        header_len += 2;
        if order {
            header_len += 4;
        }
    }

    let llc = frame.get(header_len..)?;
    if llc.get(..8)? != LLC_SNAP_EAPOL {
        return None;
    }

    parse_eapol_key(&llc[8..], ap_mac, client_mac).map(Frame::Eapol)
}

/// Parse an EAPOL-Key frame starting at the EAPOL version byte.
pub fn parse_eapol_key(data: &[u8], ap_mac: MacAddr, client_mac: MacAddr) -> Option<EapolKey> {
    if *data.get(1)? != EAPOL_TYPE_KEY {
        return None;
    }

    // Truncate trailing padding / FCS using the declared body length
    let total = 4 + be_u16(data, 2)? as usize;
    if total < EAPOL_KEY_MIN_LEN {
        return None;
    }
    let frame = data.get(..total)?;

    let descriptor = frame[4];
    if descriptor != DESCRIPTOR_RSN && descriptor != DESCRIPTOR_WPA {
        return None;
    }

    let key_data_len = be_u16(frame, KEY_DATA_LEN_OFFSET)? as usize;
    if EAPOL_KEY_MIN_LEN + key_data_len > total {
        return None;
    }

    let key_info = KeyInfo::new(be_u16(frame, 5)?);
    let replay_counter = u64::from_be_bytes(frame[9..17].try_into().ok()?);
    let nonce: [u8; 32] = frame[NONCE_OFFSET..NONCE_OFFSET + 32].try_into().ok()?;
    let mic: [u8; 16] = frame[MIC_OFFSET..MIC_OFFSET + MIC_LEN].try_into().ok()?;

    Some(EapolKey {
        ap_mac,
        client_mac,
        key_info,
        replay_counter,
        nonce,
        mic,
        frame: frame.to_vec(),
    })
}
