/*!
 * WPA/WPA2 handshake extraction
 *
 * Reads a capture artifact (pcap, pcapng, or a handshake JSON file) and
 * produces the single [`HandshakeRecord`] a cracking job works against.
 *
 * Selection policy: the first complete 4-way exchange (M1 → M2 → M3 → M4)
 * observed for one AP/station pair wins. The MIC and frame used for
 * recomputation come from message 2. The SSID is taken from beacons or
 * solicited responses of the selected AP unless the caller supplies one.
 */

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use pcap_parser::{Block, PcapBlockOwned, PcapError};
use serde::{Deserialize, Serialize};

use crate::crypto::{from_hex, to_hex, KeyVariant};
use crate::eapol::{
    self, is_zero, EapolKey, Frame, HandshakeMessage, LinkType, MacAddr, EAPOL_KEY_MIN_LEN,
    MIC_LEN, MIC_OFFSET,
};
use crate::error::{CrackError, Result};

/// Reader buffer; must hold the largest block in the capture
const READER_CAPACITY: usize = 1 << 18;

/// Maximum SSID length in bytes
pub const MAX_SSID_LEN: usize = 32;

/// Everything key derivation needs from one 4-way handshake.
///
/// Only constructible through validation, so a record never carries
/// placeholder nonces, an empty MIC, or an unzeroed MIC field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRecord {
    ssid: Vec<u8>,
    ap_mac: MacAddr,
    client_mac: MacAddr,
    anonce: [u8; 32],
    snonce: [u8; 32],
    mic: [u8; 16],
    eapol_frame: Vec<u8>,
    variant: KeyVariant,
}

impl HandshakeRecord {
    /// Validate and assemble a record. The MIC field of `eapol_frame` is zeroed here.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ssid: Vec<u8>,
        ap_mac: MacAddr,
        client_mac: MacAddr,
        anonce: [u8; 32],
        snonce: [u8; 32],
        mic: [u8; 16],
        mut eapol_frame: Vec<u8>,
        variant: KeyVariant,
    ) -> Result<Self> {
        if ssid.len() > MAX_SSID_LEN {
            return Err(CrackError::parse(format!(
                "SSID is {} bytes, maximum is {}",
                ssid.len(),
                MAX_SSID_LEN
            )));
        }
        if is_zero(&anonce) || is_zero(&snonce) {
            return Err(CrackError::parse("handshake nonce is missing (all zero)"));
        }
        if is_zero(&mic) {
            return Err(CrackError::parse("handshake MIC is missing (all zero)"));
        }
        if eapol_frame.len() < EAPOL_KEY_MIN_LEN || eapol_frame[1] != 3 {
            return Err(CrackError::parse(format!(
                "EAPOL frame is not a key frame ({} bytes)",
                eapol_frame.len()
            )));
        }
        eapol_frame[MIC_OFFSET..MIC_OFFSET + MIC_LEN].fill(0);

        Ok(Self {
            ssid,
            ap_mac,
            client_mac,
            anonce,
            snonce,
            mic,
            eapol_frame,
            variant,
        })
    }

    /// Network SSID (PBKDF2 salt)
    pub fn ssid(&self) -> &[u8] {
        &self.ssid
    }

    pub fn ap_mac(&self) -> &MacAddr {
        &self.ap_mac
    }

    pub fn client_mac(&self) -> &MacAddr {
        &self.client_mac
    }

    pub fn anonce(&self) -> &[u8; 32] {
        &self.anonce
    }

    pub fn snonce(&self) -> &[u8; 32] {
        &self.snonce
    }

    /// MIC observed on the wire
    pub fn mic(&self) -> &[u8; 16] {
        &self.mic
    }

    /// EAPOL frame with the MIC field zeroed
    pub fn eapol_frame(&self) -> &[u8] {
        &self.eapol_frame
    }

    pub fn variant(&self) -> KeyVariant {
        self.variant
    }

    /// SSID for display; invalid UTF-8 is replaced.
    pub fn ssid_lossy(&self) -> String {
        String::from_utf8_lossy(&self.ssid).into_owned()
    }

    /// Serialize in the handshake JSON layout.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&HandshakeJson::from(self))
    }

    /// Render a hashcat mode 22000 line (`WPA*02*`, M1+M2 challenge).
    pub fn to_hashcat_22000(&self) -> String {
        format!(
            "WPA*02*{}*{}*{}*{}*{}*{}*00",
            to_hex(&self.mic),
            to_hex(self.ap_mac.octets()),
            to_hex(self.client_mac.octets()),
            to_hex(&self.ssid),
            to_hex(&self.anonce),
            to_hex(&self.eapol_frame),
        )
    }
}

/// On-disk JSON handshake layout
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HandshakeJson {
    /// Display form; lossy when the SSID is not UTF-8
    ssid: String,
    /// Exact SSID bytes, preferred over `ssid` on load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ssid_hex: Option<String>,
    ap_mac: [u8; 6],
    client_mac: [u8; 6],
    anonce: [u8; 32],
    snonce: [u8; 32],
    mic: Vec<u8>,
    eapol_frame: Vec<u8>,
    /// Key version (1 = HMAC-MD5, 2 = HMAC-SHA1)
    key_version: u8,
}

impl From<&HandshakeRecord> for HandshakeJson {
    fn from(record: &HandshakeRecord) -> Self {
        Self {
            ssid: record.ssid_lossy(),
            ssid_hex: Some(to_hex(&record.ssid)),
            ap_mac: record.ap_mac.0,
            client_mac: record.client_mac.0,
            anonce: record.anonce,
            snonce: record.snonce,
            mic: record.mic.to_vec(),
            eapol_frame: record.eapol_frame.clone(),
            key_version: record.variant.descriptor_version(),
        }
    }
}

impl TryFrom<HandshakeJson> for HandshakeRecord {
    type Error = CrackError;

    fn try_from(json: HandshakeJson) -> Result<Self> {
        let variant = KeyVariant::from_descriptor_version(json.key_version)
            .ok_or(CrackError::UnsupportedVariant(json.key_version))?;
        let mic: [u8; 16] = json.mic.as_slice().try_into().map_err(|_| {
            CrackError::parse(format!("MIC must be 16 bytes, got {}", json.mic.len()))
        })?;
        let ssid = match json.ssid_hex {
            Some(hex) => from_hex(&hex)
                .ok_or_else(|| CrackError::parse(format!("ssid_hex is not valid hex: {}", hex)))?,
            None => json.ssid.into_bytes(),
        };
        HandshakeRecord::new(
            ssid,
            MacAddr(json.ap_mac),
            MacAddr(json.client_mac),
            json.anonce,
            json.snonce,
            mic,
            json.eapol_frame,
            variant,
        )
    }
}

/// Caller overrides for handshake selection.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// SSID to use instead of the beaconed one
    pub ssid: Option<Vec<u8>>,
    /// Only consider exchanges with this access point
    pub bssid: Option<MacAddr>,
}

/// Extracts one [`HandshakeRecord`] from a capture artifact.
#[derive(Debug, Clone, Default)]
pub struct HandshakeParser {
    options: ParseOptions,
}

impl HandshakeParser {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    /// Parse `path`: `.json` files use the handshake JSON layout, anything
    /// else is read as a pcap/pcapng capture.
    pub fn parse(&self, path: &Path) -> Result<HandshakeRecord> {
        let bytes = fs::read(path).map_err(|e| CrackError::not_found(path, e))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let record = if extension == "json" {
            self.parse_json(&bytes)?
        } else {
            self.parse_capture(&bytes)?
        };

        tracing::info!(
            ssid = %record.ssid_lossy(),
            ap = %record.ap_mac,
            client = %record.client_mac,
            variant = ?record.variant,
            "Handshake selected from {}",
            path.display()
        );
        Ok(record)
    }

    fn parse_json(&self, bytes: &[u8]) -> Result<HandshakeRecord> {
        let json: HandshakeJson = serde_json::from_slice(bytes)
            .map_err(|e| CrackError::parse(format!("invalid handshake JSON: {}", e)))?;
        let record = HandshakeRecord::try_from(json)?;
        match &self.options.ssid {
            Some(ssid) if ssid.as_slice() != record.ssid() => HandshakeRecord::new(
                ssid.clone(),
                record.ap_mac,
                record.client_mac,
                record.anonce,
                record.snonce,
                record.mic,
                record.eapol_frame,
                record.variant,
            ),
            _ => Ok(record),
        }
    }

    /// Parse an in-memory pcap or pcapng capture.
    pub fn parse_capture(&self, bytes: &[u8]) -> Result<HandshakeRecord> {
        let mut scan = CaptureScan::new(self.options.bssid);
        read_frames(bytes, |frame| scan.observe(frame))?;

        let exchange = scan.complete.ok_or_else(|| {
            CrackError::parse(format!(
                "no complete 4-way handshake in capture ({} EAPOL-Key frames seen)",
                scan.eapol_frames
            ))
        })?;

        let variant = KeyVariant::from_descriptor_version(exchange.version)
            .ok_or(CrackError::UnsupportedVariant(exchange.version))?;

        let ssid = self.resolve_ssid(&exchange.ap_mac, &scan.ssids)?;

        HandshakeRecord::new(
            ssid,
            exchange.ap_mac,
            exchange.client_mac,
            exchange.anonce,
            exchange.snonce,
            exchange.mic,
            exchange.frame,
            variant,
        )
    }

    fn resolve_ssid(&self, ap: &MacAddr, seen: &HashMap<MacAddr, Vec<u8>>) -> Result<Vec<u8>> {
        let detected = seen.get(ap);
        match (&self.options.ssid, detected) {
            (Some(given), Some(detected)) => {
                if given != detected {
                    tracing::warn!(
                        "Provided SSID '{}' does not match '{}' broadcast by {}; using the provided one",
                        String::from_utf8_lossy(given),
                        String::from_utf8_lossy(detected),
                        ap
                    );
                }
                Ok(given.clone())
            }
            (Some(given), None) => Ok(given.clone()),
            (None, Some(detected)) => Ok(detected.clone()),
            (None, None) => Err(CrackError::parse(format!(
                "SSID not found for access point {}; supply it explicitly",
                ap
            ))),
        }
    }
}

/// Walk every packet of a pcap/pcapng buffer, decoding frames of interest.
fn read_frames(bytes: &[u8], mut on_frame: impl FnMut(Frame)) -> Result<()> {
    let mut reader = pcap_parser::create_reader(READER_CAPACITY, bytes)
        .map_err(|e| CrackError::parse(format!("not a pcap/pcapng capture: {:?}", e)))?;

    let mut legacy_link: Option<LinkType> = None;
    let mut interfaces: Vec<Option<LinkType>> = Vec::new();
    let mut stalled = false;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                stalled = false;
                let decoded = match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        legacy_link = LinkType::from_dlt(header.network.0);
                        if legacy_link.is_none() {
                            tracing::warn!("Unsupported link type {}", header.network.0);
                        }
                        None
                    }
                    PcapBlockOwned::Legacy(packet) => {
                        legacy_link.and_then(|link| eapol::decode(link, packet.data))
                    }
                    PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                        interfaces.clear();
                        None
                    }
                    PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                        interfaces.push(LinkType::from_dlt(idb.linktype.0));
                        None
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                        let len = (epb.caplen as usize).min(epb.data.len());
                        interfaces
                            .get(epb.if_id as usize)
                            .copied()
                            .flatten()
                            .and_then(|link| eapol::decode(link, &epb.data[..len]))
                    }
                    PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                        let len = (spb.origlen as usize).min(spb.data.len());
                        interfaces
                            .first()
                            .copied()
                            .flatten()
                            .and_then(|link| eapol::decode(link, &spb.data[..len]))
                    }
                    PcapBlockOwned::NG(_) => None,
                };
                if let Some(frame) = decoded {
                    on_frame(frame);
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::UnexpectedEof) => {
                tracing::debug!("Capture ends with a truncated block");
                break;
            }
            Err(PcapError::Incomplete(_)) => {
                if stalled {
                    // Truncated trailing block
                    tracing::debug!("Capture ends with a truncated block");
                    break;
                }
                stalled = true;
                reader
                    .refill()
                    .map_err(|e| CrackError::parse(format!("error reading capture: {:?}", e)))?;
            }
            Err(e) => return Err(CrackError::parse(format!("error reading capture: {:?}", e))),
        }
    }
    Ok(())
}

/// Fields of a fully observed exchange
#[derive(Debug, Clone)]
struct CompleteExchange {
    ap_mac: MacAddr,
    client_mac: MacAddr,
    anonce: [u8; 32],
    snonce: [u8; 32],
    mic: [u8; 16],
    frame: Vec<u8>,
    version: u8,
}

#[derive(Debug, Clone)]
struct Message2 {
    snonce: [u8; 32],
    mic: [u8; 16],
    frame: Vec<u8>,
    version: u8,
}

/// Progress of one AP/station exchange
#[derive(Debug, Clone, Default)]
struct Exchange {
    m1: Option<(u64, [u8; 32])>,
    m2: Option<Message2>,
    m3_replay: Option<u64>,
}

/// Accumulates state while the capture is read.
struct CaptureScan {
    bssid_filter: Option<MacAddr>,
    exchanges: HashMap<(MacAddr, MacAddr), Exchange>,
    ssids: HashMap<MacAddr, Vec<u8>>,
    complete: Option<CompleteExchange>,
    eapol_frames: usize,
}

impl CaptureScan {
    fn new(bssid_filter: Option<MacAddr>) -> Self {
        Self {
            bssid_filter,
            exchanges: HashMap::new(),
            ssids: HashMap::new(),
            complete: None,
            eapol_frames: 0,
        }
    }

    fn observe(&mut self, frame: Frame) {
        match frame {
            Frame::Ssid { bssid, ssid } => {
                // Hidden networks beacon an empty or NUL-filled SSID
                if !is_zero(&ssid) {
                    self.ssids.entry(bssid).or_insert(ssid);
                }
            }
            Frame::Eapol(key) => {
                self.eapol_frames += 1;
                if self.complete.is_some() {
                    return;
                }
                if self.bssid_filter.is_some_and(|b| b != key.ap_mac) {
                    return;
                }
                self.advance(key);
            }
        }
    }

    fn advance(&mut self, key: EapolKey) {
        let Some(message) = key.message() else {
            return;
        };
        let pair = (key.ap_mac, key.client_mac);

        match message {
            HandshakeMessage::M1 => {
                if is_zero(&key.nonce) {
                    return;
                }
                // A fresh M1 restarts the exchange for this pair
                self.exchanges.insert(
                    pair,
                    Exchange {
                        m1: Some((key.replay_counter, key.nonce)),
                        ..Exchange::default()
                    },
                );
            }
            HandshakeMessage::M2 => {
                let Some(exchange) = self.exchanges.get_mut(&pair) else {
                    return;
                };
                let matches_m1 = exchange
                    .m1
                    .is_some_and(|(replay, _)| replay == key.replay_counter);
                if matches_m1 && exchange.m2.is_none() && !is_zero(&key.mic) {
                    exchange.m2 = Some(Message2 {
                        snonce: key.nonce,
                        mic: key.mic,
                        frame: key.frame,
                        version: key.key_info.descriptor_version(),
                    });
                }
            }
            HandshakeMessage::M3 => {
                let Some(exchange) = self.exchanges.get_mut(&pair) else {
                    return;
                };
                let same_anonce = exchange.m1.is_some_and(|(_, anonce)| anonce == key.nonce);
                if exchange.m2.is_some() && same_anonce {
                    exchange.m3_replay = Some(key.replay_counter);
                }
            }
            HandshakeMessage::M4 => {
                let Some(exchange) = self.exchanges.get(&pair) else {
                    return;
                };
                if exchange.m3_replay != Some(key.replay_counter) {
                    return;
                }
                if let (Some((_, anonce)), Some(m2)) = (exchange.m1, &exchange.m2) {
                    tracing::debug!(ap = %pair.0, client = %pair.1, "Complete 4-way handshake");
                    self.complete = Some(CompleteExchange {
                        ap_mac: pair.0,
                        client_mac: pair.1,
                        anonce,
                        snonce: m2.snonce,
                        mic: m2.mic,
                        frame: m2.frame.clone(),
                        version: m2.version,
                    });
                }
            }
        }
    }
}
