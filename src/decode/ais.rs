//! AIVDM/AIVDO payload decoding: 6-bit ASCII armoring unpack, multi-sentence
//! fragment reassembly, and the ITU-R M.1371 message catalogue (types
//! 1-27). Every field is extracted as the raw integer the wire carries;
//! scaling to physical units (1/10000 minute -> degrees, 0.1 knot -> knots,
//! and so on) happens at publish time, gated by the session's `scaled`
//! policy bit, per the data model's "keep the raw integer, scale at
//! emission" rule.

use std::collections::HashMap;

use super::{DecodeError, DecodeResult, Decoded};
use crate::bits::{get_sixbit_string, getbes64, getbeu64};

/// Un-armors AIS's 6-bit-per-character payload into a big-endian bitstream
/// suitable for `getbeu64`/`getbes64`, per ITU-R M.1371 Annex 8. `fillbits`
/// is the count of low-order bits in the *last* armored character that are
/// padding rather than payload (the sentence's final comma-field) -- those
/// bits are cleared so a trailing partial byte never looks like message
/// data to a caller that reads past the last complete 6-bit group.
pub fn unarmor(payload: &str, fillbits: u32) -> Vec<u8> {
    let total_bits = payload.len() * 6;
    let mut bytes = vec![0u8; total_bits.div_ceil(8)];
    for (i, ch) in payload.bytes().enumerate() {
        let mut v = ch.wrapping_sub(48);
        if v > 39 {
            v -= 8;
        }
        let mut v = v & 0x3F;
        if i + 1 == payload.len() && fillbits > 0 && fillbits < 6 {
            v &= !((1u8 << fillbits) - 1);
        }
        let bit_start = i * 6;
        for b in 0..6 {
            let bit = (v >> (5 - b)) & 1;
            let bit_index = bit_start + b as usize;
            let byte_idx = bit_index / 8;
            let shift = 7 - (bit_index % 8);
            if bit == 1 {
                bytes[byte_idx] |= 1 << shift;
            }
        }
    }
    bytes
}

/// One `!AIVDM`/`!AIVDO` sentence's comma-field framing, parsed but not yet
/// reassembled with any sibling fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct AisFragment {
    pub total: u32,
    pub frag_num: u32,
    pub seqid: Option<u32>,
    pub channel: char,
    pub payload: String,
    pub fillbits: u32,
}

/// Parses the `!AIVDM,...` sentence framing (comma fields) down to an
/// [`AisFragment`], leaving reassembly of multi-fragment messages to
/// [`Reassembler`].
pub fn parse_fragment(sentence: &[u8]) -> Result<AisFragment, DecodeError> {
    let text = std::str::from_utf8(sentence)
        .map_err(|_| DecodeError::OutOfRange("non-UTF8 AIVDM sentence".into()))?;
    let body = text.trim_start_matches('!');
    let body = match body.find('*') {
        Some(star) => &body[..star],
        None => body.trim_end(),
    };
    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() < 7 {
        return Err(DecodeError::TooShort { need: 7, have: fields.len() });
    }
    let total: u32 = fields[1].parse().unwrap_or(1);
    let frag_num: u32 = fields[2].parse().unwrap_or(1);
    let seqid: Option<u32> = fields[3].parse().ok();
    let channel = fields[4].chars().next().unwrap_or('A');
    let fillbits: u32 = fields[6].parse().unwrap_or(0);
    Ok(AisFragment {
        total,
        frag_num,
        seqid,
        channel,
        payload: fields[5].to_string(),
        fillbits,
    })
}

/// Backward-compatible single-fragment accessor used by tests and callers
/// that already know a sentence is unfragmented.
pub fn armored_payload(sentence: &[u8]) -> Result<(String, u32), DecodeError> {
    let frag = parse_fragment(sentence)?;
    Ok((frag.payload, frag.fillbits))
}

/// Buffers AIVDM fragments keyed by `(channel, seqid)` until every piece of
/// a multi-sentence message (types 5/8/24 are the common case, since their
/// payload often exceeds one sentence's ~63-character budget) has arrived,
/// then hands back the concatenated armored payload and the final
/// fragment's fill-bit count. Single-fragment sentences (`total == 1`)
/// pass straight through without touching the pending table.
#[derive(Debug, Default)]
pub struct Reassembler {
    pending: HashMap<(char, Option<u32>), Vec<Option<String>>>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, frag: AisFragment) -> Option<(String, u32)> {
        if frag.total <= 1 {
            return Some((frag.payload, frag.fillbits));
        }
        let key = (frag.channel, frag.seqid);
        let slots = self
            .pending
            .entry(key)
            .or_insert_with(|| vec![None; frag.total as usize]);
        if slots.len() != frag.total as usize {
            *slots = vec![None; frag.total as usize];
        }
        let idx = frag.frag_num.saturating_sub(1) as usize;
        let fillbits = frag.fillbits;
        if idx < slots.len() {
            slots[idx] = Some(frag.payload);
        }
        if slots.iter().all(Option::is_some) {
            let pieces = self.pending.remove(&key).unwrap();
            let joined: String = pieces.into_iter().map(|p| p.unwrap()).collect();
            Some((joined, fillbits))
        } else {
            None
        }
    }
}

/// The static/voyage metadata half of a type 24 report, which arrives as
/// two independent single-fragment sentences (`partno` 0 and 1) rather
/// than as lexer-level fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticPartA {
    pub shipname: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticPartB {
    pub shiptype: u8,
    pub vendor_id: String,
    pub callsign: String,
    pub to_bow: u16,
    pub to_stern: u16,
    pub to_port: u16,
    pub to_starboard: u16,
}

/// A type 6/8 application payload: either a DAC/FID combination this
/// decoder knows the inner layout of, or the raw bits for one it doesn't.
/// `structured = false` on the `Raw` variant signals to a client that
/// `data` is opaque and must not be interpreted as the known schema.
#[derive(Debug, Clone, PartialEq)]
pub enum AppData {
    /// IMO236/IMO289 DAC 1, FID 11/31 meteorological/hydrological data
    /// (partial: position and observation time only).
    MetHydro { lat_raw: i32, lon_raw: i32, day: u8, hour: u8, minute: u8 },
    Raw { dac: u16, fid: u8, bitcount: usize, bytes: Vec<u8> },
}

fn decode_app_data(bits: &[u8], dac: u16, fid: u8, data_start: u32) -> AppData {
    let remaining_bits = (bits.len() as u32 * 8).saturating_sub(data_start);
    if (dac == 1 && (fid == 11 || fid == 31)) && remaining_bits >= 56 {
        let lat_raw = getbes64(bits, data_start, 24).unwrap_or(0) as i32;
        let lon_raw = getbes64(bits, data_start + 24, 25).unwrap_or(0) as i32;
        let day = getbeu64(bits, data_start + 49, 5).unwrap_or(0) as u8;
        let hour = getbeu64(bits, data_start + 54, 5).unwrap_or(0) as u8;
        let minute = getbeu64(bits, data_start + 59, 6).unwrap_or(0) as u8;
        return AppData::MetHydro { lat_raw, lon_raw, day, hour, minute };
    }
    let start_byte = (data_start / 8) as usize;
    let bytes = bits.get(start_byte..).unwrap_or(&[]).to_vec();
    AppData::Raw { dac, fid, bitcount: remaining_bits as usize, bytes }
}

/// The decoded message body. Every geodetic/velocity field is the raw
/// integer ITU-R M.1371 defines (no scaling applied); see the module doc
/// comment and `Record::Ais`'s construction in `publish.rs` for where that
/// scaling happens.
#[derive(Debug, Clone, PartialEq)]
pub enum AisMessage {
    PositionReport {
        mmsi: u32,
        msg_type: u8,
        nav_status: u8,
        rot_raw: i8,
        sog_raw: u16,
        accuracy: bool,
        lon_raw: i32,
        lat_raw: i32,
        cog_raw: u16,
        heading_raw: u16,
        second: u8,
        maneuver: u8,
        raim: bool,
        radio: u32,
    },
    BaseStation {
        mmsi: u32,
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        accuracy: bool,
        lon_raw: i32,
        lat_raw: i32,
        epfd: u8,
        raim: bool,
    },
    StaticAndVoyage {
        mmsi: u32,
        ais_version: u8,
        imo: u32,
        callsign: String,
        shipname: String,
        shiptype: u8,
        to_bow: u16,
        to_stern: u16,
        to_port: u16,
        to_starboard: u16,
        epfd: u8,
        eta_month: u8,
        eta_day: u8,
        eta_hour: u8,
        eta_minute: u8,
        draught_raw: u8,
        destination: String,
        dte: bool,
    },
    BinaryAddressed { mmsi: u32, seqno: u8, dest_mmsi: u32, retransmit: bool, app: AppData },
    SafetyAck { mmsi: u32, seqno: u8, mmsi1: u32 },
    BinaryBroadcast { mmsi: u32, app: AppData },
    SarAircraftPosition {
        mmsi: u32,
        altitude_raw: u16,
        sog_raw: u16,
        accuracy: bool,
        lon_raw: i32,
        lat_raw: i32,
        cog_raw: u16,
        second: u8,
        raim: bool,
    },
    UtcInquiry { mmsi: u32, dest_mmsi: u32 },
    AddressedSafety { mmsi: u32, seqno: u8, dest_mmsi: u32, retransmit: bool, text: String },
    BroadcastSafety { mmsi: u32, text: String },
    Interrogation { mmsi: u32 },
    AssignedModeCommand { mmsi: u32, dest_mmsi_a: u32, offset_a: u16, increment_a: u16 },
    DgnssBroadcast { mmsi: u32, lon_raw: i32, lat_raw: i32 },
    ClassBPositionReport {
        mmsi: u32,
        sog_raw: u16,
        accuracy: bool,
        lon_raw: i32,
        lat_raw: i32,
        cog_raw: u16,
        heading_raw: u16,
        second: u8,
        raim: bool,
        radio: u32,
    },
    ExtendedClassB {
        mmsi: u32,
        sog_raw: u16,
        accuracy: bool,
        lon_raw: i32,
        lat_raw: i32,
        cog_raw: u16,
        heading_raw: u16,
        second: u8,
        shipname: String,
        shiptype: u8,
        to_bow: u16,
        to_stern: u16,
        to_port: u16,
        to_starboard: u16,
        epfd: u8,
        raim: bool,
        dte: bool,
        assigned: bool,
    },
    DataLinkManagement { mmsi: u32 },
    AidToNavigation {
        mmsi: u32,
        aid_type: u8,
        name: String,
        accuracy: bool,
        lon_raw: i32,
        lat_raw: i32,
        to_bow: u16,
        to_stern: u16,
        to_port: u16,
        to_starboard: u16,
        epfd: u8,
        second: u8,
        off_position: bool,
        raim: bool,
        virtual_aid: bool,
    },
    ChannelManagement { mmsi: u32 },
    GroupAssignment { mmsi: u32 },
    StaticDataReport { mmsi: u32, part_a: Option<StaticPartA>, part_b: Option<StaticPartB> },
    SingleSlotBinary { mmsi: u32, dest_mmsi: Option<u32>, app: Option<AppData> },
    MultiSlotBinary { mmsi: u32, dest_mmsi: Option<u32>, app: Option<AppData> },
    LongRangePositionReport {
        mmsi: u32,
        accuracy: bool,
        raim: bool,
        nav_status: u8,
        lon_raw: i32,
        lat_raw: i32,
        sog_raw: u8,
        cog_raw: u16,
        gnss: bool,
    },
}

impl AisMessage {
    pub fn mmsi(&self) -> u32 {
        match self {
            AisMessage::PositionReport { mmsi, .. }
            | AisMessage::BaseStation { mmsi, .. }
            | AisMessage::StaticAndVoyage { mmsi, .. }
            | AisMessage::BinaryAddressed { mmsi, .. }
            | AisMessage::SafetyAck { mmsi, .. }
            | AisMessage::BinaryBroadcast { mmsi, .. }
            | AisMessage::SarAircraftPosition { mmsi, .. }
            | AisMessage::UtcInquiry { mmsi, .. }
            | AisMessage::AddressedSafety { mmsi, .. }
            | AisMessage::BroadcastSafety { mmsi, .. }
            | AisMessage::Interrogation { mmsi, .. }
            | AisMessage::AssignedModeCommand { mmsi, .. }
            | AisMessage::DgnssBroadcast { mmsi, .. }
            | AisMessage::ClassBPositionReport { mmsi, .. }
            | AisMessage::ExtendedClassB { mmsi, .. }
            | AisMessage::DataLinkManagement { mmsi, .. }
            | AisMessage::AidToNavigation { mmsi, .. }
            | AisMessage::ChannelManagement { mmsi, .. }
            | AisMessage::GroupAssignment { mmsi, .. }
            | AisMessage::StaticDataReport { mmsi, .. }
            | AisMessage::SingleSlotBinary { mmsi, .. }
            | AisMessage::MultiSlotBinary { mmsi, .. }
            | AisMessage::LongRangePositionReport { mmsi, .. } => *mmsi,
        }
    }

    /// The ITU-R M.1371 message type number, recovered from which variant
    /// this is (needed by the publisher's `type` field without re-parsing
    /// the original bits).
    pub fn msg_type(&self) -> u32 {
        match self {
            AisMessage::PositionReport { msg_type, .. } => *msg_type as u32,
            AisMessage::BaseStation { .. } => 4,
            AisMessage::StaticAndVoyage { .. } => 5,
            AisMessage::BinaryAddressed { .. } => 6,
            AisMessage::SafetyAck { .. } => 7,
            AisMessage::BinaryBroadcast { .. } => 8,
            AisMessage::SarAircraftPosition { .. } => 9,
            AisMessage::UtcInquiry { .. } => 10,
            AisMessage::AddressedSafety { .. } => 12,
            AisMessage::BroadcastSafety { .. } => 14,
            AisMessage::Interrogation { .. } => 15,
            AisMessage::AssignedModeCommand { .. } => 16,
            AisMessage::DgnssBroadcast { .. } => 17,
            AisMessage::ClassBPositionReport { .. } => 18,
            AisMessage::ExtendedClassB { .. } => 19,
            AisMessage::DataLinkManagement { .. } => 20,
            AisMessage::AidToNavigation { .. } => 21,
            AisMessage::ChannelManagement { .. } => 22,
            AisMessage::GroupAssignment { .. } => 23,
            AisMessage::StaticDataReport { .. } => 24,
            AisMessage::SingleSlotBinary { .. } => 25,
            AisMessage::MultiSlotBinary { .. } => 26,
            AisMessage::LongRangePositionReport { .. } => 27,
        }
    }
}

/// Per-session AIS decode state: the fragment reassembler plus the type 24
/// part A/B pending table, keyed by MMSI.
#[derive(Debug, Default)]
pub struct AisState {
    pub fragments: Reassembler,
    pending24: HashMap<u32, (Option<StaticPartA>, Option<StaticPartB>)>,
}

impl AisState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Decodes one `!AIVDM`/`!AIVDO` sentence, folding it into `state`'s
/// reassembly buffers. Returns `Err(DecodeError::Incomplete)` while a
/// multi-fragment message is still missing pieces -- callers should treat
/// that as "no report yet", not a failure.
pub fn decode(sentence: &[u8], state: &mut AisState) -> DecodeResult {
    let frag = parse_fragment(sentence)?;
    let (armored, fillbits) = match state.fragments.feed(frag) {
        Some(pair) => pair,
        None => return Err(DecodeError::Incomplete),
    };
    let bits = unarmor(&armored, fillbits);
    if bits.is_empty() {
        return Err(DecodeError::TooShort { need: 1, have: 0 });
    }
    let msg_type = getbeu64(&bits, 0, 6).unwrap_or(0);
    let msg = decode_message(&bits, msg_type, state)?;
    let mut out = Decoded::empty();
    out.ais = Some(msg);
    Ok(out)
}

fn decode_message(bits: &[u8], msg_type: u64, state: &mut AisState) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 38 {
        return Err(DecodeError::TooShort { need: 5, have: bits.len() });
    }
    let mmsi = getbeu64(bits, 8, 30).unwrap_or(0) as u32;

    match msg_type {
        1 | 2 | 3 => decode_position_report(bits, mmsi, msg_type as u8),
        4 | 11 => decode_base_station(bits, mmsi),
        5 => decode_static_and_voyage(bits, mmsi),
        6 => decode_binary_addressed(bits, mmsi),
        7 => decode_safety_ack(bits, mmsi),
        8 => decode_binary_broadcast(bits, mmsi),
        9 => decode_sar_position(bits, mmsi),
        10 => Ok(AisMessage::UtcInquiry { mmsi, dest_mmsi: getbeu64(bits, 40, 30).unwrap_or(0) as u32 }),
        12 => decode_addressed_safety(bits, mmsi),
        14 => Ok(AisMessage::BroadcastSafety { mmsi, text: get_sixbit_string(bits, 40, ((bits.len() as u32 * 8).saturating_sub(40)) / 6) }),
        15 => Ok(AisMessage::Interrogation { mmsi }),
        16 => Ok(AisMessage::AssignedModeCommand {
            mmsi,
            dest_mmsi_a: getbeu64(bits, 40, 30).unwrap_or(0) as u32,
            offset_a: getbeu64(bits, 70, 12).unwrap_or(0) as u16,
            increment_a: getbeu64(bits, 82, 10).unwrap_or(0) as u16,
        }),
        17 => Ok(AisMessage::DgnssBroadcast {
            mmsi,
            lon_raw: getbes64(bits, 40, 18).unwrap_or(0) as i32,
            lat_raw: getbes64(bits, 58, 17).unwrap_or(0) as i32,
        }),
        18 => decode_class_b_position_report(bits, mmsi),
        19 => decode_extended_class_b(bits, mmsi),
        20 => Ok(AisMessage::DataLinkManagement { mmsi }),
        21 => decode_aid_to_navigation(bits, mmsi),
        22 => Ok(AisMessage::ChannelManagement { mmsi }),
        23 => Ok(AisMessage::GroupAssignment { mmsi }),
        24 => decode_static_data_report(bits, mmsi, state),
        25 => decode_single_slot_binary(bits, mmsi),
        26 => decode_multi_slot_binary(bits, mmsi),
        27 => decode_long_range_position_report(bits, mmsi),
        other => Err(DecodeError::UnknownMessage(format!("AIS type {other}"))),
    }
}

fn decode_position_report(bits: &[u8], mmsi: u32, msg_type: u8) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 168 {
        return Err(DecodeError::TooShort { need: 21, have: bits.len() });
    }
    Ok(AisMessage::PositionReport {
        mmsi,
        msg_type,
        nav_status: getbeu64(bits, 38, 4).unwrap_or(15) as u8,
        rot_raw: getbes64(bits, 42, 8).unwrap_or(0) as i8,
        sog_raw: getbeu64(bits, 50, 10).unwrap_or(1023) as u16,
        accuracy: getbeu64(bits, 60, 1).unwrap_or(0) != 0,
        lon_raw: getbes64(bits, 61, 28).unwrap_or(0) as i32,
        lat_raw: getbes64(bits, 89, 27).unwrap_or(0) as i32,
        cog_raw: getbeu64(bits, 116, 12).unwrap_or(3600) as u16,
        heading_raw: getbeu64(bits, 128, 9).unwrap_or(511) as u16,
        second: getbeu64(bits, 137, 6).unwrap_or(60) as u8,
        maneuver: getbeu64(bits, 143, 2).unwrap_or(0) as u8,
        raim: getbeu64(bits, 148, 1).unwrap_or(0) != 0,
        radio: getbeu64(bits, 149, 19).unwrap_or(0) as u32,
    })
}

fn decode_base_station(bits: &[u8], mmsi: u32) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 168 {
        return Err(DecodeError::TooShort { need: 21, have: bits.len() });
    }
    Ok(AisMessage::BaseStation {
        mmsi,
        year: getbeu64(bits, 38, 14).unwrap_or(0) as u16,
        month: getbeu64(bits, 52, 4).unwrap_or(0) as u8,
        day: getbeu64(bits, 56, 5).unwrap_or(0) as u8,
        hour: getbeu64(bits, 61, 5).unwrap_or(0) as u8,
        minute: getbeu64(bits, 66, 6).unwrap_or(0) as u8,
        second: getbeu64(bits, 72, 6).unwrap_or(0) as u8,
        accuracy: getbeu64(bits, 78, 1).unwrap_or(0) != 0,
        lon_raw: getbes64(bits, 79, 28).unwrap_or(0) as i32,
        lat_raw: getbes64(bits, 107, 27).unwrap_or(0) as i32,
        epfd: getbeu64(bits, 134, 4).unwrap_or(0) as u8,
        raim: getbeu64(bits, 148, 1).unwrap_or(0) != 0,
    })
}

fn decode_static_and_voyage(bits: &[u8], mmsi: u32) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 420 {
        return Err(DecodeError::TooShort { need: 53, have: bits.len() });
    }
    Ok(AisMessage::StaticAndVoyage {
        mmsi,
        ais_version: getbeu64(bits, 38, 2).unwrap_or(0) as u8,
        imo: getbeu64(bits, 40, 30).unwrap_or(0) as u32,
        callsign: get_sixbit_string(bits, 70, 7),
        shipname: get_sixbit_string(bits, 112, 20),
        shiptype: getbeu64(bits, 232, 8).unwrap_or(0) as u8,
        to_bow: getbeu64(bits, 240, 9).unwrap_or(0) as u16,
        to_stern: getbeu64(bits, 249, 9).unwrap_or(0) as u16,
        to_port: getbeu64(bits, 258, 6).unwrap_or(0) as u16,
        to_starboard: getbeu64(bits, 264, 6).unwrap_or(0) as u16,
        epfd: getbeu64(bits, 270, 4).unwrap_or(0) as u8,
        eta_month: getbeu64(bits, 274, 4).unwrap_or(0) as u8,
        eta_day: getbeu64(bits, 278, 5).unwrap_or(0) as u8,
        eta_hour: getbeu64(bits, 283, 5).unwrap_or(0) as u8,
        eta_minute: getbeu64(bits, 288, 6).unwrap_or(0) as u8,
        draught_raw: getbeu64(bits, 294, 8).unwrap_or(0) as u8,
        destination: get_sixbit_string(bits, 302, 20),
        dte: getbeu64(bits, 422, 1).unwrap_or(0) != 0,
    })
}

fn decode_binary_addressed(bits: &[u8], mmsi: u32) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 88 {
        return Err(DecodeError::TooShort { need: 11, have: bits.len() });
    }
    let dac = getbeu64(bits, 72, 10).unwrap_or(0) as u16;
    let fid = getbeu64(bits, 82, 6).unwrap_or(0) as u8;
    Ok(AisMessage::BinaryAddressed {
        mmsi,
        seqno: getbeu64(bits, 38, 2).unwrap_or(0) as u8,
        dest_mmsi: getbeu64(bits, 40, 30).unwrap_or(0) as u32,
        retransmit: getbeu64(bits, 70, 1).unwrap_or(0) != 0,
        app: decode_app_data(bits, dac, fid, 88),
    })
}

fn decode_safety_ack(bits: &[u8], mmsi: u32) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 70 {
        return Err(DecodeError::TooShort { need: 9, have: bits.len() });
    }
    Ok(AisMessage::SafetyAck {
        mmsi,
        seqno: getbeu64(bits, 38, 2).unwrap_or(0) as u8,
        mmsi1: getbeu64(bits, 40, 30).unwrap_or(0) as u32,
    })
}

fn decode_binary_broadcast(bits: &[u8], mmsi: u32) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 56 {
        return Err(DecodeError::TooShort { need: 7, have: bits.len() });
    }
    let dac = getbeu64(bits, 40, 10).unwrap_or(0) as u16;
    let fid = getbeu64(bits, 50, 6).unwrap_or(0) as u8;
    Ok(AisMessage::BinaryBroadcast { mmsi, app: decode_app_data(bits, dac, fid, 56) })
}

fn decode_sar_position(bits: &[u8], mmsi: u32) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 148 {
        return Err(DecodeError::TooShort { need: 19, have: bits.len() });
    }
    Ok(AisMessage::SarAircraftPosition {
        mmsi,
        altitude_raw: getbeu64(bits, 38, 12).unwrap_or(4095) as u16,
        sog_raw: getbeu64(bits, 50, 10).unwrap_or(1023) as u16,
        accuracy: getbeu64(bits, 60, 1).unwrap_or(0) != 0,
        lon_raw: getbes64(bits, 61, 28).unwrap_or(0) as i32,
        lat_raw: getbes64(bits, 89, 27).unwrap_or(0) as i32,
        cog_raw: getbeu64(bits, 116, 12).unwrap_or(3600) as u16,
        second: getbeu64(bits, 128, 6).unwrap_or(60) as u8,
        raim: getbeu64(bits, 139, 1).unwrap_or(0) != 0,
    })
}

fn decode_addressed_safety(bits: &[u8], mmsi: u32) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 72 {
        return Err(DecodeError::TooShort { need: 9, have: bits.len() });
    }
    let remaining = (bits.len() as u32 * 8).saturating_sub(72);
    Ok(AisMessage::AddressedSafety {
        mmsi,
        seqno: getbeu64(bits, 38, 2).unwrap_or(0) as u8,
        dest_mmsi: getbeu64(bits, 40, 30).unwrap_or(0) as u32,
        retransmit: getbeu64(bits, 70, 1).unwrap_or(0) != 0,
        text: get_sixbit_string(bits, 72, remaining / 6),
    })
}

fn decode_class_b_position_report(bits: &[u8], mmsi: u32) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 168 {
        return Err(DecodeError::TooShort { need: 21, have: bits.len() });
    }
    Ok(AisMessage::ClassBPositionReport {
        mmsi,
        sog_raw: getbeu64(bits, 46, 10).unwrap_or(1023) as u16,
        accuracy: getbeu64(bits, 56, 1).unwrap_or(0) != 0,
        lon_raw: getbes64(bits, 57, 28).unwrap_or(0) as i32,
        lat_raw: getbes64(bits, 85, 27).unwrap_or(0) as i32,
        cog_raw: getbeu64(bits, 112, 12).unwrap_or(3600) as u16,
        heading_raw: getbeu64(bits, 124, 9).unwrap_or(511) as u16,
        second: getbeu64(bits, 133, 6).unwrap_or(60) as u8,
        raim: getbeu64(bits, 147, 1).unwrap_or(0) != 0,
        radio: getbeu64(bits, 148, 20).unwrap_or(0) as u32,
    })
}

fn decode_extended_class_b(bits: &[u8], mmsi: u32) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 308 {
        return Err(DecodeError::TooShort { need: 39, have: bits.len() });
    }
    Ok(AisMessage::ExtendedClassB {
        mmsi,
        sog_raw: getbeu64(bits, 46, 10).unwrap_or(1023) as u16,
        accuracy: getbeu64(bits, 56, 1).unwrap_or(0) != 0,
        lon_raw: getbes64(bits, 57, 28).unwrap_or(0) as i32,
        lat_raw: getbes64(bits, 85, 27).unwrap_or(0) as i32,
        cog_raw: getbeu64(bits, 112, 12).unwrap_or(3600) as u16,
        heading_raw: getbeu64(bits, 124, 9).unwrap_or(511) as u16,
        second: getbeu64(bits, 133, 6).unwrap_or(60) as u8,
        shipname: get_sixbit_string(bits, 143, 20),
        shiptype: getbeu64(bits, 263, 8).unwrap_or(0) as u8,
        to_bow: getbeu64(bits, 271, 9).unwrap_or(0) as u16,
        to_stern: getbeu64(bits, 280, 9).unwrap_or(0) as u16,
        to_port: getbeu64(bits, 289, 6).unwrap_or(0) as u16,
        to_starboard: getbeu64(bits, 295, 6).unwrap_or(0) as u16,
        epfd: getbeu64(bits, 301, 4).unwrap_or(0) as u8,
        raim: getbeu64(bits, 305, 1).unwrap_or(0) != 0,
        dte: getbeu64(bits, 306, 1).unwrap_or(0) != 0,
        assigned: getbeu64(bits, 307, 1).unwrap_or(0) != 0,
    })
}

fn decode_aid_to_navigation(bits: &[u8], mmsi: u32) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 272 {
        return Err(DecodeError::TooShort { need: 34, have: bits.len() });
    }
    Ok(AisMessage::AidToNavigation {
        mmsi,
        aid_type: getbeu64(bits, 38, 5).unwrap_or(0) as u8,
        name: get_sixbit_string(bits, 43, 20),
        accuracy: getbeu64(bits, 163, 1).unwrap_or(0) != 0,
        lon_raw: getbes64(bits, 164, 28).unwrap_or(0) as i32,
        lat_raw: getbes64(bits, 192, 27).unwrap_or(0) as i32,
        to_bow: getbeu64(bits, 219, 9).unwrap_or(0) as u16,
        to_stern: getbeu64(bits, 228, 9).unwrap_or(0) as u16,
        to_port: getbeu64(bits, 237, 6).unwrap_or(0) as u16,
        to_starboard: getbeu64(bits, 243, 6).unwrap_or(0) as u16,
        epfd: getbeu64(bits, 249, 4).unwrap_or(0) as u8,
        second: getbeu64(bits, 253, 6).unwrap_or(60) as u8,
        off_position: getbeu64(bits, 259, 1).unwrap_or(0) != 0,
        raim: getbeu64(bits, 268, 1).unwrap_or(0) != 0,
        virtual_aid: getbeu64(bits, 269, 1).unwrap_or(0) != 0,
    })
}

fn decode_static_data_report(bits: &[u8], mmsi: u32, state: &mut AisState) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 40 {
        return Err(DecodeError::TooShort { need: 5, have: bits.len() });
    }
    let partno = getbeu64(bits, 38, 2).unwrap_or(0);
    let entry = state.pending24.entry(mmsi).or_insert((None, None));
    if partno == 0 {
        entry.0 = Some(StaticPartA { shipname: get_sixbit_string(bits, 40, 20) });
    } else {
        entry.1 = Some(StaticPartB {
            shiptype: getbeu64(bits, 40, 8).unwrap_or(0) as u8,
            vendor_id: get_sixbit_string(bits, 48, 3),
            callsign: get_sixbit_string(bits, 90, 7),
            to_bow: getbeu64(bits, 132, 9).unwrap_or(0) as u16,
            to_stern: getbeu64(bits, 141, 9).unwrap_or(0) as u16,
            to_port: getbeu64(bits, 150, 6).unwrap_or(0) as u16,
            to_starboard: getbeu64(bits, 156, 6).unwrap_or(0) as u16,
        });
    }
    let (part_a, part_b) = entry.clone();
    Ok(AisMessage::StaticDataReport { mmsi, part_a, part_b })
}

fn decode_single_slot_binary(bits: &[u8], mmsi: u32) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 40 {
        return Err(DecodeError::TooShort { need: 5, have: bits.len() });
    }
    let addressed = getbeu64(bits, 38, 1).unwrap_or(0) != 0;
    let structured = getbeu64(bits, 39, 1).unwrap_or(0) != 0;
    let data_start = if addressed { 70 } else { 40 };
    let dest_mmsi = addressed.then(|| getbeu64(bits, 40, 30).unwrap_or(0) as u32);
    let app = structured.then(|| {
        let app_id = getbeu64(bits, data_start, 16).unwrap_or(0);
        decode_app_data(bits, (app_id >> 6) as u16, (app_id & 0x3F) as u8, data_start + 16)
    });
    Ok(AisMessage::SingleSlotBinary { mmsi, dest_mmsi, app })
}

fn decode_multi_slot_binary(bits: &[u8], mmsi: u32) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 40 {
        return Err(DecodeError::TooShort { need: 5, have: bits.len() });
    }
    let addressed = getbeu64(bits, 38, 1).unwrap_or(0) != 0;
    let structured = getbeu64(bits, 39, 1).unwrap_or(0) != 0;
    let data_start = if addressed { 70 } else { 40 };
    let dest_mmsi = addressed.then(|| getbeu64(bits, 40, 30).unwrap_or(0) as u32);
    let app = structured.then(|| {
        let app_id = getbeu64(bits, data_start, 16).unwrap_or(0);
        decode_app_data(bits, (app_id >> 6) as u16, (app_id & 0x3F) as u8, data_start + 16)
    });
    Ok(AisMessage::MultiSlotBinary { mmsi, dest_mmsi, app })
}

fn decode_long_range_position_report(bits: &[u8], mmsi: u32) -> Result<AisMessage, DecodeError> {
    if bits.len() * 8 < 96 {
        return Err(DecodeError::TooShort { need: 12, have: bits.len() });
    }
    Ok(AisMessage::LongRangePositionReport {
        mmsi,
        accuracy: getbeu64(bits, 38, 1).unwrap_or(0) != 0,
        raim: getbeu64(bits, 39, 1).unwrap_or(0) != 0,
        nav_status: getbeu64(bits, 40, 4).unwrap_or(15) as u8,
        lon_raw: getbes64(bits, 44, 18).unwrap_or(0) as i32,
        lat_raw: getbes64(bits, 62, 17).unwrap_or(0) as i32,
        sog_raw: getbeu64(bits, 79, 6).unwrap_or(63) as u8,
        cog_raw: getbeu64(bits, 85, 9).unwrap_or(511) as u16,
        gnss: getbeu64(bits, 94, 1).unwrap_or(0) != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unarmor_produces_nonempty_bitstream() {
        let bits = unarmor("15MgK45P3@G?fl0E`JbR0OwT0@MS", 0);
        assert!(!bits.is_empty());
        let msg_type = getbeu64(&bits, 0, 6).unwrap();
        assert_eq!(msg_type, 1);
    }

    #[test]
    fn fillbits_clear_trailing_padding() {
        // Last char 'P' (armored) has its low bits as padding when fillbits=4;
        // the cleared bits must not show up as spurious trailing data bits.
        let with_fill = unarmor("6P", 4);
        let without_fill = unarmor("6P", 0);
        assert_ne!(with_fill, without_fill);
    }

    #[test]
    fn position_report_round_trips_known_sentence() {
        let sentence = b"!AIVDM,1,1,,A,15MgK45P3@G?fl0E`JbR0OwT0@MS,0*4E\r\n";
        let mut state = AisState::new();
        let d = decode(sentence, &mut state).unwrap();
        match d.ais.unwrap() {
            AisMessage::PositionReport { lon_raw, lat_raw, .. } => {
                assert!((lon_raw as f64 / 600_000.0).abs() <= 180.0);
                assert!((lat_raw as f64 / 600_000.0).abs() <= 90.0);
            }
            other => panic!("expected PositionReport, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_reports_error() {
        let bits = vec![0b1111_1100];
        let msg_type = getbeu64(&bits, 0, 6).unwrap();
        assert_eq!(msg_type, 63);
    }

    #[test]
    fn fragmented_sentence_waits_for_second_fragment() {
        let sentence = b"!AIVDM,2,1,9,A,55P5TL01VIaAL@7WKO@mBplU@<PDhh000000001S;AJ::4A80?4i@E53,0*3E\r\n";
        let mut state = AisState::new();
        assert!(matches!(decode(sentence, &mut state), Err(DecodeError::Incomplete)));
    }

    #[test]
    fn fragmented_sentence_completes_on_second_fragment() {
        let first = b"!AIVDM,2,1,9,A,55P5TL01VIaAL@7WKO@mBplU@<PDhh000000001S;AJ::4A80?4i@E53,0*3E\r\n";
        let second = b"!AIVDM,2,2,9,A,1@0000000000000,2*55\r\n";
        let mut state = AisState::new();
        assert!(matches!(decode(first, &mut state), Err(DecodeError::Incomplete)));
        let d = decode(second, &mut state).unwrap();
        match d.ais.unwrap() {
            AisMessage::StaticAndVoyage { mmsi, .. } => assert!(mmsi > 0),
            other => panic!("expected StaticAndVoyage, got {other:?}"),
        }
    }

    #[test]
    fn type24_part_a_and_b_combine_by_mmsi() {
        let part_a = b"!AIVDM,1,1,,B,H42O55i18tMET00000000000000,2*6D\r\n";
        let part_b = b"!AIVDM,1,1,,B,H42O55lti4hhhilD3nink000?050,0*40\r\n";
        let mut state = AisState::new();
        let a = decode(part_a, &mut state).unwrap();
        let a_msg = a.ais.unwrap();
        assert!(matches!(a_msg, AisMessage::StaticDataReport { part_a: Some(_), .. }));
        let b = decode(part_b, &mut state).unwrap();
        match b.ais.unwrap() {
            AisMessage::StaticDataReport { part_a, part_b, mmsi: _ } => {
                assert!(part_a.is_some());
                assert!(part_b.is_some());
            }
            other => panic!("expected StaticDataReport, got {other:?}"),
        }
    }

    #[test]
    fn binary_broadcast_unknown_dac_fid_is_raw() {
        let mut bits = vec![0u8; 20];
        crate::bits::putbeu64(&mut bits, 0, 6, 8);
        crate::bits::putbeu64(&mut bits, 8, 30, 123456789);
        crate::bits::putbeu64(&mut bits, 40, 10, 999); // unknown DAC
        crate::bits::putbeu64(&mut bits, 50, 6, 1); // unknown FID
        let mut state = AisState::new();
        let msg = decode_message(&bits, 8, &mut state).unwrap();
        match msg {
            AisMessage::BinaryBroadcast { app: AppData::Raw { dac, fid, .. }, .. } => {
                assert_eq!(dac, 999);
                assert_eq!(fid, 1);
            }
            other => panic!("expected raw AppData fallback, got {other:?}"),
        }
    }
}
