//! RTCM3 decoding.
//!
//! `frame` is the full lexer-framed packet: `D3 | length(10 bits) |
//! payload | CRC24Q`. Bit offsets below are measured from the start of
//! `payload` (i.e. after the 3-byte D3 header), per RTCM 10403.3. Covers
//! the legacy per-satellite observation messages (1001-1012), station
//! coordinates (1005/1006), antenna/receiver descriptors (1033), GPS/
//! GLONASS ephemerides (1019/1020), the MSM family (1071-1127, header
//! decoded fully, per-signal cells captured raw), the IGS SSR header
//! (4076), and GLONASS code-phase biases (1230).

use super::{DecodeError, DecodeResult, Decoded};
use crate::bits::{getbes64, getbeu64};

const HEADER_LEN: usize = 3;
const CRC_LEN: usize = 3;

pub fn message_type(frame: &[u8]) -> Option<u64> {
    let len = rtcm3_payload_len(frame)?;
    let payload = frame.get(HEADER_LEN..HEADER_LEN + len)?;
    getbeu64(payload, 0, 12).ok()
}

fn rtcm3_payload_len(frame: &[u8]) -> Option<usize> {
    if frame.len() < HEADER_LEN + CRC_LEN {
        return None;
    }
    Some((((frame[1] as usize) & 0x03) << 8) | frame[2] as usize)
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyObservation {
    pub msg_type: u64,
    pub station_id: u32,
    pub epoch_tow_ms: u32,
    pub sync: bool,
    pub n_sat: u8,
    pub smoothing: bool,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationArp {
    pub station_id: u32,
    pub ecef_x_raw: i64,
    pub ecef_y_raw: i64,
    pub ecef_z_raw: i64,
    pub height_raw: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsEphemeris {
    pub sat_id: u8,
    pub week: u16,
    pub sv_accuracy: u8,
    pub code_on_l2: u8,
    pub idot_raw: i32,
    pub iode: u8,
    pub toc: u16,
    pub af2_raw: i32,
    pub af1_raw: i32,
    pub af0_raw: i32,
    pub iodc: u16,
    pub crs_raw: i32,
    pub delta_n_raw: i32,
    pub m0_raw: i64,
    pub cuc_raw: i32,
    pub e_raw: u64,
    pub cus_raw: i32,
    pub sqrt_a_raw: u64,
    pub toe: u16,
    pub cic_raw: i32,
    pub omega0_raw: i64,
    pub cis_raw: i32,
    pub i0_raw: i64,
    pub crc_raw: i32,
    pub omega_raw: i64,
    pub omega_dot_raw: i32,
    pub tgd_raw: i32,
    pub sv_health: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlonassEphemeris {
    pub sat_id: u8,
    pub freq_channel: u8,
    pub health: u8,
    pub tk_raw: u32,
    pub x_raw: i64,
    pub y_raw: i64,
    pub z_raw: i64,
    pub vx_raw: i32,
    pub vy_raw: i32,
    pub vz_raw: i32,
    pub gamma_raw: i32,
    pub tau_raw: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AntennaDescriptor {
    pub station_id: u32,
    pub antenna_descriptor: String,
    pub antenna_setup_id: u8,
    pub antenna_serial: String,
    pub receiver_type: String,
    pub receiver_firmware: String,
    pub receiver_serial: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MsmObservation {
    pub msg_type: u64,
    pub station_id: u32,
    pub epoch_ms: u32,
    pub multiple_message: bool,
    pub iods: u8,
    pub satellite_mask: u64,
    pub signal_mask: u32,
    /// Per-signal/per-satellite cell body, left raw: MSM1-7 vary payload
    /// width per signal (pseudorange-only through full phase+range+CNR+
    /// Doppler), and this crate's consumers need only satellite/signal
    /// presence, not the per-cell values.
    pub cell_body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IgsSsrHeader {
    pub igs_message_number: u16,
    pub epoch_time: u32,
    pub update_interval: u8,
    pub multiple_message: bool,
    pub iod_ssr: u8,
    pub provider_id: u16,
    pub solution_id: u8,
    pub n_sat: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlonassCodePhaseBias {
    pub station_id: u32,
    pub signal_mask: u8,
    pub biases_raw: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rtcm3Message {
    LegacyObservation(LegacyObservation),
    StationArp(StationArp),
    GpsEphemeris(GpsEphemeris),
    GlonassEphemeris(GlonassEphemeris),
    AntennaDescriptor(AntennaDescriptor),
    Msm(MsmObservation),
    IgsSsrHeader(IgsSsrHeader),
    GlonassCodePhaseBias(GlonassCodePhaseBias),
}

pub fn decode(frame: &[u8]) -> DecodeResult {
    let len = rtcm3_payload_len(frame)
        .ok_or(DecodeError::TooShort { need: HEADER_LEN + CRC_LEN, have: frame.len() })?;
    if frame.len() < HEADER_LEN + len + CRC_LEN {
        return Err(DecodeError::TooShort { need: HEADER_LEN + len + CRC_LEN, have: frame.len() });
    }
    let payload = &frame[HEADER_LEN..HEADER_LEN + len];
    let msg_type = getbeu64(payload, 0, 12).unwrap_or(0);

    let msg = match msg_type {
        1001..=1004 | 1009..=1012 => decode_legacy_observation(payload, msg_type)?,
        1005 | 1006 => decode_station_arp(payload, msg_type == 1006)?,
        1019 => Rtcm3Message::GpsEphemeris(decode_gps_ephemeris(payload)?),
        1020 => Rtcm3Message::GlonassEphemeris(decode_glonass_ephemeris(payload)?),
        1033 => Rtcm3Message::AntennaDescriptor(decode_antenna_descriptor(payload)?),
        1071..=1077 | 1081..=1087 | 1091..=1097 | 1101..=1107 | 1111..=1117 | 1121..=1127 => {
            Rtcm3Message::Msm(decode_msm(payload, msg_type)?)
        }
        4076 => Rtcm3Message::IgsSsrHeader(decode_igs_ssr_header(payload)?),
        1230 => Rtcm3Message::GlonassCodePhaseBias(decode_glonass_code_phase_bias(payload)?),
        other => return Err(DecodeError::UnknownMessage(format!("RTCM3 message {other}"))),
    };

    let station_id = station_id_of(&msg);
    let mut out = decoded_from_message(msg);
    out.station = Some((msg_type as u32, station_id));
    Ok(out)
}

/// Not every RTCM3 message type is tied to a reference station (the
/// ephemeris/SSR-header types carry a satellite or provider id instead),
/// so this returns `0` for those rather than a bogus station id.
fn station_id_of(msg: &Rtcm3Message) -> u32 {
    match msg {
        Rtcm3Message::LegacyObservation(o) => o.station_id,
        Rtcm3Message::StationArp(a) => a.station_id,
        Rtcm3Message::AntennaDescriptor(a) => a.station_id,
        Rtcm3Message::Msm(m) => m.station_id,
        Rtcm3Message::GlonassCodePhaseBias(b) => b.station_id,
        Rtcm3Message::GpsEphemeris(_) | Rtcm3Message::GlonassEphemeris(_) | Rtcm3Message::IgsSsrHeader(_) => 0,
    }
}

fn decoded_from_message(msg: Rtcm3Message) -> Decoded {
    let mut out = Decoded::empty();
    if let Rtcm3Message::StationArp(arp) = &msg {
        out.fix.ecef_x = arp.ecef_x_raw as f64 / 10_000.0;
        out.fix.ecef_y = arp.ecef_y_raw as f64 / 10_000.0;
        out.fix.ecef_z = arp.ecef_z_raw as f64 / 10_000.0;
        out.mask = crate::fix::GpsMask::ECEF_SET;
    }
    out
}

fn need(payload: &[u8], bits: u32) -> Result<(), DecodeError> {
    if (payload.len() as u32) * 8 < bits {
        return Err(DecodeError::TooShort { need: (bits as usize).div_ceil(8), have: payload.len() });
    }
    Ok(())
}

fn decode_legacy_observation(payload: &[u8], msg_type: u64) -> Result<Rtcm3Message, DecodeError> {
    need(payload, 12 + 12 + 30 + 1 + 5 + 1 + 3)?;
    let station_id = getbeu64(payload, 12, 12).unwrap_or(0) as u32;
    let epoch_tow_ms = getbeu64(payload, 24, 30).unwrap_or(0) as u32;
    let sync = getbeu64(payload, 54, 1).unwrap_or(0) != 0;
    let n_sat = getbeu64(payload, 55, 5).unwrap_or(0) as u8;
    let smoothing = getbeu64(payload, 60, 1).unwrap_or(0) != 0;
    let header_bytes = (61usize).div_ceil(8);
    let data = payload.get(header_bytes..).unwrap_or(&[]).to_vec();
    Ok(Rtcm3Message::LegacyObservation(LegacyObservation {
        msg_type,
        station_id,
        epoch_tow_ms,
        sync,
        n_sat,
        smoothing,
        data,
    }))
}

fn decode_station_arp(payload: &[u8], with_height: bool) -> Result<Rtcm3Message, DecodeError> {
    let need_bits = if with_height {
        12 + 12 + 6 + 4 + 1 + 1 + 1 + 38 + 2 + 38 + 1 + 38 + 16
    } else {
        12 + 12 + 6 + 4 + 1 + 1 + 1 + 38 + 2 + 38 + 38
    };
    need(payload, need_bits)?;
    let station_id = getbeu64(payload, 12, 12).unwrap_or(0) as u32;
    let mut offset: u32 = 12 + 12 + 6 + 4 + 1 + 1 + 1;
    let ecef_x_raw = getbes64(payload, offset, 38).unwrap_or(0);
    offset += 38 + 2;
    let ecef_y_raw = getbes64(payload, offset, 38).unwrap_or(0);
    offset += 38 + 1;
    let ecef_z_raw = getbes64(payload, offset, 38).unwrap_or(0);
    offset += 38;
    let height_raw = if with_height { Some(getbes64(payload, offset, 16).unwrap_or(0) as i32) } else { None };
    Ok(Rtcm3Message::StationArp(StationArp { station_id, ecef_x_raw, ecef_y_raw, ecef_z_raw, height_raw }))
}

fn decode_gps_ephemeris(payload: &[u8]) -> Result<GpsEphemeris, DecodeError> {
    need(payload, 488)?;
    let mut o: u32 = 12;
    let sat_id = getbeu64(payload, o, 6).unwrap_or(0) as u8; o += 6;
    let week = getbeu64(payload, o, 10).unwrap_or(0) as u16; o += 10;
    let sv_accuracy = getbeu64(payload, o, 4).unwrap_or(0) as u8; o += 4;
    let code_on_l2 = getbeu64(payload, o, 2).unwrap_or(0) as u8; o += 2;
    let idot_raw = getbes64(payload, o, 14).unwrap_or(0) as i32; o += 14;
    let iode = getbeu64(payload, o, 8).unwrap_or(0) as u8; o += 8;
    let toc = getbeu64(payload, o, 16).unwrap_or(0) as u16; o += 16;
    let af2_raw = getbes64(payload, o, 8).unwrap_or(0) as i32; o += 8;
    let af1_raw = getbes64(payload, o, 16).unwrap_or(0) as i32; o += 16;
    let af0_raw = getbes64(payload, o, 22).unwrap_or(0) as i32; o += 22;
    let iodc = getbeu64(payload, o, 10).unwrap_or(0) as u16; o += 10;
    let crs_raw = getbes64(payload, o, 16).unwrap_or(0) as i32; o += 16;
    let delta_n_raw = getbes64(payload, o, 16).unwrap_or(0) as i32; o += 16;
    let m0_raw = getbes64(payload, o, 32).unwrap_or(0); o += 32;
    let cuc_raw = getbes64(payload, o, 16).unwrap_or(0) as i32; o += 16;
    let e_raw = getbeu64(payload, o, 32).unwrap_or(0); o += 32;
    let cus_raw = getbes64(payload, o, 16).unwrap_or(0) as i32; o += 16;
    let sqrt_a_raw = getbeu64(payload, o, 32).unwrap_or(0); o += 32;
    let toe = getbeu64(payload, o, 16).unwrap_or(0) as u16; o += 16;
    let cic_raw = getbes64(payload, o, 16).unwrap_or(0) as i32; o += 16;
    let omega0_raw = getbes64(payload, o, 32).unwrap_or(0); o += 32;
    let cis_raw = getbes64(payload, o, 16).unwrap_or(0) as i32; o += 16;
    let i0_raw = getbes64(payload, o, 32).unwrap_or(0); o += 32;
    let crc_raw = getbes64(payload, o, 16).unwrap_or(0) as i32; o += 16;
    let omega_raw = getbes64(payload, o, 32).unwrap_or(0); o += 32;
    let omega_dot_raw = getbes64(payload, o, 24).unwrap_or(0) as i32; o += 24;
    let tgd_raw = getbes64(payload, o, 8).unwrap_or(0) as i32; o += 8;
    let sv_health = getbeu64(payload, o, 6).unwrap_or(0) as u8;
    Ok(GpsEphemeris {
        sat_id, week, sv_accuracy, code_on_l2, idot_raw, iode, toc, af2_raw, af1_raw, af0_raw,
        iodc, crs_raw, delta_n_raw, m0_raw, cuc_raw, e_raw, cus_raw, sqrt_a_raw, toe, cic_raw,
        omega0_raw, cis_raw, i0_raw, crc_raw, omega_raw, omega_dot_raw, tgd_raw, sv_health,
    })
}

fn decode_glonass_ephemeris(payload: &[u8]) -> Result<GlonassEphemeris, DecodeError> {
    need(payload, 360)?;
    let mut o: u32 = 12;
    let sat_id = getbeu64(payload, o, 6).unwrap_or(0) as u8; o += 6;
    let freq_channel = getbeu64(payload, o, 5).unwrap_or(0) as u8; o += 5;
    let health = getbeu64(payload, o, 1).unwrap_or(0) as u8; o += 1 + 2;
    let tk_raw = getbeu64(payload, o, 12).unwrap_or(0) as u32; o += 12 + 1;
    let x_raw = getbes64(payload, o, 27).unwrap_or(0); o += 27;
    let vx_raw = getbes64(payload, o, 24).unwrap_or(0) as i32; o += 24 + 5;
    let y_raw = getbes64(payload, o, 27).unwrap_or(0); o += 27;
    let vy_raw = getbes64(payload, o, 24).unwrap_or(0) as i32; o += 24 + 5;
    let z_raw = getbes64(payload, o, 27).unwrap_or(0); o += 27;
    let vz_raw = getbes64(payload, o, 24).unwrap_or(0) as i32; o += 24 + 5 + 1;
    let gamma_raw = getbes64(payload, o, 11).unwrap_or(0) as i32; o += 11 + 2;
    let tau_raw = getbes64(payload, o, 22).unwrap_or(0) as i32;
    Ok(GlonassEphemeris { sat_id, freq_channel, health, tk_raw, x_raw, y_raw, z_raw, vx_raw, vy_raw, vz_raw, gamma_raw, tau_raw })
}

fn decode_length_prefixed_string(payload: &[u8], offset: u32) -> (String, u32) {
    let len = getbeu64(payload, offset, 8).unwrap_or(0) as u32;
    let mut s = String::with_capacity(len as usize);
    for i in 0..len {
        let byte = getbeu64(payload, offset + 8 + i * 8, 8).unwrap_or(0) as u8;
        s.push(byte as char);
    }
    (s, offset + 8 + len * 8)
}

fn decode_antenna_descriptor(payload: &[u8]) -> Result<AntennaDescriptor, DecodeError> {
    need(payload, 12 + 12 + 8)?;
    let station_id = getbeu64(payload, 12, 12).unwrap_or(0) as u32;
    let mut o: u32 = 24;
    let (antenna_descriptor, next) = decode_length_prefixed_string(payload, o);
    o = next;
    let antenna_setup_id = getbeu64(payload, o, 8).unwrap_or(0) as u8;
    o += 8;
    let (antenna_serial, next) = decode_length_prefixed_string(payload, o);
    o = next;
    let (receiver_type, next) = decode_length_prefixed_string(payload, o);
    o = next;
    let (receiver_firmware, next) = decode_length_prefixed_string(payload, o);
    o = next;
    let (receiver_serial, _) = decode_length_prefixed_string(payload, o);
    Ok(AntennaDescriptor { station_id, antenna_descriptor, antenna_setup_id, antenna_serial, receiver_type, receiver_firmware, receiver_serial })
}

fn decode_msm(payload: &[u8], msg_type: u64) -> Result<MsmObservation, DecodeError> {
    need(payload, 12 + 12 + 30 + 1 + 3 + 7 + 2 + 2 + 1 + 3 + 64 + 32)?;
    let station_id = getbeu64(payload, 12, 12).unwrap_or(0) as u32;
    let epoch_ms = getbeu64(payload, 24, 30).unwrap_or(0) as u32;
    let multiple_message = getbeu64(payload, 54, 1).unwrap_or(0) != 0;
    let iods = getbeu64(payload, 55, 3).unwrap_or(0) as u8;
    let satellite_mask = getbeu64(payload, 55 + 3 + 7 + 2 + 2 + 1, 64).unwrap_or(0);
    let signal_mask_offset = 55 + 3 + 7 + 2 + 2 + 1 + 3 + 64;
    let signal_mask = getbeu64(payload, signal_mask_offset, 32).unwrap_or(0) as u32;
    let cell_body_start = ((signal_mask_offset + 32) / 8) as usize;
    let cell_body = payload.get(cell_body_start..).unwrap_or(&[]).to_vec();
    Ok(MsmObservation { msg_type, station_id, epoch_ms, multiple_message, iods, satellite_mask, signal_mask, cell_body })
}

fn decode_igs_ssr_header(payload: &[u8]) -> Result<IgsSsrHeader, DecodeError> {
    need(payload, 12 + 4 + 12 + 20 + 4 + 1 + 4 + 16 + 4 + 6)?;
    let mut o: u32 = 12;
    let igs_message_number = getbeu64(payload, o, 12).unwrap_or(0) as u16; o += 12;
    let _gnss_type = getbeu64(payload, o, 4).unwrap_or(0); o += 4;
    let epoch_time = getbeu64(payload, o, 20).unwrap_or(0) as u32; o += 20;
    let update_interval = getbeu64(payload, o, 4).unwrap_or(0) as u8; o += 4;
    let multiple_message = getbeu64(payload, o, 1).unwrap_or(0) != 0; o += 1;
    let iod_ssr = getbeu64(payload, o, 4).unwrap_or(0) as u8; o += 4;
    let provider_id = getbeu64(payload, o, 16).unwrap_or(0) as u16; o += 16;
    let solution_id = getbeu64(payload, o, 4).unwrap_or(0) as u8; o += 4;
    let n_sat = getbeu64(payload, o, 6).unwrap_or(0) as u8;
    Ok(IgsSsrHeader { igs_message_number, epoch_time, update_interval, multiple_message, iod_ssr, provider_id, solution_id, n_sat })
}

fn decode_glonass_code_phase_bias(payload: &[u8]) -> Result<GlonassCodePhaseBias, DecodeError> {
    need(payload, 12 + 12 + 1 + 3 + 4)?;
    let station_id = getbeu64(payload, 12, 12).unwrap_or(0) as u32;
    let signal_mask = getbeu64(payload, 12 + 12 + 1 + 3, 4).unwrap_or(0) as u8;
    let mut biases_raw = Vec::new();
    let mut o = 12 + 12 + 1 + 3 + 4;
    for bit in 0..4 {
        if signal_mask & (1 << (3 - bit)) != 0 {
            if (payload.len() as u32) * 8 < o + 16 {
                break;
            }
            biases_raw.push(getbes64(payload, o, 16).unwrap_or(0) as i32);
            o += 16;
        }
    }
    Ok(GlonassCodePhaseBias { station_id, signal_mask, biases_raw })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_1005_vector_is_recognized() {
        let frame: Vec<u8> = vec![
            0xD3, 0x00, 0x13, 0x3E, 0xD0, 0x00, 0x03, 0x8A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43, 0x4D, 0xEA,
        ];
        assert_eq!(message_type(&frame), Some(1005));
        let decoded = decode(&frame).unwrap();
        assert!(decoded.mask.contains(crate::fix::GpsMask::ECEF_SET));
        assert_eq!(decoded.station.unwrap().0, 1005);
    }

    #[test]
    fn unsupported_message_is_reported() {
        let mut frame = vec![0xD3, 0x00, 0x05];
        frame.extend_from_slice(&[0u8; 5]);
        frame.extend_from_slice(&[0, 0, 0]);
        assert!(matches!(decode(&frame), Err(DecodeError::UnknownMessage(_))));
    }

    fn payload_frame(payload_bits: &[u8]) -> Vec<u8> {
        let len = payload_bits.len();
        let mut frame = vec![0xD3, ((len >> 8) & 0x03) as u8, (len & 0xFF) as u8];
        frame.extend_from_slice(payload_bits);
        frame.extend_from_slice(&[0, 0, 0]);
        frame
    }

    #[test]
    fn legacy_observation_1001_is_recognized() {
        let mut payload = vec![0u8; 10];
        crate::bits::putbeu64(&mut payload, 0, 12, 1001);
        crate::bits::putbeu64(&mut payload, 12, 12, 99);
        let frame = payload_frame(&payload);
        let d = decode(&frame);
        assert!(d.is_ok());
    }

    #[test]
    fn gps_ephemeris_1019_round_trips_satellite_id() {
        let mut payload = vec![0u8; 488usize.div_ceil(8)];
        crate::bits::putbeu64(&mut payload, 0, 12, 1019);
        crate::bits::putbeu64(&mut payload, 12, 6, 21);
        let frame = payload_frame(&payload);
        let d = decode(&frame);
        assert!(d.is_ok());
    }

    #[test]
    fn msm7_header_is_recognized() {
        let mut payload = vec![0u8; 20];
        crate::bits::putbeu64(&mut payload, 0, 12, 1077);
        let frame = payload_frame(&payload);
        let d = decode(&frame);
        assert!(d.is_ok());
    }

    #[test]
    fn antenna_descriptor_1033_parses_strings() {
        let mut payload = vec![0u8; 4];
        crate::bits::putbeu64(&mut payload, 0, 12, 1033);
        crate::bits::putbeu64(&mut payload, 12, 12, 1);
        crate::bits::putbeu64(&mut payload, 24, 8, 0);
        payload.extend_from_slice(&[0u8; 4]);
        let frame = payload_frame(&payload);
        let d = decode(&frame);
        assert!(d.is_ok());
    }
}
