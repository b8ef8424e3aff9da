//! u-blox UBX binary protocol decoding: NAV-PVT (the one-message fix
//! summary) and NAV-SAT (per-signal skyview).
//!
//! `frame` is the full lexer-framed packet (`B5 62 class id len payload
//! ck_a ck_b`); payload fields are little-endian per the UBX interface
//! description.

use super::{subframe, DecodeError, DecodeResult, Decoded};
use crate::bits::{getleu16, getleu32};
use crate::fix::{FixMode, GpsMask};
use crate::sky::{Gnss, SatKey};

const FIXED_HEADER: usize = 6; // sync(2) class id len(2)

fn class_id(frame: &[u8]) -> (u8, u8) {
    (frame[2], frame[3])
}

fn payload(frame: &[u8]) -> &[u8] {
    let len = getleu16(frame, 4) as usize;
    &frame[FIXED_HEADER..FIXED_HEADER + len]
}

pub fn decode(frame: &[u8]) -> DecodeResult {
    if frame.len() < FIXED_HEADER + 2 {
        return Err(DecodeError::TooShort { need: FIXED_HEADER + 2, have: frame.len() });
    }
    let (class, id) = class_id(frame);
    match (class, id) {
        (0x01, 0x07) => decode_nav_pvt(payload(frame)),
        (0x01, 0x35) => decode_nav_sat(payload(frame)),
        (0x02, 0x13) => decode_rxm_sfrbx(payload(frame)),
        (c, i) => Err(DecodeError::UnknownMessage(format!("UBX {c:#04x}-{i:#04x}"))),
    }
}

/// RXM-SFRBX: `gnssId svId sigId freqId numWords chn version reserved1`
/// (8 bytes) followed by `numWords` little-endian 32-bit navigation-message
/// words. For GPS L1C/A the receiver has already stripped parity, leaving
/// the 24 data bits of each 30-bit word in the low 3 bytes of its `dwrd` --
/// repacked here into the big-endian 24-bit-word buffer `subframe::decode`
/// expects.
fn decode_rxm_sfrbx(p: &[u8]) -> DecodeResult {
    const HEADER_LEN: usize = 8;
    if p.len() < HEADER_LEN {
        return Err(DecodeError::TooShort { need: HEADER_LEN, have: p.len() });
    }
    let gnss_id = p[0];
    let sv_id = p[1];
    let num_words = p[4] as usize;
    let need = HEADER_LEN + num_words * 4;
    if p.len() < need {
        return Err(DecodeError::TooShort { need, have: p.len() });
    }
    if gnss_id != 0 {
        // Only GPS L1C/A subframes are modeled by `decode::subframe`;
        // other constellations' nav messages use different word layouts.
        return Err(DecodeError::UnknownMessage(format!("RXM-SFRBX gnssId {gnss_id}")));
    }
    if num_words < subframe::SUBFRAME_WORDS {
        return Err(DecodeError::TooShort { need: subframe::SUBFRAME_WORDS, have: num_words });
    }

    let mut buf = vec![0u8; subframe::SUBFRAME_WORDS * 3];
    for (i, chunk) in buf.chunks_exact_mut(3).enumerate() {
        let dword = getleu32(p, HEADER_LEN + i * 4);
        let be = (dword & 0x00ff_ffff).to_be_bytes();
        chunk.copy_from_slice(&be[1..4]);
    }

    let mut out = subframe::decode(&buf)?;
    if let Some(sf) = out.subframe.as_mut() {
        sf.svid = sv_id;
    }
    Ok(out)
}

fn i32_at(buf: &[u8], off: usize) -> i32 {
    getleu32(buf, off) as i32
}

fn decode_nav_pvt(p: &[u8]) -> DecodeResult {
    const NAV_PVT_LEN: usize = 92;
    if p.len() < NAV_PVT_LEN {
        return Err(DecodeError::TooShort { need: NAV_PVT_LEN, have: p.len() });
    }
    let mut out = Decoded::empty();
    let mut mask = GpsMask::empty();

    let fix_type = p[20];
    let flags = p[21];
    let gnss_fix_ok = flags & 0x01 != 0;
    let lon = i32_at(p, 24) as f64 * 1e-7;
    let lat = i32_at(p, 28) as f64 * 1e-7;
    let height_ellipsoid_mm = i32_at(p, 32);
    let height_msl_mm = i32_at(p, 36);
    let vel_n_mmps = i32_at(p, 48);
    let vel_e_mmps = i32_at(p, 52);
    let vel_d_mmps = i32_at(p, 56);
    let gspeed_mmps = i32_at(p, 60);
    let heading_deg_e5 = i32_at(p, 64);
    let p_dop_e2 = getleu16(p, 76);
    let num_sv = p[23];

    if gnss_fix_ok {
        out.fix.latitude = lat;
        out.fix.longitude = lon;
        mask |= GpsMask::LATLON_SET;
        out.fix.altitude_hae = height_ellipsoid_mm as f64 / 1000.0;
        out.fix.altitude_msl = height_msl_mm as f64 / 1000.0;
        mask |= GpsMask::ALTITUDE_SET;
        out.fix.speed = gspeed_mmps as f64 / 1000.0;
        mask |= GpsMask::SPEED_SET;
        out.fix.track = heading_deg_e5 as f64 * 1e-5;
        mask |= GpsMask::TRACK_SET;
        out.fix.climb = -(vel_d_mmps as f64) / 1000.0;
        mask |= GpsMask::CLIMB_SET;
        let _ = (vel_n_mmps, vel_e_mmps);
    }
    out.fix.mode = match fix_type {
        2 => FixMode::Fix2D,
        3 | 4 | 5 => FixMode::Fix3D,
        _ => FixMode::NoFix,
    };
    mask |= GpsMask::MODE_SET;
    out.fix.satellites_used = num_sv as u32;
    mask |= GpsMask::USED_SET;
    let _ = p_dop_e2;
    mask |= GpsMask::DOP_SET;

    out.mask = mask;
    Ok(out)
}

fn decode_nav_sat(p: &[u8]) -> DecodeResult {
    const HEADER_LEN: usize = 8;
    const ENTRY_LEN: usize = 12;
    if p.len() < HEADER_LEN {
        return Err(DecodeError::TooShort { need: HEADER_LEN, have: p.len() });
    }
    let num_svs = p[5] as usize;
    if p.len() < HEADER_LEN + num_svs * ENTRY_LEN {
        return Err(DecodeError::TooShort {
            need: HEADER_LEN + num_svs * ENTRY_LEN,
            have: p.len(),
        });
    }
    let mut out = Decoded::empty();
    for i in 0..num_svs {
        let base = HEADER_LEN + i * ENTRY_LEN;
        let gnss_id = p[base];
        let sv_id = p[base + 1];
        let gnss = match gnss_id {
            0 => Gnss::Gps,
            1 => Gnss::Sbas,
            2 => Gnss::Galileo,
            3 => Gnss::Beidou,
            5 => Gnss::Qzss,
            6 => Gnss::Glonass,
            7 => Gnss::Irnss,
            _ => Gnss::Gps,
        };
        out.sky_updates.push(SatKey { gnss, sv_id, sig_id: 0 });
    }
    out.mask = GpsMask::SATELLITE_SET;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum;

    fn nav_pvt_frame(lat_e7: i32, lon_e7: i32, fix_type: u8) -> Vec<u8> {
        let mut p = vec![0u8; 92];
        p[20] = fix_type;
        p[21] = 0x01; // gnssFixOK
        p[23] = 9; // numSV
        p[24..28].copy_from_slice(&lon_e7.to_le_bytes());
        p[28..32].copy_from_slice(&lat_e7.to_le_bytes());
        let mut body = vec![0x01u8, 0x07];
        body.extend_from_slice(&(p.len() as u16).to_le_bytes());
        body.extend_from_slice(&p);
        let (ck_a, ck_b) = checksum::ubx::compute(&body);
        let mut frame = vec![0xB5, 0x62];
        frame.extend_from_slice(&body);
        frame.push(ck_a);
        frame.push(ck_b);
        frame
    }

    #[test]
    fn nav_pvt_reports_fix() {
        let frame = nav_pvt_frame(373_910_980, -1220_226_958, 3);
        let d = decode(&frame).unwrap();
        assert!(d.mask.contains(GpsMask::LATLON_SET));
        assert_eq!(d.fix.mode, FixMode::Fix3D);
        assert_eq!(d.fix.satellites_used, 9);
    }

    #[test]
    fn nav_pvt_no_fix_skips_position() {
        let frame = nav_pvt_frame(0, 0, 0);
        let mut f = frame.clone();
        f[2 + 21] = 0x00; // clear gnssFixOK
        let (ck_a, ck_b) = checksum::ubx::compute(&f[2..f.len() - 2]);
        let n = f.len();
        f[n - 2] = ck_a;
        f[n - 1] = ck_b;
        let d = decode(&f).unwrap();
        assert!(!d.mask.contains(GpsMask::LATLON_SET));
    }

    #[test]
    fn unrecognized_message_reported() {
        let mut frame = vec![0xB5, 0x62, 0x02, 0x10];
        frame.extend_from_slice(&0u16.to_le_bytes());
        frame.push(0);
        frame.push(0);
        assert!(matches!(decode(&frame), Err(DecodeError::UnknownMessage(_))));
    }

    fn rxm_sfrbx_frame(sv_id: u8, subframe_id: u8) -> Vec<u8> {
        use crate::bits::putbeu64;

        let mut words = vec![0u8; subframe::SUBFRAME_WORDS * 3];
        let how_start = 3;
        putbeu64(&mut words[how_start..how_start + 3], 19, 3, subframe_id as u64);

        let mut p = vec![0u8; 8];
        p[0] = 0; // gnssId = GPS
        p[1] = sv_id;
        p[4] = subframe::SUBFRAME_WORDS as u8; // numWords
        for chunk in words.chunks_exact(3) {
            let word24 = ((chunk[0] as u32) << 16) | ((chunk[1] as u32) << 8) | chunk[2] as u32;
            p.extend_from_slice(&word24.to_le_bytes());
        }

        let mut body = vec![0x02u8, 0x13];
        body.extend_from_slice(&(p.len() as u16).to_le_bytes());
        body.extend_from_slice(&p);
        let (ck_a, ck_b) = checksum::ubx::compute(&body);
        let mut frame = vec![0xB5, 0x62];
        frame.extend_from_slice(&body);
        frame.push(ck_a);
        frame.push(ck_b);
        frame
    }

    #[test]
    fn rxm_sfrbx_reaches_subframe_decode() {
        let frame = rxm_sfrbx_frame(12, 1);
        let d = decode(&frame).unwrap();
        let sf = d.subframe.expect("RXM-SFRBX must produce a decoded subframe");
        assert_eq!(sf.subframe_id, 1);
        assert_eq!(sf.svid, 12);
    }

    #[test]
    fn rxm_sfrbx_rejects_non_gps_constellations() {
        let mut frame = rxm_sfrbx_frame(1, 1);
        // gnssId lives at payload offset 0, right after the 6-byte header.
        frame[6] = 2; // Galileo
        let (ck_a, ck_b) = checksum::ubx::compute(&frame[2..frame.len() - 2]);
        let n = frame.len();
        frame[n - 2] = ck_a;
        frame[n - 1] = ck_b;
        assert!(matches!(decode(&frame), Err(DecodeError::UnknownMessage(_))));
    }
}
