//! NMEA 0183 sentence decoding: GGA, RMC, GSA, GSV, VTG, GLL.
//!
//! Talker ID (first two letters after `$`, e.g. `GP`/`GN`/`GL`) is stripped
//! and ignored for dispatch; only the three-letter sentence id selects the
//! decoder, matching gpsd's `nmea_parse` table dispatch.

use itertools::Itertools;

use super::{DecodeError, DecodeResult, Decoded};
use crate::fix::{FixMode, FixStatus, GpsMask};
use crate::sky::{Gnss, SatKey};

/// Strips framing (`$`/`!`, trailing `*CC\r\n`) and splits on commas.
fn fields(payload: &[u8]) -> Result<Vec<String>, DecodeError> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| DecodeError::OutOfRange("non-UTF8 NMEA sentence".into()))?;
    let body = text.trim_start_matches(['$', '!']);
    let body = match body.find('*') {
        Some(star) => &body[..star],
        None => body.trim_end(),
    };
    Ok(body.split(',').map(|s| s.to_string()).collect())
}

fn parse_f64(field: &str) -> Option<f64> {
    if field.is_empty() {
        None
    } else {
        field.parse().ok()
    }
}

/// NMEA lat/lon are `ddmm.mmmm` (or `dddmm.mmmm` for longitude) plus a
/// hemisphere letter: whole degrees are everything but the trailing two
/// integer digits, the remainder is minutes.
fn parse_latlon(value: &str, hemisphere: &str, _lon: bool) -> Option<f64> {
    let raw: f64 = value.parse().ok()?;
    let whole_degrees = (raw / 100.0).floor();
    let minutes = raw - whole_degrees * 100.0;
    let mut decimal = whole_degrees + minutes / 60.0;
    if hemisphere == "S" || hemisphere == "W" {
        decimal = -decimal;
    }
    Some(decimal)
}

pub fn decode(payload: &[u8]) -> DecodeResult {
    let f = fields(payload)?;
    if f.is_empty() || f[0].len() < 3 {
        return Err(DecodeError::TooShort { need: 1, have: 0 });
    }
    let sentence_id = &f[0][f[0].len() - 3..];
    match sentence_id {
        "GGA" => decode_gga(&f),
        "RMC" => decode_rmc(&f),
        "GSA" => decode_gsa(&f),
        "GSV" => decode_gsv(&f),
        "VTG" => decode_vtg(&f),
        "GLL" => decode_gll(&f),
        other => Err(DecodeError::UnknownMessage(other.to_string())),
    }
}

fn decode_gga(f: &[String]) -> DecodeResult {
    if f.len() < 10 {
        return Err(DecodeError::TooShort { need: 10, have: f.len() });
    }
    let mut out = Decoded::empty();
    let mut mask = GpsMask::empty();

    if let (Some(lat), Some(lon)) = (
        parse_latlon(&f[2], &f[3], false),
        parse_latlon(&f[4], &f[5], true),
    ) {
        out.fix.latitude = lat;
        out.fix.longitude = lon;
        mask |= GpsMask::LATLON_SET;
    }
    if let Ok(quality) = f[6].parse::<u8>() {
        out.fix.status = match quality {
            0 => FixStatus::Unknown,
            1 => FixStatus::Gps,
            2 => FixStatus::Dgps,
            4 => FixStatus::Rtk,
            5 => FixStatus::FloatRtk,
            6 => FixStatus::Dr,
            _ => FixStatus::Unknown,
        };
        mask |= GpsMask::STATUS_SET;
        if quality > 0 {
            out.fix.mode = FixMode::Fix3D;
            mask |= GpsMask::MODE_SET;
        }
    }
    if let Ok(used) = f[7].parse::<u32>() {
        out.fix.satellites_used = used;
        mask |= GpsMask::USED_SET;
    }
    if let Some(alt) = parse_f64(&f[9]) {
        out.fix.altitude_msl = alt;
        mask |= GpsMask::ALTITUDE_SET;
    }
    out.mask = mask;
    Ok(out)
}

fn decode_rmc(f: &[String]) -> DecodeResult {
    if f.len() < 10 {
        return Err(DecodeError::TooShort { need: 10, have: f.len() });
    }
    let mut out = Decoded::empty();
    let mut mask = GpsMask::empty();

    let valid = f[2] == "A";
    if valid {
        if let (Some(lat), Some(lon)) = (
            parse_latlon(&f[3], &f[4], false),
            parse_latlon(&f[5], &f[6], true),
        ) {
            out.fix.latitude = lat;
            out.fix.longitude = lon;
            mask |= GpsMask::LATLON_SET;
        }
    }
    if let Some(knots) = parse_f64(&f[7]) {
        out.fix.speed = knots * 0.514_444_4;
        mask |= GpsMask::SPEED_SET;
    }
    if let Some(track) = parse_f64(&f[8]) {
        out.fix.track = track;
        mask |= GpsMask::TRACK_SET;
    }
    out.fix.status = if valid { FixStatus::Gps } else { FixStatus::Unknown };
    mask |= GpsMask::STATUS_SET;
    out.mask = mask;
    Ok(out)
}

fn decode_gsa(f: &[String]) -> DecodeResult {
    if f.len() < 17 {
        return Err(DecodeError::TooShort { need: 17, have: f.len() });
    }
    let mut out = Decoded::empty();
    let mut mask = GpsMask::empty();
    out.fix.mode = match f[2].as_str() {
        "2" => FixMode::Fix2D,
        "3" => FixMode::Fix3D,
        _ => FixMode::NoFix,
    };
    mask |= GpsMask::MODE_SET;
    for sv_field in &f[3..15] {
        if let Ok(sv) = sv_field.parse::<u8>() {
            out.sky_updates.push(SatKey { gnss: Gnss::Gps, sv_id: sv, sig_id: 0 });
        }
    }
    out.mask = mask;
    Ok(out)
}

fn decode_gsv(f: &[String]) -> DecodeResult {
    if f.len() < 4 {
        return Err(DecodeError::TooShort { need: 4, have: f.len() });
    }
    let mut out = Decoded::empty();
    // Each satellite occupies a fixed 4-field group (PRN, elevation,
    // azimuth, SNR); trailing groups may be short on the sentence's last
    // fragment, so partial chunks are simply skipped rather than padded.
    for group in &f[4..].iter().chunks(4) {
        let group: Vec<&String> = group.collect();
        if group.len() < 4 {
            break;
        }
        if let Ok(sv) = group[0].parse::<u8>() {
            out.sky_updates.push(SatKey { gnss: Gnss::Gps, sv_id: sv, sig_id: 0 });
        }
    }
    out.mask = GpsMask::SATELLITE_SET;
    Ok(out)
}

fn decode_vtg(f: &[String]) -> DecodeResult {
    if f.len() < 8 {
        return Err(DecodeError::TooShort { need: 8, have: f.len() });
    }
    let mut out = Decoded::empty();
    let mut mask = GpsMask::empty();
    if let Some(track) = parse_f64(&f[1]) {
        out.fix.track = track;
        mask |= GpsMask::TRACK_SET;
    }
    if let Some(kph) = parse_f64(&f[7]) {
        out.fix.speed = kph / 3.6;
        mask |= GpsMask::SPEED_SET;
    }
    out.mask = mask;
    Ok(out)
}

/// `$--GLL,lat,N/S,lon,E/W,hhmmss.ss,status,mode*CC` -- position and status
/// only, no altitude/speed/course fields.
fn decode_gll(f: &[String]) -> DecodeResult {
    if f.len() < 7 {
        return Err(DecodeError::TooShort { need: 7, have: f.len() });
    }
    let mut out = Decoded::empty();
    let mut mask = GpsMask::empty();

    let valid = f[6] == "A";
    if valid {
        if let (Some(lat), Some(lon)) = (
            parse_latlon(&f[1], &f[2], false),
            parse_latlon(&f[3], &f[4], true),
        ) {
            out.fix.latitude = lat;
            out.fix.longitude = lon;
            mask |= GpsMask::LATLON_SET;
        }
    }
    out.fix.status = if valid { FixStatus::Gps } else { FixStatus::Unknown };
    mask |= GpsMask::STATUS_SET;
    out.mask = mask;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gga_parses_latlon_and_altitude() {
        let sentence = b"$GPGGA,172814.0,3723.46587704,N,12202.26957864,W,2,6,1.2,18.893,M,-25.669,M,2.0,0031*4F\r\n";
        let d = decode(sentence).unwrap();
        assert!(d.mask.contains(GpsMask::LATLON_SET));
        assert!((d.fix.latitude - 37.391_097_950_666_67).abs() < 1e-6);
        assert!(d.fix.longitude < 0.0);
        assert!((d.fix.altitude_msl - 18.893).abs() < 1e-9);
    }

    #[test]
    fn rmc_invalid_status_skips_position() {
        let sentence = b"$GPRMC,123519,V,,,,,022.4,084.4,230394,003.1,W*6A\r\n";
        let d = decode(sentence).unwrap();
        assert!(!d.mask.contains(GpsMask::LATLON_SET));
        assert_eq!(d.fix.status, FixStatus::Unknown);
    }

    #[test]
    fn rmc_valid_computes_speed_in_mps() {
        let sentence = b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n";
        let d = decode(sentence).unwrap();
        assert!(d.mask.contains(GpsMask::SPEED_SET));
        assert!((d.fix.speed - 22.4 * 0.514_444_4).abs() < 1e-6);
    }

    #[test]
    fn gsa_reports_mode_and_prns() {
        let sentence = b"$GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1*39\r\n";
        let d = decode(sentence).unwrap();
        assert_eq!(d.fix.mode, FixMode::Fix3D);
        assert!(d.sky_updates.contains(&SatKey { gnss: Gnss::Gps, sv_id: 4, sig_id: 0 }));
    }

    #[test]
    fn gsv_groups_fields_into_satellites() {
        let sentence = b"$GPGSV,3,1,11,03,03,111,00,04,15,270,00,06,01,010,00,13,06,292,00*74\r\n";
        let d = decode(sentence).unwrap();
        assert!(d.mask.contains(GpsMask::SATELLITE_SET));
        assert_eq!(d.sky_updates.len(), 4);
        assert!(d.sky_updates.contains(&SatKey { gnss: Gnss::Gps, sv_id: 3, sig_id: 0 }));
        assert!(d.sky_updates.contains(&SatKey { gnss: Gnss::Gps, sv_id: 13, sig_id: 0 }));
    }

    #[test]
    fn unknown_sentence_is_reported() {
        let sentence = b"$GPZZZ,1,2,3*00\r\n";
        assert!(matches!(decode(sentence), Err(DecodeError::UnknownMessage(_))));
    }

    #[test]
    fn gll_parses_latlon_when_valid() {
        let sentence = b"$GPGLL,4807.038,N,01131.000,E,123519,A*2C\r\n";
        let d = decode(sentence).unwrap();
        assert!(d.mask.contains(GpsMask::LATLON_SET));
        assert!((d.fix.latitude - 48.1173).abs() < 1e-4);
        assert_eq!(d.fix.status, FixStatus::Gps);
    }

    #[test]
    fn gll_invalid_status_skips_position() {
        let sentence = b"$GPGLL,4807.038,N,01131.000,E,123519,V*3F\r\n";
        let d = decode(sentence).unwrap();
        assert!(!d.mask.contains(GpsMask::LATLON_SET));
        assert_eq!(d.fix.status, FixStatus::Unknown);
    }
}
