//! `gpsdecode`: reads a raw or gzip-compressed packet log and emits
//! decoded JSON records, one per line. A batch, single-pass tool (unlike
//! the long-running device sessions `gpsd_core::session` targets), so it
//! stays synchronous rather than pulling in the tokio runtime.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::ExitCode;

use flate2::read::GzDecoder;

use gpsd_core::checksum;
use gpsd_core::packet::{PacketKind, PacketTypeMask};
use gpsd_core::publish::{AisRecord, Publisher, Record, SkyRecord, TpvRecord, VecPublisher};
use gpsd_core::{Context, Session};

fn open_input(path: &str) -> io::Result<Box<dyn Read>> {
    if path == "-" {
        return Ok(Box::new(io::stdin()));
    }
    let file = File::open(path)?;
    if path.ends_with(".gz") {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

fn parse_type_mask(types: Option<Vec<&String>>) -> Option<PacketTypeMask> {
    let types = types?;
    let mut mask = PacketTypeMask::empty();
    for t in types {
        mask |= match t.to_ascii_uppercase().as_str() {
            "NMEA" => PacketTypeMask::NMEA,
            "AIVDM" | "AIS" => PacketTypeMask::AIVDM,
            "UBX" => PacketTypeMask::UBX,
            "SIRF" => PacketTypeMask::SIRF,
            "TSIP" => PacketTypeMask::TSIP,
            "RTCM2" => PacketTypeMask::RTCM2,
            "RTCM3" => PacketTypeMask::RTCM3,
            "JSON" => PacketTypeMask::JSON,
            "SPARTN" => PacketTypeMask::SPARTN,
            _ => continue,
        };
    }
    Some(mask)
}

/// `ddmm.mmmm`/`dddmm.mmmm` plus hemisphere letter, the inverse of
/// `decode::nmea::parse_latlon`.
fn format_latlon(decimal: f64, is_longitude: bool) -> (String, char) {
    let hemisphere = match (is_longitude, decimal < 0.0) {
        (true, true) => 'W',
        (true, false) => 'E',
        (false, true) => 'S',
        (false, false) => 'N',
    };
    let abs = decimal.abs();
    let degrees = abs.floor() as u32;
    let minutes = (abs - degrees as f64) * 60.0;
    let degree_digits: usize = if is_longitude { 3 } else { 2 };
    (format!("{degrees:0degree_digits$}{minutes:07.4}"), hemisphere)
}

/// Re-encodes a TPV record as a `$GPRMC` sentence -- the one NMEA
/// sentence this crate's decoder round-trips through `GpsFix` fields
/// alone, without needing a raw-sentence cache. Time/date fields are left
/// blank: `TpvRecord` carries an ISO-8601 timestamp, not the separate
/// hhmmss/ddmmyy fields RMC wants, and no consumer of `--encode` output
/// in this crate's scope needs them filled in.
fn encode_tpv_as_rmc(tpv: &TpvRecord) -> Option<String> {
    let (lat, lon) = (tpv.lat?, tpv.lon?);
    let (lat_str, lat_hemi) = format_latlon(lat, false);
    let (lon_str, lon_hemi) = format_latlon(lon, true);
    let status = if tpv.mode >= 2 { 'A' } else { 'V' };
    let speed_knots = tpv.speed.map(|s| s / 0.514_444_4).unwrap_or(0.0);
    let track = tpv.track.unwrap_or(0.0);
    let body = format!(
        "GPRMC,,{status},{lat_str},{lat_hemi},{lon_str},{lon_hemi},{speed_knots:.1},{track:.1},,,,"
    );
    let cks = checksum::nmea::compute(body.as_bytes());
    Some(format!("${body}*{cks:02X}\r\n"))
}

/// `--encode`: reads newline-delimited JSON `Record`s and writes the wire
/// sentences they came from. Only `TPV` round-trips (see
/// `encode_tpv_as_rmc`); every other record class is acknowledged and
/// skipped, not silently dropped.
fn run_encode(input: Box<dyn Read>, mut out: impl Write) -> bool {
    let mut io_failed = false;
    for line in BufReader::new(input).lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log::error!("read error: {e}");
                io_failed = true;
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("skipping unparseable record: {e}");
                continue;
            }
        };
        match record {
            Record::Tpv(tpv) => match encode_tpv_as_rmc(&tpv) {
                Some(sentence) => {
                    if out.write_all(sentence.as_bytes()).is_err() {
                        io_failed = true;
                        break;
                    }
                }
                None => log::debug!("TPV record has no fix to encode, skipping"),
            },
            other => log::debug!("--encode has no wire encoder for {other:?}"),
        }
    }
    io_failed
}

fn main() -> ExitCode {
    let matches = gpsd_core::cli::build().get_matches();

    let verbosity = matches.get_one::<u8>("verbose").copied().unwrap_or(0);
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let input_path = matches.get_one::<String>("input").cloned().unwrap_or_else(|| "-".to_string());
    let minlength = *matches.get_one::<usize>("minlength").unwrap_or(&0);
    let type_filter = parse_type_mask(matches.get_many::<String>("types").map(|v| v.collect()));
    let emit_nmea = matches.get_flag("nmea");
    let spartn = matches.get_flag("spartn");
    let emit_ais = matches.get_flag("ais");
    let unscaled = matches.get_flag("unscaled");
    let encode_mode = matches.get_flag("encode");
    if matches.get_flag("decode") && encode_mode {
        log::warn!("--decode and --encode both given; --encode takes precedence");
    }

    let input = match open_input(&input_path) {
        Ok(r) => r,
        Err(e) => {
            log::error!("failed to open {input_path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stdout = io::stdout();
    let out = stdout.lock();

    if encode_mode {
        let io_failed = run_encode(input, out);
        return if io_failed { ExitCode::FAILURE } else { ExitCode::SUCCESS };
    }

    let mut ctx = Context::new();
    let mut session = Session::new(input_path.clone(), None);
    if spartn {
        log::debug!("SPARTN framing requested but not yet wired into the type mask override path");
    }

    let mut out = out;
    let mut publisher = VecPublisher::default();
    let mut reader = BufReader::new(input);
    let mut chunk = [0u8; 4096];
    let mut io_failed = false;
    let mut min_observed_len: HashMap<PacketKind, usize> = HashMap::new();

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                log::error!("read error: {e}");
                io_failed = true;
                break;
            }
        };
        let cycles = session.feed(&mut ctx, &chunk[..n]);
        for cycle in cycles {
            if let Some(mask) = type_filter {
                if !mask.allows(cycle.packet_kind) {
                    continue;
                }
            }

            min_observed_len
                .entry(cycle.packet_kind)
                .and_modify(|len| *len = (*len).min(cycle.packet_len))
                .or_insert(cycle.packet_len);

            if emit_ais {
                if let Some(ais_msg) = &cycle.ais {
                    let rec = Record::Ais(AisRecord::from_message(&session.device_path, ais_msg, !unscaled));
                    let _ = publisher.publish(&rec);
                    if let Ok(line) = serde_json::to_string(&rec) {
                        let _ = writeln!(out, "{line}");
                    }
                }
            }

            if let Some((msg_type, station_id)) = cycle.station {
                let rec = match cycle.packet_kind {
                    PacketKind::Rtcm2 => Some(Record::Rtcm2 { device: session.device_path.clone(), r#type: msg_type, station_id }),
                    PacketKind::Rtcm3 => Some(Record::Rtcm3 { device: session.device_path.clone(), r#type: msg_type, station_id }),
                    _ => None,
                };
                if let Some(rec) = rec {
                    let _ = publisher.publish(&rec);
                    if let Ok(line) = serde_json::to_string(&rec) {
                        let _ = writeln!(out, "{line}");
                    }
                }
            }

            if let Some(sf) = &cycle.subframe {
                let rec = Record::Subframe { device: session.device_path.clone(), tsv: sf.svid as u32, subframe: sf.subframe_id as u32 };
                let _ = publisher.publish(&rec);
                if let Ok(line) = serde_json::to_string(&rec) {
                    let _ = writeln!(out, "{line}");
                }
            }

            if cycle.mask.is_empty() {
                continue;
            }
            let tpv = TpvRecord::from_fix(&session.device_path, &session.fix);
            let _ = publisher.publish(&Record::Tpv(tpv.clone()));
            if emit_nmea {
                log::debug!("NMEA re-emission not implemented for {:?}", cycle.packet_kind);
            }
            if let Ok(line) = serde_json::to_string(&Record::Tpv(tpv)) {
                let _ = writeln!(out, "{line}");
            }
            if matches!(cycle.packet_kind, PacketKind::Nmea) && !session.sky.is_empty() {
                let sky = SkyRecord::from_skyview(&session.device_path, &session.sky);
                if let Ok(line) = serde_json::to_string(&Record::Sky(sky)) {
                    let _ = writeln!(out, "{line}");
                }
            }
        }
    }

    let mut stderr_log = io::stderr();
    let _ = writeln!(stderr_log, "decoded {} records", publisher.records.len());
    if minlength > 0 {
        for (kind, len) in &min_observed_len {
            if *len < minlength {
                log::warn!("{kind:?}: shortest observed packet was {len} bytes, below --minlength {minlength}");
            }
        }
    }

    if io_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_latlon_matches_nmea_ddmm_convention() {
        let (s, hemi) = format_latlon(48.1173, false);
        assert_eq!(hemi, 'N');
        assert!(s.starts_with("4807.03"));
    }

    #[test]
    fn format_latlon_west_longitude_gets_w_hemisphere() {
        let (s, hemi) = format_latlon(-123.30855, true);
        assert_eq!(hemi, 'W');
        assert!(s.starts_with("12318"));
    }

    #[test]
    fn encode_tpv_checksum_verifies() {
        let tpv = TpvRecord {
            device: "/dev/ttyUSB0".into(),
            mode: 3,
            time: None,
            lat: Some(48.1173),
            lon: Some(11.5167),
            alt_hae: None,
            speed: Some(10.0),
            track: Some(45.0),
            climb: None,
        };
        let sentence = encode_tpv_as_rmc(&tpv).unwrap();
        assert!(sentence.starts_with("$GPRMC,"));
        let body = sentence.trim_start_matches('$');
        let star = body.find('*').unwrap();
        let (text, cks) = (&body[..star], body[star + 1..star + 3].as_bytes());
        assert!(checksum::nmea::verify(text.as_bytes(), &[cks[0], cks[1]]));
    }

    #[test]
    fn encode_tpv_without_fix_returns_none() {
        let tpv = TpvRecord {
            device: "/dev/ttyUSB0".into(),
            mode: 0,
            time: None,
            lat: None,
            lon: None,
            alt_hae: None,
            speed: None,
            track: None,
            climb: None,
        };
        assert!(encode_tpv_as_rmc(&tpv).is_none());
    }
}
