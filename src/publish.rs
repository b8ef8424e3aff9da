//! JSON publisher interface: the `class`-tagged records a `gpsd`-style
//! client sees on the `watch` stream, plus the policy/subscription
//! arguments a client can set to shape what it receives.

use serde::{Deserialize, Serialize};

use crate::decode::ais::AisMessage;
use crate::fix::{FixMode, GpsFix};
use crate::sky::SkyView;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum Record {
    #[serde(rename = "VERSION")]
    Version { release: String, rev: String, proto_major: u32, proto_minor: u32 },
    #[serde(rename = "TPV")]
    Tpv(TpvRecord),
    #[serde(rename = "SKY")]
    Sky(SkyRecord),
    #[serde(rename = "GST")]
    Gst(GstRecord),
    #[serde(rename = "ATT")]
    Att { device: String },
    #[serde(rename = "IMU")]
    Imu { device: String },
    #[serde(rename = "RAW")]
    Raw { device: String, rawdata: String },
    #[serde(rename = "AIS")]
    Ais(AisRecord),
    #[serde(rename = "RTCM2")]
    Rtcm2 { device: String, r#type: u32, station_id: u32 },
    #[serde(rename = "RTCM3")]
    Rtcm3 { device: String, r#type: u32, station_id: u32 },
    #[serde(rename = "SUBFRAME")]
    Subframe { device: String, tsv: u32, subframe: u32 },
    #[serde(rename = "PPS")]
    Pps(PpsRecord),
    #[serde(rename = "TOFF")]
    Toff { device: String, real_sec: i64, real_nsec: i64, clock_sec: i64, clock_nsec: i64 },
    #[serde(rename = "OSC")]
    Osc { device: String, running: bool, reference: bool, disciplined: bool, delta: f64 },
    #[serde(rename = "DEVICES")]
    Devices { devices: Vec<DeviceRecord> },
    #[serde(rename = "DEVICE")]
    Device(DeviceRecord),
    #[serde(rename = "WATCH")]
    Watch(WatchArgs),
    #[serde(rename = "POLICY")]
    Policy(PolicyRecord),
    #[serde(rename = "ERROR")]
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GstRecord {
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<f64>,
}

/// One decoded AIS message, shaped for the client the same way gpsd's own
/// `AIS` class is: position/voyage fields the client actually plots stay
/// at the top level rather than behind a nested `app`/variant tag, with
/// everything this message type didn't carry left `None`. `scaled`
/// mirrors the value of the policy bit that produced this record's units
/// (see `AisMessage::to_record`): when `false` the numeric fields below
/// are the wire's raw integers, not physical units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AisRecord {
    pub device: String,
    pub r#type: u32,
    pub mmsi: u32,
    pub scaled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shiptype: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imo: Option<u32>,
}

const LON_NOT_AVAILABLE: i32 = 181 * 600_000;
const LAT_NOT_AVAILABLE: i32 = 91 * 600_000;
const SOG_NOT_AVAILABLE: u16 = 1023;
const COG_NOT_AVAILABLE: u16 = 3600;
const HEADING_NOT_AVAILABLE: u16 = 511;

fn scaled_field(raw: i32, not_available: i32, scale: f64, scaled: bool) -> Option<f64> {
    if raw == not_available {
        None
    } else if scaled {
        Some(raw as f64 * scale)
    } else {
        Some(raw as f64)
    }
}

fn scaled_field_u(raw: u16, not_available: u16, scale: f64, scaled: bool) -> Option<f64> {
    if raw == not_available {
        None
    } else if scaled {
        Some(raw as f64 * scale)
    } else {
        Some(raw as f64)
    }
}

impl AisRecord {
    /// Builds a client-facing AIS record from a decoded message, applying
    /// the `scaled` policy bit (§9/§6): unscaled clients get the wire's
    /// raw integers back unchanged, scaled clients get physical units
    /// (degrees, knots) -- the decoder itself never performs this
    /// conversion, so every message type's geodetic/velocity fields are
    /// resolved here, once, at the publish boundary.
    pub fn from_message(device: &str, msg: &AisMessage, scaled: bool) -> Self {
        let mut rec = AisRecord {
            device: device.to_string(),
            r#type: msg.msg_type(),
            mmsi: msg.mmsi(),
            scaled,
            status: None,
            lat: None,
            lon: None,
            speed: None,
            course: None,
            heading: None,
            shipname: None,
            callsign: None,
            destination: None,
            shiptype: None,
            imo: None,
        };
        match msg {
            AisMessage::PositionReport { nav_status, sog_raw, lon_raw, lat_raw, cog_raw, heading_raw, .. } => {
                rec.status = Some(*nav_status);
                rec.lon = scaled_field(*lon_raw, LON_NOT_AVAILABLE, 1.0 / 600_000.0, scaled);
                rec.lat = scaled_field(*lat_raw, LAT_NOT_AVAILABLE, 1.0 / 600_000.0, scaled);
                rec.speed = scaled_field_u(*sog_raw, SOG_NOT_AVAILABLE, 0.1, scaled);
                rec.course = scaled_field_u(*cog_raw, COG_NOT_AVAILABLE, 0.1, scaled);
                rec.heading = scaled_field_u(*heading_raw, HEADING_NOT_AVAILABLE, 1.0, scaled);
            }
            AisMessage::ClassBPositionReport { sog_raw, lon_raw, lat_raw, cog_raw, heading_raw, .. } => {
                rec.lon = scaled_field(*lon_raw, LON_NOT_AVAILABLE, 1.0 / 600_000.0, scaled);
                rec.lat = scaled_field(*lat_raw, LAT_NOT_AVAILABLE, 1.0 / 600_000.0, scaled);
                rec.speed = scaled_field_u(*sog_raw, SOG_NOT_AVAILABLE, 0.1, scaled);
                rec.course = scaled_field_u(*cog_raw, COG_NOT_AVAILABLE, 0.1, scaled);
                rec.heading = scaled_field_u(*heading_raw, HEADING_NOT_AVAILABLE, 1.0, scaled);
            }
            AisMessage::ExtendedClassB { sog_raw, lon_raw, lat_raw, cog_raw, heading_raw, shipname, shiptype, .. } => {
                rec.lon = scaled_field(*lon_raw, LON_NOT_AVAILABLE, 1.0 / 600_000.0, scaled);
                rec.lat = scaled_field(*lat_raw, LAT_NOT_AVAILABLE, 1.0 / 600_000.0, scaled);
                rec.speed = scaled_field_u(*sog_raw, SOG_NOT_AVAILABLE, 0.1, scaled);
                rec.course = scaled_field_u(*cog_raw, COG_NOT_AVAILABLE, 0.1, scaled);
                rec.heading = scaled_field_u(*heading_raw, HEADING_NOT_AVAILABLE, 1.0, scaled);
                rec.shipname = Some(shipname.clone());
                rec.shiptype = Some(*shiptype);
            }
            AisMessage::BaseStation { lon_raw, lat_raw, .. } => {
                rec.lon = scaled_field(*lon_raw, LON_NOT_AVAILABLE, 1.0 / 600_000.0, scaled);
                rec.lat = scaled_field(*lat_raw, LAT_NOT_AVAILABLE, 1.0 / 600_000.0, scaled);
            }
            AisMessage::StaticAndVoyage { callsign, shipname, shiptype, destination, imo, .. } => {
                rec.callsign = Some(callsign.clone());
                rec.shipname = Some(shipname.clone());
                rec.shiptype = Some(*shiptype);
                rec.destination = Some(destination.clone());
                rec.imo = Some(*imo);
            }
            AisMessage::StaticDataReport { part_a, part_b, .. } => {
                rec.shipname = part_a.as_ref().map(|a| a.shipname.clone());
                if let Some(b) = part_b {
                    rec.callsign = Some(b.callsign.clone());
                    rec.shiptype = Some(b.shiptype);
                }
            }
            AisMessage::LongRangePositionReport { nav_status, lon_raw, lat_raw, sog_raw, cog_raw, .. } => {
                rec.status = Some(*nav_status);
                rec.lon = scaled_field(*lon_raw, LON_NOT_AVAILABLE, 1.0 / 600_000.0, scaled);
                rec.lat = scaled_field(*lat_raw, LAT_NOT_AVAILABLE, 1.0 / 600_000.0, scaled);
                rec.speed = scaled_field_u(*sog_raw as u16, 63, 1.0, scaled);
                rec.course = scaled_field_u(*cog_raw, 511, 1.0, scaled);
            }
            AisMessage::AidToNavigation { name, lon_raw, lat_raw, .. } => {
                rec.shipname = Some(name.clone());
                rec.lon = scaled_field(*lon_raw, LON_NOT_AVAILABLE, 1.0 / 600_000.0, scaled);
                rec.lat = scaled_field(*lat_raw, LAT_NOT_AVAILABLE, 1.0 / 600_000.0, scaled);
            }
            _ => {}
        }
        rec
    }
}

/// Mirrors the `pps_fix_t` data-model record (§3): the GPS-derived
/// top-of-second next to the local capture time the PPS thread observed
/// for it, published independently of (and without waiting on) the TPV
/// path per §5's ordering rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PpsRecord {
    pub device: String,
    pub real_sec: i64,
    pub real_nsec: i64,
    pub clock_sec: i64,
    pub clock_nsec: i64,
    pub precision: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leap: Option<i32>,
    pub sequence: u32,
}

/// The server's echo of the last `?POLICY={...}` a client sent, plus the
/// policy fields this server additionally recognizes (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub scaled: bool,
    pub split24: bool,
    pub raw: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TpvRecord {
    pub device: String,
    pub mode: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "altHAE")]
    pub alt_hae: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub climb: Option<f64>,
}

impl TpvRecord {
    pub fn from_fix(device: &str, fix: &GpsFix) -> Self {
        Self {
            device: device.to_string(),
            mode: match fix.mode {
                FixMode::NotSeen => 0,
                FixMode::NoFix => 1,
                FixMode::Fix2D => 2,
                FixMode::Fix3D => 3,
            },
            time: fix.time.map(|t| t.to_string()),
            lat: finite_or_none(fix.latitude),
            lon: finite_or_none(fix.longitude),
            alt_hae: finite_or_none(fix.altitude_hae),
            speed: finite_or_none(fix.speed),
            track: finite_or_none(fix.track),
            climb: finite_or_none(fix.climb),
        }
    }
}

fn finite_or_none(v: f64) -> Option<f64> {
    if v.is_finite() {
        Some(v)
    } else {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkySatellite {
    #[serde(rename = "PRN")]
    pub prn: u8,
    #[serde(skip_serializing_if = "Option::is_none", rename = "el")]
    pub elevation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "az")]
    pub azimuth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "ss")]
    pub snr: Option<f64>,
    pub used: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkyRecord {
    pub device: String,
    pub satellites: Vec<SkySatellite>,
}

impl SkyRecord {
    pub fn from_skyview(device: &str, sky: &SkyView) -> Self {
        Self {
            device: device.to_string(),
            satellites: sky
                .iter()
                .map(|e| SkySatellite {
                    prn: e.key.sv_id,
                    elevation: e.elevation,
                    azimuth: e.azimuth,
                    snr: e.snr,
                    used: e.used,
                })
                .collect(),
        }
    }
}

/// A client's subscription policy: what streams to enable/filter,
/// mirroring gpsd's `?WATCH={...}` command object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchArgs {
    pub enable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nmea: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split24: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pps: Option<bool>,
}

impl Default for WatchArgs {
    fn default() -> Self {
        Self {
            enable: true,
            json: Some(true),
            nmea: None,
            raw: None,
            scaled: None,
            timing: None,
            split24: None,
            device: None,
            pps: None,
        }
    }
}

/// Server-side filtering/quality policy applied before a record reaches
/// any subscriber (distinct from `WatchArgs`, which is per-client).
#[derive(Debug, Clone, Copy)]
pub struct PolicyArgs {
    pub min_fix_mode: FixMode,
    pub max_eph: f64,
    pub scaled: bool,
    pub split24: bool,
    pub raw: u8,
}

impl Default for PolicyArgs {
    fn default() -> Self {
        Self {
            min_fix_mode: FixMode::NotSeen,
            max_eph: f64::INFINITY,
            scaled: false,
            split24: false,
            raw: 0,
        }
    }
}

impl PolicyArgs {
    pub fn admits(&self, fix: &GpsFix) -> bool {
        fix.mode >= self.min_fix_mode && fix.eph_or_inf() <= self.max_eph
    }

    /// The server's acknowledgement record sent back after a `?POLICY={...}`
    /// is applied, per §6.
    pub fn to_record(self, device: Option<String>) -> PolicyRecord {
        PolicyRecord {
            scaled: self.scaled,
            split24: self.split24,
            raw: self.raw,
            device,
        }
    }
}

trait EphOrInf {
    fn eph_or_inf(&self) -> f64;
}

impl EphOrInf for GpsFix {
    fn eph_or_inf(&self) -> f64 {
        if self.epx.is_finite() && self.epy.is_finite() {
            (self.epx.powi(2) + self.epy.powi(2)).sqrt()
        } else {
            f64::INFINITY
        }
    }
}

/// A sink that records arrive at: the JSON line-protocol socket in
/// production, a `Vec<Record>` in tests.
pub trait Publisher {
    fn publish(&mut self, record: &Record) -> crate::error::GpsdResult<()>;
}

#[derive(Debug, Default)]
pub struct VecPublisher {
    pub records: Vec<Record>,
}

impl Publisher for VecPublisher {
    fn publish(&mut self, record: &Record) -> crate::error::GpsdResult<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tpv_drops_nan_fields_from_json() {
        let fix = GpsFix::new();
        let tpv = TpvRecord::from_fix("/dev/ttyUSB0", &fix);
        let json = serde_json::to_string(&Record::Tpv(tpv)).unwrap();
        assert!(!json.contains("NaN"));
        assert!(json.contains("\"class\":\"TPV\""));
    }

    #[test]
    fn watch_args_default_enables_json() {
        let w = WatchArgs::default();
        assert!(w.enable);
        assert_eq!(w.json, Some(true));
    }

    #[test]
    fn policy_rejects_low_mode_fixes() {
        let policy = PolicyArgs {
            min_fix_mode: FixMode::Fix3D,
            ..PolicyArgs::default()
        };
        let mut fix = GpsFix::new();
        fix.mode = FixMode::Fix2D;
        assert!(!policy.admits(&fix));
        fix.mode = FixMode::Fix3D;
        assert!(policy.admits(&fix));
    }

    #[test]
    fn vec_publisher_records_in_order() {
        let mut pub_ = VecPublisher::default();
        pub_.publish(&Record::Error { message: "a".into() }).unwrap();
        pub_.publish(&Record::Error { message: "b".into() }).unwrap();
        assert_eq!(pub_.records.len(), 2);
    }

    #[test]
    fn ais_record_tags_type_field_without_raw_keyword() {
        let rec = Record::Ais(AisRecord {
            device: "/dev/ttyUSB0".into(),
            r#type: 1,
            mmsi: 366892000,
            scaled: false,
            status: None,
            lat: None,
            lon: None,
            speed: None,
            course: None,
            heading: None,
            shipname: None,
            callsign: None,
            destination: None,
            shiptype: None,
            imo: None,
        });
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"class\":\"AIS\""));
        assert!(json.contains("\"type\":1"));
        assert!(!json.contains("r#type"));
    }

    #[test]
    fn ais_record_scales_position_when_policy_requests_it() {
        let msg = AisMessage::PositionReport {
            mmsi: 366892000,
            msg_type: 1,
            nav_status: 0,
            rot_raw: 0,
            sog_raw: 105,
            accuracy: true,
            lon_raw: -73_985_130,
            lat_raw: 40_714_270,
            cog_raw: 1280,
            heading_raw: 128,
            second: 30,
            maneuver: 0,
            raim: false,
            radio: 0,
        };
        let raw = AisRecord::from_message("/dev/ttyUSB0", &msg, false);
        assert_eq!(raw.lon, Some(-73_985_130.0));
        let physical = AisRecord::from_message("/dev/ttyUSB0", &msg, true);
        assert!((physical.lon.unwrap() - (-123.3085_5)).abs() < 0.01);
        assert!((physical.speed.unwrap() - 10.5).abs() < 1e-9);
    }

    #[test]
    fn ais_record_not_available_sentinels_become_none() {
        let msg = AisMessage::ClassBPositionReport {
            mmsi: 1,
            sog_raw: 1023,
            accuracy: false,
            lon_raw: 181 * 600_000,
            lat_raw: 91 * 600_000,
            cog_raw: 3600,
            heading_raw: 511,
            second: 60,
            raim: false,
            radio: 0,
        };
        let rec = AisRecord::from_message("/dev/ttyUSB0", &msg, true);
        assert!(rec.lon.is_none());
        assert!(rec.lat.is_none());
        assert!(rec.speed.is_none());
        assert!(rec.heading.is_none());
    }

    #[test]
    fn pps_record_round_trips_through_json() {
        let rec = Record::Pps(PpsRecord {
            device: "/dev/ttyUSB0".into(),
            real_sec: 1_700_000_000,
            real_nsec: 0,
            clock_sec: 1_700_000_000,
            clock_nsec: 1234,
            precision: -20,
            leap: Some(18),
            sequence: 7,
        });
        let json = serde_json::to_string(&rec).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        match back {
            Record::Pps(p) => assert_eq!(p.sequence, 7),
            other => panic!("expected PPS record, got {other:?}"),
        }
    }

    #[test]
    fn policy_to_record_carries_scaled_and_split24() {
        let policy = PolicyArgs { scaled: true, split24: true, raw: 1, ..PolicyArgs::default() };
        let rec = policy.to_record(Some("/dev/ttyUSB0".into()));
        assert!(rec.scaled);
        assert!(rec.split24);
        assert_eq!(rec.device.as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn devices_record_wraps_device_list() {
        let rec = Record::Devices {
            devices: vec![DeviceRecord { path: "/dev/ttyUSB0".into(), driver: Some("NMEA0183".into()), bps: Some(4800), activated: Some(true) }],
        };
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"class\":\"DEVICES\""));
    }
}
