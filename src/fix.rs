//! The accumulated position/velocity/time fix and its field-presence mask.
//!
//! Sentences/messages arrive piecemeal; each decoder contributes a partial
//! [`GpsFix`] plus a [`GpsMask`] naming which fields it actually set, and
//! `merge` folds that into the session's running fix exactly like gpsd's
//! `gpsd_merge`: later, more authoritative fields overwrite earlier ones,
//! but a field a sentence doesn't touch is never clobbered with a default.

use bitflags::bitflags;
use hifitime::prelude::Epoch;

bitflags! {
    /// One bit per field a decoder may have populated in a single call.
    /// `ONLINE_SET` is used purely as a liveness signal (the device spoke at
    /// all), not as a claim about any specific field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GpsMask: u32 {
        const ONLINE_SET    = 1 << 0;
        const TIME_SET      = 1 << 1;
        const LATLON_SET    = 1 << 2;
        const ALTITUDE_SET  = 1 << 3;
        const SPEED_SET     = 1 << 4;
        const TRACK_SET     = 1 << 5;
        const CLIMB_SET     = 1 << 6;
        const STATUS_SET    = 1 << 7;
        const MODE_SET      = 1 << 8;
        const DOP_SET       = 1 << 9;
        const VERSION_SET   = 1 << 10;
        const SATELLITE_SET = 1 << 11;
        const RAW_SET       = 1 << 12;
        const USED_SET      = 1 << 13;
        const PPSTIME_SET   = 1 << 14;
        const ECEF_SET      = 1 << 15;
        const VECEF_SET     = 1 << 16;
        const EPV_SET       = 1 << 19;
        const EPD_SET       = 1 << 20;
    }
}

impl Default for GpsMask {
    fn default() -> Self {
        Self::empty()
    }
}

/// Fix quality/type, ordered so that higher-confidence modes compare
/// greater. `merge` uses this ordering to decide whether a new mode report
/// may downgrade the running fix's mode (see `merge`'s doc comment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FixMode {
    NotSeen,
    NoFix,
    Fix2D,
    Fix3D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixStatus {
    Unknown,
    Gps,
    Dgps,
    Rtk,
    FloatRtk,
    Dr,
    Gnssdr,
    Time,
    Sim,
    Pps,
}

/// The session's running fix. All geodetic fields are `f64::NAN` when
/// unset, matching gpsd's `NAN`-as-absent convention rather than an
/// `Option` per field (keeps the struct `Copy`-able and merge arithmetic
/// simple).
#[derive(Debug, Clone, Copy)]
pub struct GpsFix {
    pub mode: FixMode,
    pub status: FixStatus,
    pub time: Option<Epoch>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_hae: f64,
    pub altitude_msl: f64,
    pub speed: f64,
    pub track: f64,
    pub climb: f64,
    pub epx: f64,
    pub epy: f64,
    pub epv: f64,
    pub ept: f64,
    pub eps: f64,
    pub epd: f64,
    pub ecef_x: f64,
    pub ecef_y: f64,
    pub ecef_z: f64,
    pub satellites_used: u32,
}

impl Default for GpsFix {
    fn default() -> Self {
        Self {
            mode: FixMode::NotSeen,
            status: FixStatus::Unknown,
            time: None,
            latitude: f64::NAN,
            longitude: f64::NAN,
            altitude_hae: f64::NAN,
            altitude_msl: f64::NAN,
            speed: f64::NAN,
            track: f64::NAN,
            climb: f64::NAN,
            epx: f64::NAN,
            epy: f64::NAN,
            epv: f64::NAN,
            ept: f64::NAN,
            eps: f64::NAN,
            epd: f64::NAN,
            ecef_x: f64::NAN,
            ecef_y: f64::NAN,
            ecef_z: f64::NAN,
            satellites_used: 0,
        }
    }
}

impl GpsFix {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Folds `incoming`/`incoming_mask` into `running`, returning the
/// cumulative mask (the bits `running` now carries that it didn't carry
/// before, unioned with what it already had).
///
/// Mode promotion rule: a sentence that sets `MODE_SET` may raise the
/// fix's mode (e.g. 2D -> 3D) freely, but may only lower it if the new
/// mode is itself `NoFix`/`NotSeen` -- a momentary 2D report from a
/// secondary talker must never downgrade an already-locked 3D fix.
pub fn merge(running: &mut GpsFix, incoming: &GpsFix, incoming_mask: GpsMask) -> GpsMask {
    if incoming_mask.contains(GpsMask::TIME_SET) {
        running.time = incoming.time;
    }
    if incoming_mask.contains(GpsMask::LATLON_SET) {
        running.latitude = incoming.latitude;
        running.longitude = incoming.longitude;
        running.epx = incoming.epx;
        running.epy = incoming.epy;
    }
    if incoming_mask.contains(GpsMask::ALTITUDE_SET) {
        running.altitude_hae = incoming.altitude_hae;
        running.altitude_msl = incoming.altitude_msl;
    }
    if incoming_mask.contains(GpsMask::SPEED_SET) {
        running.speed = incoming.speed;
    }
    if incoming_mask.contains(GpsMask::TRACK_SET) {
        running.track = incoming.track;
    }
    if incoming_mask.contains(GpsMask::CLIMB_SET) {
        running.climb = incoming.climb;
    }
    if incoming_mask.contains(GpsMask::STATUS_SET) {
        running.status = incoming.status;
    }
    if incoming_mask.contains(GpsMask::MODE_SET) {
        let downgrade = incoming.mode < running.mode;
        let to_degenerate = matches!(incoming.mode, FixMode::NoFix | FixMode::NotSeen);
        if !downgrade || to_degenerate {
            running.mode = incoming.mode;
        }
    }
    if incoming_mask.contains(GpsMask::EPV_SET) {
        running.epv = incoming.epv;
    }
    if incoming_mask.contains(GpsMask::EPD_SET) {
        running.epd = incoming.epd;
    }
    if incoming_mask.contains(GpsMask::ECEF_SET) {
        running.ecef_x = incoming.ecef_x;
        running.ecef_y = incoming.ecef_y;
        running.ecef_z = incoming.ecef_z;
    }
    if incoming_mask.contains(GpsMask::USED_SET) {
        running.satellites_used = incoming.satellites_used;
    }
    incoming_mask | GpsMask::ONLINE_SET
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_only_touches_masked_fields() {
        let mut running = GpsFix::new();
        running.latitude = 10.0;
        running.longitude = 20.0;
        let mut incoming = GpsFix::new();
        incoming.speed = 5.0;
        let mask = merge(&mut running, &incoming, GpsMask::SPEED_SET);
        assert_eq!(running.latitude, 10.0);
        assert_eq!(running.speed, 5.0);
        assert!(mask.contains(GpsMask::SPEED_SET));
        assert!(mask.contains(GpsMask::ONLINE_SET));
    }

    #[test]
    fn mode_cannot_be_downgraded_by_a_weaker_report() {
        let mut running = GpsFix::new();
        running.mode = FixMode::Fix3D;
        let mut incoming = GpsFix::new();
        incoming.mode = FixMode::Fix2D;
        merge(&mut running, &incoming, GpsMask::MODE_SET);
        assert_eq!(running.mode, FixMode::Fix3D);
    }

    #[test]
    fn mode_can_be_forced_down_to_nofix() {
        let mut running = GpsFix::new();
        running.mode = FixMode::Fix3D;
        let mut incoming = GpsFix::new();
        incoming.mode = FixMode::NoFix;
        merge(&mut running, &incoming, GpsMask::MODE_SET);
        assert_eq!(running.mode, FixMode::NoFix);
    }

    #[test]
    fn mode_can_be_promoted_upward() {
        let mut running = GpsFix::new();
        running.mode = FixMode::Fix2D;
        let mut incoming = GpsFix::new();
        incoming.mode = FixMode::Fix3D;
        merge(&mut running, &incoming, GpsMask::MODE_SET);
        assert_eq!(running.mode, FixMode::Fix3D);
    }

    #[test]
    fn unset_fields_stay_nan() {
        let mut running = GpsFix::new();
        let incoming = GpsFix::new();
        merge(&mut running, &incoming, GpsMask::TIME_SET);
        assert!(running.latitude.is_nan());
    }
}
