//! GPS-week/TOW <-> UTC time model, owned by the process-wide [`Context`].
//!
//! Rollover handling, century recovery for two-digit NMEA years, and the
//! leap-second wrap-bug sanity check all live here; sessions only ever read
//! this state (single-threaded main loop, see spec §5).

use hifitime::prelude::{Duration as HifiDuration, Epoch};

/// Seconds in a GPS week.
pub const SECONDS_PER_WEEK: i64 = 604_800;

/// GPS epoch: 1980-01-06T00:00:00 UTC.
fn gps_epoch() -> Epoch {
    Epoch::from_gregorian_utc(1980, 1, 6, 0, 0, 0, 0)
}

/// Process-wide shared time/leap-second/century context. One instance per
/// process; sessions hold a borrowed reference (see `Session`).
#[derive(Debug, Clone)]
pub struct Context {
    pub leap_seconds: i32,
    pub leap_valid: bool,
    pub century: i32,
    pub rollover: u32,
    last_observed_week: Option<u32>,
    pub read_only: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Captures build-time defaults: the century of "now" and a
    /// conservative leap-second count. If the host clock reads before the
    /// GPS epoch, defaults are kept and the caller should log a warning.
    pub fn new() -> Self {
        let now = Epoch::now().unwrap_or_else(|_| gps_epoch());
        let (year, _, _, _, _, _, _) = now.to_gregorian_utc();
        Self {
            leap_seconds: 18,
            leap_valid: true,
            century: (year / 100) * 100,
            rollover: 0,
            last_observed_week: None,
            read_only: false,
        }
    }

    /// Resolves a two-digit NMEA year against the current century, rolling
    /// the century forward if the absolute delta to "now" exceeds ~50 years.
    pub fn resolve_two_digit_year(&mut self, two_digit: i32, now: Epoch) -> i32 {
        let mut year = self.century + two_digit;
        let (now_year, _, _, _, _, _, _) = now.to_gregorian_utc();
        if (now_year - year).abs() > 50 {
            self.century += 100;
            year = self.century + two_digit;
        }
        year
    }

    /// Folds a truncated (10-bit) GPS week counter into a full week number,
    /// detecting wraparound by comparing against the last observed week.
    pub fn full_week(&mut self, truncated: u32) -> u32 {
        if let Some(last) = self.last_observed_week {
            let last_truncated = last % 1024;
            if truncated < last_truncated {
                self.rollover += 1;
            }
        }
        self.last_observed_week = Some(self.rollover * 1024 + truncated);
        self.rollover * 1024 + truncated
    }

    /// Applies the documented 1024-week wrap-bug correction: if the
    /// receiver reports `leap_seconds >= 18` yet resolves to a UTC before
    /// 2017-01-01, the receiver's epoch is 1024 weeks behind; shift forward.
    pub fn sanity_correct(&self, utc: Epoch) -> Epoch {
        let bug_cutoff = Epoch::from_gregorian_utc(2017, 1, 1, 0, 0, 0, 0);
        if self.leap_seconds >= 18 && utc < bug_cutoff {
            utc + HifiDuration::from_seconds((1024 * SECONDS_PER_WEEK) as f64)
        } else {
            utc
        }
    }

    /// Leap-second events reported in GPS subframes are only honored when
    /// they fall in the ITU-R TF.460-6 scheduled months.
    pub fn is_leap_second_eligible_month(month: u8) -> bool {
        matches!(month, 3 | 6 | 9 | 12)
    }
}

/// GPS time of a `(week, tow)` pair, with no leap-second correction. This is
/// the "time of measurement" entry point used by raw-observation exports.
pub fn gpstime(week: u32, tow: f64) -> Epoch {
    gps_epoch() + HifiDuration::from_seconds(week as f64 * SECONDS_PER_WEEK as f64 + tow)
}

/// UTC time of a `(week, tow)` pair, leap-second corrected via `ctx`.
pub fn utctime(ctx: &Context, week: u32, tow: f64) -> Epoch {
    let gt = gpstime(week, tow);
    let utc = gt - HifiDuration::from_seconds(ctx.leap_seconds as f64);
    ctx.sanity_correct(utc)
}

/// Inverse of `gpstime`/`utctime` for property testing: decomposes an
/// [`Epoch`] already known to be in the GPST timescale back into
/// `(week mod 1024, tow)`.
pub fn to_time_of_week(t_gpst: Epoch) -> (u32, f64) {
    let delta = t_gpst - gps_epoch();
    let total_seconds = delta.to_seconds();
    let week = (total_seconds / SECONDS_PER_WEEK as f64).floor() as i64;
    let tow = total_seconds - (week * SECONDS_PER_WEEK) as f64;
    ((week.rem_euclid(1024)) as u32, tow)
}

/// Converts an already-built GPST [`Epoch`] to UTC using `ctx`'s leap
/// seconds (symmetric counterpart of `utctime` for epochs built elsewhere,
/// e.g. from a UBX NAV-PVT record already in GPS time).
pub fn gpst_epoch_to_utc(ctx: &Context, t_gpst: Epoch) -> Epoch {
    ctx.sanity_correct(t_gpst - HifiDuration::from_seconds(ctx.leap_seconds as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_tow_round_trip() {
        let ctx = Context::new();
        for &(week, tow) in &[(0u32, 100.0f64), (1023, 604799.0), (512, 0.0)] {
            let t = gpstime(week, tow);
            let (w2, tow2) = to_time_of_week(t);
            assert_eq!(w2, week % 1024);
            assert!((tow2 - tow).abs() < 1e-6);
        }
        let _ = ctx;
    }

    #[test]
    fn utc_is_leap_shifted_from_gps() {
        let ctx = Context::new();
        let gt = gpstime(1000, 100.0);
        let ut = utctime(&ctx, 1000, 100.0);
        let delta = (gt - ut).to_seconds();
        assert!((delta - ctx.leap_seconds as f64).abs() < 1e-6);
    }

    #[test]
    fn rollover_detected_on_wrap() {
        let mut ctx = Context::new();
        assert_eq!(ctx.full_week(1023), 1023);
        assert_eq!(ctx.full_week(0), 1024);
        assert_eq!(ctx.rollover, 1);
    }

    #[test]
    fn leap_month_gate() {
        assert!(Context::is_leap_second_eligible_month(6));
        assert!(!Context::is_leap_second_eligible_month(7));
    }

    #[test]
    fn sanity_wrap_bug_shifts_forward() {
        let ctx = Context {
            leap_seconds: 18,
            leap_valid: true,
            century: 2000,
            rollover: 0,
            last_observed_week: None,
            read_only: false,
        };
        let before_cutoff = Epoch::from_gregorian_utc(2016, 6, 1, 0, 0, 0, 0);
        let corrected = ctx.sanity_correct(before_cutoff);
        assert!(corrected > before_cutoff);
    }
}
