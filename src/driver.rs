//! Driver arbitration: binds a [`Packet`] stream to the protocol decoder
//! that owns the session, and hunts baud/framing when no driver has locked
//! on yet.
//!
//! Mirrors the teacher's per-device `Runtime` split: one `Driver` instance
//! is "current" for a session at a time; packets of a different type are
//! either a protocol switch (explicit driver change) or noise to ignore.

use crate::packet::{PacketKind, PacketTypeMask};

/// Standard serial rates tried in order while hunting for a live driver,
/// fastest common rates first since most modern receivers default high.
pub const BAUD_HUNT_TABLE: &[u32] =
    &[4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];

/// A decoder that claims ownership of one or more [`PacketKind`]s.
pub trait Driver {
    fn name(&self) -> &'static str;

    /// Packet kinds this driver will accept for decoding.
    fn accepts(&self) -> PacketTypeMask;

    /// True once this driver has seen enough to be confident it, and not a
    /// sibling driver sharing the same packet kind, is the right decoder.
    fn is_locked(&self) -> bool;
}

/// Static table of known drivers in probe order, mirroring gpsd's
/// `gpsd_drivers[]`. Probe order matters: protocols that can be mistaken
/// for one another (e.g. generic NMEA vs a vendor's NMEA-like extension)
/// are ordered most-specific first.
pub const DRIVER_TABLE: &[(&str, PacketKind)] = &[
    ("UBX", PacketKind::Ubx),
    ("SiRF", PacketKind::SiRf),
    ("TSIP", PacketKind::Tsip),
    ("Zodiac", PacketKind::Zodiac),
    ("EverMore", PacketKind::Evermore),
    ("Garmin Binary", PacketKind::Garmin),
    ("OnCore", PacketKind::Oncore),
    ("RTCM2", PacketKind::Rtcm2),
    ("RTCM3", PacketKind::Rtcm3),
    ("AIS", PacketKind::Aivdm),
    ("NMEA0183", PacketKind::Nmea),
    ("Generic JSON", PacketKind::Json),
];

/// Looks up the first table entry whose packet kind matches. Used by
/// session dispatch once the lexer frames a packet but no driver has
/// locked on yet.
pub fn driver_for(kind: PacketKind) -> Option<&'static str> {
    DRIVER_TABLE
        .iter()
        .find(|(_, k)| *k == kind)
        .map(|(name, _)| *name)
}

/// Baud/framing hunt state machine: cycles through [`BAUD_HUNT_TABLE`],
/// giving each rate a fixed number of packet-lexer attempts before moving
/// on, and remembers the rate that last worked so a reopen can skip the
/// hunt.
#[derive(Debug, Clone)]
pub struct BaudHunt {
    index: usize,
    attempts_at_current: u32,
    pub saved_baud: Option<u32>,
    max_attempts_per_rate: u32,
}

impl BaudHunt {
    pub fn new(saved_baud: Option<u32>) -> Self {
        Self {
            index: 0,
            attempts_at_current: 0,
            saved_baud,
            max_attempts_per_rate: 3,
        }
    }

    /// Baud rate to try right now: the saved rate first if one exists, else
    /// the hunt table in order.
    pub fn current_baud(&self) -> u32 {
        if let Some(saved) = self.saved_baud {
            if self.index == 0 {
                return saved;
            }
        }
        BAUD_HUNT_TABLE[(self.index) % BAUD_HUNT_TABLE.len()]
    }

    /// Call once per failed framing attempt (e.g. `NoData` from the lexer).
    /// Returns `true` if the hunt advanced to a new rate.
    pub fn record_failure(&mut self) -> bool {
        self.attempts_at_current += 1;
        if self.attempts_at_current >= self.max_attempts_per_rate {
            self.attempts_at_current = 0;
            self.index += 1;
            true
        } else {
            false
        }
    }

    /// Call once a packet frames successfully: locks in the current rate
    /// as the persisted baud for the next reopen.
    pub fn record_success(&mut self) {
        self.saved_baud = Some(self.current_baud());
        self.attempts_at_current = 0;
    }

    pub fn exhausted(&self) -> bool {
        self.index >= BAUD_HUNT_TABLE.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_lookup_matches_kind() {
        assert_eq!(driver_for(PacketKind::Ubx), Some("UBX"));
        assert_eq!(driver_for(PacketKind::Nmea), Some("NMEA0183"));
        assert_eq!(driver_for(PacketKind::Bad), None);
    }

    #[test]
    fn baud_hunt_prefers_saved_rate_first() {
        let hunt = BaudHunt::new(Some(38400));
        assert_eq!(hunt.current_baud(), 38400);
    }

    #[test]
    fn baud_hunt_advances_after_max_attempts() {
        let mut hunt = BaudHunt::new(None);
        assert_eq!(hunt.current_baud(), BAUD_HUNT_TABLE[0]);
        assert!(!hunt.record_failure());
        assert!(!hunt.record_failure());
        assert!(hunt.record_failure());
        assert_eq!(hunt.current_baud(), BAUD_HUNT_TABLE[1]);
    }

    #[test]
    fn baud_hunt_terminates() {
        let mut hunt = BaudHunt::new(None);
        let mut advances = 0;
        while !hunt.exhausted() {
            if hunt.record_failure() {
                advances += 1;
            }
            if advances > BAUD_HUNT_TABLE.len() + 1 {
                panic!("hunt never terminated");
            }
        }
    }

    #[test]
    fn baud_hunt_success_persists_rate() {
        let mut hunt = BaudHunt::new(None);
        hunt.record_failure();
        hunt.record_success();
        assert_eq!(hunt.saved_baud, Some(BAUD_HUNT_TABLE[1]));
    }
}
