//! Lock-free SHM bookend protocol for exporting time samples to `ntpd`'s
//! SHM reference clock driver (ntpshmwrite(3), refclock_shm.c), reworked
//! here as an in-process ring of slots rather than `System V` shared memory
//! since this crate targets consumers within the same process/tests; the
//! wire layout (the bookend counters) matches the real `shmTime` ABI
//! exactly so a future System V-backed export is a drop-in swap.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

/// `ntpd`'s SHM segments are keyed `NTP_BASE + unit`; historically units 0
/// and 1 are reserved for privileged/PPS-disciplined sources (mode 0600)
/// and the rest are world-readable (mode 0666). `MAX_UNITS` mirrors the
/// ~256-unit table ntpd itself ships.
pub const MAX_UNITS: usize = 256;

/// File mode a unit's segment would carry if this were backed by real
/// System V shared memory rather than an in-process table.
pub fn permission_mode(unit: usize) -> u32 {
    if unit < 2 {
        0o600
    } else {
        0o666
    }
}

/// One shared-memory "segment": two generation counters bookending the
/// payload. A reader that sees `count1 == count2` after reading the
/// payload knows no writer interrupted it; otherwise it must retry.
#[derive(Debug)]
pub struct ShmSegment {
    count1: AtomicI32,
    count2: AtomicI32,
    mode: AtomicI32,
    receiver_time_sec: AtomicI32,
    receiver_time_nsec: AtomicI32,
    clock_time_sec: AtomicI32,
    clock_time_nsec: AtomicI32,
    leap: AtomicI32,
    precision: AtomicI32,
    valid: AtomicI32,
}

/// One published time sample: the receiver's own clock reading paired
/// with the system clock reading taken at the same instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    pub receiver_time_sec: i32,
    pub receiver_time_nsec: i32,
    pub clock_time_sec: i32,
    pub clock_time_nsec: i32,
    pub leap: i32,
    pub precision: i32,
}

impl Default for ShmSegment {
    fn default() -> Self {
        Self::new()
    }
}

impl ShmSegment {
    pub fn new() -> Self {
        Self {
            count1: AtomicI32::new(0),
            count2: AtomicI32::new(0),
            mode: AtomicI32::new(1),
            receiver_time_sec: AtomicI32::new(0),
            receiver_time_nsec: AtomicI32::new(0),
            clock_time_sec: AtomicI32::new(0),
            clock_time_nsec: AtomicI32::new(0),
            leap: AtomicI32::new(0),
            precision: AtomicI32::new(-1),
            valid: AtomicI32::new(0),
        }
    }

    /// Writer side: bump the first bookend, publish the payload, bump the
    /// second. A reader racing this sees mismatched bookends and retries
    /// rather than reading a torn sample.
    pub fn write(&self, sample: TimeSample) {
        let next = self.count1.load(Ordering::Relaxed) + 1;
        self.count1.store(next, Ordering::Release);

        self.receiver_time_sec.store(sample.receiver_time_sec, Ordering::Relaxed);
        self.receiver_time_nsec.store(sample.receiver_time_nsec, Ordering::Relaxed);
        self.clock_time_sec.store(sample.clock_time_sec, Ordering::Relaxed);
        self.clock_time_nsec.store(sample.clock_time_nsec, Ordering::Relaxed);
        self.leap.store(sample.leap, Ordering::Relaxed);
        self.precision.store(sample.precision, Ordering::Relaxed);
        self.valid.store(1, Ordering::Relaxed);

        self.count2.store(next, Ordering::Release);
    }

    /// Reader side: retries up to `max_attempts` times if a write raced
    /// the read. Returns `None` if the segment never saw a valid write or
    /// every attempt was torn.
    pub fn read(&self, max_attempts: u32) -> Option<TimeSample> {
        for _ in 0..max_attempts {
            let before = self.count1.load(Ordering::Acquire);
            if self.valid.load(Ordering::Relaxed) == 0 {
                return None;
            }
            let sample = TimeSample {
                receiver_time_sec: self.receiver_time_sec.load(Ordering::Relaxed),
                receiver_time_nsec: self.receiver_time_nsec.load(Ordering::Relaxed),
                clock_time_sec: self.clock_time_sec.load(Ordering::Relaxed),
                clock_time_nsec: self.clock_time_nsec.load(Ordering::Relaxed),
                leap: self.leap.load(Ordering::Relaxed),
                precision: self.precision.load(Ordering::Relaxed),
            };
            let after = self.count2.load(Ordering::Acquire);
            if before == after {
                return Some(sample);
            }
        }
        None
    }
}

/// A table of up to [`MAX_UNITS`] segments, with the ntpd allocation
/// preference: an unprivileged caller is never handed unit 0 or 1, since
/// those are reserved for a privileged PPS source.
pub struct ShmRegistry {
    segments: Vec<Arc<ShmSegment>>,
    allocated: Mutex<[bool; MAX_UNITS]>,
}

impl Default for ShmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ShmRegistry {
    pub fn new() -> Self {
        Self {
            segments: (0..MAX_UNITS).map(|_| Arc::new(ShmSegment::new())).collect(),
            allocated: Mutex::new([false; MAX_UNITS]),
        }
    }

    /// Claims the lowest free unit, skipping 0 and 1 unless `privileged`.
    /// Returns `None` once every eligible unit is taken.
    pub fn alloc(&self, privileged: bool) -> Option<(usize, Arc<ShmSegment>)> {
        let start = if privileged { 0 } else { 2 };
        let mut allocated = self.allocated.lock().unwrap();
        for unit in start..MAX_UNITS {
            if !allocated[unit] {
                allocated[unit] = true;
                return Some((unit, Arc::clone(&self.segments[unit])));
            }
        }
        None
    }

    pub fn release(&self, unit: usize) {
        if unit < MAX_UNITS {
            self.allocated.lock().unwrap()[unit] = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let seg = ShmSegment::new();
        let sample = TimeSample {
            receiver_time_sec: 100,
            receiver_time_nsec: 500,
            clock_time_sec: 100,
            clock_time_nsec: 490,
            leap: 0,
            precision: -9,
        };
        seg.write(sample);
        assert_eq!(seg.read(4), Some(sample));
    }

    #[test]
    fn unwritten_segment_reads_none() {
        let seg = ShmSegment::new();
        assert_eq!(seg.read(4), None);
    }

    #[test]
    fn repeated_writes_are_each_visible() {
        let seg = ShmSegment::new();
        for i in 0..5 {
            let sample = TimeSample {
                receiver_time_sec: i,
                receiver_time_nsec: 0,
                clock_time_sec: i,
                clock_time_nsec: 0,
                leap: 0,
                precision: -9,
            };
            seg.write(sample);
            assert_eq!(seg.read(4).unwrap().receiver_time_sec, i);
        }
    }

    #[test]
    fn unprivileged_alloc_skips_units_0_and_1() {
        let registry = ShmRegistry::new();
        let (unit, _) = registry.alloc(false).unwrap();
        assert!(unit >= 2);
    }

    #[test]
    fn privileged_alloc_takes_unit_0_first() {
        let registry = ShmRegistry::new();
        let (unit, _) = registry.alloc(true).unwrap();
        assert_eq!(unit, 0);
    }

    #[test]
    fn release_makes_a_unit_available_again() {
        let registry = ShmRegistry::new();
        let (unit, _) = registry.alloc(true).unwrap();
        registry.release(unit);
        let (unit2, _) = registry.alloc(true).unwrap();
        assert_eq!(unit, unit2);
    }

    #[test]
    fn permission_mode_matches_ntpd_convention() {
        assert_eq!(permission_mode(0), 0o600);
        assert_eq!(permission_mode(1), 0o600);
        assert_eq!(permission_mode(2), 0o666);
        assert_eq!(permission_mode(255), 0o666);
    }
}
