//! Per-constellation satellite skyview: signal-to-noise, elevation/azimuth,
//! and used-in-fix status for every space vehicle currently reported.
//!
//! Keyed by `(gnss_id, sv_id, sig_id)` rather than a flat PRN so that
//! multi-GNSS receivers reporting the same physical satellite's L1 and L5
//! signals separately (UBX M9/M10 style) get distinct entries.

/// Observed constellation, distinguishing signal bands that share a
/// numbering space (GPS L1 C/A vs L2C, for instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gnss {
    Gps,
    Sbas,
    Galileo,
    Beidou,
    Qzss,
    Glonass,
    Irnss,
}

/// Upper bound on simultaneously tracked signals across all constellations,
/// matching the receiver channel counts this crate targets (u-blox M9/M10).
pub const MAX_CHANNELS: usize = 184;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SatKey {
    pub gnss: Gnss,
    pub sv_id: u8,
    pub sig_id: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct SatEntry {
    pub key: SatKey,
    pub elevation: Option<f64>,
    pub azimuth: Option<f64>,
    pub snr: Option<f64>,
    pub used: bool,
    pub health_ok: bool,
}

impl SatEntry {
    pub fn new(key: SatKey) -> Self {
        Self {
            key,
            elevation: None,
            azimuth: None,
            snr: None,
            used: false,
            health_ok: true,
        }
    }
}

/// The session's current skyview. Entries older than the current report
/// cycle are dropped wholesale at cycle boundaries (gpsd's SKY behavior:
/// a satellite that drops out of view should disappear, not linger with
/// stale SNR).
#[derive(Debug, Clone, Default)]
pub struct SkyView {
    entries: Vec<SatEntry>,
}

impl SkyView {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn upsert(&mut self, key: SatKey) -> &mut SatEntry {
        if let Some(idx) = self.entries.iter().position(|e| e.key == key) {
            return &mut self.entries[idx];
        }
        if self.entries.len() >= MAX_CHANNELS {
            self.entries.remove(0);
        }
        self.entries.push(SatEntry::new(key));
        self.entries.last_mut().unwrap()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &SatEntry> {
        self.entries.iter()
    }

    pub fn used_count(&self) -> usize {
        self.entries.iter().filter(|e| e.used).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(sv: u8) -> SatKey {
        SatKey { gnss: Gnss::Gps, sv_id: sv, sig_id: 0 }
    }

    #[test]
    fn upsert_is_idempotent_per_key() {
        let mut sky = SkyView::new();
        sky.upsert(key(5)).snr = Some(40.0);
        sky.upsert(key(5)).elevation = Some(60.0);
        assert_eq!(sky.len(), 1);
        let e = sky.iter().next().unwrap();
        assert_eq!(e.snr, Some(40.0));
        assert_eq!(e.elevation, Some(60.0));
    }

    #[test]
    fn distinct_sig_ids_are_distinct_entries() {
        let mut sky = SkyView::new();
        sky.upsert(SatKey { gnss: Gnss::Gps, sv_id: 5, sig_id: 0 });
        sky.upsert(SatKey { gnss: Gnss::Gps, sv_id: 5, sig_id: 1 });
        assert_eq!(sky.len(), 2);
    }

    #[test]
    fn used_count_reflects_flag() {
        let mut sky = SkyView::new();
        sky.upsert(key(1)).used = true;
        sky.upsert(key(2)).used = false;
        assert_eq!(sky.used_count(), 1);
    }

    #[test]
    fn clear_empties_the_view() {
        let mut sky = SkyView::new();
        sky.upsert(key(1));
        sky.clear();
        assert!(sky.is_empty());
    }

    #[test]
    fn channel_cap_evicts_oldest() {
        let mut sky = SkyView::new();
        for sv in 0..(MAX_CHANNELS as u8).saturating_add(5) {
            sky.upsert(key(sv));
        }
        assert!(sky.len() <= MAX_CHANNELS);
    }
}
