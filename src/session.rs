//! Ties the lexer, driver arbitration, payload decoders, and fix-merge
//! together for one physical device, mirroring the teacher's per-device
//! `Runtime` (see `runtime.rs`): one `Session` per serial/TCP endpoint, one
//! `Context` shared process-wide.

use std::sync::Arc;

use crate::decode::{self, DecodeError};
use crate::driver::{self, BaudHunt};
use crate::error::GpsdResult;
use crate::fix::{merge, GpsFix, GpsMask};
use crate::lexer::Lexer;
use crate::packet::{Packet, PacketKind};
use crate::settings::DeviceConfig;
use crate::shm::{ShmRegistry, ShmSegment};
use crate::sky::SkyView;
use crate::time::Context;

#[cfg(target_os = "linux")]
use crate::chrony::ChronySocket;
#[cfg(target_os = "linux")]
use crate::pps::{PpsBus, PpsThread};

/// Emitted once per packet the session successfully dispatches, whether or
/// not its decoder produced any fix/sky change -- callers that only care
/// about fix updates should check `mask.is_empty()`.
#[derive(Debug, Clone)]
pub struct ReportCycle {
    pub mask: GpsMask,
    pub packet_kind: PacketKind,
    /// Framed payload length, for callers that want to track per-type
    /// minimum observed packet lengths (e.g. the `gpsdecode` diagnostic).
    pub packet_len: usize,
    /// Set when this cycle's packet was an AIVDM sentence that completed a
    /// decode (possibly after several fragments); raw/unscaled per §4.F.
    pub ais: Option<decode::ais::AisMessage>,
    /// Set when this cycle decoded a GPS LNAV subframe (carried here, or
    /// extracted from a UBX RXM-SFRBX payload).
    pub subframe: Option<decode::subframe::Subframe>,
    /// Set when this cycle decoded an RTCM2/RTCM3 message, to
    /// `(message_type, station_id)`.
    pub station: Option<(u32, u32)>,
}

pub struct Session {
    pub device_path: String,
    lexer: Lexer,
    pub baud_hunt: BaudHunt,
    pub fix: GpsFix,
    pub sky: SkyView,
    pub current_driver: Option<&'static str>,
    ais_state: decode::ais::AisState,
    /// SHM unit this session exports time samples to, if `DeviceConfig`
    /// asked for one. The caller that owns the `ShmRegistry` is
    /// responsible for calling `registry.release(unit)` once this session
    /// closes -- `Session` doesn't hold the registry itself.
    shm_unit: Option<usize>,
    shm: Option<Arc<ShmSegment>>,
    #[cfg(target_os = "linux")]
    pps: Option<PpsThread>,
}

impl Session {
    pub fn new(device_path: impl Into<String>, saved_baud: Option<u32>) -> Self {
        Self {
            device_path: device_path.into(),
            lexer: Lexer::new(),
            baud_hunt: BaudHunt::new(saved_baud),
            fix: GpsFix::new(),
            sky: SkyView::new(),
            current_driver: None,
            ais_state: decode::ais::AisState::new(),
            shm_unit: None,
            shm: None,
            #[cfg(target_os = "linux")]
            pps: None,
        }
    }

    /// Opens a session the way a real device add does: applies
    /// `config`'s export toggles, allocating an SHM unit from `registry`
    /// when `export_shm` is set and (Linux only) spawning the PPS capture
    /// thread wired to that segment and an optional chrony socket when
    /// `pps_path`/`export_chrony` ask for it. `privileged` controls whether
    /// this session is allowed the reserved units 0/1 (see
    /// `shm::permission_mode`).
    pub fn open(config: &DeviceConfig, registry: &ShmRegistry, privileged: bool) -> GpsdResult<Self> {
        let mut session = Self::new(config.path.clone(), config.saved_baud);
        session.baud_hunt = BaudHunt::new(config.saved_baud);

        let shm = if config.export_shm {
            let (unit, segment) = registry.alloc(privileged).ok_or_else(|| {
                crate::error::GpsdError::ShmUnavailable(format!("no free SHM unit for {}", config.path))
            })?;
            session.shm_unit = Some(unit);
            session.shm = Some(Arc::clone(&segment));
            Some(segment)
        } else {
            None
        };

        #[cfg(target_os = "linux")]
        {
            if let Some(pps_path) = &config.pps_path {
                let chrony = if config.export_chrony {
                    match &config.chrony_socket_path {
                        Some(path) => Some(ChronySocket::connect(path)?),
                        None => None,
                    }
                } else {
                    None
                };
                let shm_for_pps = shm.unwrap_or_else(|| Arc::new(ShmSegment::new()));
                session.pps = Some(PpsThread::spawn(pps_path, PpsBus::Usb, shm_for_pps, chrony, None)?);
            }
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = shm;
        }

        Ok(session)
    }

    /// SHM unit allocated for this session, if any -- pass to
    /// `ShmRegistry::release` once the session closes.
    pub fn shm_unit(&self) -> Option<usize> {
        self.shm_unit
    }

    /// Feeds raw bytes from the device into the lexer and, for every
    /// packet framed, dispatches to the matching driver/decoder and folds
    /// the result into the running fix. Returns one `ReportCycle` per
    /// packet consumed from `bytes` (a single `feed` call may produce
    /// several, since `bytes` can contain more than one frame).
    pub fn feed(&mut self, ctx: &mut Context, bytes: &[u8]) -> Vec<ReportCycle> {
        let mut packets = Vec::new();
        let saw_nodata = self.lexer.feed_all(bytes, |packet| packets.push(packet));

        let mut cycles = Vec::with_capacity(packets.len());
        for packet in packets {
            self.baud_hunt.record_success();
            if let Some(cycle) = self.dispatch(ctx, &packet) {
                cycles.push(cycle);
            }
        }
        if saw_nodata {
            self.baud_hunt.record_failure();
        }
        cycles
    }

    fn dispatch(&mut self, ctx: &mut Context, packet: &Packet) -> Option<ReportCycle> {
        self.current_driver = driver::driver_for(packet.kind);

        let decoded = match packet.kind {
            PacketKind::Nmea => decode::nmea::decode(&packet.payload),
            PacketKind::Aivdm => decode::ais::decode(&packet.payload, &mut self.ais_state),
            PacketKind::Ubx => decode::ubx::decode(&packet.payload),
            PacketKind::Rtcm2 => decode::rtcm2::decode(&packet.payload),
            PacketKind::Rtcm3 => decode::rtcm3::decode(&packet.payload),
            _ => Err(DecodeError::UnknownMessage(format!("{:?}", packet.kind))),
        };

        // `Incomplete` means an AIS fragment was buffered awaiting the
        // rest of a multi-sentence message, not a decode failure -- drop
        // this cycle silently rather than surfacing it as noise.
        let decoded = decoded.ok()?;
        for key in &decoded.sky_updates {
            self.sky.upsert(*key);
        }
        let mask = merge(&mut self.fix, &decoded.fix, decoded.mask);
        let _ = ctx;
        Some(ReportCycle {
            mask,
            packet_kind: packet.kind,
            packet_len: packet.len(),
            ais: decoded.ais,
            subframe: decoded.subframe,
            station: decoded.station,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_dispatches_nmea_and_updates_fix() {
        let mut ctx = Context::new();
        let mut session = Session::new("/dev/ttyUSB0", None);
        let sentence = b"$GPGGA,172814.0,3723.46587704,N,12202.26957864,W,2,6,1.2,18.893,M,-25.669,M,2.0,0031*4F\r\n";
        let cycles = session.feed(&mut ctx, sentence);
        assert_eq!(cycles.len(), 1);
        assert!(session.fix.latitude.is_finite());
    }

    #[test]
    fn session_survives_unparseable_packet() {
        let mut ctx = Context::new();
        let mut session = Session::new("/dev/ttyUSB0", None);
        let bogus = b"$GPZZZ,1,2,3*00\r\n";
        let cycles = session.feed(&mut ctx, bogus);
        assert!(cycles.is_empty());
    }

    #[test]
    fn feed_drains_every_packet_in_one_buffer() {
        let mut ctx = Context::new();
        let mut session = Session::new("/dev/ttyUSB0", None);
        let mut stream = Vec::new();
        stream.extend_from_slice(b"$GPGGA,172814.0,3723.46587704,N,12202.26957864,W,2,6,1.2,18.893,M,-25.669,M,2.0,0031*4F\r\n");
        stream.extend_from_slice(b"$GPGGA,172815.0,3723.46587704,N,12202.26957864,W,2,6,1.2,18.893,M,-25.669,M,2.0,0031*4E\r\n");
        let cycles = session.feed(&mut ctx, &stream);
        assert_eq!(cycles.len(), 2, "both frames in one buffer must be dispatched, not just the first");
    }

    #[test]
    fn baud_hunt_advances_on_sustained_noise() {
        let mut ctx = Context::new();
        let mut session = Session::new("/dev/ttyUSB0", None);
        let noise = vec![0x00u8; crate::packet::MAX_PACKET_LENGTH + 200];
        session.feed(&mut ctx, &noise);
        assert!(session.baud_hunt.saved_baud.is_none() || session.baud_hunt.saved_baud == Some(crate::driver::BAUD_HUNT_TABLE[0]));
    }

    #[test]
    fn open_without_any_export_toggle_allocates_nothing() {
        let registry = ShmRegistry::new();
        let config = DeviceConfig::new("/dev/ttyUSB0");
        let session = Session::open(&config, &registry, false).unwrap();
        assert!(session.shm_unit().is_none());
    }

    #[test]
    fn open_with_export_shm_allocates_an_unprivileged_unit() {
        let registry = ShmRegistry::new();
        let config = DeviceConfig::new("/dev/ttyUSB0").with_shm();
        let session = Session::open(&config, &registry, false).unwrap();
        assert!(session.shm_unit().unwrap() >= 2);
    }

    #[test]
    fn open_with_export_shm_privileged_takes_unit_0() {
        let registry = ShmRegistry::new();
        let config = DeviceConfig::new("/dev/ttyUSB0").with_shm();
        let session = Session::open(&config, &registry, true).unwrap();
        assert_eq!(session.shm_unit(), Some(0));
    }
}
