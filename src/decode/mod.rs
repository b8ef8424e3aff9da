//! Payload decoders: turn a framed [`crate::packet::Packet`] into fix/sky
//! updates. Each protocol named in §4.F gets a full decoder; AIS position
//! fields stay out of `GpsFix` entirely (a vessel's AIS traffic describes
//! other ships, not the receiving session's own fix) and travel instead
//! through `Decoded::ais`, raw and unscaled, for the publisher to scale.

pub mod ais;
pub mod nmea;
pub mod rtcm2;
pub mod rtcm3;
pub mod subframe;
pub mod ubx;

use crate::fix::{GpsFix, GpsMask};
use crate::sky::SkyView;

/// What a decoder contributed this call. Decoders never hold state across
/// calls for fix/sky fields; any cross-message state (e.g. NMEA's GSA/GSV
/// cycle, or AIS fragment/type-24 reassembly) lives in the caller's
/// `Session`.
#[derive(Debug, Clone, Default)]
pub struct Decoded {
    pub fix: GpsFix,
    pub mask: GpsMask,
    pub sky_updates: Vec<crate::sky::SatKey>,
    pub ais: Option<ais::AisMessage>,
    /// Set when this cycle decoded a GPS LNAV subframe, whether carried
    /// directly (`PacketKind::Subframe`, if a lexer ever frames one bare)
    /// or extracted from a UBX RXM-SFRBX payload by `decode::ubx`.
    pub subframe: Option<subframe::Subframe>,
    /// Set by `decode::rtcm2`/`decode::rtcm3` to `(message_type,
    /// station_id)` -- the two fields the publisher's `RTCM2`/`RTCM3`
    /// records carry regardless of which message type was framed.
    /// `station_id` is `0` for message types that don't carry one (e.g.
    /// RTCM3 ephemerides).
    pub station: Option<(u32, u32)>,
}

impl Decoded {
    pub fn empty() -> Self {
        Self {
            fix: GpsFix::new(),
            mask: GpsMask::empty(),
            sky_updates: Vec::new(),
            ais: None,
            subframe: None,
            station: None,
        }
    }
}

/// Errors a payload decoder can raise; framing is already validated by the
/// lexer by the time a decoder runs, so these are semantic, not checksum,
/// failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("payload too short: need at least {need} bytes, have {have}")]
    TooShort { need: usize, have: usize },
    #[error("unrecognized message/sentence id: {0}")]
    UnknownMessage(String),
    #[error("field out of range: {0}")]
    OutOfRange(String),
    #[error("awaiting additional fragments before this message can decode")]
    Incomplete,
}

pub type DecodeResult = Result<Decoded, DecodeError>;

/// Applies a decoded sky key, creating the skyview entry if needed, via a
/// closure so each protocol can set whatever fields it has.
pub fn touch_sky(sky: &mut SkyView, key: crate::sky::SatKey, f: impl FnOnce(&mut crate::sky::SatEntry)) {
    f(sky.upsert(key));
}
