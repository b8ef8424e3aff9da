//! The lexer's output type: a tagged, framed packet.

use bitflags::bitflags;

/// Maximum packet length the lexer will ever buffer or emit.
pub const MAX_PACKET_LENGTH: usize = 12288;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Nmea,
    Aivdm,
    Ubx,
    SiRf,
    Tsip,
    Zodiac,
    Evermore,
    Garmin,
    GarminTxt,
    Italk,
    Navcom,
    Superstar2,
    Oncore,
    Geostar,
    Sky,
    Rtcm2,
    Rtcm3,
    Json,
    Spartn,
    Comment,
    Bad,
}

bitflags! {
    /// Lets callers suppress recognition of specific protocols. SPARTN is
    /// excluded from the default mask because its framing collides with
    /// binary noise on other protocols.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PacketTypeMask: u32 {
        const NMEA       = 1 << 0;
        const AIVDM      = 1 << 1;
        const UBX        = 1 << 2;
        const SIRF       = 1 << 3;
        const TSIP       = 1 << 4;
        const ZODIAC     = 1 << 5;
        const EVERMORE   = 1 << 6;
        const GARMIN     = 1 << 7;
        const GARMIN_TXT = 1 << 8;
        const ITALK      = 1 << 9;
        const NAVCOM     = 1 << 10;
        const SUPERSTAR2 = 1 << 11;
        const ONCORE     = 1 << 12;
        const GEOSTAR    = 1 << 13;
        const SKY        = 1 << 14;
        const RTCM2      = 1 << 15;
        const RTCM3      = 1 << 16;
        const JSON       = 1 << 17;
        const SPARTN     = 1 << 18;
        const COMMENT    = 1 << 19;
    }
}

impl Default for PacketTypeMask {
    fn default() -> Self {
        Self::all() & !Self::SPARTN
    }
}

impl PacketTypeMask {
    pub fn allows(&self, kind: PacketKind) -> bool {
        match kind {
            PacketKind::Nmea => self.contains(Self::NMEA),
            PacketKind::Aivdm => self.contains(Self::AIVDM),
            PacketKind::Ubx => self.contains(Self::UBX),
            PacketKind::SiRf => self.contains(Self::SIRF),
            PacketKind::Tsip => self.contains(Self::TSIP),
            PacketKind::Zodiac => self.contains(Self::ZODIAC),
            PacketKind::Evermore => self.contains(Self::EVERMORE),
            PacketKind::Garmin => self.contains(Self::GARMIN),
            PacketKind::GarminTxt => self.contains(Self::GARMIN_TXT),
            PacketKind::Italk => self.contains(Self::ITALK),
            PacketKind::Navcom => self.contains(Self::NAVCOM),
            PacketKind::Superstar2 => self.contains(Self::SUPERSTAR2),
            PacketKind::Oncore => self.contains(Self::ONCORE),
            PacketKind::Geostar => self.contains(Self::GEOSTAR),
            PacketKind::Sky => self.contains(Self::SKY),
            PacketKind::Rtcm2 => self.contains(Self::RTCM2),
            PacketKind::Rtcm3 => self.contains(Self::RTCM3),
            PacketKind::Json => self.contains(Self::JSON),
            PacketKind::Spartn => self.contains(Self::SPARTN),
            PacketKind::Comment => self.contains(Self::COMMENT),
            PacketKind::Bad => true,
        }
    }
}

/// One fully-framed packet handed from the lexer to driver dispatch.
#[derive(Debug, Clone)]
pub struct Packet {
    pub kind: PacketKind,
    /// Framing included (e.g. leading `$`, trailing `*CC\r\n` for NMEA).
    pub payload: Vec<u8>,
    pub counter: u64,
    pub retry_counter: u32,
}

impl Packet {
    pub fn new(kind: PacketKind, payload: Vec<u8>, counter: u64, retry_counter: u32) -> Self {
        Self {
            kind,
            payload,
            counter,
            retry_counter,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
