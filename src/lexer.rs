//! Unified byte-stream lexer: frames packets for ~15 mutually ambiguous
//! wire protocols without a priori knowledge of which one is live.
//!
//! The lexer is a pure function of its state and the next byte: no I/O, no
//! timers. `feed` accumulates bytes into an internal buffer and returns at
//! most one framed [`Packet`] per call, resuming exactly where the last
//! call left off (testable property 1).

use crate::checksum;
use crate::packet::{Packet, PacketKind, PacketTypeMask, MAX_PACKET_LENGTH};

/// Consecutive bad bytes tolerated before the lexer reports `NoData`.
const BAD_BYTE_LIMIT: usize = MAX_PACKET_LENGTH + 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Big,
    Little,
}

/// Declarative framing description for the protocols whose payload decoder
/// is out of this crate's scope (§4.F only names NMEA/AIVDM/UBX/RTCM2/
/// RTCM3/subframe): the lexer still has to *frame* Zodiac, EverMore,
/// OnCore, and friends correctly, it just never decodes their payload.
#[derive(Debug, Clone, Copy)]
struct LengthFramedSpec {
    kind: PacketKind,
    lead_in: &'static [u8],
    /// Byte offset of the length field, measured from the start of the
    /// lead-in.
    length_offset: usize,
    length_width: u8,
    length_endian: Endian,
    /// Total header bytes (lead-in + any fields) preceding the payload.
    header_len: usize,
    /// Trailing bytes after the payload (checksum/footer), not included in
    /// the reported `length`.
    trailer_len: usize,
}

const ZODIAC_SPEC: LengthFramedSpec = LengthFramedSpec {
    kind: PacketKind::Zodiac,
    lead_in: &[0xFF, 0x81],
    length_offset: 4,
    length_width: 2,
    length_endian: Endian::Little,
    header_len: 10,
    trailer_len: 2,
};

const EVERMORE_SPEC: LengthFramedSpec = LengthFramedSpec {
    kind: PacketKind::Evermore,
    lead_in: &[0x81, 0x81],
    length_offset: 2,
    length_width: 1,
    length_endian: Endian::Big,
    header_len: 3,
    trailer_len: 2,
};

const ONCORE_SPEC: LengthFramedSpec = LengthFramedSpec {
    kind: PacketKind::Oncore,
    lead_in: &[0xBA, 0xCE],
    length_offset: 2,
    length_width: 1,
    length_endian: Endian::Big,
    header_len: 3,
    trailer_len: 3, // checksum byte + '\r' '\n'
};

#[derive(Debug, Clone, PartialEq)]
enum State {
    Ground,
    AtLineStart,
    NmeaOrAivdm,
    Json { depth: i32, in_string: bool, escape: bool },
    Comment,
    GarminTxt,
    Ubx { header_seen: bool },
    SiRf,
    Tsip,
    Rtcm3,
    Rtcm2,
    LengthFramed(&'static LengthFramedSpec),
    Bad,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LexerOutcome {
    Packet(Packet),
    NoData,
    NeedMoreData,
}

/// The lexer's persistent state across `feed` calls.
#[derive(Debug, Clone)]
pub struct Lexer {
    state: State,
    inbuffer: Vec<u8>,
    counter: u64,
    retry_counter: u32,
    bad_byte_run: usize,
    pub type_mask: PacketTypeMask,
    at_line_start: bool,
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexer {
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            inbuffer: Vec::with_capacity(1024),
            counter: 0,
            retry_counter: 0,
            bad_byte_run: 0,
            type_mask: PacketTypeMask::default(),
            at_line_start: true,
        }
    }

    /// Feeds the whole of `bytes` through the state machine, returning the
    /// first framed packet produced (if any). Bytes consumed before a
    /// successful frame are never reconsidered; leftover bytes stay
    /// buffered for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Option<Packet> {
        for &b in bytes {
            if let Some(pkt) = self.step(b) {
                return Some(pkt);
            }
        }
        None
    }

    /// Like `feed`, but reports when a bounded run of unframeable bytes
    /// indicates the caller should advance its baud/framing hunt.
    pub fn feed_outcome(&mut self, bytes: &[u8]) -> LexerOutcome {
        for &b in bytes {
            if let Some(pkt) = self.step(b) {
                self.bad_byte_run = 0;
                return LexerOutcome::Packet(pkt);
            }
            if matches!(self.state, State::Ground) {
                self.bad_byte_run += 1;
                if self.bad_byte_run >= BAD_BYTE_LIMIT {
                    self.bad_byte_run = 0;
                    return LexerOutcome::NoData;
                }
            }
        }
        LexerOutcome::NeedMoreData
    }

    /// Drains every packet framed out of `bytes` in one pass, invoking
    /// `on_packet` for each (in order), and reports whether any bounded
    /// run of unframeable bytes was seen along the way. Unlike `feed`/
    /// `feed_outcome`, which return after the first packet and leave the
    /// rest of `bytes` unprocessed, this consumes the whole slice -- the
    /// form a caller holding an entire read buffer (not just one byte at a
    /// time) needs to avoid silently dropping any trailing frames.
    pub fn feed_all(&mut self, bytes: &[u8], mut on_packet: impl FnMut(Packet)) -> bool {
        let mut saw_nodata = false;
        for &b in bytes {
            if let Some(pkt) = self.step(b) {
                self.bad_byte_run = 0;
                on_packet(pkt);
                continue;
            }
            if matches!(self.state, State::Ground) {
                self.bad_byte_run += 1;
                if self.bad_byte_run >= BAD_BYTE_LIMIT {
                    self.bad_byte_run = 0;
                    saw_nodata = true;
                }
            }
        }
        saw_nodata
    }

    fn reset_to_ground(&mut self, keep_line_start: bool) {
        self.inbuffer.clear();
        self.state = State::Ground;
        if !keep_line_start {
            self.at_line_start = false;
        }
    }

    fn emit(&mut self, kind: PacketKind, payload: Vec<u8>) -> Option<Packet> {
        self.counter += 1;
        self.inbuffer.clear();
        self.state = State::Ground;
        Some(Packet::new(kind, payload, self.counter, self.retry_counter))
    }

    fn discard_bad(&mut self) {
        self.retry_counter += 1;
        self.inbuffer.clear();
        self.state = State::Ground;
    }

    /// Advances the state machine by exactly one byte.
    fn step(&mut self, b: u8) -> Option<Packet> {
        if self.inbuffer.len() >= MAX_PACKET_LENGTH {
            self.discard_bad();
        }

        match self.state.clone() {
            State::Ground => self.ground(b),
            State::AtLineStart => self.ground(b),
            State::NmeaOrAivdm => self.nmea_or_aivdm(b),
            State::Json { depth, in_string, escape } => self.json(b, depth, in_string, escape),
            State::Comment => self.comment(b),
            State::GarminTxt => self.garmin_txt(b),
            State::Ubx { header_seen } => self.ubx(b, header_seen),
            State::SiRf => self.sirf(b),
            State::Tsip => self.tsip(b),
            State::Rtcm3 => self.rtcm3(b),
            State::Rtcm2 => self.rtcm2(b),
            State::LengthFramed(spec) => self.length_framed(b, spec),
            State::Bad => {
                self.reset_to_ground(false);
                self.ground(b)
            }
        }
    }

    fn ground(&mut self, b: u8) -> Option<Packet> {
        let was_line_start = self.at_line_start;
        self.at_line_start = b == b'\n';

        match b {
            b'$' if self.type_mask.allows(PacketKind::Nmea) => {
                self.inbuffer.push(b);
                self.state = State::NmeaOrAivdm;
                None
            }
            b'!' if self.type_mask.allows(PacketKind::Aivdm) => {
                self.inbuffer.push(b);
                self.state = State::NmeaOrAivdm;
                None
            }
            b'@' if self.type_mask.allows(PacketKind::GarminTxt) => {
                self.inbuffer.push(b);
                self.state = State::GarminTxt;
                None
            }
            b'{' if self.type_mask.allows(PacketKind::Json) => {
                self.inbuffer.push(b);
                self.state = State::Json { depth: 1, in_string: false, escape: false };
                None
            }
            b'#' if was_line_start && self.type_mask.allows(PacketKind::Comment) => {
                self.inbuffer.push(b);
                self.state = State::Comment;
                None
            }
            0xB5 if self.type_mask.allows(PacketKind::Ubx) => {
                self.inbuffer.push(b);
                self.state = State::Ubx { header_seen: false };
                None
            }
            0xA0 if self.type_mask.allows(PacketKind::SiRf) => {
                self.inbuffer.push(b);
                self.state = State::SiRf;
                None
            }
            0x10 if self.type_mask.allows(PacketKind::Tsip) => {
                self.inbuffer.push(b);
                self.state = State::Tsip;
                None
            }
            0xFF if self.type_mask.allows(PacketKind::Zodiac) => {
                self.inbuffer.push(b);
                self.state = State::LengthFramed(&ZODIAC_SPEC);
                None
            }
            0x81 if self.type_mask.allows(PacketKind::Evermore) => {
                self.inbuffer.push(b);
                self.state = State::LengthFramed(&EVERMORE_SPEC);
                None
            }
            0xBA if self.type_mask.allows(PacketKind::Oncore) => {
                self.inbuffer.push(b);
                self.state = State::LengthFramed(&ONCORE_SPEC);
                None
            }
            0xD3 if self.type_mask.allows(PacketKind::Rtcm3) => {
                self.inbuffer.push(b);
                self.state = State::Rtcm3;
                None
            }
            0x66 if self.type_mask.allows(PacketKind::Rtcm2) => {
                self.inbuffer.push(b);
                self.state = State::Rtcm2;
                None
            }
            _ => {
                self.inbuffer.clear();
                None
            }
        }
    }

    fn nmea_or_aivdm(&mut self, b: u8) -> Option<Packet> {
        self.inbuffer.push(b);
        if self.inbuffer.len() > MAX_PACKET_LENGTH {
            self.discard_bad();
            return None;
        }
        if b == b'\n' && self.inbuffer.ends_with(b"\r\n") {
            return self.finish_nmea_or_aivdm();
        }
        None
    }

    fn finish_nmea_or_aivdm(&mut self) -> Option<Packet> {
        let buf = self.inbuffer.clone();
        // buf: "<$ or !>...*CC\r\n"
        if buf.len() < 6 {
            self.discard_bad();
            return None;
        }
        let star = buf.iter().rposition(|&c| c == b'*')?;
        if star + 5 > buf.len() {
            self.discard_bad();
            return None;
        }
        let hex = [buf[star + 1], buf[star + 2]];
        let payload = &buf[1..star];
        if !checksum::nmea::verify(payload, &hex) {
            self.discard_bad();
            return None;
        }
        let kind = if buf[0] == b'!' {
            PacketKind::Aivdm
        } else {
            PacketKind::Nmea
        };
        self.emit(kind, buf)
    }

    fn comment(&mut self, b: u8) -> Option<Packet> {
        self.inbuffer.push(b);
        if b == b'\n' || self.inbuffer.len() > MAX_PACKET_LENGTH {
            let buf = self.inbuffer.clone();
            return self.emit(PacketKind::Comment, buf);
        }
        None
    }

    fn garmin_txt(&mut self, b: u8) -> Option<Packet> {
        self.inbuffer.push(b);
        if b == b'\n' || self.inbuffer.len() > MAX_PACKET_LENGTH {
            let buf = self.inbuffer.clone();
            return self.emit(PacketKind::GarminTxt, buf);
        }
        None
    }

    fn json(&mut self, b: u8, depth: i32, in_string: bool, escape: bool) -> Option<Packet> {
        self.inbuffer.push(b);
        let (mut depth, mut in_string, mut escape) = (depth, in_string, escape);
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else {
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => depth -= 1,
                _ => {}
            }
        }
        if depth == 0 {
            let buf = self.inbuffer.clone();
            return self.emit(PacketKind::Json, buf);
        }
        if self.inbuffer.len() > MAX_PACKET_LENGTH {
            self.discard_bad();
            return None;
        }
        self.state = State::Json { depth, in_string, escape };
        None
    }

    fn ubx(&mut self, b: u8, header_seen: bool) -> Option<Packet> {
        self.inbuffer.push(b);
        if !header_seen {
            if self.inbuffer.len() == 2 {
                if b != 0x62 {
                    self.discard_bad();
                    return None;
                }
                self.state = State::Ubx { header_seen: true };
            }
            return None;
        }
        // header_seen: now accumulating class(1) id(1) len(2 LE) payload(len) ck_a ck_b
        const FIXED_HEADER: usize = 2 + 1 + 1 + 2; // sync(2) class id len
        if self.inbuffer.len() < FIXED_HEADER {
            return None;
        }
        let len = u16::from_le_bytes([self.inbuffer[4], self.inbuffer[5]]) as usize;
        let total = FIXED_HEADER + len + 2;
        if self.inbuffer.len() < total {
            if self.inbuffer.len() > MAX_PACKET_LENGTH {
                self.discard_bad();
            }
            return None;
        }
        let buf = self.inbuffer.clone();
        let body = &buf[2..FIXED_HEADER + len]; // class..payload, excludes sync & checksum
        let (ck_a, ck_b) = checksum::ubx::compute(body);
        if buf[total - 2] != ck_a || buf[total - 1] != ck_b {
            self.discard_bad();
            return None;
        }
        self.emit(PacketKind::Ubx, buf)
    }

    fn sirf(&mut self, b: u8) -> Option<Packet> {
        self.inbuffer.push(b);
        if self.inbuffer.len() == 2 {
            if b != 0xA2 {
                self.discard_bad();
            }
            return None;
        }
        const FIXED_HEADER: usize = 4; // A0 A2 len(2, BE, 15-bit)
        if self.inbuffer.len() < FIXED_HEADER {
            return None;
        }
        let len = (u16::from_be_bytes([self.inbuffer[2], self.inbuffer[3]]) & 0x7FFF) as usize;
        let total = FIXED_HEADER + len + 2 + 2; // + checksum(2) + trailer A0/A3... actually B0 B3
        if self.inbuffer.len() < total {
            if self.inbuffer.len() > MAX_PACKET_LENGTH {
                self.discard_bad();
            }
            return None;
        }
        let buf = self.inbuffer.clone();
        let payload = &buf[FIXED_HEADER..FIXED_HEADER + len];
        let checksum_val =
            u16::from_be_bytes([buf[FIXED_HEADER + len], buf[FIXED_HEADER + len + 1]]);
        let trailer = &buf[FIXED_HEADER + len + 2..];
        if trailer != [0xB0, 0xB3] || !checksum::sirf::verify(payload, checksum_val) {
            self.discard_bad();
            return None;
        }
        self.emit(PacketKind::SiRf, buf)
    }

    fn tsip(&mut self, b: u8) -> Option<Packet> {
        self.inbuffer.push(b);
        let n = self.inbuffer.len();
        if n >= 4
            && self.inbuffer[n - 2] == 0x10
            && self.inbuffer[n - 1] == 0x03
            && !(n >= 5 && self.inbuffer[n - 3] == 0x10 && self.inbuffer[n - 2] == 0x10)
        {
            let buf = self.inbuffer.clone();
            if checksum::tsip::verify_framing(&buf[1..]) {
                return self.emit(PacketKind::Tsip, buf);
            }
            self.discard_bad();
            return None;
        }
        if n > MAX_PACKET_LENGTH {
            self.discard_bad();
        }
        None
    }

    fn rtcm3(&mut self, b: u8) -> Option<Packet> {
        self.inbuffer.push(b);
        const FIXED_HEADER: usize = 3; // D3 + 6 reserved bits + 10-bit length
        if self.inbuffer.len() < FIXED_HEADER {
            return None;
        }
        let len = (((self.inbuffer[1] as usize) & 0x03) << 8) | self.inbuffer[2] as usize;
        let total = FIXED_HEADER + len + 3; // + CRC-24Q
        if self.inbuffer.len() < total {
            if self.inbuffer.len() > MAX_PACKET_LENGTH {
                self.discard_bad();
            }
            return None;
        }
        let buf = self.inbuffer.clone();
        let crc = ((buf[total - 3] as u32) << 16) | ((buf[total - 2] as u32) << 8) | buf[total - 1] as u32;
        if !checksum::rtcm3::verify(&buf[..total - 3], crc) {
            self.discard_bad();
            return None;
        }
        self.emit(PacketKind::Rtcm3, buf)
    }

    /// Simplified, byte-aligned RTCM2 framing: treats the 0x66 preamble
    /// byte (after parity stripping upstream would normally happen bit by
    /// bit) as a byte-aligned sync, then reads the header's length field to
    /// accumulate the rest of the message. Bit-level parity verification
    /// of each 30-bit word is performed by the RTCM2 payload decoder, not
    /// here; the lexer's job is purely to frame candidate byte ranges.
    fn rtcm2(&mut self, b: u8) -> Option<Packet> {
        self.inbuffer.push(b);
        const HEADER_WORDS: usize = 2;
        const WORD_BYTES: usize = 4; // 30 bits packed into 4 bytes, top 2 bits unused
        if self.inbuffer.len() < HEADER_WORDS * WORD_BYTES {
            return None;
        }
        // word 2 (bytes 4..8) carries the frame word-count in its low byte
        let word_count = self.inbuffer[7] as usize;
        let total = (HEADER_WORDS + word_count) * WORD_BYTES;
        if self.inbuffer.len() < total {
            if self.inbuffer.len() > MAX_PACKET_LENGTH {
                self.discard_bad();
            }
            return None;
        }
        let buf = self.inbuffer.clone();
        self.emit(PacketKind::Rtcm2, buf)
    }

    fn length_framed(&mut self, b: u8, spec: &'static LengthFramedSpec) -> Option<Packet> {
        self.inbuffer.push(b);
        if self.inbuffer.len() < spec.lead_in.len() {
            return None;
        }
        if &self.inbuffer[..spec.lead_in.len()] != spec.lead_in {
            self.discard_bad();
            return None;
        }
        if self.inbuffer.len() < spec.length_offset + spec.length_width as usize {
            return None;
        }
        let length_bytes =
            &self.inbuffer[spec.length_offset..spec.length_offset + spec.length_width as usize];
        let length = match (spec.length_width, spec.length_endian) {
            (1, _) => length_bytes[0] as usize,
            (2, Endian::Big) => u16::from_be_bytes([length_bytes[0], length_bytes[1]]) as usize,
            (2, Endian::Little) => u16::from_le_bytes([length_bytes[0], length_bytes[1]]) as usize,
            _ => 0,
        };
        let total = spec.header_len + length + spec.trailer_len;
        if self.inbuffer.len() < total {
            if self.inbuffer.len() > MAX_PACKET_LENGTH {
                self.discard_bad();
            }
            return None;
        }
        let buf = self.inbuffer.clone();
        self.emit(spec.kind, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nmea_gga() -> Vec<u8> {
        b"$GPGGA,172814.0,3723.46587704,N,12202.26957864,W,2,6,1.2,18.893,M,-25.669,M,2.0,0031*4F\r\n".to_vec()
    }

    #[test]
    fn nmea_frame_round_trip() {
        let mut lexer = Lexer::new();
        let sentence = nmea_gga();
        let pkt = lexer.feed(&sentence).expect("packet framed");
        assert_eq!(pkt.kind, PacketKind::Nmea);
        assert_eq!(pkt.payload, sentence);
    }

    #[test]
    fn incremental_feed_matches_whole_feed() {
        let sentence = nmea_gga();
        let mut whole = Lexer::new();
        let pkt_whole = whole.feed(&sentence).unwrap();

        let mut incremental = Lexer::new();
        let mut got = None;
        for chunk in sentence.chunks(3) {
            if let Some(p) = incremental.feed(chunk) {
                got = Some(p);
                break;
            }
        }
        let pkt_incremental = got.unwrap();
        assert_eq!(pkt_whole.payload, pkt_incremental.payload);
        assert_eq!(pkt_whole.kind, pkt_incremental.kind);
    }

    #[test]
    fn bad_checksum_is_discarded_and_resumes() {
        let mut bad = nmea_gga();
        let last_digit = bad.len() - 4;
        bad[last_digit] = b'0'; // corrupt checksum hex
        let mut good_after = nmea_gga();
        let mut stream = bad.clone();
        stream.extend_from_slice(&good_after);

        let mut lexer = Lexer::new();
        let pkt = lexer.feed(&stream).expect("should still frame the good one");
        assert_eq!(pkt.kind, PacketKind::Nmea);
        assert_eq!(pkt.payload, good_after);
        good_after.clear();
    }

    #[test]
    fn aivdm_disambiguated_by_bang() {
        let sentence = b"!AIVDM,1,1,,A,15MgK45P3@G?fl0E`JbR0OwT0@MS,0*4E\r\n".to_vec();
        let mut lexer = Lexer::new();
        let pkt = lexer.feed(&sentence).expect("framed");
        assert_eq!(pkt.kind, PacketKind::Aivdm);
    }

    #[test]
    fn ubx_frame_checksum() {
        let class = 0x01u8;
        let id = 0x07u8;
        let payload = vec![0xAAu8; 4];
        let mut body = vec![class, id];
        body.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        body.extend_from_slice(&payload);
        let (ck_a, ck_b) = checksum::ubx::compute(&body);
        let mut frame = vec![0xB5, 0x62];
        frame.extend_from_slice(&body);
        frame.push(ck_a);
        frame.push(ck_b);

        let mut lexer = Lexer::new();
        let pkt = lexer.feed(&frame).expect("framed");
        assert_eq!(pkt.kind, PacketKind::Ubx);
        assert_eq!(pkt.payload, frame);
    }

    #[test]
    fn rtcm3_1005_known_vector() {
        let frame: Vec<u8> = vec![
            0xD3, 0x00, 0x13, 0x3E, 0xD0, 0x00, 0x03, 0x8A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43, 0x4D, 0xEA,
        ];
        let mut lexer = Lexer::new();
        let pkt = lexer.feed(&frame).expect("framed");
        assert_eq!(pkt.kind, PacketKind::Rtcm3);
        assert_eq!(pkt.payload, frame);
    }

    #[test]
    fn json_passthrough_balances_braces() {
        let text = br#"{"class":"VERSION","release":"1.0","nested":{"a":1}}"#.to_vec();
        let mut lexer = Lexer::new();
        let pkt = lexer.feed(&text).expect("framed");
        assert_eq!(pkt.kind, PacketKind::Json);
        assert_eq!(pkt.payload, text);
    }

    #[test]
    fn comment_captures_to_newline() {
        let text = b"# this is a replay log header\n".to_vec();
        let mut lexer = Lexer::new();
        let pkt = lexer.feed(&text).expect("framed");
        assert_eq!(pkt.kind, PacketKind::Comment);
    }

    #[test]
    fn spartn_disabled_by_default() {
        let lexer = Lexer::new();
        assert!(!lexer.type_mask.allows(PacketKind::Spartn));
    }

    #[test]
    fn bad_byte_run_triggers_nodata() {
        let mut lexer = Lexer::new();
        let noise = vec![0x00u8; MAX_PACKET_LENGTH + 200];
        let outcome = lexer.feed_outcome(&noise);
        assert_eq!(outcome, LexerOutcome::NoData);
    }

    #[test]
    fn outbuflen_never_exceeds_max() {
        let mut lexer = Lexer::new();
        let mut junk = vec![b'$'];
        junk.extend(std::iter::repeat(b'A').take(MAX_PACKET_LENGTH * 2));
        let _ = lexer.feed(&junk);
        assert!(lexer.inbuffer.len() <= MAX_PACKET_LENGTH);
    }
}
