// SPDX-License-Identifier: MIT OR Apache-2.0
//! Byte parser (component C4, spec.md §4.4).
//!
//! A cooperative, non-blocking, single-threaded state machine: `feed`
//! consumes whatever bytes the transport handed it and yields typed
//! events as it recognizes them, suspending with its partial state
//! intact when a chunk ends mid-header or mid-subpacket. Grounded on
//! the base crate's `Header::read`/`read_subpacket` in `lib.rs`, which
//! implement the identical byte-level logic (format detection, hex
//! decode, ZDLE unescape, CRC residue check, subpacket terminator
//! detection) but block on a live `Read` impl; this module carries the
//! same call-stack suspension points over to explicit fields so a
//! chunk boundary can land anywhere without losing state (spec.md §4.4,
//! §9 "push bytes, pull events").

use core::convert::TryFrom;
use tinyvec::ArrayVec;

use crate::consts::{Encoding, Frame, Packet, ASCII_CAN, ASCII_XOFF, ASCII_XON, HEADER_RAW_MAX, PKTBUFSIZE, ZDLE, ZPAD};
use crate::crc::{Digest, Width};
use crate::error::{Result, ZmodemError};
use crate::escape;

pub type PacketBuf = ArrayVec<[u8; PKTBUFSIZE]>;

#[derive(Debug, Clone)]
pub enum ParserEvent {
    /// A header frame with valid CRC. `frame` is looked up by the type
    /// byte; `payload` is p0..p3; `encoding` is the framing the header
    /// arrived in (ZBIN/ZBIN32/ZHEX) — a ZBIN/ZBIN32 header that arms a
    /// data subpacket also governs that subpacket's framing, since
    /// ZHEX headers never carry a following subpacket (spec.md §4.3).
    Header {
        frame: Frame,
        payload: [u8; 4],
        encoding: Encoding,
    },
    /// A header's CRC check (or format tag, or hex digits) failed.
    /// The session replies ZNAK; the parser has already returned to
    /// IDLE.
    BadHeader(&'static str),
    /// A data subpacket's trailer arrived. `crc_ok` reflects the CRC
    /// residue check; if false, `payload` must not be delivered to
    /// `on_receive` (spec.md §4.4, §4.5 file-data handler step 1).
    Data {
        terminator: Packet,
        payload: PacketBuf,
        crc_ok: bool,
    },
    /// Five consecutive CAN bytes (spec.md §8 property 6).
    Cancel,
    /// Two consecutive 'O's seen while `expect_oo` was set (spec.md's
    /// OO/FINISH handshake).
    Oo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdleSub {
    Hunt,
    SawZpad,
    SawO,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderSub {
    Format,
    /// Collecting raw (ZBIN/ZBIN32) or hex-pair (ZHEX) payload bytes.
    /// `hi_digit` is only meaningful for ZHEX.
    Payload,
}

#[derive(Debug, Clone)]
struct HeaderCollector {
    encoding: Encoding,
    sub: HeaderSub,
    escape_pending: bool,
    /// First raw ASCII hex digit of the pair currently being collected,
    /// for ZHEX. The actual nibble math is left to the `hex` crate once
    /// both digits of the pair are in hand.
    hi_digit: Option<u8>,
    buf: ArrayVec<[u8; HEADER_RAW_MAX]>,
    need: usize,
}

impl HeaderCollector {
    fn new(encoding: Encoding) -> Self {
        let need = match encoding {
            Encoding::ZBIN => 7,
            Encoding::ZBIN32 => 9,
            Encoding::ZHEX => 7,
        };
        HeaderCollector {
            encoding,
            sub: HeaderSub::Payload,
            escape_pending: false,
            hi_digit: None,
            buf: ArrayVec::new(),
            need,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataSub {
    /// Collecting escaped payload bytes, watching for a ZDLE-prefixed
    /// terminator code.
    Payload,
    /// Terminator seen; collecting the remaining (still escaped) CRC
    /// trailer bytes.
    Trailer,
}

#[derive(Debug, Clone)]
struct DataCollector {
    encoding: Encoding,
    sub: DataSub,
    escape_pending: bool,
    buf: PacketBuf,
    terminator: Option<Packet>,
    trailer_remaining: usize,
}

#[derive(Debug, Clone)]
enum Phase {
    Idle(IdleSub),
    Header(HeaderCollector),
    Data(DataCollector),
}

/// The streaming byte parser. Owned by [`crate::session::ReceiveSession`]
/// as a field (spec.md §9: "explicit composition" rather than a cast to
/// a derived struct).
#[derive(Debug, Clone)]
pub struct Parser {
    phase: Phase,
    can_count: u8,
    expect_oo: bool,
    escctrl: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Parser {
            phase: Phase::Idle(IdleSub::Hunt),
            can_count: 0,
            expect_oo: false,
            escctrl: false,
        }
    }
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the parser to collect a data subpacket framed with
    /// `encoding`, entered after a header that arms DATA (ZFILE,
    /// ZSINIT, ZDATA, ZCOMMAND, ZSTDERR — spec.md §4.4's "DATA state").
    pub fn arm_data(&mut self, encoding: Encoding) {
        self.phase = Phase::Data(DataCollector {
            encoding,
            sub: DataSub::Payload,
            escape_pending: false,
            buf: PacketBuf::new(),
            terminator: None,
            trailer_remaining: 0,
        });
    }

    /// Forces the parser back to IDLE, discarding any in-flight header
    /// or subpacket. Used after a session-level reset or CRC-failed
    /// resync (spec.md §4.5: "discard the current receive window").
    pub fn reset_to_idle(&mut self) {
        self.phase = Phase::Idle(IdleSub::Hunt);
    }

    /// The host sets this when entering FINISH so the parser recognizes
    /// the sender's "OO" end-of-session marker (spec.md §4.4's "OO"
    /// handling, §3's `flags.OO`).
    pub fn set_expect_oo(&mut self, expect: bool) {
        self.expect_oo = expect;
    }

    /// Sets whether the HEADER/DATA escape rule also escapes low
    /// control characters, mirrored from the sender's ZSINIT/ZRINIT
    /// capability exchange (spec.md §4.2's ESCCTRL flag). This only
    /// affects how *we* would encode; the decode side tolerates either.
    pub fn set_escctrl(&mut self, escctrl: bool) {
        self.escctrl = escctrl;
    }

    pub fn feed<'p, 'b>(&'p mut self, bytes: &'b [u8]) -> EventIter<'p, 'b> {
        EventIter {
            parser: self,
            bytes: bytes.iter(),
        }
    }

    /// Admits one raw (possibly transport-flow-control) byte, returning
    /// an event if one was completed. Spec.md §4.4: "CAN counting is
    /// performed before the switch"; XON/XOFF are swallowed everywhere
    /// except inside an in-progress escape.
    fn admit(&mut self, byte: u8) -> Option<Result<ParserEvent>> {
        if byte == ASCII_CAN {
            self.can_count += 1;
        } else {
            self.can_count = 0;
        }
        if self.can_count >= 5 {
            self.can_count = 0;
            self.reset_to_idle();
            return Some(Ok(ParserEvent::Cancel));
        }

        let escape_in_progress = match &self.phase {
            Phase::Header(h) => h.escape_pending,
            Phase::Data(d) => d.escape_pending,
            Phase::Idle(_) => false,
        };
        if !escape_in_progress && matches!(byte, ASCII_XON | ASCII_XOFF) {
            return None;
        }

        match &mut self.phase {
            Phase::Idle(_) => self.admit_idle(byte),
            Phase::Header(_) => self.admit_header(byte),
            Phase::Data(_) => self.admit_data(byte),
        }
    }

    fn admit_idle(&mut self, byte: u8) -> Option<Result<ParserEvent>> {
        let sub = match &self.phase {
            Phase::Idle(s) => *s,
            _ => unreachable!(),
        };
        match (sub, byte) {
            (_, ZPAD) => {
                self.phase = Phase::Idle(IdleSub::SawZpad);
                None
            }
            (IdleSub::SawZpad, ZDLE) => {
                self.phase = Phase::Header(HeaderCollector {
                    encoding: Encoding::ZBIN,
                    sub: HeaderSub::Format,
                    escape_pending: false,
                    hi_digit: None,
                    buf: ArrayVec::new(),
                    need: 0,
                });
                None
            }
            (IdleSub::Hunt, b'O') if self.expect_oo => {
                self.phase = Phase::Idle(IdleSub::SawO);
                None
            }
            (IdleSub::SawO, b'O') => {
                self.expect_oo = false;
                self.phase = Phase::Idle(IdleSub::Hunt);
                Some(Ok(ParserEvent::Oo))
            }
            _ => {
                self.phase = Phase::Idle(IdleSub::Hunt);
                None
            }
        }
    }

    fn admit_header(&mut self, byte: u8) -> Option<Result<ParserEvent>> {
        let h = match &mut self.phase {
            Phase::Header(h) => h,
            _ => unreachable!(),
        };

        if h.sub == HeaderSub::Format {
            let encoding = match Encoding::try_from(byte) {
                Ok(e) => e,
                Err(()) => {
                    self.reset_to_idle();
                    return Some(Ok(ParserEvent::BadHeader("unknown header format tag")));
                }
            };
            *h = HeaderCollector::new(encoding);
            return None;
        }

        // Unescape this raw wire byte into its logical value.
        let logical = if h.escape_pending {
            h.escape_pending = false;
            escape::unescape_byte(byte)
        } else if byte == ZDLE {
            h.escape_pending = true;
            return None;
        } else {
            byte
        };

        match h.encoding {
            Encoding::ZHEX => match h.hi_digit.take() {
                None => {
                    h.hi_digit = Some(logical);
                    None
                }
                Some(hi) => {
                    let mut decoded = [0u8; 1];
                    if hex::decode_to_slice([hi, logical], &mut decoded).is_err() {
                        self.reset_to_idle();
                        return Some(Ok(ParserEvent::BadHeader("invalid hex digit")));
                    }
                    if h.buf.try_push(decoded[0]).is_some() {
                        self.reset_to_idle();
                        return Some(Err(ZmodemError::BufferOverflow));
                    }
                    self.maybe_finish_header()
                }
            },
            Encoding::ZBIN | Encoding::ZBIN32 => {
                if h.buf.try_push(logical).is_some() {
                    self.reset_to_idle();
                    return Some(Err(ZmodemError::BufferOverflow));
                }
                self.maybe_finish_header()
            }
        }
    }

    fn maybe_finish_header(&mut self) -> Option<Result<ParserEvent>> {
        let h = match &self.phase {
            Phase::Header(h) => h,
            _ => unreachable!(),
        };
        if h.buf.len() < h.need {
            return None;
        }

        let width = if h.encoding == Encoding::ZBIN32 {
            Width::Crc32
        } else {
            Width::Crc16
        };
        let mut digest = Digest::new(width);
        for &b in h.buf.iter() {
            digest.update(b);
        }
        let crc_ok = digest.is_residue_ok();
        let buf = h.buf.clone();
        let encoding = h.encoding;
        self.reset_to_idle();

        if !crc_ok {
            return Some(Ok(ParserEvent::BadHeader("crc mismatch")));
        }
        let frame = match Frame::try_from(buf[0]) {
            Ok(f) => f,
            Err(()) => return Some(Ok(ParserEvent::BadHeader("unknown frame type"))),
        };
        let payload = [buf[1], buf[2], buf[3], buf[4]];
        Some(Ok(ParserEvent::Header { frame, payload, encoding }))
    }

    fn admit_data(&mut self, byte: u8) -> Option<Result<ParserEvent>> {
        let d = match &mut self.phase {
            Phase::Data(d) => d,
            _ => unreachable!(),
        };

        match d.sub {
            DataSub::Payload => {
                if d.escape_pending {
                    d.escape_pending = false;
                    // A byte immediately following ZDLE is first checked
                    // against the subpacket terminator codes before
                    // falling back to ordinary XOR-unescape (grounded on
                    // the base crate's `read_subpacket`).
                    if let Ok(term) = Packet::try_from(byte) {
                        d.terminator = Some(term);
                        d.sub = DataSub::Trailer;
                        d.trailer_remaining = if d.encoding == Encoding::ZBIN32 { 4 } else { 2 };
                        return None;
                    }
                    let logical = escape::unescape_byte(byte);
                    if d.buf.try_push(logical).is_some() {
                        self.reset_to_idle();
                        return Some(Err(ZmodemError::BufferOverflow));
                    }
                    None
                } else if byte == ZDLE {
                    d.escape_pending = true;
                    None
                } else {
                    if d.buf.try_push(byte).is_some() {
                        self.reset_to_idle();
                        return Some(Err(ZmodemError::BufferOverflow));
                    }
                    None
                }
            }
            DataSub::Trailer => {
                let logical = if d.escape_pending {
                    d.escape_pending = false;
                    escape::unescape_byte(byte)
                } else if byte == ZDLE {
                    d.escape_pending = true;
                    return None;
                } else {
                    byte
                };

                if d.buf.try_push(logical).is_some() {
                    self.reset_to_idle();
                    return Some(Err(ZmodemError::BufferOverflow));
                }
                d.trailer_remaining -= 1;
                if d.trailer_remaining > 0 {
                    return None;
                }

                // CRC covers payload + terminator + trailer bytes, all
                // already sitting in `buf` (terminator was never pushed
                // separately — push it now to match the residue layout
                // spec.md §4.4 describes: "packet_buf[0..packet_len]
                // (which includes payload + terminator + CRC bytes)").
                let width = if d.encoding == Encoding::ZBIN32 { Width::Crc32 } else { Width::Crc16 };
                let terminator = d.terminator.expect("trailer state implies terminator set");
                let trailer_len = width.trailer_len();
                let mut digest = Digest::new(width);
                let payload_len = d.buf.len() - trailer_len;
                for &b in &d.buf[..payload_len] {
                    digest.update(b);
                }
                digest.update(terminator as u8);
                for &b in &d.buf[payload_len..] {
                    digest.update(b);
                }
                let crc_ok = digest.is_residue_ok();

                let mut payload = PacketBuf::new();
                payload.extend_from_slice(&d.buf[..payload_len]);
                self.reset_to_idle();
                Some(Ok(ParserEvent::Data {
                    terminator,
                    payload,
                    crc_ok,
                }))
            }
        }
    }
}

/// Iterator returned by [`Parser::feed`]: pulls events out of the bytes
/// already handed in, one `next()` call at a time, per spec.md §9's
/// "push bytes, pull events" shape.
pub struct EventIter<'p, 'b> {
    parser: &'p mut Parser,
    bytes: core::slice::Iter<'b, u8>,
}

impl Iterator for EventIter<'_, '_> {
    type Item = Result<ParserEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        for &byte in self.bytes.by_ref() {
            if let Some(event) = self.parser.admit(byte) {
                return Some(event);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::Frame;

    fn collect(parser: &mut Parser, bytes: &[u8]) -> Vec<ParserEvent> {
        parser.feed(bytes).map(|e| e.unwrap()).collect()
    }

    #[test]
    fn zhex_zrqinit_round_trip() {
        let header = crate::frame::encode_header(Encoding::ZHEX, Frame::ZRQINIT, [0; 4]);
        let mut parser = Parser::new();
        let events = collect(&mut parser, &header);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ParserEvent::Header { frame, payload, encoding } => {
                assert_eq!(*frame, Frame::ZRQINIT);
                assert_eq!(*payload, [0; 4]);
                assert_eq!(*encoding, Encoding::ZHEX);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn zbin32_header_round_trip() {
        let header = crate::frame::encode_header(Encoding::ZBIN32, Frame::ZRINIT, [5, 0, 0, 0x23]);
        let mut parser = Parser::new();
        let events = collect(&mut parser, &header);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ParserEvent::Header { frame: Frame::ZRINIT, payload, .. } if *payload == [5,0,0,0x23]));
    }

    #[test]
    fn chunking_invariance_single_byte_vs_whole() {
        let header = crate::frame::encode_header(Encoding::ZBIN, Frame::ZFILE, [1, 2, 3, 4]);

        let mut whole = Parser::new();
        let whole_events: Vec<_> = whole.feed(&header).map(|e| e.unwrap()).collect();

        let mut byte_at_a_time = Parser::new();
        let mut split_events = Vec::new();
        for b in &header {
            split_events.extend(byte_at_a_time.feed(core::slice::from_ref(b)).map(|e| e.unwrap()));
        }

        assert_eq!(whole_events.len(), split_events.len());
        for (a, b) in whole_events.iter().zip(split_events.iter()) {
            match (a, b) {
                (
                    ParserEvent::Header { frame: f1, payload: p1, .. },
                    ParserEvent::Header { frame: f2, payload: p2, .. },
                ) => {
                    assert_eq!(f1, f2);
                    assert_eq!(p1, p2);
                }
                _ => panic!("event shape mismatch"),
            }
        }
    }

    #[test]
    fn bad_crc_header_raises_bad_header_event() {
        let mut header = crate::frame::encode_header(Encoding::ZHEX, Frame::ZFILE, [0; 4]).to_vec();
        // corrupt the last hex digit of the CRC
        let len = header.len();
        header[len - 5] = b'0';
        let mut parser = Parser::new();
        let events = collect(&mut parser, &header);
        assert!(matches!(events.last(), Some(ParserEvent::BadHeader(_))));
    }

    #[test]
    fn data_subpacket_round_trip() {
        let payload = b"hello";
        let trailer = crate::frame::encode_subpacket_trailer(Encoding::ZBIN32, payload, Packet::ZCRCW);
        let mut wire = Vec::new();
        wire.extend_from_slice(payload);
        wire.extend_from_slice(&trailer);

        let mut parser = Parser::new();
        parser.arm_data(Encoding::ZBIN32);
        let events: Vec<_> = parser.feed(&wire).map(|e| e.unwrap()).collect();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ParserEvent::Data { terminator, payload: got, crc_ok } => {
                assert_eq!(*terminator, Packet::ZCRCW);
                assert_eq!(&got[..], payload);
                assert!(crc_ok);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn five_cans_raise_cancel() {
        let mut parser = Parser::new();
        let events = collect(&mut parser, &[ASCII_CAN; 5]);
        assert!(matches!(events.last(), Some(ParserEvent::Cancel)));
    }

    #[test]
    fn oo_sequence_after_expect_oo() {
        let mut parser = Parser::new();
        parser.set_expect_oo(true);
        let events = collect(&mut parser, b"OO");
        assert!(matches!(events.last(), Some(ParserEvent::Oo)));
    }
}
