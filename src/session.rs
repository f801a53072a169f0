// SPDX-License-Identifier: MIT OR Apache-2.0
//! Receive state machine (component C5, spec.md §4.5).
//!
//! `ReceiveSession` owns the parser (C4) and drives it: header and data
//! events advance a `State × Event -> action + next-state` table,
//! emitting reply frames through the host's [`ZmodemIo`]. Grounded on
//! the base crate's dead `recv.rs` (which already sketches a `State`
//! enum and `State::next` table for this exact shape) and
//! `original_source/zm_receive.c`'s per-state transition tables
//! (`g_zmr_start[]` through `g_zmr_done[]`) for the exact action
//! semantics spec.md's abridged table in §4.5 compresses.

use crate::consts::{Capabilities, Encoding, Frame, Packet, CANCEL_SEQUENCE};
use crate::error::{Result, ZmodemError};
use crate::io::ZmodemIo;
use crate::parser::{Parser, ParserEvent};

/// ZFILE's F0 conversion-option byte. Values per the Forsberg document;
/// `original_source/` doesn't ship the header defining them, so these
/// are reconstructed from the spec rather than transcribed — recorded
/// in DESIGN.md.
mod zfile_flags {
    pub const ZCBIN: u8 = 1;
    pub const ZCNL: u8 = 2;
    pub const ZCRESUM: u8 = 3;
    pub const ZMMASK: u8 = 0x1f;
    pub const ZMCRC: u8 = 2;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Start,
    InitWait,
    FileInfo,
    CrcWait,
    ReadReady,
    Reading,
    Finish,
    Command,
    Message,
    Done,
}

bitflags::bitflags! {
    /// Session-wide flags, spec.md §3. `ESC` (mid zdle-escape) is not
    /// represented here: that bit lives entirely inside [`Parser`]'s
    /// own substate, since only the parser ever needs it (spec.md §9's
    /// "explicit composition" note — C4 and C5 stay separately
    /// testable, so C4-only state isn't duplicated up into C5).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SessionFlags: u8 {
        const CRC32 = 0x01;
        const CRKOK = 0x02;
        const ATSIGN = 0x04;
        const OO = 0x08;
        const WAIT = 0x10;
        const ESCCTRL = 0x20;
    }
}

/// Runtime tunables, replacing the source's `CONFIG_SYSTEM_ZMODEM_*`
/// compile-time knobs (SPEC_FULL.md §6).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Advertised receive buffer size, carried in ZRINIT p0/p1.
    pub rcvbufsize: u16,
    /// Data errors tolerated in READING before the transfer is
    /// cancelled. Grounded on `CONFIG_SYSTEM_ZMODEM_MAXERRORS` (20).
    pub max_errors: u8,
    /// Retries allowed in START/INITWAIT/FILEINFO before `-ETIMEDOUT`.
    pub retries_long: u8,
    /// Retries allowed in CRCWAIT/READREADY/READING before
    /// `-ETIMEDOUT`.
    pub retries_short: u8,
    /// Receiver serial number reported in the ZACK that follows ZSINIT.
    pub serialno: u32,
    /// Capability bits advertised in ZRINIT's p3.
    pub rcaps: Capabilities,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            rcvbufsize: 1024,
            max_errors: 20,
            retries_long: 4,
            retries_short: 2,
            serialno: 1,
            rcaps: Capabilities::CANFDX | Capabilities::CANOVIO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    XferDone,
}

/// A decoded ZFILE filename block: NUL-terminated name followed by a
/// space-separated ASCII tuple (spec.md §4.5 "Filename payload").
#[derive(Debug, Clone, Default)]
struct FileMeta {
    name: String,
    size: u64,
    mtime: u32,
    mode: u32,
    serial: u32,
    files_remaining: i64,
    bytes_remaining: u64,
    file_type: i64,
}

fn parse_file_meta(payload: &[u8]) -> Option<FileMeta> {
    let nul = payload.iter().position(|&b| b == 0)?;
    let name = String::from_utf8_lossy(&payload[..nul]).into_owned();
    let rest = String::from_utf8_lossy(&payload[nul + 1..]);
    let mut fields = rest.split_whitespace();

    let mut meta = FileMeta {
        name,
        ..Default::default()
    };
    if let Some(f) = fields.next() {
        meta.size = f.parse().unwrap_or(0);
    }
    if let Some(f) = fields.next() {
        meta.mtime = u32::from_str_radix(f, 8).unwrap_or(0);
    }
    if let Some(f) = fields.next() {
        meta.mode = u32::from_str_radix(f, 8).unwrap_or(0);
    }
    if let Some(f) = fields.next() {
        meta.serial = u32::from_str_radix(f, 8).unwrap_or(0);
    }
    if let Some(f) = fields.next() {
        meta.files_remaining = f.parse().unwrap_or(0);
    }
    if let Some(f) = fields.next() {
        meta.bytes_remaining = f.parse().unwrap_or(0);
    }
    if let Some(f) = fields.next() {
        meta.file_type = f.parse().unwrap_or(0);
    }
    Some(meta)
}

/// One receive-side ZMODEM transfer. Owns the byte parser, session
/// flags, file metadata, and the host [`ZmodemIo`] collaborator.
/// Spec.md §3's "Session state".
pub struct ReceiveSession<IO: ZmodemIo> {
    io: IO,
    state: State,
    parser: Parser,
    flags: SessionFlags,
    timeouts: u8,
    nerrors: u8,
    offset: u64,
    filename: Option<String>,
    attn: Option<String>,
    filesize: u64,
    timestamp: u32,
    scaps: u8,
    f0: u8,
    f1: u8,
    config: SessionConfig,
}

impl<IO: ZmodemIo> ReceiveSession<IO> {
    pub fn new(io: IO, config: SessionConfig) -> Self {
        ReceiveSession {
            io,
            state: State::Start,
            parser: Parser::new(),
            flags: SessionFlags::empty(),
            timeouts: 0,
            nerrors: 0,
            offset: 0,
            filename: None,
            attn: None,
            filesize: 0,
            timestamp: 0,
            scaps: 0,
            f0: 0,
            f1: 0,
            config,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Size in bytes announced by the ZFILE payload (spec.md §3's ZFILE
    /// metadata).
    pub fn filesize(&self) -> u64 {
        self.filesize
    }

    /// Modification time announced by the ZFILE payload, Unix epoch
    /// seconds as parsed from the octal `mtime` field.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// The peer's advertised capabilities, captured from ZSINIT's p3.
    pub fn peer_capabilities(&self) -> Capabilities {
        Capabilities::from_bits_truncate(self.scaps)
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    /// Sends the opening ZRINIT that kicks off a receive session.
    /// Mirrors `zmr_initialize` sending the first invitation before any
    /// bytes have arrived from the peer.
    pub fn start(&mut self) -> Result<()> {
        self.resend_zrinit()
    }

    /// Feeds newly arrived transport bytes through the parser and
    /// drives every event it yields through the state machine. Never
    /// blocks (spec.md §4.4/§5).
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Status> {
        let events: Vec<Result<ParserEvent>> = self.parser.feed(bytes).collect();
        for event in events {
            match self.dispatch(event?)? {
                Status::XferDone => return Ok(Status::XferDone),
                Status::Ok => {}
            }
        }
        Ok(Status::Ok)
    }

    /// Host-driven timeout progression; the engine owns no clock
    /// (spec.md §4.5 "Timeouts", §9).
    pub fn on_timeout(&mut self) -> Result<Status> {
        self.timeouts += 1;
        let (limit, retry): (u8, fn(&mut Self) -> Result<()>) = match self.state {
            State::Start | State::InitWait | State::FileInfo => (self.config.retries_long, Self::resend_zrinit),
            State::CrcWait => (self.config.retries_short, Self::resend_zcrc),
            State::ReadReady | State::Reading => (self.config.retries_short, Self::resend_zrpos),
            State::Finish => (0, |_| Ok(())),
            State::Command | State::Message | State::Done => (self.config.retries_long, Self::resend_zrinit),
        };

        if self.state == State::Finish {
            return Err(ZmodemError::Timeout(self.state));
        }
        if self.timeouts > limit {
            if matches!(self.state, State::CrcWait | State::ReadReady | State::Reading) {
                self.timeouts = 0;
                self.state = State::Start;
                self.resend_zrinit()?;
                return Ok(Status::Ok);
            }
            return Err(ZmodemError::Timeout(self.state));
        }
        retry(self)?;
        Ok(Status::Ok)
    }

    /// Host-initiated cancellation: same outcome as an inbound CAN×5
    /// (spec.md §5).
    pub fn cancel(&mut self) -> Result<()> {
        self.send_cancel_sequence()
    }

    fn dispatch(&mut self, event: ParserEvent) -> Result<Status> {
        match event {
            ParserEvent::Cancel => {
                self.send_cancel_sequence()?;
                Err(ZmodemError::Cancelled)
            }
            ParserEvent::BadHeader(reason) => {
                log::warn!("bad header: {reason}");
                self.send_header(Frame::ZNAK, [0; 4])?;
                Ok(Status::Ok)
            }
            ParserEvent::Oo => self.on_oo(),
            ParserEvent::Header { frame, payload, encoding } => self.on_header(frame, payload, encoding),
            ParserEvent::Data { terminator, payload, crc_ok } => {
                self.flags.set(SessionFlags::CRKOK, crc_ok);
                match self.state {
                    State::InitWait => self.on_sinit_data(crc_ok, &payload),
                    State::FileInfo => self.on_filename_data(crc_ok, &payload),
                    State::CrcWait => self.on_crcwait_data(crc_ok, &payload),
                    State::Reading => self.on_file_data(terminator, crc_ok, &payload),
                    State::Command | State::Message => {
                        self.state = State::Start;
                        Ok(Status::Ok)
                    }
                    _ => self.wildcard_error(),
                }
            }
        }
    }

    fn on_header(&mut self, frame: Frame, payload: [u8; 4], encoding: Encoding) -> Result<Status> {
        self.timeouts = 0;
        log::debug!("state {:?}: received {:?}", self.state, frame);
        match (self.state, frame) {
            (_, Frame::ZRQINIT) => {
                self.state = State::Start;
                self.resend_zrinit()?;
                Ok(Status::Ok)
            }
            (State::Start, Frame::ZSINIT) => {
                self.scaps = payload[3];
                self.flags.set(SessionFlags::ESCCTRL, payload[3] & Capabilities::ESCCTL.bits() != 0);
                self.parser.set_escctrl(self.flags.contains(SessionFlags::ESCCTRL));
                self.state = State::InitWait;
                self.parser.arm_data(encoding);
                Ok(Status::Ok)
            }
            (State::Start, Frame::ZFILE) => {
                self.nerrors = 0;
                self.flags.remove(SessionFlags::OO);
                self.f1 = payload[2];
                self.f0 = payload[3];
                self.state = State::FileInfo;
                self.parser.arm_data(encoding);
                Ok(Status::Ok)
            }
            (State::Start, Frame::ZFIN) | (State::Finish, Frame::ZFIN) => {
                self.state = State::Finish;
                self.parser.set_expect_oo(true);
                self.send_header(Frame::ZFIN, [0; 4])
            }
            (_, Frame::ZNAK) => self.on_nak(),
            (State::Start, Frame::ZFREECNT) => self.send_header(Frame::ZACK, u32::MAX.to_le_bytes()).map(|_| Status::Ok),
            (State::Start, Frame::ZCOMMAND) => {
                self.state = State::Command;
                self.parser.arm_data(encoding);
                Ok(Status::Ok)
            }
            (State::Start, Frame::ZSTDERR) => {
                self.state = State::Message;
                self.parser.arm_data(encoding);
                Ok(Status::Ok)
            }
            (State::CrcWait, Frame::ZCRC) => {
                self.state = State::ReadReady;
                self.send_zrpos()
            }
            (State::ReadReady, Frame::ZDATA) => {
                let remote_offset = u32::from_be_bytes(payload) as u64;
                if remote_offset != self.offset {
                    self.send_attn()?;
                    return self.send_zrpos().map(|_| Status::Ok);
                }
                self.state = State::Reading;
                self.parser.arm_data(encoding);
                Ok(Status::Ok)
            }
            (State::ReadReady, Frame::ZEOF) | (State::Reading, Frame::ZEOF) => {
                let claimed = u32::from_be_bytes(payload) as u64;
                if claimed != self.offset {
                    self.state = State::ReadReady;
                    return Ok(Status::Ok);
                }
                self.state = State::Start;
                self.resend_zrinit()?;
                Ok(Status::Ok)
            }
            (State::Reading, Frame::ZDATA) => {
                // sender re-armed DATA without a new subpacket boundary;
                // treat exactly like ReadReady's ZDATA offset check.
                let remote_offset = u32::from_be_bytes(payload) as u64;
                if remote_offset != self.offset {
                    self.send_attn()?;
                    return self.send_zrpos().map(|_| Status::Ok);
                }
                self.parser.arm_data(encoding);
                Ok(Status::Ok)
            }
            _ => self.wildcard_error(),
        }
    }

    fn on_nak(&mut self) -> Result<Status> {
        match self.state {
            State::Start => self.resend_zrinit().map(|_| Status::Ok),
            State::CrcWait => self.resend_zcrc().map(|_| Status::Ok),
            State::ReadReady => self.resend_zrpos().map(|_| Status::Ok),
            _ => self.wildcard_error(),
        }
    }

    fn on_oo(&mut self) -> Result<Status> {
        if self.state == State::Finish {
            self.state = State::Done;
            return Ok(Status::XferDone);
        }
        self.wildcard_error()
    }

    fn on_sinit_data(&mut self, crc_ok: bool, payload: &[u8]) -> Result<Status> {
        self.state = State::Start;
        if crc_ok {
            self.attn = Some(String::from_utf8_lossy(payload).into_owned());
            self.send_header(Frame::ZACK, self.config.serialno.to_le_bytes())?;
        } else {
            self.send_header(Frame::ZNAK, [0; 4])?;
        }
        Ok(Status::Ok)
    }

    fn on_filename_data(&mut self, crc_ok: bool, payload: &[u8]) -> Result<Status> {
        self.state = State::Start;
        if !crc_ok {
            self.send_header(Frame::ZNAK, [0; 4])?;
            return Ok(Status::Ok);
        }

        let meta = parse_file_meta(payload).ok_or(ZmodemError::BadHeader("unparsable ZFILE payload"))?;
        self.filename = Some(meta.name);
        self.filesize = meta.size;
        self.timestamp = meta.mtime;

        if self.f1 & zfile_flags::ZMMASK == zfile_flags::ZMCRC {
            self.state = State::CrcWait;
            self.send_header(Frame::ZCRC, [0; 4])?;
        } else {
            self.state = State::ReadReady;
            self.offset = 0;
            self.send_zrpos()?;
        }
        Ok(Status::Ok)
    }

    fn on_crcwait_data(&mut self, crc_ok: bool, _payload: &[u8]) -> Result<Status> {
        if !crc_ok {
            self.send_header(Frame::ZNAK, [0; 4])?;
            return Ok(Status::Ok);
        }
        self.state = State::ReadReady;
        self.offset = 0;
        self.send_zrpos()?;
        Ok(Status::Ok)
    }

    /// The READING-state DATARCVD handler, spec.md §4.5 "File-data
    /// handler".
    fn on_file_data(&mut self, terminator: Packet, crc_ok: bool, payload: &[u8]) -> Result<Status> {
        if !crc_ok {
            self.nerrors += 1;
            log::warn!("{} data errors", self.nerrors);
            if self.nerrors > self.config.max_errors {
                self.send_cancel_sequence()?;
                return Err(ZmodemError::Cancelled);
            }
            self.state = State::ReadReady;
            self.send_attn()?;
            return self.send_zrpos().map(|_| Status::Ok);
        }

        let zcnl = self.f0 == zfile_flags::ZCNL;
        if let Err(err) = self.io.on_receive(payload, zcnl) {
            self.state = State::Finish;
            let code = -5i32; // EIO-equivalent; the callback's own error is logged, not threaded through the wire.
            let _ = self.send_attn();
            let _ = self.send_header(Frame::ZFERR, code.to_le_bytes());
            return Err(err);
        }

        self.offset += payload.len() as u64;
        log::debug!("offset {} after {:?}", self.offset, terminator);

        match terminator {
            Packet::ZCRCE | Packet::ZCRCW => {
                self.state = State::ReadReady;
            }
            Packet::ZCRCG | Packet::ZCRCQ => {
                // stay in Reading; keep collecting the next subpacket
            }
        }

        if matches!(terminator, Packet::ZCRCQ | Packet::ZCRCW) {
            self.send_header(Frame::ZACK, (self.offset as u32).to_be_bytes())?;
        }
        Ok(Status::Ok)
    }

    fn wildcard_error(&mut self) -> Result<Status> {
        self.flags.insert(SessionFlags::WAIT);
        Ok(Status::Ok)
    }

    fn resend_zrinit(&mut self) -> Result<()> {
        let [lo, hi] = self.config.rcvbufsize.to_le_bytes();
        self.send_header(Frame::ZRINIT, [lo, hi, 0, self.config.rcaps.bits()])
    }

    fn resend_zcrc(&mut self) -> Result<()> {
        self.send_header(Frame::ZCRC, [0; 4])
    }

    fn resend_zrpos(&mut self) -> Result<()> {
        self.send_zrpos().map(|_| ())
    }

    fn send_zrpos(&mut self) -> Result<Status> {
        self.send_header(Frame::ZRPOS, (self.offset as u32).to_be_bytes())?;
        Ok(Status::Ok)
    }

    /// Every reply this receive engine sends uses the ZHEX framing,
    /// matching `original_source/zm_receive.c`'s action handlers, which
    /// exclusively call `zm_sendhexhdr`.
    fn send_header(&mut self, frame: Frame, payload: [u8; 4]) -> Result<()> {
        let bytes = crate::frame::encode_header(Encoding::ZHEX, frame, payload);
        self.io.write(&bytes)
    }

    /// Replays the Attn string captured from ZSINIT before a corrective
    /// reply, mirroring `zmr_fileerror`'s send of `pzmr->attn` ahead of
    /// ZRPOS/ZFERR (`original_source/zm_receive.c:1157-1233`). A no-op
    /// if the peer never sent one.
    fn send_attn(&mut self) -> Result<()> {
        if let Some(attn) = self.attn.clone() {
            self.io.write(attn.as_bytes())?;
        }
        Ok(())
    }

    fn send_cancel_sequence(&mut self) -> Result<()> {
        self.parser.reset_to_idle();
        self.io.write(&CANCEL_SEQUENCE)
    }
}
