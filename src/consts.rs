// SPDX-License-Identifier: MIT OR Apache-2.0
//! Wire-level byte constants and the small enums that tag them.
//!
//! Grounded on the base crate's inlined constants and `Encoding`/`Frame`/
//! `Packet` enums in `lib.rs`, extended with the frame codes spec.md's
//! receive state machine needs that the base crate never read (ZRQINIT,
//! ZSINIT, ZSKIP, ZABORT, ZCHALLENGE, ZCOMPL, ZCAN, ZFREECNT, ZCOMMAND,
//! ZSTDERR) since the base crate only implements send/receive of a single
//! file and never dispatches on most of them.

use core::convert::TryFrom;
use std::fmt::{self, Display};

pub const ZPAD: u8 = b'*';
pub const ZDLE: u8 = 0x18;
pub const ZDLEE: u8 = ZDLE ^ 0x40;
pub const ASCII_XON: u8 = 0x11;
pub const ASCII_XOFF: u8 = 0x13;
pub const ASCII_CAN: u8 = 0x18;
pub const ZRUB0: u8 = 0x6c;
pub const ZRUB1: u8 = 0x6d;

/// 8 CAN followed by 10 BS, per spec.md §4.5 "Cancel sequence (outbound)".
pub const CANCEL_SEQUENCE: [u8; 18] = [
    ASCII_CAN, ASCII_CAN, ASCII_CAN, ASCII_CAN, ASCII_CAN, ASCII_CAN, ASCII_CAN, ASCII_CAN, 0x08,
    0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08,
];

/// Data subpacket scratch capacity. Grounded on the base crate's
/// `SUBPACKET_SIZE`/`TxBuffer` (1024 bytes), the maximum subpacket size
/// in the original 1988 ZMODEM specification.
pub const PKTBUFSIZE: usize = 1024;

/// Maximum raw (post-unescape, pre-hex-decode) header bytes: type + 4
/// payload bytes + up to 4 CRC-32 trailer bytes.
pub const HEADER_RAW_MAX: usize = 9;

/// The CRC-32 residue a verified ZBIN32 frame's checksum settles on.
/// See spec.md §4.4, "verify CRC-32 ... equals the CRC-32 residue
/// constant `0xDEBB20E3`".
pub const CRC32_RESIDUE: u32 = 0xDEBB20E3;

#[repr(u8)]
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Header framing flavor. Grounded on `Encoding` in the base crate.
pub enum Encoding {
    ZBIN = b'A',
    ZHEX = b'B',
    ZBIN32 = b'C',
}

const ENCODINGS: &[Encoding] = &[Encoding::ZBIN, Encoding::ZHEX, Encoding::ZBIN32];

impl TryFrom<u8> for Encoding {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ENCODINGS.iter().find(|e| value == **e as u8).copied().ok_or(())
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#02x}", *self as u8)
    }
}

#[repr(u8)]
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Frame type codes (first payload byte). Grounded on `Frame` in the base
/// crate, extended with every code spec.md §6 lists.
pub enum Frame {
    ZRQINIT = 0,
    ZRINIT = 1,
    ZSINIT = 2,
    ZACK = 3,
    ZFILE = 4,
    ZSKIP = 5,
    ZNAK = 6,
    ZABORT = 7,
    ZFIN = 8,
    ZRPOS = 9,
    ZDATA = 10,
    ZEOF = 11,
    ZFERR = 12,
    ZCRC = 13,
    ZCHALLENGE = 14,
    ZCOMPL = 15,
    ZCAN = 16,
    ZFREECNT = 17,
    ZCOMMAND = 18,
    ZSTDERR = 19,
}

const FRAMES: &[Frame] = &[
    Frame::ZRQINIT,
    Frame::ZRINIT,
    Frame::ZSINIT,
    Frame::ZACK,
    Frame::ZFILE,
    Frame::ZSKIP,
    Frame::ZNAK,
    Frame::ZABORT,
    Frame::ZFIN,
    Frame::ZRPOS,
    Frame::ZDATA,
    Frame::ZEOF,
    Frame::ZFERR,
    Frame::ZCRC,
    Frame::ZCHALLENGE,
    Frame::ZCOMPL,
    Frame::ZCAN,
    Frame::ZFREECNT,
    Frame::ZCOMMAND,
    Frame::ZSTDERR,
];

impl TryFrom<u8> for Frame {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        FRAMES.iter().find(|t| value == **t as u8).copied().ok_or(())
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#02x}", *self as u8)
    }
}

#[repr(u8)]
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Data subpacket terminator. Grounded on `Packet` in the base crate.
pub enum Packet {
    ZCRCE = 0x68,
    ZCRCG = 0x69,
    ZCRCQ = 0x6a,
    ZCRCW = 0x6b,
}

const PACKETS: &[Packet] = &[Packet::ZCRCE, Packet::ZCRCG, Packet::ZCRCQ, Packet::ZCRCW];

impl TryFrom<u8> for Packet {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        PACKETS.iter().find(|p| value == **p as u8).copied().ok_or(())
    }
}

impl Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#02x}", *self as u8)
    }
}

bitflags::bitflags! {
    /// Capability bits carried in ZRINIT's p3 and ZSINIT's p3/flags byte.
    /// Grounded on `Zrinit` in the base crate (which only names the send
    /// side's subset); spec.md §6 names the full bit layout.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        const CANFDX = 0x01;
        const CANOVIO = 0x02;
        const CANBRK = 0x04;
        const CANCRY = 0x08;
        const CANRUN = 0x10;
        const CANUNCO = 0x20;
        const CANVHDR = 0x40;
        const ESCCTL = 0x80;
    }
}
