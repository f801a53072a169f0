// SPDX-License-Identifier: MIT OR Apache-2.0
//! Frame encoder (component C3, spec.md §4.3).
//!
//! Builds hex/bin16/bin32 headers and data subpacket trailers into a
//! fixed, bounds-checked `ArrayVec` scratch buffer. Grounded on the base
//! crate's `Header::write`/`write_subpacket` in `lib.rs` and its own
//! dead `frame.rs` (which already carries a `new_frame` builder close to
//! this shape). Restructured per spec.md §9's design notes: "replace the
//! ad-hoc buffer pointer arithmetic ... with a cursor abstraction" and
//! "replace global `g_zeroes`, `g_canistr` with static immutable
//! constants local to the encoder module".

use tinyvec::ArrayVec;

use crate::consts::{Encoding, Frame, Packet, ASCII_XON, ZDLE, ZPAD};
use crate::crc::{self, Width};
use crate::escape;

/// Every header this encoder emits fits in 32 bytes even fully escaped
/// and hex-doubled (2 ZPAD + ZDLE + tag + 7 bytes doubled to hex + CRLF
/// + XON = well under 32). Grounded on the base crate's `HEADER_SIZE`.
pub const HEADER_SIZE: usize = 32;
pub type ScratchBuf = ArrayVec<[u8; HEADER_SIZE]>;

pub const ZEROES: [u8; 4] = [0; 4];

fn width_of(encoding: Encoding) -> Width {
    match encoding {
        Encoding::ZBIN32 => Width::Crc32,
        Encoding::ZBIN | Encoding::ZHEX => Width::Crc16,
    }
}

fn push_hex_byte(out: &mut ScratchBuf, byte: u8) {
    let mut digits = [0u8; 2];
    hex::encode_to_slice([byte], &mut digits).expect("2-byte buffer always fits one encoded byte");
    out.push(digits[0]);
    out.push(digits[1]);
}

/// Encodes a complete header frame: `type` plus its four payload bytes,
/// framed per `encoding`. Grounded on spec.md §4.3's three header
/// flavors and the base crate's `Header::write`.
pub fn encode_header(encoding: Encoding, frame: Frame, payload: [u8; 4]) -> ScratchBuf {
    let mut body = [0u8; 5];
    body[0] = frame as u8;
    body[1..].copy_from_slice(&payload);

    let width = width_of(encoding);
    let mut trailer = [0u8; 4];
    let trailer_len = crc::trailer(&body, width, &mut trailer);

    let mut out = ScratchBuf::new();
    out.push(ZPAD);
    if encoding == Encoding::ZHEX {
        out.push(ZPAD);
    }
    out.push(ZDLE);
    out.push(encoding as u8);

    if encoding == Encoding::ZHEX {
        for &b in body.iter().chain(trailer[..trailer_len].iter()) {
            push_hex_byte(&mut out, b);
        }
        out.push(b'\r');
        out.push(b'\n');
        if frame != Frame::ZACK && frame != Frame::ZFIN {
            out.push(ASCII_XON);
        }
    } else {
        // ZBIN/ZBIN32: escape body+trailer byte-by-byte. Headers never
        // carry a `@` so the ATSIGN rule never triggers here.
        for &b in body.iter().chain(trailer[..trailer_len].iter()) {
            if escape::needs_escape(b, false, false) {
                out.push(ZDLE);
                out.push(escape::escape_byte(b));
            } else {
                out.push(b);
            }
        }
    }

    out
}

/// Encodes a data subpacket trailer: `ZDLE`, the terminator byte, and
/// the escaped CRC over `payload || terminator`. The caller is
/// responsible for writing the (already escaped, as produced on the
/// wire) payload bytes first — this engine is receive-only and never
/// emits subpacket payload data itself, so only the trailer builder is
/// needed. Grounded on the base crate's `write_subpacket`.
pub fn encode_subpacket_trailer(encoding: Encoding, payload: &[u8], terminator: Packet) -> ScratchBuf {
    let width = width_of(if encoding == Encoding::ZBIN32 {
        Encoding::ZBIN32
    } else {
        Encoding::ZBIN
    });

    let mut buf: ArrayVec<[u8; 1024]> = ArrayVec::new();
    buf.extend_from_slice(payload);
    buf.push(terminator as u8);
    let mut trailer = [0u8; 4];
    let len = crc::trailer(&buf, width, &mut trailer);

    let mut out = ScratchBuf::new();
    out.push(ZDLE);
    out.push(terminator as u8);
    for &b in &trailer[..len] {
        if escape::needs_escape(b, false, false) {
            out.push(ZDLE);
            out.push(escape::escape_byte(b));
        } else {
            out.push(b);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case(Encoding::ZBIN, Frame::ZRQINIT, [ZPAD, ZDLE, Encoding::ZBIN as u8, 0, 0, 0, 0, 0, 0, 0].as_slice())]
    #[case(Encoding::ZBIN32, Frame::ZRQINIT, [ZPAD, ZDLE, Encoding::ZBIN32 as u8, 0, 0, 0, 0, 0, ZDLE, 0x5D, 247, 34, 198].as_slice())]
    fn header_matches_base_crate_fixture(#[case] encoding: Encoding, #[case] frame: Frame, #[case] expected: &[u8]) {
        let out = encode_header(encoding, frame, ZEROES);
        assert_eq!(&out[..], expected);
    }

    #[test]
    fn zhex_trailer_has_crlf_and_xon_except_zack_zfin() {
        let out = encode_header(Encoding::ZHEX, Frame::ZRINIT, ZEROES);
        assert!(out.ends_with(&[ASCII_XON]));
        let out = encode_header(Encoding::ZHEX, Frame::ZACK, ZEROES);
        assert!(out.ends_with(b"\r\n"));
    }
}
