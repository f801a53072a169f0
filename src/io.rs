// SPDX-License-Identifier: MIT OR Apache-2.0
//! I/O adapter contract (component C6, spec.md §4.6).
//!
//! Replaces the base crate's two incompatible callback shapes (a
//! `Reader`/`Writer` trait pair built from `Read`/`Write`/`Seek`, plus a
//! raw `on_receive` closure bundled ad hoc into the caller's tuple
//! argument in `examples/rzm.rs`) with the single clean trait spec.md §9
//! asks for.

use crate::error::Result;

/// The host-supplied collaborator a [`crate::session::ReceiveSession`]
/// talks through. `write` delivers bytes to the remote peer; `on_receive`
/// delivers decoded file payload bytes. Both are synchronous and must
/// not block indefinitely (spec.md §5: "callbacks must not reenter
/// `feed` on the same session").
pub trait ZmodemIo {
    /// Deliver `bytes` to the remote peer. Implementations must not
    /// short-write; looping/retrying partial writes is the adapter's
    /// responsibility (spec.md §4.6).
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Deliver decoded file-payload bytes. `zcnl` requests the adapter
    /// translate CR, LF, CRLF, LFCR into a single newline, idempotently
    /// across calls (spec.md §4.6, §6). A `Result::Err` return aborts
    /// the transfer (spec.md's Open Question resolution: negative
    /// return is fatal).
    fn on_receive(&mut self, bytes: &[u8], zcnl: bool) -> Result<()>;
}

/// Newline translator shared by `ZmodemIo` adapters that set `zcnl`.
/// Tracks whether the previous call ended mid CRLF/LFCR pair so the
/// translation stays idempotent across `feed()`-driven calls, per
/// spec.md §6.
#[derive(Default, Debug, Clone, Copy)]
pub struct NewlineFilter {
    last_byte: Option<u8>,
}

impl NewlineFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the translation of `bytes` into `out`, collapsing CR,
    /// LF, CRLF, and LFCR runs into a single `\n`.
    pub fn translate(&mut self, bytes: &[u8], out: &mut Vec<u8>) {
        let mut iter = bytes.iter().copied().peekable();
        while let Some(b) = iter.next() {
            match b {
                b'\r' => {
                    if iter.peek() == Some(&b'\n') {
                        iter.next();
                    }
                    out.push(b'\n');
                }
                b'\n' => {
                    if self.last_byte == Some(b'\r') {
                        // already emitted by the CR branch on the previous call
                    } else if iter.peek() == Some(&b'\r') {
                        iter.next();
                        out.push(b'\n');
                    } else {
                        out.push(b'\n');
                    }
                }
                other => out.push(other),
            }
        }
        self.last_byte = bytes.last().copied();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_crlf_and_lfcr() {
        let mut f = NewlineFilter::new();
        let mut out = Vec::new();
        f.translate(b"a\r\nb\n\rc\rd\ne", &mut out);
        assert_eq!(out, b"a\nb\nc\nd\ne");
    }

    #[test]
    fn idempotent_across_call_boundary_split_on_cr() {
        let mut f = NewlineFilter::new();
        let mut out = Vec::new();
        f.translate(b"a\r", &mut out);
        f.translate(b"\nb", &mut out);
        assert_eq!(out, b"a\nb");
    }
}
