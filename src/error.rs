// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types (ambient stack, SPEC_FULL.md §4).
//!
//! The base crate threads a single bare marker, `InvalidData`, through
//! every fallible call. This crate follows the `thiserror`-based error
//! enums used across the pack instead, giving each of spec.md §7's error
//! kinds (ParseError/ProtocolError/TransferError/Timeout/TransportError/
//! Cancellation) a typed, source-chained variant.

use crate::session::State;

#[derive(thiserror::Error, Debug)]
pub enum ZmodemError {
    /// ParseError: malformed hex, bad format tag, or a header/subpacket
    /// too large for its scratch buffer.
    #[error("malformed header: {0}")]
    BadHeader(&'static str),

    /// ParseError: the CRC residue check failed.
    #[error("crc check failed")]
    CrcMismatch,

    /// ParseError: a packet or header grew past its fixed capacity.
    #[error("packet buffer overflow")]
    BufferOverflow,

    /// TransportError: a negative/failed return from the host's `write`.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout: bounded per-state retries exhausted.
    #[error("protocol timeout in state {0:?}")]
    Timeout(State),

    /// Cancellation: 5xCAN inbound or host-initiated `cancel()`.
    #[error("transfer cancelled")]
    Cancelled,

    /// TransportError: `on_receive` rejected a data subpacket.
    #[error("host callback rejected data")]
    HostRejected,
}

pub type Result<T> = core::result::Result<T, ZmodemError>;
