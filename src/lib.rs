// SPDX-License-Identifier: MIT OR Apache-2.0
//! ZMODEM receive-side protocol engine.
//!
//! A non-blocking, single-threaded byte parser ([`parser::Parser`]) feeds
//! a receive state machine ([`session::ReceiveSession`]) that drives a
//! file transfer to completion through a host-supplied [`io::ZmodemIo`]
//! collaborator. The engine owns no clock and performs no I/O of its
//! own: the host pushes inbound bytes through [`session::ReceiveSession::feed`]
//! and calls [`session::ReceiveSession::on_timeout`] on its own schedule.

pub mod consts;
pub mod crc;
pub mod error;
pub mod escape;
pub mod frame;
pub mod io;
pub mod parser;
pub mod session;

pub use error::{Result, ZmodemError};
pub use io::ZmodemIo;
pub use session::{ReceiveSession, SessionConfig, SessionFlags, State, Status};
