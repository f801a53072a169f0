// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end scripted sessions against `ReceiveSession`, covering
//! spec.md §8's concrete scenarios.

use zmodem_rx::consts::{Encoding, Frame, Packet};
use zmodem_rx::frame::{encode_header, encode_subpacket_trailer};
use zmodem_rx::{ReceiveSession, Result, SessionConfig, State, Status, ZmodemError, ZmodemIo};

#[derive(Default)]
struct RecordingIo {
    writes: Vec<u8>,
    received: Vec<u8>,
}

impl ZmodemIo for RecordingIo {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.writes.extend_from_slice(bytes);
        Ok(())
    }

    fn on_receive(&mut self, bytes: &[u8], _zcnl: bool) -> Result<()> {
        self.received.extend_from_slice(bytes);
        Ok(())
    }
}

fn zfile_wire(name: &str, size: u64) -> Vec<u8> {
    let mut out = encode_header(Encoding::ZBIN32, Frame::ZFILE, [0; 4]).to_vec();
    let mut payload = Vec::new();
    payload.extend_from_slice(name.as_bytes());
    payload.push(0);
    payload.extend_from_slice(format!("{size} 0 0 0 0 0 0").as_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&encode_subpacket_trailer(Encoding::ZBIN32, &payload, Packet::ZCRCW));
    out
}

fn data_wire(payload: &[u8], terminator: Packet) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(payload);
    out.extend_from_slice(&encode_subpacket_trailer(Encoding::ZBIN32, payload, terminator));
    out
}

/// E1-style happy path: ZFILE, ZDATA, one data subpacket, ZEOF, ZFIN, OO.
#[test]
fn full_session_receives_one_file() {
    let mut session = ReceiveSession::new(RecordingIo::default(), SessionConfig::default());
    session.start().unwrap();

    session.feed(&zfile_wire("greeting.txt", 5)).unwrap();
    assert_eq!(session.state(), State::ReadReady);

    let zdata = encode_header(Encoding::ZBIN32, Frame::ZDATA, 0u32.to_be_bytes());
    session.feed(&zdata).unwrap();
    assert_eq!(session.state(), State::Reading);

    session.feed(&data_wire(b"hello", Packet::ZCRCW)).unwrap();
    assert_eq!(session.state(), State::ReadReady);
    assert_eq!(session.offset(), 5);

    let zeof = encode_header(Encoding::ZBIN32, Frame::ZEOF, 5u32.to_be_bytes());
    session.feed(&zeof).unwrap();
    assert_eq!(session.state(), State::Start);

    let zfin = encode_header(Encoding::ZHEX, Frame::ZFIN, [0; 4]);
    session.feed(&zfin).unwrap();
    assert_eq!(session.state(), State::Finish);

    let status = session.feed(b"OO").unwrap();
    assert_eq!(status, Status::XferDone);
    assert_eq!(session.io_mut().received, b"hello");
    assert_eq!(session.filename(), Some("greeting.txt"));
}

/// A data subpacket with a corrupted CRC must not be delivered, and the
/// receiver resends ZRPOS at the unchanged offset rather than advancing.
#[test]
fn bad_data_crc_resends_zrpos_without_advancing_offset() {
    let mut session = ReceiveSession::new(RecordingIo::default(), SessionConfig::default());
    session.start().unwrap();
    session.feed(&zfile_wire("f", 5)).unwrap();
    let zdata = encode_header(Encoding::ZBIN32, Frame::ZDATA, 0u32.to_be_bytes());
    session.feed(&zdata).unwrap();

    let mut wire = data_wire(b"hello", Packet::ZCRCW);
    let last = wire.len() - 1;
    wire[last] ^= 0x01;

    session.io_mut().writes.clear();
    session.feed(&wire).unwrap();

    assert_eq!(session.offset(), 0);
    assert_eq!(session.state(), State::ReadReady);
    assert!(session.io_mut().received.is_empty());

    let zrpos = encode_header(Encoding::ZHEX, Frame::ZRPOS, 0u32.to_be_bytes());
    assert_eq!(session.io_mut().writes, zrpos.to_vec());
}

/// Five consecutive CAN bytes abort the session and echo the cancel
/// sequence exactly once (spec.md §8 property 6).
#[test]
fn five_cans_cancel_and_echo_once() {
    let mut session = ReceiveSession::new(RecordingIo::default(), SessionConfig::default());
    session.start().unwrap();
    session.io_mut().writes.clear();

    let err = session.feed(&[0x18; 5]).unwrap_err();
    assert!(matches!(err, ZmodemError::Cancelled));
    assert_eq!(session.io_mut().writes.len(), 18);
}

/// Chunking invariance at the session level: feeding the whole script in
/// one call or one byte at a time reaches the same terminal state.
#[test]
fn chunked_feed_reaches_same_state_as_whole_feed() {
    let mut script = zfile_wire("f", 3);
    script.extend(encode_header(Encoding::ZBIN32, Frame::ZDATA, 0u32.to_be_bytes()));
    script.extend(data_wire(b"abc", Packet::ZCRCW));

    let mut whole = ReceiveSession::new(RecordingIo::default(), SessionConfig::default());
    whole.start().unwrap();
    whole.feed(&script).unwrap();

    let mut chunked = ReceiveSession::new(RecordingIo::default(), SessionConfig::default());
    chunked.start().unwrap();
    for byte in &script {
        chunked.feed(std::slice::from_ref(byte)).unwrap();
    }

    assert_eq!(whole.state(), chunked.state());
    assert_eq!(whole.offset(), chunked.offset());
    assert_eq!(whole.io_mut().received, chunked.io_mut().received);
}

/// Exceeding the configured error budget during READING cancels the
/// transfer instead of retrying indefinitely.
#[test]
fn exceeding_max_errors_cancels_transfer() {
    let config = SessionConfig {
        max_errors: 2,
        ..SessionConfig::default()
    };
    let mut session = ReceiveSession::new(RecordingIo::default(), config);
    session.start().unwrap();
    session.feed(&zfile_wire("f", 3)).unwrap();
    session.feed(&encode_header(Encoding::ZBIN32, Frame::ZDATA, 0u32.to_be_bytes())).unwrap();

    let mut bad = data_wire(b"abc", Packet::ZCRCW);
    let last = bad.len() - 1;
    bad[last] ^= 0x01;

    session.feed(&bad).unwrap();
    assert_eq!(session.feed(&encode_header(Encoding::ZBIN32, Frame::ZDATA, 0u32.to_be_bytes())).unwrap(), Status::Ok);
    session.feed(&bad).unwrap();
    assert_eq!(session.feed(&encode_header(Encoding::ZBIN32, Frame::ZDATA, 0u32.to_be_bytes())).unwrap(), Status::Ok);
    let err = session.feed(&bad).unwrap_err();
    assert!(matches!(err, ZmodemError::Cancelled));
}

/// A bare host-initiated timeout in START retries ZRINIT up to the
/// configured limit before failing with -ETIMEDOUT.
#[test]
fn timeouts_in_start_retry_then_fail() {
    let mut session = ReceiveSession::new(RecordingIo::default(), SessionConfig::default());
    session.start().unwrap();
    for _ in 0..4 {
        assert_eq!(session.on_timeout().unwrap(), Status::Ok);
    }
    let err = session.on_timeout().unwrap_err();
    assert!(matches!(err, ZmodemError::Timeout(State::Start)));
}
