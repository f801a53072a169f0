// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pure Rust `rz`-equivalent: receives a single file over ZMODEM using
//! stdin/stdout as the transport.

mod stdinout;

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use clap::{App, Arg};
use zmodem_rx::{ReceiveSession, Result, SessionConfig, Status, ZmodemError, ZmodemIo};

struct StdioAdapter {
    stdout: std::io::Stdout,
    file: File,
}

impl ZmodemIo for StdioAdapter {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.stdout.write_all(bytes).map_err(ZmodemError::Io)
    }

    fn on_receive(&mut self, bytes: &[u8], _zcnl: bool) -> Result<()> {
        self.file.write_all(bytes).map_err(ZmodemError::Io)
    }
}

fn main() {
    env_logger_init();

    let matches = App::new("Pure Rust implementation of rz utility")
        .arg(Arg::with_name("file").required(false).index(1))
        .get_matches();

    let fileopt = matches.value_of("file").unwrap_or("rz-out");
    let filename = Path::new(fileopt).file_name().unwrap();
    let file =
        File::create(filename).unwrap_or_else(|_| panic!("Cannot create file {filename:?}:"));

    let mut session = ReceiveSession::new(
        StdioAdapter {
            stdout: std::io::stdout(),
            file,
        },
        SessionConfig::default(),
    );
    session.start().expect("failed to send initial ZRINIT");

    let mut inout = stdinout::CombinedStdInOut::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match inout.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        match session.feed(&buf[..n]) {
            Ok(Status::XferDone) => break,
            Ok(Status::Ok) => {}
            Err(err) => {
                log::error!("zmodem receive failed: {err}");
                break;
            }
        }
    }
}

/// `log`'s facade needs a backend installed once at startup; the base
/// crate leaves this to the binary rather than the library.
fn env_logger_init() {
    let _ = env_logger::try_init();
}
