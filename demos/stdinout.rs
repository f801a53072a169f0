// SPDX-License-Identifier: MIT OR Apache-2.0
//! Combined stdin/stdout transport for the `rzm` demo. `rzm.rs` reads
//! protocol bytes from stdin and writes replies to stdout, so both
//! halves need to live behind one handle implementing `Read + Write`.

use std::io::{self, Read, Write};

pub struct CombinedStdInOut {
    stdin: io::Stdin,
    stdout: io::Stdout,
}

impl CombinedStdInOut {
    pub fn new() -> Self {
        CombinedStdInOut {
            stdin: io::stdin(),
            stdout: io::stdout(),
        }
    }
}

impl Read for CombinedStdInOut {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdin.lock().read(buf)
    }
}

impl Write for CombinedStdInOut {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdout.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.lock().flush()
    }
}
