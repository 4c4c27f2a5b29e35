//! CLI-facing input/output plumbing: read from a file or stdin, write to
//! a file or stdout, without the caller needing to care which.

use std::fs::File;
use std::io;
use std::io::{Read, Write};

pub enum Input {
    File(File),
    Stdin(io::Stdin),
}

pub enum Output {
    File(File),
    Standard(io::Stdout),
}

impl Read for Input {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Input::File(f) => f.read(buf),
            Input::Stdin(s) => s.read(buf),
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::File(f) => f.write(buf),
            Output::Standard(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::File(f) => f.flush(),
            Output::Standard(s) => s.flush(),
        }
    }
}

/// Read all of `input` as UTF-8 source text.
pub fn read_to_string(mut input: Input) -> io::Result<String> {
    let mut buf = String::new();
    input.read_to_string(&mut buf)?;
    Ok(buf)
}
