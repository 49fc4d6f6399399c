//! Devices that can be attached to the port registers.

use std::{
    collections::VecDeque,
    io::{self, ErrorKind, Read, Write},
};

use crate::{Port, VmError};

/// Byte-at-a-time terminal. Reads give 0 at end of input.
pub struct Terminal<R, W> {
    input: R,
    output: W,
}

impl<R: Read, W: Write> Terminal<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl Terminal<io::Stdin, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin(), io::stdout())
    }
}

impl<R: Read, W: Write> Port for Terminal<R, W> {
    fn read(&mut self) -> Result<u8, VmError> {
        let mut buf = [0u8];
        loop {
            match self.input.read(&mut buf) {
                Ok(0) => return Ok(0),
                Ok(_) => return Ok(buf[0]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write(&mut self, value: u8) -> Result<(), VmError> {
        self.output.write_all(&[value])?;
        self.output.flush()?;
        Ok(())
    }
}

/// Reads back the program arguments, each terminated by a NUL, then 0s
/// forever. Any write asks the host to exit with the written status.
pub struct ArgsExit {
    bytes: VecDeque<u8>,
}

impl ArgsExit {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut bytes = VecDeque::new();
        for arg in args {
            bytes.extend(arg.as_ref().bytes());
            bytes.push_back(0);
        }
        Self { bytes }
    }
}

impl Port for ArgsExit {
    fn read(&mut self) -> Result<u8, VmError> {
        Ok(self.bytes.pop_front().unwrap_or(0))
    }

    fn write(&mut self, value: u8) -> Result<(), VmError> {
        tracing::info!("exit ${value:02x}");
        Err(VmError::Exit(value))
    }
}

/// Reads 0, discards writes.
#[derive(Debug, Default, Clone, Copy)]
pub struct Null;

impl Port for Null {
    fn read(&mut self) -> Result<u8, VmError> {
        Ok(0)
    }

    fn write(&mut self, _value: u8) -> Result<(), VmError> {
        Ok(())
    }
}
