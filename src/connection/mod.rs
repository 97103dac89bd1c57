//! Byte-level access to a device in download mode
//!
//! The [Connection] struct abstracts over the raw byte stream and layers on
//! the little-endian word and exact-length read helpers both receive
//! protocols are built from. The stream itself is anything implementing
//! [ByteChannel]; in production that is a serial port behind
//! [Interface](crate::interface::Interface).

use std::{io, time::Duration};

use log::debug;

use crate::error::{ConnectionError, Error, ResultExt, TimedOutCommand};

pub mod command;
#[cfg(test)]
pub(crate) mod fake;

pub use command::{Command, CommandType};

/// A duplex byte stream with a bounded read timeout
///
/// A `read` that returns fewer bytes than requested, zero bytes, or an
/// [io::ErrorKind::TimedOut] error signals that the timeout elapsed; reads
/// never block indefinitely.
pub trait ByteChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;
    fn timeout(&self) -> Duration;
}

/// An established connection with a target device
pub struct Connection<C> {
    channel: C,
}

impl<C: ByteChannel> Connection<C> {
    pub fn new(channel: C) -> Self {
        Connection { channel }
    }

    /// Run `f` with a temporary read timeout on the channel
    pub fn with_timeout<T, F>(&mut self, timeout: Duration, mut f: F) -> Result<T, Error>
    where
        F: FnMut(&mut Connection<C>) -> Result<T, Error>,
    {
        let old_timeout = self.channel.timeout();
        self.channel.set_timeout(timeout)?;

        let result = f(self);

        self.channel.set_timeout(old_timeout)?;

        result
    }

    /// Read a single byte, treating a timeout as a connection failure
    pub fn read_byte(&mut self) -> Result<u8, Error> {
        let mut byte = [0u8; 1];
        match self.read_exact_or_short(&mut byte)? {
            1 => Ok(byte[0]),
            _ => Err(Error::Connection(ConnectionError::Timeout(
                TimedOutCommand::default(),
            ))),
        }
    }

    /// Read a little-endian 32-bit word, treating a short read as a
    /// connection failure
    pub fn read_word(&mut self) -> Result<u32, Error> {
        let mut word = [0u8; 4];
        let read = self.read_exact_or_short(&mut word)?;
        if read < word.len() {
            return Err(Error::Connection(ConnectionError::TruncatedRead(
                word.len(),
                read,
            )));
        }

        Ok(u32::from_le_bytes(word))
    }

    /// Fill `buf` from the channel, stopping early when the read times out
    ///
    /// Returns the number of bytes actually read. Only hard channel errors
    /// are surfaced; the caller decides what a short read means at its
    /// protocol layer.
    pub fn read_exact_or_short(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut read = 0;
        while read < buf.len() {
            match self.channel.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(err) if err.kind() == io::ErrorKind::TimedOut => break,
                Err(err) => return Err(err.into()),
            }
        }

        Ok(read)
    }

    /// Write a command to the channel
    pub fn write_command(&mut self, command: Command) -> Result<(), Error> {
        debug!("Writing command: {:?}", command);
        let packet = command.encode();
        self.channel
            .write_all(&packet)
            .map_err(Error::from)
            .for_command(command.command_type())?;

        Ok(())
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }
}
