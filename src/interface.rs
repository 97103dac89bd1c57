//! Serial port interface

use std::{
    io::{self, Read, Write},
    time::Duration,
};

use serialport::SerialPort;

use crate::connection::ByteChannel;

/// Wrapper around SerialPort where platform-specific modifications can be
/// implemented.
pub struct Interface {
    pub serial_port: Box<dyn SerialPort>,
}

impl Interface {
    pub fn new(serial: Box<dyn SerialPort>) -> Self {
        Self {
            serial_port: serial,
        }
    }

    /// Discard anything buffered on the receive side, e.g. boot chatter
    /// emitted before the dump stream starts
    pub fn clear_input(&mut self) -> serialport::Result<()> {
        self.serial_port.clear(serialport::ClearBuffer::Input)
    }

    pub fn into_serial(self) -> Box<dyn SerialPort> {
        self.serial_port
    }

    pub fn serial_port(&self) -> &dyn SerialPort {
        self.serial_port.as_ref()
    }

    pub fn serial_port_mut(&mut self) -> &mut dyn SerialPort {
        self.serial_port.as_mut()
    }
}

impl ByteChannel for Interface {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.serial_port.read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.serial_port.write_all(data)?;
        self.serial_port.flush()
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.serial_port.set_timeout(timeout).map_err(io::Error::from)
    }

    fn timeout(&self) -> Duration {
        self.serial_port.timeout()
    }
}
