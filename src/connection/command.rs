//! Commands understood by the patched inquiry payload running on the device

use std::time::Duration;

use strum::Display;

use crate::checksum::command_crc;

/// Bytes returned by the device for a single inquiry command
pub const INQUIRY_CHUNK_SIZE: usize = 1024;

/// Pause after sending a command before the device has its response ready
pub const SETTLE_DELAY: Duration = Duration::from_millis(10);
/// Longer pause used when a command is being retried
pub const RETRY_SETTLE_DELAY: Duration = Duration::from_millis(100);

const INQUIRY_TIMEOUT: Duration = Duration::from_secs(2);

/// Types of commands that can be sent to a target device
#[derive(Copy, Clone, Debug, Display)]
#[non_exhaustive]
#[repr(u8)]
pub enum CommandType {
    /// Request a fixed-size eMMC read at a given address
    Inquiry = 0xCD,
}

impl CommandType {
    /// Return a timeout based on the command type
    pub fn timeout(&self) -> Duration {
        match self {
            CommandType::Inquiry => INQUIRY_TIMEOUT,
        }
    }
}

/// Available commands
#[derive(Copy, Clone, Debug)]
#[non_exhaustive]
pub enum Command {
    Inquiry {
        /// Rolling sequence number; the device echoes no acknowledgement,
        /// so this only has to differ between distinct requests
        sequence: u8,
        /// eMMC byte address to read from
        address: u32,
    },
}

impl Command {
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Inquiry { .. } => CommandType::Inquiry,
        }
    }

    /// Encode the command into its on-wire representation
    ///
    /// Layout: opcode, sequence, sequence complement, little-endian address,
    /// big-endian CRC over the seven leading bytes (with the device's
    /// two-zero-byte finalization, see [command_crc]).
    pub fn encode(&self) -> [u8; 9] {
        match *self {
            Command::Inquiry { sequence, address } => {
                let mut packet = [0u8; 9];
                packet[0] = self.command_type() as u8;
                packet[1] = sequence;
                packet[2] = 0xFF - sequence;
                packet[3..7].copy_from_slice(&address.to_le_bytes());

                let crc = command_crc(&packet[..7]);
                packet[7..9].copy_from_slice(&crc.to_be_bytes());

                packet
            }
        }
    }
}
