//! Library and application errors

use std::{
    fmt::{Display, Formatter},
    io,
};

use miette::Diagnostic;
use thiserror::Error;

use crate::connection::command::CommandType;

/// All possible errors returned by kirindump
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Operation was cancelled by the user")]
    #[diagnostic(code(kirindump::cancelled))]
    Cancelled,

    #[error("Chunk at offset {offset:#x} with length {length:#x} exceeds the {capacity:#x} byte dump buffer")]
    #[diagnostic(
        code(kirindump::chunk_out_of_bounds),
        help("The device declared a {capacity} byte dump; a chunk outside that range means the stream is corrupt or the host lost synchronization")
    )]
    ChunkOutOfBounds {
        offset: u32,
        length: u32,
        capacity: u32,
    },

    #[error("Received a zero-length chunk at offset {offset:#x}")]
    #[diagnostic(
        code(kirindump::zero_length_chunk),
        help("Empty chunks never advance the transfer, so the stream would stall forever; the dumper payload is misbehaving")
    )]
    ZeroLengthChunk { offset: u32 },

    #[error("Dump size {size:#x} is not a multiple of the {chunk_size} byte chunk size")]
    #[diagnostic(
        code(kirindump::unaligned_dump_size),
        help("Round the requested size up to a whole number of chunks")
    )]
    UnalignedDumpSize { size: u32, chunk_size: u32 },

    #[error("Transfer completed with {0} recorded error(s)")]
    #[diagnostic(
        code(kirindump::completed_with_warnings),
        help("The dump was still written; rerun or cross-check the flagged regions before trusting it")
    )]
    CompletedWithWarnings(u32),

    #[error("The serial port '{0}' could not be found")]
    #[diagnostic(
        code(kirindump::serial_not_found),
        help("Make sure the correct device is connected to the host system")
    )]
    SerialNotFound(String),

    #[error("No serial ports could be detected")]
    #[diagnostic(
        code(kirindump::no_serial),
        help("Make sure the device is connected and booted into download mode. If the port is present but not listed, pass it explicitly with `-p/--port`")
    )]
    NoSerial,

    #[error("Error while connecting to device")]
    #[diagnostic(transparent)]
    Connection(#[source] ConnectionError),

    #[error("Communication error while receiving the dump")]
    #[diagnostic(transparent)]
    Transfer(#[source] ConnectionError),

    #[cfg(feature = "cli")]
    #[error(transparent)]
    #[diagnostic(code(kirindump::dialoguer_error))]
    DialoguerError(#[from] dialoguer::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Connection(err.into())
    }
}

impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        Self::Connection(err.into())
    }
}

/// Connection-related errors
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    #[error("Serial port not found")]
    #[diagnostic(
        code(kirindump::connection_failed),
        help("Ensure that the device is connected and your host recognizes the serial adapter")
    )]
    DeviceNotFound,

    #[error("Expected {0} bytes from the serial port, got {1}")]
    #[diagnostic(
        code(kirindump::truncated_read),
        help("The stream died mid-word; power-cycle the device and restart the transfer")
    )]
    TruncatedRead(usize, usize),

    #[error("Timeout while running {0}command")]
    #[diagnostic(code(kirindump::timeout))]
    Timeout(TimedOutCommand),

    #[error("IO error while using serial port: {0}")]
    #[diagnostic(code(kirindump::serial_error))]
    Serial(#[source] serialport::Error),
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        from_error_kind(err.kind(), err)
    }
}

impl From<serialport::Error> for ConnectionError {
    fn from(err: serialport::Error) -> Self {
        use serialport::ErrorKind;

        match err.kind() {
            ErrorKind::Io(kind) => from_error_kind(kind, err),
            ErrorKind::NoDevice => ConnectionError::DeviceNotFound,
            _ => ConnectionError::Serial(err),
        }
    }
}

/// An executed command which has timed out
#[derive(Clone, Debug, Default)]
pub struct TimedOutCommand {
    command: Option<CommandType>,
}

impl Display for TimedOutCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.command {
            Some(command) => write!(f, "{} ", command),
            None => Ok(()),
        }
    }
}

impl From<CommandType> for TimedOutCommand {
    fn from(ct: CommandType) -> Self {
        TimedOutCommand { command: Some(ct) }
    }
}

pub(crate) trait ResultExt {
    /// Mark an error as having occurred after synchronization, during the
    /// transfer itself
    fn transferring(self) -> Self;
    /// Mark the command from which this error originates
    fn for_command(self, command: CommandType) -> Self;
}

impl<T> ResultExt for Result<T, Error> {
    fn transferring(self) -> Self {
        match self {
            Err(Error::Connection(err)) => Err(Error::Transfer(err)),
            res => res,
        }
    }

    fn for_command(self, command: CommandType) -> Self {
        match self {
            Err(Error::Connection(ConnectionError::Timeout(_))) => {
                Err(Error::Connection(ConnectionError::Timeout(command.into())))
            }
            Err(Error::Transfer(ConnectionError::Timeout(_))) => {
                Err(Error::Transfer(ConnectionError::Timeout(command.into())))
            }
            res => res,
        }
    }
}

fn from_error_kind<E>(kind: io::ErrorKind, err: E) -> ConnectionError
where
    E: Into<serialport::Error>,
{
    use io::ErrorKind;

    match kind {
        ErrorKind::TimedOut => ConnectionError::Timeout(TimedOutCommand::default()),
        ErrorKind::NotFound => ConnectionError::DeviceNotFound,
        _ => ConnectionError::Serial(err.into()),
    }
}
