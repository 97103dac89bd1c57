//! Recover firmware and eMMC contents from HiSilicon devices booted into
//! the BootROM's serial download mode.
//!
//! Two device-side cooperation protocols are supported:
//!
//! - [FramedStreamReceiver] consumes a dump the device pushes as a framed
//!   chunk stream (start marker, header, self-describing chunks, end
//!   marker).
//! - [PolledChunkReceiver] pulls fixed-size chunks out of the device with
//!   authenticated inquiry commands, one address at a time.
//!
//! Both run over any [connection::ByteChannel]; the `cli` feature adds port
//! auto-discovery, configuration and the `kirindump` binary on top.

pub mod checksum;
#[cfg(feature = "cli")]
pub mod cli;
pub mod connection;
pub mod error;
pub mod interface;
#[cfg(feature = "cli")]
pub mod logging;
pub mod progress;
pub mod receiver;

pub use crate::{
    connection::Connection,
    error::Error,
    interface::Interface,
    receiver::{DumpAssembler, FramedStreamReceiver, PolledChunkReceiver, TransferStats},
};

/// A [Connection] backed by a physical serial port
pub type SerialConnection = Connection<Interface>;
