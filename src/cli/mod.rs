//! CLI utilities shared by the kirindump binary
//!
//! No stability guarantees apply

use std::{fs, path::Path, time::Duration};

use clap::Args;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use log::{info, warn};
use miette::{IntoDiagnostic, Result, WrapErr};
use serialport::FlowControl;

use self::{config::Config, serial::get_serial_port_info};
use crate::{
    error::Error, progress::ProgressCallbacks, receiver::TransferStats, Connection, Interface,
    SerialConnection,
};

pub mod config;

mod serial;

/// Read timeout applied to the port until a receiver overrides it
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Serial port connected to target device
    #[arg(short = 'p', long)]
    pub port: Option<String>,
    /// Baud rate at which to communicate with the target device
    #[arg(short = 'b', long, default_value_t = 115_200)]
    pub baud: u32,
    /// Require confirmation before using an auto-detected serial port
    #[arg(long)]
    pub confirm_port: bool,
}

/// Open the configured serial port and wrap it in a [Connection]
pub fn connect(args: &ConnectArgs, config: &Config) -> Result<SerialConnection> {
    let port_info = get_serial_port_info(args, config)?;

    // Attempt to open the serial port and set its initial baud rate.
    info!("Serial port: '{}'", port_info.port_name);
    info!("Connecting...");
    let serial = serialport::new(&port_info.port_name, args.baud)
        .flow_control(FlowControl::None)
        .timeout(DEFAULT_TIMEOUT)
        .open()
        .map_err(Error::from)
        .wrap_err_with(|| format!("Failed to open serial port {}", port_info.port_name))?;

    let mut interface = Interface::new(serial);
    // Drop whatever the device printed before we attached.
    interface.clear_input().map_err(Error::from)?;

    Ok(Connection::new(interface))
}

/// Write the assembled image to `path` and report the final statistics
pub fn save_dump(path: &Path, data: &[u8], stats: TransferStats) -> Result<()> {
    fs::write(path, data)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to write dump to {}", path.display()))?;

    info!(
        "Dump saved to '{}' ({})",
        path.display(),
        HumanBytes(data.len() as u64)
    );
    info!(
        "Received {} bytes in {} chunks",
        stats.bytes_received, stats.chunks_received
    );
    if stats.errors > 0 {
        warn!("Transfer recorded {} error(s)", stats.errors);
    }

    Ok(())
}

/// Progress bar reporting for dump transfers
#[derive(Default)]
pub struct DumpProgress {
    progress_bar: Option<ProgressBar>,
}

impl ProgressCallbacks for DumpProgress {
    /// Initialize the progress bar for a transfer of `total` bytes
    fn init(&mut self, address: u32, total: usize) {
        let progress_bar = ProgressBar::new(total as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {bytes:>9}/{total_bytes:9} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        progress_bar.set_message(format!("{address:#x}"));

        self.progress_bar = Some(progress_bar);
    }

    /// Update the progress bar with the bytes assembled so far
    fn update(&mut self, received: usize) {
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.set_position(received as u64);
        }
    }

    /// Close out the progress bar
    fn finish(&mut self, success: bool) {
        if let Some(progress_bar) = &self.progress_bar {
            if success {
                progress_bar.finish();
            } else {
                progress_bar.abandon_with_message("completed with warnings");
            }
        }
    }
}
