//! Command-line interface configuration
//!
//! The configuration file stores a preferred serial port and any extra USB
//! VID/PID pairs that should be treated as download-mode devices, so the
//! tool can auto-select the right port on hosts with several adapters.

use std::{
    fs::{create_dir_all, read_to_string, write},
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::debug;
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::{Deserialize, Serialize};
use serialport::UsbPortInfo;

use crate::Error;

/// A configured, known serial connection
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Connection {
    /// Name of the serial port used for communication
    pub serial: Option<String>,
}

/// A configured, known USB device
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct UsbDevice {
    /// USB Vendor ID
    #[serde(
        serialize_with = "serialize_u16_to_hex",
        deserialize_with = "deserialize_hex_to_u16"
    )]
    pub vid: u16,
    /// USB Product ID
    #[serde(
        serialize_with = "serialize_u16_to_hex",
        deserialize_with = "deserialize_hex_to_u16"
    )]
    pub pid: u16,
}

impl UsbDevice {
    /// Check if the given USB port matches this device
    pub fn matches(&self, port: &UsbPortInfo) -> bool {
        self.vid == port.vid && self.pid == port.pid
    }
}

fn deserialize_hex_to_u16<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let hex = String::deserialize(deserializer)?.to_lowercase();
    let hex = hex.trim_start_matches("0x");

    let int = u16::from_str_radix(hex, 16).map_err(serde::de::Error::custom)?;

    Ok(int)
}

fn serialize_u16_to_hex<S>(decimal: &u16, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let hex_string = format!("{decimal:04x}");
    serializer.serialize_str(&hex_string)
}

/// Deserialized configuration file contents
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Preferred serial port connection information
    #[serde(default)]
    pub connection: Connection,
    /// Preferred USB devices
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
    /// Path of the file to save the configuration to
    #[serde(skip)]
    save_path: PathBuf,
}

impl Config {
    /// Load configuration from the configuration file
    pub fn load() -> Result<Self> {
        let config_file = Self::config_path()?;

        let mut config = if let Ok(data) = read_to_string(&config_file) {
            toml::from_str(&data)
                .into_diagnostic()
                .wrap_err("Failed to parse configuration file")?
        } else {
            Self::default()
        };
        config.save_path = config_file;
        debug!("Config: {:#?}", config);

        Ok(config)
    }

    /// Save configuration to the configuration file
    pub fn save_with<F: Fn(&mut Self)>(&self, modify_fn: F) -> Result<()> {
        let mut copy = self.clone();
        modify_fn(&mut copy);

        let serialized = toml::to_string(&copy)
            .into_diagnostic()
            .wrap_err("Failed to serialize config")?;

        Self::write_config(&serialized, &self.save_path)
    }

    fn write_config(serialized: &str, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent)
                .into_diagnostic()
                .wrap_err("Failed to create config directory")?;
        }

        write(path, serialized)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to write config to {}", path.display()))
    }

    fn config_path() -> Result<PathBuf, Error> {
        let local_config = std::env::current_dir()?.join("kirindump.toml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let project_dirs = ProjectDirs::from("", "", "kirindump").unwrap();
        Ok(project_dirs.config_dir().join("kirindump.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_usb_device_entries() {
        let config: Config = toml::from_str(
            r#"
            [connection]
            serial = "/dev/ttyUSB0"

            [[usb_device]]
            vid = "12d1"
            pid = "3609"
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.serial.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.usb_device.len(), 1);
        assert_eq!(config.usb_device[0].vid, 0x12D1);
        assert_eq!(config.usb_device[0].pid, 0x3609);
    }

    #[test]
    fn hex_fields_accept_prefixes_and_case() {
        let config: Config = toml::from_str(
            r#"
            [[usb_device]]
            vid = "0x12D1"
            pid = "A1b2"
            "#,
        )
        .unwrap();

        assert_eq!(config.usb_device[0].vid, 0x12D1);
        assert_eq!(config.usb_device[0].pid, 0xA1B2);
    }

    #[test]
    fn invalid_hex_is_rejected() {
        let result: Result<Config, _> = toml::from_str(
            r#"
            [[usb_device]]
            vid = "xyz"
            pid = "0000"
            "#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn empty_config_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.connection.serial.is_none());
        assert!(config.usb_device.is_empty());
    }
}
