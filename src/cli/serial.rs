use crossterm::style::Stylize;
use dialoguer::{theme::ColorfulTheme, Confirm, Select};
use serialport::{available_ports, SerialPortInfo, SerialPortType, UsbPortInfo};

use super::{config::Config, ConnectArgs};
use crate::error::Error;

/// USB vendor ID of HiSilicon/Huawei devices exposing a VCOM port in
/// download mode
const DOWNLOAD_MODE_VID: u16 = 0x12D1;

pub fn get_serial_port_info(
    matches: &ConnectArgs,
    config: &Config,
) -> Result<SerialPortInfo, Error> {
    // A serial port may be specified either as a command-line argument or in
    // a configuration file. In the case that both have been provided the
    // command-line argument takes precedence. Without either, ports whose
    // USB vendor matches a download-mode device are auto-selected, falling
    // back to an interactive prompt.
    let ports = detect_usb_serial_ports().unwrap_or_default();

    if let Some(serial) = &matches.port {
        find_serial_port(&ports, serial)
    } else if let Some(serial) = &config.connection.serial {
        find_serial_port(&ports, serial)
    } else {
        select_serial_port(ports, config, matches.confirm_port)
    }
}

/// Given a vector of `SerialPortInfo` structs, attempt to find and return
/// one whose `port_name` field matches the provided `name` argument.
fn find_serial_port(ports: &[SerialPortInfo], name: &str) -> Result<SerialPortInfo, Error> {
    let port_info = ports
        .iter()
        .find(|port| port.port_name.to_lowercase() == name.to_lowercase());

    if let Some(port) = port_info {
        Ok(port.to_owned())
    } else {
        Err(Error::SerialNotFound(name.to_owned()))
    }
}

fn detect_usb_serial_ports() -> Result<Vec<SerialPortInfo>, Error> {
    let ports = available_ports()?;
    let ports = ports
        .into_iter()
        .filter(|port_info| {
            matches!(
                &port_info.port_type,
                SerialPortType::UsbPort(..) | SerialPortType::Unknown
            )
        })
        .collect::<Vec<_>>();

    Ok(ports)
}

fn device_matches(config: &Config, info: &UsbPortInfo) -> bool {
    info.vid == DOWNLOAD_MODE_VID || config.usb_device.iter().any(|dev| dev.matches(info))
}

fn select_serial_port(
    ports: Vec<SerialPortInfo>,
    config: &Config,
    confirm: bool,
) -> Result<SerialPortInfo, Error> {
    // A single download-mode device is what the happy path looks like;
    // take it without bothering the user unless they asked to confirm.
    let matching = ports
        .iter()
        .filter(|port_info| match &port_info.port_type {
            SerialPortType::UsbPort(info) => device_matches(config, info),
            _ => false,
        })
        .cloned()
        .collect::<Vec<_>>();

    if let [port] = matching.as_slice() {
        if let SerialPortType::UsbPort(info) = &port.port_type {
            log::info!(
                "Found download-mode device: {} (VID={:#06x}, PID={:#06x})",
                port.port_name,
                info.vid,
                info.pid
            );
            if !confirm || confirm_port(&port.port_name, info)? {
                return Ok(port.to_owned());
            }
        }
    }

    if ports.len() > 1 {
        // Multiple serial ports detected; ports which match a known
        // download-mode device are highlighted.
        let port_names = ports
            .iter()
            .map(|port_info| match &port_info.port_type {
                SerialPortType::UsbPort(info) => {
                    let formatted = if device_matches(config, info) {
                        port_info.port_name.as_str().bold()
                    } else {
                        port_info.port_name.as_str().reset()
                    };

                    if let Some(product) = &info.product {
                        format!("{} - {}", formatted, product)
                    } else {
                        formatted.to_string()
                    }
                }
                _ => port_info.port_name.clone(),
            })
            .collect::<Vec<_>>();

        let index = Select::with_theme(&ColorfulTheme::default())
            .items(&port_names)
            .default(0)
            .interact_opt()?
            .ok_or(Error::Cancelled)?;

        match ports.get(index) {
            Some(port_info) => Ok(port_info.to_owned()),
            None => Err(Error::SerialNotFound(port_names[index].clone())),
        }
    } else if let [port] = ports.as_slice() {
        let port_name = port.port_name.clone();
        let port_info = match &port.port_type {
            SerialPortType::UsbPort(info) => info,
            SerialPortType::Unknown => &UsbPortInfo {
                vid: 0,
                pid: 0,
                serial_number: None,
                manufacturer: None,
                product: None,
            },
            _ => unreachable!(),
        };

        if confirm_port(&port_name, port_info)? {
            Ok(port.to_owned())
        } else {
            Err(Error::SerialNotFound(port_name))
        }
    } else {
        Err(Error::NoSerial)
    }
}

fn confirm_port(port_name: &str, port_info: &UsbPortInfo) -> Result<bool, Error> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt({
            if let Some(product) = &port_info.product {
                format!("Use serial port '{}' - {}?", port_name, product)
            } else {
                format!("Use serial port '{}'?", port_name)
            }
        })
        .interact_opt()?
        .ok_or(Error::Cancelled)
}
