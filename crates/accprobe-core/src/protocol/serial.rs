//! Serial port handling
//!
//! Port discovery and low-level port setup for the sensor board link.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;

use super::ProtocolError;
use crate::config::LinkConfig;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0" or "COM8")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }

    /// One-line human readable description
    pub fn describe(&self) -> String {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => format!(
                "{} [{:04x}:{:04x}] {}",
                self.name,
                vid,
                pid,
                self.product.as_deref().unwrap_or("")
            )
            .trim_end()
            .to_string(),
            _ => self.name.clone(),
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb_info) => Self {
                name: info.port_name,
                vid: Some(usb_info.vid),
                pid: Some(usb_info.pid),
                manufacturer: usb_info.manufacturer,
                product: usb_info.product,
                serial_number: usb_info.serial_number,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// Device-name prefixes the boards enumerate under, in preference order
const BOARD_PREFIXES: [&str; 2] = ["ttyACM", "ttyUSB"];

/// Ordering key: board-style names by prefix rank and numeric suffix, then
/// everything else alphabetically
fn port_sort_key(name: &str) -> (usize, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    BOARD_PREFIXES
        .iter()
        .enumerate()
        .find_map(|(rank, prefix)| {
            basename
                .strip_prefix(prefix)
                .map(|suffix| (rank, suffix.parse().unwrap_or(usize::MAX)))
        })
        .map(|(rank, num)| (rank, num, basename.to_string()))
        .unwrap_or((BOARD_PREFIXES.len(), 0, basename.to_string()))
}

/// Enumerate serial ports, board-style devices first.
///
/// On Linux `/dev` is scanned as well, since CDC-ACM boards are not always
/// reported by the enumeration API.
pub fn list_ports() -> Vec<PortInfo> {
    let mut found: HashMap<String, PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(|info| {
            let port = PortInfo::from(info);
            (port.name.clone(), port)
        })
        .collect();

    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        let names = entries
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| BOARD_PREFIXES.iter().any(|p| n.starts_with(p)));
        for name in names {
            let path = format!("/dev/{}", name);
            found
                .entry(path.clone())
                .or_insert_with(|| PortInfo::bare(path));
        }
    }

    let mut ports: Vec<PortInfo> = found.into_values().collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}

/// Open a serial port with the configured baud rate and read timeout
pub fn open_port(config: &LinkConfig) -> Result<Box<dyn SerialPort>, ProtocolError> {
    config.validate()?;
    serialport::new(&config.port_name, config.baud_rate)
        .timeout(config.read_timeout())
        .open()
        .map_err(|e| ProtocolError::ConnectionFailed {
            port: config.port_name.clone(),
            reason: e.to_string(),
        })
}

/// Configure a serial port as 8N1 without flow control
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    Ok(())
}
