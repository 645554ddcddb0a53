//! Serial port handling
//!
//! Enumerates and opens the serial devices a bench controller can sit behind.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;

use super::ProtocolError;

/// An available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// Human-readable description for selection lists
    pub description: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,
}

impl PortInfo {
    /// Port known only by its device path
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "n/a".to_string(),
            vid: None,
            pid: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (description, vid, pid) = match info.port_type {
            SerialPortType::UsbPort(usb) => {
                let label = match (usb.manufacturer, usb.product) {
                    (Some(m), Some(p)) => format!("{} {}", m, p),
                    (None, Some(p)) => p,
                    (Some(m), None) => m,
                    (None, None) => format!("USB {:04x}:{:04x}", usb.vid, usb.pid),
                };
                (label, Some(usb.vid), Some(usb.pid))
            }
            SerialPortType::PciPort => ("PCI serial".to_string(), None, None),
            SerialPortType::BluetoothPort => ("Bluetooth serial".to_string(), None, None),
            _ => ("n/a".to_string(), None, None),
        };

        Self {
            name: info.port_name,
            description,
            vid,
            pid,
        }
    }
}

/// Sort key so that:
///  - ttyACM* ports come first (sorted numerically by suffix)
///  - then ttyUSB* ports (sorted numerically)
///  - then other ports (sorted by name)
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}

fn sorted(map: HashMap<String, PortInfo>) -> Vec<PortInfo> {
    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

#[cfg(target_os = "linux")]
fn add_dev_fallbacks(map: &mut HashMap<String, PortInfo>) {
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn add_dev_fallbacks(_map: &mut HashMap<String, PortInfo>) {}

/// Enumerate serial ports, reporting an enumeration failure to the caller.
///
/// On failure the error carries no partial list; use [`list_ports`] when a
/// best-effort listing is wanted.
pub fn try_list_ports() -> Result<Vec<PortInfo>, ProtocolError> {
    let found = serialport::available_ports()
        .map_err(|e| ProtocolError::EnumerationFailed(e.to_string()))?;

    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in found {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }
    add_dev_fallbacks(&mut map);
    Ok(sorted(map))
}

/// List available serial ports, with /dev fallbacks and deterministic ordering.
///
/// Never fails: an enumeration error is logged and only the fallback scan is
/// returned (empty on non-Linux hosts).
pub fn list_ports() -> Vec<PortInfo> {
    match try_list_ports() {
        Ok(ports) => ports,
        Err(e) => {
            tracing::warn!(error = %e, "serial port enumeration failed");
            let mut map = HashMap::new();
            add_dev_fallbacks(&mut map);
            sorted(map)
        }
    }
}

/// Open a serial port for controller communication
pub fn open_port(
    name: &str,
    baud_rate: u32,
    read_timeout: Duration,
) -> Result<Box<dyn SerialPort>, ProtocolError> {
    if baud_rate == 0 {
        return Err(ProtocolError::ConnectFailed {
            port: name.to_string(),
            reason: "baud rate must be non-zero".to_string(),
        });
    }

    serialport::new(name, baud_rate)
        .timeout(read_timeout)
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(name.to_string()),
            _ => ProtocolError::ConnectFailed {
                port: name.to_string(),
                reason: e.to_string(),
            },
        })
}

/// Configure a serial port for 8N1 without flow control
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;

    // Arduino-based controllers reset when DTR drops; keep it asserted.
    if let Err(e) = port.write_data_terminal_ready(true) {
        tracing::debug!(error = %e, "failed to set DTR high (continuing)");
    }
    if let Err(e) = port.write_request_to_send(true) {
        tracing::debug!(error = %e, "failed to set RTS high (continuing)");
    }

    Ok(())
}
