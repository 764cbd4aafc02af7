//! Serial port auto-selection
//!
//! Sending cards are usually reached through a Silicon Labs CP210x USB-UART
//! bridge. When no port is configured, the ports with a known hardware type
//! are listed and the one matching a description hint is picked.

use crate::core::transport::{list_ports, TransportError};
use serialport::{SerialPortInfo, SerialPortType};
use std::fmt;
use tracing::{debug, info};

/// Description fragment of the USB-UART bridge fitted to sending cards
pub const DEFAULT_PORT_HINT: &str = "CP210x";

/// A port that may lead to a sending card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    /// System port name (COM3, /dev/ttyUSB0)
    pub name: String,
    /// Human readable description
    pub description: String,
}

impl PortCandidate {
    /// Build a candidate from enumerated port info.
    ///
    /// Returns `None` for ports without hardware information.
    pub fn from_info(info: &SerialPortInfo) -> Option<Self> {
        let description = match &info.port_type {
            SerialPortType::UsbPort(usb) => {
                let label = usb
                    .product
                    .clone()
                    .or_else(|| usb.manufacturer.clone())
                    .unwrap_or_else(|| format!("USB {:04X}:{:04X}", usb.vid, usb.pid));
                format!("{label} ({})", info.port_name)
            }
            SerialPortType::PciPort => format!("PCI serial port ({})", info.port_name),
            SerialPortType::BluetoothPort => format!("Bluetooth serial port ({})", info.port_name),
            SerialPortType::Unknown => return None,
        };

        Some(Self {
            name: info.port_name.clone(),
            description,
        })
    }
}

impl fmt::Display for PortCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.description)
    }
}

/// Candidates from enumerated ports, sorted by description
pub fn candidates(ports: &[SerialPortInfo]) -> Vec<PortCandidate> {
    let mut found: Vec<_> = ports.iter().filter_map(PortCandidate::from_info).collect();
    found.sort_by(|a, b| a.description.cmp(&b.description));
    found
}

/// Pick the port to poll.
///
/// A single candidate is used as-is. With several, the first whose
/// description contains `hint` (case-insensitive) wins.
pub fn select_port<'a>(
    candidates: &'a [PortCandidate],
    hint: &str,
) -> Result<&'a PortCandidate, TransportError> {
    match candidates {
        [] => Err(TransportError::NoSuitablePort(
            "no serial port with hardware information found".to_string(),
        )),
        [only] => Ok(only),
        many => {
            let needle = hint.to_lowercase();
            many.iter()
                .find(|c| c.description.to_lowercase().contains(&needle))
                .ok_or_else(|| {
                    let listed: Vec<_> = many.iter().map(ToString::to_string).collect();
                    TransportError::NoSuitablePort(format!(
                        "none of the ports matches '{hint}': {}",
                        listed.join(", ")
                    ))
                })
        }
    }
}

/// Enumerate the system's ports and pick one
pub fn discover_port(hint: &str) -> Result<PortCandidate, TransportError> {
    let ports = list_ports()?;
    let found = candidates(&ports);
    for candidate in &found {
        debug!("Port candidate {}", candidate);
    }

    let chosen = select_port(&found, hint)?.clone();
    info!("Using serial port {}", chosen);
    Ok(chosen)
}
