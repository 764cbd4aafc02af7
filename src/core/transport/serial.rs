//! Serial port transport implementation

use super::{Transport, TransportError, TransportStats};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Baud rate of NovaStar sending cards
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Time to wait for a reply
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Serial port flow control type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialFlowControl {
    /// No flow control
    #[default]
    None,
    /// Hardware flow control (RTS/CTS)
    Hardware,
    /// Software flow control (XON/XOFF)
    Software,
}

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl SerialParity {
    fn letter(self) -> char {
        match self {
            Self::None => 'N',
            Self::Odd => 'O',
            Self::Even => 'E',
        }
    }
}

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Flow control
    pub flow_control: SerialFlowControl,
}

impl SerialConfig {
    /// Create a new serial configuration, 8N1 without flow control
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: SerialFlowControl::None,
        }
    }

    /// Set parity
    #[must_use]
    pub fn parity(mut self, parity: SerialParity) -> Self {
        self.parity = parity;
        self
    }

    /// Set flow control
    #[must_use]
    pub fn flow_control(mut self, flow: SerialFlowControl) -> Self {
        self.flow_control = flow;
        self
    }

    fn data_bits_setting(&self) -> Result<DataBits, TransportError> {
        match self.data_bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(TransportError::InvalidConfiguration(format!(
                "unsupported data bits: {other}"
            ))),
        }
    }

    fn stop_bits_setting(&self) -> Result<StopBits, TransportError> {
        match self.stop_bits {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            other => Err(TransportError::InvalidConfiguration(format!(
                "unsupported stop bits: {other}"
            ))),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("", DEFAULT_BAUD_RATE)
    }
}

/// An open serial port
pub struct SerialLink {
    config: SerialConfig,
    port: Box<dyn SerialPort>,
    stats: TransportStats,
}

impl SerialLink {
    /// Open the port described by `config`
    pub fn open(config: SerialConfig) -> Result<Self, TransportError> {
        let parity = match config.parity {
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
            SerialParity::None => Parity::None,
        };

        let flow_control = match config.flow_control {
            SerialFlowControl::Hardware => FlowControl::Hardware,
            SerialFlowControl::Software => FlowControl::Software,
            SerialFlowControl::None => FlowControl::None,
        };

        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(config.data_bits_setting()?)
            .stop_bits(config.stop_bits_setting()?)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(DEFAULT_READ_TIMEOUT)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(config.port.clone()),
                serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
                    TransportError::PortNotFound(config.port.clone())
                }
                serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(config.port.clone())
                }
                _ => TransportError::ConnectionFailed(format!("{}: {e}", config.port)),
            })?;

        debug!("Opened {}", Self::describe(&config));

        Ok(Self {
            config,
            port,
            stats: TransportStats::default(),
        })
    }

    fn describe(config: &SerialConfig) -> String {
        format!(
            "{} @ {} baud ({}{}{})",
            config.port,
            config.baud_rate,
            config.data_bits,
            config.parity.letter(),
            config.stop_bits,
        )
    }

    /// Get connection info string
    pub fn connection_info(&self) -> String {
        Self::describe(&self.config)
    }

    /// Get statistics
    pub fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

impl Transport for SerialLink {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        // A late reply to the previous request must not be read as this one's
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| TransportError::IoError(e.into()))?;

        self.port.write_all(data)?;
        self.port.flush()?;

        self.stats.bytes_sent += data.len() as u64;
        self.stats.packets_sent += 1;
        Ok(())
    }

    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Bytes, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut buffer = BytesMut::zeroed(max_bytes);
        let mut filled = 0;

        while filled < max_bytes {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.port
                .set_timeout(remaining)
                .map_err(|e| TransportError::IoError(e.into()))?;

            match self.port.read(&mut buffer[filled..]) {
                Ok(0) => return Err(TransportError::Disconnected),
                Ok(n) => {
                    trace!("Read {} bytes", n);
                    filled += n;
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(TransportError::IoError(e)),
            }
        }

        buffer.truncate(filled);
        if filled == 0 {
            self.stats.timeouts += 1;
        } else {
            self.stats.bytes_received += filled as u64;
            self.stats.packets_received += 1;
        }

        Ok(buffer.freeze())
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.data_bits, 8);
        assert_eq!(config.stop_bits, 1);
        assert_eq!(config.parity, SerialParity::None);
        assert_eq!(config.flow_control, SerialFlowControl::None);
        assert_eq!(SerialLink::describe(&config), " @ 115200 baud (8N1)");
    }

    #[test]
    fn test_frame_format() {
        let mut config = SerialConfig::new("/dev/ttyUSB0", 9600).parity(SerialParity::Even);
        assert_eq!(SerialLink::describe(&config), "/dev/ttyUSB0 @ 9600 baud (8E1)");

        config.data_bits = 9;
        assert!(matches!(
            config.data_bits_setting(),
            Err(TransportError::InvalidConfiguration(_))
        ));
        config.stop_bits = 3;
        assert!(config.stop_bits_setting().is_err());
    }

    #[test]
    fn test_missing_port() {
        let config = SerialConfig::new("/dev/novapoll-does-not-exist", DEFAULT_BAUD_RATE);
        assert!(SerialLink::open(config).is_err());
    }
}
