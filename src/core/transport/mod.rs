//! Transport layer
//!
//! The polling engine only needs to write a request and block on the reply.
//! [`Transport`] captures exactly that; [`SerialLink`] implements it on top of
//! a serial port.

mod serial;

pub use serial::{
    list_ports, SerialConfig, SerialFlowControl, SerialLink, SerialParity, DEFAULT_BAUD_RATE,
    DEFAULT_READ_TIMEOUT,
};

use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Port auto-selection failed
    #[error("No suitable serial port: {0}")]
    NoSuitablePort(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Disconnected
    #[error("Disconnected")]
    Disconnected,
}

/// Transport statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Frames written
    pub packets_sent: u64,
    /// Reads that returned data
    pub packets_received: u64,
    /// Reads that timed out without data
    pub timeouts: u64,
}

/// Blocking request/response byte channel
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Write a complete request
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read up to `max_bytes`, waiting at most `timeout`.
    ///
    /// Returns an empty buffer when nothing arrived in time.
    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Bytes, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }

    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Bytes, TransportError> {
        (**self).read(max_bytes, timeout)
    }
}
