//! NovaStar sending-card protocol
//!
//! Provides the pieces needed to talk to a sending card over its serial port:
//! - Additive checksum (seed `0x5555`, transmitted low byte first)
//! - Request frame construction from command templates
//! - Response validation (header, result code, length)
//! - Bit-packed telemetry decoders for scan cards and multi-function cards
//! - Built-in command sets

pub mod checksum;
pub mod commands;
pub mod decode;
pub mod frame;

pub use checksum::{checksum, verify, CHECKSUM_LEN, CHECKSUM_SEED};
pub use commands::CommandSet;
pub use decode::{
    decode, decode_composite, decode_humidity, decode_temperature, decode_voltage,
    scan_card_slice, CompositeReading, DecoderKind, Field, Reading, Telemetry, Temperature,
    Validity, Voltage,
};
pub use frame::{
    build_frame, validate_response, AckCode, CommandTemplate, Frame, ValidatedResponse,
    CARD_INDEX_OFFSET, READ_BUFFER_LEN, RESPONSE_OVERHEAD,
};

use thiserror::Error;

/// Protocol error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A request template or frame does not have the expected structure
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Nothing was received before the read timeout elapsed
    #[error("--READ-TIMEOUT--")]
    Timeout,

    /// Fewer bytes than a complete response were received
    #[error(
        "--ADDR-TOO-SHORT: '{}' ({} of {expected} bytes)",
        hex::encode_upper(.received),
        .received.len()
    )]
    TooShort {
        /// Expected response length in bytes
        expected: usize,
        /// What actually arrived
        received: Vec<u8>,
    },

    /// The response does not start with the `AA 55` header
    #[error("ACK not match HEADER! (got {found:04X})")]
    HeaderMismatch {
        /// The two leading bytes, big-endian
        found: u16,
    },

    /// The device answered with a non-success result code
    #[error("{0}")]
    Ack(AckCode),
}

impl ProtocolError {
    /// Whether the polling engine can skip the affected reading and carry on.
    ///
    /// Only `MalformedFrame` is fatal: it means a command template is broken,
    /// which no amount of polling will fix.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::MalformedFrame(_))
    }
}
