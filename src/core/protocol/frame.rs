//! Request frames and response validation
//!
//! Request layout (little-endian multi-byte fields):
//!
//! ```text
//! 55 AA | ack serial(2) | src dst | dev type port | board(2) | io rw | address(4) | data len(2) | data | checksum(2)
//! ```
//!
//! Responses mirror the request with an `AA 55` header, a result code in
//! byte 2 and the requested data in place of the request payload.

use super::checksum::{self, CHECKSUM_LEN};
use super::decode::DecoderKind;
use super::ProtocolError;
use bytes::Bytes;
use std::fmt;

/// Header of every request frame
pub const REQUEST_HEADER: [u8; 2] = [0x55, 0xAA];

/// Header of every response frame
pub const RESPONSE_HEADER: [u8; 2] = [0xAA, 0x55];

/// Header size in bytes
pub const HEADER_LEN: usize = 2;

/// Position of the card index byte in a request
pub const CARD_INDEX_OFFSET: usize = 8;

/// Request frame size without data and checksum
pub const MIN_TEMPLATE_LEN: usize = 18;

/// Response size without data
pub const RESPONSE_OVERHEAD: usize = MIN_TEMPLATE_LEN + CHECKSUM_LEN;

/// Upper bound on the configurable response length floor
pub const READ_BUFFER_LEN: usize = 1024;

const ACK_CODE_OFFSET: usize = 2;
const DATA_LEN_OFFSET: usize = 16;

/// Named request template with a placeholder byte for the card index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    name: String,
    kind: DecoderKind,
    bytes: Vec<u8>,
    card_index_offset: usize,
}

impl CommandTemplate {
    /// Create a template from raw request bytes (without checksum)
    pub fn new(
        name: impl Into<String>,
        kind: DecoderKind,
        bytes: impl Into<Vec<u8>>,
    ) -> Result<Self, ProtocolError> {
        let name = name.into();
        let bytes = bytes.into();

        if bytes.len() < MIN_TEMPLATE_LEN {
            return Err(ProtocolError::MalformedFrame(format!(
                "{name}: template has {} bytes, at least {MIN_TEMPLATE_LEN} required",
                bytes.len()
            )));
        }
        if bytes[..HEADER_LEN] != REQUEST_HEADER {
            return Err(ProtocolError::MalformedFrame(format!(
                "{name}: template must start with 55AA, found {}",
                hex::encode_upper(&bytes[..HEADER_LEN])
            )));
        }

        Ok(Self {
            name,
            kind,
            bytes,
            card_index_offset: CARD_INDEX_OFFSET,
        })
    }

    /// Create a template from a hex string such as `"55AA 0000 FE00 ..."`
    pub fn from_hex(
        name: impl Into<String>,
        kind: DecoderKind,
        hex_str: &str,
    ) -> Result<Self, ProtocolError> {
        let name = name.into();
        let digits: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();
        let digits = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(&digits);

        let bytes = hex::decode(digits).map_err(|e| {
            ProtocolError::MalformedFrame(format!("{name}: invalid hex template: {e}"))
        })?;

        Self::new(name, kind, bytes)
    }

    /// Template from a constant known to be well formed
    pub(crate) fn builtin(name: &str, kind: DecoderKind, bytes: &[u8; MIN_TEMPLATE_LEN]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            bytes: bytes.to_vec(),
            card_index_offset: CARD_INDEX_OFFSET,
        }
    }

    /// Command name, used as the result key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decoder applied to responses of this command
    pub fn kind(&self) -> DecoderKind {
        self.kind
    }

    /// Template bytes, checksum excluded
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Position of the card index placeholder
    pub fn card_index_offset(&self) -> usize {
        self.card_index_offset
    }

    /// Card index stored in the template itself
    pub fn baked_card_index(&self) -> u8 {
        self.bytes[self.card_index_offset]
    }

    /// Number of data bytes requested from the device
    pub fn data_len(&self) -> usize {
        usize::from(u16::from_le_bytes([
            self.bytes[DATA_LEN_OFFSET],
            self.bytes[DATA_LEN_OFFSET + 1],
        ]))
    }

    /// Length of a complete response to this request
    pub fn response_len(&self) -> usize {
        RESPONSE_OVERHEAD + self.data_len()
    }
}

/// A complete request frame, checksum included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Frame bytes as sent on the wire
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Frame length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false: a frame holds at least a header and a checksum
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The trailing checksum in wire order
    pub fn checksum(&self) -> [u8; CHECKSUM_LEN] {
        let n = self.bytes.len();
        [self.bytes[n - 2], self.bytes[n - 1]]
    }

    /// Consume the frame
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_spaced_hex(f, &self.bytes)
    }
}

/// Build the request frame addressed to `card_index`
pub fn build_frame(template: &CommandTemplate, card_index: u8) -> Result<Frame, ProtocolError> {
    let mut bytes = Vec::with_capacity(template.bytes.len() + CHECKSUM_LEN);
    bytes.extend_from_slice(&template.bytes);
    bytes[template.card_index_offset] = card_index;

    let sum = checksum::checksum(&bytes)?;
    bytes.extend_from_slice(&sum);

    Ok(Frame { bytes })
}

/// Result code carried in byte 2 of every response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCode {
    /// Command executed
    Success,
    /// The sending card timed out accessing its devices
    DeviceTimeout,
    /// The request failed its checksum
    RequestChecksum,
    /// The acknowledge package failed its checksum
    AckChecksum,
    /// Unsupported command
    InvalidCommand,
    /// Code not documented by the vendor
    Unknown(u8),
}

impl AckCode {
    /// Get result code from u8
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x00 => Self::Success,
            0x01 => Self::DeviceTimeout,
            0x02 => Self::RequestChecksum,
            0x03 => Self::AckChecksum,
            0x04 => Self::InvalidCommand,
            other => Self::Unknown(other),
        }
    }

    /// Wire value
    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::DeviceTimeout => 0x01,
            Self::RequestChecksum => 0x02,
            Self::AckChecksum => 0x03,
            Self::InvalidCommand => 0x04,
            Self::Unknown(code) => *code,
        }
    }

    /// Whether the command succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for AckCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Command succeeded"),
            Self::DeviceTimeout => write!(
                f,
                "Command failed due to time out (time out on trying to access devices connected to a sending card)"
            ),
            Self::RequestChecksum => {
                write!(f, "Command failed due to check error on request data package")
            }
            Self::AckChecksum => {
                write!(f, "Command failed due error on acknowledge data package")
            }
            Self::InvalidCommand => write!(f, "Command failed due to invalid command"),
            Self::Unknown(code) => write!(f, "Unknown acknowledge code 0x{code:02X}"),
        }
    }
}

/// A response that passed header, length and result code checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedResponse {
    bytes: Bytes,
}

impl ValidatedResponse {
    /// The full response
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Response length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false for a validated response
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Everything before the trailing checksum
    pub fn telemetry(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - CHECKSUM_LEN]
    }

    /// Whether the response's own checksum is consistent
    pub fn checksum_ok(&self) -> bool {
        checksum::verify(&self.bytes)
    }
}

impl fmt::Display for ValidatedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_spaced_hex(f, &self.bytes)
    }
}

/// Validate raw bytes read after sending a request.
///
/// `expected_len` is the length of a complete response; it is never taken
/// below [`RESPONSE_OVERHEAD`] so the decoders always find their fields.
pub fn validate_response(
    raw: impl Into<Bytes>,
    expected_len: usize,
) -> Result<ValidatedResponse, ProtocolError> {
    let raw = raw.into();

    if raw.is_empty() {
        return Err(ProtocolError::Timeout);
    }

    let expected = expected_len.max(RESPONSE_OVERHEAD);
    if raw.len() < expected {
        return Err(ProtocolError::TooShort {
            expected,
            received: raw.to_vec(),
        });
    }

    let header = [raw[0], raw[1]];
    if header != RESPONSE_HEADER {
        return Err(ProtocolError::HeaderMismatch {
            found: u16::from_be_bytes(header),
        });
    }

    let ack = AckCode::from_u8(raw[ACK_CODE_OFFSET]);
    if !ack.is_success() {
        return Err(ProtocolError::Ack(ack));
    }

    let response = ValidatedResponse { bytes: raw };
    if !response.checksum_ok() {
        tracing::debug!("Response checksum mismatch, trusting result code: {}", response);
    }

    Ok(response)
}

fn write_spaced_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{byte:02X}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOLTAGE: [u8; 18] = [
        0x55, 0xAA, 0x00, 0x05, 0xFE, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00,
        0x0A, 0x01, 0x00,
    ];

    fn voltage_template() -> CommandTemplate {
        CommandTemplate::new("VoltageOfScanCard", DecoderKind::Voltage, VOLTAGE).unwrap()
    }

    fn response(ack: u8, data: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0xAA, 0x55, ack, 0x05, 0x00, 0xFE, 0x01, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&[0x00, 0x00, 0x03, 0x00, 0x00, 0x0A]);
        bytes.extend_from_slice(&(data.len() as u16).to_le_bytes());
        bytes.extend_from_slice(data);
        let sum = checksum::checksum(&bytes).unwrap();
        bytes.extend_from_slice(&sum);
        bytes
    }

    #[test]
    fn test_template_metadata() {
        let template = voltage_template();
        assert_eq!(template.name(), "VoltageOfScanCard");
        assert_eq!(template.card_index_offset(), 8);
        assert_eq!(template.data_len(), 1);
        assert_eq!(template.response_len(), 21);
        assert_eq!(template.baked_card_index(), 0);
    }

    #[test]
    fn test_template_rejects_bad_input() {
        assert!(matches!(
            CommandTemplate::new("short", DecoderKind::Voltage, vec![0x55, 0xAA, 0x00]),
            Err(ProtocolError::MalformedFrame(_))
        ));

        let mut wrong_header = VOLTAGE;
        wrong_header[0] = 0xAA;
        wrong_header[1] = 0x55;
        assert!(CommandTemplate::new("hdr", DecoderKind::Voltage, wrong_header).is_err());

        // odd number of hex digits
        assert!(matches!(
            CommandTemplate::from_hex("odd", DecoderKind::Voltage, "55AA0"),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_template_from_hex() {
        let template = CommandTemplate::from_hex(
            "VoltageOfScanCard",
            DecoderKind::Voltage,
            "55AA 0005 FE00 0100 0000 0000 0300 000A 0100",
        )
        .unwrap();
        assert_eq!(template, voltage_template());
    }

    #[test]
    fn test_build_frame_substitutes_card_index() {
        let template = voltage_template();

        for card in [0u8, 1, 7, 255] {
            let frame = build_frame(&template, card).unwrap();
            assert_eq!(frame.len(), VOLTAGE.len() + CHECKSUM_LEN);
            assert_eq!(frame.as_bytes()[CARD_INDEX_OFFSET], card);
            assert_eq!(&frame.as_bytes()[..CARD_INDEX_OFFSET], &VOLTAGE[..CARD_INDEX_OFFSET]);
            assert!(checksum::verify(frame.as_bytes()));
        }

        // template stays untouched
        assert_eq!(template.bytes(), &VOLTAGE);
    }

    #[test]
    fn test_build_frame_checksum() {
        let frame = build_frame(&voltage_template(), 0).unwrap();
        // 0x05 + 0xFE + 0x01 + 0x03 + 0x0A + 0x01 + 0x5555 = 0x5667
        assert_eq!(frame.checksum(), [0x67, 0x56]);
        assert_eq!(
            frame.to_string(),
            "55 AA 00 05 FE 00 01 00 00 00 00 00 03 00 00 0A 01 00 67 56"
        );
    }

    #[test]
    fn test_empty_response_is_timeout() {
        assert_eq!(
            validate_response(Vec::<u8>::new(), 21),
            Err(ProtocolError::Timeout)
        );
    }

    #[test]
    fn test_every_short_length_is_too_short() {
        let full = response(0x00, &[0xB2]);
        for len in 1..full.len() {
            match validate_response(full[..len].to_vec(), full.len()) {
                Err(ProtocolError::TooShort { expected, received }) => {
                    assert_eq!(expected, full.len());
                    assert_eq!(received, &full[..len]);
                }
                other => panic!("length {len}: {other:?}"),
            }
        }
        assert!(validate_response(full, 21).is_ok());
    }

    #[test]
    fn test_header_mismatch() {
        let mut raw = response(0x00, &[0xB2]);
        raw[0] = 0xBB;
        assert_eq!(
            validate_response(raw, 21),
            Err(ProtocolError::HeaderMismatch { found: 0xBB55 })
        );
    }

    #[test]
    fn test_ack_codes() {
        let raw = response(0x02, &[0xB2]);
        let err = validate_response(raw, 21).unwrap_err();
        assert_eq!(err, ProtocolError::Ack(AckCode::RequestChecksum));
        assert_eq!(
            err.to_string(),
            "Command failed due to check error on request data package"
        );

        for (code, expected) in [
            (0x01, AckCode::DeviceTimeout),
            (0x03, AckCode::AckChecksum),
            (0x04, AckCode::InvalidCommand),
            (0x7F, AckCode::Unknown(0x7F)),
        ] {
            assert_eq!(
                validate_response(response(code, &[0x00]), 21),
                Err(ProtocolError::Ack(expected))
            );
            assert_eq!(expected.code(), code);
        }
    }

    #[test]
    fn test_valid_response() {
        let raw = response(0x00, &[0xB2]);
        let validated = validate_response(raw.clone(), 21).unwrap();
        assert_eq!(validated.as_bytes(), raw.as_slice());
        assert_eq!(validated.telemetry(), &raw[..raw.len() - 2]);
        assert!(validated.checksum_ok());
    }

    #[test]
    fn test_bad_response_checksum_is_tolerated() {
        let mut raw = response(0x00, &[0xB2]);
        let n = raw.len();
        raw[n - 1] ^= 0xFF;
        let validated = validate_response(raw, 21).unwrap();
        assert!(!validated.checksum_ok());
    }
}
