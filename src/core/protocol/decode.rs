//! Telemetry field decoders
//!
//! Scan cards report one reading in the 16-bit field right before the
//! response checksum. Multi-function cards pack voltage, humidity and
//! temperature into the last telemetry bytes. Only the low byte of a field
//! carries data:
//!
//! ```text
//! bit  7   6   5   4   3   2   1   0
//!     [V | ------ magnitude -------- ]   voltage, humidity (V = valid)
//!     [ ------ magnitude ------- | S ]   temperature (S = negative)
//! ```
//!
//! The temperature layout overlaps the validity flag with the magnitude. This
//! matches what the cards put on the wire and is decoded as-is.

use super::frame::ValidatedResponse;
use super::ProtocolError;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const VALID_FLAG: u8 = 0x80;
const SIGN_BIT: u8 = 0x01;
const MAGNITUDE_MASK: u8 = 0x7F;

/// Decoder selected by a command template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderKind {
    /// Scan card temperature
    Temperature,
    /// Scan card supply voltage
    Voltage,
    /// Scan card humidity
    Humidity,
    /// Multi-function card: voltage, humidity and temperature at once
    Composite,
}

impl DecoderKind {
    /// Get all decoder kinds
    pub fn all() -> &'static [DecoderKind] {
        &[
            DecoderKind::Temperature,
            DecoderKind::Voltage,
            DecoderKind::Humidity,
            DecoderKind::Composite,
        ]
    }

    /// Get name of decoder kind
    pub fn name(&self) -> &'static str {
        match self {
            DecoderKind::Temperature => "temperature",
            DecoderKind::Voltage => "voltage",
            DecoderKind::Humidity => "humidity",
            DecoderKind::Composite => "composite",
        }
    }
}

impl fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DecoderKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "temperature" | "temp" => Ok(Self::Temperature),
            "voltage" | "volt" => Ok(Self::Voltage),
            "humidity" => Ok(Self::Humidity),
            "composite" | "multifunction" => Ok(Self::Composite),
            other => Err(ProtocolError::MalformedFrame(format!(
                "unknown decoder kind: {other}"
            ))),
        }
    }
}

/// Validity flag of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validity {
    /// Sensor reports a valid value
    Ok,
    /// Sensor reports an invalid value
    Ko,
    /// The field carries no validity flag
    #[default]
    Unknown,
}

impl Validity {
    fn from_flag(byte: u8) -> Self {
        if byte & VALID_FLAG != 0 {
            Self::Ok
        } else {
            Self::Ko
        }
    }

    /// Label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok => "Ok",
            Self::Ko => "KO",
            Self::Unknown => "",
        }
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Validity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unknown => serializer.serialize_none(),
            other => serializer.serialize_str(other.label()),
        }
    }
}

/// Sign and magnitude temperature in degrees Celsius.
///
/// Kept as sign + magnitude because the cards can report `-0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Temperature {
    /// Sign bit was set
    pub negative: bool,
    /// Absolute value in degrees
    pub magnitude: u8,
}

impl Temperature {
    /// Value in degrees as a signed integer
    pub fn degrees(&self) -> i16 {
        let magnitude = i16::from(self.magnitude);
        if self.negative {
            -magnitude
        } else {
            magnitude
        }
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.negative { '-' } else { '+' };
        write!(f, "{sign}{}", self.magnitude)
    }
}

impl Serialize for Temperature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Supply voltage in tenths of a volt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voltage {
    /// Tenths of a volt
    pub tenths: u8,
}

impl Voltage {
    /// Value in volts
    pub fn volts(&self) -> f64 {
        f64::from(self.tenths) / 10.0
    }
}

impl fmt::Display for Voltage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.tenths / 10, self.tenths % 10)
    }
}

impl Serialize for Voltage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.volts())
    }
}

/// A decoded value with its validity flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reading<T> {
    /// Validity flag
    pub valid: Validity,
    /// Decoded value
    pub value: T,
}

/// Readings of a multi-function card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompositeReading {
    /// Supply voltage
    pub volt: Reading<Voltage>,
    /// Relative humidity in percent
    pub humidity: Reading<u8>,
    /// Temperature
    pub temperature: Reading<Temperature>,
}

/// Decoded response of one command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Telemetry {
    /// Scan card temperature
    Temperature(Reading<Temperature>),
    /// Scan card voltage
    Voltage(Reading<Voltage>),
    /// Scan card humidity
    Humidity(Reading<u8>),
    /// Multi-function card
    Composite(CompositeReading),
}

/// One reported quantity of a telemetry value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Quantity name as used in reports
    pub name: &'static str,
    /// Validity flag
    pub valid: Validity,
    /// Formatted value
    pub value: String,
}

impl Field {
    fn new(name: &'static str, valid: Validity, value: impl fmt::Display) -> Self {
        Self {
            name,
            valid,
            value: value.to_string(),
        }
    }
}

impl Telemetry {
    /// Reported quantities, in report order
    pub fn fields(&self) -> Vec<Field> {
        match self {
            Self::Temperature(r) => vec![Field::new("temperature", r.valid, r.value)],
            Self::Voltage(r) => vec![Field::new("volt", r.valid, r.value)],
            Self::Humidity(r) => vec![Field::new("humidity", r.valid, r.value)],
            Self::Composite(c) => vec![
                Field::new("volt", c.volt.valid, c.volt.value),
                Field::new("temperature", c.temperature.valid, c.temperature.value),
                Field::new("humidity", c.humidity.valid, c.humidity.value),
            ],
        }
    }
}

/// Decode a temperature field. The validity flag is not reported.
pub fn decode_temperature(slice: u16) -> Reading<Temperature> {
    let [_, low] = slice.to_be_bytes();
    Reading {
        valid: Validity::Unknown,
        value: Temperature {
            negative: low & SIGN_BIT != 0,
            magnitude: low >> 1,
        },
    }
}

/// Decode a voltage field
pub fn decode_voltage(slice: u16) -> Reading<Voltage> {
    let [_, low] = slice.to_be_bytes();
    Reading {
        valid: Validity::from_flag(low),
        value: Voltage {
            tenths: low & MAGNITUDE_MASK,
        },
    }
}

/// Decode a humidity field
pub fn decode_humidity(slice: u16) -> Reading<u8> {
    let [_, low] = slice.to_be_bytes();
    Reading {
        valid: Validity::from_flag(low),
        value: low & MAGNITUDE_MASK,
    }
}

/// The 16-bit scan card field preceding the response checksum
pub fn scan_card_slice(response: &ValidatedResponse) -> u16 {
    let telemetry = response.telemetry();
    let n = telemetry.len();
    u16::from_be_bytes([telemetry[n - 2], telemetry[n - 1]])
}

/// Decode a multi-function card response.
///
/// Working backward from the checksum: voltage, humidity, then the 16-bit
/// temperature field.
pub fn decode_composite(response: &ValidatedResponse) -> CompositeReading {
    let telemetry = response.telemetry();
    let n = telemetry.len();

    CompositeReading {
        volt: decode_voltage(u16::from(telemetry[n - 1])),
        humidity: decode_humidity(u16::from(telemetry[n - 2])),
        temperature: decode_temperature(u16::from_be_bytes([telemetry[n - 4], telemetry[n - 3]])),
    }
}

/// Decode a response with the decoder selected by `kind`
pub fn decode(kind: DecoderKind, response: &ValidatedResponse) -> Telemetry {
    match kind {
        DecoderKind::Temperature => Telemetry::Temperature(decode_temperature(scan_card_slice(response))),
        DecoderKind::Voltage => Telemetry::Voltage(decode_voltage(scan_card_slice(response))),
        DecoderKind::Humidity => Telemetry::Humidity(decode_humidity(scan_card_slice(response))),
        DecoderKind::Composite => Telemetry::Composite(decode_composite(response)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::checksum;
    use crate::core::protocol::frame::validate_response;

    fn response(data: &[u8]) -> ValidatedResponse {
        let mut bytes = vec![0xAA, 0x55, 0x00, 0x00, 0x00, 0xFE, 0x01, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x0A]);
        bytes.extend_from_slice(&(data.len() as u16).to_le_bytes());
        bytes.extend_from_slice(data);
        let sum = checksum::checksum(&bytes).unwrap();
        bytes.extend_from_slice(&sum);
        let len = bytes.len();
        validate_response(bytes, len).unwrap()
    }

    #[test]
    fn test_temperature_negative_zero() {
        let reading = decode_temperature(0x0001);
        assert_eq!(reading.valid, Validity::Unknown);
        assert!(reading.value.negative);
        assert_eq!(reading.value.magnitude, 0);
        assert_eq!(reading.value.to_string(), "-0");
        assert_eq!(reading.value.degrees(), 0);
    }

    #[test]
    fn test_temperature_layout() {
        // 0b0101_0110: magnitude 43, positive
        assert_eq!(decode_temperature(0x0056).value.to_string(), "+43");
        // 0b0001_0101: magnitude 10, negative
        assert_eq!(decode_temperature(0x0015).value.degrees(), -10);
        // high byte is ignored
        assert_eq!(decode_temperature(0xFF56), decode_temperature(0x0056));
    }

    #[test]
    fn test_temperature_is_pure() {
        for slice in [0x0000, 0x0001, 0x00FF, 0x1234] {
            assert_eq!(decode_temperature(slice), decode_temperature(slice));
        }
    }

    #[test]
    fn test_voltage() {
        let reading = decode_voltage(0x00B2);
        assert_eq!(reading.valid, Validity::Ok);
        assert_eq!(reading.value.tenths, 50);
        assert_eq!(reading.value.to_string(), "5.0");

        let reading = decode_voltage(0x0030);
        assert_eq!(reading.valid, Validity::Ko);
        assert_eq!(reading.value.to_string(), "4.8");
        assert!((reading.value.volts() - 4.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_humidity() {
        let reading = decode_humidity(0x00AD);
        assert_eq!(reading.valid, Validity::Ok);
        assert_eq!(reading.value, 45);

        let reading = decode_humidity(0x007F);
        assert_eq!(reading.valid, Validity::Ko);
        assert_eq!(reading.value, 127);
    }

    #[test]
    fn test_scan_card_slice() {
        let resp = response(&[0x12, 0x56]);
        assert_eq!(scan_card_slice(&resp), 0x1256);

        // one data byte: the field spans the length byte and the data
        let resp = response(&[0xB2]);
        assert_eq!(scan_card_slice(&resp), 0x00B2);
        assert_eq!(
            decode(DecoderKind::Voltage, &resp),
            Telemetry::Voltage(decode_voltage(0x00B2))
        );
    }

    #[test]
    fn test_composite() {
        let resp = response(&[0x00, 0x2A, 0xAD, 0xB2]);
        let reading = decode_composite(&resp);

        assert_eq!(reading.volt.valid, Validity::Ok);
        assert_eq!(reading.volt.value.to_string(), "5.0");
        assert_eq!(reading.humidity.valid, Validity::Ok);
        assert_eq!(reading.humidity.value, 45);
        assert_eq!(reading.temperature.valid, Validity::Unknown);
        assert_eq!(reading.temperature.value.to_string(), "+21");

        assert_eq!(
            decode(DecoderKind::Composite, &resp),
            Telemetry::Composite(reading)
        );
    }

    #[test]
    fn test_fields() {
        let telemetry = decode(DecoderKind::Composite, &response(&[0x00, 0x2B, 0x2D, 0xB2]));
        let fields = telemetry.fields();
        let names: Vec<_> = fields.iter().map(|f| f.name).collect();
        assert_eq!(names, ["volt", "temperature", "humidity"]);
        assert_eq!(fields[1].value, "-21");
        assert_eq!(fields[2].valid, Validity::Ko);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("Voltage".parse::<DecoderKind>().unwrap(), DecoderKind::Voltage);
        assert_eq!("multifunction".parse::<DecoderKind>().unwrap(), DecoderKind::Composite);
        assert!("lux".parse::<DecoderKind>().is_err());
    }

    #[test]
    fn test_json_shape() {
        let telemetry = Telemetry::Temperature(decode_temperature(0x0001));
        let json = serde_json::to_value(telemetry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "temperature", "valid": null, "value": "-0" })
        );
    }
}
