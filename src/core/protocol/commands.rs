//! Built-in command sets

use super::decode::DecoderKind;
use super::frame::CommandTemplate;

/// Scan card temperature, 2 data bytes
pub const TEMP_VALID_OF_SCAN_CARD: [u8; 18] = [
    0x55, 0xAA, 0x00, 0x00, 0xFE, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0A,
    0x02, 0x00,
];

/// Scan card supply voltage, 1 data byte
pub const VOLTAGE_OF_SCAN_CARD: [u8; 18] = [
    0x55, 0xAA, 0x00, 0x05, 0xFE, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x0A,
    0x01, 0x00,
];

/// Multi-function card temperature, humidity and voltage, 4 data bytes
pub const FUNC_TEMP_HUM_VOLT: [u8; 18] = [
    0x55, 0xAA, 0x00, 0x16, 0xFE, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04,
    0x04, 0x00,
];

/// Primary and multi-function command templates, in polling order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet {
    primary: Vec<CommandTemplate>,
    multifunction: Vec<CommandTemplate>,
}

impl CommandSet {
    /// Create a command set
    pub fn new(primary: Vec<CommandTemplate>, multifunction: Vec<CommandTemplate>) -> Self {
        Self {
            primary,
            multifunction,
        }
    }

    /// The commands shipped with the application
    pub fn builtin() -> Self {
        Self {
            primary: vec![
                CommandTemplate::builtin(
                    "TempValidOfScanCard",
                    DecoderKind::Temperature,
                    &TEMP_VALID_OF_SCAN_CARD,
                ),
                CommandTemplate::builtin(
                    "VoltageOfScanCard",
                    DecoderKind::Voltage,
                    &VOLTAGE_OF_SCAN_CARD,
                ),
            ],
            multifunction: vec![CommandTemplate::builtin(
                "FuncTempHumVolt",
                DecoderKind::Composite,
                &FUNC_TEMP_HUM_VOLT,
            )],
        }
    }

    /// Commands sent to every card
    pub fn primary(&self) -> &[CommandTemplate] {
        &self.primary
    }

    /// Commands sent once per cycle to the multi-function card
    pub fn multifunction(&self) -> &[CommandTemplate] {
        &self.multifunction
    }

    /// Find a command by name in either set (case-insensitive)
    pub fn find(&self, name: &str) -> Option<&CommandTemplate> {
        self.iter().find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// All commands, primary first
    pub fn iter(&self) -> impl Iterator<Item = &CommandTemplate> {
        self.primary.iter().chain(self.multifunction.iter())
    }

    /// Total number of commands
    pub fn len(&self) -> usize {
        self.primary.len() + self.multifunction.len()
    }

    /// Whether both sets are empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CommandSet {
    fn default() -> Self {
        Self::builtin()
    }
}
