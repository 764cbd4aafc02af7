//! Application settings

use crate::core::poller::{PollerConfig, MAX_CARDS};
use crate::core::protocol::{
    CommandSet, CommandTemplate, DecoderKind, ProtocolError, READ_BUFFER_LEN,
};
use crate::core::report::UNKNOWN_OPERATOR;
use crate::core::transport::{
    SerialConfig, SerialFlowControl, SerialParity, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT,
};
use crate::utils::DEFAULT_PORT_HINT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The platform has no configuration directory
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Reading or writing the file failed
    #[error("Cannot access {path}: {source}")]
    Io {
        /// Configuration file
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be written as TOML
    #[error("Cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A configured command template is malformed
    #[error("Invalid command: {0}")]
    Command(#[from] ProtocolError),

    /// A value is out of range
    #[error("Invalid value: {0}")]
    Invalid(String),
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial port settings
    pub serial: SerialSettings,
    /// Polling settings
    pub polling: PollingSettings,
    /// Report output settings
    pub report: ReportSettings,
    /// Command templates replacing the built-in sets
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandDefinition>,
}

impl AppConfig {
    /// Load config from the default location, or defaults if there is none
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::config_path().ok_or(ConfigError::NoConfigDir)?;

        if path.exists() {
            Self::load_from(&path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = super::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Save config to a file, creating its folder
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        std::fs::write(path, self.to_toml()?).map_err(io_error)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling.cards > MAX_CARDS {
            return Err(ConfigError::Invalid(format!(
                "polling.cards = {}, at most {MAX_CARDS} cards are addressable",
                self.polling.cards
            )));
        }
        if let Some(len) = self.polling.min_response_len {
            if len > READ_BUFFER_LEN {
                return Err(ConfigError::Invalid(format!(
                    "polling.min_response_len = {len}, replies are at most {READ_BUFFER_LEN} bytes"
                )));
            }
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("serial.baud_rate must not be 0".into()));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "serial.read_timeout_ms must not be 0".into(),
            ));
        }
        Ok(())
    }

    /// Commands to poll: the configured ones, or the built-in sets
    pub fn command_set(&self) -> Result<CommandSet, ConfigError> {
        if self.commands.is_empty() {
            return Ok(CommandSet::builtin());
        }

        let mut primary = Vec::new();
        let mut multifunction = Vec::new();
        for definition in &self.commands {
            let template = definition.template()?;
            if definition.multifunction {
                multifunction.push(template);
            } else {
                primary.push(template);
            }
        }

        Ok(CommandSet::new(primary, multifunction))
    }

    /// Polling engine parameters
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            cards: self.polling.cards,
            multifunction: self.polling.multifunction,
            read_timeout: self.serial.read_timeout(),
            min_response_len: self.polling.min_response_len,
        }
    }

    /// Serial parameters for `port`
    pub fn serial_config(&self, port: &str) -> SerialConfig {
        SerialConfig::new(port, self.serial.baud_rate)
            .parity(self.serial.parity)
            .flow_control(self.serial.flow_control)
    }
}

/// Serial port settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port name; auto-selected when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Description fragment used for auto-selection
    pub port_hint: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Reply timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Parity
    pub parity: SerialParity,
    /// Flow control
    pub flow_control: SerialFlowControl,
}

impl SerialSettings {
    /// Reply timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            port_hint: DEFAULT_PORT_HINT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: u64::try_from(DEFAULT_READ_TIMEOUT.as_millis()).unwrap_or(1000),
            parity: SerialParity::None,
            flow_control: SerialFlowControl::None,
        }
    }
}

/// Polling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    /// Number of scan cards
    pub cards: u32,
    /// Poll the multi-function card
    pub multifunction: bool,
    /// Repeat cycles with this pause; a single cycle when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    /// Lower bound on the expected response length
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_response_len: Option<usize>,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            cards: 1,
            multifunction: false,
            interval_secs: None,
            min_response_len: None,
        }
    }
}

/// Report output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Host label written in front of every sender line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Sender file replaced after every cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_file: Option<PathBuf>,
    /// Folder of CSV logs; no CSV log when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_dir: Option<PathBuf>,
    /// Operator recorded in CSV rows
    pub operator: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            hostname: None,
            sender_file: None,
            csv_dir: None,
            operator: UNKNOWN_OPERATOR.to_string(),
        }
    }
}

/// A command template defined in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDefinition {
    /// Command name
    pub name: String,
    /// Decoder for the replies
    pub kind: DecoderKind,
    /// Request bytes as hex, checksum excluded
    pub template: String,
    /// Part of the multi-function set
    #[serde(default)]
    pub multifunction: bool,
}

impl CommandDefinition {
    /// Parse the hex template
    pub fn template(&self) -> Result<CommandTemplate, ProtocolError> {
        CommandTemplate::from_hex(&self.name, self.kind, &self.template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.read_timeout_ms, 1000);
        assert_eq!(config.serial.port_hint, "CP210x");
        assert_eq!(config.report.operator, "n/a");
        assert_eq!(config.command_set().unwrap(), CommandSet::builtin());
    }

    #[test]
    fn test_partial_document() {
        let config = AppConfig::from_toml(
            r#"
            [serial]
            port = "COM3"
            read_timeout_ms = 250

            [polling]
            cards = 4
            multifunction = true

            [report]
            hostname = "M700 Ticker Temp"
            sender_file = "C:/zabbix/senderfile.txt"
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.port.as_deref(), Some("COM3"));
        assert_eq!(config.serial.baud_rate, 115_200);

        let poller = config.poller_config();
        assert_eq!(poller.cards, 4);
        assert!(poller.multifunction);
        assert_eq!(poller.read_timeout, Duration::from_millis(250));
        assert_eq!(poller.min_response_len, None);

        assert_eq!(config.report.hostname.as_deref(), Some("M700 Ticker Temp"));
        assert_eq!(config.report.operator, "n/a");
    }

    #[test]
    fn test_custom_commands() {
        let config = AppConfig::from_toml(
            r#"
            [[commands]]
            name = "HumidityOfScanCard"
            kind = "humidity"
            template = "55AA 0000 FE00 0100 0000 0000 0400 000A 0100"

            [[commands]]
            name = "FuncTempHumVolt"
            kind = "composite"
            template = "55AA 0016 FE00 0200 0000 0000 0000 0004 0400"
            multifunction = true
            "#,
        )
        .unwrap();

        let set = config.command_set().unwrap();
        assert_eq!(set.primary().len(), 1);
        assert_eq!(set.primary()[0].kind(), DecoderKind::Humidity);
        assert_eq!(set.multifunction().len(), 1);
        assert_eq!(set.multifunction()[0].response_len(), 24);
    }

    #[test]
    fn test_bad_command_template() {
        let config = AppConfig::from_toml(
            r#"
            [[commands]]
            name = "Broken"
            kind = "voltage"
            template = "55AA 00"
            "#,
        )
        .unwrap();

        assert!(matches!(
            config.command_set(),
            Err(ConfigError::Command(ProtocolError::MalformedFrame(_)))
        ));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            AppConfig::from_toml("[polling]\ncards = 300\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[serial]\nbaud_rate = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[polling]\nmin_response_len = 2048\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(AppConfig::from_toml("[polling]\nmin_response_len = 1024\n").is_ok());
        assert!(matches!(
            AppConfig::from_toml("[polling]\ncards = \"two\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.serial.port = Some("/dev/ttyUSB0".to_string());
        config.polling.cards = 8;
        config.polling.interval_secs = Some(60);
        config.report.csv_dir = Some(PathBuf::from("csv"));

        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppConfig::load_from(&dir.path().join("absent.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_serial_config() {
        let mut config = AppConfig::default();
        config.serial.parity = SerialParity::Even;
        let serial = config.serial_config("COM5");
        assert_eq!(serial.port, "COM5");
        assert_eq!(serial.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(serial.parity, SerialParity::Even);
    }
}
