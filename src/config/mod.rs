//! Configuration module
//!
//! Handles poller settings stored as TOML

mod settings;

pub use settings::{
    AppConfig, CommandDefinition, ConfigError, PollingSettings, ReportSettings, SerialSettings,
};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Name of the configuration file
pub const CONFIG_FILE: &str = "config.toml";

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "novapoll", "Novapoll").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default configuration file path
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(CONFIG_FILE))
}
