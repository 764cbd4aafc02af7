//! # novapoll Core Library
//!
//! Telemetry polling for NovaStar LED display controllers:
//! - NovaStar sending-card protocol (checksum, request frames, response validation)
//! - Bit-packed scan card and multi-function card telemetry decoders
//! - Serial transport with port auto-selection
//! - Sequential multi-card polling engine
//!
//! ## Features
//!
//! - Temperature, supply voltage and humidity readings per card
//! - Monitoring "sender file" and CSV log output
//! - TOML configuration with custom command templates
//! - CLI with exit codes for automation
//!
//! ## Example
//!
//! ```rust,no_run
//! use novapoll_core::{CommandSet, Poller, PollerConfig, SerialConfig, SerialLink};
//!
//! fn main() -> anyhow::Result<()> {
//!     let link = SerialLink::open(SerialConfig::new("COM3", 115_200))?;
//!     let mut poller = Poller::new(link, CommandSet::builtin(), PollerConfig::new(4));
//!
//!     let results = poller.run_cycle()?;
//!     for line in novapoll_core::core::report::sender_lines("M700", &results) {
//!         println!("{line}");
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;
pub mod utils;

// Re-exports for convenience
pub use crate::cli::{ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ConfigError};
pub use crate::core::poller::{CardReading, PollError, Poller, PollerConfig, ResultSet};
pub use crate::core::protocol::{
    build_frame, validate_response, CommandSet, CommandTemplate, DecoderKind, ProtocolError,
    Telemetry,
};
pub use crate::core::report::{CsvLog, ReportError};
pub use crate::core::transport::{SerialConfig, SerialLink, Transport, TransportError};
pub use crate::utils::{discover_port, PortCandidate};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
