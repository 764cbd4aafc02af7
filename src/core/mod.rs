//! Core module containing the main functionality of novapoll
//!
//! This module provides:
//! - NovaStar protocol codec (checksum, frames, telemetry decoders)
//! - Transport layer with a serial implementation
//! - Sequential polling engine
//! - Report output (sender file, CSV log, JSON)

pub mod poller;
pub mod protocol;
pub mod report;
pub mod transport;
