//! Utilities around the polling core

pub mod port_select;

pub use port_select::{candidates, discover_port, select_port, PortCandidate, DEFAULT_PORT_HINT};
