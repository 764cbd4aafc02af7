//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::poller::PollError;
use crate::core::protocol::ProtocolError;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Protocol error
    pub const PROTOCOL_ERROR: u8 = 9;

    /// No card answered, or no port leads to one
    pub const DEVICE_NOT_FOUND: u8 = 12;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;
}

const ALL_CODES: [u8; 10] = [
    ExitCodes::SUCCESS,
    ExitCodes::ERROR,
    ExitCodes::INVALID_ARGS,
    ExitCodes::CONNECTION_FAILED,
    ExitCodes::PERMISSION_DENIED,
    ExitCodes::CONFIG_ERROR,
    ExitCodes::PROTOCOL_ERROR,
    ExitCodes::DEVICE_NOT_FOUND,
    ExitCodes::PORT_NOT_FOUND,
    ExitCodes::INTERNAL_ERROR,
];

fn transport_exit_code(err: &TransportError) -> u8 {
    match err {
        TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
        TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
        TransportError::NoSuitablePort(_) => ExitCodes::DEVICE_NOT_FOUND,
        TransportError::InvalidConfiguration(_) => ExitCodes::CONFIG_ERROR,
        TransportError::ConnectionFailed(_)
        | TransportError::IoError(_)
        | TransportError::Disconnected => ExitCodes::CONNECTION_FAILED,
    }
}

/// Exit code for an error reaching the top of the binary
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<PollError>() {
            return match e {
                PollError::Transport(t) => transport_exit_code(t),
                PollError::Protocol(_) => ExitCodes::PROTOCOL_ERROR,
                PollError::TooManyCards(_) => ExitCodes::INVALID_ARGS,
            };
        }
        if let Some(e) = cause.downcast_ref::<TransportError>() {
            return transport_exit_code(e);
        }
        if cause.downcast_ref::<ProtocolError>().is_some() {
            return ExitCodes::PROTOCOL_ERROR;
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return ExitCodes::CONFIG_ERROR;
        }
    }
    ExitCodes::ERROR
}

/// Convert an error to a process exit code
pub fn to_exit_code(err: &anyhow::Error) -> ExitCode {
    ExitCode::from(exit_code_for(err))
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        7 => "Permission denied",
        8 => "Configuration error",
        9 => "Protocol error",
        12 => "Device not found",
        14 => "Port not found",
        127 => "Internal error",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in ALL_CODES {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptions() {
        for code in ALL_CODES {
            assert_ne!(exit_code_description(code), "Unknown error", "code {code}");
        }
        assert_eq!(exit_code_description(42), "Unknown error");
    }

    #[test]
    fn test_transport_errors() {
        let err = anyhow::Error::new(TransportError::PortNotFound("COM9".into()));
        assert_eq!(exit_code_for(&err), ExitCodes::PORT_NOT_FOUND);

        let err = anyhow::Error::new(PollError::Transport(TransportError::Disconnected));
        assert_eq!(exit_code_for(&err), ExitCodes::CONNECTION_FAILED);

        let err = anyhow::Error::new(TransportError::NoSuitablePort("none".into()));
        assert_eq!(exit_code_for(&err), ExitCodes::DEVICE_NOT_FOUND);
    }

    #[test]
    fn test_context_is_looked_through() {
        let err = anyhow::Error::new(ConfigError::NoConfigDir).context("loading settings");
        assert_eq!(exit_code_for(&err), ExitCodes::CONFIG_ERROR);

        let err = anyhow::Error::new(ProtocolError::Timeout).context("decoding capture");
        assert_eq!(exit_code_for(&err), ExitCodes::PROTOCOL_ERROR);
    }

    #[test]
    fn test_other_errors() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_code_for(&err), ExitCodes::ERROR);

        let err = anyhow::Error::new(PollError::TooManyCards(300));
        assert_eq!(exit_code_for(&err), ExitCodes::INVALID_ARGS);
    }
}
