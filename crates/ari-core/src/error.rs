//! Error types for ari-core

use std::time::Duration;

use thiserror::Error;

use ariproxy_bus_core::BusError;

/// Errors returned by instances, the correlator and the registrar
#[derive(Error, Debug)]
pub enum AriError {
    /// Backend failure: configuration, connection or a closed handle
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// A payload could not be decoded into the expected record
    #[error("Failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    /// A record could not be serialized
    #[error("Failed to encode {what}: {reason}")]
    Encode { what: &'static str, reason: String },

    /// No response arrived before the deadline
    #[error("Command {unique_id} timed out after {timeout:?}")]
    Timeout { unique_id: String, timeout: Duration },

    /// A command with this id is already waiting for its response
    #[error("Command id {0} is already in flight")]
    DuplicateId(String),

    /// The instance was torn down while the command was outstanding
    #[error("Instance for dialog {dialog_id} is closed")]
    Closed { dialog_id: String },

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Logging could not be installed
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl AriError {
    pub(crate) fn decode(what: &'static str, err: impl std::fmt::Display) -> Self {
        AriError::Decode {
            what,
            reason: err.to_string(),
        }
    }

    pub(crate) fn encode(what: &'static str, err: impl std::fmt::Display) -> Self {
        AriError::Encode {
            what,
            reason: err.to_string(),
        }
    }

    /// Whether this is a correlation timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, AriError::Timeout { .. })
    }

    /// Whether the caller may reasonably try again
    pub fn is_recoverable(&self) -> bool {
        match self {
            AriError::Timeout { .. } => true,
            AriError::Bus(e) => e.is_recoverable(),
            _ => false,
        }
    }

    /// Short category name used in structured logs
    pub fn category(&self) -> &'static str {
        match self {
            AriError::Bus(e) => e.category(),
            AriError::Decode { .. } => "decode",
            AriError::Encode { .. } => "encode",
            AriError::Timeout { .. } => "timeout",
            AriError::DuplicateId(_) => "duplicate_id",
            AriError::Closed { .. } => "closed",
            AriError::Config(_) => "configuration",
            AriError::Logging(_) => "logging",
        }
    }
}

/// Result alias used throughout ari-core
pub type AriResult<T> = Result<T, AriError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_distinguishable() {
        let err = AriError::Timeout {
            unique_id: "abc".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(err.is_timeout());
        assert!(err.is_recoverable());
        assert_eq!(err.category(), "timeout");
        assert_eq!(err.to_string(), "Command abc timed out after 5s");
    }

    #[test]
    fn test_bus_errors_convert() {
        let err: AriError = BusError::Configuration("missing servers".to_string()).into();
        assert!(!err.is_timeout());
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), "configuration");

        let err: AriError = BusError::Connection("refused".to_string()).into();
        assert!(err.is_recoverable());
    }
}
