//! Error types for bus-core

use thiserror::Error;

/// Errors raised by a bus backend or by the handles it hands out
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Backend settings are missing or invalid. Raised by `connect` before any
    /// network activity takes place.
    #[error("Bus configuration error: {0}")]
    Configuration(String),

    /// Backend unreachable or handshake failed
    #[error("Bus connection error: {0}")]
    Connection(String),

    /// A producer or consumer was used after its backend task stopped
    #[error("Bus handle for topic '{topic}' is closed")]
    Closed { topic: String },

    /// Backend rejected a publish
    #[error("Failed to publish to topic '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    /// Readiness probe gave up
    #[error("Topic '{topic}' not ready after {attempts} attempts")]
    TopicNotReady { topic: String, attempts: u32 },
}

impl BusError {
    /// Whether retrying the failed operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BusError::Connection(_) | BusError::Publish { .. } | BusError::TopicNotReady { .. }
        )
    }

    /// Short category name used in structured logs
    pub fn category(&self) -> &'static str {
        match self {
            BusError::Configuration(_) => "configuration",
            BusError::Connection(_) => "connection",
            BusError::Closed { .. } => "closed",
            BusError::Publish { .. } => "publish",
            BusError::TopicNotReady { .. } => "readiness",
        }
    }
}

/// Result alias used throughout bus-core
pub type BusResult<T> = Result<T, BusError>;
