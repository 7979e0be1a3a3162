//! Backend configuration
//!
//! The backend is picked once, when a [`BusConfig`] is handed to
//! [`crate::connect`]. Everything above that point only sees `Arc<dyn Bus>`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BusError, BusResult};

/// Default number of unacknowledged payloads a consumer may buffer
pub const DEFAULT_MAX_IN_FLIGHT: usize = 200;

/// Default time a NATS topic probe waits for an answer
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 250;

/// Bus backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BusConfig {
    /// In-process bus, for tests and single binary deployments
    Memory,

    /// NATS messaging system
    Nats(NatsConfig),
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig::Memory
    }
}

impl BusConfig {
    /// Check backend specific settings without connecting
    pub fn validate(&self) -> BusResult<()> {
        match self {
            BusConfig::Memory => Ok(()),
            BusConfig::Nats(nats) => nats.validate(),
        }
    }

    /// Backend name for logs
    pub fn backend_name(&self) -> &'static str {
        match self {
            BusConfig::Memory => "memory",
            BusConfig::Nats(_) => "nats",
        }
    }
}

/// NATS specific settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NatsConfig {
    /// NATS server URLs
    pub servers: Vec<String>,

    /// Queue group consumers join. Consumers sharing a group split the
    /// payloads of a topic between them; `None` means every consumer sees
    /// every payload.
    #[serde(default)]
    pub queue_group: Option<String>,

    /// Per-subscription buffer size
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Name reported to the server
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// How long a topic probe waits before assuming someone is listening
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_max_in_flight() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}

fn default_client_name() -> String {
    format!("ariproxy/{}", env!("CARGO_PKG_VERSION"))
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

impl NatsConfig {
    /// Create a configuration for the given servers with default limits
    pub fn new(servers: Vec<String>) -> Self {
        Self {
            servers,
            queue_group: None,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            client_name: default_client_name(),
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
        }
    }

    /// Join consumers to a queue group
    pub fn with_queue_group(mut self, group: impl Into<String>) -> Self {
        self.queue_group = Some(group.into());
        self
    }

    /// Set the per-subscription buffer size
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Probe timeout as a `Duration`
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Validate the settings
    pub fn validate(&self) -> BusResult<()> {
        if self.servers.is_empty() {
            return Err(BusError::Configuration(
                "NATS configuration requires at least one server".to_string(),
            ));
        }
        if let Some(blank) = self.servers.iter().find(|s| s.trim().is_empty()) {
            return Err(BusError::Configuration(format!(
                "NATS server address '{}' is blank",
                blank
            )));
        }
        if self.servers.iter().any(|s| s.contains(',')) {
            return Err(BusError::Configuration(
                "NATS server addresses must be listed separately, not comma joined".to_string(),
            ));
        }
        if matches!(&self.queue_group, Some(group) if group.trim().is_empty()) {
            return Err(BusError::Configuration(
                "NATS queue group must not be blank".to_string(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(BusError::Configuration(
                "max_in_flight must be greater than zero".to_string(),
            ));
        }
        if self.probe_timeout_ms == 0 {
            return Err(BusError::Configuration(
                "probe_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config_is_valid() {
        assert!(BusConfig::Memory.validate().is_ok());
        assert_eq!(BusConfig::default(), BusConfig::Memory);
    }

    #[test]
    fn test_nats_config_requires_servers() {
        let config = BusConfig::Nats(NatsConfig::new(vec![]));
        match config.validate() {
            Err(BusError::Configuration(msg)) => assert!(msg.contains("at least one server")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_nats_config_rejects_zero_in_flight() {
        let config = NatsConfig::new(vec!["nats://127.0.0.1:4222".to_string()]).with_max_in_flight(0);
        assert!(matches!(config.validate(), Err(BusError::Configuration(_))));
    }

    #[test]
    fn test_nats_config_rejects_blank_queue_group() {
        let config = NatsConfig::new(vec!["nats://127.0.0.1:4222".to_string()]).with_queue_group("  ");
        assert!(matches!(config.validate(), Err(BusError::Configuration(_))));
    }

    #[test]
    fn test_bus_config_deserializes_tagged() {
        let json = r#"{"type":"nats","servers":["nats://a:4222"],"queue_group":"ari"}"#;
        let config: BusConfig = serde_json::from_str(json).unwrap();
        match config {
            BusConfig::Nats(nats) => {
                assert_eq!(nats.servers, vec!["nats://a:4222".to_string()]);
                assert_eq!(nats.queue_group.as_deref(), Some("ari"));
                assert_eq!(nats.max_in_flight, DEFAULT_MAX_IN_FLIGHT);
                assert_eq!(nats.probe_timeout(), Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS));
            }
            other => panic!("unexpected config {:?}", other),
        }

        let memory: BusConfig = serde_json::from_str(r#"{"type":"memory"}"#).unwrap();
        assert_eq!(memory, BusConfig::Memory);
    }
}
