//! Client configuration
//!
//! ```toml
//! application = "ivr"
//! start_topic = "ari_start"
//!
//! [bus]
//! type = "nats"
//! servers = ["nats://127.0.0.1:4222"]
//! queue_group = "ivr"
//!
//! [instance]
//! command_timeout_ms = 5000
//!
//! [logging]
//! level = "debug"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use ariproxy_bus_core::BusConfig;

use crate::error::{AriError, AriResult};
use crate::instance::InstanceConfig;
use crate::logging::LoggingConfig;
use crate::topics::DEFAULT_START_TOPIC;

/// Everything a client process needs to join the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Name start signals are matched against
    pub application: String,

    /// Shared topic carrying start signals
    #[serde(default = "default_start_topic")]
    pub start_topic: String,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub instance: InstanceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_start_topic() -> String {
    DEFAULT_START_TOPIC.to_string()
}

impl ClientConfig {
    /// In-memory configuration for `application`
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            start_topic: default_start_topic(),
            bus: BusConfig::default(),
            instance: InstanceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn with_bus(mut self, bus: BusConfig) -> Self {
        self.bus = bus;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> AriResult<Self> {
        let config: ClientConfig = toml::from_str(source)
            .map_err(|e| AriError::Config(format!("Invalid client configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> AriResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| AriError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> AriResult<()> {
        if self.application.trim().is_empty() {
            return Err(AriError::Config("application name must not be empty".to_string()));
        }
        if self.start_topic.trim().is_empty() {
            return Err(AriError::Config("start topic must not be empty".to_string()));
        }
        self.bus.validate()?;
        self.instance.validate()?;
        self.logging.level()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ariproxy_bus_core::{BusError, NatsConfig};
    use std::time::Duration;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ClientConfig::from_toml_str(r#"application = "ivr""#).unwrap();
        assert_eq!(config, ClientConfig::new("ivr"));
        assert_eq!(config.start_topic, "ari_start");
        assert_eq!(config.instance.command_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_full_config() {
        let config = ClientConfig::from_toml_str(
            r#"
            application = "ivr"
            start_topic = "dialogs"

            [bus]
            type = "nats"
            servers = ["nats://10.0.0.1:4222", "nats://10.0.0.2:4222"]
            queue_group = "ivr"
            max_in_flight = 50

            [instance]
            command_timeout_ms = 1500
            event_buffer = 16

            [instance.readiness]
            max_attempts = 10
            initial_delay_ms = 50
            max_delay_ms = 400
            backoff_multiplier = 2.0

            [logging]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(config.start_topic, "dialogs");
        let expected_bus = NatsConfig::new(vec![
            "nats://10.0.0.1:4222".to_string(),
            "nats://10.0.0.2:4222".to_string(),
        ])
        .with_queue_group("ivr")
        .with_max_in_flight(50);
        assert_eq!(config.bus, BusConfig::Nats(expected_bus));
        assert_eq!(config.instance.command_timeout, Duration::from_millis(1500));
        assert_eq!(config.instance.event_buffer, 16);
        let readiness = config.instance.readiness.unwrap();
        assert_eq!(readiness.max_attempts, 10);
        assert_eq!(readiness.max_delay, Duration::from_millis(400));
        assert!(!readiness.use_jitter);
        assert!(config.logging.json);
    }

    #[test]
    fn test_invalid_bus_settings_are_reported() {
        let err = ClientConfig::from_toml_str(
            r#"
            application = "ivr"
            [bus]
            type = "nats"
            servers = []
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AriError::Bus(BusError::Configuration(_))));
    }

    #[test]
    fn test_missing_application_is_rejected() {
        assert!(matches!(
            ClientConfig::from_toml_str(r#"start_topic = "x""#),
            Err(AriError::Config(_))
        ));
        assert!(matches!(
            ClientConfig::from_toml_str(r#"application = " ""#),
            Err(AriError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ClientConfig::from_file("/definitely/not/here.toml"),
            Err(AriError::Config(_))
        ));
    }
}
