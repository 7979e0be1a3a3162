//! Publish/subscribe bus abstraction for the ariproxy stack
//!
//! Applications talk to the PBX through topics on a bus rather than a direct
//! connection. This crate defines the [`Bus`] capability, the producer and
//! consumer handles, and one adapter per backend. The backend is chosen once
//! from a [`BusConfig`] by [`connect`].

pub mod adapters;
pub mod bus;
pub mod config;
pub mod error;
pub mod retry;

use std::sync::Arc;

use tracing::info;

pub use adapters::MemoryBus;
#[cfg(feature = "nats")]
pub use adapters::NatsBus;
pub use bus::{Bus, Consumer, Producer, SharedBus};
pub use config::{BusConfig, NatsConfig};
pub use error::{BusError, BusResult};
pub use retry::{retry_with_backoff, wait_for_topic, RetryConfig};

/// Validate `config` and connect the matching backend
///
/// Invalid settings are returned as [`BusError::Configuration`] before any
/// connection attempt.
pub async fn connect(config: &BusConfig) -> BusResult<SharedBus> {
    config.validate()?;
    info!(backend = config.backend_name(), "Connecting bus");

    match config {
        BusConfig::Memory => Ok(Arc::new(MemoryBus::new())),
        #[cfg(feature = "nats")]
        BusConfig::Nats(nats) => Ok(Arc::new(NatsBus::connect(nats.clone()).await?)),
        #[cfg(not(feature = "nats"))]
        BusConfig::Nats(_) => Err(BusError::Configuration(
            "NATS backend requested but the `nats` feature is disabled".to_string(),
        )),
    }
}
