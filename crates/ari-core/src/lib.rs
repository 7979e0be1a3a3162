//! # ariproxy ARI core
//!
//! Drive Asterisk ARI applications over a publish/subscribe bus instead of a
//! direct HTTP/WebSocket connection, so application processes can scale out
//! and the transport can be swapped.
//!
//! ## Architecture
//!
//! - `registrar`: listens on the shared start topic and starts one
//!   [`AppInstance`] per dialog addressed to this application
//! - `instance`: owns a dialog's `commands_`, `responses_` and `events_`
//!   topics
//! - `correlator`: turns publish + asynchronous reply into a request/response
//!   call, matched by unique id with a deadline
//! - `events`: decodes the events topic into [`InstanceEvent`]s
//! - `types`: JSON wire records
//!
//! The bus itself comes from `ariproxy-bus-core`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ariproxy_ari_core::prelude::*;
//!
//! # async fn example() -> Result<(), AriError> {
//! let config = ClientConfig::from_file("client.toml")?;
//! let bus = ariproxy_bus_core::connect(&config.bus).await?;
//!
//! let registrar = Registrar::from_config(bus, &config)
//!     .start(|mut instance: AppInstance| async move {
//!         while let Some(InstanceEvent::Ari(event)) = instance.next_event().await {
//!             if event.event_type == "StasisStart" {
//!                 let _ = instance.process_command("/channels/1234/answer", "", "POST").await;
//!             }
//!         }
//!     })
//!     .await?;
//! # registrar.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod correlator;
pub mod error;
pub mod events;
pub mod instance;
pub mod logging;
pub mod registrar;
pub mod topics;
pub mod types;

pub use commands::{build_body, PlayOptions};
pub use config::ClientConfig;
pub use correlator::{Correlator, DEFAULT_COMMAND_TIMEOUT};
pub use error::{AriError, AriResult};
pub use events::{DecodeStats, InstanceEvent};
pub use instance::{AppInstance, InstanceConfig};
pub use logging::{setup_logging, LoggingConfig};
pub use registrar::{Registrar, RegistrarHandle, RegistrarStats};
pub use topics::{DialogTopics, DEFAULT_START_TOPIC};
pub use types::{AppStart, Command, CommandResponse, Event};

/// Commonly used types
pub mod prelude {
    pub use crate::{
        AppInstance, AppStart, AriError, AriResult, ClientConfig, Command, CommandResponse,
        DialogTopics, Event, InstanceConfig, InstanceEvent, PlayOptions, Registrar,
        RegistrarHandle,
    };
    pub use ariproxy_bus_core::{Bus, BusConfig, BusError, MemoryBus, SharedBus};
}
