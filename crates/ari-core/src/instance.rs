//! Per-dialog application instance
//!
//! An [`AppInstance`] bundles everything one dialog needs: a producer on
//! `commands_<dialog>`, the response router on `responses_<dialog>`, the event
//! pipeline on `events_<dialog>` and the in-flight map. Tearing it down is up
//! to whoever owns it; dropping it stops the background tasks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use ariproxy_bus_core::retry::duration_ms;
use ariproxy_bus_core::{wait_for_topic, Bus, RetryConfig};

use crate::correlator::{Correlator, DEFAULT_COMMAND_TIMEOUT};
use crate::error::{AriError, AriResult};
use crate::events::{spawn_event_pipeline, DecodeStats, InstanceEvent};
use crate::topics::DialogTopics;
use crate::types::{Command, CommandResponse};

/// Default capacity of an instance's event channel
pub const DEFAULT_EVENT_BUFFER: usize = 100;

/// Per-instance settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Deadline for each command's response
    #[serde(
        with = "duration_ms",
        rename = "command_timeout_ms",
        default = "default_command_timeout"
    )]
    pub command_timeout: Duration,

    /// Capacity of the event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// When set, wait for the commands topic to exist before starting
    #[serde(default)]
    pub readiness: Option<RetryConfig>,
}

fn default_command_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            event_buffer: DEFAULT_EVENT_BUFFER,
            readiness: None,
        }
    }
}

impl InstanceConfig {
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_readiness(mut self, retry: RetryConfig) -> Self {
        self.readiness = Some(retry);
        self
    }

    pub fn validate(&self) -> AriResult<()> {
        if self.command_timeout.is_zero() {
            return Err(AriError::Config("command timeout must be greater than zero".to_string()));
        }
        if self.event_buffer == 0 {
            return Err(AriError::Config("event buffer must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// One dialog's command, response and event channels
pub struct AppInstance {
    application: String,
    dialog_id: String,
    topics: DialogTopics,
    correlator: Correlator,
    events_rx: mpsc::Receiver<InstanceEvent>,
    stats: Arc<DecodeStats>,
    tasks: Vec<JoinHandle<()>>,
}

impl AppInstance {
    /// Open the dialog's topics on `bus` and start its background tasks
    pub async fn start(
        bus: &dyn Bus,
        application: impl Into<String>,
        dialog_id: impl Into<String>,
        config: &InstanceConfig,
    ) -> AriResult<Self> {
        config.validate()?;
        let application = application.into();
        let dialog_id = dialog_id.into();
        let topics = DialogTopics::derive(&dialog_id);

        if let Some(retry) = &config.readiness {
            wait_for_topic(bus, &topics.commands, retry).await?;
        }

        let producer = bus.start_producer(&topics.commands).await?;
        let responses = bus.start_consumer(&topics.responses).await?;
        let events = bus.start_consumer(&topics.events).await?;

        let stats = Arc::new(DecodeStats::default());
        let correlator = Correlator::new(dialog_id.clone(), producer, config.command_timeout);
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer);

        let tasks = vec![
            correlator.spawn_router(responses, stats.clone()),
            spawn_event_pipeline(events, events_tx, stats.clone()),
        ];

        info!(
            application = %application,
            dialog_id = %dialog_id,
            backend = bus.backend_name(),
            "Application instance started"
        );

        Ok(Self {
            application,
            dialog_id,
            topics,
            correlator,
            events_rx,
            stats,
            tasks,
        })
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn dialog_id(&self) -> &str {
        &self.dialog_id
    }

    pub fn topics(&self) -> &DialogTopics {
        &self.topics
    }

    /// Correlator handle for submitting from other tasks
    pub fn commands(&self) -> Correlator {
        self.correlator.clone()
    }

    /// Publish `command` and wait for its response
    pub async fn submit(&self, command: Command) -> AriResult<CommandResponse> {
        self.correlator.submit(command).await
    }

    /// Build and submit a command for `url`
    pub async fn process_command(
        &self,
        url: impl Into<String>,
        body: impl Into<String>,
        method: impl Into<String>,
    ) -> AriResult<CommandResponse> {
        self.submit(Command::new(url, method, body)).await
    }

    /// Next event from this dialog's events topic; `None` once closed
    pub async fn next_event(&mut self) -> Option<InstanceEvent> {
        self.events_rx.recv().await
    }

    /// Next event if one is already queued
    pub fn try_next_event(&mut self) -> Option<InstanceEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Commands waiting for a response
    pub fn in_flight(&self) -> usize {
        self.correlator.in_flight()
    }

    /// Payloads dropped because they did not decode
    pub fn decode_stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// Event and response payloads dropped so far
    pub fn decode_failures(&self) -> u64 {
        self.stats.total()
    }

    pub fn is_closed(&self) -> bool {
        self.correlator.is_closed()
    }

    /// Tear the instance down
    ///
    /// Waiting submitters get [`AriError::Closed`], the background tasks stop
    /// and their consumers detach from the bus. Events already queued can
    /// still be drained with [`AppInstance::next_event`].
    pub fn close(&mut self) {
        if self.tasks.is_empty() && self.correlator.is_closed() {
            return;
        }
        self.correlator.close();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.events_rx.close();
        debug!(dialog_id = %self.dialog_id, "Application instance closed");
    }
}

impl Drop for AppInstance {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for AppInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppInstance")
            .field("application", &self.application)
            .field("dialog_id", &self.dialog_id)
            .field("topics", &self.topics)
            .field("in_flight", &self.in_flight())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ariproxy_bus_core::{BusError, MemoryBus};

    #[tokio::test]
    async fn test_start_opens_derived_topics() {
        let bus = MemoryBus::new();
        let instance = AppInstance::start(&bus, "ivr", "d-1", &InstanceConfig::default())
            .await
            .unwrap();

        assert_eq!(instance.topics(), &DialogTopics::derive("d-1"));
        assert!(bus.topic_exists("commands_d-1").await);
        assert_eq!(bus.consumer_count("responses_d-1"), 1);
        assert_eq!(bus.consumer_count("events_d-1"), 1);
    }

    #[tokio::test]
    async fn test_close_rejects_commands_and_ends_events() {
        let bus = MemoryBus::new();
        let mut instance = AppInstance::start(&bus, "ivr", "d-2", &InstanceConfig::default())
            .await
            .unwrap();

        instance.close();
        assert!(instance.is_closed());
        assert!(instance.next_event().await.is_none());
        assert!(matches!(
            instance.process_command("/a", "", "GET").await,
            Err(AriError::Closed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_failure_is_returned() {
        let bus = MemoryBus::new();
        let config = InstanceConfig::default()
            .with_readiness(RetryConfig::fixed(2, Duration::from_millis(10)));

        let err = AppInstance::start(&bus, "ivr", "d-3", &config).await.unwrap_err();
        assert!(matches!(
            err,
            AriError::Bus(BusError::TopicNotReady { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let bus = MemoryBus::new();
        let config = InstanceConfig::default().with_command_timeout(Duration::ZERO);
        assert!(matches!(
            AppInstance::start(&bus, "ivr", "d-4", &config).await,
            Err(AriError::Config(_))
        ));
    }
}
