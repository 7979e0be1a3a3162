//! Application registrar
//!
//! Listens on the shared start topic and starts one [`AppInstance`] for each
//! start signal addressed to this application, handing it to the
//! caller-supplied handler on its own task. Repeated signals for the same
//! dialog id are not deduplicated.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use ariproxy_bus_core::{Consumer, SharedBus};

use crate::config::ClientConfig;
use crate::error::{AriError, AriResult};
use crate::instance::{AppInstance, InstanceConfig};
use crate::topics::DEFAULT_START_TOPIC;
use crate::types::AppStart;

/// Counters describing what the registrar did with start signals
#[derive(Debug, Default)]
pub struct RegistrarStats {
    spawned: AtomicU64,
    ignored: AtomicU64,
    malformed: AtomicU64,
    failed: AtomicU64,
}

impl RegistrarStats {
    /// Instances started and handed to the handler
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Signals addressed to another application
    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    /// Payloads that were not start signals
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Matching signals whose instance could not be started
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Spawns application instances from start signals
pub struct Registrar {
    bus: SharedBus,
    application: String,
    start_topic: String,
    instance_config: InstanceConfig,
}

impl Registrar {
    pub fn new(bus: SharedBus, application: impl Into<String>) -> Self {
        Self {
            bus,
            application: application.into(),
            start_topic: DEFAULT_START_TOPIC.to_string(),
            instance_config: InstanceConfig::default(),
        }
    }

    /// Registrar for `config.application` on `config.start_topic`
    pub fn from_config(bus: SharedBus, config: &ClientConfig) -> Self {
        Self::new(bus, config.application.clone())
            .with_start_topic(config.start_topic.clone())
            .with_instance_config(config.instance.clone())
    }

    pub fn with_start_topic(mut self, topic: impl Into<String>) -> Self {
        self.start_topic = topic.into();
        self
    }

    pub fn with_instance_config(mut self, config: InstanceConfig) -> Self {
        self.instance_config = config;
        self
    }

    /// Subscribe to the start topic and begin dispatching
    ///
    /// The subscription is in place when this returns, so start signals
    /// published afterwards are never missed.
    pub async fn start<H, Fut>(self, handler: H) -> AriResult<RegistrarHandle>
    where
        H: Fn(AppInstance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.application.trim().is_empty() {
            return Err(AriError::Config("application name must not be empty".to_string()));
        }
        self.instance_config.validate()?;

        let consumer = self.bus.start_consumer(&self.start_topic).await?;
        let stats = Arc::new(RegistrarStats::default());
        let start_topic = self.start_topic.clone();

        info!(
            application = %self.application,
            start_topic = %start_topic,
            "Registrar listening for dialogs"
        );

        let task = tokio::spawn(self.run(consumer, Arc::new(handler), stats.clone()));

        Ok(RegistrarHandle {
            start_topic,
            stats,
            task,
        })
    }

    async fn run<H, Fut>(self, mut consumer: Consumer, handler: Arc<H>, stats: Arc<RegistrarStats>)
    where
        H: Fn(AppInstance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        while let Some(payload) = consumer.recv().await {
            if payload.is_empty() {
                continue;
            }

            let start = match AppStart::decode(&payload) {
                Ok(start) => start,
                Err(e) => {
                    stats.malformed.fetch_add(1, Ordering::Relaxed);
                    warn!(start_topic = %self.start_topic, error = %e, "Dropping malformed start signal");
                    continue;
                }
            };

            if start.application != self.application {
                stats.ignored.fetch_add(1, Ordering::Relaxed);
                debug!(
                    application = %start.application,
                    dialog_id = %start.dialog_id,
                    "Start signal for another application"
                );
                continue;
            }

            self.dispatch(start.dialog_id, handler.clone(), stats.clone());
        }

        debug!(start_topic = %self.start_topic, "Start topic closed, registrar stopping");
    }

    fn dispatch<H, Fut>(&self, dialog_id: String, handler: Arc<H>, stats: Arc<RegistrarStats>)
    where
        H: Fn(AppInstance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let bus = self.bus.clone();
        let application = self.application.clone();
        let config = self.instance_config.clone();

        tokio::spawn(async move {
            match AppInstance::start(bus.as_ref(), application, dialog_id.clone(), &config).await {
                Ok(instance) => {
                    stats.spawned.fetch_add(1, Ordering::Relaxed);
                    handler(instance).await;
                    debug!(dialog_id = %dialog_id, "Dialog handler finished");
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    error!(dialog_id = %dialog_id, error = %e, "Failed to start application instance");
                }
            }
        });
    }
}

/// Running registrar
#[derive(Debug)]
pub struct RegistrarHandle {
    start_topic: String,
    stats: Arc<RegistrarStats>,
    task: JoinHandle<()>,
}

impl RegistrarHandle {
    pub fn start_topic(&self) -> &str {
        &self.start_topic
    }

    pub fn stats(&self) -> &RegistrarStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop listening for start signals; running dialogs are unaffected
    pub fn shutdown(self) {
        self.task.abort();
        info!(start_topic = %self.start_topic, "Registrar stopped");
    }
}
