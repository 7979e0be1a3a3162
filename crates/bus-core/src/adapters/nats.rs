//! NATS backend
//!
//! Topics map one to one onto NATS subjects. Consumers optionally join a
//! queue group so several application processes can share one topic.

use std::fmt;

use async_nats::{Client, ConnectOptions, Request, RequestErrorKind, ServerAddr};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::bus::{Bus, Consumer, Producer};
use crate::config::NatsConfig;
use crate::error::{BusError, BusResult};

/// Bus backed by a NATS connection
pub struct NatsBus {
    client: Client,
    config: NatsConfig,
}

impl NatsBus {
    /// Validate the configuration and connect
    ///
    /// Unparseable server addresses are reported as
    /// [`BusError::Configuration`]; an unreachable server as
    /// [`BusError::Connection`].
    pub async fn connect(config: NatsConfig) -> BusResult<Self> {
        config.validate()?;

        let addrs = config
            .servers
            .iter()
            .map(|server| {
                server.parse::<ServerAddr>().map_err(|e| {
                    BusError::Configuration(format!("Invalid NATS server '{}': {}", server, e))
                })
            })
            .collect::<BusResult<Vec<_>>>()?;

        let client = ConnectOptions::new()
            .name(config.client_name.clone())
            .subscription_capacity(config.max_in_flight)
            .connect(addrs)
            .await
            .map_err(|e| {
                BusError::Connection(format!(
                    "Failed to connect to NATS {:?}: {}",
                    config.servers, e
                ))
            })?;

        info!(servers = ?config.servers, queue_group = ?config.queue_group, "Connected to NATS");
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &NatsConfig {
        &self.config
    }
}

impl fmt::Debug for NatsBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NatsBus")
            .field("servers", &self.config.servers)
            .field("queue_group", &self.config.queue_group)
            .finish()
    }
}

#[async_trait]
impl Bus for NatsBus {
    fn backend_name(&self) -> &'static str {
        "nats"
    }

    async fn start_producer(&self, topic: &str) -> BusResult<Producer> {
        let (producer, mut rx) = Producer::channel(topic);
        let client = self.client.clone();
        let subject = topic.to_string();

        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                if let Err(e) = client.publish(subject.clone(), payload).await {
                    warn!(topic = %subject, error = %e, "NATS publish failed");
                }
            }
            debug!(topic = %subject, "NATS producer stopped");
        });

        Ok(producer)
    }

    async fn start_consumer(&self, topic: &str) -> BusResult<Consumer> {
        let subscription = match &self.config.queue_group {
            Some(group) => {
                self.client
                    .queue_subscribe(topic.to_string(), group.clone())
                    .await
            }
            None => self.client.subscribe(topic.to_string()).await,
        };
        let mut subscriber = subscription.map_err(|e| {
            BusError::Connection(format!("Failed to subscribe to '{}': {}", topic, e))
        })?;

        let (tx, consumer) = Consumer::channel(topic);
        let subject = topic.to_string();
        let forwarder = tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                if tx.send(message.payload).is_err() {
                    break;
                }
            }
            debug!(topic = %subject, "NATS subscription ended");
        });

        Ok(consumer.with_forwarder(forwarder))
    }

    /// Sends an empty request on `topic`. A "no responders" answer means
    /// nobody subscribes yet; a timeout means a subscriber got the probe and
    /// chose not to answer. Consumers see the probe as an empty payload.
    async fn topic_exists(&self, topic: &str) -> bool {
        let request = Request::new()
            .payload(Bytes::new())
            .timeout(Some(self.config.probe_timeout()));

        match self.client.send_request(topic.to_string(), request).await {
            Ok(_) => true,
            Err(e) => match e.kind() {
                RequestErrorKind::TimedOut => true,
                RequestErrorKind::NoResponders => false,
                _ => {
                    debug!(topic, error = %e, "Topic probe failed");
                    false
                }
            },
        }
    }

    async fn shutdown(&self) -> BusResult<()> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to flush NATS connection: {}", e)))?;
        info!("NATS bus shut down");
        Ok(())
    }
}
