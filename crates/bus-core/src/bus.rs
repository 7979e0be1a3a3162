//! Bus capability interface and the handles it hands out
//!
//! A backend implements [`Bus`]. Producers and consumers are plain channel
//! handles; the backend owns the task that moves payloads between the channel
//! and the wire, so callers never touch backend types.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{BusError, BusResult};

/// Publish/subscribe capability every backend provides
///
/// Delivery is at-least-once with no ordering guarantee across topics.
#[async_trait]
pub trait Bus: Send + Sync + fmt::Debug {
    /// Backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Open a producer publishing to `topic`
    async fn start_producer(&self, topic: &str) -> BusResult<Producer>;

    /// Open a consumer yielding every payload delivered on `topic`
    async fn start_consumer(&self, topic: &str) -> BusResult<Consumer>;

    /// Single readiness probe. See [`crate::retry::wait_for_topic`] for the
    /// bounded polling variant.
    async fn topic_exists(&self, topic: &str) -> bool;

    /// Tear the backend connection down
    async fn shutdown(&self) -> BusResult<()>;
}

/// Shared handle to a connected backend
pub type SharedBus = Arc<dyn Bus>;

/// Write side of a topic
///
/// `send` queues the payload for the backend's publish task and returns
/// immediately; there is no delivery acknowledgment.
#[derive(Clone)]
pub struct Producer {
    topic: Arc<str>,
    tx: mpsc::UnboundedSender<Bytes>,
}

impl Producer {
    /// Create a producer and the receiver its publish task drains
    pub fn channel(topic: &str) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                topic: Arc::from(topic),
                tx,
            },
            rx,
        )
    }

    /// Topic this producer publishes to
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Queue a payload for publishing
    pub fn send(&self, payload: impl Into<Bytes>) -> BusResult<()> {
        self.tx.send(payload.into()).map_err(|_| BusError::Closed {
            topic: self.topic.to_string(),
        })
    }

    /// Whether the publish task is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("topic", &self.topic)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Read side of a topic
///
/// Yields payloads until the backend drops its sender. Dropping the consumer
/// stops the backend forwarding task, if any.
pub struct Consumer {
    topic: String,
    rx: mpsc::UnboundedReceiver<Bytes>,
    forwarder: Option<JoinHandle<()>>,
}

impl Consumer {
    /// Create a consumer and the sender a backend feeds it through
    pub fn channel(topic: &str) -> (mpsc::UnboundedSender<Bytes>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                topic: topic.to_string(),
                rx,
                forwarder: None,
            },
        )
    }

    /// Tie a backend forwarding task to this consumer's lifetime
    pub fn with_forwarder(mut self, handle: JoinHandle<()>) -> Self {
        self.forwarder = Some(handle);
        self
    }

    /// Topic this consumer reads
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next payload, or `None` once the backend side is closed
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Stream for Consumer {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if let Some(handle) = self.forwarder.take() {
            handle.abort();
        }
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("topic", &self.topic)
            .field("forwarder", &self.forwarder.is_some())
            .finish()
    }
}
