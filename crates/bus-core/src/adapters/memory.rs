//! In-process bus
//!
//! Topics spring into existence on first use. Payloads published while a
//! topic has no consumer are kept and handed to the first consumer that
//! attaches, the way an NSQ topic buffers until a channel exists.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::bus::{Bus, Consumer, Producer};
use crate::error::{BusError, BusResult};

#[derive(Debug, Default)]
struct TopicState {
    subscribers: Vec<mpsc::UnboundedSender<Bytes>>,
    backlog: Vec<Bytes>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    topics: Mutex<HashMap<String, TopicState>>,
    published: AtomicU64,
    closed: AtomicBool,
}

/// In-memory bus, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    inner: Arc<MemoryInner>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish synchronously, bypassing any producer
    pub fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> BusResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed {
                topic: topic.to_string(),
            });
        }

        let payload = payload.into();
        let mut topics = self.inner.topics.lock();
        let state = topics.entry(topic.to_string()).or_default();
        state.subscribers.retain(|tx| !tx.is_closed());

        if state.subscribers.is_empty() {
            trace!(topic, "No consumer attached, buffering payload");
            state.backlog.push(payload);
        } else {
            for tx in &state.subscribers {
                let _ = tx.send(payload.clone());
            }
        }
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Total payloads accepted since creation
    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Live consumers attached to `topic`
    pub fn consumer_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .lock()
            .get(topic)
            .map(|state| state.subscribers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn ensure_open(&self) -> BusResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            Err(BusError::Connection("memory bus has been shut down".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Bus for MemoryBus {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn start_producer(&self, topic: &str) -> BusResult<Producer> {
        self.ensure_open()?;
        self.inner.topics.lock().entry(topic.to_string()).or_default();

        let (producer, mut rx) = Producer::channel(topic);
        let bus = self.clone();
        let topic = topic.to_string();
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                if bus.publish(&topic, payload).is_err() {
                    debug!(topic = %topic, "Memory bus closed, stopping producer");
                    break;
                }
            }
        });
        Ok(producer)
    }

    async fn start_consumer(&self, topic: &str) -> BusResult<Consumer> {
        self.ensure_open()?;
        let (tx, consumer) = Consumer::channel(topic);

        let mut topics = self.inner.topics.lock();
        let state = topics.entry(topic.to_string()).or_default();
        for payload in state.backlog.drain(..) {
            let _ = tx.send(payload);
        }
        state.subscribers.push(tx);
        debug!(topic, "Memory consumer attached");
        Ok(consumer)
    }

    async fn topic_exists(&self, topic: &str) -> bool {
        self.inner.topics.lock().contains_key(topic)
    }

    async fn shutdown(&self) -> BusResult<()> {
        self.inner.closed.store(true, Ordering::Release);
        // Dropping the senders ends every consumer stream
        self.inner.topics.lock().clear();
        debug!("Memory bus shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_producer_to_consumer() {
        let bus = MemoryBus::new();
        let mut consumer = bus.start_consumer("events_1").await.unwrap();
        let producer = bus.start_producer("events_1").await.unwrap();

        producer.send(Bytes::from_static(b"hello")).unwrap();
        assert_eq!(consumer.recv().await, Some(Bytes::from_static(b"hello")));
    }

    #[tokio::test]
    async fn test_backlog_goes_to_first_consumer() {
        let bus = MemoryBus::new();
        bus.publish("responses_1", Bytes::from_static(b"early")).unwrap();

        let mut consumer = bus.start_consumer("responses_1").await.unwrap();
        assert_eq!(consumer.recv().await, Some(Bytes::from_static(b"early")));
    }

    #[tokio::test]
    async fn test_every_consumer_sees_every_payload() {
        let bus = MemoryBus::new();
        let mut a = bus.start_consumer("t").await.unwrap();
        let mut b = bus.start_consumer("t").await.unwrap();
        assert_eq!(bus.consumer_count("t"), 2);

        bus.publish("t", Bytes::from_static(b"x")).unwrap();
        assert_eq!(a.recv().await, Some(Bytes::from_static(b"x")));
        assert_eq!(b.recv().await, Some(Bytes::from_static(b"x")));
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = MemoryBus::new();
        let mut one = bus.start_consumer("events_one").await.unwrap();
        let mut two = bus.start_consumer("events_two").await.unwrap();

        bus.publish("events_two", Bytes::from_static(b"for-two")).unwrap();
        bus.publish("events_one", Bytes::from_static(b"for-one")).unwrap();

        assert_eq!(one.recv().await, Some(Bytes::from_static(b"for-one")));
        assert_eq!(two.recv().await, Some(Bytes::from_static(b"for-two")));
    }

    #[tokio::test]
    async fn test_topic_exists_after_first_use() {
        let bus = MemoryBus::new();
        assert!(!bus.topic_exists("commands_9").await);
        let _producer = bus.start_producer("commands_9").await.unwrap();
        assert!(bus.topic_exists("commands_9").await);
    }

    #[tokio::test]
    async fn test_shutdown_closes_consumers_and_rejects_new_handles() {
        let bus = MemoryBus::new();
        let mut consumer = bus.start_consumer("events_1").await.unwrap();

        bus.shutdown().await.unwrap();
        assert_eq!(consumer.recv().await, None);
        assert!(matches!(
            bus.start_consumer("events_1").await,
            Err(BusError::Connection(_))
        ));
        assert!(matches!(
            bus.publish("events_1", Bytes::new()),
            Err(BusError::Closed { .. })
        ));
    }
}
