//! Event ingestion pipeline
//!
//! Turns the raw payloads of an events topic into [`InstanceEvent`]s. A
//! payload that fails to decode is reported as
//! [`InstanceEvent::DecodeFailed`] and the pipeline keeps going.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use ariproxy_bus_core::Consumer;

use crate::types::Event;

/// What an instance's event channel carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceEvent {
    /// A decoded ARI event
    Ari(Event),
    /// A payload on the events topic that was not a valid event
    DecodeFailed { topic: String, reason: String },
}

impl InstanceEvent {
    /// The decoded event, if any
    pub fn as_ari(&self) -> Option<&Event> {
        match self {
            InstanceEvent::Ari(event) => Some(event),
            InstanceEvent::DecodeFailed { .. } => None,
        }
    }

    pub fn into_ari(self) -> Option<Event> {
        match self {
            InstanceEvent::Ari(event) => Some(event),
            InstanceEvent::DecodeFailed { .. } => None,
        }
    }
}

/// Decode failure counters shared by an instance's background tasks
#[derive(Debug, Default)]
pub struct DecodeStats {
    events: AtomicU64,
    responses: AtomicU64,
}

impl DecodeStats {
    pub fn event_failures(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    pub fn response_failures(&self) -> u64 {
        self.responses.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.event_failures() + self.response_failures()
    }

    pub(crate) fn record_event_failure(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_response_failure(&self) {
        self.responses.fetch_add(1, Ordering::Relaxed);
    }
}

/// Spawn the pipeline reading `consumer` into `events_tx`
///
/// The task ends when the consumer is exhausted or the receiving side of
/// `events_tx` is dropped.
pub fn spawn_event_pipeline(
    consumer: Consumer,
    events_tx: mpsc::Sender<InstanceEvent>,
    stats: Arc<DecodeStats>,
) -> JoinHandle<()> {
    tokio::spawn(run_event_pipeline(consumer, events_tx, stats))
}

async fn run_event_pipeline(
    mut consumer: Consumer,
    events_tx: mpsc::Sender<InstanceEvent>,
    stats: Arc<DecodeStats>,
) {
    let topic = consumer.topic().to_string();

    while let Some(payload) = consumer.recv().await {
        // Empty payloads are readiness probes
        if payload.is_empty() {
            trace!(topic = %topic, "Skipping empty payload");
            continue;
        }

        let message = match Event::decode(&payload) {
            Ok(event) => {
                trace!(topic = %topic, event_type = %event.event_type, "Event received");
                InstanceEvent::Ari(event)
            }
            Err(e) => {
                stats.record_event_failure();
                warn!(topic = %topic, payload_len = payload.len(), error = %e, "Dropping undecodable event");
                InstanceEvent::DecodeFailed {
                    topic: topic.clone(),
                    reason: e.to_string(),
                }
            }
        };

        if events_tx.send(message).await.is_err() {
            debug!(topic = %topic, "Event receiver dropped, stopping pipeline");
            return;
        }
    }

    debug!(topic = %topic, "Event consumer closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_pipeline_forwards_events_and_flags_garbage() {
        let (bus_tx, consumer) = Consumer::channel("events_d1");
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let stats = Arc::new(DecodeStats::default());
        let handle = spawn_event_pipeline(consumer, events_tx, stats.clone());

        bus_tx.send(Bytes::from_static(b"{garbage")).unwrap();
        bus_tx.send(Bytes::new()).unwrap();
        bus_tx
            .send(Bytes::from_static(
                br#"{"server_id":"s1","timestamp":"2023-01-01T00:00:00Z","type":"StasisStart","ari_body":"{}"}"#,
            ))
            .unwrap();
        drop(bus_tx);

        match events_rx.recv().await {
            Some(InstanceEvent::DecodeFailed { topic, .. }) => assert_eq!(topic, "events_d1"),
            other => panic!("expected decode failure, got {:?}", other),
        }
        let event = events_rx.recv().await.and_then(InstanceEvent::into_ari).unwrap();
        assert_eq!(event.server_id, "s1");
        assert_eq!(event.event_type, "StasisStart");

        assert!(events_rx.recv().await.is_none());
        handle.await.unwrap();
        assert_eq!(stats.event_failures(), 1);
        assert_eq!(stats.total(), 1);
    }

    #[tokio::test]
    async fn test_pipeline_stops_when_receiver_dropped() {
        let (bus_tx, consumer) = Consumer::channel("events_d2");
        let (events_tx, events_rx) = mpsc::channel(1);
        let handle = spawn_event_pipeline(consumer, events_tx, Arc::new(DecodeStats::default()));

        drop(events_rx);
        bus_tx.send(Bytes::from_static(b"{}")).unwrap();
        handle.await.unwrap();
    }
}
