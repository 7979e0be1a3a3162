//! Command/response correlation
//!
//! The bus is fire-and-forget, so each submitted [`Command`] registers a
//! oneshot reply slot under its `unique_id` before it is published. The
//! response router fills the slot when a [`CommandResponse`] with the same id
//! shows up on the responses topic. A slot lives until it is filled, its
//! deadline passes, or the submitter goes away, whichever comes first.
//!
//! ```text
//!  submit() ──insert──▶ ┌──────────────┐ ◀──remove── response router
//!     │                 │ pending map  │                  ▲
//!     │ publish         └──────────────┘                  │ decode
//!     ▼                                                   │
//!  commands_<dialog>  ─────────▶  PBX proxy  ─────────▶ responses_<dialog>
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use ariproxy_bus_core::{Consumer, Producer};

use crate::error::{AriError, AriResult};
use crate::events::DecodeStats;
use crate::types::{Command, CommandResponse};

/// Deadline for a command's response
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

type PendingMap = DashMap<String, oneshot::Sender<CommandResponse>>;

/// Submits commands and routes their responses back, for one dialog
///
/// Cheap to clone; clones share the in-flight map, so a handler can submit
/// from as many tasks as it likes.
#[derive(Clone)]
pub struct Correlator {
    inner: Arc<CorrelatorInner>,
}

struct CorrelatorInner {
    dialog_id: String,
    producer: Producer,
    pending: PendingMap,
    timeout: Duration,
    closed: AtomicBool,
    unmatched: AtomicU64,
}

/// Removes its map entry however the wait ends
struct PendingReply<'a> {
    pending: &'a PendingMap,
    unique_id: String,
    rx: oneshot::Receiver<CommandResponse>,
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        // Closing first means our sender reports closed, so a newer entry
        // reusing the id is left alone.
        self.rx.close();
        self.pending.remove_if(&self.unique_id, |_, tx| tx.is_closed());
    }
}

impl Correlator {
    /// Create a correlator publishing through `producer`
    pub fn new(dialog_id: impl Into<String>, producer: Producer, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(CorrelatorInner {
                dialog_id: dialog_id.into(),
                producer,
                pending: DashMap::new(),
                timeout,
                closed: AtomicBool::new(false),
                unmatched: AtomicU64::new(0),
            }),
        }
    }

    /// Publish `command` and wait for its response
    ///
    /// Returns the matching response, [`AriError::Timeout`] once the deadline
    /// passes, or the publish/close error that prevented a reply. A missing
    /// `unique_id` is filled with a fresh UUID.
    pub async fn submit(&self, mut command: Command) -> AriResult<CommandResponse> {
        if self.is_closed() {
            return Err(self.closed_error());
        }

        if command.unique_id.is_empty() {
            command.unique_id = Uuid::new_v4().to_string();
        }
        let payload = command.encode()?;

        let (tx, rx) = oneshot::channel();
        match self.inner.pending.entry(command.unique_id.clone()) {
            Entry::Occupied(_) => return Err(AriError::DuplicateId(command.unique_id)),
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }
        let mut reply = PendingReply {
            pending: &self.inner.pending,
            unique_id: command.unique_id,
            rx,
        };

        self.inner.producer.send(payload)?;
        trace!(
            dialog_id = %self.inner.dialog_id,
            unique_id = %reply.unique_id,
            url = %command.url,
            method = %command.method,
            "Command published"
        );

        match tokio::time::timeout(self.inner.timeout, &mut reply.rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(self.closed_error()),
            Err(_) => {
                warn!(
                    dialog_id = %self.inner.dialog_id,
                    unique_id = %reply.unique_id,
                    timeout_ms = self.inner.timeout.as_millis() as u64,
                    "Command timed out"
                );
                Err(AriError::Timeout {
                    unique_id: reply.unique_id.clone(),
                    timeout: self.inner.timeout,
                })
            }
        }
    }

    /// Hand `response` to its waiting submitter
    ///
    /// Returns `false` when nobody waits for the id any more (timed out,
    /// duplicate delivery, or never ours); such responses are dropped.
    pub fn route(&self, response: CommandResponse) -> bool {
        match self.inner.pending.remove(&response.unique_id) {
            Some((unique_id, tx)) => {
                if tx.send(response).is_err() {
                    debug!(dialog_id = %self.inner.dialog_id, unique_id = %unique_id, "Submitter gone before response");
                }
                true
            }
            None => {
                self.inner.unmatched.fetch_add(1, Ordering::Relaxed);
                debug!(
                    dialog_id = %self.inner.dialog_id,
                    unique_id = %response.unique_id,
                    "Discarding response with no pending command"
                );
                false
            }
        }
    }

    /// Spawn the task routing every response on `consumer`
    pub fn spawn_router(&self, consumer: Consumer, stats: Arc<DecodeStats>) -> JoinHandle<()> {
        let correlator = self.clone();
        tokio::spawn(async move { correlator.run_router(consumer, stats).await })
    }

    async fn run_router(self, mut consumer: Consumer, stats: Arc<DecodeStats>) {
        while let Some(payload) = consumer.recv().await {
            if payload.is_empty() {
                continue;
            }
            match CommandResponse::decode(&payload) {
                Ok(response) => {
                    self.route(response);
                }
                Err(e) => {
                    stats.record_response_failure();
                    warn!(
                        dialog_id = %self.inner.dialog_id,
                        topic = %consumer.topic(),
                        error = %e,
                        "Dropping undecodable command response"
                    );
                }
            }
        }
        debug!(dialog_id = %self.inner.dialog_id, "Response consumer closed");
    }

    /// Fail every waiting submitter and refuse new submissions
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            let abandoned = self.inner.pending.len();
            self.inner.pending.clear();
            debug!(dialog_id = %self.inner.dialog_id, abandoned, "Correlator closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of commands waiting for a response
    pub fn in_flight(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn is_pending(&self, unique_id: &str) -> bool {
        self.inner.pending.contains_key(unique_id)
    }

    /// Responses that arrived for ids nobody waited on
    pub fn unmatched_responses(&self) -> u64 {
        self.inner.unmatched.load(Ordering::Relaxed)
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn dialog_id(&self) -> &str {
        &self.inner.dialog_id
    }

    fn closed_error(&self) -> AriError {
        AriError::Closed {
            dialog_id: self.inner.dialog_id.clone(),
        }
    }
}

impl fmt::Debug for Correlator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlator")
            .field("dialog_id", &self.inner.dialog_id)
            .field("topic", &self.inner.producer.topic())
            .field("in_flight", &self.in_flight())
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}
