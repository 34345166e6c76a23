//! Event types for the propmap notification bus
//!
//! Provides the shared event definition and the EventBus used to fan events
//! out to connected viewers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// propmap event types
///
/// Serialized with an internal `type` tag, so an ingestion event reaches
/// clients as `{"type":"ingested", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropmapEvent {
    /// A log payload was accepted (not a duplicate) and committed
    ///
    /// Triggers:
    /// - Viewers: re-query map/link views
    Ingested {
        /// Station that produced the log
        source: String,
        /// Fingerprint of the accepted payload
        fingerprint: String,
        /// Contact events written to the link store
        contacts_written: u64,
        /// When the ingestion committed
        timestamp: DateTime<Utc>,
    },
}

impl PropmapEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            PropmapEvent::Ingested { .. } => "ingested",
        }
    }
}

/// Central event distribution bus
///
/// Wraps a `tokio::sync::broadcast` channel:
/// - every subscriber receives every event emitted after it subscribed, in
///   emit order
/// - nothing emitted before `subscribe()` is replayed
/// - each subscriber has its own bounded buffer; a subscriber that falls
///   more than `capacity` events behind loses the oldest ones and receives
///   `RecvError::Lagged` instead
/// - emitting never waits on subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PropmapEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified per-subscriber capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use propmap_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PropmapEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PropmapEvent,
    ) -> Result<usize, broadcast::error::SendError<PropmapEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PropmapEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
