//! Event types and the EventBus for the BirdCard engine
//!
//! Every state change worth observing (a selection, a publish, a session
//! binding) is emitted as an [`EngineEvent`]. Events are informational: the
//! engine never depends on anyone listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::location::{DayKey, LocationBucket};
use crate::models::SelectionTier;

/// Engine event types
///
/// Serialized with a `type` tag for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// An item was selected and published for a new cache key
    ItemSelected {
        target_id: String,
        day_key: DayKey,
        bucket: LocationBucket,
        item_id: String,
        tier: SelectionTier,
        timestamp: DateTime<Utc>,
    },

    /// Publishing to the shared target failed; the key stays open for retry
    PublishFailed {
        target_id: String,
        day_key: DayKey,
        bucket: LocationBucket,
        item_id: String,
        tier: SelectionTier,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A playback session was bound to an item
    SessionBound {
        session_id: String,
        item_id: String,
        day_key: DayKey,
        bucket: LocationBucket,
        timestamp: DateTime<Utc>,
    },

    /// A session outlived its TTL and was dropped
    SessionExpired {
        session_id: String,
        item_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Display metadata of the target was refreshed to match a rebound session
    DisplayRepublished {
        target_id: String,
        previous_item_id: Option<String>,
        item_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Records for superseded day keys were evicted
    RecordsEvicted {
        count: usize,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::ItemSelected { .. } => "ItemSelected",
            EngineEvent::PublishFailed { .. } => "PublishFailed",
            EngineEvent::SessionBound { .. } => "SessionBound",
            EngineEvent::SessionExpired { .. } => "SessionExpired",
            EngineEvent::DisplayRepublished { .. } => "DisplayRepublished",
            EngineEvent::RecordsEvicted { .. } => "RecordsEvicted",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use birdcard_common::events::{EngineEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(EngineEvent::RecordsEvicted {
///     count: 3,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(EngineEvent::RecordsEvicted { count: 3, .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EngineEvent,
    ) -> Result<usize, broadcast::error::SendError<EngineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
