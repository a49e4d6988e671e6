//! In-process index event bus backed by a `tokio::sync::broadcast` channel.
//!
//! The index synchronizer publishes an [`IndexEvent`] for every failed
//! write and a summary after every flush. Subscribers (the failure
//! persistence task, tests, metrics in a host application) each receive
//! every event independently.

use chrono::{DateTime, Utc};
use cms_core::entity::EntityRef;
use cms_core::error::CoreError;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// IndexOperation
// ---------------------------------------------------------------------------

/// The two writes a search index accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOperation {
    Upsert,
    Delete,
}

impl IndexOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "upsert" => Ok(Self::Upsert),
            "delete" => Ok(Self::Delete),
            _ => Err(CoreError::Validation(format!(
                "Invalid index operation: '{s}'. Must be one of: upsert, delete"
            ))),
        }
    }
}

impl std::fmt::Display for IndexOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// IndexEvent
// ---------------------------------------------------------------------------

/// Something that happened while propagating changes to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum IndexEvent {
    /// One write was rejected by the index.
    WriteFailed {
        entity: EntityRef,
        operation: IndexOperation,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A flush finished. Counts cover every item that was attempted.
    Flushed {
        upserted: usize,
        deleted: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },
}

impl IndexEvent {
    pub fn write_failed(entity: EntityRef, operation: IndexOperation, error: impl Into<String>) -> Self {
        Self::WriteFailed {
            entity,
            operation,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn flushed(upserted: usize, deleted: usize, failed: usize) -> Self {
        Self::Flushed {
            upserted,
            deleted,
            failed,
            timestamp: Utc::now(),
        }
    }

    /// Dot-separated event name, e.g. `"index.write_failed"`.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::WriteFailed { .. } => "index.write_failed",
            Self::Flushed { .. } => "index.flushed",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus for [`IndexEvent`]s.
///
/// Shared via `Arc<EventBus>` between the synchronizer and its
/// subscribers.
pub struct EventBus {
    sender: broadcast::Sender<IndexEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// Slow receivers observe `RecvError::Lagged` once the buffer is full.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Dropped when nobody is
    /// subscribed.
    pub fn publish(&self, event: IndexEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
