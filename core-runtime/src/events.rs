//! # Event Bus System
//!
//! Typed events over `tokio::sync::broadcast` for decoupled communication
//! between the sync engine and its observers (UI layers, hosts).
//!
//! The UI never calls sync internals; it renders from the Local Store and
//! subscribes here for cycle lifecycle and per-record outcomes (e.g. to drive
//! a pending/syncing/synced/error status indicator).
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut sub = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::CycleStarted {
//!     owner_id: "user-1".into(),
//!     forced: true,
//! }))
//! .ok();
//!
//! let event = sub.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Sync(_)));
//! # }
//! ```
//!
//! Slow subscribers receive `RecvError::Lagged` and can keep consuming;
//! `RecvError::Closed` signals shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Reconciliation-cycle events
    Sync(SyncEvent),
    /// Per-record store events
    Record(RecordEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Record(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::CycleFailed { .. }) => EventSeverity::Error,
            CoreEvent::Record(RecordEvent::PushFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::CycleCompleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events covering one reconciliation cycle (pull then push).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A cycle started.
    CycleStarted {
        /// The user whose records are being reconciled.
        owner_id: String,
        /// Whether this cycle was forced (reconnect, foreground, "sync now").
        forced: bool,
    },
    /// A trigger fired while another cycle was in flight; nothing ran.
    CycleSkipped {
        /// The user whose records are being reconciled.
        owner_id: String,
    },
    /// A cycle finished (pull attempted for all entity types, push drained).
    CycleCompleted {
        /// The user whose records were reconciled.
        owner_id: String,
        /// Remote records applied during the pull phase.
        pulled: u64,
        /// Local records uploaded during the push phase.
        pushed: u64,
        /// Records that ended the cycle in `error` status.
        failed: u64,
        /// Cycle duration in milliseconds.
        duration_ms: u64,
    },
    /// A cycle could not start (e.g. local storage unavailable).
    CycleFailed {
        /// The user whose records were being reconciled.
        owner_id: String,
        /// Human-readable error message.
        message: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::CycleStarted { .. } => "Sync cycle started",
            SyncEvent::CycleSkipped { .. } => "Sync cycle skipped (already in flight)",
            SyncEvent::CycleCompleted { .. } => "Sync cycle completed",
            SyncEvent::CycleFailed { .. } => "Sync cycle failed to start",
        }
    }
}

// ============================================================================
// Record Events
// ============================================================================

/// Per-record outcomes during the push phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum RecordEvent {
    /// A pending record round-tripped successfully.
    Synced {
        /// Entity type tag (e.g. "daily_entry").
        entity: String,
        /// Local Store primary key.
        local_id: String,
        /// Remote-assigned identifier.
        server_id: String,
    },
    /// A pending record failed to upload and was marked `error`.
    PushFailed {
        /// Entity type tag.
        entity: String,
        /// Local Store primary key.
        local_id: String,
        /// Human-readable error message.
        message: String,
    },
    /// A tombstoned record's remote delete was confirmed.
    Deleted {
        /// Entity type tag.
        entity: String,
        /// Local Store primary key (row is gone after this event).
        local_id: String,
    },
}

impl RecordEvent {
    fn description(&self) -> &str {
        match self {
            RecordEvent::Synced { .. } => "Record synced",
            RecordEvent::PushFailed { .. } => "Record push failed",
            RecordEvent::Deleted { .. } => "Record delete confirmed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally: multiple producers (clone the
/// bus), multiple independent consumers (each `subscribe()`), non-blocking
/// sends, lagging detection for slow subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none. Emitters that do not care whether anyone is
    /// listening should call `.ok()` on the result.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive future events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
