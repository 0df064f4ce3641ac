//! Event types for the Ideka event system
//!
//! Provides the pipeline event definitions and the EventBus used to surface
//! lifecycle changes and run-time stage failures to observers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Orchestrator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Uninitialized,
    Initialized,
    Running,
    Purged,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Uninitialized => write!(f, "uninitialized"),
            PipelineState::Initialized => write!(f, "initialized"),
            PipelineState::Running => write!(f, "running"),
            PipelineState::Purged => write!(f, "purged"),
        }
    }
}

/// Pipeline event types
///
/// Events are broadcast via EventBus and can be serialized for transmission
/// to external observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Lifecycle state changed
    StateChanged {
        old_state: PipelineState,
        new_state: PipelineState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Resolved audio entered the work buffer
    AudioAdmitted {
        /// Query id (or search term) the audio was resolved from
        query: String,
        /// Source that produced it
        source_id: String,
        /// Encoding identifier reported by the source
        encoding: String,
        /// Work buffer length after admission
        queued: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// All stages of a run were launched
    RunStarted {
        run_id: Uuid,
        /// Number of concurrently running stage tasks
        stages: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A stage task returned normally
    StageFinished {
        run_id: Uuid,
        stage: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A stage task failed; the run is torn down
    StageFailed {
        run_id: Uuid,
        stage: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Every stage task of a run has been joined
    RunCompleted {
        run_id: Uuid,
        /// False when the run was cancelled or a stage failed
        success: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Purge sweep finished
    Purged {
        /// Display form of the first collaborator failure, if any
        first_error: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, so publishing never blocks on slow
/// subscribers; a lagging subscriber observes `RecvError::Lagged`.
///
/// # Examples
///
/// ```
/// use ideka_common::events::{EventBus, PipelineEvent, PipelineState};
///
/// let event_bus = EventBus::new(16);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(PipelineEvent::StateChanged {
///     old_state: PipelineState::Uninitialized,
///     new_state: PipelineState::Initialized,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PipelineEvent,
    ) -> Result<usize, broadcast::error::SendError<PipelineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PipelineEvent) {
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
