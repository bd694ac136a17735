//! Event types for the SBM event system
//!
//! Long-running operations (batch creation, queue execution, paginated
//! downloads, pending reconciliation) report progress by emitting `SbmEvent`s
//! on a shared `EventBus`. The command transport forwards them to its client
//! as `progress` lines; tests subscribe directly.

mod types;

pub use types::{DownloadOutcome, QueueStatus, SongStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// SBM event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum SbmEvent {
    /// A batch creation run started
    BatchStarted {
        operation_id: Uuid,
        account_name: String,
        total_songs: usize,
        session_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A browser session opened its tabs
    SessionStarted {
        operation_id: Uuid,
        account_name: String,
        /// 0-based session index
        session_index: usize,
        session_count: usize,
        tab_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// One song changed status
    ///
    /// `percent` counts every song finished so far in the batch, including
    /// this one.
    SongStatusChanged {
        operation_id: Option<Uuid>,
        account_name: String,
        message: String,
        percent: u8,
        song_id: Option<String>,
        status: SongStatus,
        title: String,
        prompt_index: Option<usize>,
        timestamp: DateTime<Utc>,
    },

    /// A batch creation run finished (or was stopped)
    BatchCompleted {
        operation_id: Uuid,
        account_name: String,
        success: usize,
        pending: usize,
        failed: usize,
        stopped: bool,
        timestamp: DateTime<Utc>,
    },

    /// A queue entry's progress or status changed during execution
    QueueProgress {
        queue_id: Uuid,
        account_name: String,
        status: QueueStatus,
        completed_count: usize,
        total_songs: usize,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A page of the remote collection was fetched
    DownloadPageFetched {
        operation_id: Uuid,
        account_name: String,
        page: u32,
        clip_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// One clip was downloaded, skipped, or failed
    DownloadProgress {
        operation_id: Uuid,
        account_name: String,
        clip_id: String,
        title: String,
        outcome: DownloadOutcome,
        success: usize,
        skipped: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// A generic long operation finished successfully
    OperationCompleted {
        operation_id: Uuid,
        operation: String,
        result: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    /// A generic long operation failed as a whole
    OperationFailed {
        operation_id: Uuid,
        operation: String,
        error: String,
        error_code: String,
        timestamp: DateTime<Utc>,
    },
}

impl SbmEvent {
    /// Operation this event belongs to, if any
    pub fn operation_id(&self) -> Option<Uuid> {
        match self {
            SbmEvent::BatchStarted { operation_id, .. }
            | SbmEvent::SessionStarted { operation_id, .. }
            | SbmEvent::BatchCompleted { operation_id, .. }
            | SbmEvent::DownloadPageFetched { operation_id, .. }
            | SbmEvent::DownloadProgress { operation_id, .. }
            | SbmEvent::OperationCompleted { operation_id, .. }
            | SbmEvent::OperationFailed { operation_id, .. } => Some(*operation_id),
            SbmEvent::SongStatusChanged { operation_id, .. } => *operation_id,
            SbmEvent::QueueProgress { .. } => None,
        }
    }

    /// Event type name as it appears in the serialized `type` field
    pub fn event_type(&self) -> &'static str {
        match self {
            SbmEvent::BatchStarted { .. } => "BatchStarted",
            SbmEvent::SessionStarted { .. } => "SessionStarted",
            SbmEvent::SongStatusChanged { .. } => "SongStatusChanged",
            SbmEvent::BatchCompleted { .. } => "BatchCompleted",
            SbmEvent::QueueProgress { .. } => "QueueProgress",
            SbmEvent::DownloadPageFetched { .. } => "DownloadPageFetched",
            SbmEvent::DownloadProgress { .. } => "DownloadProgress",
            SbmEvent::OperationCompleted { .. } => "OperationCompleted",
            SbmEvent::OperationFailed { .. } => "OperationFailed",
        }
    }
}

/// Broadcast bus for `SbmEvent`s
///
/// Cloning the bus yields another handle to the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SbmEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SbmEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: SbmEvent) -> Result<usize, broadcast::error::SendError<SbmEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: SbmEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
