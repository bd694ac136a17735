//! Error types for sbm-studio
//!
//! `StudioError` is the boundary error: everything a command can fail with
//! as a whole. Per-song and per-clip failures never surface here; they are
//! recorded as `failed` results instead.

use crate::automation::AutomationError;
use crate::services::suno_client::ApiError;
use thiserror::Error;

/// Boundary error type
#[derive(Debug, Error)]
pub enum StudioError {
    /// Queue parameters violate a queue invariant
    #[error("Invalid queue parameters: {0}")]
    QueueValidation(String),

    /// Not enough unallocated prompts for the requested entry
    #[error("Insufficient prompts: requested {requested}, available {available}")]
    InsufficientPrompts { requested: usize, available: usize },

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// Command payload missing a field or of the wrong shape
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// A batch or download is already running
    #[error("Operation already running: {0}")]
    Busy(String),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Automation error: {0}")]
    Automation(#[from] AutomationError),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Song creation failed: {0}")]
    SongCreation(String),

    /// State document could not be written; in-memory state is unchanged
    #[error("Persistence failed: {0}")]
    Persistence(#[source] sbm_common::Error),

    /// A component the command needs was not configured at startup
    #[error("Manager not available: {0}")]
    ManagerMissing(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StudioError {
    /// Stable machine-readable code reported to command clients
    pub fn code(&self) -> &'static str {
        match self {
            StudioError::QueueValidation(_) => "INVALID_QUEUE_PARAMETERS",
            StudioError::InsufficientPrompts { .. } => "INSUFFICIENT_PROMPTS",
            StudioError::QueueNotFound(_) => "QUEUE_NOT_FOUND",
            StudioError::InvalidPayload(_) => "INVALID_PAYLOAD",
            StudioError::UnknownCommand(_) => "UNKNOWN_COMMAND",
            StudioError::Api(_) | StudioError::Download(_) => "DOWNLOAD_FAILED",
            StudioError::Automation(_) | StudioError::SongCreation(_) => "SONG_CREATION_FAILED",
            StudioError::Persistence(_) => "PERSISTENCE_FAILED",
            StudioError::Busy(_) | StudioError::ManagerMissing(_) | StudioError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }
}

impl From<sbm_common::Error> for StudioError {
    fn from(err: sbm_common::Error) -> Self {
        match err {
            sbm_common::Error::InvalidInput(msg) => StudioError::InvalidPayload(msg),
            sbm_common::Error::NotFound(msg) => StudioError::QueueNotFound(msg),
            other => StudioError::Persistence(other),
        }
    }
}

/// Result type for studio operations
pub type Result<T> = std::result::Result<T, StudioError>;
