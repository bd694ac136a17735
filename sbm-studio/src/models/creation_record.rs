//! Song creation records and the per-song status state machine
//!
//! A song starts `waiting` and makes exactly one transition to a terminal
//! status (`pending`, `success` or `failed`) once its tab has been filled and
//! optionally submitted. The transition produces the history record.

use chrono::{DateTime, Utc};
use sbm_common::events::SongStatus;
use serde::{Deserialize, Serialize};

pub const FILL_FAILED_MESSAGE: &str = "Fill form failed";
pub const AWAITING_ID_MESSAGE: &str = "request sent – waiting for ID";
pub const PENDING_EXPIRED_MESSAGE: &str = "timed out waiting for ID";

/// One immutable entry in the song creation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongCreationRecord {
    /// Empty until the remote id is known
    #[serde(default)]
    pub song_id: String,
    pub title: String,
    /// Absolute position in the prompt pool
    #[serde(default)]
    pub prompt_index: usize,
    pub account_name: String,
    pub status: SongStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl SongCreationRecord {
    pub fn new(
        account_name: impl Into<String>,
        title: impl Into<String>,
        prompt_index: usize,
        status: SongStatus,
    ) -> Self {
        Self {
            song_id: String::new(),
            title: title.into(),
            prompt_index,
            account_name: account_name.into(),
            status,
            created_at: Utc::now(),
            error_message: None,
        }
    }

    pub fn with_song_id(mut self, song_id: impl Into<String>) -> Self {
        self.song_id = song_id.into();
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Case-insensitive substring match on title, song id or status
    pub fn matches_keyword(&self, keyword_lower: &str) -> bool {
        self.title.to_lowercase().contains(keyword_lower)
            || self.song_id.to_lowercase().contains(keyword_lower)
            || self.status.as_str().contains(keyword_lower)
    }
}

/// Result of leaving the `waiting` state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongTransition {
    pub old_status: SongStatus,
    pub new_status: SongStatus,
    pub song_id: Option<String>,
    pub error_message: Option<String>,
}

/// In-flight song attempt tracked by the batch engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongAttempt {
    pub account_name: String,
    pub title: String,
    pub prompt_index: usize,
    pub status: SongStatus,
    pub song_id: Option<String>,
    pub error_message: Option<String>,
}

impl SongAttempt {
    pub fn new(account_name: &str, title: &str, prompt_index: usize) -> Self {
        Self {
            account_name: account_name.to_string(),
            title: title.to_string(),
            prompt_index,
            status: SongStatus::Waiting,
            song_id: None,
            error_message: None,
        }
    }

    /// Move to a terminal status
    ///
    /// Returns `None` (and leaves the attempt unchanged) if the attempt has
    /// already left `waiting` or the target is `waiting`.
    pub fn transition_to(
        &mut self,
        new_status: SongStatus,
        song_id: Option<String>,
        error_message: Option<String>,
    ) -> Option<SongTransition> {
        if self.status.is_terminal() || !new_status.is_terminal() {
            return None;
        }
        let transition = SongTransition {
            old_status: self.status,
            new_status,
            song_id: song_id.clone(),
            error_message: error_message.clone(),
        };
        self.status = new_status;
        self.song_id = song_id;
        self.error_message = error_message;
        Some(transition)
    }

    /// Form fill failed
    pub fn fill_failed(&mut self) -> Option<SongTransition> {
        self.transition_to(SongStatus::Failed, None, Some(FILL_FAILED_MESSAGE.to_string()))
    }

    /// Form filled, left for the user to submit
    pub fn ready_for_manual_submit(&mut self) -> Option<SongTransition> {
        self.transition_to(SongStatus::Pending, None, None)
    }

    /// Submitted and the song page URL appeared
    pub fn submitted(&mut self, song_id: String) -> Option<SongTransition> {
        self.transition_to(SongStatus::Success, Some(song_id), None)
    }

    /// Submitted but no song URL within the creation timeout
    pub fn submit_timed_out(&mut self) -> Option<SongTransition> {
        self.transition_to(SongStatus::Pending, None, Some(AWAITING_ID_MESSAGE.to_string()))
    }

    /// Submission raised an unexpected error
    pub fn submit_errored(&mut self, message: String) -> Option<SongTransition> {
        self.transition_to(SongStatus::Failed, None, Some(message))
    }

    /// History record for the current (terminal) status
    pub fn to_record(&self) -> SongCreationRecord {
        SongCreationRecord {
            song_id: self.song_id.clone().unwrap_or_default(),
            title: self.title.clone(),
            prompt_index: self.prompt_index,
            account_name: self.account_name.clone(),
            status: self.status,
            created_at: Utc::now(),
            error_message: self.error_message.clone(),
        }
    }
}
