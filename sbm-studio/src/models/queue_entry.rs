//! Queue entries and the persisted queue state document

use super::prompt::Prompt;
use chrono::{DateTime, Utc};
use sbm_common::events::QueueStatus;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Component, Path};
use uuid::Uuid;

/// Current queue state document version
pub const QUEUE_STATE_VERSION: u32 = 1;

/// A reserved, contiguous slice of the prompt pool assigned to one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub account_name: String,
    pub total_songs: usize,
    /// Informational; execution recomputes session sizes from prompt count
    pub songs_per_batch: usize,
    /// Half-open `[start, end)` into the pool, serialized as `[start, end]`
    pub prompts_range: (usize, usize),
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_count: usize,
}

impl QueueEntry {
    pub fn new(
        account_name: String,
        total_songs: usize,
        songs_per_batch: usize,
        start: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_name,
            total_songs,
            songs_per_batch,
            prompts_range: (start, start + total_songs),
            status: QueueStatus::Pending,
            created_at: Utc::now(),
            completed_count: 0,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.prompts_range.0..self.prompts_range.1
    }

    /// Set progress, clamping to `total_songs`
    pub fn set_completed_count(&mut self, completed: usize) {
        self.completed_count = completed.min(self.total_songs);
    }
}

/// Account names name a profile directory, so they must be one plain path component
pub fn is_valid_account_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    );
    single && !name.contains(['/', '\\'])
}

/// On-disk queue state: pool, cursor and live entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStateDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub prompts: Vec<Prompt>,
    #[serde(default)]
    pub prompt_cursor: usize,
    #[serde(default)]
    pub queues: Vec<QueueEntry>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

fn default_version() -> u32 {
    QUEUE_STATE_VERSION
}

impl Default for QueueStateDocument {
    fn default() -> Self {
        Self {
            version: QUEUE_STATE_VERSION,
            prompts: Vec::new(),
            prompt_cursor: 0,
            queues: Vec::new(),
            last_updated: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_serializes_as_pair() {
        let entry = QueueEntry::new("alice".to_string(), 3, 1, 4);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["prompts_range"], serde_json::json!([4, 7]));
        assert_eq!(json["status"], "pending");
        assert_eq!(entry.range(), 4..7);
    }

    #[test]
    fn test_completed_count_clamps() {
        let mut entry = QueueEntry::new("alice".to_string(), 3, 1, 0);
        entry.set_completed_count(10);
        assert_eq!(entry.completed_count, 3);
    }

    #[test]
    fn test_document_tolerates_missing_fields() {
        let doc: QueueStateDocument = serde_json::from_str("{}").unwrap();
        assert_eq!(doc, QueueStateDocument::default());
    }

    #[test]
    fn test_account_name_must_be_one_component() {
        assert!(is_valid_account_name("alice"));
        assert!(is_valid_account_name("team.alice-2"));
        for bad in ["", ".", "..", "../bob", "a/b", "a\\b", "/abs", "alice/"] {
            assert!(!is_valid_account_name(bad), "{bad:?} accepted");
        }
    }
}
