//! Per-account download history (dedup set and resume cursor)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Download history of one account
///
/// `downloaded_ids` has set semantics; insertion order is kept for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDownloadHistory {
    #[serde(default)]
    pub downloaded_ids: Vec<String>,
    #[serde(default)]
    pub total_downloaded: usize,
    #[serde(default)]
    pub last_download: Option<DateTime<Utc>>,
    /// Next page to fetch when resuming `last_profile`
    #[serde(default)]
    pub current_page: u32,
    /// Source identity the cursor belongs to (`profile:<name>` or `feed`)
    #[serde(default)]
    pub last_profile: String,
}

impl AccountDownloadHistory {
    pub fn is_downloaded(&self, clip_id: &str) -> bool {
        self.downloaded_ids.iter().any(|id| id == clip_id)
    }

    /// Record a confirmed download; returns false if already present
    pub fn add_download(&mut self, clip_id: &str) -> bool {
        if self.is_downloaded(clip_id) {
            return false;
        }
        self.downloaded_ids.push(clip_id.to_string());
        self.total_downloaded = self.downloaded_ids.len();
        self.last_download = Some(Utc::now());
        true
    }

    /// Forget every download and the resume cursor
    pub fn clear(&mut self) {
        self.downloaded_ids.clear();
        self.total_downloaded = 0;
        self.last_download = None;
        self.current_page = 0;
        self.last_profile.clear();
    }

    /// Drop duplicate ids and restore `total_downloaded == len(downloaded_ids)`
    pub fn normalize(&mut self) {
        let mut seen = HashSet::new();
        self.downloaded_ids.retain(|id| seen.insert(id.clone()));
        self.total_downloaded = self.downloaded_ids.len();
    }

    /// Page to start from for `source`, or 0 if the cursor belongs elsewhere
    pub fn resume_page(&self, source: &str) -> u32 {
        if self.last_profile == source {
            self.current_page
        } else {
            0
        }
    }
}

/// On-disk map of account name to history
pub type DownloadHistoryDocument = BTreeMap<String, AccountDownloadHistory>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_download_keeps_count_in_sync() {
        let mut history = AccountDownloadHistory::default();
        assert!(history.add_download("a"));
        assert!(history.add_download("b"));
        assert!(!history.add_download("a"));
        assert_eq!(history.total_downloaded, 2);
        assert_eq!(history.downloaded_ids, vec!["a", "b"]);
        assert!(history.last_download.is_some());
    }

    #[test]
    fn test_normalize_repairs_hand_edited_document() {
        let mut history = AccountDownloadHistory {
            downloaded_ids: vec!["a".into(), "b".into(), "a".into()],
            total_downloaded: 17,
            ..Default::default()
        };
        history.normalize();
        assert_eq!(history.downloaded_ids, vec!["a", "b"]);
        assert_eq!(history.total_downloaded, 2);
    }

    #[test]
    fn test_resume_page_requires_matching_source() {
        let history = AccountDownloadHistory {
            current_page: 4,
            last_profile: "profile:dj".into(),
            ..Default::default()
        };
        assert_eq!(history.resume_page("profile:dj"), 4);
        assert_eq!(history.resume_page("feed"), 0);
    }
}
