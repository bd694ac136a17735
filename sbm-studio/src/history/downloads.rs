//! Download history store
//!
//! One persisted document maps account name to its dedup set and resume
//! cursor. Each successful download is written through before the next one
//! starts, so a crash mid-page never loses or repeats finished downloads.

use crate::error::{Result, StudioError};
use crate::models::{AccountDownloadHistory, DownloadHistoryDocument, SongClip};
use sbm_common::persist;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct DownloadHistoryStore {
    file_path: PathBuf,
    histories: RwLock<DownloadHistoryDocument>,
}

impl DownloadHistoryStore {
    pub fn load(file_path: &Path) -> Result<Self> {
        let mut doc: DownloadHistoryDocument =
            persist::read_json_or_default(file_path).map_err(StudioError::Persistence)?;
        for history in doc.values_mut() {
            history.normalize();
        }
        info!(path = %file_path.display(), accounts = doc.len(), "Download history loaded");
        Ok(Self {
            file_path: file_path.to_path_buf(),
            histories: RwLock::new(doc),
        })
    }

    /// Stage a change to one account's history, persist, then commit
    async fn update_account<T>(
        &self,
        account_name: &str,
        f: impl FnOnce(&mut AccountDownloadHistory) -> Option<T>,
    ) -> Result<Option<T>> {
        let mut histories = self.histories.write().await;
        let mut staged = histories.clone();

        let history = staged.entry(account_name.to_string()).or_default();
        let Some(out) = f(history) else {
            return Ok(None);
        };

        persist::write_json_atomic(&self.file_path, &staged).map_err(|e| {
            warn!(
                path = %self.file_path.display(),
                account = %account_name,
                error = %e,
                "Failed to persist download history"
            );
            StudioError::Persistence(e)
        })?;

        *histories = staged;
        Ok(Some(out))
    }

    /// History of one account (empty if never downloaded)
    pub async fn get_history(&self, account_name: &str) -> AccountDownloadHistory {
        self.histories
            .read()
            .await
            .get(account_name)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn all_histories(&self) -> DownloadHistoryDocument {
        self.histories.read().await.clone()
    }

    pub async fn is_downloaded(&self, account_name: &str, clip_id: &str) -> bool {
        self.histories
            .read()
            .await
            .get(account_name)
            .is_some_and(|h| h.is_downloaded(clip_id))
    }

    /// Add a confirmed download to the dedup set; false if already present
    pub async fn record_download(&self, account_name: &str, clip_id: &str) -> Result<bool> {
        let added = self
            .update_account(account_name, |h| h.add_download(clip_id).then_some(()))
            .await?
            .is_some();
        if added {
            debug!(account = %account_name, clip_id = %clip_id, "Download recorded");
        }
        Ok(added)
    }

    /// Persist the resume cursor for `source`
    pub async fn set_cursor(&self, account_name: &str, source: &str, page: u32) -> Result<()> {
        self.update_account(account_name, |h| {
            if h.current_page == page && h.last_profile == source {
                return None;
            }
            h.current_page = page;
            h.last_profile = source.to_string();
            Some(())
        })
        .await?;
        debug!(account = %account_name, source = %source, page, "Resume cursor saved");
        Ok(())
    }

    /// Forget an account's downloads; false if the account had no history
    pub async fn clear_history(&self, account_name: &str) -> Result<bool> {
        if !self.histories.read().await.contains_key(account_name) {
            return Ok(false);
        }
        self.update_account(account_name, |h| {
            h.clear();
            Some(())
        })
        .await?;
        info!(account = %account_name, "Download history cleared");
        Ok(true)
    }

    /// Clips not yet in the account's dedup set, in input order
    pub async fn get_new_clips(&self, account_name: &str, clips: Vec<SongClip>) -> Vec<SongClip> {
        let histories = self.histories.read().await;
        let new: Vec<SongClip> = match histories.get(account_name) {
            Some(history) => clips
                .into_iter()
                .filter(|c| !history.is_downloaded(&c.id))
                .collect(),
            None => clips,
        };
        debug!(account = %account_name, new = new.len(), "Filtered new clips");
        new
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn clip(id: &str) -> SongClip {
        SongClip {
            id: id.to_string(),
            title: id.to_uppercase(),
            audio_url: Some(format!("https://cdn.example/{id}.mp3")),
            image_url: None,
            tags: String::new(),
            created_at: None,
            duration: None,
        }
    }

    #[tokio::test]
    async fn test_record_download_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("download_history.json");
        let store = DownloadHistoryStore::load(&path).unwrap();

        assert!(store.record_download("alice", "a").await.unwrap());
        assert!(!store.record_download("alice", "a").await.unwrap());

        let reloaded = DownloadHistoryStore::load(&path).unwrap();
        let history = reloaded.get_history("alice").await;
        assert_eq!(history.downloaded_ids, vec!["a"]);
        assert_eq!(history.total_downloaded, 1);
    }

    #[tokio::test]
    async fn test_get_new_clips() {
        let dir = TempDir::new().unwrap();
        let store = DownloadHistoryStore::load(&dir.path().join("d.json")).unwrap();
        store.record_download("alice", "b").await.unwrap();

        let new = store
            .get_new_clips("alice", vec![clip("a"), clip("b"), clip("c")])
            .await;
        let ids: Vec<_> = new.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        assert_eq!(store.get_new_clips("bob", vec![clip("b")]).await.len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = DownloadHistoryStore::load(&dir.path().join("d.json")).unwrap();

        store.set_cursor("alice", "feed", 3).await.unwrap();
        store.record_download("alice", "x").await.unwrap();
        assert_eq!(store.get_history("alice").await.resume_page("feed"), 3);

        assert!(store.clear_history("alice").await.unwrap());
        let history = store.get_history("alice").await;
        assert!(history.downloaded_ids.is_empty());
        assert_eq!(history.current_page, 0);

        assert!(!store.clear_history("nobody").await.unwrap());
    }
}
