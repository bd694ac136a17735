//! Song creation history
//!
//! Append-only, newest first. Each insert rewrites the whole document before
//! it is committed to memory.

use crate::error::{Result, StudioError};
use crate::models::SongCreationRecord;
use sbm_common::persist;
use sbm_common::time::display_timestamp;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const CSV_HEADER: [&str; 6] = ["timestamp", "account", "title", "song_id", "status", "error"];

pub struct HistoryStore {
    file_path: PathBuf,
    records: RwLock<Vec<SongCreationRecord>>,
}

impl HistoryStore {
    pub fn load(file_path: &Path) -> Result<Self> {
        let records: Vec<SongCreationRecord> =
            persist::read_json_or_default(file_path).map_err(StudioError::Persistence)?;
        info!(path = %file_path.display(), records = records.len(), "Creation history loaded");
        Ok(Self {
            file_path: file_path.to_path_buf(),
            records: RwLock::new(records),
        })
    }

    /// Insert at the head and persist immediately
    pub async fn add_creation_record(&self, record: SongCreationRecord) -> Result<()> {
        let mut records = self.records.write().await;

        let mut staged = Vec::with_capacity(records.len() + 1);
        staged.push(record);
        staged.extend(records.iter().cloned());

        persist::write_json_atomic(&self.file_path, &staged).map_err(|e| {
            warn!(path = %self.file_path.display(), error = %e, "Failed to persist creation history");
            StudioError::Persistence(e)
        })?;

        if let Some(head) = staged.first() {
            debug!(
                account = %head.account_name,
                title = %head.title,
                status = %head.status,
                "Creation record added"
            );
        }
        *records = staged;
        Ok(())
    }

    pub async fn get_all_records(&self) -> Vec<SongCreationRecord> {
        self.records.read().await.clone()
    }

    pub async fn get_records_by_account(&self, account_name: &str) -> Vec<SongCreationRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.account_name == account_name)
            .cloned()
            .collect()
    }

    /// Case-insensitive match on title, song id or status; empty keyword returns all
    pub async fn search_records(&self, keyword: &str) -> Vec<SongCreationRecord> {
        let keyword = keyword.trim().to_lowercase();
        let records = self.records.read().await;
        if keyword.is_empty() {
            return records.clone();
        }
        records
            .iter()
            .filter(|r| r.matches_keyword(&keyword))
            .cloned()
            .collect()
    }

    /// Write all records to `output_path` as CSV, newest first
    pub async fn export_to_csv(&self, output_path: &Path) -> Result<usize> {
        let records = self.records.read().await;

        let mut out = String::new();
        push_csv_row(&mut out, CSV_HEADER.iter().copied());
        for r in records.iter() {
            let timestamp = display_timestamp(&r.created_at);
            push_csv_row(
                &mut out,
                [
                    timestamp.as_str(),
                    r.account_name.as_str(),
                    r.title.as_str(),
                    r.song_id.as_str(),
                    r.status.as_str(),
                    r.error_message.as_deref().unwrap_or(""),
                ],
            );
        }

        persist::write_bytes_atomic(output_path, out.as_bytes()).map_err(StudioError::Persistence)?;
        info!(path = %output_path.display(), rows = records.len(), "Creation history exported");
        Ok(records.len())
    }
}

fn push_csv_row<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&csv_field(field));
    }
    out.push_str("\r\n");
}

/// Quote a field if it contains a delimiter, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SongStatus;
    use tempfile::TempDir;

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[tokio::test]
    async fn test_newest_first_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("song_creation_history.json");
        let store = HistoryStore::load(&path).unwrap();

        store
            .add_creation_record(SongCreationRecord::new("alice", "First", 0, SongStatus::Success))
            .await
            .unwrap();
        store
            .add_creation_record(SongCreationRecord::new("bob", "Second", 1, SongStatus::Failed))
            .await
            .unwrap();

        let reloaded = HistoryStore::load(&path).unwrap();
        let records = reloaded.get_all_records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Second");
        assert_eq!(records[1].title, "First");
    }

    #[tokio::test]
    async fn test_search_and_account_filter() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::load(&dir.path().join("h.json")).unwrap();

        store
            .add_creation_record(
                SongCreationRecord::new("alice", "Night Drive", 0, SongStatus::Success)
                    .with_song_id("abc-123"),
            )
            .await
            .unwrap();
        store
            .add_creation_record(SongCreationRecord::new("bob", "Morning", 1, SongStatus::Pending))
            .await
            .unwrap();

        assert_eq!(store.search_records("NIGHT").await.len(), 1);
        assert_eq!(store.search_records("abc").await.len(), 1);
        assert_eq!(store.search_records("pending").await[0].title, "Morning");
        assert_eq!(store.search_records("").await.len(), 2);
        assert_eq!(store.get_records_by_account("bob").await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let store = HistoryStore::load(&blocker.join("h.json")).unwrap();

        let err = store
            .add_creation_record(SongCreationRecord::new("alice", "x", 0, SongStatus::Failed))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PERSISTENCE_FAILED");
        assert!(store.get_all_records().await.is_empty());
    }

    #[tokio::test]
    async fn test_export_csv() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::load(&dir.path().join("h.json")).unwrap();
        store
            .add_creation_record(
                SongCreationRecord::new("alice", "Hello, World", 0, SongStatus::Failed)
                    .with_error("Fill form failed"),
            )
            .await
            .unwrap();

        let out = dir.path().join("export.csv");
        assert_eq!(store.export_to_csv(&out).await.unwrap(), 1);

        let content = std::fs::read_to_string(&out).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("timestamp,account,title,song_id,status,error"));
        let row = lines.next().unwrap();
        assert!(row.contains(",alice,\"Hello, World\",,failed,Fill form failed"));
    }
}
