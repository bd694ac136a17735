//! Queue Manager
//!
//! Owns the ordered prompt pool, the allocation cursor and the live queue
//! entries. Each entry reserves `[cursor, cursor + total_songs)` and advances
//! the cursor, so live ranges never overlap.
//!
//! Removing an entry does not return its range to the pool: the cursor only
//! moves forward until `clear()`. Re-issuing a removed range could alias two
//! entries onto prompts that were already partially executed.
//!
//! Every mutation is staged on a copy of the state, written atomically, and
//! committed to memory only after the write succeeds.

use crate::error::{Result, StudioError};
use crate::models::{is_valid_account_name, Prompt, QueueEntry, QueueStateDocument, QueueStatus};
use chrono::Utc;
use sbm_common::persist;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct QueueManager {
    state_file: PathBuf,
    state: Mutex<QueueStateDocument>,
}

impl QueueManager {
    /// Load state from `state_file` (an absent file is an empty state)
    ///
    /// A malformed file is an error rather than silently discarded.
    pub fn load(state_file: &Path) -> Result<Self> {
        let mut doc: QueueStateDocument =
            persist::read_json_or_default(state_file).map_err(StudioError::Persistence)?;

        let incomplete = doc.prompts.iter().filter(|p| !p.is_complete()).count();
        if incomplete > 0 {
            if doc.queues.is_empty() && doc.prompt_cursor == 0 {
                doc.prompts.retain(Prompt::is_complete);
                warn!(dropped = incomplete, "Dropped incomplete prompts from queue state");
            } else {
                // Saved ranges index into the pool as written
                warn!(
                    incomplete,
                    queues = doc.queues.len(),
                    "Queue state holds incomplete prompts; keeping pool as saved"
                );
            }
        }

        info!(
            path = %state_file.display(),
            prompts = doc.prompts.len(),
            cursor = doc.prompt_cursor,
            queues = doc.queues.len(),
            "Queue state loaded"
        );

        Ok(Self {
            state_file: state_file.to_path_buf(),
            state: Mutex::new(doc),
        })
    }

    /// Stage, persist, commit
    ///
    /// The closure returns `Ok(None)` when it made no change; nothing is
    /// written in that case.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut QueueStateDocument) -> Result<Option<T>>,
    ) -> Result<Option<T>> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();

        let Some(out) = f(&mut staged)? else {
            return Ok(None);
        };

        staged.last_updated = Some(Utc::now());
        persist::write_json_atomic(&self.state_file, &staged).map_err(|e| {
            warn!(path = %self.state_file.display(), error = %e, "Failed to persist queue state");
            StudioError::Persistence(e)
        })?;

        *state = staged;
        debug!(queues = state.queues.len(), cursor = state.prompt_cursor, "Queue state saved");
        Ok(Some(out))
    }

    /// Reserve the next `total_songs` prompts for `account_name`
    ///
    /// If the given pool differs from the current one it replaces it (and
    /// resets the cursor), but only while no entries exist.
    pub async fn add_queue_entry(
        &self,
        account_name: &str,
        total_songs: usize,
        songs_per_batch: usize,
        prompts: Vec<Prompt>,
    ) -> Result<QueueEntry> {
        let account_name = account_name.trim().to_string();

        let entry = self
            .mutate(move |state| {
                if prompts.is_empty() {
                    return Err(StudioError::QueueValidation(
                        "At least one prompt is required to queue songs".to_string(),
                    ));
                }
                if let Some(pos) = prompts.iter().position(|p| !p.is_complete()) {
                    return Err(StudioError::QueueValidation(format!(
                        "Prompt {} is missing a title, lyrics or style",
                        pos
                    )));
                }
                if account_name.is_empty() {
                    return Err(StudioError::QueueValidation(
                        "account_name is required".to_string(),
                    ));
                }
                if !is_valid_account_name(&account_name) {
                    return Err(StudioError::QueueValidation(format!(
                        "Invalid account name: {:?}",
                        account_name
                    )));
                }
                if state.prompts != prompts {
                    if !state.prompts.is_empty() && !state.queues.is_empty() {
                        return Err(StudioError::QueueValidation(
                            "Cannot switch prompts while queues exist".to_string(),
                        ));
                    }
                    state.prompts = prompts;
                    state.prompt_cursor = 0;
                }
                if total_songs == 0 || songs_per_batch == 0 {
                    return Err(StudioError::QueueValidation(
                        "Song counts must be positive".to_string(),
                    ));
                }
                if songs_per_batch > total_songs {
                    return Err(StudioError::QueueValidation(
                        "Songs per batch cannot exceed total songs".to_string(),
                    ));
                }
                let available = state.prompts.len().saturating_sub(state.prompt_cursor);
                if total_songs > available {
                    return Err(StudioError::InsufficientPrompts {
                        requested: total_songs,
                        available,
                    });
                }

                let entry = QueueEntry::new(
                    account_name,
                    total_songs,
                    songs_per_batch,
                    state.prompt_cursor,
                );
                state.prompt_cursor += total_songs;
                state.queues.push(entry.clone());
                Ok(Some(entry))
            })
            .await?
            .ok_or_else(|| StudioError::Internal("queue entry was not created".to_string()))?;

        info!(
            queue_id = %entry.id,
            account = %entry.account_name,
            start = entry.prompts_range.0,
            end = entry.prompts_range.1,
            "Queue entry created"
        );
        Ok(entry)
    }

    /// Delete an entry; its prompt range stays consumed
    pub async fn remove_queue_entry(&self, id: Uuid) -> Result<bool> {
        let removed = self
            .mutate(|state| {
                let before = state.queues.len();
                state.queues.retain(|q| q.id != id);
                Ok((state.queues.len() != before).then_some(()))
            })
            .await?
            .is_some();

        if removed {
            info!(queue_id = %id, "Queue entry removed");
        }
        Ok(removed)
    }

    /// Update progress and/or status; `completed_count` is clamped to `total_songs`
    pub async fn update_queue_progress(
        &self,
        id: Uuid,
        completed_count: Option<usize>,
        status: Option<QueueStatus>,
    ) -> Result<bool> {
        let updated = self
            .mutate(|state| {
                let Some(entry) = state.queues.iter_mut().find(|q| q.id == id) else {
                    return Ok(None);
                };
                if let Some(count) = completed_count {
                    entry.set_completed_count(count);
                }
                if let Some(status) = status {
                    entry.status = status;
                }
                Ok(Some(()))
            })
            .await?
            .is_some();

        debug!(queue_id = %id, updated, "Queue progress update");
        Ok(updated)
    }

    /// True if `requested` prompts are still unallocated
    pub async fn validate_total_prompts(&self, requested: usize) -> bool {
        requested <= self.available_prompt_slots().await
    }

    pub async fn available_prompt_slots(&self) -> usize {
        let state = self.state.lock().await;
        state.prompts.len().saturating_sub(state.prompt_cursor)
    }

    /// Reset pool, cursor and entries
    pub async fn clear(&self) -> Result<()> {
        self.mutate(|state| {
            state.prompts.clear();
            state.prompt_cursor = 0;
            state.queues.clear();
            Ok(Some(()))
        })
        .await?;
        info!("Queue state cleared");
        Ok(())
    }

    pub async fn get_queue(&self, id: Uuid) -> Option<QueueEntry> {
        self.state
            .lock()
            .await
            .queues
            .iter()
            .find(|q| q.id == id)
            .cloned()
    }

    /// All entries in creation order
    pub async fn get_all_queues(&self) -> Vec<QueueEntry> {
        let mut queues = self.state.lock().await.queues.clone();
        queues.sort_by_key(|q| q.created_at);
        queues
    }

    /// Entries still pending or in progress
    pub async fn get_pending_queues(&self) -> Vec<QueueEntry> {
        self.get_all_queues()
            .await
            .into_iter()
            .filter(|q| q.status.is_open())
            .collect()
    }

    /// Prompts of an entry, re-read by range from the current pool
    ///
    /// The range is clipped to the pool; `None` if the entry does not exist.
    pub async fn prompts_for(&self, id: Uuid) -> Option<Vec<Prompt>> {
        let state = self.state.lock().await;
        let entry = state.queues.iter().find(|q| q.id == id)?;
        let end = entry.prompts_range.1.min(state.prompts.len());
        let start = entry.prompts_range.0.min(end);
        Some(state.prompts[start..end].to_vec())
    }

    pub async fn prompt_cursor(&self) -> usize {
        self.state.lock().await.prompt_cursor
    }

    pub async fn prompts(&self) -> Vec<Prompt> {
        self.state.lock().await.prompts.clone()
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }
}
