//! Queue execution
//!
//! Runs queue entries one after another in the order given. Each entry's
//! prompts are re-read by range from the queue manager's current pool, so an
//! entry always executes exactly the prompts it reserved.

use super::batch_creator::{BatchRequest, BatchSongCreator, BatchSummary};
use crate::error::Result;
use crate::models::{AdvancedOptions, QueueEntry, QueueStatus};
use crate::queue::QueueManager;
use chrono::Utc;
use sbm_common::events::{EventBus, SbmEvent};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Which entries to run and how
#[derive(Debug, Clone)]
pub struct QueueRunRequest {
    pub operation_id: Uuid,
    pub queue_ids: Vec<Uuid>,
    pub auto_submit: bool,
    pub advanced: AdvancedOptions,
}

/// Result of one queue entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRunOutcome {
    pub queue_id: Uuid,
    pub account_name: String,
    pub status: QueueStatus,
    pub completed_count: usize,
    pub total_songs: usize,
    pub summary: Option<BatchSummary>,
    pub error: Option<String>,
}

pub struct QueueRunner {
    queues: Arc<QueueManager>,
    creator: Arc<BatchSongCreator>,
    profiles_dir: PathBuf,
    events: Option<EventBus>,
}

impl QueueRunner {
    pub fn new(queues: Arc<QueueManager>, creator: Arc<BatchSongCreator>, profiles_dir: PathBuf) -> Self {
        Self {
            queues,
            creator,
            profiles_dir,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn emit_progress(&self, entry: &QueueEntry, status: QueueStatus, completed_count: usize, message: String) {
        if let Some(bus) = &self.events {
            bus.emit_lossy(SbmEvent::QueueProgress {
                queue_id: entry.id,
                account_name: entry.account_name.clone(),
                status,
                completed_count,
                total_songs: entry.total_songs,
                message,
                timestamp: Utc::now(),
            });
        }
    }

    /// Mark an entry failed before it ran
    async fn fail_entry(&self, entry: &QueueEntry, reason: String) -> Result<QueueRunOutcome> {
        warn!(queue_id = %entry.id, account = %entry.account_name, reason = %reason, "Queue entry failed");
        self.queues
            .update_queue_progress(entry.id, None, Some(QueueStatus::Failed))
            .await?;
        self.emit_progress(entry, QueueStatus::Failed, entry.completed_count, reason.clone());
        Ok(QueueRunOutcome {
            queue_id: entry.id,
            account_name: entry.account_name.clone(),
            status: QueueStatus::Failed,
            completed_count: entry.completed_count,
            total_songs: entry.total_songs,
            summary: None,
            error: Some(reason),
        })
    }

    /// Run the requested entries in order until done or cancelled
    pub async fn execute(&self, request: &QueueRunRequest, cancel: &CancellationToken) -> Result<Vec<QueueRunOutcome>> {
        let mut outcomes = Vec::with_capacity(request.queue_ids.len());

        for queue_id in &request.queue_ids {
            if cancel.is_cancelled() {
                info!(operation_id = %request.operation_id, "Queue execution stopped");
                break;
            }

            let Some(entry) = self.queues.get_queue(*queue_id).await else {
                warn!(queue_id = %queue_id, "Unknown queue id, skipping");
                continue;
            };

            let prompts = self.queues.prompts_for(entry.id).await.unwrap_or_default();
            if prompts.is_empty() {
                outcomes.push(self.fail_entry(&entry, "No prompts for this queue range".to_string()).await?);
                continue;
            }

            let profile_dir = self.profiles_dir.join(&entry.account_name);
            if !profile_dir.is_dir() {
                let reason = format!("Browser profile not found: {}", profile_dir.display());
                outcomes.push(self.fail_entry(&entry, reason).await?);
                continue;
            }

            self.queues
                .update_queue_progress(entry.id, None, Some(QueueStatus::InProgress))
                .await?;
            self.emit_progress(
                &entry,
                QueueStatus::InProgress,
                entry.completed_count,
                format!("Running {} songs for {}", prompts.len(), entry.account_name),
            );

            let batch = BatchRequest {
                operation_id: request.operation_id,
                account_name: entry.account_name.clone(),
                profile_dir,
                prompts,
                start_index: entry.prompts_range.0,
                auto_submit: request.auto_submit,
                advanced: request.advanced.clone(),
                queue_id: Some(entry.id),
            };

            let summary = match self.creator.create_songs_batch(&batch, cancel).await {
                Ok(summary) => summary,
                Err(e) => {
                    outcomes.push(self.fail_entry(&entry, e.to_string()).await?);
                    continue;
                }
            };

            let completed = summary.completed();
            let status = if completed >= entry.total_songs {
                QueueStatus::Completed
            } else {
                QueueStatus::Failed
            };
            self.queues
                .update_queue_progress(entry.id, Some(completed), Some(status))
                .await?;
            let completed = completed.min(entry.total_songs);
            info!(
                queue_id = %entry.id,
                account = %entry.account_name,
                completed,
                total = entry.total_songs,
                status = %status,
                "Queue entry finished"
            );
            self.emit_progress(
                &entry,
                status,
                completed,
                format!("{}/{} songs created", completed, entry.total_songs),
            );

            outcomes.push(QueueRunOutcome {
                queue_id: entry.id,
                account_name: entry.account_name.clone(),
                status,
                completed_count: completed,
                total_songs: entry.total_songs,
                summary: Some(summary),
                error: None,
            });
        }

        Ok(outcomes)
    }
}
