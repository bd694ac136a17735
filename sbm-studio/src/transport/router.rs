//! Command dispatch
//!
//! Short commands answer inline. Long commands (batch creation, queue
//! execution, batch download) are spawned onto the runtime, answered with an
//! `operation_id`, and finish with an `OperationCompleted` or
//! `OperationFailed` event on the bus.

use super::command::{Command, CommandType, Response};
use crate::creation::{BatchRequest, QueueRunRequest};
use crate::error::{Result, StudioError};
use crate::models::{
    is_valid_account_name, parse_prompt_document, AdvancedOptions, Prompt, QueueStatus, SongClip,
    SongCreationRecord,
};
use crate::services::{ApiPageSource, ClipSource, DownloadStats, PaginatedDownloadRequest};
use crate::AppState;
use chrono::Utc;
use sbm_common::events::SbmEvent;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct CreateQueuePayload {
    account_name: String,
    total_songs: usize,
    #[serde(default)]
    songs_per_batch: Option<usize>,
    #[serde(default)]
    prompts: Vec<Prompt>,
    #[serde(default)]
    prompt_document: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueueIdPayload {
    queue_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct UpdateProgressPayload {
    queue_id: Uuid,
    #[serde(default)]
    completed_count: Option<usize>,
    #[serde(default)]
    status: Option<QueueStatus>,
}

#[derive(Debug, Deserialize)]
struct ValidatePayload {
    #[serde(alias = "total_songs")]
    requested: usize,
}

#[derive(Debug, Deserialize)]
struct CreateBatchPayload {
    account_name: String,
    #[serde(default)]
    prompts: Vec<Prompt>,
    #[serde(default)]
    prompt_document: Option<String>,
    #[serde(default)]
    start_index: usize,
    #[serde(default = "default_true")]
    auto_submit: bool,
    #[serde(default)]
    advanced_options: AdvancedOptions,
    #[serde(default)]
    songs_per_session: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct StartQueuePayload {
    #[serde(default)]
    queue_ids: Option<Vec<Uuid>>,
    #[serde(default = "default_true")]
    auto_submit: bool,
    #[serde(default)]
    advanced_options: AdvancedOptions,
}

#[derive(Debug, Deserialize)]
struct StopPayload {
    #[serde(default)]
    operation_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct AccountPayload {
    #[serde(default)]
    account_name: Option<String>,
}

/// `source`: `"profile"` or `"feed"`; a bare `profile_name` implies profile
#[derive(Debug, Default, Deserialize)]
struct SourcePayload {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    profile_name: Option<String>,
}

impl SourcePayload {
    fn to_clip_source(&self) -> Result<ClipSource> {
        let profile = self
            .profile_name
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        match (self.source.as_deref().map(str::trim), profile) {
            (Some(s), _) if s.eq_ignore_ascii_case("feed") => Ok(ClipSource::Feed),
            (Some(s), Some(name)) if s.eq_ignore_ascii_case("profile") => Ok(ClipSource::profile(name)),
            (Some(s), None) if s.eq_ignore_ascii_case("profile") => Err(StudioError::InvalidPayload(
                "profile_name is required for profile source".to_string(),
            )),
            (Some(other), _) => Err(StudioError::InvalidPayload(format!("Unknown clip source: {}", other))),
            (None, Some(name)) => Ok(ClipSource::profile(name)),
            (None, None) => Ok(ClipSource::Feed),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FetchClipsPayload {
    #[serde(flatten)]
    source: SourcePayload,
    #[serde(default)]
    start_page: u32,
    #[serde(default)]
    max_pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct NewClipsPayload {
    account_name: String,
    clips: Vec<SongClip>,
}

#[derive(Debug, Deserialize)]
struct BatchDownloadPayload {
    account_name: String,
    #[serde(flatten)]
    source: SourcePayload,
    /// Explicit clips; when absent the source is paged through
    #[serde(default)]
    clips: Option<Vec<SongClip>>,
    #[serde(default)]
    start_page: Option<u32>,
    #[serde(default)]
    max_pages: Option<u32>,
    #[serde(default)]
    max_clips: Option<usize>,
    #[serde(default)]
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(default)]
    keyword: String,
}

#[derive(Debug, Deserialize)]
struct ExportPayload {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    #[serde(default)]
    session_token: Option<String>,
    /// Account the token signs in as; enables pending-song reconciliation for it
    #[serde(default)]
    account_name: Option<String>,
}

fn default_true() -> bool {
    true
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| StudioError::Internal(format!("serialize response: {}", e)))
}

fn require_account(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StudioError::InvalidPayload("account_name is required".to_string()));
    }
    if !is_valid_account_name(name) {
        return Err(StudioError::InvalidPayload(format!("Invalid account name: {:?}", name)));
    }
    Ok(name.to_string())
}

/// Explicit prompts win over a prompt document; incomplete prompts are dropped
fn collect_prompts(prompts: Vec<Prompt>, document: Option<&str>) -> Vec<Prompt> {
    let prompts = match document {
        Some(text) if prompts.is_empty() => parse_prompt_document(text),
        _ => prompts,
    };
    prompts.into_iter().filter(Prompt::is_complete).collect()
}

/// Execute one command and build its response
pub async fn dispatch(state: &AppState, command: Command) -> Response {
    let Some(command_type) = CommandType::parse(&command.command_type) else {
        warn!(id = %command.id, command_type = %command.command_type, "Unknown command");
        let err = StudioError::UnknownCommand(command.command_type.clone());
        return Response::err(&command, &err);
    };

    debug!(
        id = %command.id,
        command_type = command_type.as_str(),
        background = command_type.is_long_running(),
        "Dispatching command"
    );
    match handle(state, command_type, &command).await {
        Ok(data) => Response::ok(&command, data),
        Err(e) => {
            warn!(
                id = %command.id,
                command_type = command_type.as_str(),
                error = %e,
                error_code = e.code(),
                "Command failed"
            );
            Response::err(&command, &e)
        }
    }
}

async fn handle(state: &AppState, command_type: CommandType, command: &Command) -> Result<Value> {
    match command_type {
        CommandType::GetQueues => get_queues(state).await,
        CommandType::CreateQueue => create_queue(state, command.payload()?).await,
        CommandType::RemoveQueue => {
            let QueueIdPayload { queue_id } = command.payload()?;
            if !state.queues.remove_queue_entry(queue_id).await? {
                return Err(StudioError::QueueNotFound(queue_id.to_string()));
            }
            let dropped = state.reconciler.drop_queue(queue_id).await;
            Ok(json!({ "queue_id": queue_id, "removed": true, "dropped_pending": dropped }))
        }
        CommandType::UpdateQueueProgress => {
            let p: UpdateProgressPayload = command.payload()?;
            if !state
                .queues
                .update_queue_progress(p.queue_id, p.completed_count, p.status)
                .await?
            {
                return Err(StudioError::QueueNotFound(p.queue_id.to_string()));
            }
            let entry = state.queues.get_queue(p.queue_id).await;
            to_json(&entry)
        }
        CommandType::ValidatePrompts => {
            let ValidatePayload { requested } = command.payload()?;
            let available = state.queues.available_prompt_slots().await;
            Ok(json!({ "valid": requested <= available, "requested": requested, "available": available }))
        }
        CommandType::ClearQueues => {
            for entry in state.queues.get_all_queues().await {
                state.reconciler.drop_queue(entry.id).await;
            }
            state.queues.clear().await?;
            Ok(json!({ "cleared": true }))
        }
        CommandType::CreateSongsBatch => create_songs_batch(state, command.payload()?).await,
        CommandType::StartQueueExecution => start_queue_execution(state, command.payload()?).await,
        CommandType::StopBatch => stop(state, command.payload()?).await,
        CommandType::RefreshPending => {
            let report = state.reconciler.refresh().await;
            to_json(&report)
        }
        CommandType::GetDownloadHistory => {
            let AccountPayload { account_name } = command.payload()?;
            match account_name.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
                Some(account) => to_json(&state.downloads.get_history(account).await),
                None => to_json(&state.downloads.all_histories().await),
            }
        }
        CommandType::FetchClips => {
            let p: FetchClipsPayload = command.payload()?;
            let source = p.source.to_clip_source()?;
            let clips = state
                .api
                .fetch_clips(&source, p.start_page, p.max_pages, state.settings.download_delay())
                .await;
            Ok(json!({ "source": source.identity(), "count": clips.len(), "clips": to_json(&clips)? }))
        }
        CommandType::GetNewClips => {
            let p: NewClipsPayload = command.payload()?;
            let account = require_account(&p.account_name)?;
            let total = p.clips.len();
            let new_clips = state.downloads.get_new_clips(&account, p.clips).await;
            Ok(json!({ "total": total, "new_count": new_clips.len(), "clips": to_json(&new_clips)? }))
        }
        CommandType::BatchDownload => batch_download(state, command.payload()?).await,
        CommandType::ClearDownloadHistory => {
            let AccountPayload { account_name } = command.payload()?;
            let account = require_account(account_name.as_deref().unwrap_or_default())?;
            let cleared = state.downloads.clear_history(&account).await?;
            Ok(json!({ "account_name": account, "cleared": cleared }))
        }
        CommandType::GetCreationHistory => {
            let AccountPayload { account_name } = command.payload()?;
            let records = match account_name.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
                Some(account) => state.history.get_records_by_account(account).await,
                None => state.history.get_all_records().await,
            };
            to_json(&records)
        }
        CommandType::AddCreationRecord => {
            let record: SongCreationRecord = command.payload()?;
            require_account(&record.account_name)?;
            state.history.add_creation_record(record.clone()).await?;
            to_json(&record)
        }
        CommandType::SearchHistory => {
            let SearchPayload { keyword } = command.payload()?;
            to_json(&state.history.search_records(&keyword).await)
        }
        CommandType::ExportHistoryToCsv => {
            let ExportPayload { path } = command.payload()?;
            let rows = state.history.export_to_csv(&path).await?;
            Ok(json!({ "path": path, "rows": rows }))
        }
        CommandType::GetUserInfo => {
            let info = state.api.get_user_info().await?;
            to_json(&info)
        }
        CommandType::SetSessionToken => {
            let TokenPayload { session_token, account_name } = command.payload()?;
            let account = match account_name.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
                Some(name) => Some(require_account(name)?),
                None => None,
            };
            if let Some(account) = &account {
                state.api.set_account_token(account, session_token.clone()).await;
            }
            state.api.update_session_token(session_token).await;
            let mut data = json!({ "authenticated": state.api.has_session_token().await });
            if let Some(account) = account {
                data["account_name"] = json!(account);
            }
            Ok(data)
        }
        CommandType::Ping => Ok(json!({
            "pong": true,
            "uptime_secs": (Utc::now() - state.startup_time).num_seconds(),
            "version": env!("CARGO_PKG_VERSION"),
        })),
    }
}

async fn get_queues(state: &AppState) -> Result<Value> {
    let queues = state.queues.get_all_queues().await;
    Ok(json!({
        "queues": to_json(&queues)?,
        "prompt_count": state.queues.prompts().await.len(),
        "prompt_cursor": state.queues.prompt_cursor().await,
        "available": state.queues.available_prompt_slots().await,
    }))
}

async fn create_queue(state: &AppState, p: CreateQueuePayload) -> Result<Value> {
    let mut prompts = collect_prompts(p.prompts, p.prompt_document.as_deref());
    if prompts.is_empty() {
        // Queue against the pool already loaded
        prompts = state.queues.prompts().await;
    }
    let songs_per_batch = p.songs_per_batch.unwrap_or(p.total_songs);
    let entry = state
        .queues
        .add_queue_entry(&p.account_name, p.total_songs, songs_per_batch, prompts)
        .await?;
    to_json(&entry)
}

async fn create_songs_batch(state: &AppState, p: CreateBatchPayload) -> Result<Value> {
    let account = require_account(&p.account_name)?;
    let prompts = collect_prompts(p.prompts, p.prompt_document.as_deref());
    if prompts.is_empty() {
        return Err(StudioError::InvalidPayload("At least one complete prompt is required".to_string()));
    }
    if let Some(requested) = p.songs_per_session {
        debug!(requested, "songs_per_session ignored; sessions follow the tiered partition");
    }

    let creator = state.creator.clone();
    let profile_dir = state.profiles_dir.join(&account);
    let advanced = p.advanced_options.sanitized();
    let start_index = p.start_index;
    let auto_submit = p.auto_submit;

    spawn_operation(state, "create_songs_batch", state.creation_lock.clone(), move |operation_id, cancel| async move {
        let request = BatchRequest {
            operation_id,
            account_name: account,
            profile_dir,
            prompts,
            start_index,
            auto_submit,
            advanced,
            queue_id: None,
        };
        let summary = creator.create_songs_batch(&request, &cancel).await?;
        to_json(&summary)
    })
    .await
}

async fn start_queue_execution(state: &AppState, p: StartQueuePayload) -> Result<Value> {
    let queue_ids = match p.queue_ids {
        Some(ids) => ids,
        None => state
            .queues
            .get_pending_queues()
            .await
            .into_iter()
            .map(|q| q.id)
            .collect(),
    };
    if queue_ids.is_empty() {
        return Err(StudioError::QueueValidation("No queues to execute".to_string()));
    }

    let runner = state.runner.clone();
    let auto_submit = p.auto_submit;
    let advanced = p.advanced_options.sanitized();
    spawn_operation(state, "start_queue_execution", state.creation_lock.clone(), move |operation_id, cancel| async move {
        let request = QueueRunRequest {
            operation_id,
            queue_ids,
            auto_submit,
            advanced,
        };
        let outcomes = runner.execute(&request, &cancel).await?;
        to_json(&outcomes)
    })
    .await
}

async fn batch_download(state: &AppState, p: BatchDownloadPayload) -> Result<Value> {
    let account = require_account(&p.account_name)?;
    let source = p.source.to_clip_source()?;
    let dest_dir = p.output_dir.unwrap_or_else(|| state.downloads_dir.join(&account));
    let engine = state.download_engine.clone();
    let pages = ApiPageSource::new(state.api.clone(), source);
    let clips = p.clips;
    let (start_page, max_pages, max_clips) = (p.start_page, p.max_pages, p.max_clips);

    spawn_operation(state, "batch_download", state.download_lock.clone(), move |operation_id, cancel| async move {
        tokio::fs::create_dir_all(&dest_dir)
            .await
            .map_err(|e| StudioError::Download(format!("{}: {}", dest_dir.display(), e)))?;

        let request = PaginatedDownloadRequest {
            operation_id,
            account_name: account.clone(),
            dest_dir: dest_dir.clone(),
            start_page,
            max_pages,
            max_clips,
        };
        let run = async {
            match &clips {
                Some(clips) => engine.batch_download(operation_id, &account, clips, &dest_dir).await,
                None => engine.batch_download_paginated(&pages, &request).await,
            }
        };

        let stats: Option<DownloadStats> = tokio::select! {
            stats = run => Some(stats),
            _ = cancel.cancelled() => None,
        };
        match stats {
            Some(stats) => to_json(&stats),
            None => {
                info!(operation_id = %operation_id, account = %account, "Batch download stopped");
                Ok(json!({ "stopped": true }))
            }
        }
    })
    .await
}

async fn stop(state: &AppState, p: StopPayload) -> Result<Value> {
    let cancelled = {
        let operations = state.operations.read().await;
        match p.operation_id {
            Some(id) => match operations.get(&id) {
                Some(token) => {
                    token.cancel();
                    1
                }
                None => 0,
            },
            None => {
                operations.values().for_each(CancellationToken::cancel);
                operations.len()
            }
        }
    };
    state.creator.stop().await;
    info!(cancelled, "Stop requested");
    Ok(json!({ "stopped": cancelled }))
}

/// Run `work` in the background under `lock`
///
/// Fails with `Busy` if another operation holds the lock.
async fn spawn_operation<F, Fut>(
    state: &AppState,
    operation: &'static str,
    lock: Arc<Mutex<()>>,
    work: F,
) -> Result<Value>
where
    F: FnOnce(Uuid, CancellationToken) -> Fut,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    let guard = lock
        .try_lock_owned()
        .map_err(|_| StudioError::Busy(operation.to_string()))?;

    let operation_id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    state.operations.write().await.insert(operation_id, cancel.clone());

    let task = work(operation_id, cancel);
    let operations = state.operations.clone();
    let event_bus = state.event_bus.clone();

    info!(operation_id = %operation_id, operation, "Starting background operation");
    tokio::spawn(async move {
        let _guard = guard;
        let result = task.await;
        operations.write().await.remove(&operation_id);

        let event = match result {
            Ok(result) => {
                info!(operation_id = %operation_id, operation, "Operation completed");
                SbmEvent::OperationCompleted {
                    operation_id,
                    operation: operation.to_string(),
                    result,
                    timestamp: Utc::now(),
                }
            }
            Err(e) => {
                error!(operation_id = %operation_id, operation, error = %e, "Operation failed");
                SbmEvent::OperationFailed {
                    operation_id,
                    operation: operation.to_string(),
                    error: e.to_string(),
                    error_code: e.code().to_string(),
                    timestamp: Utc::now(),
                }
            }
        };
        event_bus.emit_lossy(event);
    });

    Ok(json!({ "operation_id": operation_id, "operation": operation }))
}
