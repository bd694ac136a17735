//! Command and response envelopes of the stdin/stdout transport
//!
//! Requests: `{"id": "...", "type": "CREATE_QUEUE", "payload": {...}}`
//! Responses: `{"id", "type": "CREATE_QUEUE_RESPONSE", "success", "data",
//! "error", "error_code", "timestamp"}`

use crate::error::{Result, StudioError};
use chrono::{DateTime, Utc};
use sbm_common::events::SbmEvent;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every command the transport accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    GetQueues,
    CreateQueue,
    RemoveQueue,
    UpdateQueueProgress,
    ValidatePrompts,
    ClearQueues,
    CreateSongsBatch,
    StartQueueExecution,
    StopBatch,
    RefreshPending,
    GetDownloadHistory,
    FetchClips,
    GetNewClips,
    BatchDownload,
    ClearDownloadHistory,
    GetCreationHistory,
    AddCreationRecord,
    SearchHistory,
    ExportHistoryToCsv,
    GetUserInfo,
    SetSessionToken,
    Ping,
}

impl CommandType {
    pub const ALL: [CommandType; 22] = [
        CommandType::GetQueues,
        CommandType::CreateQueue,
        CommandType::RemoveQueue,
        CommandType::UpdateQueueProgress,
        CommandType::ValidatePrompts,
        CommandType::ClearQueues,
        CommandType::CreateSongsBatch,
        CommandType::StartQueueExecution,
        CommandType::StopBatch,
        CommandType::RefreshPending,
        CommandType::GetDownloadHistory,
        CommandType::FetchClips,
        CommandType::GetNewClips,
        CommandType::BatchDownload,
        CommandType::ClearDownloadHistory,
        CommandType::GetCreationHistory,
        CommandType::AddCreationRecord,
        CommandType::SearchHistory,
        CommandType::ExportHistoryToCsv,
        CommandType::GetUserInfo,
        CommandType::SetSessionToken,
        CommandType::Ping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::GetQueues => "GET_QUEUES",
            CommandType::CreateQueue => "CREATE_QUEUE",
            CommandType::RemoveQueue => "REMOVE_QUEUE",
            CommandType::UpdateQueueProgress => "UPDATE_QUEUE_PROGRESS",
            CommandType::ValidatePrompts => "VALIDATE_PROMPTS",
            CommandType::ClearQueues => "CLEAR_QUEUES",
            CommandType::CreateSongsBatch => "CREATE_SONGS_BATCH",
            CommandType::StartQueueExecution => "START_QUEUE_EXECUTION",
            CommandType::StopBatch => "STOP_BATCH",
            CommandType::RefreshPending => "REFRESH_PENDING",
            CommandType::GetDownloadHistory => "GET_DOWNLOAD_HISTORY",
            CommandType::FetchClips => "FETCH_CLIPS",
            CommandType::GetNewClips => "GET_NEW_CLIPS",
            CommandType::BatchDownload => "BATCH_DOWNLOAD",
            CommandType::ClearDownloadHistory => "CLEAR_DOWNLOAD_HISTORY",
            CommandType::GetCreationHistory => "GET_CREATION_HISTORY",
            CommandType::AddCreationRecord => "ADD_CREATION_RECORD",
            CommandType::SearchHistory => "SEARCH_HISTORY",
            CommandType::ExportHistoryToCsv => "EXPORT_HISTORY_TO_CSV",
            CommandType::GetUserInfo => "GET_USER_INFO",
            CommandType::SetSessionToken => "SET_SESSION_TOKEN",
            CommandType::Ping => "PING",
        }
    }

    /// Parse a wire name (case-insensitive)
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
    }

    /// Runs in the background and reports through progress events
    pub fn is_long_running(&self) -> bool {
        matches!(
            self,
            CommandType::CreateSongsBatch | CommandType::StartQueueExecution | CommandType::BatchDownload
        )
    }
}

/// Incoming command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl Command {
    pub fn new(id: impl Into<String>, command_type: CommandType, payload: Value) -> Self {
        Self {
            id: id.into(),
            command_type: command_type.as_str().to_string(),
            payload,
        }
    }

    /// Decode the payload; a missing payload decodes as `{}`
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        let payload = match &self.payload {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(payload).map_err(|e| {
            StudioError::InvalidPayload(format!("{}: {}", self.command_type, e))
        })
    }
}

/// Outgoing response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(rename = "type")]
    pub response_type: String,
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Response {
    fn response_type(command_type: &str) -> String {
        let name = if command_type.trim().is_empty() {
            "ERROR"
        } else {
            command_type.trim()
        };
        format!("{}_RESPONSE", name.to_ascii_uppercase())
    }

    pub fn ok(command: &Command, data: Value) -> Self {
        Self {
            id: command.id.clone(),
            response_type: Self::response_type(&command.command_type),
            success: true,
            data,
            error: None,
            error_code: None,
            timestamp: Utc::now(),
        }
    }

    pub fn err(command: &Command, error: &StudioError) -> Self {
        Self::failure(&command.id, &command.command_type, error)
    }

    pub fn failure(id: &str, command_type: &str, error: &StudioError) -> Self {
        Self {
            id: id.to_string(),
            response_type: Self::response_type(command_type),
            success: false,
            data: Value::Null,
            error: Some(error.to_string()),
            error_code: Some(error.code().to_string()),
            timestamp: Utc::now(),
        }
    }
}

/// Asynchronous progress line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub event: SbmEvent,
}

impl ProgressMessage {
    pub fn new(event: SbmEvent) -> Self {
        Self {
            message_type: "progress".to_string(),
            event,
        }
    }
}
