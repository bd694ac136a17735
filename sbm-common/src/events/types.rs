//! Status enums carried by events and persisted records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-song creation status
///
/// `Waiting` is the only non-terminal state. A song leaves it exactly once,
/// after its form has been filled (and optionally submitted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongStatus {
    Waiting,
    Pending,
    Success,
    Failed,
}

impl SongStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SongStatus::Waiting => "waiting",
            SongStatus::Pending => "pending",
            SongStatus::Success => "success",
            SongStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SongStatus::Waiting)
    }
}

impl fmt::Display for SongStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SongStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiting" => Ok(SongStatus::Waiting),
            "pending" => Ok(SongStatus::Pending),
            "success" => Ok(SongStatus::Success),
            "failed" => Ok(SongStatus::Failed),
            other => Err(format!("unknown song status: {}", other)),
        }
    }
}

/// Lifecycle of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::InProgress => "in_progress",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }

    /// Entries that still have work to do
    pub fn is_open(&self) -> bool {
        matches!(self, QueueStatus::Pending | QueueStatus::InProgress)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one item in a download run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadOutcome {
    Success,
    Skipped,
    Failed,
}
