//! Data models for sbm-studio
//!
//! - Prompts and prompt documents
//! - Queue entries (reserved prompt ranges)
//! - Song creation records and the per-song state machine
//! - Per-account download history
//! - Remote clips, clip pages and user info
//! - Advanced form options

pub mod advanced_options;
pub mod clip;
pub mod creation_record;
pub mod download_history;
pub mod prompt;
pub mod queue_entry;

pub use advanced_options::{AdvancedOptions, LyricsMode, VocalGender};
pub use clip::{ClipPage, SongClip, UserInfo};
pub use creation_record::{SongAttempt, SongCreationRecord, SongTransition};
pub use download_history::{AccountDownloadHistory, DownloadHistoryDocument};
pub use prompt::{parse_prompt_document, Prompt};
pub use queue_entry::{is_valid_account_name, QueueEntry, QueueStateDocument};
pub use sbm_common::events::{QueueStatus, SongStatus};
