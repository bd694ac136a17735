//! Persisted ledgers: song creation history and per-account download history

pub mod creation;
pub mod downloads;

pub use creation::HistoryStore;
pub use downloads::DownloadHistoryStore;
