//! Prompt pool and queue entry management

pub mod manager;

pub use manager::QueueManager;
