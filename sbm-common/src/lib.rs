//! # SBM Common Library
//!
//! Shared code for the song batch manager crates including:
//! - Error and result types
//! - Bootstrap configuration (root folder, TOML config, logging settings)
//! - Atomic JSON/TOML document persistence
//! - Event types (SbmEvent enum) and the broadcast EventBus
//! - Timestamp formatting

pub mod config;
pub mod error;
pub mod events;
pub mod persist;
pub mod time;

pub use error::{Error, Result};
