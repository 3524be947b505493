//! Error types for the runner
//!
//! Messages are shown to the operator as-is, so each one says what to look at.

use std::path::PathBuf;

use odp_common::OdpError;
use odp_ingest::store::StoreError;
use thiserror::Error;

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

#[derive(Error, Debug)]
pub enum RunnerError {
    /// Another runner holds the lock on the scratch directory
    #[error("Another run is in progress ({holder}). Remove '{}' if that run is gone.", path.display())]
    AlreadyRunning { path: PathBuf, holder: String },

    /// The task list is unusable
    #[error("Invalid task list: {0}")]
    Tasks(String),

    #[error("Failed to parse task file: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// The master log could not be read back
    #[error("Malformed master log: {0}")]
    MasterLog(String),

    #[error("Summary notification failed: {0}")]
    Notify(String),

    #[error("Remote store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] OdpError),

    #[error("File operation failed: {0}. Check permissions on the log and scratch folders.")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    pub fn tasks(msg: impl Into<String>) -> Self {
        Self::Tasks(msg.into())
    }

    pub fn notify(msg: impl Into<String>) -> Self {
        Self::Notify(msg.into())
    }
}
