//! Error types for the pipeline's shared layer

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, OdpError>;

/// Main error type for tables, artifacts, and settings
#[derive(Error, Debug)]
pub enum OdpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required configuration: {variable} is not set")]
    ConfigMissing { variable: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Table error: {0}")]
    Table(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl OdpError {
    pub fn config_missing(variable: impl Into<String>) -> Self {
        Self::ConfigMissing {
            variable: variable.into(),
        }
    }

    pub fn table(msg: impl Into<String>) -> Self {
        Self::Table(msg.into())
    }

    pub fn artifact(msg: impl Into<String>) -> Self {
        Self::Artifact(msg.into())
    }
}
