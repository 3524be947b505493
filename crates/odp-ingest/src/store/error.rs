use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Remote store failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Remote path not found: {path}")]
    NotFound { path: String },

    #[error("Remote store rejected the credentials for {path}")]
    Unauthorized { path: String },

    /// The version handle was stale, or the path already exists
    #[error("Version conflict on {path}: {detail}")]
    Conflict { path: String, detail: String },

    #[error("Rate limited while accessing {path}")]
    RateLimited { path: String },

    #[error("Network error on {path}: {detail}")]
    Network { path: String, detail: String },

    #[error("Unexpected response for {path}: {detail}")]
    MalformedResponse { path: String, detail: String },

    /// Any other non-success answer
    #[error("Remote store refused {path} with HTTP {status}: {detail}")]
    Rejected {
        path: String,
        status: u16,
        detail: String,
    },
}

impl StoreError {
    /// Worth one more attempt after a pause
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Network { .. } | StoreError::RateLimited { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn network(path: &str, detail: impl Into<String>) -> Self {
        StoreError::Network {
            path: path.to_string(),
            detail: detail.into(),
        }
    }

    pub fn malformed(path: &str, detail: impl Into<String>) -> Self {
        StoreError::MalformedResponse {
            path: path.to_string(),
            detail: detail.into(),
        }
    }
}
