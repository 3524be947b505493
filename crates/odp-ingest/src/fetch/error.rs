use thiserror::Error;

/// Result type alias for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Why a fetch failed
#[derive(Error, Debug)]
pub enum FetchError {
    /// Connection, DNS, TLS, or timeout failure
    #[error("Request to {url} failed: {detail}")]
    Transport { url: String, detail: String },

    /// The source answered with a non-success status
    #[error("{url} responded with HTTP {status}: {detail}")]
    Status {
        url: String,
        status: u16,
        detail: String,
    },

    #[error("Could not decode response from {url}: {detail}")]
    Decode { url: String, detail: String },

    /// Decoded fine, but the dataset has no rows
    #[error("Dataset from {url} contains no rows")]
    Empty { url: String },
}

/// Coarse classification callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Transport,
    Decode,
    Empty,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Transport { .. } | FetchError::Status { .. } => FetchErrorKind::Transport,
            FetchError::Decode { .. } => FetchErrorKind::Decode,
            FetchError::Empty { .. } => FetchErrorKind::Empty,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Transport { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Decode { url, .. }
            | FetchError::Empty { url } => url,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kind() == FetchErrorKind::Empty
    }
}

/// Decoder failure before the URL is attached
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct DecodeError(pub String);

impl DecodeError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub(crate) fn at(self, url: &str) -> FetchError {
        FetchError::Decode {
            url: url.to_string(),
            detail: self.0,
        }
    }
}

impl From<odp_common::OdpError> for DecodeError {
    fn from(err: odp_common::OdpError) -> Self {
        Self(err.to_string())
    }
}
