//! Top-level error for an extractor run

use odp_common::OdpError;
use thiserror::Error;

use crate::fetch::FetchError;
use crate::mail::MailError;
use crate::publish::PublishError;
use crate::store::StoreError;

/// Result type alias for extractor bodies
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error(transparent)]
    Common(#[from] OdpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Reshaping failed in a way specific to one extractor
    #[error("{0}")]
    Transform(String),
}

impl IngestError {
    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }
}
