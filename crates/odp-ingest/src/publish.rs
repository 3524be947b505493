//! Compare-then-upload gateway
//!
//! A table is written to the scratch folder in canonical form, compared
//! with the published copy, and uploaded only when it is new or differs.
//! Replacing a file always presents the version handle from the read, so a
//! concurrent change is reported rather than overwritten.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use odp_common::{artifact, OdpError, Table};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::compare::{compare, ComparePolicy};
use crate::store::{join_path, RemoteStore, StoreError, StoreResult, VersionHandle};

/// Pause before the single retry of a transient store failure
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Remote store error: {0}")]
    Store(StoreError),

    /// The remote file changed between read and write
    #[error("Lost update on {path}: {detail}")]
    LostUpdate { path: String, detail: String },

    #[error("Artifact error: {0}")]
    Artifact(#[from] OdpError),

    #[error("Scratch file error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for PublishError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { path, detail } => PublishError::LostUpdate { path, detail },
            other => PublishError::Store(other),
        }
    }
}

pub type PublishResult<T> = std::result::Result<T, PublishError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishVerdict {
    NewData,
    NoChange,
}

impl PublishVerdict {
    pub fn is_new_data(self) -> bool {
        self == PublishVerdict::NewData
    }
}

/// Where and how to publish one artifact
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// File name, e.g. `andel_innvandrere_bosatt.csv`
    pub artifact_name: String,
    /// Remote folder, e.g. `Data/09_Innvandrere og inkludering/Innvandrerbefolkningen`
    pub remote_folder: String,
    pub policy: ComparePolicy,
    /// Leave the scratch copy in place after publishing
    pub keep_local: bool,
}

impl PublishRequest {
    pub fn new(artifact_name: impl Into<String>, remote_folder: impl Into<String>) -> Self {
        Self {
            artifact_name: artifact_name.into(),
            remote_folder: remote_folder.into(),
            policy: ComparePolicy::default(),
            keep_local: false,
        }
    }

    pub fn policy(mut self, policy: ComparePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn keep_local(mut self, keep: bool) -> Self {
        self.keep_local = keep;
        self
    }

    pub fn remote_path(&self) -> String {
        join_path(&self.remote_folder, &self.artifact_name)
    }
}

pub struct Publisher {
    store: Arc<dyn RemoteStore>,
    scratch_dir: PathBuf,
    retry_delay: Duration,
}

impl Publisher {
    pub fn new(store: Arc<dyn RemoteStore>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            scratch_dir: scratch_dir.into(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Publish `table` if it is new or differs from the remote copy
    #[instrument(skip(self, table, request), fields(artifact = %request.artifact_name))]
    pub async fn publish(&self, table: &Table, request: &PublishRequest) -> PublishResult<PublishVerdict> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let local_path = self.scratch_dir.join(&request.artifact_name);
        let bytes = artifact::to_canonical_csv(table)?;
        tokio::fs::write(&local_path, &bytes).await?;

        let result = self.compare_and_upload(table, &bytes, request).await;

        if !request.keep_local {
            if let Err(e) = tokio::fs::remove_file(&local_path).await {
                warn!(error = %e, path = %local_path.display(), "Could not remove scratch artifact");
            }
        }
        result
    }

    async fn compare_and_upload(
        &self,
        table: &Table,
        bytes: &[u8],
        request: &PublishRequest,
    ) -> PublishResult<PublishVerdict> {
        let path = request.remote_path();

        let existing = match self.with_retry(|| self.store.read(&path)).await {
            Ok(object) => Some(object),
            Err(StoreError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        let Some(existing) = existing else {
            info!(path = %path, rows = table.len(), "Uploading new file");
            let message = format!("Adding {}", request.artifact_name);
            self.upload(&path, bytes, &message, None).await?;
            return Ok(PublishVerdict::NewData);
        };

        match artifact::parse_artifact(&existing.content) {
            Ok(published) => {
                let comparison = compare(&published, table, &request.policy);
                if comparison.is_equal() {
                    info!(path = %path, "No new data");
                    return Ok(PublishVerdict::NoChange);
                }
                info!(path = %path, change = %comparison, "New data detected, updating file");
            },
            Err(e) => {
                warn!(path = %path, error = %e, "Published copy is unreadable, replacing it");
            },
        }

        let message = format!("Updating {}", request.artifact_name);
        self.upload(&path, bytes, &message, Some(&existing.version)).await?;
        Ok(PublishVerdict::NewData)
    }

    async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
        version: Option<&VersionHandle>,
    ) -> PublishResult<VersionHandle> {
        let handle = self
            .with_retry(|| self.store.write(path, bytes, message, version))
            .await?;
        info!(path = %path, version = %handle, "Upload complete");
        Ok(handle)
    }

    /// Run `op`, and once more after `retry_delay` if it fails transiently
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        match op().await {
            Err(e) if e.is_transient() => {
                warn!(error = %e, delay = ?self.retry_delay, "Transient store failure, retrying once");
                tokio::time::sleep(self.retry_delay).await;
                op().await
            },
            other => other,
        }
    }
}
