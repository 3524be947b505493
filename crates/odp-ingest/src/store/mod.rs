//! Versioned remote file store
//!
//! Every read hands back a [`VersionHandle`]; a write that replaces a file
//! must present the handle it read, so a concurrent change surfaces as
//! [`StoreError::Conflict`] instead of a silent overwrite.

pub mod error;
pub mod github;
pub mod memory;

use async_trait::async_trait;
use std::fmt;

pub use error::{StoreError, StoreResult};
pub use github::GitHubStore;
pub use memory::MemoryStore;

/// Opaque version token (a blob SHA on GitHub)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionHandle(String);

impl VersionHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File content plus the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub path: String,
    pub content: Vec<u8>,
    pub version: VersionHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One child of a listed folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read a file. Missing files are [`StoreError::NotFound`].
    async fn read(&self, path: &str) -> StoreResult<RemoteObject>;

    /// Create (`version` is `None`) or replace (`version` from the last read)
    /// a file, returning its new version.
    async fn write(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        version: Option<&VersionHandle>,
    ) -> StoreResult<VersionHandle>;

    /// Direct children of a folder
    async fn list(&self, folder: &str) -> StoreResult<Vec<RemoteEntry>>;
}

/// Join store path segments with single slashes
pub fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    let name = name.trim_matches('/');
    match (folder.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => folder.to_string(),
        (false, false) => format!("{folder}/{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("Data/09_Innvandrere/", "/bosatt.csv"), "Data/09_Innvandrere/bosatt.csv");
        assert_eq!(join_path("", "bosatt.csv"), "bosatt.csv");
        assert_eq!(join_path("Data", ""), "Data");
    }
}
