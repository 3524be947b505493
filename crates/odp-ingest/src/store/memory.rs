//! In-memory remote store
//!
//! Same contract as the GitHub store, with numeric versions. Records every
//! write as a commit and can be told to fail upcoming calls, which is what
//! the publish and extractor tests drive it with.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{EntryKind, RemoteEntry, RemoteObject, RemoteStore, StoreError, StoreResult, VersionHandle};

/// A write that reached the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub path: String,
    pub message: String,
    pub version: VersionHandle,
}

#[derive(Debug, Default)]
struct State {
    files: HashMap<String, (Vec<u8>, u64)>,
    next_version: u64,
    commits: Vec<Commit>,
    reads: usize,
    failures: VecDeque<StoreError>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, path: &str) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::network(path, "memory store lock poisoned"))
    }

    fn bump(state: &mut State) -> u64 {
        state.next_version += 1;
        state.next_version
    }

    /// Seed a file without recording a commit
    pub fn insert(&self, path: &str, content: impl Into<Vec<u8>>) -> VersionHandle {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let version = Self::bump(&mut state);
        state.files.insert(path.to_string(), (content.into(), version));
        VersionHandle::new(version.to_string())
    }

    /// Current content of a file
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().ok()?;
        state.files.get(path).map(|(content, _)| content.clone())
    }

    pub fn commits(&self) -> Vec<Commit> {
        self.state
            .lock()
            .map(|state| state.commits.clone())
            .unwrap_or_default()
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().map(|state| state.reads).unwrap_or_default()
    }

    /// Make the next store call (of any kind) fail with `error`. Queued
    /// failures are consumed in order.
    pub fn fail_next(&self, error: StoreError) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.push_back(error);
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn read(&self, path: &str) -> StoreResult<RemoteObject> {
        let mut state = self.lock(path)?;
        state.reads += 1;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        let (content, version) = state.files.get(path).ok_or_else(|| StoreError::NotFound {
            path: path.to_string(),
        })?;
        Ok(RemoteObject {
            path: path.to_string(),
            content: content.clone(),
            version: VersionHandle::new(version.to_string()),
        })
    }

    async fn write(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        version: Option<&VersionHandle>,
    ) -> StoreResult<VersionHandle> {
        let mut state = self.lock(path)?;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        let current = state.files.get(path).map(|(_, v)| v.to_string());
        match (current.as_deref(), version) {
            (Some(current), None) => {
                return Err(StoreError::Conflict {
                    path: path.to_string(),
                    detail: format!("file exists at version {current}"),
                })
            },
            (Some(current), Some(expected)) if current != expected.as_str() => {
                return Err(StoreError::Conflict {
                    path: path.to_string(),
                    detail: format!("expected version {expected}, found {current}"),
                })
            },
            (None, Some(expected)) => {
                return Err(StoreError::Conflict {
                    path: path.to_string(),
                    detail: format!("expected version {expected}, file does not exist"),
                })
            },
            _ => {},
        }

        let new_version = Self::bump(&mut state);
        state
            .files
            .insert(path.to_string(), (content.to_vec(), new_version));
        let handle = VersionHandle::new(new_version.to_string());
        state.commits.push(Commit {
            path: path.to_string(),
            message: message.to_string(),
            version: handle.clone(),
        });
        Ok(handle)
    }

    async fn list(&self, folder: &str) -> StoreResult<Vec<RemoteEntry>> {
        let mut state = self.lock(folder)?;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        let folder = folder.trim_matches('/');
        let prefix = if folder.is_empty() {
            String::new()
        } else {
            format!("{folder}/")
        };

        let mut children: BTreeMap<String, EntryKind> = BTreeMap::new();
        let mut dirs = BTreeSet::new();
        for path in state.files.keys() {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    dirs.insert(dir.to_string());
                },
                None => {
                    children.insert(rest.to_string(), EntryKind::File);
                },
            }
        }
        for dir in dirs {
            children.insert(dir, EntryKind::Directory);
        }
        if children.is_empty() {
            return Err(StoreError::NotFound {
                path: folder.to_string(),
            });
        }

        Ok(children
            .into_iter()
            .map(|(name, kind)| RemoteEntry {
                path: super::join_path(folder, &name),
                name,
                kind,
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.read("Data/x.csv").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_then_replace_with_handle() {
        let store = MemoryStore::new();
        let v1 = store.write("Data/x.csv", b"a\n1\n", "Adding x.csv", None).await.unwrap();

        let read = store.read("Data/x.csv").await.unwrap();
        assert_eq!(read.version, v1);
        assert_eq!(read.content, b"a\n1\n");

        let v2 = store
            .write("Data/x.csv", b"a\n2\n", "Updating x.csv", Some(&read.version))
            .await
            .unwrap();
        assert_ne!(v1, v2);
        assert_eq!(store.commits().len(), 2);
        assert_eq!(store.commits()[1].message, "Updating x.csv");
    }

    #[tokio::test]
    async fn test_stale_handle_conflicts() {
        let store = MemoryStore::new();
        let stale = store.insert("Data/x.csv", "a\n1\n");
        store.insert("Data/x.csv", "a\n9\n");

        let err = store
            .write("Data/x.csv", b"a\n2\n", "Updating x.csv", Some(&stale))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let err = store.write("Data/x.csv", b"a\n2\n", "Adding x.csv", None).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.get("Data/x.csv").unwrap(), b"a\n9\n");
    }

    #[tokio::test]
    async fn test_list_children() {
        let store = MemoryStore::new();
        store.insert("Data/09/bosatt.csv", "x");
        store.insert("Data/09/sub/andel.csv", "x");
        store.insert("Data/10/other.csv", "x");

        let entries = store.list("Data/09").await.unwrap();
        assert_eq!(
            entries,
            vec![
                RemoteEntry {
                    name: "bosatt.csv".into(),
                    path: "Data/09/bosatt.csv".into(),
                    kind: EntryKind::File
                },
                RemoteEntry {
                    name: "sub".into(),
                    path: "Data/09/sub".into(),
                    kind: EntryKind::Directory
                },
            ]
        );
        assert!(store.list("Nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let store = MemoryStore::new();
        store.insert("x.csv", "a");
        store.fail_next(StoreError::RateLimited { path: "x.csv".into() });

        assert!(store.read("x.csv").await.unwrap_err().is_transient());
        assert!(store.read("x.csv").await.is_ok());
        assert_eq!(store.read_count(), 2);
    }
}
