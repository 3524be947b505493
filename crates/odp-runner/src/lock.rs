//! Exclusive run lock on the scratch directory
//!
//! Acquisition creates `.odp-runner.lock` with create-new semantics and
//! writes the holder's id, pid, and expiry into it. A lock past its expiry
//! is taken over, so a crashed run does not block the next night forever.
//! Dropping the guard removes the file if it still belongs to this holder.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, RunnerError};

pub const LOCK_FILE_NAME: &str = ".odp-runner.lock";

/// A lock older than this is considered abandoned
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Lock file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder_id: Uuid,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    fn new(ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            holder_id: Uuid::new_v4(),
            pid: std::process::id(),
            acquired_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24)),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    fn describe(&self) -> String {
        format!("pid {} since {}", self.pid, self.acquired_at.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

/// Held run lock; released on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    info: LockInfo,
}

impl RunLock {
    pub fn acquire(dir: &Path) -> Result<Self> {
        Self::acquire_with_ttl(dir, DEFAULT_LOCK_TTL)
    }

    pub fn acquire_with_ttl(dir: &Path, ttl: Duration) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE_NAME);

        // Second attempt only after removing an expired or unreadable lock
        for _ in 0..2 {
            let info = LockInfo::new(ttl);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let body = serde_json::to_vec_pretty(&info)
                        .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
                    file.write_all(&body)?;
                    file.sync_all()?;
                    debug!(path = %path.display(), holder = %info.holder_id, "Run lock acquired");
                    return Ok(Self { path, info });
                },
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    match read_info(&path) {
                        Some(existing) if !existing.is_expired() => {
                            return Err(RunnerError::AlreadyRunning {
                                path,
                                holder: existing.describe(),
                            });
                        },
                        Some(existing) => {
                            warn!(holder = %existing.describe(), "Taking over expired run lock");
                        },
                        None => warn!(path = %path.display(), "Removing unreadable run lock"),
                    }
                    remove_if_present(&path)?;
                },
                Err(e) => return Err(e.into()),
            }
        }

        let holder = read_info(&path)
            .map(|info| info.describe())
            .unwrap_or_else(|| "unknown holder".to_string());
        Err(RunnerError::AlreadyRunning { path, holder })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let ours = read_info(&self.path).is_some_and(|info| info.holder_id == self.info.holder_id);
        if !ours {
            warn!(path = %self.path.display(), "Run lock was replaced, leaving it in place");
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(error = %e, path = %self.path.display(), "Failed to release run lock");
        }
    }
}

fn read_info(path: &Path) -> Option<LockInfo> {
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
