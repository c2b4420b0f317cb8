//! Single-run lock file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const LOCK_FILE: &str = "run.lock";

/// Contents of `run.lock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Held for the duration of a run; the file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    info: LockInfo,
}

impl RunLock {
    /// Create `run.lock` exclusively.
    ///
    /// Fails with `RunLocked` when another run holds the lock; the lock is
    /// reported stale when older than `stale_after`.
    pub fn acquire(root: &Path, holder: &str, now: DateTime<Utc>, stale_after: Duration) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let path = root.join(LOCK_FILE);
        let info = LockInfo {
            holder: holder.to_string(),
            pid: std::process::id(),
            acquired_at: now,
        };

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(&serde_json::to_vec_pretty(&info)?)?;
                file.sync_all()?;
                log::debug!("Acquired {}", path.display());
                Ok(Self { path, info })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Self::held_error(&path, now, stale_after))
            }
            Err(e) => Err(AppError::Io(e)),
        }
    }

    fn held_error(path: &Path, now: DateTime<Utc>, stale_after: Duration) -> AppError {
        match Self::inspect_path(path) {
            Some(existing) => AppError::RunLocked {
                holder: format!("{} (pid {})", existing.holder, existing.pid),
                since: existing.acquired_at.to_rfc3339(),
                stale: now - existing.acquired_at > stale_after,
            },
            None => AppError::RunLocked {
                holder: "unknown".to_string(),
                since: "unknown".to_string(),
                stale: false,
            },
        }
    }

    fn inspect_path(path: &Path) -> Option<LockInfo> {
        let bytes = std::fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Current lock holder, if any.
    pub fn inspect(root: &Path) -> Option<LockInfo> {
        Self::inspect_path(&root.join(LOCK_FILE))
    }

    /// Remove a lock left behind by a crashed run.
    ///
    /// Returns whether a lock file existed.
    pub fn force_unlock(root: &Path) -> Result<bool> {
        match std::fs::remove_file(root.join(LOCK_FILE)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Release the lock now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to remove {}: {}", self.path.display(), e);
        } else {
            log::debug!("Released {}", self.path.display());
        }
    }
}
