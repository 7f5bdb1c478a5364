//! Advisory locking of the backup root
//!
//! A run holds an exclusive advisory lock on `.snaplink.lock` under the
//! backup root for its whole duration, so two processes cannot interleave
//! snapshot creation and alias updates on the same root. The lock is
//! advisory: it serializes snaplink against itself, not against arbitrary
//! writers.
//!
//! Acquisition does not block. A held lock fails the run immediately with
//! [`SnaplinkError::LockHeld`].

use crate::error::{Result, SnaplinkError};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the lock file under the backup root
pub const LOCK_FILE_NAME: &str = ".snaplink.lock";

/// Exclusive advisory lock on a backup root
///
/// The OS releases the lock when the held file closes, so dropping the
/// guard (including on panic or early return) releases it. The lock file
/// itself stays behind; its presence carries no meaning without the lock.
#[derive(Debug)]
pub struct BackupLock {
    path: PathBuf,
    _file: File,
}

impl BackupLock {
    /// Acquire the lock for a backup root, without blocking
    ///
    /// # Errors
    ///
    /// - [`SnaplinkError::DestinationUnavailable`] if the lock file cannot
    ///   be created under the backup root
    /// - [`SnaplinkError::LockHeld`] if another process holds the lock
    pub fn acquire(backup_root: &Path) -> Result<Self> {
        let path = backup_root.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| SnaplinkError::destination_unavailable(backup_root, e))?;

        fs2::FileExt::try_lock_exclusive(&file).map_err(|_| SnaplinkError::LockHeld {
            path: path.clone(),
        })?;

        debug!("acquired backup lock {:?}", path);
        Ok(Self { path, _file: file })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
