//! Error types for the snaplink library
//!
//! This module defines all error types that can occur while taking or
//! inspecting snapshots. Errors are designed to be informative and
//! actionable, carrying the path they relate to and the underlying
//! I/O error where one exists.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the snaplink library
pub type Result<T> = std::result::Result<T, SnaplinkError>;

/// Main error type for all snaplink operations
#[derive(Debug, Error)]
pub enum SnaplinkError {
    /// Source directory is missing or unreadable
    #[error("Source unavailable: {path:?}: {source}")]
    SourceUnavailable {
        /// Path to the source directory
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Backup root cannot be created or written
    #[error("Destination unavailable: {path:?}: {source}")]
    DestinationUnavailable {
        /// Path to the backup root
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Copying or linking into the snapshot failed partway through
    #[error("Sync incomplete at {path:?}: {source}")]
    SyncIncomplete {
        /// Path of the entry that failed to transfer
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The `latest` alias could not be repointed at the new snapshot
    #[error("Alias update failed for {path:?}: {source}")]
    AliasUpdateFailed {
        /// Path of the alias symlink
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Another snaplink process holds the backup root lock
    #[error("Backup root is locked by another process: {path:?}")]
    LockHeld {
        /// Path of the lock file
        path: PathBuf,
    },

    /// A snapshot directory with the computed name already exists
    #[error("Snapshot already exists: {0}")]
    SnapshotExists(String),

    /// Snapshot not found under the backup root
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// Directory name does not parse as a snapshot timestamp
    #[error("Invalid snapshot name: {0}")]
    InvalidSnapshotName(String),

    /// Exclusion pattern failed to compile
    #[error("Invalid exclude pattern: {0}")]
    InvalidPattern(String),

    /// Verification found differences between snapshot and reference
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// Diff operation failed
    #[error("Diff failed: {0}")]
    DiffFailed(String),

    /// I/O errors outside the lifecycle stages above
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error")]
    WalkDir(#[from] walkdir::Error),

    /// Path conversion error
    #[error("Path conversion error: {0:?}")]
    PathConversion(std::ffi::OsString),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SnaplinkError {
    /// Create a source-unavailable error for a path
    pub fn source_unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnaplinkError::SourceUnavailable {
            path: path.into(),
            source,
        }
    }

    /// Create a destination-unavailable error for a path
    pub fn destination_unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnaplinkError::DestinationUnavailable {
            path: path.into(),
            source,
        }
    }

    /// Create a sync-incomplete error for a path
    pub fn sync_incomplete(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnaplinkError::SyncIncomplete {
            path: path.into(),
            source,
        }
    }

    /// Create an alias-update error for a path
    pub fn alias_update_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnaplinkError::AliasUpdateFailed {
            path: path.into(),
            source,
        }
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SnaplinkError::Internal(msg.into())
    }

    /// Check if this error can leave a partial snapshot directory behind
    ///
    /// A failed transfer aborts the run without deleting what was already
    /// written; the snapshot directory stays on disk for inspection and the
    /// `latest` alias keeps pointing at the previous snapshot. All other
    /// errors occur before the snapshot directory is created or after it is
    /// complete.
    pub fn leaves_partial_snapshot(&self) -> bool {
        matches!(self, SnaplinkError::SyncIncomplete { .. })
    }

    /// Check if retrying the run later could succeed without intervention
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SnaplinkError::LockHeld { .. } | SnaplinkError::SnapshotExists(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SnaplinkError::SourceUnavailable { path, .. } => {
                format!(
                    "Source directory {:?} is missing or unreadable. Check the path and its permissions.",
                    path
                )
            }
            SnaplinkError::DestinationUnavailable { path, .. } => {
                format!(
                    "Backup root {:?} cannot be created or written. Check the path and free space.",
                    path
                )
            }
            SnaplinkError::SyncIncomplete { path, .. } => {
                format!(
                    "Transfer failed at {:?}. The partial snapshot was left in place and 'latest' still points at the previous snapshot; remove the partial directory and rerun.",
                    path
                )
            }
            SnaplinkError::LockHeld { path } => {
                format!(
                    "Another backup is in progress (lock file {:?}). Wait for it to finish and rerun.",
                    path
                )
            }
            SnaplinkError::SnapshotExists(name) => {
                format!(
                    "Snapshot '{}' already exists. Snapshot names have one-second granularity; rerun after a moment.",
                    name
                )
            }
            SnaplinkError::SnapshotNotFound(name) => {
                format!("Snapshot '{}' not found. Use 'snaplink list' to see available snapshots.", name)
            }
            _ => self.to_string(),
        }
    }
}
