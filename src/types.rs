//! Core data types used throughout the snaplink library
//!
//! This module contains fundamental data structures that are shared across
//! different components of the library.
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Run configuration**: `RunOptions`, `MatchPolicy` - how a backup run behaves
//! - **Run results**: `RunReport`, `SyncStats` - what a run did
//! - **Progress**: `ProgressInfo`, `ProgressCallback` - reporting for long runs
//!
//! ## Examples
//!
//! ```rust
//! use snaplink::types::{MatchPolicy, RunOptions};
//!
//! // Configure a run that hashes file content instead of trusting mtimes
//! let options = RunOptions {
//!     match_policy: MatchPolicy::Content,
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Rule deciding whether a source file is unchanged relative to the
/// previous snapshot and may be hard-linked instead of copied
///
/// The sync engine preserves modification times when it copies, so snapshot
/// mtimes mirror source mtimes and `SizeAndMtime` stays sound across runs.
///
/// # Examples
///
/// ```rust
/// use snaplink::types::MatchPolicy;
///
/// assert_eq!(MatchPolicy::default(), MatchPolicy::SizeAndMtime);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Same size and same modification time (exact, to the platform's
    /// stored precision)
    #[default]
    SizeAndMtime,
    /// Same size and same SHA-256 content hash; reads both files
    Content,
}

impl MatchPolicy {
    /// Short lowercase name, as accepted on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPolicy::SizeAndMtime => "size-and-mtime",
            MatchPolicy::Content => "content",
        }
    }
}

/// Options for a backup run
#[derive(Clone)]
pub struct RunOptions {
    /// Equality rule for hard-link deduplication
    pub match_policy: MatchPolicy,
    /// Plan the run without writing anything
    pub dry_run: bool,
    /// Progress callback invoked per transferred entry
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            match_policy: MatchPolicy::default(),
            dry_run: false,
            progress_callback: None,
        }
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("match_policy", &self.match_policy)
            .field("dry_run", &self.dry_run)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

/// Statistics about one backup run
///
/// Counts are per entry transferred into the snapshot. `bytes_linked` is the
/// logical size of hard-linked files; it costs no new disk space.
///
/// # Examples
///
/// ```rust
/// # use snaplink::types::SyncStats;
/// let stats = SyncStats {
///     files_linked: 90,
///     files_copied: 10,
///     bytes_linked: 900_000,
///     bytes_copied: 100_000,
///     ..Default::default()
/// };
///
/// assert_eq!(stats.files_total(), 100);
/// assert_eq!(stats.bytes_total(), 1_000_000);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Files hard-linked against the previous snapshot
    pub files_linked: usize,
    /// Files copied from the source
    pub files_copied: usize,
    /// Directories created
    pub dirs_created: usize,
    /// Symbolic links recreated
    pub symlinks_recreated: usize,
    /// Logical bytes served by hard links
    pub bytes_linked: u64,
    /// Bytes physically copied
    pub bytes_copied: u64,
    /// Top-level entries skipped by exclusion rules
    pub entries_excluded: usize,
}

impl SyncStats {
    /// Total regular files placed in the snapshot
    pub fn files_total(&self) -> usize {
        self.files_linked + self.files_copied
    }

    /// Logical size of the snapshot's regular files
    pub fn bytes_total(&self) -> u64 {
        self.bytes_linked + self.bytes_copied
    }

    /// Fraction of file bytes deduplicated via hard links (0.0 - 1.0)
    pub fn dedup_ratio(&self) -> f64 {
        let total = self.bytes_total();
        if total == 0 {
            0.0
        } else {
            self.bytes_linked as f64 / total as f64
        }
    }
}

/// Result of a completed (or planned, for dry runs) backup run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Name of the snapshot directory, e.g. `2024-06-01_14:03:59`
    pub snapshot_name: String,
    /// Absolute path of the snapshot directory
    pub snapshot_path: PathBuf,
    /// Transfer statistics
    pub stats: SyncStats,
    /// Equality rule that was applied
    pub match_policy: MatchPolicy,
    /// Whether this was a dry run (nothing was written)
    pub dry_run: bool,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

/// Progress callback for long-running operations
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Information passed to progress callbacks
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Items processed so far
    pub processed: usize,
    /// Total items to process (if known)
    pub total: Option<usize>,
    /// Bytes processed so far
    pub bytes_processed: u64,
}

impl ProgressInfo {
    /// Get progress as a percentage (0-100)
    pub fn percentage(&self) -> Option<f32> {
        match self.total {
            Some(total) if total > 0 => Some((self.processed as f32 / total as f32) * 100.0),
            _ => None,
        }
    }
}
