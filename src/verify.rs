//! Snapshot verification against the source tree
//!
//! Verification walks the source (with the same exclusion rules a run
//! uses) and the snapshot, then compares the two trees entry by entry.
//! Differences land in the report as data; an `Err` only means the
//! comparison itself could not be carried out.
//!
//! Two comparison depths are available:
//!
//! 1. **Quick** (default): entry kinds, file sizes, and file modification
//!    times. Symlinks compare by target, directories by presence.
//! 2. **Checksum**: file contents are hashed on both sides instead of
//!    trusting modification times. Much slower, catches forged metadata.
//!
//! A snapshot records the source as it was when the run happened. Editing
//! the source afterwards makes verification report those edits as
//! mismatches; that is the expected reading, not corruption.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use snaplink::{SnapshotRunner, VerifyOptions};
//! use std::path::PathBuf;
//!
//! # fn main() -> snaplink::Result<()> {
//! let runner = SnapshotRunner::new(
//!     PathBuf::from("/home/user/documents"),
//!     PathBuf::from("/backups/documents"),
//! )?;
//! let latest = runner.latest()?.ok_or(snaplink::SnaplinkError::SnapshotNotFound(
//!     "latest".to_string(),
//! ))?;
//!
//! let report = runner.verify(&latest, VerifyOptions { checksum: true })?;
//! if !report.is_valid() {
//!     println!("{}", report.summary());
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SnaplinkError};
use crate::exclude::ExcludeList;
use crate::scanner::{self, EntryKind, SourceEntry};
use crate::snapshot::Snapshot;
use crate::utils;
use filetime::FileTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Options for snapshot verification
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    /// Hash file contents instead of comparing modification times
    pub checksum: bool,
}

/// What differs between a source entry and its snapshot counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Entry kinds differ (file vs directory vs symlink)
    Kind,
    /// File sizes differ
    Size,
    /// File modification times differ
    Mtime,
    /// File contents differ (checksum mode)
    Content,
    /// Symlink targets differ
    SymlinkTarget,
    /// One side could not be read during checksum comparison
    Unreadable,
}

impl MismatchKind {
    /// Short lowercase name for messages
    pub fn as_str(&self) -> &'static str {
        match self {
            MismatchKind::Kind => "kind",
            MismatchKind::Size => "size",
            MismatchKind::Mtime => "mtime",
            MismatchKind::Content => "content",
            MismatchKind::SymlinkTarget => "symlink target",
            MismatchKind::Unreadable => "unreadable",
        }
    }
}

/// One entry present on both sides but differing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mismatch {
    /// Path relative to the source and snapshot roots
    pub path: PathBuf,
    /// What differs
    pub kind: MismatchKind,
    /// Human-readable detail
    pub detail: String,
}

/// Verification report for one snapshot
///
/// `missing` lists source entries absent from the snapshot, `extra`
/// lists snapshot entries absent from the source, and `mismatched`
/// lists entries present on both sides that differ. All paths are
/// relative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Name of the verified snapshot
    pub snapshot_name: String,
    /// Source entries the snapshot lacks
    pub missing: Vec<PathBuf>,
    /// Snapshot entries the source lacks
    pub extra: Vec<PathBuf>,
    /// Entries present on both sides that differ
    pub mismatched: Vec<Mismatch>,
    /// Total source entries compared
    pub entries_checked: usize,
    /// Whether contents were hashed
    pub checksum: bool,
    /// Time taken in milliseconds
    pub verification_time_ms: u64,
}

impl VerifyReport {
    /// Check if the snapshot matches the source exactly
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.mismatched.is_empty()
    }

    /// Get a one-line summary of the verification
    pub fn summary(&self) -> String {
        if self.is_valid() {
            format!(
                "Snapshot {} matches the source ({} entries verified in {}ms)",
                self.snapshot_name, self.entries_checked, self.verification_time_ms
            )
        } else {
            format!(
                "Snapshot {} differs from the source: {} missing, {} extra, {} mismatched ({} entries in {}ms)",
                self.snapshot_name,
                self.missing.len(),
                self.extra.len(),
                self.mismatched.len(),
                self.entries_checked,
                self.verification_time_ms
            )
        }
    }
}

/// Verify a snapshot against the current source tree
///
/// # Arguments
///
/// * `source` - Source directory the snapshot was taken from
/// * `snapshot` - Snapshot to verify
/// * `excludes` - Exclusion rules the run used; excluded source entries
///   are not reported as missing
/// * `hash_workers` - Worker threads for checksum comparison
/// * `options` - Comparison depth
///
/// # Errors
///
/// - [`SnaplinkError::SourceUnavailable`] if the source cannot be scanned
/// - I/O errors if the snapshot tree cannot be walked
///
/// Differences are never errors; they are reported in the result.
pub fn verify_snapshot(
    source: &Path,
    snapshot: &Snapshot,
    excludes: &ExcludeList,
    hash_workers: usize,
    options: VerifyOptions,
) -> Result<VerifyReport> {
    let start = Instant::now();
    debug!(
        "verifying snapshot {} against {:?} (checksum: {})",
        snapshot.name, source, options.checksum
    );

    let scan = scanner::scan_source(source, excludes)?;
    let snapshot_tree = scanner::walk_tree(&snapshot.path)?;

    let mut report = VerifyReport {
        snapshot_name: snapshot.name.clone(),
        missing: Vec::new(),
        extra: Vec::new(),
        mismatched: Vec::new(),
        entries_checked: scan.entries.len(),
        checksum: options.checksum,
        verification_time_ms: 0,
    };

    // Pairs deferred to the hashing phase in checksum mode
    let mut hash_pairs: Vec<PathBuf> = Vec::new();

    for expected in &scan.entries {
        let actual = match snapshot_tree.get(&expected.rel_path) {
            Some(actual) => actual,
            None => {
                report.missing.push(expected.rel_path.clone());
                continue;
            }
        };

        if expected.kind != actual.kind {
            report.mismatched.push(Mismatch {
                path: expected.rel_path.clone(),
                kind: MismatchKind::Kind,
                detail: format!("{} vs {}", expected.kind.as_str(), actual.kind.as_str()),
            });
            continue;
        }

        match expected.kind {
            EntryKind::Dir => {}
            EntryKind::Symlink => {
                if expected.symlink_target != actual.symlink_target {
                    report.mismatched.push(Mismatch {
                        path: expected.rel_path.clone(),
                        kind: MismatchKind::SymlinkTarget,
                        detail: format!(
                            "{:?} vs {:?}",
                            expected.symlink_target, actual.symlink_target
                        ),
                    });
                }
            }
            EntryKind::File => {
                if expected.size != actual.size {
                    report.mismatched.push(Mismatch {
                        path: expected.rel_path.clone(),
                        kind: MismatchKind::Size,
                        detail: format!("{} vs {} bytes", expected.size, actual.size),
                    });
                } else if options.checksum {
                    hash_pairs.push(expected.rel_path.clone());
                } else if !same_modified(expected, actual) {
                    report.mismatched.push(Mismatch {
                        path: expected.rel_path.clone(),
                        kind: MismatchKind::Mtime,
                        detail: "modification times differ".to_string(),
                    });
                }
            }
        }
    }

    let expected_paths: HashSet<&PathBuf> = scan.entries.iter().map(|e| &e.rel_path).collect();
    for rel_path in snapshot_tree.keys() {
        if !expected_paths.contains(rel_path) {
            report.extra.push(rel_path.clone());
        }
    }

    if !hash_pairs.is_empty() {
        debug!("hashing {} file pairs", hash_pairs.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(hash_workers.max(1))
            .build()
            .map_err(|e| SnaplinkError::internal(format!("failed to build hash pool: {e}")))?;

        let content_mismatches: Vec<Option<Mismatch>> = pool.install(|| {
            hash_pairs
                .par_iter()
                .map(|rel_path| compare_contents(source, &snapshot.path, rel_path))
                .collect()
        });
        report.mismatched.extend(content_mismatches.into_iter().flatten());
    }

    report.verification_time_ms = start.elapsed().as_millis() as u64;
    info!("{}", report.summary());
    Ok(report)
}

/// Hash one file on both sides; `None` means they match
fn compare_contents(source: &Path, snapshot_root: &Path, rel_path: &Path) -> Option<Mismatch> {
    let source_hash = match utils::hash_file_content(&source.join(rel_path)) {
        Ok(h) => h,
        Err(e) => {
            return Some(Mismatch {
                path: rel_path.to_path_buf(),
                kind: MismatchKind::Unreadable,
                detail: format!("source unreadable: {e}"),
            });
        }
    };
    let snapshot_hash = match utils::hash_file_content(&snapshot_root.join(rel_path)) {
        Ok(h) => h,
        Err(e) => {
            return Some(Mismatch {
                path: rel_path.to_path_buf(),
                kind: MismatchKind::Unreadable,
                detail: format!("snapshot unreadable: {e}"),
            });
        }
    };

    (source_hash != snapshot_hash).then(|| Mismatch {
        path: rel_path.to_path_buf(),
        kind: MismatchKind::Content,
        detail: format!("{} vs {}", &source_hash[..8], &snapshot_hash[..8]),
    })
}

fn same_modified(a: &SourceEntry, b: &SourceEntry) -> bool {
    FileTime::from_system_time(a.modified) == FileTime::from_system_time(b.modified)
}
