//! Tree-level diff between two snapshots
//!
//! Compares two snapshot directories and reports which entries were
//! added, deleted, or modified between them. Paths are relative to the
//! snapshot roots, so the result reads like a change log of the source
//! tree between the two run times.
//!
//! ## Performance
//!
//! Unchanged files in consecutive snapshots are usually hard links to
//! the same inode. The diff exploits that: a pair sharing an inode is
//! identical by construction and is never read or hashed. Only pairs
//! with separate inodes fall through to the metadata (or, with
//! `checksum`, content) comparison.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use snaplink::{DiffOptions, SnapshotRunner};
//! use std::path::PathBuf;
//!
//! # fn main() -> snaplink::Result<()> {
//! let runner = SnapshotRunner::new(
//!     PathBuf::from("/home/user/documents"),
//!     PathBuf::from("/backups/documents"),
//! )?;
//! let snapshots = runner.list()?;
//! if let [.., previous, latest] = snapshots.as_slice() {
//!     let diff = runner.diff(previous, latest, DiffOptions::default())?;
//!     println!("{}", diff.summary());
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SnaplinkError};
use crate::scanner::{self, EntryKind, SourceEntry};
use crate::snapshot::Snapshot;
use crate::utils;
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Options for snapshot diffing
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Hash same-size file pairs instead of comparing modification times
    pub checksum: bool,
}

/// A file present in both snapshots with differing content or metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifiedEntry {
    /// Path relative to both snapshot roots
    pub path: PathBuf,
    /// Size in the older snapshot
    pub from_size: u64,
    /// Size in the newer snapshot
    pub to_size: u64,
}

/// Change statistics between two snapshots
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DiffStats {
    /// Entries only in the newer snapshot
    pub entries_added: usize,
    /// Entries only in the older snapshot
    pub entries_deleted: usize,
    /// Files present in both that differ
    pub files_modified: usize,
    /// Files present in both that match
    pub files_unchanged: usize,
    /// Unchanged files that share an inode across the snapshots
    pub files_linked: usize,
    /// Bytes in added files
    pub bytes_added: u64,
    /// Bytes in deleted files
    pub bytes_deleted: u64,
}

/// Differences between two snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// Name of the older snapshot
    pub from_name: String,
    /// Name of the newer snapshot
    pub to_name: String,
    /// Entries only in the newer snapshot
    pub added: Vec<PathBuf>,
    /// Entries only in the older snapshot
    pub deleted: Vec<PathBuf>,
    /// Files present in both that differ
    pub modified: Vec<ModifiedEntry>,
    /// Aggregate statistics
    pub stats: DiffStats,
}

impl SnapshotDiff {
    /// Check if the two snapshots are identical
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }

    /// Get a one-line summary of the diff
    pub fn summary(&self) -> String {
        if self.is_empty() {
            format!(
                "No changes between {} and {}",
                self.from_name, self.to_name
            )
        } else {
            format!(
                "{} added, {} deleted, {} modified between {} and {}",
                self.added.len(),
                self.deleted.len(),
                self.modified.len(),
                self.from_name,
                self.to_name
            )
        }
    }
}

/// Compute the differences between two snapshots
///
/// `from` is treated as the older side: an entry only in `to` is "added",
/// an entry only in `from` is "deleted". The snapshots may come from any
/// two runs; chronological order is the caller's reading, not a
/// requirement.
///
/// # Errors
///
/// - [`SnaplinkError::DiffFailed`] if a file pair cannot be hashed in
///   checksum mode
/// - I/O errors if either snapshot tree cannot be walked
pub fn diff_snapshots(
    from: &Snapshot,
    to: &Snapshot,
    options: DiffOptions,
) -> Result<SnapshotDiff> {
    debug!(
        "diffing {} -> {} (checksum: {})",
        from.name, to.name, options.checksum
    );

    let from_tree = scanner::walk_tree(&from.path)?;
    let to_tree = scanner::walk_tree(&to.path)?;

    let mut diff = SnapshotDiff {
        from_name: from.name.clone(),
        to_name: to.name.clone(),
        added: Vec::new(),
        deleted: Vec::new(),
        modified: Vec::new(),
        stats: DiffStats::default(),
    };

    for (rel_path, old) in &from_tree {
        if !to_tree.contains_key(rel_path) {
            diff.deleted.push(rel_path.clone());
            diff.stats.entries_deleted += 1;
            diff.stats.bytes_deleted += old.size;
        }
    }

    for (rel_path, new) in &to_tree {
        let old = match from_tree.get(rel_path) {
            Some(old) => old,
            None => {
                diff.added.push(rel_path.clone());
                diff.stats.entries_added += 1;
                diff.stats.bytes_added += new.size;
                continue;
            }
        };

        if old.kind != new.kind {
            push_modified(&mut diff, rel_path, old, new);
            continue;
        }

        match new.kind {
            EntryKind::Dir => {}
            EntryKind::Symlink => {
                if old.symlink_target != new.symlink_target {
                    push_modified(&mut diff, rel_path, old, new);
                }
            }
            EntryKind::File => {
                // Hard-linked pairs are the same inode, nothing to compare
                if shares_inode(&from.path, &to.path, rel_path) {
                    diff.stats.files_unchanged += 1;
                    diff.stats.files_linked += 1;
                } else if files_match(&from.path, &to.path, rel_path, old, new, options)? {
                    diff.stats.files_unchanged += 1;
                } else {
                    push_modified(&mut diff, rel_path, old, new);
                }
            }
        }
    }

    debug!("{}", diff.summary());
    Ok(diff)
}

fn push_modified(diff: &mut SnapshotDiff, rel_path: &Path, old: &SourceEntry, new: &SourceEntry) {
    diff.modified.push(ModifiedEntry {
        path: rel_path.to_path_buf(),
        from_size: old.size,
        to_size: new.size,
    });
    diff.stats.files_modified += 1;
}

/// Decide whether a file pair with separate inodes is unchanged
fn files_match(
    from_root: &Path,
    to_root: &Path,
    rel_path: &Path,
    old: &SourceEntry,
    new: &SourceEntry,
    options: DiffOptions,
) -> Result<bool> {
    if old.size != new.size {
        return Ok(false);
    }
    if options.checksum {
        let old_hash = hash_for_diff(&from_root.join(rel_path))?;
        let new_hash = hash_for_diff(&to_root.join(rel_path))?;
        Ok(old_hash == new_hash)
    } else {
        Ok(FileTime::from_system_time(old.modified) == FileTime::from_system_time(new.modified))
    }
}

fn shares_inode(from_root: &Path, to_root: &Path, rel_path: &Path) -> bool {
    match (
        inode_of(&from_root.join(rel_path)),
        inode_of(&to_root.join(rel_path)),
    ) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn inode_of(path: &Path) -> Option<(u64, u64)> {
    let metadata = fs::symlink_metadata(path).ok()?;
    utils::file_identity(&metadata)
}

fn hash_for_diff(path: &Path) -> Result<String> {
    utils::hash_file_content(path)
        .map_err(|e| SnaplinkError::DiffFailed(format!("failed to hash {:?}: {e}", path)))
}
