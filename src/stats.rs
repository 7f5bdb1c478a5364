//! Deduplication accounting across a backup root
//!
//! Snapshots share unchanged files as hard links, so the bytes a backup
//! root occupies on disk are usually far fewer than the sum of its
//! snapshot sizes. This module walks every snapshot and groups files by
//! inode to report both numbers.
//!
//! Each inode's size is attributed to the oldest snapshot containing it;
//! a snapshot's `owned_bytes` is therefore the data that first appeared
//! in it. On platforms without inode identity every file counts as
//! unique and no sharing is visible.

use crate::error::Result;
use crate::scanner::{self, EntryKind};
use crate::snapshot;
use crate::utils;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Disk usage of one snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotUsage {
    /// Snapshot directory name
    pub name: String,
    /// Number of file entries
    pub file_count: usize,
    /// Sum of file sizes as listed
    pub logical_bytes: u64,
    /// Bytes of inodes that first appeared in this snapshot
    pub owned_bytes: u64,
}

/// Deduplication statistics for a whole backup root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkStats {
    /// Number of snapshots
    pub snapshot_count: usize,
    /// File entries across all snapshots
    pub file_count: usize,
    /// Distinct inodes across all snapshots
    pub unique_file_count: usize,
    /// Sum of file sizes across all snapshots
    pub logical_bytes: u64,
    /// Bytes actually occupied on disk
    pub physical_bytes: u64,
    /// Per-snapshot breakdown, oldest first
    pub per_snapshot: Vec<SnapshotUsage>,
}

impl LinkStats {
    /// Bytes saved by hard-link sharing
    pub fn saved_bytes(&self) -> u64 {
        self.logical_bytes.saturating_sub(self.physical_bytes)
    }

    /// Ratio of logical to physical bytes (1.0 when nothing is shared)
    pub fn dedup_ratio(&self) -> f64 {
        if self.physical_bytes == 0 {
            1.0
        } else {
            self.logical_bytes as f64 / self.physical_bytes as f64
        }
    }

    /// Get a one-line summary of the statistics
    pub fn summary(&self) -> String {
        format!(
            "{} snapshots, {} file entries ({} unique), {} logical, {} on disk ({} saved)",
            self.snapshot_count,
            self.file_count,
            self.unique_file_count,
            utils::format_bytes(self.logical_bytes),
            utils::format_bytes(self.physical_bytes),
            utils::format_bytes(self.saved_bytes())
        )
    }
}

/// Compute deduplication statistics for a backup root
///
/// Walks every snapshot oldest-first. The first snapshot to reference an
/// inode owns its bytes; later references are counted as shared.
///
/// # Errors
///
/// I/O errors if the backup root or a snapshot tree cannot be read.
pub fn link_stats(backup_root: &Path) -> Result<LinkStats> {
    let snapshots = snapshot::list_snapshots(backup_root)?;
    let mut stats = LinkStats {
        snapshot_count: snapshots.len(),
        ..Default::default()
    };

    let mut seen: HashSet<(u64, u64)> = HashSet::new();
    for snap in &snapshots {
        let tree = scanner::walk_tree(&snap.path)?;
        let mut usage = SnapshotUsage {
            name: snap.name.clone(),
            file_count: 0,
            logical_bytes: 0,
            owned_bytes: 0,
        };

        for entry in tree.values() {
            if entry.kind != EntryKind::File {
                continue;
            }
            usage.file_count += 1;
            usage.logical_bytes += entry.size;
            stats.file_count += 1;
            stats.logical_bytes += entry.size;

            let metadata = fs::symlink_metadata(snap.path.join(&entry.rel_path))?;
            let first_reference = match utils::file_identity(&metadata) {
                Some(id) => seen.insert(id),
                None => true,
            };
            if first_reference {
                stats.unique_file_count += 1;
                stats.physical_bytes += entry.size;
                usage.owned_bytes += entry.size;
            }
        }

        stats.per_snapshot.push(usage);
    }

    debug!("{}", stats.summary());
    Ok(stats)
}
