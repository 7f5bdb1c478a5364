//! The synchronizer: materializing a scan into a snapshot directory
//!
//! For every scanned entry the synchronizer recreates directories, replays
//! symbolic links verbatim, and transfers regular files. A file whose
//! counterpart in the previous snapshot matches under the configured
//! [`MatchPolicy`] is hard-linked to it, sharing the inode and costing no
//! new disk space; everything else is copied with permissions and
//! modification time preserved.
//!
//! Entries are applied in scan order, parents before children, so a parent
//! directory always exists when its contents are transferred. The first
//! failing entry aborts the run with
//! [`SnaplinkError::SyncIncomplete`](crate::SnaplinkError::SyncIncomplete);
//! the partial snapshot stays behind for inspection and the `latest` alias
//! is never touched by a failed run.
//!
//! ## Match policies
//!
//! - `SizeAndMtime` compares file size and modification time against the
//!   previous snapshot. Copies preserve mtimes, so an unchanged file keeps
//!   matching run after run.
//! - `Content` compares file size and SHA-256 hashes. Both files are read
//!   in full, trading speed for immunity to timestamp manipulation.
//!
//! A previous-snapshot file that cannot be read or hashed demotes the
//! decision to a copy instead of failing the run.

use crate::error::{Result, SnaplinkError};
use crate::scanner::{EntryKind, SourceEntry, SourceScan};
use crate::types::{MatchPolicy, ProgressCallback, ProgressInfo, SyncStats};
use crate::utils;
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, trace, warn};

/// Transfers one scanned source tree into one snapshot directory
pub struct Synchronizer {
    source: PathBuf,
    snapshot: PathBuf,
    previous: Option<PathBuf>,
    match_policy: MatchPolicy,
    progress_callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("source", &self.source)
            .field("snapshot", &self.snapshot)
            .field("previous", &self.previous)
            .field("match_policy", &self.match_policy)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl Synchronizer {
    /// Create a synchronizer for one run
    ///
    /// # Arguments
    ///
    /// * `source` - Source root the scan was taken from
    /// * `snapshot` - Snapshot directory to fill (must already exist)
    /// * `previous` - Previous snapshot to hard-link against, if any
    /// * `match_policy` - Equality rule for link-vs-copy decisions
    pub fn new(
        source: PathBuf,
        snapshot: PathBuf,
        previous: Option<PathBuf>,
        match_policy: MatchPolicy,
    ) -> Self {
        Self {
            source,
            snapshot,
            previous,
            match_policy,
            progress_callback: None,
        }
    }

    /// Attach a progress callback invoked once per transferred entry
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Apply a scan to the snapshot directory
    ///
    /// # Errors
    ///
    /// - [`SnaplinkError::SyncIncomplete`] on the first entry that fails to
    ///   transfer. Entries already written stay in place.
    #[instrument(skip(self, scan))]
    pub fn sync(&self, scan: &SourceScan) -> Result<SyncStats> {
        debug!(
            "syncing {} entries into {:?} (previous: {:?})",
            scan.entries.len(),
            self.snapshot,
            self.previous
        );

        let mut stats = SyncStats {
            entries_excluded: scan.entries_excluded,
            ..Default::default()
        };

        utils::set_permissions(&self.snapshot, scan.root_permissions)
            .map_err(|e| demote_to_sync_error(&self.snapshot, e))?;

        let total = scan.entries.len();
        for (index, entry) in scan.entries.iter().enumerate() {
            self.sync_entry(entry, &mut stats)?;
            self.report_progress(entry, index + 1, total, &stats);
        }

        debug!(
            "sync complete: {} linked, {} copied, {} dirs, {} symlinks",
            stats.files_linked, stats.files_copied, stats.dirs_created, stats.symlinks_recreated
        );
        Ok(stats)
    }

    /// Decide what a run would do, without writing anything
    ///
    /// Produces the same statistics [`sync`](Self::sync) would report. With
    /// [`MatchPolicy::Content`] the planning still reads file contents to
    /// hash them; it only skips the writes.
    #[instrument(skip(self, scan))]
    pub fn plan(&self, scan: &SourceScan) -> Result<SyncStats> {
        let mut stats = SyncStats {
            entries_excluded: scan.entries_excluded,
            ..Default::default()
        };

        for entry in &scan.entries {
            match entry.kind {
                EntryKind::Dir => stats.dirs_created += 1,
                EntryKind::Symlink => stats.symlinks_recreated += 1,
                EntryKind::File => {
                    if self.link_source(entry).is_some() {
                        stats.files_linked += 1;
                        stats.bytes_linked += entry.size;
                    } else {
                        stats.files_copied += 1;
                        stats.bytes_copied += entry.size;
                    }
                }
            }
        }

        Ok(stats)
    }

    fn sync_entry(&self, entry: &SourceEntry, stats: &mut SyncStats) -> Result<()> {
        let dest = self.snapshot.join(&entry.rel_path);

        match entry.kind {
            EntryKind::Dir => {
                fs::create_dir_all(&dest).map_err(|e| SnaplinkError::sync_incomplete(&dest, e))?;
                utils::set_permissions(&dest, entry.permissions)
                    .map_err(|e| demote_to_sync_error(&dest, e))?;
                stats.dirs_created += 1;
            }
            EntryKind::Symlink => {
                // Recreate with the literal scanned target, dangling or not
                let target = entry
                    .symlink_target
                    .as_deref()
                    .unwrap_or_else(|| Path::new(""));
                utils::create_symlink(target, &dest)
                    .map_err(|e| demote_to_sync_error(&dest, e))?;
                trace!("symlink {:?} -> {:?}", entry.rel_path, target);
                stats.symlinks_recreated += 1;
            }
            EntryKind::File => {
                if let Some(prev) = self.link_source(entry) {
                    match fs::hard_link(&prev, &dest) {
                        Ok(()) => {
                            trace!("linked {:?}", entry.rel_path);
                            stats.files_linked += 1;
                            stats.bytes_linked += entry.size;
                            return Ok(());
                        }
                        Err(e) => {
                            warn!(
                                "hard link failed for {:?}, copying instead: {}",
                                entry.rel_path, e
                            );
                        }
                    }
                }

                let source = self.source.join(&entry.rel_path);
                let bytes = utils::copy_preserving(&source, &dest)
                    .map_err(|e| demote_to_sync_error(&dest, e))?;
                trace!("copied {:?} ({} bytes)", entry.rel_path, bytes);
                stats.files_copied += 1;
                stats.bytes_copied += bytes;
            }
        }

        Ok(())
    }

    /// Previous-snapshot path this file may be hard-linked to, if it
    /// matches under the configured policy
    fn link_source(&self, entry: &SourceEntry) -> Option<PathBuf> {
        let previous = self.previous.as_ref()?;
        let prev_path = previous.join(&entry.rel_path);

        let prev_meta = fs::symlink_metadata(&prev_path).ok()?;
        if !prev_meta.is_file() || prev_meta.len() != entry.size {
            return None;
        }

        let matches = match self.match_policy {
            MatchPolicy::SizeAndMtime => {
                FileTime::from_last_modification_time(&prev_meta)
                    == FileTime::from_system_time(entry.modified)
            }
            MatchPolicy::Content => {
                let source_path = self.source.join(&entry.rel_path);
                match (
                    utils::hash_file_content(&source_path),
                    utils::hash_file_content(&prev_path),
                ) {
                    (Ok(source_hash), Ok(prev_hash)) => source_hash == prev_hash,
                    (Err(e), _) | (_, Err(e)) => {
                        warn!(
                            "content comparison failed for {:?}, copying instead: {}",
                            entry.rel_path, e
                        );
                        false
                    }
                }
            }
        };

        matches.then_some(prev_path)
    }

    fn report_progress(&self, entry: &SourceEntry, processed: usize, total: usize, stats: &SyncStats) {
        if let Some(callback) = &self.progress_callback {
            callback(ProgressInfo {
                operation: "sync".to_string(),
                current_item: Some(entry.rel_path.display().to_string()),
                processed,
                total: Some(total),
                bytes_processed: stats.bytes_total(),
            });
        }
    }
}

/// Map attribute and link errors onto the entry that failed
fn demote_to_sync_error(path: &Path, error: SnaplinkError) -> SnaplinkError {
    match error {
        SnaplinkError::Io(io) => SnaplinkError::sync_incomplete(path, io),
        other => other,
    }
}
