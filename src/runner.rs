//! The snapshot runner: one `run()` per backup
//!
//! `SnapshotRunner` ties the pipeline together. Each run:
//!
//! 1. Validates that the source directory exists and is readable
//! 2. Ensures the backup root exists
//! 3. Takes the exclusive backup-root lock for the rest of the run
//! 4. Computes the timestamped snapshot name and refuses to reuse one
//! 5. Resolves the `latest` alias to find the previous snapshot
//! 6. Scans the source tree (exclusions applied at the top level)
//! 7. Creates the snapshot directory and syncs the scan into it,
//!    hard-linking files that match the previous snapshot
//! 8. Atomically repoints `latest` at the finished snapshot
//!
//! Failures map onto the stage they occur in: source validation and scan
//! errors leave the backup root untouched, transfer errors leave a partial
//! snapshot behind with the alias still on the previous snapshot, and an
//! alias failure leaves a complete snapshot that `latest` does not point
//! at yet. Nothing is rolled back.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use snaplink::{RunOptions, SnapshotRunner};
//! use std::path::PathBuf;
//!
//! # fn main() -> snaplink::Result<()> {
//! let runner = SnapshotRunner::new(
//!     PathBuf::from("/home/user/documents"),
//!     PathBuf::from("/backups/documents"),
//! )?;
//!
//! let report = runner.run(RunOptions::default())?;
//! println!(
//!     "snapshot {} ({} linked, {} copied)",
//!     report.snapshot_name, report.stats.files_linked, report.stats.files_copied
//! );
//! # Ok(())
//! # }
//! ```

use crate::diff::{self, DiffOptions, SnapshotDiff};
use crate::error::{Result, SnaplinkError};
use crate::exclude::ExcludeList;
use crate::lock::BackupLock;
use crate::scanner;
use crate::snapshot::{self, Snapshot};
use crate::stats::{self, LinkStats};
use crate::sync::Synchronizer;
use crate::types::{RunOptions, RunReport};
use crate::verify::{self, VerifyOptions, VerifyReport};
use crate::{alias, utils};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Incremental snapshot runner for one source/backup-root pair
///
/// The runner keeps no state between runs; everything it needs lives in
/// the backup root's directory tree. It is therefore cheap to construct
/// and safe to recreate for every invocation.
#[derive(Debug, Clone)]
pub struct SnapshotRunner {
    source: PathBuf,
    backup_root: PathBuf,
    excludes: ExcludeList,
    hash_workers: usize,
}

impl SnapshotRunner {
    /// Create a runner with default settings
    ///
    /// Uses the default exclusion list (`.cache`) and one hash worker per
    /// CPU for checksum verification. Use [`SnapshotRunner::builder`] for
    /// custom settings.
    ///
    /// # Errors
    ///
    /// Never fails with the default exclusion list; the `Result` mirrors
    /// the builder path.
    pub fn new(source: PathBuf, backup_root: PathBuf) -> Result<Self> {
        SnapshotRunnerBuilder::new().build(source, backup_root)
    }

    /// Start building a runner with custom settings
    pub fn builder() -> SnapshotRunnerBuilder {
        SnapshotRunnerBuilder::new()
    }

    /// Source directory this runner backs up
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Backup root this runner writes into
    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Take one snapshot
    ///
    /// Executes the full pipeline described in the module docs and returns
    /// a [`RunReport`]. With `options.dry_run` set, nothing is written at
    /// all: no backup root, no lock file, no snapshot, no alias update;
    /// the report carries the planned statistics instead.
    ///
    /// # Errors
    ///
    /// - [`SnaplinkError::SourceUnavailable`] if the source is missing or
    ///   unreadable (no snapshot directory is created)
    /// - [`SnaplinkError::DestinationUnavailable`] if the backup root or
    ///   snapshot directory cannot be created
    /// - [`SnaplinkError::LockHeld`] if another run is in progress
    /// - [`SnaplinkError::SnapshotExists`] if a snapshot with this second's
    ///   name already exists
    /// - [`SnaplinkError::SyncIncomplete`] if a transfer fails; the partial
    ///   snapshot is left in place and `latest` is not updated
    /// - [`SnaplinkError::AliasUpdateFailed`] if the snapshot completed but
    ///   `latest` could not be repointed
    #[instrument(skip(self, options), fields(source = ?self.source, backup_root = ?self.backup_root))]
    pub fn run(&self, options: RunOptions) -> Result<RunReport> {
        let start = Instant::now();
        info!(
            "starting backup run ({}{})",
            options.match_policy.as_str(),
            if options.dry_run { ", dry run" } else { "" }
        );

        scanner::validate_source(&self.source)?;

        if options.dry_run {
            return self.plan_run(options, start);
        }

        fs::create_dir_all(&self.backup_root)
            .map_err(|e| SnaplinkError::destination_unavailable(&self.backup_root, e))?;

        // Held for the rest of the run; released on drop
        let _lock = BackupLock::acquire(&self.backup_root)?;

        let snapshot_name = snapshot::snapshot_name_now();
        let snapshot_path = self.backup_root.join(&snapshot_name);
        if fs::symlink_metadata(&snapshot_path).is_ok() {
            return Err(SnaplinkError::SnapshotExists(snapshot_name));
        }

        let previous = snapshot::read_latest(&self.backup_root)?;
        debug!(
            "previous snapshot: {:?}",
            previous.as_ref().map(|s| s.name.as_str())
        );

        let scan = scanner::scan_source(&self.source, &self.excludes)?;
        debug!(
            "scanned {} entries ({} files, {})",
            scan.entries.len(),
            scan.files,
            utils::format_bytes(scan.file_bytes)
        );

        fs::create_dir(&snapshot_path)
            .map_err(|e| SnaplinkError::destination_unavailable(&snapshot_path, e))?;

        let mut synchronizer = Synchronizer::new(
            self.source.clone(),
            snapshot_path.clone(),
            previous.map(|s| s.path),
            options.match_policy,
        );
        if let Some(callback) = options.progress_callback {
            synchronizer = synchronizer.with_progress(callback);
        }
        let stats = synchronizer.sync(&scan)?;

        alias::swap(&self.backup_root, &snapshot_name)?;

        let report = RunReport {
            snapshot_name,
            snapshot_path,
            stats,
            match_policy: options.match_policy,
            dry_run: false,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "snapshot {} complete in {}ms ({} linked, {} copied, {} copied bytes)",
            report.snapshot_name,
            report.duration_ms,
            report.stats.files_linked,
            report.stats.files_copied,
            utils::format_bytes(report.stats.bytes_copied)
        );
        Ok(report)
    }

    /// The dry-run half of [`run`](Self::run): plan without writing
    fn plan_run(&self, options: RunOptions, start: Instant) -> Result<RunReport> {
        let snapshot_name = snapshot::snapshot_name_now();
        let snapshot_path = self.backup_root.join(&snapshot_name);

        // A missing backup root means a first run: everything is a copy
        let previous = if self.backup_root.is_dir() {
            snapshot::read_latest(&self.backup_root)?
        } else {
            None
        };

        let scan = scanner::scan_source(&self.source, &self.excludes)?;
        let synchronizer = Synchronizer::new(
            self.source.clone(),
            snapshot_path.clone(),
            previous.map(|s| s.path),
            options.match_policy,
        );
        let stats = synchronizer.plan(&scan)?;

        let report = RunReport {
            snapshot_name,
            snapshot_path,
            stats,
            match_policy: options.match_policy,
            dry_run: true,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "dry run complete in {}ms ({} would link, {} would copy)",
            report.duration_ms, report.stats.files_linked, report.stats.files_copied
        );
        Ok(report)
    }

    /// List the snapshots under the backup root, oldest first
    ///
    /// # Errors
    ///
    /// - [`SnaplinkError::DestinationUnavailable`] if the backup root does
    ///   not exist or cannot be read
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        snapshot::list_snapshots(&self.backup_root).map_err(|e| self.root_error(e))
    }

    /// The snapshot the `latest` alias points at, if any
    ///
    /// # Errors
    ///
    /// - [`SnaplinkError::DestinationUnavailable`] if the backup root does
    ///   not exist or cannot be read
    pub fn latest(&self) -> Result<Option<Snapshot>> {
        if !self.backup_root.is_dir() {
            return Err(SnaplinkError::destination_unavailable(
                &self.backup_root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "backup root not found"),
            ));
        }
        snapshot::read_latest(&self.backup_root).map_err(|e| self.root_error(e))
    }

    /// Resolve a snapshot by its directory name
    ///
    /// # Errors
    ///
    /// - [`SnaplinkError::InvalidSnapshotName`] if the name does not parse
    /// - [`SnaplinkError::SnapshotNotFound`] if no such snapshot exists
    pub fn resolve_snapshot(&self, name: &str) -> Result<Snapshot> {
        snapshot::parse_snapshot_name(name)?;
        let path = self.backup_root.join(name);
        if !path.is_dir() {
            return Err(SnaplinkError::SnapshotNotFound(name.to_string()));
        }
        Snapshot::from_dir(&path)
    }

    /// Compare a snapshot against the current source tree
    ///
    /// Uses this runner's exclusion list so that excluded source entries
    /// are not reported as missing from the snapshot. See
    /// [`verify::verify_snapshot`] for the comparison rules.
    pub fn verify(&self, snapshot: &Snapshot, options: VerifyOptions) -> Result<VerifyReport> {
        verify::verify_snapshot(
            &self.source,
            snapshot,
            &self.excludes,
            self.hash_workers,
            options,
        )
    }

    /// Compare two snapshots
    pub fn diff(&self, from: &Snapshot, to: &Snapshot, options: DiffOptions) -> Result<SnapshotDiff> {
        diff::diff_snapshots(from, to, options)
    }

    /// Deduplication accounting across all snapshots in the backup root
    pub fn link_stats(&self) -> Result<LinkStats> {
        stats::link_stats(&self.backup_root).map_err(|e| self.root_error(e))
    }

    /// Map bare I/O errors from backup-root reads to the destination stage
    fn root_error(&self, error: SnaplinkError) -> SnaplinkError {
        match error {
            SnaplinkError::Io(io) => {
                SnaplinkError::destination_unavailable(&self.backup_root, io)
            }
            other => other,
        }
    }
}

/// Builder pattern for `SnapshotRunner` configuration
///
/// # Examples
///
/// ```rust,no_run
/// use snaplink::SnapshotRunner;
/// use std::path::PathBuf;
///
/// # fn main() -> snaplink::Result<()> {
/// let runner = SnapshotRunner::builder()
///     .exclude_patterns(vec![".cache".to_string(), "*.tmp".to_string()])
///     .hash_workers(4)
///     .build(
///         PathBuf::from("/home/user/documents"),
///         PathBuf::from("/backups/documents"),
///     )?;
/// # Ok(())
/// # }
/// ```
///
/// # Default Values
///
/// - `exclude_patterns`: `.cache`
/// - `hash_workers`: number of CPU cores
#[derive(Debug)]
pub struct SnapshotRunnerBuilder {
    exclude_patterns: Vec<String>,
    hash_workers: usize,
}

impl SnapshotRunnerBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            exclude_patterns: crate::exclude::DEFAULT_EXCLUDES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            hash_workers: num_cpus::get(),
        }
    }

    /// Set the top-level exclusion patterns, replacing the defaults
    ///
    /// Patterns match names of entries directly under the source root.
    /// Pass an empty vector to exclude nothing.
    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    /// Set the number of worker threads for checksum verification
    ///
    /// Only `verify` with checksums uses these workers; the backup run
    /// itself is single-threaded. Values less than 1 become 1.
    pub fn hash_workers(mut self, count: usize) -> Self {
        self.hash_workers = count.max(1);
        self
    }

    /// Build the runner
    ///
    /// # Errors
    ///
    /// - [`SnaplinkError::InvalidPattern`] if an exclusion pattern fails to
    ///   compile
    pub fn build(self, source: PathBuf, backup_root: PathBuf) -> Result<SnapshotRunner> {
        let excludes = ExcludeList::new(&self.exclude_patterns)?;
        Ok(SnapshotRunner {
            source,
            backup_root,
            excludes,
            hash_workers: self.hash_workers,
        })
    }
}

impl Default for SnapshotRunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
