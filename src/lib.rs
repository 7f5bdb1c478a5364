//! # Snaplink - Incremental directory backups with hard links
//!
//! A snapshot backup library that keeps every backup browsable as a plain
//! directory tree while paying disk space only for what changed.
//!
//! ## Overview
//!
//! Snaplink mirrors a source directory into timestamped snapshot
//! directories under a backup root, allowing you to:
//! - Take a complete, browsable copy of the source on every run
//! - Pay disk space only for files that changed since the previous run;
//!   unchanged files become hard links to the previous snapshot
//! - Restore with plain `cp` - snapshots are ordinary directories, no
//!   tooling needed to read them
//! - Verify any snapshot against the source, diff two snapshots, and
//!   account for how much space hard-link sharing saves
//!
//! ## How a run works
//!
//! Each run produces one snapshot named after its local start time
//! (`2024-06-01_14:03:59`). The run scans the source, then walks the
//! entries in order: directories are recreated, symlinks are recreated
//! with their original targets, and each file is either hard-linked from
//! the snapshot the `latest` alias points at (when it is unchanged under
//! the configured match policy) or copied from the source with its
//! modification time preserved. When the whole tree is in place, `latest`
//! is atomically repointed at the new snapshot.
//!
//! A run that fails partway leaves the incomplete snapshot directory on
//! disk for inspection and never touches `latest`; the next run links
//! against the last complete snapshot as usual.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snaplink::{RunOptions, SnapshotRunner};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let runner = SnapshotRunner::new(
//!     PathBuf::from("/home/user/documents"),   // Directory to back up
//!     PathBuf::from("/backups/documents"),     // Backup root
//! )?;
//!
//! // Take a snapshot
//! let report = runner.run(RunOptions::default())?;
//! println!(
//!     "Created {} in {}ms: {} linked, {} copied",
//!     report.snapshot_name,
//!     report.duration_ms,
//!     report.stats.files_linked,
//!     report.stats.files_copied,
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Advanced Usage
//!
//! ### Custom configuration
//!
//! ```rust,no_run
//! use snaplink::SnapshotRunner;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let runner = SnapshotRunner::builder()
//!     .exclude_patterns(vec![
//!         ".cache".to_string(),
//!         "*.tmp".to_string(),
//!         "node_modules".to_string(),
//!     ])
//!     .hash_workers(8)
//!     .build(
//!         PathBuf::from("/home/user/project"),
//!         PathBuf::from("/backups/project"),
//!     )?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Verifying and diffing snapshots
//!
//! ```rust,no_run
//! # use snaplink::{DiffOptions, SnapshotRunner, VerifyOptions};
//! # use std::path::PathBuf;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let runner = SnapshotRunner::new(PathBuf::from("."), PathBuf::from("/backups"))?;
//! // Compare the newest snapshot against the source, hashing contents
//! if let Some(latest) = runner.latest()? {
//!     let report = runner.verify(&latest, VerifyOptions { checksum: true })?;
//!     println!("{}", report.summary());
//! }
//!
//! // What changed between the two newest snapshots?
//! let snapshots = runner.list()?;
//! if let [.., previous, newest] = snapshots.as_slice() {
//!     let diff = runner.diff(previous, newest, DiffOptions::default())?;
//!     println!("{}", diff.summary());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Snapshot directories
//!
//! A snapshot is a plain directory named `YYYY-MM-DD_HH:MM:SS` in local
//! time. Names have one-second granularity and zero-padded fields, so
//! lexicographic order is chronological order. A second run within the
//! same second is refused rather than merged.
//!
//! ### The `latest` alias
//!
//! `latest` is a symlink in the backup root pointing at the most recent
//! complete snapshot. It is the anchor for deduplication: the next run
//! hard-links unchanged files against whatever `latest` names. It is
//! updated atomically (staged symlink plus rename) and only after a run
//! has fully succeeded.
//!
//! ### Match policy
//!
//! A file is hard-linked instead of copied when the previous snapshot has
//! a file at the same relative path that matches under the configured
//! [`MatchPolicy`]:
//! - `SizeAndMtime` (default): same size and same modification time.
//!   Cheap, no file reads; relies on mtimes being preserved, which the
//!   copier guarantees.
//! - `Content`: same size and same SHA-256 hash. Reads both files, but
//!   immune to forged or drifting mtimes.
//!
//! ### Locking
//!
//! Runs take an advisory exclusive lock on the backup root
//! (`.snaplink.lock`), so concurrent runs against the same root fail
//! fast instead of interleaving. The lock is released when the run
//! finishes, successfully or not.
//!
//! ## Performance Considerations
//!
//! - **Hard links are cheap**: an unchanged file costs one `link()` call,
//!   no reads, no writes
//! - **`Content` policy reads every candidate file** on both sides;
//!   reserve it for trees where mtimes cannot be trusted
//! - **Verification** can hash in parallel; tune with
//!   [`SnapshotRunnerBuilder::hash_workers`]
//! - **Diffing consecutive snapshots** is fast because hard-linked pairs
//!   are recognized by inode and skipped without reading
//!
//! ## Error Handling
//!
//! All operations return `Result<T, SnaplinkError>`. Failures carry the
//! stage they belong to: [`SnaplinkError::SourceUnavailable`] and
//! [`SnaplinkError::DestinationUnavailable`] occur before anything is
//! written, [`SnaplinkError::SyncIncomplete`] marks a partial snapshot
//! left on disk, and [`SnaplinkError::AliasUpdateFailed`] means the
//! snapshot itself is complete but `latest` still names the previous one.
//!
//! ## Module Organization
//!
//! - [`runner`]: The [`SnapshotRunner`] orchestrating backup runs
//! - [`snapshot`]: Snapshot naming, listing, and alias resolution
//! - [`verify`]: Snapshot-against-source verification
//! - [`diff`]: Tree-level diff between two snapshots
//! - [`stats`]: Hard-link deduplication accounting
//! - [`exclude`]: Top-level exclusion patterns
//! - [`types`]: Common types and data structures
//! - [`error`]: Error types and handling

// Public API modules
pub mod diff;
pub mod error;
pub mod exclude;
pub mod runner;
pub mod snapshot;
pub mod stats;
pub mod types;
pub mod verify;

// Internal modules (not part of public API)
mod alias;
mod lock;
mod scanner;
mod sync;
mod utils;

// Re-export main types for convenience
pub use diff::{DiffOptions, DiffStats, ModifiedEntry, SnapshotDiff};
pub use error::{Result, SnaplinkError};
pub use exclude::{ExcludeList, DEFAULT_EXCLUDES};
pub use runner::{SnapshotRunner, SnapshotRunnerBuilder};
pub use snapshot::Snapshot;
pub use stats::{LinkStats, SnapshotUsage};
pub use types::*;
pub use verify::{Mismatch, MismatchKind, VerifyOptions, VerifyReport};
