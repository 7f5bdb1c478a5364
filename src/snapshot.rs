//! Snapshot naming and discovery
//!
//! A snapshot is a plain directory under the backup root whose name is the
//! local wall-clock time the run started, formatted as
//! `YYYY-MM-DD_HH:MM:SS`. The format zero-pads every component, so the
//! lexicographic order of snapshot names is their chronological order and
//! listing a backup root needs no metadata beyond the directory names.
//!
//! Nothing else is persisted: the backup root holds snapshot directories,
//! the `latest` symlink, and whatever unrelated entries the user keeps
//! there. Unrelated entries are ignored.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use snaplink::snapshot::{list_snapshots, read_latest};
//! use std::path::Path;
//!
//! # fn example() -> snaplink::Result<()> {
//! let root = Path::new("/backups");
//! for snap in list_snapshots(root)? {
//!     println!("{}", snap.name);
//! }
//! if let Some(latest) = read_latest(root)? {
//!     println!("latest -> {}", latest.name);
//! }
//! # Ok(())
//! # }
//! ```

use crate::alias;
use crate::error::{Result, SnaplinkError};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Snapshot directory name format (local time, second granularity)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// One snapshot directory under a backup root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Directory name, e.g. `2024-06-01_14:03:59`
    pub name: String,
    /// Absolute path of the snapshot directory
    pub path: PathBuf,
    /// Timestamp parsed from the name (local wall-clock time)
    pub timestamp: NaiveDateTime,
}

impl Snapshot {
    /// Build a `Snapshot` from an existing directory
    ///
    /// # Errors
    ///
    /// - [`SnaplinkError::InvalidSnapshotName`] if the directory name does
    ///   not parse as a snapshot timestamp
    pub fn from_dir(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .ok_or_else(|| SnaplinkError::InvalidSnapshotName(path.display().to_string()))?
            .to_str()
            .ok_or_else(|| SnaplinkError::PathConversion(path.as_os_str().to_os_string()))?
            .to_string();
        let timestamp = parse_snapshot_name(&name)?;

        Ok(Self {
            name,
            path: path.to_path_buf(),
            timestamp,
        })
    }
}

/// Format a timestamp as a snapshot directory name
pub fn format_snapshot_name(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Snapshot name for the current local time
pub fn snapshot_name_now() -> String {
    format_snapshot_name(Local::now().naive_local())
}

/// Parse a snapshot directory name back into its timestamp
///
/// # Errors
///
/// - [`SnaplinkError::InvalidSnapshotName`] if the name does not match
///   `YYYY-MM-DD_HH:MM:SS`
pub fn parse_snapshot_name(name: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(name, TIMESTAMP_FORMAT)
        .map_err(|_| SnaplinkError::InvalidSnapshotName(name.to_string()))
}

/// List the snapshots under a backup root, oldest first
///
/// Entries whose names do not parse as snapshot timestamps (the `latest`
/// alias, lock files, anything the user keeps alongside) are skipped.
/// Symlinks are skipped even when their names look like snapshots; only
/// real directories count.
///
/// # Errors
///
/// - [`SnaplinkError::Io`] if the backup root cannot be read
pub fn list_snapshots(backup_root: &Path) -> Result<Vec<Snapshot>> {
    let mut snapshots = Vec::new();

    for entry in fs::read_dir(backup_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        let name = match file_name.to_str() {
            Some(name) => name,
            None => continue,
        };
        let timestamp = match parse_snapshot_name(name) {
            Ok(timestamp) => timestamp,
            Err(_) => continue,
        };
        snapshots.push(Snapshot {
            name: name.to_string(),
            path: entry.path(),
            timestamp,
        });
    }

    // Zero-padded names sort chronologically.
    snapshots.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(snapshots)
}

/// Locate the snapshot the `latest` alias points at
///
/// Returns `Ok(None)` when the alias does not exist (first run) and also
/// when it dangles or points at something that is not a snapshot directory.
/// A broken alias downgrades the run to a full copy instead of failing it;
/// the alias gets repaired when the run succeeds.
///
/// # Errors
///
/// - [`SnaplinkError::Io`] if reading the alias fails for reasons other
///   than absence
pub fn read_latest(backup_root: &Path) -> Result<Option<Snapshot>> {
    let target = match alias::resolve(backup_root)? {
        Some(target) => target,
        None => return Ok(None),
    };

    if !target.is_dir() {
        warn!("latest alias points at missing snapshot {:?}", target);
        return Ok(None);
    }

    match Snapshot::from_dir(&target) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(_) => {
            warn!("latest alias points at non-snapshot entry {:?}", target);
            Ok(None)
        }
    }
}
