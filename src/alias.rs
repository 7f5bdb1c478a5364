//! The `latest` alias
//!
//! Every backup root carries at most one symlink named `latest` pointing at
//! the most recent complete snapshot. The alias is repointed by staging a
//! new symlink under a temporary name and renaming it over the old one.
//! Rename is atomic on the same filesystem, so readers either see the old
//! target or the new one; there is no window where `latest` is missing.
//!
//! The symlink target is the snapshot's bare directory name rather than an
//! absolute path, so a backup root that gets moved or remounted keeps a
//! working alias.

use crate::error::{Result, SnaplinkError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the alias symlink under the backup root
pub const ALIAS_NAME: &str = "latest";

/// Staging name used while repointing the alias
const STAGE_NAME: &str = "latest.tmp";

/// Path of the alias symlink for a backup root
pub fn alias_path(backup_root: &Path) -> PathBuf {
    backup_root.join(ALIAS_NAME)
}

/// Read the raw target of the alias, if the alias exists
///
/// Returns `Ok(None)` when there is no alias. An entry named `latest` that
/// is not a symlink is reported as absent; the next successful run renames
/// a symlink over it or fails with [`SnaplinkError::AliasUpdateFailed`].
pub fn read_target(backup_root: &Path) -> Result<Option<PathBuf>> {
    match fs::read_link(alias_path(backup_root)) {
        Ok(target) => Ok(Some(target)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
            warn!("alias entry {:?} is not a symlink", alias_path(backup_root));
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Resolve the alias to an absolute path under the backup root
///
/// Relative targets (the normal case) are joined onto the backup root.
/// Returns `Ok(None)` when there is no alias. The returned path is not
/// checked for existence.
pub fn resolve(backup_root: &Path) -> Result<Option<PathBuf>> {
    Ok(read_target(backup_root)?.map(|target| {
        if target.is_absolute() {
            target
        } else {
            backup_root.join(target)
        }
    }))
}

/// Atomically repoint the alias at a snapshot
///
/// Stages a symlink named `latest.tmp` with the snapshot's directory name
/// as target, then renames it over `latest`. A stage entry left behind by
/// an interrupted run is removed first.
///
/// # Errors
///
/// - [`SnaplinkError::AliasUpdateFailed`] if staging or the rename fails.
///   The snapshot itself is complete at this point; only the alias is
///   stale.
pub fn swap(backup_root: &Path, snapshot_name: &str) -> Result<()> {
    let alias = alias_path(backup_root);
    let staged = backup_root.join(STAGE_NAME);

    if fs::symlink_metadata(&staged).is_ok() {
        debug!("removing stale alias stage {:?}", staged);
        fs::remove_file(&staged)
            .map_err(|e| SnaplinkError::alias_update_failed(&alias, e))?;
    }

    symlink_dir_entry(Path::new(snapshot_name), &staged)
        .map_err(|e| SnaplinkError::alias_update_failed(&alias, e))?;

    if let Err(e) = fs::rename(&staged, &alias) {
        let _ = fs::remove_file(&staged);
        return Err(SnaplinkError::alias_update_failed(&alias, e));
    }

    debug!("alias {:?} -> {}", alias, snapshot_name);
    Ok(())
}

/// Create a directory symlink (Unix)
#[cfg(unix)]
fn symlink_dir_entry(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Create a directory symlink (Windows)
#[cfg(windows)]
fn symlink_dir_entry(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}
