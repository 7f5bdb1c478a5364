//! Source tree scanning
//!
//! The scanner walks the source directory once, depth-first with sorted
//! names, and produces the ordered list of entries a run will transfer.
//! Exclusion patterns apply to top-level entries only; an excluded
//! directory is pruned without descending into it.
//!
//! Scanning happens before the snapshot directory is created. A source
//! tree that cannot be fully read fails the run as source-unavailable and
//! leaves the backup root untouched.
//!
//! Symbolic links are never followed. Each link is recorded with its
//! literal target so the snapshot can recreate it verbatim, dangling or
//! not.

use crate::error::{Result, SnaplinkError};
use crate::exclude::ExcludeList;
use crate::utils;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::trace;
use walkdir::WalkDir;

/// Kind of a scanned source entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular directory
    Dir,
    /// Regular file
    File,
    /// Symbolic link (file or directory target, never followed)
    Symlink,
}

impl EntryKind {
    /// Short lowercase name for messages
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Dir => "directory",
            EntryKind::File => "file",
            EntryKind::Symlink => "symlink",
        }
    }
}

/// One entry of the source tree, relative to the source root
#[derive(Debug, Clone)]
pub struct SourceEntry {
    /// Path relative to the source root
    pub rel_path: PathBuf,
    /// Entry kind
    pub kind: EntryKind,
    /// Size in bytes (0 for directories and symlinks)
    pub size: u64,
    /// Modification time as captured at scan time
    pub modified: SystemTime,
    /// Unix-style permissions
    pub permissions: u32,
    /// Literal symlink target (symlinks only)
    pub symlink_target: Option<PathBuf>,
}

/// Result of scanning a source tree
#[derive(Debug, Clone)]
pub struct SourceScan {
    /// Entries in deterministic depth-first order, parents before children
    pub entries: Vec<SourceEntry>,
    /// Number of regular files
    pub files: usize,
    /// Total size of regular files in bytes
    pub file_bytes: u64,
    /// Top-level entries skipped by exclusion rules
    pub entries_excluded: usize,
    /// Permissions of the source root itself
    pub root_permissions: u32,
}

/// Check that the source exists, is a directory, and is readable
///
/// # Errors
///
/// - [`SnaplinkError::SourceUnavailable`] otherwise
pub fn validate_source(source: &Path) -> Result<()> {
    let metadata =
        fs::metadata(source).map_err(|e| SnaplinkError::source_unavailable(source, e))?;
    if !metadata.is_dir() {
        return Err(SnaplinkError::source_unavailable(
            source,
            io::Error::new(io::ErrorKind::Other, "not a directory"),
        ));
    }
    fs::read_dir(source)
        .map(|_| ())
        .map_err(|e| SnaplinkError::source_unavailable(source, e))
}

/// Scan a source tree into an ordered entry list
///
/// # Arguments
///
/// * `source` - Source directory to walk
/// * `excludes` - Top-level exclusion patterns
///
/// # Errors
///
/// - [`SnaplinkError::SourceUnavailable`] if any part of the tree cannot
///   be read
pub fn scan_source(source: &Path, excludes: &ExcludeList) -> Result<SourceScan> {
    validate_source(source)?;

    let root_permissions = source_metadata(source)?.permissions;
    let mut entries = Vec::new();
    let mut files = 0usize;
    let mut file_bytes = 0u64;
    let mut entries_excluded = 0usize;

    let mut walker = WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(item) = walker.next() {
        let entry = item.map_err(|e| walk_error(source, e))?;
        if entry.depth() == 0 {
            continue;
        }

        if entry.depth() == 1 {
            if let Some(name) = entry.file_name().to_str() {
                if excludes.is_excluded(name) {
                    trace!("excluding top-level entry {:?}", entry.path());
                    entries_excluded += 1;
                    if entry.file_type().is_dir() {
                        walker.skip_current_dir();
                    }
                    continue;
                }
            }
        }

        let rel_path = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| {
                SnaplinkError::internal(format!(
                    "walked entry {:?} outside source root",
                    entry.path()
                ))
            })?
            .to_path_buf();

        let metadata = source_metadata(entry.path())?;

        let file_type = entry.file_type();
        let source_entry = if file_type.is_symlink() {
            let target = fs::read_link(entry.path())
                .map_err(|e| SnaplinkError::source_unavailable(entry.path(), e))?;
            SourceEntry {
                rel_path,
                kind: EntryKind::Symlink,
                size: 0,
                modified: metadata.modified,
                permissions: metadata.permissions,
                symlink_target: Some(target),
            }
        } else if file_type.is_dir() {
            SourceEntry {
                rel_path,
                kind: EntryKind::Dir,
                size: 0,
                modified: metadata.modified,
                permissions: metadata.permissions,
                symlink_target: None,
            }
        } else {
            files += 1;
            file_bytes += metadata.size;
            SourceEntry {
                rel_path,
                kind: EntryKind::File,
                size: metadata.size,
                modified: metadata.modified,
                permissions: metadata.permissions,
                symlink_target: None,
            }
        };

        entries.push(source_entry);
    }

    Ok(SourceScan {
        entries,
        files,
        file_bytes,
        entries_excluded,
        root_permissions,
    })
}

/// Walk an existing tree into a map keyed by relative path
///
/// Unlike [`scan_source`] this applies no exclusions and reports plain
/// I/O errors; callers verifying or diffing snapshots attach their own
/// context.
pub fn walk_tree(root: &Path) -> Result<BTreeMap<PathBuf, SourceEntry>> {
    let mut entries = BTreeMap::new();

    for item in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = item?;
        if entry.depth() == 0 {
            continue;
        }

        let rel_path = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| {
                SnaplinkError::internal(format!("walked entry {:?} outside root", entry.path()))
            })?
            .to_path_buf();

        let metadata = utils::get_file_metadata(entry.path())?;
        let file_type = entry.file_type();
        let (kind, size, symlink_target) = if file_type.is_symlink() {
            (EntryKind::Symlink, 0, Some(fs::read_link(entry.path())?))
        } else if file_type.is_dir() {
            (EntryKind::Dir, 0, None)
        } else {
            (EntryKind::File, metadata.size, None)
        };

        entries.insert(
            rel_path.clone(),
            SourceEntry {
                rel_path,
                kind,
                size,
                modified: metadata.modified,
                permissions: metadata.permissions,
                symlink_target,
            },
        );
    }

    Ok(entries)
}

/// Stat an entry, mapping failures to source-unavailable
fn source_metadata(path: &Path) -> Result<utils::FileMetadata> {
    utils::get_file_metadata(path).map_err(|e| match e {
        SnaplinkError::Io(io) => SnaplinkError::source_unavailable(path, io),
        other => other,
    })
}

fn walk_error(fallback: &Path, error: walkdir::Error) -> SnaplinkError {
    let path = error
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| fallback.to_path_buf());
    match error.into_io_error() {
        Some(io) => SnaplinkError::source_unavailable(path, io),
        None => SnaplinkError::internal(format!("filesystem loop at {:?}", path)),
    }
}
