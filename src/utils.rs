//! Utility functions for snaplink
//!
//! This module provides common utility functions used throughout the snaplink
//! library, including file hashing, metadata extraction, mtime-preserving
//! copies, hard-link identity, and cross-platform symlink helpers.
//!
//! ## Categories of Utilities
//!
//! ### File Operations
//! - File content hashing (SHA-256)
//! - File metadata extraction
//! - Copying with permissions and modification time preserved
//! - Permission handling (cross-platform)
//! - Symbolic link operations
//!
//! ### Identity
//! - `(device, inode)` identity for hard-link detection
//!
//! ### Display Helpers
//! - Byte formatting (human-readable sizes)
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use crate::utils::{hash_file_content, format_bytes};
//! use std::path::Path;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hash = hash_file_content(Path::new("example.txt"))?;
//! assert_eq!(hash.len(), 64); // SHA-256 hex
//!
//! assert_eq!(format_bytes(1536), "1.50 KB");
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! All utility functions are thread-safe and can be called concurrently from
//! multiple threads without synchronization.

use crate::error::Result;
use filetime::FileTime;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

/// Hash a file's content efficiently using SHA-256
///
/// Computes the SHA-256 hash of a file's content using buffered I/O for
/// optimal performance with large files. The entire file is read and
/// hashed in chunks to minimize memory usage.
///
/// # Arguments
///
/// * `path` - Path to the file to hash
///
/// # Returns
///
/// Returns the SHA-256 hash as a 64-character hexadecimal string.
///
/// # Errors
///
/// - [`SnaplinkError::Io`](crate::SnaplinkError::Io) if the file cannot
///   be opened or read
///
/// # Performance
///
/// - Uses 8KB buffer for efficient I/O
/// - Streaming approach minimizes memory usage
/// - Thread-safe and can be called concurrently
pub fn hash_file_content(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192]; // 8KB buffer

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Get file metadata safely
///
/// Extracts size, permissions, modification time, and symbolic link status.
/// Uses `symlink_metadata` to avoid following symbolic links.
///
/// # Errors
///
/// - [`SnaplinkError::Io`](crate::SnaplinkError::Io) if the file doesn't
///   exist or cannot be accessed
pub fn get_file_metadata(path: &Path) -> Result<FileMetadata> {
    let metadata = fs::symlink_metadata(path)?;

    Ok(FileMetadata {
        size: metadata.len(),
        permissions: get_permissions(&metadata),
        modified: metadata.modified()?,
        is_symlink: metadata.file_type().is_symlink(),
    })
}

/// File metadata container
///
/// Unified cross-platform view of the attributes the sync engine cares
/// about. On Windows, permissions are mapped from file attributes
/// (read-only files map to 0o444, writable files to 0o644).
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// File size in bytes (0 for directories)
    pub size: u64,
    /// Unix-style permissions (e.g., 0o644 for rw-r--r--)
    pub permissions: u32,
    /// Last modification timestamp
    pub modified: SystemTime,
    /// Whether this is a symbolic link
    pub is_symlink: bool,
}

/// Get Unix permissions from metadata
#[cfg(unix)]
fn get_permissions(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

/// Get permissions from metadata (Windows implementation)
#[cfg(windows)]
fn get_permissions(metadata: &fs::Metadata) -> u32 {
    use std::os::windows::fs::MetadataExt;

    let attrs = metadata.file_attributes();
    let mut mode = 0o644;

    if attrs & 0x01 != 0 {
        // FILE_ATTRIBUTE_READONLY
        mode = 0o444;
    }

    if metadata.is_dir() {
        mode |= 0o111;
    }

    mode
}

/// Set Unix permissions
#[cfg(unix)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let permissions = fs::Permissions::from_mode(mode);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

/// Set permissions (Windows implementation)
#[cfg(windows)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    let is_readonly = (mode & 0o200) == 0;

    let metadata = fs::metadata(path)?;
    let mut perms = metadata.permissions();
    perms.set_readonly(is_readonly);
    fs::set_permissions(path, perms)?;

    Ok(())
}

/// Copy a file preserving permissions and modification time
///
/// The snapshot copy must carry the source's mtime: the next run compares
/// source mtimes against snapshot mtimes to decide whether a file may be
/// hard-linked, and a copy stamped with its creation time would never match.
///
/// Metadata is captured before the copy. If the source is written while the
/// copy is in flight, the snapshot keeps the older timestamp and the next
/// run re-copies the file instead of linking stale bytes forward.
///
/// # Arguments
///
/// * `source` - File to copy
/// * `dest` - Destination path (parent directory must exist)
///
/// # Returns
///
/// Returns the number of bytes copied.
///
/// # Errors
///
/// - [`SnaplinkError::Io`](crate::SnaplinkError::Io) if the copy or any
///   attribute update fails
pub fn copy_preserving(source: &Path, dest: &Path) -> Result<u64> {
    let metadata = fs::metadata(source)?;
    let mtime = FileTime::from_last_modification_time(&metadata);

    let bytes = fs::copy(source, dest)?;

    set_permissions(dest, get_permissions(&metadata))?;
    filetime::set_file_mtime(dest, mtime)?;

    Ok(bytes)
}

/// `(device, inode)` identity of a file, where the platform exposes one
///
/// Two paths with equal identity are the same underlying file (hard links
/// to one inode). Returns `None` on platforms without a stable identity.
#[cfg(unix)]
pub fn file_identity(metadata: &fs::Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((metadata.dev(), metadata.ino()))
}

/// `(device, inode)` identity of a file (Windows implementation)
#[cfg(windows)]
pub fn file_identity(_metadata: &fs::Metadata) -> Option<(u64, u64)> {
    None
}

/// Format bytes in human-readable form
///
/// Converts a byte count into a human-readable string using binary units
/// (1024-based).
///
/// # Example
///
/// ```rust,ignore
/// use crate::utils::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(1023), "1023 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// assert_eq!(format_bytes(1_048_576), "1.00 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Create a symlink (cross-platform)
#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    use std::os::unix::fs::symlink;
    symlink(target, link)?;
    Ok(())
}

/// Create a symlink (Windows)
#[cfg(windows)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    if target.is_dir() {
        symlink_dir(target, link)?;
    } else {
        symlink_file(target, link)?;
    }
    Ok(())
}
