//! Live directory enumeration and the path rules shared with archives.
//!
//! Both sides of a diff name entries the same way: relative to the volume
//! root, `/`-separated, no leading `./`, no trailing `/`.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{io_err, VolumeError};

/// What sort of filesystem object an entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// Devices, fifos, sockets, hard-link records.
    Other,
}

/// The attributes a diff compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStat {
    pub kind: EntryKind,
    /// Byte length; meaningful for regular files only.
    pub size: u64,
    /// Permission bits (`mode & 0o7777`).
    pub mode: u32,
    /// Modification time, whole seconds since the epoch.
    pub mtime: u64,
    pub link_target: Option<String>,
}

/// One object found under a live mountpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveEntry {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Normalized path relative to the tree root, for display and ordering.
    pub relative: String,
    /// The same path with its bytes untouched; names that are not UTF-8
    /// survive only here.
    pub raw_relative: PathBuf,
    pub stat: EntryStat,
}

// ---------------------------------------------------------------------------
// 1. Path normalization
// ---------------------------------------------------------------------------

/// Normalize an archive member name.
///
/// Strips any leading `./` (repeated) or `/`, and trailing `/`. Returns
/// `None` for the archive's own root entry (`./`, `.`, or empty).
pub fn normalize_archive_path(raw: &str) -> Option<String> {
    let mut path = raw;
    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest;
        } else if let Some(rest) = path.strip_prefix('/') {
            path = rest;
        } else {
            break;
        }
    }
    let path = path.trim_end_matches('/');
    if path.is_empty() || path == "." {
        None
    } else {
        Some(path.to_string())
    }
}

/// `path` relative to `root`, `/`-separated. `None` for `root` itself or for
/// paths outside it.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

// ---------------------------------------------------------------------------
// 2. Enumeration
// ---------------------------------------------------------------------------

/// Every object below `root` (not `root` itself), sorted by relative path.
///
/// Symlinks are reported as links and never followed.
pub fn list_tree(root: &Path) -> Result<Vec<LiveEntry>, VolumeError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            io_err(path, std::io::Error::from(e))
        })?;
        let Some(relative) = relative_path(root, entry.path()) else {
            continue;
        };
        let raw_relative = match entry.path().strip_prefix(root) {
            Ok(raw) => raw.to_path_buf(),
            Err(_) => continue,
        };
        let stat = stat_path(entry.path())?;
        entries.push(LiveEntry {
            path: entry.into_path(),
            relative,
            raw_relative,
            stat,
        });
    }
    entries.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(entries)
}

/// `lstat` a path into an [`EntryStat`].
pub fn stat_path(path: &Path) -> Result<EntryStat, VolumeError> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| io_err(path, e))?;
    let file_type = metadata.file_type();
    let kind = if file_type.is_file() {
        EntryKind::File
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_symlink() {
        EntryKind::Symlink
    } else {
        EntryKind::Other
    };
    let link_target = if kind == EntryKind::Symlink {
        let target = std::fs::read_link(path).map_err(|e| io_err(path, e))?;
        Some(target.to_string_lossy().into_owned())
    } else {
        None
    };
    Ok(EntryStat {
        kind,
        size: if kind == EntryKind::File { metadata.len() } else { 0 },
        mode: metadata.mode() & 0o7777,
        mtime: metadata.mtime().max(0) as u64,
        link_target,
    })
}
