//! Gzip-compressed tar archives: reading, unpacking, and writing.
//!
//! Archives are read through a read-only memory map so the same bytes can be
//! hashed and unpacked without a second read. The map lives exactly as long
//! as its [`ArchiveFile`].

use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::path::{Component, Path, PathBuf};

use filetime::FileTime;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use memmap2::Mmap;
use tar::{Archive, Builder, EntryType, Header, HeaderMode};
use tracing::{debug, warn};

use volumetric_core::{FileHash, HashAlgorithm};

use crate::directory::{normalize_archive_path, EntryKind, EntryStat, LiveEntry};
use crate::error::{archive_err, io_err, VolumeError};

/// One member of an archive, with its path normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub stat: EntryStat,
}

// ---------------------------------------------------------------------------
// 1. Mapped archive files
// ---------------------------------------------------------------------------

/// A read-only mapping of a `.tar.gz` file.
#[derive(Debug)]
pub struct ArchiveFile {
    path: PathBuf,
    map: Mmap,
}

impl ArchiveFile {
    /// Map `path` for reading. Empty files are rejected.
    pub fn map(path: &Path) -> Result<Self, VolumeError> {
        let file = File::open(path).map_err(|e| io_err(path, e))?;
        let len = file.metadata().map_err(|e| io_err(path, e))?.len();
        if len == 0 {
            return Err(archive_err(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, "archive is empty"),
            ));
        }
        // SAFETY: the map is read-only and private to this value. Archives are
        // replaced by rename, never rewritten in place, so the bytes under an
        // open map do not change.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| io_err(path, e))?;
        debug!(archive = %path.display(), bytes = len, "mapped archive");
        Ok(Self {
            path: path.to_path_buf(),
            map,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    /// Digest of the compressed bytes.
    pub fn hash(&self, algorithm: HashAlgorithm) -> FileHash {
        FileHash::of_bytes(algorithm, self.bytes())
    }

    /// Every entry except the root, sorted by normalized path.
    pub fn entries(&self) -> Result<Vec<ArchiveEntry>, VolumeError> {
        read_entries(&self.path, self.bytes())
    }

    /// Unpack into `destination`, returning the number of entries written.
    pub fn extract(&self, destination: &Path) -> Result<usize, VolumeError> {
        extract(&self.path, self.bytes(), destination)
    }
}

// ---------------------------------------------------------------------------
// 2. Reading
// ---------------------------------------------------------------------------

/// Decode the entry list of a gzip-compressed tar held in memory.
///
/// `origin` is only used to label errors.
pub fn read_entries(origin: &Path, bytes: &[u8]) -> Result<Vec<ArchiveEntry>, VolumeError> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut entries = Vec::new();
    for entry in archive.entries().map_err(|e| archive_err(origin, e))? {
        let entry = entry.map_err(|e| archive_err(origin, e))?;
        let raw_path = entry.path().map_err(|e| archive_err(origin, e))?;
        let Some(path) = normalize_archive_path(&raw_path.to_string_lossy()) else {
            continue;
        };

        let header = entry.header();
        let kind = match header.entry_type() {
            EntryType::Regular | EntryType::Continuous => EntryKind::File,
            EntryType::Directory => EntryKind::Directory,
            EntryType::Symlink => EntryKind::Symlink,
            _ => EntryKind::Other,
        };
        let link_target = match kind {
            EntryKind::Symlink => entry
                .link_name()
                .map_err(|e| archive_err(origin, e))?
                .map(|target| target.to_string_lossy().into_owned()),
            _ => None,
        };
        let stat = EntryStat {
            kind,
            size: if kind == EntryKind::File { entry.size() } else { 0 },
            mode: header.mode().map_err(|e| archive_err(origin, e))? & 0o7777,
            mtime: header.mtime().map_err(|e| archive_err(origin, e))?,
            link_target,
        };
        entries.push(ArchiveEntry { path, stat });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

// ---------------------------------------------------------------------------
// 3. Unpacking
// ---------------------------------------------------------------------------

/// Unpack a gzip-compressed tar into `destination`.
///
/// Permissions, mtimes, and extended attributes are restored; ownership only
/// when running as root. Directories are unpacked last, deepest first, so
/// their mtimes survive the creation of their children. Members that would
/// land outside `destination` are skipped with a warning.
pub fn extract(origin: &Path, bytes: &[u8], destination: &Path) -> Result<usize, VolumeError> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_unpack_xattrs(true);
    archive.set_overwrite(true);
    // SAFETY: geteuid has no preconditions and cannot fail.
    archive.set_preserve_ownerships(unsafe { libc::geteuid() } == 0);

    let mut unpacked = 0;
    let mut directories = Vec::new();
    for entry in archive.entries().map_err(|e| archive_err(origin, e))? {
        let mut entry = entry.map_err(|e| archive_err(origin, e))?;
        if entry.header().entry_type() == EntryType::Directory {
            directories.push(entry);
            continue;
        }
        if unpack_one(&mut entry, destination)?.is_some() {
            unpacked += 1;
        }
    }

    // tar leaves directory mtimes at "now"; restore them once nothing else
    // will be created inside.
    directories.sort_by(|a, b| b.path_bytes().cmp(&a.path_bytes()));
    for mut dir in directories {
        let mtime = dir.header().mtime().map_err(|e| archive_err(origin, e))?;
        if let Some(path) = unpack_one(&mut dir, destination)? {
            filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime as i64, 0))
                .map_err(|e| io_err(&path, e))?;
            unpacked += 1;
        }
    }

    debug!(destination = %destination.display(), entries = unpacked, "archive unpacked");
    Ok(unpacked)
}

/// Unpack one member; returns where it landed if it was written.
///
/// Member names are taken as raw bytes so names that are not UTF-8 land
/// under the same bytes they were archived with.
fn unpack_one<R: Read>(
    entry: &mut tar::Entry<'_, R>,
    destination: &Path,
) -> Result<Option<PathBuf>, VolumeError> {
    let name = entry
        .path()
        .map_err(|e| archive_err(destination, e))?
        .into_owned();
    let relative: PathBuf = name
        .components()
        .filter(|c| !matches!(c, Component::CurDir | Component::RootDir))
        .collect();
    if relative.as_os_str().is_empty() {
        // The root entry maps onto the destination itself.
        return Ok(None);
    }
    let target = destination.join(&relative);
    let written = entry
        .unpack_in(destination)
        .map_err(|e| archive_err(&target, e))?;
    if !written {
        warn!(entry = %name.display(), "skipping archive member outside the destination");
        return Ok(None);
    }
    Ok(Some(target))
}

// ---------------------------------------------------------------------------
// 4. Writing
// ---------------------------------------------------------------------------

/// Write `entries` (found below `root`) as a new gzip-compressed tar at
/// `destination`, naming each member `./<relative>`.
///
/// Symlinks are stored as links; sockets cannot be archived and are skipped.
/// Returns the number of members written.
pub fn write_archive(
    destination: &Path,
    root: &Path,
    entries: &[LiveEntry],
) -> Result<usize, VolumeError> {
    let file = File::create(destination).map_err(|e| io_err(destination, e))?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));

    let mut written = 0;
    for entry in entries {
        let metadata =
            std::fs::symlink_metadata(&entry.path).map_err(|e| io_err(&entry.path, e))?;
        if metadata.file_type().is_socket() {
            warn!(entry = %entry.relative, "skipping socket");
            continue;
        }
        let member = root.join(&entry.raw_relative);

        let mut header = Header::new_gnu();
        header.set_metadata_in_mode(&metadata, HeaderMode::Complete);
        let mut name = b"./".to_vec();
        name.extend_from_slice(entry.raw_relative.as_os_str().as_bytes());
        set_long_field(&mut builder, &mut header, EntryType::GNULongName, &name)
            .map_err(|e| archive_err(&member, e))?;

        let appended = match entry.stat.kind {
            EntryKind::File => {
                let data = File::open(&entry.path).map_err(|e| io_err(&entry.path, e))?;
                header.set_cksum();
                builder.append(&header, data)
            }
            EntryKind::Symlink => {
                let target = std::fs::read_link(&entry.path).map_err(|e| io_err(&entry.path, e))?;
                set_long_field(
                    &mut builder,
                    &mut header,
                    EntryType::GNULongLink,
                    target.as_os_str().as_bytes(),
                )
                .and_then(|()| {
                    header.set_cksum();
                    builder.append(&header, std::io::empty())
                })
            }
            EntryKind::Directory | EntryKind::Other => {
                header.set_cksum();
                builder.append(&header, std::io::empty())
            }
        };
        appended.map_err(|e| archive_err(&member, e))?;
        written += 1;
    }

    let file = builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| archive_err(destination, e))?;
    file.sync_all().map_err(|e| io_err(destination, e))?;
    debug!(archive = %destination.display(), entries = written, "archive written");
    Ok(written)
}

/// Store `value` in the header's name (or link name) field verbatim.
///
/// Values that do not fit are preceded by a GNU `././@LongLink` record and
/// truncated in the header itself, which is what readers expect.
fn set_long_field<W: Write>(
    builder: &mut Builder<W>,
    header: &mut Header,
    kind: EntryType,
    value: &[u8],
) -> std::io::Result<()> {
    // Both ustar fields are 100 bytes.
    let max = header.as_old().name.len();
    if value.len() > max {
        let mut long = Header::new_gnu();
        let marker = b"././@LongLink";
        long.as_old_mut().name[..marker.len()].copy_from_slice(marker);
        long.set_mode(0o644);
        long.set_uid(0);
        long.set_gid(0);
        long.set_mtime(0);
        long.set_size(value.len() as u64 + 1);
        long.set_entry_type(kind);
        long.set_cksum();
        builder.append(&long, value.chain(&b"\0"[..]))?;
    }

    let field = if kind == EntryType::GNULongLink {
        &mut header.as_old_mut().linkname
    } else {
        &mut header.as_old_mut().name
    };
    field.fill(0);
    let len = value.len().min(max);
    field[..len].copy_from_slice(&value[..len]);
    Ok(())
}
