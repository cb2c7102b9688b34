//! Lock files: the last archive hash checked out into each volume.
//!
//! One plain-text file per volume at `<lock_directory>/<volume>.lock`
//! holding `<algorithm>:<hex>`. The file's own mtime records when that hash
//! was stamped, which is what staleness is measured against.
//! Writes use the atomic `.tmp` + rename pattern.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use volumetric_core::{FileHash, VolumeName};

use crate::error::{io_err, VolumeError};

/// `<lock_directory>/<volume>.lock`. Does no I/O.
pub fn lock_path_at(lock_directory: &Path, volume: &VolumeName) -> PathBuf {
    lock_directory.join(format!("{}.lock", volume.0))
}

/// An open lock file record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockFile {
    path: PathBuf,
    hash: Option<FileHash>,
    mtime: SystemTime,
}

impl LockFile {
    /// Create (or truncate) the lock file for `volume`.
    ///
    /// The lock directory is created if missing. The new record holds no
    /// hash until [`LockFile::update`] stamps one.
    pub fn create_at(lock_directory: &Path, volume: &VolumeName) -> Result<Self, VolumeError> {
        std::fs::create_dir_all(lock_directory).map_err(|e| io_err(lock_directory, e))?;
        let path = lock_path_at(lock_directory, volume);
        std::fs::write(&path, b"").map_err(|e| io_err(&path, e))?;
        let mtime = modified(&path)?;
        Ok(Self {
            path,
            hash: None,
            mtime,
        })
    }

    /// Open and parse the lock file for `volume`.
    ///
    /// Returns `LockNotFound` if absent and `LockFormat` if the contents are
    /// not `<algorithm>:<hex>`.
    pub fn open_at(lock_directory: &Path, volume: &VolumeName) -> Result<Self, VolumeError> {
        Self::open_path(lock_path_at(lock_directory, volume))
    }

    fn open_path(path: PathBuf) -> Result<Self, VolumeError> {
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(VolumeError::LockNotFound { path })
            }
            Err(err) => return Err(io_err(&path, err)),
        };
        let hash = contents
            .trim()
            .parse::<FileHash>()
            .map_err(|e| VolumeError::LockFormat {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        let mtime = modified(&path)?;
        Ok(Self {
            path,
            hash: Some(hash),
            mtime,
        })
    }

    /// Stamp `hash` into the file, then re-read it to verify the write.
    pub fn update(&mut self, hash: &FileHash) -> Result<(), VolumeError> {
        let tmp = self.path.with_extension("lock.tmp");
        std::fs::write(&tmp, format!("{hash}\n")).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))?;

        let reread = Self::open_path(self.path.clone())?;
        if reread.hash.as_ref() != Some(hash) {
            return Err(VolumeError::LockFormat {
                path: self.path.clone(),
                reason: format!("wrote {hash} but read back something else"),
            });
        }
        *self = reread;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stamped hash; `None` for a freshly created, unstamped file.
    pub fn hash(&self) -> Option<&FileHash> {
        self.hash.as_ref()
    }

    pub fn mtime(&self) -> SystemTime {
        self.mtime
    }
}

fn modified(path: &Path) -> Result<SystemTime, VolumeError> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| io_err(path, e))
}
