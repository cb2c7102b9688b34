//! Update policies: when to check out, what to verify first, and what to
//! record afterwards.
//!
//! Decision rules:
//! - `never`: act only if the live volume does not exist.
//! - `on-stale-lock`: act if the lock file is absent or unreadable, or if it
//!   records a different hash *and* the archive is strictly newer than it.

use std::path::PathBuf;
use std::time::SystemTime;

use tracing::{debug, info, warn};

use volumetric_core::{ArchiveVolume, UpdatePolicy};
use volumetric_docker::ContainerRuntime;

use crate::archive::ArchiveFile;
use crate::error::{io_err, VolumeError};
use crate::lock_file::LockFile;

/// Outcome of a policy's `decide` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    NoAction,
    NeedsAction,
}

/// What every strategy call may touch.
pub struct Environment<'a> {
    pub runtime: &'a mut dyn ContainerRuntime,
    pub lock_directory: PathBuf,
}

impl<'a> Environment<'a> {
    pub fn new(runtime: &'a mut dyn ContainerRuntime, lock_directory: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            lock_directory: lock_directory.into(),
        }
    }
}

/// The three hooks an update policy supplies to checkout.
pub trait Strategy: Sync {
    fn policy(&self) -> UpdatePolicy;

    /// Whether checkout has anything to do.
    fn decide(
        &self,
        volume: &ArchiveVolume,
        env: &mut Environment<'_>,
    ) -> Result<Decision, VolumeError>;

    /// Runs after a `NeedsAction` decision and before the volume is created.
    /// A failure aborts checkout with nothing created.
    fn check(
        &self,
        volume: &ArchiveVolume,
        archive: &ArchiveFile,
        env: &mut Environment<'_>,
    ) -> Result<(), VolumeError>;

    /// Runs after a successful extraction.
    fn commit_hook(
        &self,
        volume: &ArchiveVolume,
        env: &mut Environment<'_>,
    ) -> Result<(), VolumeError>;
}

/// The strategy implementing `policy`.
pub fn strategy_for(policy: UpdatePolicy) -> &'static dyn Strategy {
    match policy {
        UpdatePolicy::Never => &Never,
        UpdatePolicy::OnStaleLock => &OnStaleLock,
    }
}

/// Compare the mapped archive's digest with the declared one.
pub fn verify_hash(volume: &ArchiveVolume, archive: &ArchiveFile) -> Result<(), VolumeError> {
    let expected = &volume.expected_hash;
    let actual = archive.hash(expected.algorithm());
    if &actual != expected {
        return Err(VolumeError::HashMismatch {
            path: archive.path().to_path_buf(),
            expected: expected.clone(),
            actual,
        });
    }
    debug!(volume = %volume.name, hash = %actual, "archive hash verified");
    Ok(())
}

// ---------------------------------------------------------------------------
// 1. never
// ---------------------------------------------------------------------------

/// Populate once; an existing volume is left alone.
#[derive(Debug, Clone, Copy)]
pub struct Never;

impl Strategy for Never {
    fn policy(&self) -> UpdatePolicy {
        UpdatePolicy::Never
    }

    fn decide(
        &self,
        volume: &ArchiveVolume,
        env: &mut Environment<'_>,
    ) -> Result<Decision, VolumeError> {
        if env.runtime.volume_exists(volume.name.as_str())? {
            Ok(Decision::NoAction)
        } else {
            Ok(Decision::NeedsAction)
        }
    }

    fn check(
        &self,
        volume: &ArchiveVolume,
        archive: &ArchiveFile,
        _env: &mut Environment<'_>,
    ) -> Result<(), VolumeError> {
        verify_hash(volume, archive)
    }

    fn commit_hook(
        &self,
        _volume: &ArchiveVolume,
        _env: &mut Environment<'_>,
    ) -> Result<(), VolumeError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 2. on-stale-lock
// ---------------------------------------------------------------------------

/// Re-populate whenever the lock file says the archive has moved on.
#[derive(Debug, Clone, Copy)]
pub struct OnStaleLock;

impl Strategy for OnStaleLock {
    fn policy(&self) -> UpdatePolicy {
        UpdatePolicy::OnStaleLock
    }

    fn decide(
        &self,
        volume: &ArchiveVolume,
        env: &mut Environment<'_>,
    ) -> Result<Decision, VolumeError> {
        let lock = match LockFile::open_at(&env.lock_directory, &volume.name) {
            Ok(lock) => lock,
            Err(VolumeError::LockNotFound { .. }) => {
                debug!(volume = %volume.name, "no lock file");
                return Ok(Decision::NeedsAction);
            }
            Err(err) => {
                warn!(volume = %volume.name, "treating unreadable lock file as absent: {err}");
                return Ok(Decision::NeedsAction);
            }
        };

        if lock.hash() == Some(&volume.expected_hash) {
            return Ok(Decision::NoAction);
        }

        let archive_mtime = archive_mtime(volume)?;
        if archive_mtime > lock.mtime() {
            info!(volume = %volume.name, "lock file is stale");
            Ok(Decision::NeedsAction)
        } else {
            Ok(Decision::NoAction)
        }
    }

    /// Verify the archive, then clear out any existing live volume. The order
    /// matters: a bad archive must never cost the live data.
    fn check(
        &self,
        volume: &ArchiveVolume,
        archive: &ArchiveFile,
        env: &mut Environment<'_>,
    ) -> Result<(), VolumeError> {
        verify_hash(volume, archive)?;
        let name = volume.name.as_str();
        if env.runtime.volume_exists(name)? {
            info!(volume = %volume.name, "removing existing volume before re-populating");
            env.runtime.remove_volume(name)?;
        }
        Ok(())
    }

    fn commit_hook(
        &self,
        volume: &ArchiveVolume,
        env: &mut Environment<'_>,
    ) -> Result<(), VolumeError> {
        let mut lock = LockFile::create_at(&env.lock_directory, &volume.name)?;
        lock.update(&volume.expected_hash)?;
        debug!(volume = %volume.name, lock = %lock.path().display(), "lock file stamped");
        Ok(())
    }
}

fn archive_mtime(volume: &ArchiveVolume) -> Result<SystemTime, VolumeError> {
    let path = &volume.source_path;
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| io_err(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock_file::lock_path_at;
    use crate::test_support::{archive_volume, FakeRuntime};
    use filetime::FileTime;
    use tempfile::TempDir;
    use volumetric_core::{FileHash, HashAlgorithm};

    fn stamp_lock(dir: &std::path::Path, volume: &ArchiveVolume, hash: &FileHash, mtime: i64) {
        let mut lock = LockFile::create_at(dir, &volume.name).unwrap();
        lock.update(hash).unwrap();
        filetime::set_file_mtime(
            lock_path_at(dir, &volume.name),
            FileTime::from_unix_time(mtime, 0),
        )
        .unwrap();
    }

    fn set_archive_mtime(volume: &ArchiveVolume, mtime: i64) {
        filetime::set_file_mtime(&volume.source_path, FileTime::from_unix_time(mtime, 0))
            .unwrap();
    }

    #[test]
    fn strategy_for_is_exhaustive() {
        assert_eq!(strategy_for(UpdatePolicy::Never).policy(), UpdatePolicy::Never);
        assert_eq!(
            strategy_for(UpdatePolicy::OnStaleLock).policy(),
            UpdatePolicy::OnStaleLock
        );
    }

    #[test]
    fn never_acts_only_when_volume_is_missing() {
        let tmp = TempDir::new().unwrap();
        let volume = archive_volume(tmp.path(), "pgdata", UpdatePolicy::Never);
        let mut runtime = FakeRuntime::new(tmp.path().join("docker"));
        let mut env = Environment::new(&mut runtime, tmp.path().join("locks"));
        assert_eq!(Never.decide(&volume, &mut env).unwrap(), Decision::NeedsAction);

        runtime.create_volume("pgdata").unwrap();
        let mut env = Environment::new(&mut runtime, tmp.path().join("locks"));
        // Lock state is irrelevant to `never`.
        stamp_lock(
            &env.lock_directory,
            &volume,
            &FileHash::of_bytes(HashAlgorithm::Md5, b"other"),
            0,
        );
        assert_eq!(Never.decide(&volume, &mut env).unwrap(), Decision::NoAction);
    }

    #[test]
    fn missing_or_unreadable_lock_needs_action() {
        let tmp = TempDir::new().unwrap();
        let volume = archive_volume(tmp.path(), "pgdata", UpdatePolicy::OnStaleLock);
        let locks = tmp.path().join("locks");
        let mut runtime = FakeRuntime::new(tmp.path().join("docker"));
        let mut env = Environment::new(&mut runtime, &locks);
        assert_eq!(
            OnStaleLock.decide(&volume, &mut env).unwrap(),
            Decision::NeedsAction
        );

        std::fs::create_dir_all(&locks).unwrap();
        std::fs::write(lock_path_at(&locks, &volume.name), "garbage").unwrap();
        assert_eq!(
            OnStaleLock.decide(&volume, &mut env).unwrap(),
            Decision::NeedsAction
        );
    }

    #[test]
    fn equal_hash_is_fresh_regardless_of_mtimes() {
        let tmp = TempDir::new().unwrap();
        let volume = archive_volume(tmp.path(), "pgdata", UpdatePolicy::OnStaleLock);
        let locks = tmp.path().join("locks");
        stamp_lock(&locks, &volume, &volume.expected_hash, 1_000);
        set_archive_mtime(&volume, 2_000);

        let mut runtime = FakeRuntime::new(tmp.path().join("docker"));
        let mut env = Environment::new(&mut runtime, &locks);
        assert_eq!(OnStaleLock.decide(&volume, &mut env).unwrap(), Decision::NoAction);
    }

    #[test]
    fn differing_hash_needs_action_only_when_archive_is_strictly_newer() {
        let tmp = TempDir::new().unwrap();
        let volume = archive_volume(tmp.path(), "pgdata", UpdatePolicy::OnStaleLock);
        let locks = tmp.path().join("locks");
        let old = FileHash::of_bytes(HashAlgorithm::Md5, b"previous archive");
        let mut runtime = FakeRuntime::new(tmp.path().join("docker"));

        for (archive, lock, expected) in [
            (1_000, 2_000, Decision::NoAction),
            (2_000, 2_000, Decision::NoAction),
            (2_001, 2_000, Decision::NeedsAction),
        ] {
            stamp_lock(&locks, &volume, &old, lock);
            set_archive_mtime(&volume, archive);
            let mut env = Environment::new(&mut runtime, &locks);
            assert_eq!(
                OnStaleLock.decide(&volume, &mut env).unwrap(),
                expected,
                "archive mtime {archive}, lock mtime {lock}"
            );
        }
    }

    #[test]
    fn stale_lock_with_missing_archive_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let volume = archive_volume(tmp.path(), "pgdata", UpdatePolicy::OnStaleLock);
        let locks = tmp.path().join("locks");
        stamp_lock(&locks, &volume, &FileHash::of_bytes(HashAlgorithm::Md5, b"x"), 0);
        std::fs::remove_file(&volume.source_path).unwrap();

        let mut runtime = FakeRuntime::new(tmp.path().join("docker"));
        let mut env = Environment::new(&mut runtime, &locks);
        assert!(matches!(
            OnStaleLock.decide(&volume, &mut env),
            Err(VolumeError::Io { .. })
        ));
    }

    #[test]
    fn on_stale_lock_check_verifies_before_removing() {
        let tmp = TempDir::new().unwrap();
        let mut volume = archive_volume(tmp.path(), "pgdata", UpdatePolicy::OnStaleLock);
        let mut runtime = FakeRuntime::new(tmp.path().join("docker"));
        runtime.create_volume("pgdata").unwrap();
        let archive = ArchiveFile::map(&volume.source_path).unwrap();

        volume.expected_hash = FileHash::of_bytes(HashAlgorithm::Md5, b"wrong");
        let mut env = Environment::new(&mut runtime, tmp.path().join("locks"));
        let err = OnStaleLock.check(&volume, &archive, &mut env).unwrap_err();
        assert!(matches!(err, VolumeError::HashMismatch { .. }), "got: {err}");
        assert!(runtime.volume_exists("pgdata").unwrap());

        volume.expected_hash = archive.hash(HashAlgorithm::Md5);
        let mut env = Environment::new(&mut runtime, tmp.path().join("locks"));
        OnStaleLock.check(&volume, &archive, &mut env).unwrap();
        assert!(!runtime.volume_exists("pgdata").unwrap());
    }

    #[test]
    fn commit_hook_stamps_expected_hash() {
        let tmp = TempDir::new().unwrap();
        let volume = archive_volume(tmp.path(), "pgdata", UpdatePolicy::OnStaleLock);
        let locks = tmp.path().join("locks");
        let mut runtime = FakeRuntime::new(tmp.path().join("docker"));
        let mut env = Environment::new(&mut runtime, &locks);

        OnStaleLock.commit_hook(&volume, &mut env).unwrap();
        let lock = LockFile::open_at(&locks, &volume.name).unwrap();
        assert_eq!(lock.hash(), Some(&volume.expected_hash));

        Never.commit_hook(&volume, &mut env).unwrap();
        assert_eq!(
            LockFile::open_at(&locks, &volume.name).unwrap().hash(),
            Some(&volume.expected_hash)
        );
    }
}
