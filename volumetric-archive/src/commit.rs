//! Capture a live volume back into its source archive.
//!
//! The previous archive is renamed to a timestamped backup first. Containers
//! mounting the volume are paused while the new archive is written and
//! unpaused afterwards, whatever the outcome. A failed commit leaves the
//! backup where it is.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, warn};

use volumetric_core::ArchiveVolume;
use volumetric_docker::{ContainerRuntime, DockerError};

use crate::archive::write_archive;
use crate::directory::list_tree;
use crate::error::{io_err, volume_lookup_err, VolumeError};
use crate::policy::Environment;

/// Committed archives are made read-only.
const ARCHIVE_MODE: u32 = 0o444;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOptions {
    /// Log the backup rename and stop.
    pub dry_run: bool,
}

/// What a successful commit did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    DryRun {
        backup: PathBuf,
    },
    Committed {
        backup: PathBuf,
        /// Container ids paused during the capture, in pause order.
        paused: Vec<String>,
        entries: usize,
    },
}

// ---------------------------------------------------------------------------
// 1. Backup naming
// ---------------------------------------------------------------------------

/// `<dir>/<base>-<YYYYMMDD-HHMMSS><ext>`, where `ext` starts at the first dot
/// of the file name (so `pgdata.tar.gz` keeps `.tar.gz`).
pub fn backup_path(source: &Path, at: NaiveDateTime) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    // A leading dot belongs to the base name.
    let split = name
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c == '.')
        .map_or(name.len(), |(i, _)| i);
    let (base, ext) = name.split_at(split);
    let stamp = at.format("%Y%m%d-%H%M%S");
    source.with_file_name(format!("{base}-{stamp}{ext}"))
}

// ---------------------------------------------------------------------------
// 2. Paused containers
// ---------------------------------------------------------------------------

/// Containers paused for the duration of a capture.
///
/// Unpauses exactly what it paused, in pause order, either through
/// [`PausedContainers::release`] or on drop.
pub struct PausedContainers<'r> {
    runtime: &'r mut dyn ContainerRuntime,
    paused: Vec<String>,
    released: bool,
}

impl<'r> PausedContainers<'r> {
    /// Pause each of `ids` in order. If one fails, the ones already paused
    /// are unpaused before the pause error is returned.
    pub fn pause_all(
        runtime: &'r mut dyn ContainerRuntime,
        volume: &str,
        ids: &[String],
    ) -> Result<Self, VolumeError> {
        let mut guard = Self {
            runtime,
            paused: Vec::with_capacity(ids.len()),
            released: false,
        };
        for id in ids {
            if let Err(err) = guard.runtime.pause_container(id) {
                warn!(volume, container = %id, "pause failed, releasing {} paused", guard.paused.len());
                let failures = guard.release();
                let cause = VolumeError::Daemon(err);
                if failures.is_empty() {
                    return Err(cause);
                }
                return Err(VolumeError::PartialFailure {
                    volume: volume.to_string(),
                    cause: Some(Box::new(cause)),
                    failures,
                });
            }
            debug!(volume, container = %id, "paused");
            guard.paused.push(id.clone());
        }
        Ok(guard)
    }

    pub fn ids(&self) -> &[String] {
        &self.paused
    }

    /// Unpause everything, returning the calls that failed. Never stops early.
    pub fn release(&mut self) -> Vec<(String, DockerError)> {
        self.released = true;
        let mut failures = Vec::new();
        for id in &self.paused {
            match self.runtime.unpause_container(id) {
                Ok(()) => debug!(container = %id, "unpaused"),
                Err(err) => {
                    warn!(container = %id, "unpause failed: {err}");
                    failures.push((id.clone(), err));
                }
            }
        }
        failures
    }
}

impl Drop for PausedContainers<'_> {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.release();
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Commit
// ---------------------------------------------------------------------------

/// Rewrite `volume`'s source archive from its live content.
pub fn commit(
    volume: &ArchiveVolume,
    env: &mut Environment<'_>,
    options: CommitOptions,
) -> Result<CommitOutcome, VolumeError> {
    let name = volume.name.as_str();
    let live = env
        .runtime
        .inspect_volume(name)
        .map_err(|e| volume_lookup_err(name, e))?;

    let source = &volume.source_path;
    let backup = backup_path(source, Local::now().naive_local());
    if options.dry_run {
        info!(
            volume = name,
            "dry run: would rename {} to {}",
            source.display(),
            backup.display()
        );
        return Ok(CommitOutcome::DryRun { backup });
    }

    std::fs::rename(source, &backup).map_err(|e| io_err(source, e))?;
    info!(volume = name, backup = %backup.display(), "previous archive moved aside");

    let consumers: Vec<String> = env
        .runtime
        .list_containers()?
        .into_iter()
        .filter(|c| c.mounts_volume(name))
        .map(|c| c.id)
        .collect();

    let mut guard = PausedContainers::pause_all(&mut *env.runtime, name, &consumers)?;
    let written = capture(&live.mountpoint, source);
    let failures = guard.release();
    let paused = guard.ids().to_vec();

    match (written, failures.is_empty()) {
        (Ok(entries), true) => {
            info!(volume = name, entries, paused = paused.len(), "commit complete");
            Ok(CommitOutcome::Committed {
                backup,
                paused,
                entries,
            })
        }
        (Ok(_), false) => Err(VolumeError::PartialFailure {
            volume: name.to_string(),
            cause: None,
            failures,
        }),
        (Err(err), true) => Err(err),
        (Err(err), false) => Err(VolumeError::PartialFailure {
            volume: name.to_string(),
            cause: Some(Box::new(err)),
            failures,
        }),
    }
}

/// Archive everything below `mountpoint` into a read-only file at
/// `destination`.
fn capture(mountpoint: &Path, destination: &Path) -> Result<usize, VolumeError> {
    let entries = list_tree(mountpoint)?;
    let written = write_archive(destination, mountpoint, &entries)?;
    std::fs::set_permissions(destination, std::fs::Permissions::from_mode(ARCHIVE_MODE))
        .map_err(|e| io_err(destination, e))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveFile;
    use crate::checkout::checkout;
    use crate::diff::diff;
    use crate::test_support::{archive_volume, FakeRuntime};
    use chrono::NaiveDate;
    use tempfile::TempDir;
    use volumetric_core::UpdatePolicy;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    /// A checked-out `pgdata` volume.
    fn checked_out(tmp: &Path) -> (ArchiveVolume, FakeRuntime) {
        let volume = archive_volume(tmp, "pgdata", UpdatePolicy::Never);
        let mut runtime = FakeRuntime::new(tmp.join("docker"));
        let mut env = Environment::new(&mut runtime, tmp.join("locks"));
        checkout(&volume, &mut env).unwrap();
        runtime.calls.clear();
        (volume, runtime)
    }

    fn backups(volume: &ArchiveVolume) -> Vec<PathBuf> {
        let dir = volume.source_path.parent().unwrap();
        let mut found: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                let name = p.file_name().unwrap().to_string_lossy();
                name.starts_with("pgdata-") && name.ends_with(".tar.gz")
            })
            .collect();
        found.sort();
        found
    }

    #[test]
    fn backup_name_keeps_full_extension() {
        assert_eq!(
            backup_path(Path::new("/srv/pgdata.tar.gz"), at(6, 7, 8)),
            PathBuf::from("/srv/pgdata-20240305-060708.tar.gz")
        );
        assert_eq!(
            backup_path(Path::new("/srv/archive"), at(23, 59, 1)),
            PathBuf::from("/srv/archive-20240305-235901")
        );
        assert_eq!(
            backup_path(Path::new("/srv/.hidden.tgz"), at(0, 0, 0)),
            PathBuf::from("/srv/.hidden-20240305-000000.tgz")
        );
    }

    #[test]
    fn commit_pauses_consumers_and_writes_read_only_archive() {
        let tmp = TempDir::new().unwrap();
        let (volume, mut runtime) = checked_out(tmp.path());
        runtime.add_consumer("c1", "pgdata");
        runtime.add_consumer("other", "cache");
        runtime.add_consumer("c2", "pgdata");
        std::fs::write(runtime.mountpoint("pgdata").join("postmaster.opts"), b"-D").unwrap();

        let mut env = Environment::new(&mut runtime, tmp.path().join("locks"));
        let outcome = commit(&volume, &mut env, CommitOptions::default()).unwrap();
        let (backup, paused, entries) = match outcome {
            CommitOutcome::Committed {
                backup,
                paused,
                entries,
            } => (backup, paused, entries),
            other => panic!("expected a commit, got {other:?}"),
        };
        assert_eq!(paused, ["c1", "c2"]);
        assert_eq!(entries, 7);
        assert_eq!(backups(&volume), [backup.clone()]);
        assert!(backup.exists());

        assert_eq!(
            runtime.calls,
            [
                "inspect pgdata",
                "list containers",
                "pause c1",
                "pause c2",
                "unpause c1",
                "unpause c2"
            ]
        );
        assert!(runtime.paused.is_empty());

        let mode = std::fs::metadata(&volume.source_path)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, ARCHIVE_MODE);
        let names: Vec<_> = ArchiveFile::map(&volume.source_path)
            .unwrap()
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert!(names.contains(&"postmaster.opts".to_string()), "{names:?}");
        assert!(diff(&volume, &mut runtime).unwrap().is_empty());
    }

    #[test]
    fn dry_run_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let (volume, mut runtime) = checked_out(tmp.path());
        runtime.add_consumer("c1", "pgdata");
        let before = std::fs::read(&volume.source_path).unwrap();

        let mut env = Environment::new(&mut runtime, tmp.path().join("locks"));
        let outcome = commit(&volume, &mut env, CommitOptions { dry_run: true }).unwrap();
        assert!(matches!(outcome, CommitOutcome::DryRun { .. }));
        assert!(runtime.writes().is_empty(), "{:?}", runtime.calls);
        assert!(backups(&volume).is_empty());
        assert_eq!(std::fs::read(&volume.source_path).unwrap(), before);
    }

    #[test]
    fn pause_failure_unpauses_only_what_was_paused() {
        let tmp = TempDir::new().unwrap();
        let (volume, mut runtime) = checked_out(tmp.path());
        for id in ["c1", "c2", "c3"] {
            runtime.add_consumer(id, "pgdata");
        }
        runtime.fail_pause.insert("c2".to_string());

        let mut env = Environment::new(&mut runtime, tmp.path().join("locks"));
        let err = commit(&volume, &mut env, CommitOptions::default()).unwrap_err();
        assert!(
            matches!(err, VolumeError::Daemon(DockerError::Rejected { status: 409, .. })),
            "got: {err}"
        );
        assert_eq!(runtime.writes(), ["pause c1", "pause c2", "unpause c1"]);
        assert!(runtime.paused.is_empty());
        // The backup is left in place; nothing new was written.
        assert_eq!(backups(&volume).len(), 1);
        assert!(!volume.source_path.exists());
    }

    #[test]
    fn failed_rollback_is_reported_with_the_pause_error() {
        let tmp = TempDir::new().unwrap();
        let (volume, mut runtime) = checked_out(tmp.path());
        runtime.add_consumer("c1", "pgdata");
        runtime.add_consumer("c2", "pgdata");
        runtime.fail_pause.insert("c2".to_string());
        runtime.fail_unpause.insert("c1".to_string());

        let mut env = Environment::new(&mut runtime, tmp.path().join("locks"));
        let err = commit(&volume, &mut env, CommitOptions::default()).unwrap_err();
        let VolumeError::PartialFailure {
            cause, failures, ..
        } = &err
        else {
            panic!("expected partial failure, got {err}");
        };
        assert!(cause.is_some());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "c1");
        assert!(err.to_string().contains("unpause c1 failed"), "{err}");
    }

    #[test]
    fn unpause_failure_after_capture_is_partial() {
        let tmp = TempDir::new().unwrap();
        let (volume, mut runtime) = checked_out(tmp.path());
        runtime.add_consumer("c1", "pgdata");
        runtime.add_consumer("c2", "pgdata");
        runtime.fail_unpause.insert("c1".to_string());

        let mut env = Environment::new(&mut runtime, tmp.path().join("locks"));
        let err = commit(&volume, &mut env, CommitOptions::default()).unwrap_err();
        assert!(
            matches!(&err, VolumeError::PartialFailure { cause: None, failures, .. } if failures.len() == 1),
            "got: {err}"
        );
        // c2 is still released after c1 fails.
        assert!(runtime.calls.contains(&"unpause c2".to_string()));
        assert!(volume.source_path.exists());
    }

    #[test]
    fn missing_volume_leaves_archive_in_place() {
        let tmp = TempDir::new().unwrap();
        let volume = archive_volume(tmp.path(), "pgdata", UpdatePolicy::Never);
        let mut runtime = FakeRuntime::new(tmp.path().join("docker"));
        let mut env = Environment::new(&mut runtime, tmp.path().join("locks"));

        let err = commit(&volume, &mut env, CommitOptions::default()).unwrap_err();
        assert!(matches!(err, VolumeError::VolumeNotFound { .. }), "got: {err}");
        assert!(volume.source_path.exists());
        assert!(backups(&volume).is_empty());
    }
}
