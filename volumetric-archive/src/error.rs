//! Error types for volumetric-archive.

use std::path::PathBuf;

use thiserror::Error;

use volumetric_core::{FileHash, HashError};
use volumetric_docker::DockerError;

/// All errors that can arise from checkout, diff, and commit.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// The daemon could not be reached or refused a request.
    #[error("daemon error: {0}")]
    Daemon(#[from] DockerError),

    /// The daemon has no live volume with this name.
    #[error("live volume '{name}' does not exist")]
    VolumeNotFound { name: String },

    #[error("lock file not found: {path}")]
    LockNotFound { path: PathBuf },

    /// The lock file exists but does not hold `<algorithm>:<hex>`.
    #[error("malformed lock file {path}: {reason}")]
    LockFormat { path: PathBuf, reason: String },

    #[error("hash error: {0}")]
    Hash(#[from] HashError),

    /// The archive on disk is not the one the project declares.
    #[error("hash mismatch for {path}: expected {expected}, found {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: FileHash,
        actual: FileHash,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading, unpacking, or writing a compressed archive failed.
    #[error("archive error at {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Some container pause or unpause calls failed.
    ///
    /// `cause` is the error that stopped the operation, if any; `failures`
    /// are the best-effort unpause calls that failed afterwards.
    #[error("{}", partial_failure_message(.volume, .cause, .failures))]
    PartialFailure {
        volume: String,
        cause: Option<Box<VolumeError>>,
        failures: Vec<(String, DockerError)>,
    },
}

fn partial_failure_message(
    volume: &str,
    cause: &Option<Box<VolumeError>>,
    failures: &[(String, DockerError)],
) -> String {
    let mut message = match cause {
        Some(cause) => format!("{volume}: {cause}"),
        None => format!("{volume}: container operations incomplete"),
    };
    for (id, err) in failures {
        message.push_str(&format!("; unpause {id} failed: {err}"));
    }
    message
}

/// Convenience constructor for [`VolumeError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> VolumeError {
    VolumeError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`VolumeError::Archive`].
pub(crate) fn archive_err(path: impl Into<PathBuf>, source: std::io::Error) -> VolumeError {
    VolumeError::Archive {
        path: path.into(),
        source,
    }
}

/// Map a daemon `NotFound` for `name` onto [`VolumeError::VolumeNotFound`].
pub(crate) fn volume_lookup_err(name: &str, err: DockerError) -> VolumeError {
    match err {
        DockerError::NotFound { .. } => VolumeError::VolumeNotFound {
            name: name.to_owned(),
        },
        other => VolumeError::Daemon(other),
    }
}
