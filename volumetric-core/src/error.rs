//! Error types for volumetric-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing or encoding a [`FileHash`](crate::hash::FileHash).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    /// The algorithm name is not one this build knows how to compute.
    #[error("unknown hash algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// The digest text is not an even-length run of hex digits.
    #[error("invalid hex digest '{value}': {reason}")]
    InvalidHex { value: String, reason: String },

    /// Text was expected to be `<algorithm>:<hex>` but has no colon.
    #[error("expected '<algorithm>:<hex>', got '{0}'")]
    MissingSeparator(String),
}

/// All errors that can arise from loading configuration and project files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error; serde_yaml supplies line context.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document declares a schema version this build does not read.
    #[error("{path}: version mismatch, expected {expected}, found {found}")]
    VersionMismatch {
        path: PathBuf,
        expected: &'static str,
        found: String,
    },

    /// A declared volume is structurally valid YAML but semantically wrong.
    #[error("{path}: volume '{volume}': {reason}")]
    InvalidVolume {
        path: PathBuf,
        volume: String,
        reason: String,
    },

    /// No project file declares a volume with this name.
    #[error("no volume named '{name}' is declared")]
    VolumeNotFound { name: String },
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
