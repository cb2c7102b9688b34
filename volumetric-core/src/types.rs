//! Domain types for declared archive volumes.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::hash::FileHash;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a volume. Unique within a project file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VolumeName(pub String);

impl VolumeName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for VolumeName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VolumeName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// When a checkout is considered necessary for an archive volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UpdatePolicy {
    /// Populate once; an existing live volume is never touched.
    #[default]
    Never,
    /// Re-populate whenever the lock file is missing or stale.
    OnStaleLock,
}

impl fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdatePolicy::Never => write!(f, "never"),
            UpdatePolicy::OnStaleLock => write!(f, "on-stale-lock"),
        }
    }
}

impl FromStr for UpdatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(UpdatePolicy::Never),
            "on-stale-lock" => Ok(UpdatePolicy::OnStaleLock),
            other => Err(format!(
                "unknown update policy '{other}'; expected: never, on-stale-lock"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A named volume whose authoritative content is a compressed archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveVolume {
    pub name: VolumeName,
    /// Local path to the `.tar.gz` source of truth.
    pub source_path: PathBuf,
    pub expected_hash: FileHash,
    pub update_policy: UpdatePolicy,
}
