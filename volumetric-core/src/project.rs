//! Project files: the YAML documents that declare archive volumes.
//!
//! ```yaml
//! version: "1.0"
//! volumes:
//!   pgdata:
//!     archive:
//!       url: images/pgdata.tar.gz
//!       md5: 9e107d9d372bb6826bd81d3542a419d6
//!       update: on-stale-lock
//! ```
//!
//! Relative `url`s resolve against the directory holding the project file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::configuration::check_version;
use crate::error::{io_err, ConfigError};
use crate::hash::{FileHash, HashAlgorithm};
use crate::types::{ArchiveVolume, UpdatePolicy, VolumeName};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProjectFile {
    #[allow(dead_code)]
    version: serde_yaml::Value,
    #[serde(default)]
    volumes: BTreeMap<String, RawVolume>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVolume {
    archive: RawArchive,
}

#[derive(Debug, Deserialize)]
struct RawArchive {
    name: Option<String>,
    url: String,
    #[serde(default)]
    update: UpdatePolicy,
    /// Everything else; must be exactly one `<algorithm>: <hex>` pair.
    #[serde(flatten)]
    digests: BTreeMap<String, serde_yaml::Value>,
}

/// A parsed project file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    pub path: PathBuf,
    /// Volumes in the order of their keys in the file (sorted).
    pub volumes: Vec<ArchiveVolume>,
}

impl ProjectFile {
    /// Load and validate a project file.
    ///
    /// The schema version is checked before anything else, so a document from
    /// a newer schema reports `VersionMismatch` rather than a field error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        Self::parse(path, &contents)
    }

    pub(crate) fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let document: serde_yaml::Value =
            serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        check_version(path, &document)?;

        let raw: RawProjectFile =
            serde_yaml::from_value(document).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let volumes = raw
            .volumes
            .into_iter()
            .map(|(key, volume)| archive_volume(path, base_dir, key, volume.archive))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            path: path.to_path_buf(),
            volumes,
        })
    }
}

fn archive_volume(
    path: &Path,
    base_dir: &Path,
    key: String,
    raw: RawArchive,
) -> Result<ArchiveVolume, ConfigError> {
    let invalid = |volume: &str, reason: String| ConfigError::InvalidVolume {
        path: path.to_path_buf(),
        volume: volume.to_owned(),
        reason,
    };

    let name = raw.name.unwrap_or(key);
    if name.is_empty() {
        return Err(invalid(&name, "volume name is empty".to_string()));
    }

    let source_path = resolve_source(base_dir, &raw.url).map_err(|r| invalid(&name, r))?;

    let mut digests = raw.digests.into_iter();
    let (algorithm, value) = match (digests.next(), digests.next()) {
        (Some(first), None) => first,
        (None, _) => {
            return Err(invalid(
                &name,
                format!("missing hash; expected one of: {}", algorithm_names()),
            ))
        }
        (Some(_), Some(_)) => {
            return Err(invalid(&name, "more than one hash declared".to_string()))
        }
    };
    let algorithm: HashAlgorithm = algorithm.parse().map_err(|_| {
        invalid(
            &name,
            format!(
                "unknown key '{algorithm}'; expected name, url, update or one of: {}",
                algorithm_names()
            ),
        )
    })?;
    // YAML reads an all-digit digest as a number.
    let serde_yaml::Value::String(value) = value else {
        return Err(invalid(
            &name,
            format!("{algorithm} digest must be a string; quote the digest"),
        ));
    };
    let expected_hash =
        FileHash::from_hex(algorithm, &value).map_err(|e| invalid(&name, e.to_string()))?;
    if expected_hash.as_bytes().len() != algorithm.digest_len() {
        return Err(invalid(
            &name,
            format!(
                "{algorithm} digest must be {} hex characters",
                algorithm.digest_len() * 2
            ),
        ));
    }

    Ok(ArchiveVolume {
        name: VolumeName::from(name),
        source_path,
        expected_hash,
        update_policy: raw.update,
    })
}

/// Turn an archive `url` into a local path. Only plain paths and `file://`
/// URLs are accepted.
fn resolve_source(base_dir: &Path, url: &str) -> Result<PathBuf, String> {
    if url.is_empty() {
        return Err("url is empty".to_string());
    }
    let local = match url.strip_prefix("file://") {
        Some(rest) => rest,
        None => {
            if let Some((scheme, _)) = url.split_once("://") {
                return Err(format!("unsupported URL scheme '{scheme}'"));
            }
            url
        }
    };
    let path = Path::new(local);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(base_dir.join(path))
    }
}

fn algorithm_names() -> String {
    HashAlgorithm::all()
        .iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
