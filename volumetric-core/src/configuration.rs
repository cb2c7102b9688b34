//! Top-level configuration file and project discovery.
//!
//! # Storage layout
//!
//! ```text
//! /etc/volumetric/
//!   volumetric.yaml       (version, volume-directory, lock-directory)
//!   volumes.d/
//!     <project>.yaml      (one file per project, see `project`)
//! ```
//!
//! # API pattern
//!
//! Nothing here consults the environment. The CLI resolves the config path
//! (flag, `VOLUMETRIC_CONFIG`, then [`DEFAULT_CONFIG_PATH`]) and hands it to
//! [`Configuration::load`]; tests point it at a temporary directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{io_err, ConfigError};
use crate::project::ProjectFile;
use crate::types::ArchiveVolume;

/// The only schema version this build reads, for both file kinds.
pub const SCHEMA_VERSION: &str = "1.0";

pub const DEFAULT_CONFIG_PATH: &str = "/etc/volumetric/volumetric.yaml";

/// Where lock files live unless `lock-directory` says otherwise.
pub const DEFAULT_LOCK_DIRECTORY: &str = "/var/volumetric";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfiguration {
    #[allow(dead_code)]
    version: serde_yaml::Value,
    volume_directory: PathBuf,
    #[serde(default)]
    lock_directory: Option<PathBuf>,
}

/// A loaded `volumetric.yaml`, with directories already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub path: PathBuf,
    pub volume_directory: PathBuf,
    pub lock_directory: PathBuf,
}

// ---------------------------------------------------------------------------
// 1. Load
// ---------------------------------------------------------------------------

impl Configuration {
    /// Read and validate the configuration file at `path`.
    ///
    /// Relative directories resolve against the directory holding `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let document: serde_yaml::Value =
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        check_version(path, &document)?;

        let raw: RawConfiguration =
            serde_yaml::from_value(document).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let lock_directory = raw
            .lock_directory
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCK_DIRECTORY));

        Ok(Self {
            path: path.to_path_buf(),
            volume_directory: base_dir.join(raw.volume_directory),
            lock_directory: base_dir.join(lock_directory),
        })
    }

    // -----------------------------------------------------------------------
    // 2. Project discovery
    // -----------------------------------------------------------------------

    /// Every `*.yaml` / `*.yml` file directly inside the volume directory,
    /// parsed, in filename order.
    pub fn projects(&self) -> Result<Vec<ProjectFile>, ConfigError> {
        let dir = &self.volume_directory;
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| io_err(dir, e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|ext| ext.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        paths.sort();

        paths.iter().map(|p| ProjectFile::load(p)).collect()
    }

    /// All declared volumes across project files, in discovery order.
    ///
    /// A name declared twice is an error; the second declaration is reported.
    pub fn volumes(&self) -> Result<Vec<ArchiveVolume>, ConfigError> {
        let mut seen = BTreeSet::new();
        let mut volumes = Vec::new();
        for project in self.projects()? {
            for volume in project.volumes {
                if !seen.insert(volume.name.clone()) {
                    return Err(ConfigError::InvalidVolume {
                        path: project.path.clone(),
                        volume: volume.name.0,
                        reason: "declared more than once".to_string(),
                    });
                }
                volumes.push(volume);
            }
        }
        Ok(volumes)
    }

    pub fn find_volume(&self, name: &str) -> Result<ArchiveVolume, ConfigError> {
        self.volumes()?
            .into_iter()
            .find(|v| v.name.as_str() == name)
            .ok_or_else(|| ConfigError::VolumeNotFound {
                name: name.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// 3. Version check
// ---------------------------------------------------------------------------

/// Compare a document's `version` key against [`SCHEMA_VERSION`].
///
/// An unquoted `version: 1.0` arrives as a YAML float and is accepted.
pub(crate) fn check_version(path: &Path, document: &serde_yaml::Value) -> Result<(), ConfigError> {
    let found = match document.get("version") {
        None | Some(serde_yaml::Value::Null) => "<missing>".to_string(),
        Some(serde_yaml::Value::String(s)) => s.clone(),
        Some(serde_yaml::Value::Number(n)) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{f:?}"),
            _ => n.to_string(),
        },
        Some(other) => format!("{other:?}"),
    };
    if found == SCHEMA_VERSION {
        Ok(())
    } else {
        Err(ConfigError::VersionMismatch {
            path: path.to_path_buf(),
            expected: SCHEMA_VERSION,
            found,
        })
    }
}
