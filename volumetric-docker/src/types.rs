//! JSON shapes exchanged with the daemon. Field names follow the Engine API.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A volume as the daemon reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LiveVolume {
    pub name: String,
    #[serde(default)]
    pub driver: String,
    /// Host directory backing the volume.
    pub mountpoint: PathBuf,
}

/// Body of `GET /volumes`.
///
/// A missing `Volumes` key together with `message` means the daemon answered
/// with an error document instead of a list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct VolumeList {
    #[serde(default)]
    pub volumes: Option<Vec<LiveVolume>>,
    #[serde(default, rename = "message")]
    pub message: Option<String>,
}

/// Body of `POST /volumes/create`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CreateVolume<'a> {
    pub name: &'a str,
}

/// A running (or paused) container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveContainer {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Mounts", default)]
    pub mounts: Vec<ContainerMount>,
}

impl LiveContainer {
    /// True when any mount refers to `volume` by name or by source.
    pub fn mounts_volume(&self, volume: &str) -> bool {
        self.mounts.iter().any(|m| {
            m.name.as_deref() == Some(volume) || m.source.as_deref() == Some(volume)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerMount {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Error document returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorMessage {
    pub message: String,
}
