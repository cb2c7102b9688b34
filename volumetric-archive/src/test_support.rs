//! In-memory runtime and archive fixtures for unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use volumetric_core::{ArchiveVolume, HashAlgorithm, UpdatePolicy, VolumeName};
use volumetric_docker::{ContainerMount, ContainerRuntime, DockerError, LiveContainer, LiveVolume};

use crate::archive::{write_archive, ArchiveFile};
use crate::directory::list_tree;

/// A runtime whose volumes are plain directories under `root`.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    root: PathBuf,
    pub volumes: BTreeMap<String, LiveVolume>,
    pub containers: Vec<LiveContainer>,
    /// Every call, in order, e.g. `"create pgdata"`, `"pause c1"`.
    pub calls: Vec<String>,
    pub paused: BTreeSet<String>,
    pub fail_pause: BTreeSet<String>,
    pub fail_unpause: BTreeSet<String>,
}

impl FakeRuntime {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    /// Register a running container mounting `volume`.
    pub fn add_consumer(&mut self, id: &str, volume: &str) {
        self.containers.push(LiveContainer {
            id: id.to_string(),
            mounts: vec![ContainerMount {
                name: Some(volume.to_string()),
                source: None,
            }],
        });
    }

    /// Calls that change daemon state.
    pub fn writes(&self) -> Vec<&str> {
        self.calls
            .iter()
            .map(String::as_str)
            .filter(|c| !c.starts_with("list") && !c.starts_with("inspect"))
            .collect()
    }

    pub fn mountpoint(&self, name: &str) -> PathBuf {
        self.root.join(name).join("_data")
    }
}

impl ContainerRuntime for FakeRuntime {
    fn list_volumes(&mut self) -> Result<Vec<LiveVolume>, DockerError> {
        self.calls.push("list volumes".to_string());
        Ok(self.volumes.values().cloned().collect())
    }

    fn create_volume(&mut self, name: &str) -> Result<LiveVolume, DockerError> {
        self.calls.push(format!("create {name}"));
        let mountpoint = self.mountpoint(name);
        std::fs::create_dir_all(&mountpoint).map_err(|e| DockerError::Transport {
            socket: mountpoint.clone(),
            source: e,
        })?;
        let volume = LiveVolume {
            name: name.to_string(),
            driver: "local".to_string(),
            mountpoint,
        };
        self.volumes.insert(name.to_string(), volume.clone());
        Ok(volume)
    }

    fn inspect_volume(&mut self, name: &str) -> Result<LiveVolume, DockerError> {
        self.calls.push(format!("inspect {name}"));
        self.volumes
            .get(name)
            .cloned()
            .ok_or_else(|| DockerError::NotFound {
                message: format!("get {name}: no such volume"),
            })
    }

    fn remove_volume(&mut self, name: &str) -> Result<(), DockerError> {
        self.calls.push(format!("remove {name}"));
        let Some(volume) = self.volumes.remove(name) else {
            return Err(DockerError::NotFound {
                message: format!("get {name}: no such volume"),
            });
        };
        let _ = std::fs::remove_dir_all(volume.mountpoint);
        Ok(())
    }

    fn list_containers(&mut self) -> Result<Vec<LiveContainer>, DockerError> {
        self.calls.push("list containers".to_string());
        Ok(self.containers.clone())
    }

    fn pause_container(&mut self, id: &str) -> Result<(), DockerError> {
        self.calls.push(format!("pause {id}"));
        if self.fail_pause.contains(id) {
            return Err(DockerError::Rejected {
                status: 409,
                message: format!("container {id} is not running"),
            });
        }
        self.paused.insert(id.to_string());
        Ok(())
    }

    fn unpause_container(&mut self, id: &str) -> Result<(), DockerError> {
        self.calls.push(format!("unpause {id}"));
        if self.fail_unpause.contains(id) {
            return Err(DockerError::Rejected {
                status: 500,
                message: format!("cannot unpause {id}"),
            });
        }
        self.paused.remove(id);
        Ok(())
    }
}

/// Files placed in every fixture archive.
pub const FIXTURE_FILES: &[(&str, &[u8])] = &[
    ("PG_VERSION", b"15\n"),
    ("base/1/1259", b"relation data"),
    ("global/pg_control", b"control"),
];

/// Stage [`FIXTURE_FILES`] under `dir/stage-<name>` and archive them to
/// `dir/<name>.tar.gz`.
pub fn build_archive(dir: &Path, name: &str) -> PathBuf {
    let staging = dir.join(format!("stage-{name}"));
    for (path, contents) in FIXTURE_FILES {
        let path = staging.join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
    let archive = dir.join(format!("{name}.tar.gz"));
    write_archive(&archive, &staging, &list_tree(&staging).unwrap()).unwrap();
    archive
}

/// A declared volume backed by a fresh fixture archive with a matching hash.
pub fn archive_volume(dir: &Path, name: &str, policy: UpdatePolicy) -> ArchiveVolume {
    let source_path = build_archive(dir, name);
    let expected_hash = ArchiveFile::map(&source_path)
        .unwrap()
        .hash(HashAlgorithm::Md5);
    ArchiveVolume {
        name: VolumeName::from(name),
        source_path,
        expected_hash,
        update_policy: policy,
    }
}
