use crate::error::DockerError;
use crate::types::{LiveContainer, LiveVolume};

/// The operations the volume engine needs from a container runtime.
///
/// [`DockerProxy`](crate::DockerProxy) is the production implementation.
/// Methods take `&mut self` because an implementation may hold a single
/// reusable connection.
pub trait ContainerRuntime {
    fn list_volumes(&mut self) -> Result<Vec<LiveVolume>, DockerError>;

    /// Whether a live volume called `name` exists.
    fn volume_exists(&mut self, name: &str) -> Result<bool, DockerError> {
        Ok(self.list_volumes()?.iter().any(|v| v.name == name))
    }

    fn create_volume(&mut self, name: &str) -> Result<LiveVolume, DockerError>;

    /// Fails with [`DockerError::NotFound`] if there is no such volume.
    fn inspect_volume(&mut self, name: &str) -> Result<LiveVolume, DockerError>;

    fn remove_volume(&mut self, name: &str) -> Result<(), DockerError>;

    fn list_containers(&mut self) -> Result<Vec<LiveContainer>, DockerError>;

    fn pause_container(&mut self, id: &str) -> Result<(), DockerError>;

    fn unpause_container(&mut self, id: &str) -> Result<(), DockerError>;
}
