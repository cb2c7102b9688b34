use std::path::PathBuf;

use crate::error::DockerError;

/// Socket used when `DOCKER_HOST` is unset.
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// Environment variable naming the daemon endpoint.
pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";

/// Resolve the daemon socket from the value of `DOCKER_HOST`.
///
/// `None` or an empty value selects [`DEFAULT_SOCKET`]; `unix:///path`
/// selects `/path`. Every other scheme is rejected.
pub fn socket_path_from_env(value: Option<&str>) -> Result<PathBuf, DockerError> {
    match value.map(str::trim) {
        None | Some("") => Ok(PathBuf::from(DEFAULT_SOCKET)),
        Some(host) => match host.strip_prefix("unix://") {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Err(DockerError::UnsupportedHost(host.to_owned())),
        },
    }
}

/// [`socket_path_from_env`] applied to the process environment.
pub fn socket_path() -> Result<PathBuf, DockerError> {
    socket_path_from_env(std::env::var(DOCKER_HOST_ENV).ok().as_deref())
}
