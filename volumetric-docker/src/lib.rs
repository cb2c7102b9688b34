//! Client for a Docker-compatible daemon reached over a unix socket.
//!
//! - [`paths`]: `DOCKER_HOST` resolution
//! - [`DockerProxy`]: keep-alive HTTP client implementing [`ContainerRuntime`]
//! - [`types`]: volume and container documents

mod http;
pub mod error;
pub mod paths;
pub mod proxy;
pub mod runtime;
pub mod types;

pub use error::DockerError;
pub use paths::{socket_path_from_env, DEFAULT_SOCKET};
pub use proxy::DockerProxy;
pub use runtime::ContainerRuntime;
pub use types::{ContainerMount, LiveContainer, LiveVolume};
