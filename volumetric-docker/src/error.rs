use std::path::PathBuf;

use thiserror::Error;

/// Error surface for talking to the container daemon.
#[derive(Debug, Error)]
pub enum DockerError {
    /// The socket could not be opened, written, or read.
    #[error("cannot reach container daemon at {socket}: {source}")]
    Transport {
        socket: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `DOCKER_HOST` names something other than a local unix socket.
    #[error("unsupported DOCKER_HOST '{0}': only unix:// sockets are supported")]
    UnsupportedHost(String),

    /// The daemon answered with an error status or an error payload.
    #[error("daemon rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    /// The bytes on the wire were not a well-formed HTTP/1.1 response.
    #[error("invalid response from daemon: {reason}")]
    InvalidResponse { reason: String },

    /// The response body was not the JSON shape `endpoint` returns.
    #[error("unexpected response body from {endpoint}: {source}")]
    InvalidBody {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DockerError {
    /// True when the daemon was never reached or the connection broke,
    /// as opposed to the daemon answering with something unwelcome.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DockerError::Transport { .. } | DockerError::InvalidResponse { .. }
        )
    }
}

pub(crate) fn transport_err(socket: impl Into<PathBuf>, source: std::io::Error) -> DockerError {
    DockerError::Transport {
        socket: socket.into(),
        source,
    }
}

pub(crate) fn invalid_response(reason: impl Into<String>) -> DockerError {
    DockerError::InvalidResponse {
        reason: reason.into(),
    }
}
