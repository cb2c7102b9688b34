//! Blocking client for the container daemon's HTTP API on a unix socket.

use std::io::BufReader;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{transport_err, DockerError};
use crate::http::{read_response, write_request, Response};
use crate::paths::socket_path;
use crate::runtime::ContainerRuntime;
use crate::types::{CreateVolume, ErrorMessage, LiveContainer, LiveVolume, VolumeList};

/// Talks to the daemon over one kept-alive connection.
///
/// The connection is opened on first use and reused until the daemon closes
/// it or an I/O error occurs; the following call then reconnects. Failed
/// calls are never retried.
#[derive(Debug)]
pub struct DockerProxy {
    socket: PathBuf,
    connection: Option<BufReader<UnixStream>>,
}

impl DockerProxy {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            connection: None,
        }
    }

    /// A proxy for the socket named by `DOCKER_HOST`, or the default socket.
    pub fn from_env() -> Result<Self, DockerError> {
        Ok(Self::new(socket_path()?))
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Whether a connection is currently held open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    // -----------------------------------------------------------------------
    // 1. Transport
    // -----------------------------------------------------------------------

    /// One request/response exchange. The connection is put back only if
    /// the exchange succeeded and the daemon will accept another request.
    fn round_trip(
        &mut self,
        method: &str,
        path: &str,
        body: Option<&[u8]>,
    ) -> Result<Response, DockerError> {
        let mut reader = match self.connection.take() {
            Some(reader) => reader,
            None => {
                tracing::debug!("connecting to {}", self.socket.display());
                let stream = UnixStream::connect(&self.socket)
                    .map_err(|e| transport_err(&self.socket, e))?;
                BufReader::new(stream)
            }
        };

        write_request(reader.get_mut(), &self.socket, method, path, body)?;
        let response = read_response(&mut reader, &self.socket)?;
        tracing::debug!("{method} {path} -> {}", response.status);

        if !response.close {
            self.connection = Some(reader);
        }
        Ok(response)
    }

    // -----------------------------------------------------------------------
    // 2. JSON calls
    // -----------------------------------------------------------------------

    /// Send a request and require a 2xx answer.
    fn call(
        &mut self,
        method: &str,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<Response, DockerError> {
        let payload = match body {
            Some(body) => Some(serde_json::to_vec(body).map_err(|e| DockerError::InvalidBody {
                endpoint: path.to_string(),
                source: e,
            })?),
            None => None,
        };
        let response = self.round_trip(method, path, payload.as_deref())?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(status_error(&response))
        }
    }

    fn call_json<T: DeserializeOwned>(
        &mut self,
        method: &str,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<T, DockerError> {
        let response = self.call(method, path, body)?;
        serde_json::from_slice(&response.body).map_err(|e| DockerError::InvalidBody {
            endpoint: path.to_string(),
            source: e,
        })
    }
}

/// Map a non-2xx response to an error, preferring the daemon's `message`.
fn status_error(response: &Response) -> DockerError {
    let message = serde_json::from_slice::<ErrorMessage>(&response.body)
        .map(|m| m.message)
        .unwrap_or_else(|_| {
            let text = String::from_utf8_lossy(&response.body).trim().to_string();
            if text.is_empty() {
                response.reason.clone()
            } else {
                text
            }
        });
    if response.status == 404 {
        DockerError::NotFound { message }
    } else {
        DockerError::Rejected {
            status: response.status,
            message,
        }
    }
}

const NO_BODY: Option<&()> = None;

impl ContainerRuntime for DockerProxy {
    fn list_volumes(&mut self) -> Result<Vec<LiveVolume>, DockerError> {
        let list: VolumeList = self.call_json("GET", "/volumes", NO_BODY)?;
        match (list.volumes, list.message) {
            (Some(volumes), _) => Ok(volumes),
            (None, Some(message)) => Err(DockerError::Rejected {
                status: 200,
                message,
            }),
            (None, None) => Ok(Vec::new()),
        }
    }

    fn create_volume(&mut self, name: &str) -> Result<LiveVolume, DockerError> {
        tracing::info!("creating volume {name}");
        self.call_json("POST", "/volumes/create", Some(&CreateVolume { name }))
    }

    fn inspect_volume(&mut self, name: &str) -> Result<LiveVolume, DockerError> {
        self.call_json("GET", &format!("/volumes/{name}"), NO_BODY)
    }

    fn remove_volume(&mut self, name: &str) -> Result<(), DockerError> {
        tracing::info!("removing volume {name}");
        self.call("DELETE", &format!("/volumes/{name}"), NO_BODY)
            .map(|_| ())
    }

    fn list_containers(&mut self) -> Result<Vec<LiveContainer>, DockerError> {
        self.call_json("GET", "/containers/json", NO_BODY)
    }

    fn pause_container(&mut self, id: &str) -> Result<(), DockerError> {
        self.call("POST", &format!("/containers/{id}/pause"), NO_BODY)
            .map(|_| ())
    }

    fn unpause_container(&mut self, id: &str) -> Result<(), DockerError> {
        self.call("POST", &format!("/containers/{id}/unpause"), NO_BODY)
            .map(|_| ())
    }
}
