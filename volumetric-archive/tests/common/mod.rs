//! A stateful fake daemon on a real unix socket.
//!
//! Volumes are directories under a temp root. Every request is recorded as
//! `"<METHOD> <path>"`.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::{json, Value};
use tempfile::TempDir;

#[derive(Debug, Default)]
pub struct State {
    /// name -> mountpoint
    pub volumes: BTreeMap<String, PathBuf>,
    /// (id, mounted volume names)
    pub containers: Vec<(String, Vec<String>)>,
    pub paused: Vec<String>,
    pub requests: Vec<String>,
}

pub struct FakeDaemon {
    dir: TempDir,
    socket: PathBuf,
    state: Arc<Mutex<State>>,
}

impl FakeDaemon {
    pub fn start() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let socket = dir.path().join("docker.sock");
        let listener = UnixListener::bind(&socket).expect("bind");
        let state = Arc::new(Mutex::new(State::default()));
        let volume_root = dir.path().join("volumes");

        let shared = state.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { return };
                let shared = shared.clone();
                let volume_root = volume_root.clone();
                thread::spawn(move || serve(stream, &shared, &volume_root));
            }
        });

        Self { dir, socket, state }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Scratch space next to the socket for archives and lock files.
    pub fn scratch(&self) -> PathBuf {
        let path = self.dir.path().join("scratch");
        std::fs::create_dir_all(&path).expect("scratch dir");
        path
    }

    pub fn add_container(&self, id: &str, volume: &str) {
        self.state
            .lock()
            .unwrap()
            .containers
            .push((id.to_string(), vec![volume.to_string()]));
    }

    pub fn mountpoint(&self, name: &str) -> Option<PathBuf> {
        self.state.lock().unwrap().volumes.get(name).cloned()
    }

    /// Requests other than `GET`s.
    pub fn writes(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| !r.starts_with("GET "))
            .cloned()
            .collect()
    }

    pub fn paused(&self) -> Vec<String> {
        self.state.lock().unwrap().paused.clone()
    }

    pub fn clear_requests(&self) {
        self.state.lock().unwrap().requests.clear();
    }
}

fn serve(stream: UnixStream, state: &Mutex<State>, volume_root: &Path) {
    let mut reader = BufReader::new(stream);
    while let Some((method, path, body)) = read_request(&mut reader) {
        let (status, reply) = route(state, volume_root, &method, &path, &body);
        let reply = reply.map(|v| v.to_string()).unwrap_or_default();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{reply}",
            reply.len()
        );
        if reader.get_mut().write_all(response.as_bytes()).is_err() {
            return;
        }
    }
}

fn route(
    state: &Mutex<State>,
    volume_root: &Path,
    method: &str,
    path: &str,
    body: &str,
) -> (&'static str, Option<Value>) {
    let mut state = state.lock().unwrap();
    state.requests.push(format!("{method} {path}"));
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let no_such = |what: &str| Some(json!({"message": format!("no such {what}")}));

    match (method, segments.as_slice()) {
        ("GET", ["volumes"]) => {
            let list: Vec<_> = state
                .volumes
                .iter()
                .map(|(name, mount)| volume_doc(name, mount))
                .collect();
            ("200 OK", Some(json!({"Volumes": list, "Warnings": null})))
        }
        ("POST", ["volumes", "create"]) => {
            let request: Value = serde_json::from_str(body).unwrap_or_default();
            let Some(name) = request["Name"].as_str() else {
                return ("400 Bad Request", Some(json!({"message": "missing Name"})));
            };
            let mountpoint = volume_root.join(name).join("_data");
            std::fs::create_dir_all(&mountpoint).expect("create mountpoint");
            state.volumes.insert(name.to_string(), mountpoint.clone());
            ("201 Created", Some(volume_doc(name, &mountpoint)))
        }
        ("GET", ["volumes", name]) => match state.volumes.get(*name) {
            Some(mount) => ("200 OK", Some(volume_doc(name, mount))),
            None => ("404 Not Found", no_such("volume")),
        },
        ("DELETE", ["volumes", name]) => match state.volumes.remove(*name) {
            Some(mount) => {
                let _ = std::fs::remove_dir_all(mount);
                ("204 No Content", None)
            }
            None => ("404 Not Found", no_such("volume")),
        },
        ("GET", ["containers", "json"]) => {
            let list: Vec<_> = state
                .containers
                .iter()
                .map(|(id, volumes)| {
                    let mounts: Vec<_> = volumes
                        .iter()
                        .map(|v| json!({"Type": "volume", "Name": v, "Source": format!("/var/lib/docker/volumes/{v}/_data")}))
                        .collect();
                    json!({"Id": id, "Mounts": mounts})
                })
                .collect();
            ("200 OK", Some(Value::Array(list)))
        }
        ("POST", ["containers", id, action @ ("pause" | "unpause")]) => {
            if !state.containers.iter().any(|(c, _)| c == id) {
                return ("404 Not Found", no_such("container"));
            }
            if *action == "pause" {
                state.paused.push(id.to_string());
            } else {
                state.paused.retain(|c| c != id);
            }
            ("204 No Content", None)
        }
        _ => ("404 Not Found", Some(json!({"message": "page not found"}))),
    }
}

fn volume_doc(name: &str, mountpoint: &Path) -> Value {
    json!({"Name": name, "Driver": "local", "Mountpoint": mountpoint})
}

fn read_request(reader: &mut BufReader<UnixStream>) -> Option<(String, String, String)> {
    let mut line = String::new();
    if reader.read_line(&mut line).ok()? == 0 {
        return None;
    }
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();
    let mut length = 0;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                length = value.trim().parse().ok()?;
            }
        }
    }
    let mut body = vec![0; length];
    reader.read_exact(&mut body).ok()?;
    Some((method, path, String::from_utf8(body).ok()?))
}
