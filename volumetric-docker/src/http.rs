//! Minimal HTTP/1.1 framing over a byte stream.
//!
//! Requests are always sent with a complete body and `Host: localhost`.
//! Responses are read in full: `Content-Length`, chunked, bodiless statuses,
//! and read-until-close bodies are understood. Nothing else is.

use std::io::{BufRead, Write};
use std::path::Path;

use crate::error::{invalid_response, transport_err, DockerError};

const USER_AGENT: &str = concat!("volumetric/", env!("CARGO_PKG_VERSION"));

/// A fully buffered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Response {
    pub status: u16,
    pub reason: String,
    pub body: Vec<u8>,
    /// The server will not accept another request on this connection.
    pub close: bool,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ---------------------------------------------------------------------------
// 1. Requests
// ---------------------------------------------------------------------------

/// Serialize one request. The caller flushes.
pub(crate) fn encode_request(method: &str, path: &str, body: Option<&[u8]>) -> Vec<u8> {
    let mut head = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nUser-Agent: {USER_AGENT}\r\nAccept: application/json\r\n"
    );
    match body {
        Some(body) => {
            head.push_str("Content-Type: application/json\r\n");
            head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
            let mut bytes = head.into_bytes();
            bytes.extend_from_slice(body);
            bytes
        }
        None => {
            // POST and DELETE without a body still need an explicit length.
            if method != "GET" {
                head.push_str("Content-Length: 0\r\n");
            }
            head.push_str("\r\n");
            head.into_bytes()
        }
    }
}

pub(crate) fn write_request<W: Write>(
    writer: &mut W,
    socket: &Path,
    method: &str,
    path: &str,
    body: Option<&[u8]>,
) -> Result<(), DockerError> {
    let bytes = encode_request(method, path, body);
    writer.write_all(&bytes).map_err(|e| transport_err(socket, e))?;
    writer.flush().map_err(|e| transport_err(socket, e))
}

// ---------------------------------------------------------------------------
// 2. Responses
// ---------------------------------------------------------------------------

enum Framing {
    Empty,
    Length(usize),
    Chunked,
    UntilClose,
}

pub(crate) fn read_response<R: BufRead>(
    reader: &mut R,
    socket: &Path,
) -> Result<Response, DockerError> {
    let status_line = read_line(reader, socket)?
        .ok_or_else(|| {
            transport_err(
                socket,
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed before a response arrived",
                ),
            )
        })?;
    let (version, status, reason) = parse_status_line(&status_line)?;

    let mut content_length = None;
    let mut chunked = false;
    let mut close = version == "HTTP/1.0";
    loop {
        let line = read_line(reader, socket)?
            .ok_or_else(|| invalid_response("connection closed inside headers"))?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| invalid_response(format!("malformed header line '{line}'")))?;
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "content-length" => {
                let len = value.parse::<usize>().map_err(|_| {
                    invalid_response(format!("invalid Content-Length '{value}'"))
                })?;
                content_length = Some(len);
            }
            "transfer-encoding" => {
                chunked = value
                    .split(',')
                    .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
            }
            "connection" => {
                if value.eq_ignore_ascii_case("close") {
                    close = true;
                } else if value.eq_ignore_ascii_case("keep-alive") {
                    close = false;
                }
            }
            _ => {}
        }
    }

    let framing = if (100..200).contains(&status) || status == 204 || status == 304 {
        Framing::Empty
    } else if chunked {
        Framing::Chunked
    } else if let Some(len) = content_length {
        Framing::Length(len)
    } else {
        Framing::UntilClose
    };

    let body = match framing {
        Framing::Empty => Vec::new(),
        Framing::Length(len) => {
            let mut body = vec![0u8; len];
            reader
                .read_exact(&mut body)
                .map_err(|e| transport_err(socket, e))?;
            body
        }
        Framing::Chunked => read_chunked(reader, socket)?,
        Framing::UntilClose => {
            close = true;
            let mut body = Vec::new();
            reader
                .read_to_end(&mut body)
                .map_err(|e| transport_err(socket, e))?;
            body
        }
    };

    Ok(Response {
        status,
        reason,
        body,
        close,
    })
}

fn parse_status_line(line: &str) -> Result<(&str, u16, String), DockerError> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(invalid_response(format!("bad status line '{line}'")));
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .filter(|s| (100..600).contains(s))
        .ok_or_else(|| invalid_response(format!("bad status code in '{line}'")))?;
    let reason = parts.next().unwrap_or_default().to_string();
    Ok((version, status, reason))
}

fn read_chunked<R: BufRead>(reader: &mut R, socket: &Path) -> Result<Vec<u8>, DockerError> {
    let mut body = Vec::new();
    loop {
        let line = read_line(reader, socket)?
            .ok_or_else(|| invalid_response("connection closed inside chunked body"))?;
        let size_text = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| invalid_response(format!("invalid chunk size '{size_text}'")))?;
        if size == 0 {
            // Trailers, then the terminating blank line.
            loop {
                match read_line(reader, socket)? {
                    Some(trailer) if !trailer.is_empty() => continue,
                    _ => return Ok(body),
                }
            }
        }
        let start = body.len();
        body.resize(start + size, 0);
        reader
            .read_exact(&mut body[start..])
            .map_err(|e| transport_err(socket, e))?;
        match read_line(reader, socket)? {
            Some(rest) if rest.is_empty() => {}
            _ => return Err(invalid_response("chunk not terminated by CRLF")),
        }
    }
}

/// One CRLF- (or LF-) terminated line without its terminator; `None` at EOF.
fn read_line<R: BufRead>(reader: &mut R, socket: &Path) -> Result<Option<String>, DockerError> {
    let mut raw = Vec::new();
    let read = reader
        .read_until(b'\n', &mut raw)
        .map_err(|e| transport_err(socket, e))?;
    if read == 0 {
        return Ok(None);
    }
    if raw.last() == Some(&b'\n') {
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
    }
    String::from_utf8(raw)
        .map(Some)
        .map_err(|_| invalid_response("non UTF-8 bytes in response head"))
}
