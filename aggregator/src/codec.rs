//! Request/response codec (spec §4.3): the HTTP-shaped dialect layered on
//! top of the raw [`transport`](crate::transport) line/byte primitives.

use crate::error::{AggError, ClientFormatError};
use crate::transport::Connection;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
}

/// A fully parsed request: method, headers (case-sensitive keys, unknown
/// ones preserved but ignored by handlers), and the raw body bytes.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|v| v.as_str())
    }
}

/// Reads one request off `conn`: start line, headers until a blank line,
/// then exactly `Content-Length` body bytes (absent => zero) (spec §4.3).
pub async fn read_request<S>(conn: &mut Connection<S>) -> Result<Request, AggError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite,
{
    let start_line = conn.read_line().await?.ok_or_else(eof)?;
    let (method, path) = parse_start_line(&start_line)?;

    let mut headers = HashMap::new();
    loop {
        let line = conn.read_line().await?.ok_or_else(eof)?;
        if line.is_empty() {
            break;
        }
        let (key, value) = parse_header_line(&line)?;
        headers.insert(key, value);
    }

    let content_length = match headers.get("Content-Length") {
        Some(v) => v.parse::<usize>().map_err(|_| ClientFormatError::JsonError)?,
        None => 0,
    };
    let body = if content_length > 0 {
        conn.read_exact_body(content_length).await?
    } else {
        Vec::new()
    };

    Ok(Request {
        method,
        path,
        headers,
        body,
    })
}

/// A connection closed before a full request arrived is a transport
/// condition, not a malformed one (spec §4.1).
fn eof() -> AggError {
    AggError::Transport(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "connection closed before request was complete",
    ))
}

/// `<METHOD> <path> HTTP/1.1`. Any method other than GET/PUT is rejected
/// with `400 Bad Request` (spec §4.3).
fn parse_start_line(line: &str) -> Result<(Method, String), AggError> {
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("").to_string();
    let method = match method {
        "GET" => Method::Get,
        "PUT" => Method::Put,
        _ => return Err(ClientFormatError::UnknownMethod.into()),
    };
    Ok((method, path))
}

/// `Key: value`, tolerating a single space after the colon; keys stay
/// case-sensitive (spec §4.3).
fn parse_header_line(line: &str) -> Result<(String, String), AggError> {
    let idx = line.find(':').ok_or(ClientFormatError::JsonError)?;
    let key = line[..idx].to_string();
    let mut value = &line[idx + 1..];
    if let Some(stripped) = value.strip_prefix(' ') {
        value = stripped;
    }
    Ok((key, value.to_string()))
}

/// Writes a single response line and closes the framing (no headers, no
/// chunking) (spec §4.3, §6).
pub async fn write_response<S>(conn: &mut Connection<S>, line: &str) -> Result<(), AggError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite,
{
    conn.write_line(line).await
}
