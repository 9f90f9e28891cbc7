//! The request/connection seam between the dispatcher and handler code.
//!
//! A [`Request`] is parsed straight off the socket with a bounded line reader;
//! a [`Connection`] pairs the parsed request with the write side of the socket
//! and carries the response helpers. Serving consumes the connection, so every
//! response path ends with the stream shut down.

use crate::buffer::MemoryFile;
use crate::mime::mime_of;
use std::io;
use std::time::SystemTime;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_REQUEST_LINE: usize = 8192;
const MAX_HEADERS: usize = 100;
const MAX_BODY: usize = 8 * 1024 * 1024;

// Large-transfer threshold for the write-failure policy in `serve_bytes`.
const MEGABYTE: usize = 1024 * 1024;

/// A parsed inbound HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method, as received.
    pub method: String,
    /// The raw request target, before any normalization.
    pub target: String,
    /// Lower-cased request path with query and fragment stripped.
    pub path: String,
    query: String,
    headers: Vec<(String, String)>,
    /// Request body, fully read into memory.
    pub body: Vec<u8>,
}

impl Request {
    /// Builds a synthetic request, mainly for wiring handlers up in tests.
    pub fn new(method: &str, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method: method.to_string(),
            target: target.to_string(),
            path,
            query,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Reads one request from the stream. `Ok(None)` means the peer closed
    /// the connection before sending anything.
    pub async fn read_from<R>(reader: &mut R) -> io::Result<Option<Request>>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        if line.len() > MAX_REQUEST_LINE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "request line too long"));
        }

        let (method, target) = parse_request_line(line.trim())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed request line"))?;
        let (path, query) = split_target(&target);

        let mut headers = Vec::new();
        let mut content_length = 0usize;
        let mut header_line = String::new();
        loop {
            header_line.clear();
            if reader.read_line(&mut header_line).await? == 0 {
                break;
            }
            let trimmed = header_line.trim();
            if trimmed.is_empty() {
                break;
            }
            if headers.len() >= MAX_HEADERS {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "too many headers"));
            }
            if let Some((name, value)) = trimmed.split_once(':') {
                let name = name.trim().to_string();
                let value = value.trim().to_string();
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.parse().map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, "bad content-length")
                    })?;
                }
                headers.push((name, value));
            }
        }

        if content_length > MAX_BODY {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "request body too large"));
        }
        let mut body = vec![0u8; content_length];
        if content_length > 0 {
            reader.read_exact(&mut body).await?;
        }

        Ok(Some(Request {
            method,
            target,
            path,
            query,
            headers,
            body,
        }))
    }

    /// Case-insensitive lookup of a query parameter; returns the first,
    /// percent-decoded value.
    pub fn query(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.into_owned())
    }

    /// Case-insensitive lookup of a request header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The request body decoded as UTF-8, lossily.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// Splits a request target into (lower-cased path, raw query string).
fn split_target(target: &str) -> (String, String) {
    let without_fragment = target.split('#').next().unwrap_or(target);
    match without_fragment.split_once('?') {
        Some((path, query)) => (path.to_lowercase(), query.to_string()),
        None => (without_fragment.to_lowercase(), String::new()),
    }
}

// Exactly three non-empty space-separated parts: method, target, version.
fn parse_request_line(line: &str) -> Option<(String, String)> {
    let mut parts = line.split(' ').filter(|part| !part.is_empty());
    let method = parts.next()?;
    let target = parts.next()?;
    let version = parts.next()?;
    if parts.next().is_some() || !version.starts_with("HTTP/") {
        return None;
    }
    Some((method.to_string(), target.to_string()))
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

/// One accepted connection: the parsed request plus the socket's write side.
pub struct Connection {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    pub request: Request,
    status: u16,
}

impl Connection {
    pub fn new(request: Request, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: Box::new(writer),
            request,
            status: 200,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn query(&self, name: &str) -> Option<String> {
        self.request.query(name)
    }

    /// Serves a binary payload and closes the connection.
    ///
    /// `mime` may be a content type or a dot-prefixed extension to resolve.
    /// Returns the status the response ended with. A failed write on a payload
    /// under 1 MiB overrides the status to 504; at or above 1 MiB the failure
    /// is deliberately ignored, because large transfers were observed to trip
    /// spurious connection resets that clients recover from on their own.
    pub async fn serve_bytes(mut self, bytes: &[u8], mime: &str) -> u16 {
        let mime = if mime.starts_with('.') { mime_of(mime) } else { mime };
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nDate: {}\r\nConnection: keep-alive\r\n\r\n",
            self.status,
            reason_phrase(self.status),
            mime,
            bytes.len(),
            httpdate::fmt_http_date(SystemTime::now()),
        );

        let result = async {
            self.writer.write_all(head.as_bytes()).await?;
            self.writer.write_all(bytes).await?;
            self.writer.flush().await
        }
        .await;

        if let Err(err) = result {
            if bytes.len() < MEGABYTE {
                self.status = 504;
                let error_head = format!(
                    "HTTP/1.1 504 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    reason_phrase(504)
                );
                let _ = self.writer.write_all(error_head.as_bytes()).await;
            } else {
                tracing::debug!(error = %err, bytes = bytes.len(), "write failed on large transfer, ignoring");
            }
        }

        let _ = self.writer.shutdown().await;
        self.status
    }

    /// Serves UTF-8 text and closes the connection.
    pub async fn serve_text(self, text: &str, mime: &str) -> u16 {
        self.serve_bytes(text.as_bytes(), mime).await
    }

    /// Serves an in-memory file and closes the connection.
    pub async fn serve_file(self, file: &MemoryFile) -> u16 {
        self.serve_bytes(file.content.bytes(), &file.mime).await
    }

    /// Ratios the client with a 404 carrying the attempted subpath.
    pub async fn ratio(mut self, sign: &str) -> u16 {
        self.set_status(404);
        let body = format!("404'd, ratio.\n{sign}");
        self.serve_text(&body, "text/plain").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_rejects_extra_parts() {
        assert!(parse_request_line("GET /x HTTP/1.1 extra").is_none());
        assert!(parse_request_line("GET /x").is_none());
        assert!(parse_request_line("GET /x HTTP/1.1").is_some());
    }

    #[test]
    fn target_splitting_lowers_path_and_keeps_query_raw() {
        let req = Request::new("GET", "/Gfx/Game/Tile.PNG?Name=Ab%20c");
        assert_eq!(req.path, "/gfx/game/tile.png");
        assert_eq!(req.query("name").as_deref(), Some("Ab c"));
        assert_eq!(req.query("NAME").as_deref(), Some("Ab c"));
        assert_eq!(req.query("missing"), None);
    }

    #[tokio::test]
    async fn headers_and_body_survive_the_parse() {
        let raw: &[u8] =
            b"POST /submit HTTP/1.1\r\nHost: localhost\r\nX-Token: abc123\r\nContent-Length: 5\r\n\r\nhello";
        let mut reader = tokio::io::BufReader::new(raw);
        let req = Request::read_from(&mut reader)
            .await
            .expect("parse")
            .expect("one request");

        assert_eq!(req.method, "POST");
        assert_eq!(req.header("x-token"), Some("abc123"));
        assert_eq!(req.header("X-TOKEN"), Some("abc123"));
        assert_eq!(req.header("absent"), None);
        assert_eq!(req.body, b"hello");
        assert_eq!(req.body_text(), "hello");
    }

    #[test]
    fn synthetic_requests_can_carry_a_body() {
        let req = Request::new("POST", "/submit").with_body(b"payload".to_vec());
        assert_eq!(req.body_text(), "payload");
    }
}
