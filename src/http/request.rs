//! Request reception and parsing.
//!
//! # Responsibilities
//! - Read a request off the socket in fixed-size chunks
//! - Stop once the header terminator (and any `Content-Length` body) has arrived
//! - Bound the whole read by a timeout
//! - Split the request line into method and path
//!
//! # Design Decisions
//! - A read that times out is treated like an empty request
//! - The raw bytes are kept: handlers that need the body (upload) re-split them
//! - Without `Content-Length` only the headers are guaranteed to be complete

use std::borrow::Cow;
use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::HttpConfig;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Errors raised while receiving or parsing a request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("error reading request: {0}")]
    Io(#[from] io::Error),

    #[error("request exceeds {0} bytes")]
    TooLarge(usize),

    #[error("malformed request: {0}")]
    Malformed(&'static str),
}

/// One parsed HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    raw: Vec<u8>,
    header_len: usize,
    method: String,
    path: String,
    headers: Vec<(String, String)>,
}

impl Request {
    /// Parse the bytes received for one request.
    pub fn parse(raw: Vec<u8>) -> Result<Self, RequestError> {
        let header_len = header_end(&raw).ok_or(RequestError::Malformed("missing header terminator"))?;
        let head = std::str::from_utf8(&raw[..header_len])
            .map_err(|_| RequestError::Malformed("request head is not valid utf8"))?;

        let mut lines = head.split("\r\n");
        let mut request_line = lines.next().unwrap_or_default().split(' ');
        let method = request_line
            .next()
            .filter(|m| !m.is_empty())
            .ok_or(RequestError::Malformed("missing method"))?
            .to_string();
        let path = request_line
            .next()
            .filter(|p| !p.is_empty())
            .ok_or(RequestError::Malformed("missing path"))?
            .to_string();

        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .collect();

        Ok(Self {
            raw,
            header_len,
            method,
            path,
            headers,
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The `"{METHOD} {PATH}"` string routes are matched against.
    pub fn dispatch_key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("Content-Length").and_then(|v| v.parse().ok())
    }

    /// Body bytes received after the header terminator.
    pub fn body(&self) -> &[u8] {
        &self.raw[self.header_len..]
    }

    /// Everything received, as bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Everything received, decoded as text.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }
}

/// Position just past the first `\r\n\r\n`, if present.
pub fn header_end(data: &[u8]) -> Option<usize> {
    find_subslice(data, HEADER_TERMINATOR).map(|pos| pos + HEADER_TERMINATOR.len())
}

pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn declared_body_len(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Read until the headers (and declared body) arrived or the peer closed.
async fn read_raw<R>(reader: &mut R, config: &HttpConfig) -> Result<Vec<u8>, RequestError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut chunk = vec![0u8; config.read_chunk_size];
    let mut expected: Option<usize> = None;

    loop {
        if matches!(expected, Some(total) if buffer.len() >= total) {
            break;
        }

        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);

        if buffer.len() > config.max_request_bytes {
            return Err(RequestError::TooLarge(config.max_request_bytes));
        }

        if expected.is_none() {
            if let Some(end) = header_end(&buffer) {
                expected = Some(end + declared_body_len(&buffer[..end]));
            }
        }
    }

    Ok(buffer)
}

/// Receive one request.
///
/// Returns `Ok(None)` when nothing usable arrived: the peer sent no bytes or the
/// read timed out.
pub async fn receive<R>(reader: &mut R, config: &HttpConfig) -> Result<Option<Request>, RequestError>
where
    R: AsyncRead + Unpin,
{
    let raw = match tokio::time::timeout(config.read_timeout(), read_raw(reader, config)).await {
        Ok(result) => result?,
        Err(_) => {
            tracing::warn!(timeout_secs = config.read_timeout_secs, "Timed out reading request");
            return Ok(None);
        }
    };

    tracing::debug!(bytes = raw.len(), "Received request");
    if raw.is_empty() {
        return Ok(None);
    }

    Request::parse(raw).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn small_chunks() -> HttpConfig {
        HttpConfig {
            read_chunk_size: 4,
            ..HttpConfig::default()
        }
    }

    #[test]
    fn parses_request_line_and_headers() {
        let req = Request::parse(
            b"GET /run?file=a.py HTTP/1.1\r\nHost: device\r\ncontent-length: 3\r\n\r\nabc".to_vec(),
        )
        .unwrap();

        assert_eq!(req.method(), "GET");
        assert_eq!(req.path(), "/run?file=a.py");
        assert_eq!(req.dispatch_key(), "GET /run?file=a.py");
        assert_eq!(req.header("HOST"), Some("device"));
        assert_eq!(req.content_length(), Some(3));
        assert_eq!(req.body(), b"abc");
        assert!(req.text().starts_with("GET /run"));
    }

    #[test]
    fn rejects_malformed_requests() {
        assert!(matches!(
            Request::parse(b"GET / HTTP/1.1\r\n".to_vec()),
            Err(RequestError::Malformed(_))
        ));
        assert!(matches!(
            Request::parse(b"GET\r\n\r\n".to_vec()),
            Err(RequestError::Malformed("missing path"))
        ));
        assert!(matches!(
            Request::parse(b"\r\n\r\n".to_vec()),
            Err(RequestError::Malformed("missing method"))
        ));
    }

    #[test]
    fn locates_header_terminator() {
        assert_eq!(header_end(b"GET / HTTP/1.1\r\n\r\nbody"), Some(18));
        assert_eq!(header_end(b"GET / HTTP/1.1\r\n"), None);
        assert_eq!(find_subslice(b"abc", b""), None);
    }

    #[tokio::test]
    async fn reads_headers_across_chunks() {
        let mut input: &[u8] = b"GET /files HTTP/1.1\r\nAccept: */*\r\n\r\n";
        let req = receive(&mut input, &small_chunks()).await.unwrap().unwrap();
        assert_eq!(req.dispatch_key(), "GET /files");
    }

    #[tokio::test]
    async fn waits_for_declared_body() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let config = small_chunks();
        let reader = tokio::spawn(async move { receive(&mut server, &config).await });

        client
            .write_all(b"POST /upload HTTP/1.1\r\nContent-Length: 10\r\n\r\n01234")
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        client.write_all(b"56789").await.unwrap();

        let req = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(req.body(), b"0123456789");
    }

    #[tokio::test]
    async fn empty_connection_yields_none() {
        let mut input: &[u8] = b"";
        assert!(receive(&mut input, &HttpConfig::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let (_client, mut server) = tokio::io::duplex(64);
        let config = HttpConfig {
            read_timeout_secs: 1,
            ..HttpConfig::default()
        };
        assert!(receive(&mut server, &config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_request_is_rejected() {
        let mut input: &[u8] = b"GET /aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa HTTP/1.1\r\n\r\n";
        let config = HttpConfig {
            max_request_bytes: 16,
            read_chunk_size: 8,
            ..HttpConfig::default()
        };
        assert!(matches!(
            receive(&mut input, &config).await,
            Err(RequestError::TooLarge(16))
        ));
    }
}
