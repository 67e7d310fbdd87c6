//! Handler results and status line vocabulary.
//!
//! # Responsibilities
//! - Define the one value every handler returns (`Raw | Status | Stream`)
//! - Map status codes to reason phrases
//!
//! # Design Decisions
//! - A closed enum instead of inspecting the shape of the returned value
//! - `Stream` carries nothing: whoever took the writer owns the connection now

/// Content type used for status responses.
pub const TEXT_PLAIN: &str = "text/plain";

/// Reason phrase for status codes missing from the table.
pub const UNKNOWN_REASON: &str = "Unknown";

/// What the connection handler should do once a handler returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Write these bytes verbatim, then close.
    Raw(Vec<u8>),
    /// Send a formatted status response with a plain-text body, then close.
    Status(u16, String),
    /// Leave the connection alone; a background task owns it.
    Stream,
}

impl Response {
    /// `200` with a plain-text body.
    pub fn ok(body: impl Into<String>) -> Self {
        Response::Status(200, body.into())
    }
}

impl From<String> for Response {
    fn from(body: String) -> Self {
        Response::ok(body)
    }
}

impl From<&str> for Response {
    fn from(body: &str) -> Self {
        Response::ok(body)
    }
}

impl From<Vec<u8>> for Response {
    fn from(bytes: Vec<u8>) -> Self {
        Response::Raw(bytes)
    }
}

/// Reason phrase for a status code.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => UNKNOWN_REASON,
    }
}

/// Value of the `Connection` header, and whether the writer closes after sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    Close,
    KeepAlive,
}

impl ConnectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionMode::Close => "close",
            ConnectionMode::KeepAlive => "keep-alive",
        }
    }
}

/// Format a status line, `Content-Type`, `Connection`, blank line and body.
pub fn format_response(code: u16, body: &str, content_type: &str, mode: ConnectionMode) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nConnection: {}\r\n\r\n{}",
        code,
        reason_phrase(code),
        content_type,
        mode.as_str(),
        body
    )
}
