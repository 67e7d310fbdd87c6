//! Outbound half of a client connection.
//!
//! # Responsibilities
//! - Send formatted status responses
//! - Write raw bytes unbuffered
//! - Close the connection exactly once
//! - Hand the connection over to a streaming task
//!
//! # Design Decisions
//! - The transport is boxed so handlers are not generic over the socket type
//! - Peer resets surface as `WriterError::Disconnected` so callers can stop quietly
//! - After `close` or `hand_off` the writer is inert: writes fail with `Closed`

use std::io;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::{format_response, ConnectionMode};

/// Boxed outbound transport.
pub type Transport = Box<dyn AsyncWrite + Send + Unpin>;

/// Errors raised while writing to a client.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("connection already closed")]
    Closed,

    #[error("client disconnected: {0}")]
    Disconnected(#[source] io::Error),

    #[error("write failed: {0}")]
    Io(#[source] io::Error),
}

impl WriterError {
    pub fn is_disconnect(&self) -> bool {
        matches!(self, WriterError::Disconnected(_))
    }
}

impl From<io::Error> for WriterError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero => WriterError::Disconnected(e),
            _ => WriterError::Io(e),
        }
    }
}

/// Writes responses to one client connection.
pub struct StreamWriter {
    inner: Option<Transport>,
}

impl StreamWriter {
    pub fn new<W>(transport: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Some(Box::new(transport)),
        }
    }

    /// Send a complete response. Closes afterwards when `mode` is `Close`.
    pub async fn send_response(
        &mut self,
        code: u16,
        body: &str,
        content_type: &str,
        mode: ConnectionMode,
    ) -> Result<(), WriterError> {
        let response = format_response(code, body, content_type, mode);
        self.write(response.as_bytes()).await?;

        if mode == ConnectionMode::Close {
            self.close().await?;
        }
        Ok(())
    }

    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), WriterError> {
        let transport = self.inner.as_mut().ok_or(WriterError::Closed)?;
        transport.write_all(bytes).await?;
        transport.flush().await?;
        Ok(())
    }

    /// Shut the connection down. Closing an already closed writer is a no-op.
    pub async fn close(&mut self) -> Result<(), WriterError> {
        match self.inner.take() {
            Some(mut transport) => {
                transport.shutdown().await?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Move the connection into a new writer, leaving this one closed.
    pub fn hand_off(&mut self) -> Result<StreamWriter, WriterError> {
        let transport = self.inner.take().ok_or(WriterError::Closed)?;
        Ok(StreamWriter {
            inner: Some(transport),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("closed", &self.is_closed())
            .finish()
    }
}
