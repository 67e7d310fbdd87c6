//! Endpoint handler contract.

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::writer::{StreamWriter, WriterError};
use crate::runner::RunnerError;
use crate::storage::StoreError;

/// Failure inside an endpoint handler.
///
/// Converted by the connection handler into a status response whose body is
/// `Error: <message>`.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    /// Status code reported to the client.
    pub fn status(&self) -> u16 {
        match self {
            HandlerError::BadRequest(_) => 400,
            HandlerError::NotFound(_) => 404,
            HandlerError::Store(StoreError::InvalidName(_)) => 400,
            HandlerError::Store(StoreError::NotFound(_)) => 404,
            _ => 500,
        }
    }
}

/// An endpoint callback.
///
/// Receives the parsed request and the connection's writer. Streaming handlers
/// take the connection with [`StreamWriter::hand_off`] and return
/// [`Response::Stream`].
pub trait Handler: Send + Sync {
    fn handle<'a>(
        &'a self,
        request: &'a Request,
        writer: &'a mut StreamWriter,
    ) -> BoxFuture<'a, Result<Response, HandlerError>>;
}
