//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, one task per connection)
//!     → request.rs (chunked read until headers/body complete, parse request line)
//!     → [routing layer picks the handler]
//!     → handler.rs (endpoint returns Raw | Status | Stream)
//!     → writer.rs (status line + headers + body, or hand-off to a stream)
//! ```

pub mod handler;
pub mod request;
pub mod response;
pub mod server;
pub mod writer;

pub use handler::{Handler, HandlerError};
pub use request::{Request, RequestError};
pub use response::{ConnectionMode, Response};
pub use server::{handle_connection, HandlerRouter, HttpServer, SharedHandler};
pub use writer::{StreamWriter, WriterError};
