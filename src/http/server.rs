//! Accept loop and per-connection request handling.
//!
//! # Responsibilities
//! - Accept client connections until shutdown is signalled
//! - Receive one request per connection and dispatch it through the router
//! - Turn the handler's `Response` into bytes on the wire
//! - Close the connection unless a stream took it over
//!
//! # Design Decisions
//! - One request per connection (`Connection: close`)
//! - Handler failures become 4xx/5xx responses; they never reach the accept loop
//! - A `Response::Stream` return leaves closing to the stream's drain loop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;

use crate::config::HttpConfig;
use crate::http::handler::Handler;
use crate::http::request::{self, RequestError};
use crate::http::response::{ConnectionMode, Response, TEXT_PLAIN};
use crate::http::writer::StreamWriter;
use crate::net::connection::{ActiveConnection, ConnectionId};
use crate::net::listener::{Listener, ListenerError};
use crate::routing::Router;

/// Shared endpoint handler.
pub type SharedHandler = Arc<dyn Handler>;

/// Router over endpoint handlers.
pub type HandlerRouter = Router<SharedHandler>;

/// Body sent when no route matches.
pub const NOT_FOUND_BODY: &str = "Endpoint not found";

/// HTTP server bound to a frozen route table.
pub struct HttpServer {
    router: Arc<HandlerRouter>,
    config: HttpConfig,
    open_connections: Arc<AtomicUsize>,
}

impl HttpServer {
    /// Create a server. All routes must be registered on `router` beforehand.
    pub fn new(router: HandlerRouter, config: HttpConfig) -> Self {
        Self {
            router: Arc::new(router),
            config,
            open_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Run the accept loop until a shutdown signal arrives.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        tracing::info!(
            address = %listener.local_addr().map_err(ListenerError::Accept)?,
            routes = self.router.len(),
            "HTTP server starting"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::error!(error = %e, "Accept failed");
                            continue;
                        }
                    };

                    let router = Arc::clone(&self.router);
                    let config = self.config.clone();
                    let connection = ActiveConnection::open(&self.open_connections);
                    tracing::info!(
                        connection_id = %connection.id(),
                        peer_addr = %peer,
                        active = self.open_connections.load(Ordering::SeqCst),
                        "Client connected"
                    );

                    tokio::spawn(async move {
                        let _permit = permit;
                        handle_connection(&router, &config, stream, connection.id()).await;
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn router(&self) -> &HandlerRouter {
        &self.router
    }
}

/// Serve exactly one request on `stream`.
pub async fn handle_connection<S>(
    router: &HandlerRouter,
    config: &HttpConfig,
    stream: S,
    id: ConnectionId,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut reader, write_half) = tokio::io::split(stream);
    let mut writer = StreamWriter::new(write_half);

    let request = match request::receive(&mut reader, config).await {
        Ok(Some(request)) => request,
        Ok(None) => {
            tracing::debug!(connection_id = %id, "No data received");
            let _ = writer.close().await;
            return;
        }
        Err(e) => {
            let code = match e {
                RequestError::Io(_) => 500,
                _ => 400,
            };
            tracing::warn!(connection_id = %id, error = %e, "Rejecting request");
            send_status(&mut writer, id, code, &format!("Error: {}", e)).await;
            return;
        }
    };

    let endpoint = request.dispatch_key();
    let Some(handler) = router.dispatch_key(&endpoint) else {
        tracing::warn!(connection_id = %id, endpoint = %endpoint, "Endpoint not found");
        send_status(&mut writer, id, 404, NOT_FOUND_BODY).await;
        return;
    };

    tracing::debug!(connection_id = %id, endpoint = %endpoint, "Handling request");
    match handler.handle(&request, &mut writer).await {
        Ok(Response::Stream) => {
            tracing::debug!(connection_id = %id, "Connection handed to stream");
            return;
        }
        Ok(Response::Raw(bytes)) => {
            if let Err(e) = writer.write(&bytes).await {
                tracing::debug!(connection_id = %id, error = %e, "Failed to write response");
            }
            let _ = writer.close().await;
        }
        Ok(Response::Status(code, body)) => {
            send_status(&mut writer, id, code, &body).await;
        }
        Err(e) => {
            tracing::error!(
                connection_id = %id,
                endpoint = %endpoint,
                error = ?e,
                "Handling endpoint request failed"
            );
            send_status(&mut writer, id, e.status(), &format!("Error: {}", e)).await;
        }
    }

    tracing::info!(connection_id = %id, endpoint = %endpoint, "Client request handled");
}

async fn send_status(writer: &mut StreamWriter, id: ConnectionId, code: u16, body: &str) {
    if let Err(e) = writer
        .send_response(code, body, TEXT_PLAIN, ConnectionMode::Close)
        .await
    {
        tracing::debug!(connection_id = %id, error = %e, "Failed to send response");
        let _ = writer.close().await;
    }
}
