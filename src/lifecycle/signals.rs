//! OS signal handling.

use crate::lifecycle::Shutdown;

/// Wait for Ctrl+C, then trigger `shutdown`.
pub async fn shutdown_on_ctrl_c(shutdown: Shutdown) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Interrupt received, shutting down");
            shutdown.trigger();
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for interrupt signal");
        }
    }
}
