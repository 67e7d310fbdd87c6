//! HTTP bootloader.
//!
//! ```text
//!     Client ──▶ net::Listener ──▶ http::server ──▶ routing::Router ──▶ bootloader endpoints
//!                                                                          │
//!                        ┌─────────────────────────────────────────────────┘
//!                        ▼
//!              runner::ScriptRunner ──▶ worker thread ──▶ stream channel
//!                                                              │
//!     Client ◀── text/event-stream ◀── stream::drain ◀────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use http_bootloader::config::{load_config, BootloaderConfig};
use http_bootloader::lifecycle::{shutdown_on_ctrl_c, Shutdown};
use http_bootloader::net::{bring_up, HostConnectivity, Listener};
use http_bootloader::observability;
use http_bootloader::storage::DirStore;
use http_bootloader::Bootloader;

#[derive(Debug, Parser)]
#[command(name = "http-bootloader", version, about = "Upload, run and stop scripts over HTTP")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,

    /// Override `storage.root`.
    #[arg(long)]
    root: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BootloaderConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(root) = cli.root {
        config.storage.root = root;
    }

    observability::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "http-bootloader starting");

    if let Some(address) = bring_up(&HostConnectivity, &config.network).await? {
        tracing::info!(address = %address, "Network ready");
    }

    let store = Arc::new(DirStore::new(&config.storage.root));
    tracing::info!(root = %config.storage.root, "Serving files");

    let bootloader = Bootloader::new(&config, store)?;
    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let signal = tokio::spawn(shutdown_on_ctrl_c(shutdown.clone()));

    bootloader.into_server().run(listener, shutdown.subscribe()).await?;
    signal.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
