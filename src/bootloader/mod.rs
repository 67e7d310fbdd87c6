//! Composition root: the bootloader's routes and its single script runner.
//!
//! # Data Flow
//! ```text
//! Bootloader::new
//!     → load index document (store, else built-in page)
//!     → ScriptRunner (one per process)
//!     → register endpoints on the Router
//!     → into_server → HttpServer::run
//! ```
//!
//! # Routes
//! | Endpoint | Response |
//! |---|---|
//! | `GET /` | cached index document |
//! | `GET /files` | newline-joined listing |
//! | `POST /upload` | stores the uploaded part |
//! | `GET /run?file=*.<ext>` | event stream of the run's output |
//! | `GET /stop` | `Stopped` once the run has exited |
//! | `GET /status` | runner state as JSON |
//! | `DELETE /files/*` | removes a file |

pub mod endpoints;

pub use endpoints::{
    DeleteFileEndpoint, IndexEndpoint, ListFilesEndpoint, RunScriptEndpoint, StatusEndpoint,
    StopScriptEndpoint, UploadEndpoint,
};

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{BootloaderConfig, HttpConfig};
use crate::http::{HandlerRouter, HttpServer};
use crate::routing::RouteError;
use crate::runner::ScriptRunner;
use crate::storage::{FileStore, StoreError};

/// Index page used when the store has no index document.
pub const BUILTIN_INDEX: &str = include_str!("index.html");

pub struct Bootloader {
    router: HandlerRouter,
    runner: Arc<Mutex<ScriptRunner>>,
    http: HttpConfig,
}

impl Bootloader {
    pub fn new(config: &BootloaderConfig, store: Arc<dyn FileStore>) -> Result<Self, RouteError> {
        let index = load_index(store.as_ref(), &config.storage.index_file);
        let runner = ScriptRunner::new(&config.runner, &config.stream);
        let state = runner.subscribe();
        let runner = Arc::new(Mutex::new(runner));

        let upload = UploadEndpoint::new(Arc::clone(&store)).map_err(|source| RouteError::InvalidPattern {
            pattern: endpoints::FILENAME_PATTERN.to_string(),
            source,
        })?;
        let run_pattern = format!("GET /run?file=*.{}", config.runner.script_extension);

        let mut router = HandlerRouter::new();
        router.register("GET /", Arc::new(IndexEndpoint::new(&index)))?;
        router.register("GET /files", Arc::new(ListFilesEndpoint::new(Arc::clone(&store))))?;
        router.register("POST /upload", Arc::new(upload))?;
        router.register(
            &run_pattern,
            Arc::new(RunScriptEndpoint::new(
                Arc::clone(&store),
                Arc::clone(&runner),
                config.runner.clone(),
                config.stream.poll_interval(),
            )),
        )?;
        router.register("GET /stop", Arc::new(StopScriptEndpoint::new(Arc::clone(&runner))))?;
        router.register("GET /status", Arc::new(StatusEndpoint::new(state)))?;
        router.register("DELETE /files/*", Arc::new(DeleteFileEndpoint::new(store)))?;
        tracing::info!(routes = router.len(), "Endpoints registered");

        Ok(Self {
            router,
            runner,
            http: config.http.clone(),
        })
    }

    pub fn router(&self) -> &HandlerRouter {
        &self.router
    }

    pub fn runner(&self) -> Arc<Mutex<ScriptRunner>> {
        Arc::clone(&self.runner)
    }

    pub fn into_server(self) -> HttpServer {
        HttpServer::new(self.router, self.http)
    }
}

fn load_index(store: &dyn FileStore, name: &str) -> Vec<u8> {
    match store.read(name) {
        Ok(document) => {
            tracing::info!(file = %name, bytes = document.len(), "Index document loaded");
            document
        }
        Err(StoreError::NotFound(_)) => {
            tracing::info!(file = %name, "Index document not found, using built-in page");
            BUILTIN_INDEX.as_bytes().to_vec()
        }
        Err(e) => {
            tracing::warn!(file = %name, error = %e, "Failed to load index document, using built-in page");
            BUILTIN_INDEX.as_bytes().to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn registers_all_routes() {
        let bootloader = Bootloader::new(&BootloaderConfig::default(), Arc::new(MemoryStore::new())).unwrap();
        let router = bootloader.router();

        for key in [
            "GET /",
            "GET /files",
            "POST /upload",
            "GET /run?file=blink.py",
            "GET /stop",
            "GET /status",
            "DELETE /files/blink.py",
        ] {
            assert!(router.dispatch_key(key).is_some(), "no route for {}", key);
        }
        assert!(router.dispatch_key("GET /run?file=blink.sh").is_none());
        assert!(router.dispatch_key("POST /files").is_none());
    }

    #[test]
    fn run_route_follows_configured_extension() {
        let mut config = BootloaderConfig::default();
        config.runner.script_extension = "sh".into();
        let bootloader = Bootloader::new(&config, Arc::new(MemoryStore::new())).unwrap();

        assert!(bootloader.router().dispatch_key("GET /run?file=job.sh").is_some());
        assert!(bootloader.router().dispatch_key("GET /run?file=job.py").is_none());
    }

    #[test]
    fn index_prefers_stored_document() {
        let store = MemoryStore::with_files([("bootloader_index.html", "<p>custom</p>")]);
        assert_eq!(load_index(&store, "bootloader_index.html"), b"<p>custom</p>");
        assert_eq!(load_index(&MemoryStore::new(), "bootloader_index.html"), BUILTIN_INDEX.as_bytes());
    }
}
