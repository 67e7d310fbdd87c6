//! Concrete bootloader endpoints.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use regex::bytes::Regex;
use tokio::sync::{watch, Mutex};

use crate::config::RunnerConfig;
use crate::http::request::{find_subslice, Request};
use crate::http::response::{format_response, ConnectionMode};
use crate::http::{Handler, HandlerError, Response, StreamWriter};
use crate::runner::{ProcessScript, RunnerState, ScriptRunner};
use crate::storage::FileStore;
use crate::stream::{drain, open_event_stream};

/// Name used for uploads that carry no `filename="..."` parameter.
pub const UNKNOWN_FILE: &str = "unknown_file";

/// Pattern of the `filename` parameter in a part's `Content-Disposition`.
pub const FILENAME_PATTERN: &str = r#"filename="([^"]+)""#;

const PART_HEADER_END: &[u8] = b"\r\n\r\n";
const TRAILING_BOUNDARY: &[u8] = b"\r\n------";
const RUN_QUERY_PREFIX: &str = "/run?file=";
const FILES_PREFIX: &str = "/files/";

/// `GET /`: the pre-rendered index response.
pub struct IndexEndpoint {
    response: Vec<u8>,
}

impl IndexEndpoint {
    pub fn new(document: &[u8]) -> Self {
        let html = String::from_utf8_lossy(document);
        let response = format_response(200, &html, "text/html", ConnectionMode::Close);
        Self {
            response: response.into_bytes(),
        }
    }
}

impl Handler for IndexEndpoint {
    fn handle<'a>(
        &'a self,
        _request: &'a Request,
        _writer: &'a mut StreamWriter,
    ) -> BoxFuture<'a, Result<Response, HandlerError>> {
        Box::pin(async move { Ok(Response::Raw(self.response.clone())) })
    }
}

/// `GET /files`: newline-joined listing.
pub struct ListFilesEndpoint {
    store: Arc<dyn FileStore>,
}

impl ListFilesEndpoint {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }
}

impl Handler for ListFilesEndpoint {
    fn handle<'a>(
        &'a self,
        _request: &'a Request,
        _writer: &'a mut StreamWriter,
    ) -> BoxFuture<'a, Result<Response, HandlerError>> {
        Box::pin(async move {
            let files = self.store.list()?;
            tracing::debug!(count = files.len(), "Listing files");
            Ok(Response::ok(files.join("\n")))
        })
    }
}

/// `POST /upload`: store the first multipart part under its file name.
pub struct UploadEndpoint {
    store: Arc<dyn FileStore>,
    filename: Regex,
}

impl UploadEndpoint {
    pub fn new(store: Arc<dyn FileStore>) -> Result<Self, regex::Error> {
        Ok(Self {
            store,
            filename: Regex::new(FILENAME_PATTERN)?,
        })
    }

    /// Split an upload body into the target name and the file contents.
    ///
    /// The part header ends at the first blank line; the contents end where
    /// the closing boundary line starts.
    pub fn extract<'b>(&self, body: &'b [u8]) -> Result<(String, &'b [u8]), HandlerError> {
        let header_end = find_subslice(body, PART_HEADER_END)
            .ok_or_else(|| HandlerError::BadRequest("upload has no part header".into()))?;
        let header = &body[..header_end];
        let content = &body[header_end + PART_HEADER_END.len()..];

        let name = self
            .filename
            .captures(header)
            .and_then(|captures| captures.get(1))
            .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
            .unwrap_or_else(|| UNKNOWN_FILE.to_string());

        let content = match find_subslice(content, TRAILING_BOUNDARY) {
            Some(end) => &content[..end],
            None => content,
        };
        Ok((name, content))
    }
}

impl Handler for UploadEndpoint {
    fn handle<'a>(
        &'a self,
        request: &'a Request,
        _writer: &'a mut StreamWriter,
    ) -> BoxFuture<'a, Result<Response, HandlerError>> {
        Box::pin(async move {
            let (name, content) = self.extract(request.body())?;
            self.store.write(&name, content)?;
            tracing::info!(file = %name, bytes = content.len(), "File saved");
            Ok(Response::ok(format!("File '{}' saved successfully.", name)))
        })
    }
}

/// `GET /run?file=<name>`: start a run and stream its output.
pub struct RunScriptEndpoint {
    store: Arc<dyn FileStore>,
    runner: Arc<Mutex<ScriptRunner>>,
    config: RunnerConfig,
    poll_interval: Duration,
}

impl RunScriptEndpoint {
    pub fn new(
        store: Arc<dyn FileStore>,
        runner: Arc<Mutex<ScriptRunner>>,
        config: RunnerConfig,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            runner,
            config,
            poll_interval,
        }
    }
}

impl Handler for RunScriptEndpoint {
    fn handle<'a>(
        &'a self,
        request: &'a Request,
        writer: &'a mut StreamWriter,
    ) -> BoxFuture<'a, Result<Response, HandlerError>> {
        Box::pin(async move {
            let name = request
                .path()
                .strip_prefix(RUN_QUERY_PREFIX)
                .ok_or_else(|| HandlerError::BadRequest("missing file parameter".into()))?;
            let source = self.store.read(name)?;
            let script = ProcessScript::new(name, source, &self.config);

            let output = self.runner.lock().await.start(Box::new(script)).await?;

            open_event_stream(writer).await?;
            let stream = writer.hand_off()?;
            let poll_interval = self.poll_interval;
            tokio::spawn(async move {
                drain(output, stream, poll_interval).await;
            });
            Ok(Response::Stream)
        })
    }
}

/// `GET /stop`: stop the active run, if any.
pub struct StopScriptEndpoint {
    runner: Arc<Mutex<ScriptRunner>>,
}

impl StopScriptEndpoint {
    pub fn new(runner: Arc<Mutex<ScriptRunner>>) -> Self {
        Self { runner }
    }
}

impl Handler for StopScriptEndpoint {
    fn handle<'a>(
        &'a self,
        _request: &'a Request,
        _writer: &'a mut StreamWriter,
    ) -> BoxFuture<'a, Result<Response, HandlerError>> {
        Box::pin(async move {
            let stopped = self.runner.lock().await.stop().await?;
            tracing::debug!(stopped, "Stop requested");
            Ok(Response::ok("Stopped"))
        })
    }
}

/// `GET /status`: runner state as JSON.
pub struct StatusEndpoint {
    state: watch::Receiver<RunnerState>,
}

impl StatusEndpoint {
    pub fn new(state: watch::Receiver<RunnerState>) -> Self {
        Self { state }
    }
}

impl Handler for StatusEndpoint {
    fn handle<'a>(
        &'a self,
        _request: &'a Request,
        _writer: &'a mut StreamWriter,
    ) -> BoxFuture<'a, Result<Response, HandlerError>> {
        Box::pin(async move {
            let state = self.state.borrow().clone();
            let body = serde_json::to_string(&state)
                .map_err(|e| HandlerError::Internal(e.to_string()))?;
            let response = format_response(200, &body, "application/json", ConnectionMode::Close);
            Ok(Response::Raw(response.into_bytes()))
        })
    }
}

/// `DELETE /files/<name>`.
pub struct DeleteFileEndpoint {
    store: Arc<dyn FileStore>,
}

impl DeleteFileEndpoint {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }
}

impl Handler for DeleteFileEndpoint {
    fn handle<'a>(
        &'a self,
        request: &'a Request,
        _writer: &'a mut StreamWriter,
    ) -> BoxFuture<'a, Result<Response, HandlerError>> {
        Box::pin(async move {
            let name = request.path().strip_prefix(FILES_PREFIX).unwrap_or_default();
            self.store.remove(name)?;
            tracing::info!(file = %name, "File removed");
            Ok(Response::ok(format!("File '{}' removed.", name)))
        })
    }
}
