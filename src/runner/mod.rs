//! Script execution subsystem.
//!
//! # Data Flow
//! ```text
//! GET /run
//!     → ScriptRunner::start (stop + wait for any previous run)
//!     → worker thread: "Running file <name>", Script::run(&sink, &cancel)
//!     → failure or panic → one "ERROR:Execution of …" line
//!     → sink dropped → sentinel → exited signal
//!
//! GET /stop
//!     → CancelToken::cancel (kills a child interpreter)
//!     → wait for the exited signal, bounded by stop_timeout
//! ```
//!
//! # Responsibilities
//! - At most one run at a time; a new run starts only after the old one exited
//! - Every run ends with exactly one sentinel on its own channel
//! - Script failures never escape the worker
//! - Runner state is observable through a watch channel

pub mod cancel;
pub mod script;

pub use cancel::CancelToken;
pub use script::{InlineScript, ProcessScript, Script, ScriptError};

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::config::{RunnerConfig, StreamConfig};
use crate::stream::{self, OutputReceiver, OutputSink};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("run {run_id} did not stop within {timeout:?}")]
    StopTimeout { run_id: Uuid, timeout: Duration },

    #[error("failed to start script worker: {0}")]
    Spawn(#[source] io::Error),
}

/// Observable runner state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunnerState {
    Idle,
    Running { run_id: Uuid, script: String },
    Stopping { run_id: Uuid, script: String },
}

impl RunnerState {
    pub fn run_id(&self) -> Option<Uuid> {
        match self {
            RunnerState::Idle => None,
            RunnerState::Running { run_id, .. } | RunnerState::Stopping { run_id, .. } => Some(*run_id),
        }
    }
}

struct ActiveRun {
    run_id: Uuid,
    script: String,
    cancel: CancelToken,
    exited: oneshot::Receiver<()>,
}

impl ActiveRun {
    fn has_exited(&mut self) -> bool {
        !matches!(
            self.exited.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        )
    }
}

/// Owns the single script run of the process.
pub struct ScriptRunner {
    channel_capacity: usize,
    stop_timeout: Duration,
    active: Option<ActiveRun>,
    state: Arc<watch::Sender<RunnerState>>,
}

impl ScriptRunner {
    pub fn new(runner: &RunnerConfig, stream: &StreamConfig) -> Self {
        let (state, _) = watch::channel(RunnerState::Idle);
        Self {
            channel_capacity: stream.channel_capacity,
            stop_timeout: runner.stop_timeout(),
            active: None,
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RunnerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RunnerState {
        self.state.borrow().clone()
    }

    /// Start `script` on a fresh channel, stopping any previous run first.
    ///
    /// The previous run's sentinel is enqueued before this returns, so output
    /// from two runs never interleaves.
    pub async fn start(&mut self, script: Box<dyn Script>) -> Result<OutputReceiver, RunnerError> {
        if self.active.is_some() {
            self.stop().await?;
        }

        let run_id = Uuid::new_v4();
        let name = script.name().to_string();
        let cancel = CancelToken::new();
        let (sink, output) = stream::channel(self.channel_capacity, cancel.clone());
        let (exited_tx, exited_rx) = oneshot::channel();

        self.state.send_replace(RunnerState::Running {
            run_id,
            script: name.clone(),
        });

        let worker = Worker {
            run_id,
            name: name.clone(),
            cancel: cancel.clone(),
            state: Arc::clone(&self.state),
        };
        let spawned = thread::Builder::new()
            .name(format!("script-{}", run_id.simple()))
            .spawn(move || {
                worker.run(script, sink);
                let _ = exited_tx.send(());
            });

        if let Err(e) = spawned {
            self.state.send_replace(RunnerState::Idle);
            tracing::error!(script = %name, error = %e, "Failed to start script worker");
            return Err(RunnerError::Spawn(e));
        }

        tracing::info!(run_id = %run_id, script = %name, "Script run started");
        self.active = Some(ActiveRun {
            run_id,
            script: name,
            cancel,
            exited: exited_rx,
        });
        Ok(output)
    }

    /// Cancel the active run and wait for its worker to exit.
    ///
    /// Returns `Ok(false)` when nothing was running. On timeout the run stays
    /// registered, so a later call retries and `start` keeps refusing.
    pub async fn stop(&mut self) -> Result<bool, RunnerError> {
        let Some(run) = self.active.as_mut() else {
            return Ok(false);
        };
        if run.has_exited() {
            self.active = None;
            return Ok(false);
        }

        tracing::info!(run_id = %run.run_id, script = %run.script, "Stopping script run");
        self.state.send_replace(RunnerState::Stopping {
            run_id: run.run_id,
            script: run.script.clone(),
        });
        run.cancel.cancel();

        match tokio::time::timeout(self.stop_timeout, &mut run.exited).await {
            Ok(_) => {
                let run_id = run.run_id;
                self.active = None;
                mark_idle(&self.state, run_id);
                tracing::info!(run_id = %run_id, "Script run stopped");
                Ok(true)
            }
            Err(_) => {
                tracing::warn!(
                    run_id = %run.run_id,
                    timeout = ?self.stop_timeout,
                    "Script run did not stop in time"
                );
                Err(RunnerError::StopTimeout {
                    run_id: run.run_id,
                    timeout: self.stop_timeout,
                })
            }
        }
    }
}

impl std::fmt::Debug for ScriptRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRunner")
            .field("state", &*self.state.borrow())
            .field("stop_timeout", &self.stop_timeout)
            .finish()
    }
}

/// Everything the worker thread owns besides the script and its sink.
struct Worker {
    run_id: Uuid,
    name: String,
    cancel: CancelToken,
    state: Arc<watch::Sender<RunnerState>>,
}

impl Worker {
    fn run(self, script: Box<dyn Script>, sink: OutputSink) {
        sink.report(format!("Running file {}", self.name));

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| script.run(&sink, &self.cancel)));
        match outcome {
            Ok(Ok(())) => {
                tracing::info!(run_id = %self.run_id, script = %self.name, "Script run finished");
            }
            Ok(Err(ScriptError::Cancelled)) => {
                tracing::info!(run_id = %self.run_id, script = %self.name, "Script run cancelled");
            }
            Ok(Err(e)) => {
                tracing::error!(
                    run_id = %self.run_id,
                    script = %self.name,
                    error = %e,
                    trace = %e.trace(),
                    "Script run failed"
                );
                sink.report(failure_line(&self.name, &e.to_string(), e.trace()));
            }
            Err(payload) => {
                let message = format!("panic: {}", panic_message(payload.as_ref()));
                tracing::error!(run_id = %self.run_id, script = %self.name, error = %message, "Script panicked");
                sink.report(failure_line(&self.name, &message, ""));
            }
        }

        drop(sink);
        mark_idle(&self.state, self.run_id);
    }
}

fn mark_idle(state: &watch::Sender<RunnerState>, run_id: Uuid) {
    state.send_if_modified(|current| {
        if current.run_id() == Some(run_id) {
            *current = RunnerState::Idle;
            true
        } else {
            false
        }
    });
}

/// The line reported on the output channel when a run fails.
pub fn failure_line(name: &str, error: &str, trace: &str) -> String {
    let mut line = format!("ERROR:Execution of {} failed with {}.", name, error);
    if !trace.is_empty() {
        line.push('\n');
        line.push_str(trace);
    }
    line
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
