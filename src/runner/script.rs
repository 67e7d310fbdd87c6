//! Units of work the runner can execute.
//!
//! A script receives its output sink and cancellation token as arguments;
//! nothing process-wide is redirected while it runs.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::config::RunnerConfig;
use crate::runner::cancel::CancelToken;
use crate::stream::OutputSink;

const EXIT_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("interpreter exited with {}", exit_label(.code))]
    Exited { code: Option<i32>, stderr: String },

    #[error("{0}")]
    Failed(String),
}

impl ScriptError {
    /// Extra diagnostic text reported after the failure line.
    pub fn trace(&self) -> &str {
        match self {
            ScriptError::Exited { stderr, .. } => stderr.trim_end(),
            _ => "",
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

pub trait Script: Send + 'static {
    fn name(&self) -> &str;

    /// Run to completion on the worker thread, emitting lines through `out`.
    fn run(self: Box<Self>, out: &OutputSink, cancel: &CancelToken) -> Result<(), ScriptError>;
}

/// Stored script source executed by an external interpreter.
///
/// The source is piped to the interpreter's stdin, so the interpreter
/// arguments must make it read the program from there (`python3 -u -`,
/// `sh -s`). Each stdout line becomes one output line; stderr is kept as
/// the failure trace. Cancelling kills the child.
#[derive(Debug, Clone)]
pub struct ProcessScript {
    name: String,
    source: Vec<u8>,
    interpreter: String,
    args: Vec<String>,
}

impl ProcessScript {
    pub fn new(name: impl Into<String>, source: Vec<u8>, config: &RunnerConfig) -> Self {
        Self {
            name: name.into(),
            source,
            interpreter: config.interpreter.clone(),
            args: config.interpreter_args.clone(),
        }
    }
}

impl Script for ProcessScript {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>, out: &OutputSink, cancel: &CancelToken) -> Result<(), ScriptError> {
        let mut command = Command::new(&self.interpreter);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a stop also reaches anything the script started.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);
        let mut child = command.spawn()?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        tracing::debug!(pid = child.id(), interpreter = %self.interpreter, "Interpreter started");

        let child = Arc::new(Mutex::new(Interpreter {
            child,
            reaped: false,
        }));
        let killer = Arc::clone(&child);
        cancel.on_cancel(move || kill(&killer));

        let source = self.source;
        let (streamed, stderr) = thread::scope(|scope| {
            if let Some(mut stdin) = stdin {
                scope.spawn(move || {
                    // The interpreter may exit before reading everything.
                    let _ = stdin.write_all(&source);
                });
            }
            let collector = scope.spawn(move || {
                let mut text = String::new();
                if let Some(mut stderr) = stderr {
                    let _ = stderr.read_to_string(&mut text);
                }
                text
            });

            let streamed = match stdout {
                Some(stdout) => forward_lines(stdout, out),
                None => Ok(()),
            };
            if streamed.is_err() {
                kill(&child);
            }
            let stderr = collector.join().unwrap_or_default();
            (streamed, stderr)
        });

        let status = wait(&child)?;
        streamed?;

        if cancel.is_cancelled() {
            return Err(ScriptError::Cancelled);
        }
        if !status.success() {
            return Err(ScriptError::Exited {
                code: status.code(),
                stderr,
            });
        }
        Ok(())
    }
}

fn forward_lines(stdout: impl Read, out: &OutputSink) -> Result<(), ScriptError> {
    for line in BufReader::new(stdout).lines() {
        out.print(line?)?;
    }
    Ok(())
}

/// The interpreter child and whether its exit status was collected.
///
/// Once reaped its pid may be reused, so it must not be signalled again.
struct Interpreter {
    child: Child,
    reaped: bool,
}

impl Interpreter {
    /// Kill the interpreter together with everything in its process group.
    fn kill(&mut self) {
        if self.reaped {
            return;
        }
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let group = Pid::from_raw(self.child.id() as i32);
            match killpg(group, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => tracing::warn!(pgid = %group, error = %e, "Failed to kill process group"),
            }
        }
        let _ = self.child.kill();
    }
}

fn kill(interpreter: &Mutex<Interpreter>) {
    if let Ok(mut interpreter) = interpreter.lock() {
        interpreter.kill();
    }
}

/// Poll for exit so the lock is free for the cancel hook in between.
fn wait(interpreter: &Mutex<Interpreter>) -> Result<ExitStatus, ScriptError> {
    loop {
        let polled = match interpreter.lock() {
            Ok(mut interpreter) => {
                let status = interpreter.child.try_wait()?;
                interpreter.reaped = status.is_some();
                status
            }
            Err(_) => return Err(ScriptError::Failed("child process lock poisoned".into())),
        };
        if let Some(status) = polled {
            return Ok(status);
        }
        thread::sleep(EXIT_POLL);
    }
}

/// A script written in Rust.
pub struct InlineScript<F> {
    name: String,
    body: F,
}

impl<F> InlineScript<F>
where
    F: FnOnce(&OutputSink, &CancelToken) -> Result<(), ScriptError> + Send + 'static,
{
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

impl<F> Script for InlineScript<F>
where
    F: FnOnce(&OutputSink, &CancelToken) -> Result<(), ScriptError> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>, out: &OutputSink, cancel: &CancelToken) -> Result<(), ScriptError> {
        (self.body)(out, cancel)
    }
}

impl<F> std::fmt::Debug for InlineScript<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InlineScript").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::channel;

    fn run_blocking(script: Box<dyn Script>, cancel: CancelToken) -> (Result<(), ScriptError>, Vec<String>) {
        let (sink, receiver) = channel(64, cancel.clone());
        let worker = thread::spawn(move || script.run(&sink, &cancel));
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let lines = runtime.block_on(receiver.collect_lines());
        (worker.join().unwrap(), lines)
    }

    fn shell(source: &str) -> Box<dyn Script> {
        let config = RunnerConfig {
            interpreter: "sh".into(),
            interpreter_args: vec!["-s".into()],
            ..RunnerConfig::default()
        };
        Box::new(ProcessScript::new("test.sh", source.as_bytes().to_vec(), &config))
    }

    #[test]
    fn inline_script_emits_lines() {
        let script = InlineScript::new("inline", |out: &OutputSink, _: &CancelToken| {
            out.print("a")?;
            out.print("b")?;
            Ok(())
        });
        let (result, lines) = run_blocking(Box::new(script), CancelToken::new());
        assert!(result.is_ok());
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn exit_error_carries_stderr_trace() {
        let err = ScriptError::Exited {
            code: Some(2),
            stderr: "Traceback\n  boom\n".into(),
        };
        assert_eq!(err.to_string(), "interpreter exited with status 2");
        assert_eq!(err.trace(), "Traceback\n  boom");
        assert_eq!(ScriptError::Failed("x".into()).trace(), "");
    }

    #[cfg(unix)]
    #[test]
    fn process_script_streams_stdout() {
        let (result, lines) = run_blocking(shell("echo one\necho two\n"), CancelToken::new());
        assert!(result.is_ok());
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[cfg(unix)]
    #[test]
    fn process_script_reports_failure() {
        let (result, lines) = run_blocking(shell("echo partial\necho broken >&2\nexit 3\n"), CancelToken::new());
        assert_eq!(lines, vec!["partial"]);
        match result {
            Err(ScriptError::Exited { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "broken");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn cancel_kills_interpreter() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            trigger.cancel();
        });

        let (result, _) = run_blocking(shell("while true; do echo tick; sleep 0.05; done\n"), cancel);
        canceller.join().unwrap();
        assert!(matches!(result, Err(ScriptError::Cancelled)));
    }

    #[cfg(unix)]
    #[test]
    fn cancel_kills_processes_started_by_the_script() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let (result, lines) = run_blocking(shell("echo started\nsleep 30\necho done\n"), cancel);
        canceller.join().unwrap();

        assert!(matches!(result, Err(ScriptError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(lines, vec!["started"]);
    }
}
