//! Bounded, ordered line channel between a script run and the drain loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use crate::runner::{CancelToken, ScriptError};

/// One item on the live output channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// A line of script output.
    Line(String),
    /// No more output will follow for this run.
    End,
}

/// Create a fresh channel for one run.
pub fn channel(capacity: usize, cancel: CancelToken) -> (OutputSink, OutputReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let sink = OutputSink {
        tx,
        cancel,
        detached: AtomicBool::new(false),
    };
    (sink, OutputReceiver { rx })
}

/// Producer side, handed to the running script.
///
/// Dropping the sink enqueues [`OutputEvent::End`], so every run ends with
/// exactly one sentinel whether it finished, failed, panicked or was cancelled.
pub struct OutputSink {
    tx: mpsc::Sender<OutputEvent>,
    cancel: CancelToken,
    detached: AtomicBool,
}

impl OutputSink {
    /// Emit one line of output.
    ///
    /// Blocks while the channel is full, also when called from inside a
    /// runtime context (a script driving its own runtime). Fails with [`ScriptError::Cancelled`]
    /// once the run was asked to stop, so scripts can bail out with `?`.
    pub fn print(&self, line: impl Into<String>) -> Result<(), ScriptError> {
        if self.cancel.is_cancelled() {
            return Err(ScriptError::Cancelled);
        }
        self.push(OutputEvent::Line(line.into()));
        Ok(())
    }

    /// Emit a line even if the run is being cancelled (error reports).
    pub(crate) fn report(&self, line: impl Into<String>) {
        self.push(OutputEvent::Line(line.into()));
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn push(&self, event: OutputEvent) {
        let result = match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                if tokio::runtime::Handle::try_current().is_ok() {
                    // blocking_send refuses to run inside a runtime context.
                    let tx = &self.tx;
                    thread::scope(|scope| scope.spawn(move || tx.blocking_send(event)).join())
                        .map_err(|_| ())
                        .and_then(|sent| sent.map_err(|_| ()))
                } else {
                    self.tx.blocking_send(event).map_err(|_| ())
                }
            }
            Err(TrySendError::Closed(_)) => Err(()),
        };

        if result.is_err() && !self.detached.swap(true, Ordering::Relaxed) {
            tracing::debug!("Output receiver gone, discarding further output");
        }
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        self.push(OutputEvent::End);
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink")
            .field("capacity", &self.tx.max_capacity())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Consumer side, drained by the event loop.
#[derive(Debug)]
pub struct OutputReceiver {
    rx: mpsc::Receiver<OutputEvent>,
}

impl OutputReceiver {
    /// Take the next event without waiting.
    pub fn try_recv(&mut self) -> Result<OutputEvent, TryRecvError> {
        self.rx.try_recv()
    }

    /// Wait for the next event. `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<OutputEvent> {
        self.rx.recv().await
    }

    /// Collect all lines up to the sentinel.
    pub async fn collect_lines(mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(event) = self.recv().await {
            match event {
                OutputEvent::Line(line) => lines.push(line),
                OutputEvent::End => break,
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_then_single_sentinel() {
        let (sink, mut receiver) = channel(8, CancelToken::new());
        sink.print("one").unwrap();
        sink.print(String::from("two")).unwrap();
        drop(sink);

        assert_eq!(receiver.try_recv(), Ok(OutputEvent::Line("one".into())));
        assert_eq!(receiver.try_recv(), Ok(OutputEvent::Line("two".into())));
        assert_eq!(receiver.try_recv(), Ok(OutputEvent::End));
        assert_eq!(receiver.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn print_fails_after_cancel_but_report_does_not() {
        let cancel = CancelToken::new();
        let (sink, mut receiver) = channel(8, cancel.clone());
        cancel.cancel();

        assert!(matches!(sink.print("late"), Err(ScriptError::Cancelled)));
        sink.report("ERROR:late");
        drop(sink);

        assert_eq!(receiver.try_recv(), Ok(OutputEvent::Line("ERROR:late".into())));
        assert_eq!(receiver.try_recv(), Ok(OutputEvent::End));
    }

    #[test]
    fn worker_blocks_on_full_channel_until_drained() {
        let (sink, receiver) = channel(1, CancelToken::new());
        let worker = std::thread::spawn(move || {
            for i in 0..50 {
                sink.print(i.to_string()).unwrap();
            }
        });

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let lines = runtime.block_on(receiver.collect_lines());
        worker.join().unwrap();

        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(lines, expected);
    }

    #[test]
    fn print_inside_runtime_context_waits_instead_of_dropping() {
        let (sink, receiver) = channel(1, CancelToken::new());
        let producer = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let _context = runtime.enter();
            for i in 0..20 {
                sink.print(i.to_string()).unwrap();
            }
        });

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let lines = runtime.block_on(receiver.collect_lines());
        producer.join().unwrap();

        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(lines, expected);
    }

    #[test]
    fn dropped_receiver_does_not_block_producer() {
        let (sink, receiver) = channel(1, CancelToken::new());
        drop(receiver);
        for _ in 0..10 {
            sink.print("nobody listens").unwrap();
        }
    }
}
