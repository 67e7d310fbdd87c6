//! Server-Sent Events framing and the drain loop feeding one client.

use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;

use crate::http::response::TEXT_PLAIN;
use crate::http::{ConnectionMode, StreamWriter, WriterError};
use crate::stream::channel::{OutputEvent, OutputReceiver};

/// Response head that opens an event stream. The body follows as frames.
pub const EVENT_STREAM_HEAD: &str = "HTTP/1.1 200 OK\r\n\
Content-Type: text/event-stream\r\n\
Cache-Control: no-cache\r\n\
Connection: keep-alive\r\n\r\n";

/// How a drain loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Sentinel reached, closing response sent.
    Completed { lines: usize },
    /// The client went away before the sentinel.
    ClientDisconnected { lines: usize },
    /// Writing failed for a reason other than a disconnect.
    Failed { lines: usize },
}

/// Frame one output line as an SSE `data:` event.
///
/// Surrounding whitespace is trimmed and inner line breaks become `<br>`,
/// so a frame never spans more than one `data:` line.
pub fn frame(line: &str) -> String {
    let text = line.trim().replace("\r\n", "<br>").replace(['\n', '\r'], "<br>");
    format!("data: {}\n\n", text)
}

pub async fn open_event_stream(writer: &mut StreamWriter) -> Result<(), WriterError> {
    writer.write(EVENT_STREAM_HEAD.as_bytes()).await
}

/// Forward every line of `output` to `writer` until the sentinel.
///
/// Polls without blocking and sleeps `poll_interval` whenever the channel is
/// empty. On the sentinel a closing `200` is sent and the connection closed.
pub async fn drain(
    mut output: OutputReceiver,
    mut writer: StreamWriter,
    poll_interval: Duration,
) -> DrainOutcome {
    let mut lines = 0usize;

    loop {
        let line = match output.try_recv() {
            Ok(OutputEvent::Line(line)) => line,
            Ok(OutputEvent::End) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {
                tokio::time::sleep(poll_interval).await;
                continue;
            }
        };

        tracing::debug!(line = %line, "Script output");
        if let Err(e) = writer.write(frame(&line).as_bytes()).await {
            let _ = writer.close().await;
            return if e.is_disconnect() {
                tracing::info!(lines, "Client disconnected from output stream");
                DrainOutcome::ClientDisconnected { lines }
            } else {
                tracing::warn!(lines, error = %e, "Writing output stream failed");
                DrainOutcome::Failed { lines }
            };
        }
        lines += 1;
    }

    match writer
        .send_response(200, "", TEXT_PLAIN, ConnectionMode::Close)
        .await
    {
        Ok(()) => {
            tracing::info!(lines, "Output stream completed");
            DrainOutcome::Completed { lines }
        }
        Err(e) => {
            let _ = writer.close().await;
            if e.is_disconnect() {
                DrainOutcome::ClientDisconnected { lines }
            } else {
                tracing::warn!(error = %e, "Closing output stream failed");
                DrainOutcome::Failed { lines }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CancelToken;
    use crate::stream::channel::channel;
    use tokio::io::AsyncReadExt;

    const POLL: Duration = Duration::from_millis(5);

    #[test]
    fn frames_trim_and_flatten_line_breaks() {
        assert_eq!(frame("hello"), "data: hello\n\n");
        assert_eq!(frame("  padded \n"), "data: padded\n\n");
        assert_eq!(frame("a\nb\r\nc"), "data: a<br>b<br>c\n\n");
        assert_eq!(frame(""), "data: \n\n");
    }

    #[tokio::test]
    async fn drains_in_order_then_closes_with_200() {
        let (client, server) = tokio::io::duplex(4096);
        let writer = StreamWriter::new(server);
        let (sink, output) = channel(4, CancelToken::new());

        let worker = std::thread::spawn(move || {
            sink.print("first").unwrap();
            sink.print("second\nline").unwrap();
        });

        let outcome = drain(output, writer, POLL).await;
        worker.join().unwrap();
        assert_eq!(outcome, DrainOutcome::Completed { lines: 2 });

        let mut received = String::new();
        let mut client = client;
        client.read_to_string(&mut received).await.unwrap();

        assert!(received.starts_with("data: first\n\ndata: second<br>line\n\n"));
        assert!(received.contains("HTTP/1.1 200 OK\r\n"));
        assert!(received.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn stops_when_client_goes_away() {
        let (client, server) = tokio::io::duplex(64);
        let writer = StreamWriter::new(server);
        let (sink, output) = channel(4, CancelToken::new());
        drop(client);

        let worker = std::thread::spawn(move || {
            let _ = sink.print("nobody is listening");
        });

        let outcome = drain(output, writer, POLL).await;
        worker.join().unwrap();
        assert_eq!(outcome, DrainOutcome::ClientDisconnected { lines: 0 });
    }
}
