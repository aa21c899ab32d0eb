//! Per-session output path.
//!
//! Every accepted connection gets an outbox: a bounded channel of rendered
//! lines drained by a dedicated writer task that exclusively owns the
//! socket's write half. This serializes all writes to one stream, whoever
//! issues them, and keeps socket I/O out of the registry actor.
//!
//! ```text
//! own handler ──send().await──┐
//!                             ├──▶ mpsc<Line> ──▶ writer task ──▶ write half
//! registry actor ──try_send───┘
//! ```
//!
//! The registry only ever uses `try_deliver`, so a stalled peer can fill its
//! own outbox but can never block the actor or any other session.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel closure is reported through return values

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A rendered output line, without its terminator. Shared between all the
/// outboxes a broadcast fans out to.
pub type Line = Arc<str>;

/// Default number of lines an outbox buffers before deliveries are dropped.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Default maximum accepted input line length in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8192;

/// Default timeout for writing one line to a peer.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunables applied to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub outbox_capacity: usize,
    pub max_line_length: usize,
    pub write_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Outcome of a non-blocking delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The line is queued for the writer task.
    Queued,
    /// The outbox is full (slow consumer); the line was dropped.
    Dropped,
    /// The writer task is gone; the session is tearing down.
    Closed,
}

/// The session's writer is gone, so nothing more can be sent to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session outbox closed")]
pub struct OutboxClosed;

/// Sending side of a session's outbox.
///
/// Cheap to clone. The registry holds one clone per admitted session; the
/// writer task exits once every clone is dropped and the queue is drained.
#[derive(Debug, Clone)]
pub struct SessionOutbox {
    connection: u64,
    sender: mpsc::Sender<Line>,
}

impl SessionOutbox {
    /// Creates an outbox and the receiver its writer task drains.
    pub fn channel(connection: u64, capacity: usize) -> (Self, mpsc::Receiver<Line>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { connection, sender }, receiver)
    }

    /// Connection number of the owning session.
    pub fn connection(&self) -> u64 {
        self.connection
    }

    /// Returns `true` once the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Queues a line without waiting. Used for cross-session deliveries.
    pub fn try_deliver(&self, line: Line) -> Delivery {
        match self.sender.try_send(line) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Queues a line, waiting for room. Used by a session for its own replies.
    pub async fn send(&self, line: impl Into<Line>) -> Result<(), OutboxClosed> {
        self.sender.send(line.into()).await.map_err(|_| OutboxClosed)
    }
}

/// Spawns the writer task for one session.
///
/// Lines are written newline-terminated and flushed one at a time. On the
/// first write error or timeout the task cancels `failed` and stops; the
/// dropped receiver then closes the outbox for every holder. When all
/// outbox clones are gone the remaining queue is flushed and the write half
/// shut down.
pub fn spawn_writer<W>(
    writer: W,
    mut lines: mpsc::Receiver<Line>,
    write_timeout: Duration,
    failed: CancellationToken,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut writer = BufWriter::new(writer);

        while let Some(line) = lines.recv().await {
            let result = timeout(write_timeout, async {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
                Ok::<(), std::io::Error>(())
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(error = %e, "Session write failed");
                    failed.cancel();
                    return;
                }
                Err(_) => {
                    debug!(timeout = ?write_timeout, "Session write timed out");
                    failed.cancel();
                    return;
                }
            }
        }

        // Peer may already be gone; nothing left to report.
        let _ = writer.shutdown().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn test_writer_delivers_lines_in_order() {
        let (client, server) = tokio::io::duplex(1024);
        let (outbox, rx) = SessionOutbox::channel(1, 8);
        let failed = CancellationToken::new();
        let task = spawn_writer(server, rx, DEFAULT_WRITE_TIMEOUT, failed.clone());

        outbox.send("first").await.unwrap();
        assert_eq!(outbox.try_deliver(Line::from("second")), Delivery::Queued);
        drop(outbox);
        task.await.unwrap();

        let mut lines = BufReader::new(client).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(lines.next_line().await.unwrap(), None);
        assert!(!failed.is_cancelled());
    }

    #[tokio::test]
    async fn test_full_outbox_drops_instead_of_blocking() {
        let (outbox, _rx) = SessionOutbox::channel(2, 1);
        assert_eq!(outbox.try_deliver(Line::from("a")), Delivery::Queued);
        assert_eq!(outbox.try_deliver(Line::from("b")), Delivery::Dropped);
    }

    #[tokio::test]
    async fn test_closed_outbox_reports_closed() {
        let (outbox, rx) = SessionOutbox::channel(3, 4);
        drop(rx);
        assert!(outbox.is_closed());
        assert_eq!(outbox.try_deliver(Line::from("a")), Delivery::Closed);
        assert_eq!(outbox.send("b").await, Err(OutboxClosed));
    }

    #[tokio::test]
    async fn test_write_failure_cancels_token() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);

        let (outbox, rx) = SessionOutbox::channel(4, 4);
        let failed = CancellationToken::new();
        let task = spawn_writer(server, rx, DEFAULT_WRITE_TIMEOUT, failed.clone());

        outbox.send("nobody is listening").await.unwrap();
        task.await.unwrap();

        assert!(failed.is_cancelled());
        assert!(outbox.is_closed());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (outbox, _rx) = SessionOutbox::channel(5, 0);
        assert_eq!(outbox.try_deliver(Line::from("a")), Delivery::Queued);
    }
}
