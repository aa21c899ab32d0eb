//! Connection handler for individual chat sessions.
//!
//! Each accepted connection gets its own `ConnectionHandler` that:
//! - Runs the naming handshake against the registry
//! - Parses incoming lines and dispatches commands
//! - Fans chat and private lines out through the registry
//! - Tears the session down exactly once, whatever ended it
//!
//! # Session states
//!
//! ```text
//! Connecting ──▶ Naming ──(admitted)──▶ Active ──(EOF / quit / I/O error / shutdown)──▶ Terminated
//!                  │  ▲                                                                    ▲
//!                  │  └── blank or taken name                                              │
//!                  └──────────────────────(EOF / I/O error / shutdown)─────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_core::{Identity, IdentityError, Message};
use parley_protocol::{notice, parse_line, Command, Input};

use super::codec::{Inbound, InboundCodec};
use crate::registry::{RegistryError, RegistryHandle};
use crate::session::{spawn_writer, OutboxClosed, SessionOutbox, SessionSettings};

/// Lifecycle phase of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, nothing sent yet.
    Connecting,
    /// Waiting for an admissible name.
    Naming,
    /// Admitted under `identity`.
    Active { identity: Identity },
    /// Teardown has run.
    Terminated,
}

/// What to do after dispatching one active line.
enum Flow {
    Continue,
    Quit,
}

/// Connection handler for a single chat session.
pub struct ConnectionHandler<R> {
    /// Incoming lines, bounded to `max_line_length` bytes each
    reader: FramedRead<R, InboundCodec>,

    /// This session's outbox (also handed to the registry once admitted)
    outbox: SessionOutbox,

    /// Writer task draining the outbox into the socket
    writer_task: JoinHandle<()>,

    /// Cancelled by the writer task when a write fails
    write_failed: CancellationToken,

    /// Cancelled when the server shuts down
    shutdown: CancellationToken,

    /// Handle to the registry
    registry: RegistryHandle,

    /// Current lifecycle phase
    state: SessionState,

    /// Connection number, for logs
    connection: u64,

    settings: SessionSettings,
}

impl<R> ConnectionHandler<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a handler and spawns the session's writer task.
    ///
    /// # Arguments
    ///
    /// * `reader` - Read half of the connection
    /// * `writer` - Write half of the connection (moved into the writer task)
    /// * `registry` - Handle to the registry
    /// * `connection` - Unique number for this connection
    /// * `settings` - Per-session tunables
    /// * `shutdown` - Token cancelled on server shutdown
    pub fn new<W>(
        reader: R,
        writer: W,
        registry: RegistryHandle,
        connection: u64,
        settings: SessionSettings,
        shutdown: CancellationToken,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbox, lines) = SessionOutbox::channel(connection, settings.outbox_capacity);
        let write_failed = CancellationToken::new();
        let writer_task = spawn_writer(writer, lines, settings.write_timeout, write_failed.clone());

        Self {
            reader: FramedRead::new(reader, InboundCodec::new(settings.max_line_length)),
            outbox,
            writer_task,
            write_failed,
            shutdown,
            registry,
            state: SessionState::Connecting,
            connection,
            settings,
        }
    }


    /// Runs the session to completion.
    ///
    /// Returns the identity the session was active under, if it got that far.
    pub async fn run(mut self) -> Option<Identity> {
        debug!(connection = self.connection, "Session started");

        let outcome = match self.negotiate_name().await {
            Ok(()) => self.process_lines().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) | Err(ConnectionError::Eof) => {
                debug!(connection = self.connection, "Session ended");
            }
            Err(ConnectionError::Shutdown) => {
                // Best effort: the peer may already be gone.
                let _ = self.reply(notice::SHUTTING_DOWN).await;
            }
            Err(e) => {
                debug!(connection = self.connection, error = %e, "Session closed");
            }
        }

        let identity = self.teardown().await;
        self.release().await;
        identity
    }

    /// Naming handshake: loops until a name is admitted.
    async fn negotiate_name(&mut self) -> Result<(), ConnectionError> {
        self.state = SessionState::Naming;
        self.reply(notice::WELCOME).await?;
        self.reply(notice::NAME_PROMPT).await?;

        loop {
            let Some(line) = self.next_line().await? else {
                continue;
            };

            let identity = match Identity::parse(&line) {
                Ok(identity) => identity,
                Err(IdentityError::Empty) => {
                    self.reply(notice::EMPTY_NAME).await?;
                    continue;
                }
            };

            if !self
                .registry
                .try_admit(identity.clone(), self.outbox.clone())
                .await?
            {
                self.reply(notice::name_taken(identity.as_str())).await?;
                continue;
            }

            self.state = SessionState::Active {
                identity: identity.clone(),
            };
            info!(connection = self.connection, identity = %identity, "User joined the chat");

            self.reply(notice::admitted(&identity)).await?;
            self.reply(notice::COMMAND_SUMMARY).await?;
            self.reply(notice::SEPARATOR).await?;
            self.registry
                .broadcast(&Message::joined(&identity), Some(&identity))
                .await;

            return Ok(());
        }
    }

    /// Active loop: dispatches lines until EOF, quit or an error.
    async fn process_lines(&mut self) -> Result<(), ConnectionError> {
        let identity = match &self.state {
            SessionState::Active { identity } => identity.clone(),
            _ => return Ok(()),
        };

        loop {
            let Some(line) = self.next_line().await? else {
                continue;
            };

            match self.dispatch(&identity, &line).await? {
                Flow::Continue => {}
                Flow::Quit => return Ok(()),
            }
        }
    }

    /// Handles one line from an active session.
    async fn dispatch(&self, identity: &Identity, line: &str) -> Result<Flow, ConnectionError> {
        match parse_line(line) {
            Input::Blank => {}

            Input::Chat(body) => {
                let message = Message::broadcast(identity.clone(), body);
                info!(connection = self.connection, "{message}");
                self.registry.broadcast(&message, Some(identity)).await;
            }

            Input::Command(Command::ListUsers) => {
                let names = self.registry.list_names().await;
                self.reply(notice::online_users(&names, identity)).await?;
            }

            Input::Command(Command::Private { target, body }) => {
                self.send_private(identity, &target, body).await?;
            }

            Input::Command(Command::Quit) => {
                self.reply(notice::farewell(identity)).await?;
                return Ok(Flow::Quit);
            }

            Input::Command(Command::Help) => {
                for line in notice::HELP {
                    self.reply(*line).await?;
                }
            }

            Input::Command(Command::MissingArguments { usage }) => {
                self.reply(notice::usage(usage)).await?;
            }

            Input::Command(Command::Unknown(token)) => {
                self.reply(notice::unknown_command(&token)).await?;
            }
        }

        Ok(Flow::Continue)
    }

    async fn send_private(
        &self,
        sender: &Identity,
        target: &str,
        body: String,
    ) -> Result<(), ConnectionError> {
        let resolved = match Identity::parse(target) {
            Ok(recipient) => {
                let message = Message::private(sender.clone(), recipient.clone(), body);
                if self.registry.send_to(&recipient, &message).await {
                    debug!(from = %sender, to = %recipient, "Private message delivered");
                    message.sender_echo()
                } else {
                    None
                }
            }
            Err(IdentityError::Empty) => None,
        };

        match resolved {
            Some(echo) => self.reply(echo).await,
            None => self.reply(notice::user_not_found(target)).await,
        }
    }

    /// Reads the next line.
    ///
    /// `Ok(None)` means an over-long line is being discarded (the session
    /// has been told). Ends with an error on EOF, I/O failure, a failed
    /// write or server shutdown.
    async fn next_line(&mut self) -> Result<Option<String>, ConnectionError> {
        let frame = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(ConnectionError::Shutdown),
            _ = self.write_failed.cancelled() => return Err(ConnectionError::WriteFailed),
            frame = self.reader.next() => frame,
        };

        match frame {
            None => Err(ConnectionError::Eof),
            Some(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Some(Ok(Inbound::Line(line))) => Ok(Some(line)),
            Some(Ok(Inbound::TooLong)) => {
                debug!(
                    connection = self.connection,
                    max = self.settings.max_line_length,
                    "Discarding over-long line"
                );
                self.reply(notice::line_too_long(self.settings.max_line_length))
                    .await?;
                Ok(None)
            }
        }
    }

    /// Queues a line for this session only.
    async fn reply(&self, line: impl Into<String>) -> Result<(), ConnectionError> {
        self.outbox
            .send(line.into())
            .await
            .map_err(ConnectionError::from)
    }

    /// Ends the session's registry presence. Runs its side effects at most once.
    ///
    /// Order matters: the registry entry goes first, then the remaining
    /// sessions are told, and only afterwards (in `release`) is the socket
    /// closed, so the registry never lists a session whose socket is gone.
    async fn teardown(&mut self) -> Option<Identity> {
        let previous = std::mem::replace(&mut self.state, SessionState::Terminated);

        let SessionState::Active { identity } = previous else {
            return None;
        };

        match self.registry.remove(&identity).await {
            Ok(true) => {
                let notified = self
                    .registry
                    .broadcast(&Message::left(&identity), None)
                    .await;
                info!(
                    connection = self.connection,
                    identity = %identity,
                    notified,
                    "User left the chat"
                );
            }
            Ok(false) => {
                debug!(identity = %identity, "Identity already removed");
            }
            Err(e) => {
                warn!(identity = %identity, error = %e, "Failed to remove identity");
            }
        }

        Some(identity)
    }

    /// Releases the session's I/O: closes the outbox and waits for the
    /// writer to flush pending lines and shut the write half down.
    async fn release(self) {
        let Self {
            reader,
            outbox,
            writer_task,
            connection,
            settings,
            ..
        } = self;

        drop(outbox);
        drop(reader);

        let abort = writer_task.abort_handle();
        if timeout(settings.write_timeout, writer_task).await.is_err() {
            warn!(connection, "Writer did not finish in time, aborting");
            abort.abort();
        }
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Write to peer failed")]
    WriteFailed,

    #[error("Session outbox closed")]
    OutboxClosed,

    #[error("Server shutting down")]
    Shutdown,

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl From<OutboxClosed> for ConnectionError {
    fn from(_: OutboxClosed) -> Self {
        Self::OutboxClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{
        AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
    };
    use tokio::sync::mpsc;

    use crate::registry::spawn_registry;
    use crate::session::Line;

    const RECV_TIMEOUT: Duration = Duration::from_secs(2);

    struct Peer {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Peer {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> String {
            timeout(RECV_TIMEOUT, self.lines.next_line())
                .await
                .expect("timed out waiting for line")
                .unwrap()
                .expect("stream closed")
        }

        async fn recv_until(&mut self, needle: &str) -> String {
            loop {
                let line = self.recv().await;
                if line.contains(needle) {
                    return line;
                }
            }
        }
    }

    fn spawn_handler(
        registry: &RegistryHandle,
        settings: SessionSettings,
    ) -> (Peer, JoinHandle<Option<Identity>>, CancellationToken) {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let (client_read, client_write) = tokio::io::split(client);
        let shutdown = CancellationToken::new();

        let handler = ConnectionHandler::new(
            server_read,
            server_write,
            registry.clone(),
            1,
            settings,
            shutdown.clone(),
        );
        let task = tokio::spawn(handler.run());

        let peer = Peer {
            lines: BufReader::new(client_read).lines(),
            writer: client_write,
        };
        (peer, task, shutdown)
    }

    /// Admits an observer session directly, returning its receiving end.
    async fn observer(registry: &RegistryHandle, name: &str) -> mpsc::Receiver<Line> {
        let (outbox, rx) = SessionOutbox::channel(99, 32);
        assert!(registry
            .try_admit(Identity::parse(name).unwrap(), outbox)
            .await
            .unwrap());
        rx
    }

    async fn recv_line(rx: &mut mpsc::Receiver<Line>) -> String {
        timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for line")
            .expect("outbox closed")
            .to_string()
    }

    #[tokio::test]
    async fn test_naming_reprompts_on_blank_and_taken() {
        let registry = spawn_registry();
        let _watcher = observer(&registry, "alice").await;
        let (mut peer, _task, _shutdown) = spawn_handler(&registry, SessionSettings::default());

        assert_eq!(peer.recv().await, notice::WELCOME);
        assert_eq!(peer.recv().await, notice::NAME_PROMPT);

        peer.send("   ").await;
        assert_eq!(peer.recv().await, notice::EMPTY_NAME);

        peer.send("alice").await;
        assert_eq!(peer.recv().await, notice::name_taken("alice"));

        peer.send("  alice2  ").await;
        let alice2 = Identity::parse("alice2").unwrap();
        assert_eq!(peer.recv().await, notice::admitted(&alice2));
        assert_eq!(peer.recv().await, notice::COMMAND_SUMMARY);
    }

    #[tokio::test]
    async fn test_join_is_announced_to_others_only() {
        let registry = spawn_registry();
        let mut watcher = observer(&registry, "watcher").await;
        let (mut peer, _task, _shutdown) = spawn_handler(&registry, SessionSettings::default());

        peer.send("dana").await;
        peer.recv_until(notice::SEPARATOR).await;

        assert!(recv_line(&mut watcher).await.contains("dana joined the chat"));
    }

    #[tokio::test]
    async fn test_quit_runs_teardown_once() {
        let registry = spawn_registry();
        let mut watcher = observer(&registry, "watcher").await;
        let (mut peer, task, _shutdown) = spawn_handler(&registry, SessionSettings::default());

        peer.send("erin").await;
        peer.recv_until(notice::SEPARATOR).await;
        let _joined = recv_line(&mut watcher).await;

        peer.send("/quit").await;
        // A racing EOF after the quit must not produce a second teardown.
        peer.writer.shutdown().await.unwrap();

        let erin = Identity::parse("erin").unwrap();
        assert_eq!(peer.recv().await, notice::farewell(&erin));

        let identity = timeout(RECV_TIMEOUT, task).await.unwrap().unwrap();
        assert_eq!(identity, Some(erin.clone()));

        assert!(recv_line(&mut watcher).await.contains("erin left the chat"));
        assert!(watcher.try_recv().is_err(), "left notice must be sent once");
        assert!(registry.lookup(&erin).await.is_none());

        // The writer has shut the stream down.
        assert_eq!(peer.lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let registry = spawn_registry();
        let mut watcher = observer(&registry, "watcher").await;

        let (_client, server) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);
        let mut handler = ConnectionHandler::new(
            server_read,
            server_write,
            registry.clone(),
            7,
            SessionSettings::default(),
            CancellationToken::new(),
        );

        let frank = Identity::parse("frank").unwrap();
        assert!(registry
            .try_admit(frank.clone(), handler.outbox.clone())
            .await
            .unwrap());
        handler.state = SessionState::Active {
            identity: frank.clone(),
        };

        assert_eq!(handler.teardown().await, Some(frank));
        assert_eq!(handler.teardown().await, None);
        assert_eq!(handler.state, SessionState::Terminated);

        assert!(recv_line(&mut watcher).await.contains("frank left"));
        assert!(watcher.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_while_naming_notifies_nobody() {
        let registry = spawn_registry();
        let mut watcher = observer(&registry, "watcher").await;
        let (mut peer, task, _shutdown) = spawn_handler(&registry, SessionSettings::default());

        peer.recv().await;
        peer.writer.shutdown().await.unwrap();

        let identity = timeout(RECV_TIMEOUT, task).await.unwrap().unwrap();
        assert_eq!(identity, None);
        assert!(watcher.try_recv().is_err());
        assert_eq!(registry.list_names().await.len(), 1);
    }

    #[tokio::test]
    async fn test_local_replies() {
        let registry = spawn_registry();
        let (mut peer, _task, _shutdown) = spawn_handler(&registry, SessionSettings::default());

        peer.send("gina").await;
        peer.recv_until(notice::SEPARATOR).await;

        peer.send("/users").await;
        assert_eq!(peer.recv().await, notice::NO_OTHER_USERS);

        peer.send("/private nobody hello").await;
        assert_eq!(peer.recv().await, notice::user_not_found("nobody"));

        peer.send("/private nobody").await;
        assert_eq!(peer.recv().await, notice::private_usage());

        peer.send("/dance").await;
        assert_eq!(peer.recv().await, notice::unknown_command("/dance"));

        peer.send("/HELP").await;
        for expected in notice::HELP {
            assert_eq!(peer.recv().await, *expected);
        }
    }

    #[tokio::test]
    async fn test_chat_and_private_routing() {
        let registry = spawn_registry();
        let mut bob = observer(&registry, "bob").await;
        let mut carol = observer(&registry, "carol").await;
        let (mut peer, _task, _shutdown) = spawn_handler(&registry, SessionSettings::default());

        peer.send("alice").await;
        peer.recv_until(notice::SEPARATOR).await;
        let _ = recv_line(&mut bob).await;
        let _ = recv_line(&mut carol).await;

        peer.send("/private bob hello").await;
        assert_eq!(peer.recv().await, "[PRIVATE to bob]: hello");
        assert_eq!(recv_line(&mut bob).await, "[PRIVATE from alice]: hello");
        assert!(carol.try_recv().is_err());

        peer.send("hi all").await;
        assert!(recv_line(&mut bob).await.ends_with("] alice: hi all"));
        assert!(recv_line(&mut carol).await.ends_with("] alice: hi all"));

        // The sender never sees its own broadcast.
        peer.send("/users").await;
        assert_eq!(
            peer.recv().await,
            "👥 Online users (3): alice, bob, carol"
        );
    }

    #[tokio::test]
    async fn test_long_line_is_discarded() {
        let registry = spawn_registry();
        let mut watcher = observer(&registry, "watcher").await;
        let settings = SessionSettings {
            max_line_length: 16,
            ..SessionSettings::default()
        };
        let (mut peer, _task, _shutdown) = spawn_handler(&registry, settings);

        peer.send("hank").await;
        peer.recv_until(notice::SEPARATOR).await;
        let _joined = recv_line(&mut watcher).await;

        peer.send(&"x".repeat(64)).await;
        assert_eq!(peer.recv().await, notice::line_too_long(16));
        assert!(watcher.try_recv().is_err());

        peer.send("short").await;
        assert!(recv_line(&mut watcher).await.ends_with("hank: short"));
    }

    #[tokio::test]
    async fn test_unterminated_line_is_rejected_before_newline() {
        let registry = spawn_registry();
        let mut watcher = observer(&registry, "watcher").await;
        let settings = SessionSettings {
            max_line_length: 16,
            ..SessionSettings::default()
        };
        let (mut peer, _task, _shutdown) = spawn_handler(&registry, settings);

        peer.send("jill").await;
        peer.recv_until(notice::SEPARATOR).await;
        let _joined = recv_line(&mut watcher).await;

        // Far past the limit and still no terminator.
        let chunk = [b'z'; 4096];
        for _ in 0..64 {
            peer.writer.write_all(&chunk).await.unwrap();
        }
        assert_eq!(peer.recv().await, notice::line_too_long(16));

        peer.send("").await;
        peer.send("after").await;
        assert!(recv_line(&mut watcher).await.ends_with("jill: after"));
        assert!(watcher.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_tears_down_active_session() {
        let registry = spawn_registry();
        let mut watcher = observer(&registry, "watcher").await;
        let (mut peer, task, shutdown) = spawn_handler(&registry, SessionSettings::default());

        peer.send("ivan").await;
        peer.recv_until(notice::SEPARATOR).await;
        let _joined = recv_line(&mut watcher).await;

        shutdown.cancel();
        assert_eq!(peer.recv().await, notice::SHUTTING_DOWN);

        let identity = timeout(RECV_TIMEOUT, task).await.unwrap().unwrap();
        assert_eq!(identity.as_ref().map(Identity::as_str), Some("ivan"));
        assert!(recv_line(&mut watcher).await.contains("ivan left"));
    }
}
