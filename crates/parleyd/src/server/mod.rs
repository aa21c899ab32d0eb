//! TCP listener for the chat server.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Spawns a ConnectionHandler task for each client
//! - Logs membership changes published by the registry
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and the loop keeps running

mod codec;
mod connection;

pub use connection::{ConnectionError, ConnectionHandler, SessionState};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::registry::{RegistryEvent, RegistryHandle};
use crate::session::SessionSettings;

/// How long shutdown waits for sessions to finish their teardown.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// TCP chat server.
pub struct ChatServer {
    /// Bound listener
    listener: TcpListener,

    /// Address actually bound (resolves port 0)
    local_addr: SocketAddr,

    /// Handle to the registry
    registry: RegistryHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for numbering sessions
    connection_counter: AtomicU64,

    /// Connections currently open (named or not)
    active_connections: Arc<AtomicUsize>,

    settings: SessionSettings,
}

impl ChatServer {
    /// Binds the listening socket.
    ///
    /// Binding is the only fatal failure of the server.
    ///
    /// # Errors
    ///
    /// - `ServerError::Bind` if the address cannot be bound
    pub async fn bind(
        config: &ServerConfig,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let bind_err = |source| ServerError::Bind {
            addr: config.bind,
            source,
        };

        let listener = TcpListener::bind(config.bind).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        Ok(Self {
            listener,
            local_addr,
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            active_connections: Arc::new(AtomicUsize::new(0)),
            settings: config.session_settings(),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the number of open connections.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Runs the accept loop until the cancellation token fires, then waits
    /// (bounded) for every session to finish its teardown.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr, "Chat server listening");

        self.spawn_membership_logger();
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let connection =
                                self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(&mut sessions, stream, peer, connection);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }

            // Reap finished sessions so the set does not grow unbounded.
            while sessions.try_join_next().is_some() {}
        }

        self.drain(sessions).await;
        Ok(())
    }

    /// Spawns the session task for a new connection.
    fn handle_connection(
        &self,
        sessions: &mut JoinSet<()>,
        stream: TcpStream,
        peer: SocketAddr,
        connection: u64,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(connection, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let handler = ConnectionHandler::new(
            reader,
            writer,
            self.registry.clone(),
            connection,
            self.settings,
            self.cancel_token.child_token(),
        );

        let active = Arc::clone(&self.active_connections);
        let open = active.fetch_add(1, Ordering::Relaxed) + 1;
        info!(connection, peer = %peer, active = open, "New client connected");

        sessions.spawn(async move {
            let identity = handler.run().await;
            let remaining = active.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
            info!(
                connection,
                identity = ?identity.as_ref().map(|i| i.as_str()),
                active = remaining,
                "Client disconnected"
            );
        });
    }

    /// Spawns a task logging registry membership changes.
    fn spawn_membership_logger(&self) {
        let mut events = self.registry.subscribe();
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,

                    result = events.recv() => {
                        match result {
                            Ok(event) => {
                                let (change, online) = match &event {
                                    RegistryEvent::Joined { online, .. } => ("joined", *online),
                                    RegistryEvent::Left { online, .. } => ("left", *online),
                                };
                                debug!(
                                    identity = %event.identity(),
                                    online,
                                    change,
                                    "Membership changed"
                                );
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Membership logger lagged, skipped events");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });
    }

    /// Waits for sessions to tear down after cancellation.
    async fn drain(self, mut sessions: JoinSet<()>) {
        let pending = sessions.len();
        if pending > 0 {
            info!(sessions = pending, "Waiting for sessions to close");
        }

        let drained = timeout(SHUTDOWN_GRACE_PERIOD, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = sessions.len(),
                "Sessions did not close in time, aborting"
            );
            sessions.abort_all();
        }

        info!("Server stopped");
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}
