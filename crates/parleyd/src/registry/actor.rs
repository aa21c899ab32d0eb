//! Registry actor - owns the live identity map and processes commands.
//!
//! The RegistryActor is the single owner of membership state. It receives
//! commands via an mpsc channel and publishes membership events via broadcast.
//!
//! Fan-out never performs socket I/O here: lines are handed to each
//! session's outbox with `try_send`, so a slow peer cannot stall the actor.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Reply send failures (caller went away) are ignored

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use parley_core::Identity;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::commands::{RegistryCommand, RegistryEvent};
use crate::session::{Delivery, Line, SessionOutbox};

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all membership state.
///
/// # Thread Safety
///
/// The actor runs in a single task and processes commands sequentially.
/// Every membership snapshot it hands out (fan-out, listing) is therefore
/// taken between two whole mutations, never halfway through one.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Live sessions keyed by identity
    sessions: HashMap<Identity, SessionOutbox>,

    /// Publisher for membership events
    event_publisher: broadcast::Sender<RegistryEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            receiver,
            sessions: HashMap::new(),
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all handles dropped).
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(sessions = self.sessions.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Admit {
                identity,
                outbox,
                respond_to,
            } => {
                let admitted = self.handle_admit(identity, outbox);
                let _ = respond_to.send(admitted);
            }
            RegistryCommand::Remove {
                identity,
                respond_to,
            } => {
                let removed = self.handle_remove(&identity);
                let _ = respond_to.send(removed);
            }
            RegistryCommand::Lookup {
                identity,
                respond_to,
            } => {
                let _ = respond_to.send(self.sessions.get(&identity).cloned());
            }
            RegistryCommand::Broadcast {
                line,
                exclude,
                respond_to,
            } => {
                let delivered = self.handle_broadcast(&line, exclude.as_ref());
                let _ = respond_to.send(delivered);
            }
            RegistryCommand::SendTo {
                identity,
                line,
                respond_to,
            } => {
                let resolved = self.handle_send_to(&identity, line);
                let _ = respond_to.send(resolved);
            }
            RegistryCommand::ListNames { respond_to } => {
                let _ = respond_to.send(self.handle_list_names());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_admit(&mut self, identity: Identity, outbox: SessionOutbox) -> bool {
        let connection = outbox.connection();

        match self.sessions.entry(identity) {
            Entry::Occupied(entry) => {
                debug!(
                    identity = %entry.key(),
                    connection,
                    "Identity already taken, refusing admission"
                );
                false
            }
            Entry::Vacant(entry) => {
                let identity = entry.key().clone();
                entry.insert(outbox);

                info!(
                    identity = %identity,
                    connection,
                    online = self.sessions.len(),
                    "Session admitted"
                );

                let _ = self.event_publisher.send(RegistryEvent::Joined {
                    identity,
                    online: self.sessions.len(),
                });
                true
            }
        }
    }

    fn handle_remove(&mut self, identity: &Identity) -> bool {
        let Some(outbox) = self.sessions.remove(identity) else {
            debug!(identity = %identity, "Remove of absent identity ignored");
            return false;
        };

        info!(
            identity = %identity,
            connection = outbox.connection(),
            online = self.sessions.len(),
            "Session removed"
        );

        let _ = self.event_publisher.send(RegistryEvent::Left {
            identity: identity.clone(),
            online: self.sessions.len(),
        });
        true
    }

    fn handle_broadcast(&self, line: &Line, exclude: Option<&Identity>) -> usize {
        let mut delivered = 0;

        for (identity, outbox) in &self.sessions {
            if exclude == Some(identity) {
                continue;
            }
            if deliver(identity, outbox, line.clone()) {
                delivered += 1;
            }
        }

        debug!(delivered, "Broadcast queued");
        delivered
    }

    fn handle_send_to(&self, identity: &Identity, line: Line) -> bool {
        match self.sessions.get(identity) {
            Some(outbox) => {
                deliver(identity, outbox, line);
                true
            }
            None => false,
        }
    }

    fn handle_list_names(&self) -> Vec<Identity> {
        let mut names: Vec<Identity> = self.sessions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of admitted sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Queues a line on one outbox, logging when it cannot be delivered.
fn deliver(identity: &Identity, outbox: &SessionOutbox, line: Line) -> bool {
    match outbox.try_deliver(line) {
        Delivery::Queued => true,
        Delivery::Dropped => {
            warn!(
                identity = %identity,
                connection = outbox.connection(),
                "Outbox full, dropping line for slow session"
            );
            false
        }
        Delivery::Closed => {
            debug!(
                identity = %identity,
                connection = outbox.connection(),
                "Outbox closed, session is tearing down"
            );
            false
        }
    }
}
