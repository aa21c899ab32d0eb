//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to membership events. Callers never
//! lock anything: all synchronization lives inside the actor.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use parley_core::{Identity, Message};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{RegistryCommand, RegistryError, RegistryEvent};
use crate::session::{Line, SessionOutbox};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// let handle = spawn_registry();
///
/// if handle.try_admit(identity.clone(), outbox).await? {
///     handle.broadcast(&Message::joined(&identity), Some(&identity)).await;
/// }
///
/// let names = handle.list_names().await;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to membership changes
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Admits a session under `identity` unless a live session already holds it.
    ///
    /// Among concurrent attempts for the same identity exactly one gets `true`.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn try_admit(
        &self,
        identity: Identity,
        outbox: SessionOutbox,
    ) -> Result<bool, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Admit {
                identity,
                outbox,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Removes `identity`. Removing an absent identity is a no-op.
    ///
    /// Returns `true` only for the call that actually removed the entry, so
    /// racing callers can tell which one owns the follow-up notifications.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn remove(&self, identity: &Identity) -> Result<bool, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Remove {
                identity: identity.clone(),
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Looks up the outbox of a live identity.
    ///
    /// Returns `None` if the identity is not live or if communication
    /// with the actor fails.
    pub async fn lookup(&self, identity: &Identity) -> Option<SessionOutbox> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Lookup {
                identity: identity.clone(),
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Delivers `message` to every admitted session except `exclude`.
    ///
    /// Best effort over a snapshot of the membership at the time the actor
    /// handles the command. Returns how many outboxes accepted the line
    /// (0 if the actor is gone).
    pub async fn broadcast(&self, message: &Message, exclude: Option<&Identity>) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Broadcast {
                line: render(message),
                exclude: exclude.cloned(),
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or(0)
    }

    /// Delivers `message` to exactly one live identity.
    ///
    /// Returns `false` if the identity is not live or if communication
    /// with the actor fails.
    pub async fn send_to(&self, identity: &Identity, message: &Message) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::SendTo {
                identity: identity.clone(),
                line: render(message),
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Snapshot of the admitted identities, sorted.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn list_names(&self) -> Vec<Identity> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::ListNames { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Subscribe to membership events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Check if the registry actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

fn render(message: &Message) -> Line {
    Line::from(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_reports_closed_actor() {
        let (tx, rx) = mpsc::channel(1);
        let (event_tx, _) = broadcast::channel(1);
        let handle = RegistryHandle::new(tx, event_tx);
        drop(rx);

        let alice = Identity::parse("alice").unwrap();
        let (outbox, _out_rx) = SessionOutbox::channel(1, 1);

        assert!(!handle.is_connected());
        assert!(matches!(
            handle.try_admit(alice.clone(), outbox).await,
            Err(RegistryError::ChannelClosed)
        ));
        assert!(matches!(
            handle.remove(&alice).await,
            Err(RegistryError::ChannelClosed)
        ));
        assert!(handle.lookup(&alice).await.is_none());
        assert!(handle.list_names().await.is_empty());
        assert_eq!(handle.broadcast(&Message::system("x"), None).await, 0);
        assert!(!handle.send_to(&alice, &Message::system("x")).await);
    }
}
