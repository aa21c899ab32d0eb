//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `RegistryEvent`: Membership changes published for observers

use parley_core::Identity;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::session::{Line, SessionOutbox};

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command carries a oneshot channel for its reply. The actor handles
/// commands one at a time, which is what makes check-and-insert atomic.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Admit a session under an identity if no live session holds it.
    ///
    /// Replies `false` when the identity is already taken.
    Admit {
        identity: Identity,
        outbox: SessionOutbox,
        respond_to: oneshot::Sender<bool>,
    },

    /// Remove an identity. Idempotent.
    ///
    /// Replies `true` only if this command removed a live entry.
    Remove {
        identity: Identity,
        respond_to: oneshot::Sender<bool>,
    },

    /// Look up the outbox of a live identity.
    Lookup {
        identity: Identity,
        respond_to: oneshot::Sender<Option<SessionOutbox>>,
    },

    /// Queue a line on every admitted session except `exclude`.
    ///
    /// Replies with the number of outboxes that accepted the line.
    Broadcast {
        line: Line,
        exclude: Option<Identity>,
        respond_to: oneshot::Sender<usize>,
    },

    /// Queue a line on exactly one identity.
    ///
    /// Replies `false` if the identity is not live.
    SendTo {
        identity: Identity,
        line: Line,
        respond_to: oneshot::Sender<bool>,
    },

    /// Snapshot of the admitted identities, sorted.
    ListNames {
        respond_to: oneshot::Sender<Vec<Identity>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
///
/// Admission refusal is not an error: `try_admit` reports it as `false`.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The actor has shut down and no longer answers.
    #[error("registry channel closed")]
    ChannelClosed,
}

// ============================================================================
// Registry Events
// ============================================================================

/// Membership changes published by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// An identity was admitted.
    Joined {
        identity: Identity,
        /// Admitted sessions after the change
        online: usize,
    },

    /// An identity was removed.
    Left {
        identity: Identity,
        /// Admitted sessions after the change
        online: usize,
    },
}

impl RegistryEvent {
    /// The identity the event is about.
    pub fn identity(&self) -> &Identity {
        match self {
            Self::Joined { identity, .. } | Self::Left { identity, .. } => identity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        assert_eq!(RegistryError::ChannelClosed.to_string(), "registry channel closed");
    }

    #[test]
    fn test_event_identity() {
        let alice = Identity::parse("alice").unwrap();
        let event = RegistryEvent::Left {
            identity: alice.clone(),
            online: 0,
        };
        assert_eq!(event.identity(), &alice);
    }
}
