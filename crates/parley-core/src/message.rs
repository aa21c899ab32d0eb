//! Chat messages and their line rendering.
//!
//! A `Message` only ever exists transiently: it is rendered to a single
//! line of text and queued on the recipients' outboxes. Nothing is stored.
//!
//! # Line shapes
//!
//! ```text
//! [14:02:11] alice: hello everyone        Broadcast
//! [PRIVATE from alice]: psst              Private, as seen by the recipient
//! [PRIVATE to bob]: psst                  Private, echoed to the sender
//! 👋 carol joined the chat!               System
//! ```

use std::fmt;

use chrono::{DateTime, Local};

use crate::Identity;

/// `strftime` pattern for chat line timestamps.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// A line delivered to one or more sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Server-originated notice (joins, leaves, shutdown).
    System { body: String },

    /// Chat line fanned out to every other active session.
    Broadcast {
        sender: Identity,
        body: String,
        sent_at: DateTime<Local>,
    },

    /// Chat line addressed to exactly one other session.
    Private {
        sender: Identity,
        recipient: Identity,
        body: String,
    },
}

impl Message {
    pub fn system(body: impl Into<String>) -> Self {
        Self::System { body: body.into() }
    }

    /// Membership notice sent to the others when a session is admitted.
    pub fn joined(identity: &Identity) -> Self {
        Self::system(format!("👋 {identity} joined the chat!"))
    }

    /// Membership notice sent to the remaining sessions after teardown.
    pub fn left(identity: &Identity) -> Self {
        Self::system(format!("🚪 {identity} left the chat"))
    }

    /// Builds a broadcast chat line stamped with the current local time.
    pub fn broadcast(sender: Identity, body: impl Into<String>) -> Self {
        Self::Broadcast {
            sender,
            body: body.into(),
            sent_at: Local::now(),
        }
    }

    pub fn private(sender: Identity, recipient: Identity, body: impl Into<String>) -> Self {
        Self::Private {
            sender,
            recipient,
            body: body.into(),
        }
    }

    /// Renders the line as the sender sees it.
    ///
    /// Only private messages are echoed back; broadcasts never reach their
    /// own sender and system notices have none.
    pub fn sender_echo(&self) -> Option<String> {
        match self {
            Self::Private {
                recipient, body, ..
            } => Some(format!("[PRIVATE to {recipient}]: {body}")),
            _ => None,
        }
    }
}

/// Renders the line as its recipients see it.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System { body } => f.write_str(body),
            Self::Broadcast {
                sender,
                body,
                sent_at,
            } => write!(f, "[{}] {sender}: {body}", sent_at.format(TIME_FORMAT)),
            Self::Private { sender, body, .. } => write!(f, "[PRIVATE from {sender}]: {body}"),
        }
    }
}
