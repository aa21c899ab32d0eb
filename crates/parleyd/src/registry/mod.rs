//! Session registry using Actor pattern.
//!
//! The registry is the single source of truth for who is currently reachable.
//! It receives commands via a tokio mpsc channel and is the only component
//! that mutates the live identity map.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ConnectionHandler│────▶│  RegistryActor  │────▶│ Broadcast Channel│
//! └─────────────────┘     └────────┬────────┘     └──────────────────┘
//!         │                        │                       │
//!         │   RegistryCommand      │ try_send(Line)        │ RegistryEvent
//!         │   (mpsc channel)       ▼                       ▼
//!    admit/remove/         SessionOutbox per         observers (logging,
//!    fan-out               admitted identity         tests)
//! ```
//!
//! Each call to `spawn_registry` creates an independent registry, so
//! several servers in one process (e.g. in tests) never share state.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;

pub use actor::RegistryActor;
pub use commands::{RegistryCommand, RegistryError, RegistryEvent};
pub use handle::RegistryHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 256;

/// Spawn the registry actor and return a handle for interaction.
///
/// The actor runs until every handle (and clone) has been dropped.
///
/// # Example
///
/// ```no_run
/// use parleyd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry();
///     let names = handle.list_names().await;
///     assert!(names.is_empty());
/// }
/// ```
pub fn spawn_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone());
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}
