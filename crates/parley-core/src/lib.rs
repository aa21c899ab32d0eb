//! parley core - shared domain types for the chat server
//!
//! This crate provides the types shared between the daemon (parleyd),
//! the line protocol and the console client:
//! - `Identity` - the unique display name a session claims
//! - `Message` - the three kinds of line a session can be sent
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod identity;
pub mod message;

pub use error::IdentityError;
pub use identity::Identity;
pub use message::{Message, TIME_FORMAT};
