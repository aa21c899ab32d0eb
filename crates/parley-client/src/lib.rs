//! parley client - console client for the chat server
//!
//! Connects to a parley server, prints every server line and forwards
//! every input line. The protocol is plain text, so the client does no
//! parsing beyond recognising `/quit`.

pub mod client;
pub mod error;

pub use client::{ChatClient, Disconnect, CONNECTION_LOST, DEFAULT_SERVER_ADDR};
pub use error::{ClientError, Result};
