//! parley daemon - session registry and chat relay server
//!
//! This crate provides the core infrastructure for the chat server:
//! - `registry` - actor owning the live identity → session mapping
//! - `session` - per-connection outbox and writer task
//! - `server` - TCP listener and per-connection protocol handler
//! - `config` - server configuration (TOML file + overrides)
//! - `pidfile` - pid file handling for `parleyd start/stop/status`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        parleyd                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   ChatServer    │     │      RegistryActor          │   │
//! │  │  (TcpListener)  │     │ (Identity → SessionOutbox)  │   │
//! │  └────────┬────────┘     └──────────────▲──────────────┘   │
//! │           │ accept()                    │ RegistryCommand   │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐                    │                   │
//! │  │ConnectionHandler│────────────────────┘                   │
//! │  │  (per client)   │                                        │
//! │  └────────┬────────┘                                        │
//! │           │ lines (own replies + fan-out from the actor)    │
//! │           ▼                                                 │
//! │  ┌─────────────────┐                                        │
//! │  │  SessionOutbox  │──▶ writer task ──▶ socket write half   │
//! │  └─────────────────┘                                        │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod pidfile;
pub mod registry;
pub mod server;
pub mod session;
