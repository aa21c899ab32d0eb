//! parley protocol - the line protocol spoken between client and server
//!
//! The transport is newline-terminated UTF-8 text over a reliable stream.
//! There is no framing beyond the newline and no structured encoding:
//! clients display server lines verbatim.
//!
//! This crate provides:
//! - `command` - parsing of client lines into chat text or commands
//! - `notice` - the fixed server notices (prompts, help, errors)

pub mod command;
pub mod notice;

pub use command::{parse_line, Command, Input, COMMAND_MARKER};
