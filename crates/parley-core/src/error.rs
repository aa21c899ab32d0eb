//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur when claiming an identity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The submitted name was empty after trimming surrounding whitespace.
    #[error("Username cannot be empty")]
    Empty,
}
