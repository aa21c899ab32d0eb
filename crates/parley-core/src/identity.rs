//! Session identities.

use std::borrow::Borrow;
use std::fmt;

use crate::error::IdentityError;

/// The display name a session claims when it joins.
///
/// Non-empty, trimmed of surrounding whitespace and case-sensitive
/// (`alice` and `Alice` are different identities). No length or charset
/// restriction is imposed beyond that.
///
/// Uniqueness is not a property of the value itself: it is enforced by the
/// registry at admission time, and only among live sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// Parses a raw naming line into an identity.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Empty` if the line is empty or whitespace-only.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentityError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Identity {
    type Error = IdentityError;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}
