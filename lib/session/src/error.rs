//! Error types for the session crate.

use std::fmt;

/// Errors from session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No principal is signed in.
    Unauthenticated,
    /// The identity provider stopped delivering transitions.
    ProviderClosed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "no authenticated principal"),
            Self::ProviderClosed => write!(f, "identity provider stream closed"),
        }
    }
}

impl std::error::Error for SessionError {}
