//! Domain error types for the terminal client.

use std::fmt;

/// Errors that stop the client.
#[derive(Debug)]
pub enum CliError {
    /// Configuration is missing or invalid.
    Config { details: String },
    /// The message store could not be reached.
    Store { details: String },
    /// Reading from the terminal failed.
    Input { details: String },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {}", details),
            Self::Store { details } => write!(f, "message store unavailable: {}", details),
            Self::Input { details } => write!(f, "failed to read input: {}", details),
        }
    }
}

impl std::error::Error for CliError {}
