//! Error types for the conversation crate.
//!
//! - `StoreError`: failures reported by a message store backend
//! - `ChatError`: failures surfaced by the channel and the view model
//! - `ChatClosed`: a command was sent to a view model that has stopped

use std::fmt;

/// Errors from message store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Failed to connect to the store.
    ConnectionFailed { message: String },
    /// The store rejected or failed to acknowledge a write.
    WriteFailed { message: String },
    /// The live query failed.
    QueryFailed { message: String },
    /// A stored record could not be decoded.
    InvalidRecord { message: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { message } => {
                write!(f, "message store connection failed: {message}")
            }
            Self::WriteFailed { message } => write!(f, "message write failed: {message}"),
            Self::QueryFailed { message } => write!(f, "message query failed: {message}"),
            Self::InvalidRecord { message } => write!(f, "invalid message record: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors surfaced by the conversation channel and the chat view model.
///
/// None of these are fatal; the view model turns them into observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// No principal is signed in.
    Unauthenticated,
    /// The message body is empty or whitespace only.
    EmptyMessage,
    /// The live subscription failed and must be reopened explicitly.
    SubscriptionFailure { reason: String },
    /// The store did not accept the message.
    WriteFailure { reason: String },
}

impl ChatError {
    /// Returns the text shown to the user for this error.
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::Unauthenticated => "You must be logged in to send messages",
            Self::EmptyMessage => "Message can't be empty",
            Self::SubscriptionFailure { reason } => reason,
            Self::WriteFailure { .. } => "Failed to send message",
        }
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "user authentication is required"),
            Self::EmptyMessage => write!(f, "message body is empty"),
            Self::SubscriptionFailure { reason } => {
                write!(f, "conversation subscription failed: {reason}")
            }
            Self::WriteFailure { reason } => write!(f, "failed to send message: {reason}"),
        }
    }
}

impl std::error::Error for ChatError {}

/// The chat view model is no longer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatClosed;

impl fmt::Display for ChatClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chat view model has stopped")
    }
}

impl std::error::Error for ChatClosed {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let err = StoreError::WriteFailed {
            message: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("write failed"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn user_messages() {
        assert_eq!(
            ChatError::Unauthenticated.user_message(),
            "You must be logged in to send messages"
        );
        assert_eq!(ChatError::EmptyMessage.user_message(), "Message can't be empty");
        let write = ChatError::WriteFailure {
            reason: "timeout".to_string(),
        };
        assert_eq!(write.user_message(), "Failed to send message");
    }

    #[test]
    fn subscription_failure_shows_reason() {
        let err = ChatError::SubscriptionFailure {
            reason: "Missing or insufficient permissions.".to_string(),
        };
        assert_eq!(err.user_message(), "Missing or insufficient permissions.");
        assert!(err.to_string().contains("subscription failed"));
    }
}
