//! Message types for conversations.
//!
//! Records use the document shape of the `chats` collection: `participants`,
//! `senderUID`, `message` and `createdAt`.

use crate::error::ChatError;
use chrono::{DateTime, Utc};
use parley_core::{MessageId, PrincipalId};
use serde::{Deserialize, Serialize};

/// The set of participants of a two-party conversation.
///
/// Stored canonically (sorted), so `{a, b}` and `{b, a}` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<PrincipalId>", try_from = "Vec<PrincipalId>")]
pub struct ConversationKey {
    first: PrincipalId,
    second: PrincipalId,
}

impl ConversationKey {
    /// Creates the key for the conversation between `a` and `b`.
    #[must_use]
    pub fn new(a: PrincipalId, b: PrincipalId) -> Self {
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    /// Returns true if `principal` is a member of this conversation.
    #[must_use]
    pub fn contains(&self, principal: &PrincipalId) -> bool {
        self.first == *principal || self.second == *principal
    }

    /// Returns both members in canonical order.
    #[must_use]
    pub fn members(&self) -> [&PrincipalId; 2] {
        [&self.first, &self.second]
    }
}

impl From<ConversationKey> for Vec<PrincipalId> {
    fn from(key: ConversationKey) -> Self {
        vec![key.first, key.second]
    }
}

impl TryFrom<Vec<PrincipalId>> for ConversationKey {
    type Error = String;

    fn try_from(members: Vec<PrincipalId>) -> Result<Self, Self::Error> {
        let count = members.len();
        let mut members = members.into_iter();
        match (members.next(), members.next(), members.next()) {
            (Some(a), Some(b), None) => Ok(Self::new(a, b)),
            _ => Err(format!("expected 2 participants, found {count}")),
        }
    }
}

/// Validated message text: trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody(String);

impl MessageBody {
    /// Trims `text` and rejects it if nothing remains.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::EmptyMessage`] for empty or whitespace-only text.
    pub fn parse(text: &str) -> Result<Self, ChatError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the body, returning the text.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

/// A record to append to the message store. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Members allowed to view the message.
    pub participants: ConversationKey,
    /// Who sent it.
    #[serde(rename = "senderUID")]
    pub sender_id: PrincipalId,
    /// Message text.
    #[serde(rename = "message")]
    pub body: String,
    /// Ordering timestamp.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    /// Creates a record sent by `sender` to `counterpart`, stamped now.
    #[must_use]
    pub fn new(sender: PrincipalId, counterpart: PrincipalId, body: MessageBody) -> Self {
        Self {
            participants: ConversationKey::new(sender.clone(), counterpart),
            sender_id: sender,
            body: body.into_inner(),
            created_at: Utc::now(),
        }
    }

    /// Overrides the creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Turns the record into a stored message with the assigned id.
    #[must_use]
    pub fn into_message(self, id: MessageId) -> Message {
        Message {
            id,
            participants: self.participants,
            sender_id: self.sender_id,
            body: self.body,
            created_at: self.created_at,
        }
    }
}

/// A persisted chat message. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identifier.
    pub id: MessageId,
    /// Members allowed to view the message.
    pub participants: ConversationKey,
    /// Who sent it.
    #[serde(rename = "senderUID")]
    pub sender_id: PrincipalId,
    /// Message text.
    #[serde(rename = "message")]
    pub body: String,
    /// Ordering timestamp.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Returns true if `principal` sent this message.
    #[must_use]
    pub fn is_from(&self, principal: &PrincipalId) -> bool {
        self.sender_id == *principal
    }
}
