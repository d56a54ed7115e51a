//! Message store contract.
//!
//! A message store is a durable, append-only log of message records that can
//! answer live queries. The conversation channel only depends on this trait;
//! [`InMemoryMessageStore`](crate::memory::InMemoryMessageStore) and
//! [`NatsMessageStore`](crate::nats::NatsMessageStore) implement it.

use crate::error::StoreError;
use crate::message::{ConversationKey, Message, NewMessage};
use async_trait::async_trait;
use futures::stream::BoxStream;
use parley_core::{MessageId, PrincipalId};

/// Which records belong to a conversation view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipFilter {
    /// Every record whose participants include the principal.
    Contains(PrincipalId),
    /// Only records whose participants are exactly this pair.
    Exact(ConversationKey),
}

impl MembershipFilter {
    /// Returns true if a record with `participants` passes the filter.
    #[must_use]
    pub fn matches(&self, participants: &ConversationKey) -> bool {
        match self {
            Self::Contains(principal) => participants.contains(principal),
            Self::Exact(key) => participants == key,
        }
    }
}

/// A live query over the store, ordered ascending by `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationQuery {
    /// Membership filter.
    pub filter: MembershipFilter,
}

impl ConversationQuery {
    /// Query for every message visible to `principal`.
    #[must_use]
    pub fn participant(principal: PrincipalId) -> Self {
        Self {
            filter: MembershipFilter::Contains(principal),
        }
    }

    /// Query for the messages of exactly one conversation.
    #[must_use]
    pub fn conversation(key: ConversationKey) -> Self {
        Self {
            filter: MembershipFilter::Exact(key),
        }
    }

    /// Returns true if `message` belongs to the result set.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        self.filter.matches(&message.participants)
    }
}

/// The full ordered message list of a conversation at one point in time.
///
/// Messages are ascending by `created_at`; equal timestamps keep the order the
/// store produced them in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    messages: Vec<Message>,
}

impl Snapshot {
    /// Creates a snapshot, ordering `messages` by creation time.
    #[must_use]
    pub fn from_unordered(mut messages: Vec<Message>) -> Self {
        messages.sort_by_key(|m| m.created_at);
        Self { messages }
    }

    /// Returns the messages.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the conversation has no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Consumes the snapshot, returning the messages.
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

/// Live sequence of snapshots for one query.
///
/// The first item is the state at subscription time. A store error ends the
/// sequence.
pub type SnapshotStream = BoxStream<'static, Result<Snapshot, StoreError>>;

/// Durable, subscribable log of message records.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Appends a record and returns its id once the write is durable.
    async fn append(&self, record: NewMessage) -> Result<MessageId, StoreError>;

    /// Starts a live query.
    async fn watch(&self, query: ConversationQuery) -> Result<SnapshotStream, StoreError>;
}
