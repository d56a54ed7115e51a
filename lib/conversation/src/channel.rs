//! Conversation channel.
//!
//! A channel talks to one fixed counterpart. It owns at most one live
//! subscription at a time, bound to the principal it was opened for, and
//! appends messages on that principal's behalf.

use crate::config::ChannelConfig;
use crate::error::{ChatError, StoreError};
use crate::message::{ConversationKey, MessageBody, NewMessage};
use crate::store::{ConversationQuery, MessageStore, Snapshot, SnapshotStream};
use futures::{Stream, StreamExt};
use parley_core::{MessageId, PrincipalId, SubscriptionId};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, info, warn};

/// A live conversation subscription.
///
/// Yields snapshots until closed or until the store reports an error, after
/// which it yields nothing. Once closed, no snapshot is delivered even if the
/// store had already produced one.
pub struct Subscription {
    id: SubscriptionId,
    principal: PrincipalId,
    snapshots: Option<SnapshotStream>,
}

impl Subscription {
    fn new(principal: PrincipalId, snapshots: SnapshotStream) -> Self {
        Self {
            id: SubscriptionId::new(),
            principal,
            snapshots: Some(snapshots),
        }
    }

    /// Returns the subscription's id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the principal the subscription was opened for.
    #[must_use]
    pub fn principal(&self) -> &PrincipalId {
        &self.principal
    }

    /// Returns true if the subscription can no longer deliver snapshots.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.snapshots.is_none()
    }

    /// Releases the live query. Idempotent.
    pub fn close(&mut self) {
        if self.snapshots.take().is_some() {
            debug!(subscription = %self.id, principal = %self.principal, "subscription closed");
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("principal", &self.principal)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Stream for Subscription {
    type Item = Result<Snapshot, StoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(snapshots) = self.snapshots.as_mut() else {
            return Poll::Ready(None);
        };
        match snapshots.poll_next_unpin(cx) {
            Poll::Ready(Some(Err(err))) => {
                self.snapshots = None;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                self.snapshots = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

/// The channel between the signed-in principal and a fixed counterpart.
pub struct ConversationChannel {
    store: Arc<dyn MessageStore>,
    config: ChannelConfig,
    active: Option<Subscription>,
}

impl ConversationChannel {
    /// Creates a channel over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, config: ChannelConfig) -> Self {
        Self {
            store,
            config,
            active: None,
        }
    }

    /// Returns the counterpart identifier.
    #[must_use]
    pub fn counterpart(&self) -> &PrincipalId {
        self.config.counterpart_id()
    }

    /// Returns the key of the conversation between `principal` and the counterpart.
    #[must_use]
    pub fn conversation_key(&self, principal: &PrincipalId) -> ConversationKey {
        ConversationKey::new(principal.clone(), self.counterpart().clone())
    }

    /// Returns the live query used for `principal`.
    #[must_use]
    pub fn query_for(&self, principal: &PrincipalId) -> ConversationQuery {
        if self.config.strict_isolation() {
            ConversationQuery::conversation(self.conversation_key(principal))
        } else {
            ConversationQuery::participant(principal.clone())
        }
    }

    /// Returns the live subscription, if one is open.
    #[must_use]
    pub fn subscription(&self) -> Option<&Subscription> {
        self.active.as_ref()
    }

    /// Returns true if a live subscription is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.active.as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Opens a live subscription for `principal`.
    ///
    /// If one is already open for the same principal it is kept. Otherwise the
    /// stale subscription is closed and the query is run from scratch.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::SubscriptionFailure`] if the store rejects the query.
    pub async fn open(&mut self, principal: &PrincipalId) -> Result<SubscriptionId, ChatError> {
        if let Some(active) = self.active.as_ref() {
            if active.principal() == principal && !active.is_closed() {
                return Ok(active.id());
            }
        }
        self.close();

        let snapshots = self
            .store
            .watch(self.query_for(principal))
            .await
            .map_err(|e| {
                warn!(%principal, error = %e, "failed to open conversation subscription");
                ChatError::SubscriptionFailure {
                    reason: e.to_string(),
                }
            })?;

        let subscription = Subscription::new(principal.clone(), snapshots);
        let id = subscription.id();
        info!(subscription = %id, %principal, counterpart = %self.counterpart(), "subscription opened");
        self.active = Some(subscription);
        Ok(id)
    }

    /// Follows a session transition.
    ///
    /// Closes the subscription of a previous principal and, if `principal` is
    /// present, opens one for it.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::SubscriptionFailure`] if re-opening fails.
    pub async fn rebind(
        &mut self,
        principal: Option<&PrincipalId>,
    ) -> Result<Option<SubscriptionId>, ChatError> {
        match principal {
            Some(principal) => self.open(principal).await.map(Some),
            None => {
                self.close();
                Ok(None)
            }
        }
    }

    /// Waits for the next snapshot of the open subscription.
    ///
    /// Returns `None` if no subscription is open or the store ended it. A
    /// store error is reported once; the subscription is then dead until
    /// reopened.
    pub async fn next_snapshot(&mut self) -> Option<Result<Snapshot, ChatError>> {
        let subscription = self.active.as_mut()?;
        match subscription.next().await {
            Some(Ok(snapshot)) => Some(Ok(snapshot)),
            Some(Err(err)) => {
                warn!(subscription = %subscription.id(), error = %err, "conversation subscription failed");
                self.active = None;
                Some(Err(ChatError::SubscriptionFailure {
                    reason: err.to_string(),
                }))
            }
            None => {
                debug!(subscription = %subscription.id(), "conversation subscription ended");
                self.active = None;
                None
            }
        }
    }

    /// Sends `body` from `principal` to the counterpart.
    ///
    /// Returns once the store has durably accepted the message. The message is
    /// not echoed locally; it shows up through the live subscription.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Unauthenticated`] if `principal` is absent
    /// - [`ChatError::EmptyMessage`] if `body` is blank
    /// - [`ChatError::WriteFailure`] if the store rejects the write
    ///
    /// The first two are decided when `send` is called and never reach the
    /// store. The returned future does not borrow the channel.
    pub fn send(
        &self,
        principal: Option<&PrincipalId>,
        body: &str,
    ) -> impl Future<Output = Result<MessageId, ChatError>> + Send + use<> {
        let store = Arc::clone(&self.store);
        let record = principal
            .ok_or(ChatError::Unauthenticated)
            .and_then(|principal| {
                let body = MessageBody::parse(body)?;
                Ok(NewMessage::new(
                    principal.clone(),
                    self.counterpart().clone(),
                    body,
                ))
            });

        async move {
            let record = record?;
            let sender = record.sender_id.clone();
            let id = store.append(record).await.map_err(|e| {
                warn!(principal = %sender, error = %e, "failed to send message");
                ChatError::WriteFailure {
                    reason: e.to_string(),
                }
            })?;
            debug!(message_id = %id, principal = %sender, "message sent");
            Ok(id)
        }
    }

    /// Releases the live subscription. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut subscription) = self.active.take() {
            subscription.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryMessageStore;
    use crate::message::Message;
    use chrono::{Duration, Utc};

    fn p(id: &str) -> PrincipalId {
        PrincipalId::new(id)
    }

    fn channel(store: &InMemoryMessageStore) -> ConversationChannel {
        ConversationChannel::new(
            Arc::new(store.clone()),
            ChannelConfig::new(p("admin1")),
        )
    }

    fn reply(from: &str, to: &str, body: &str) -> Message {
        NewMessage::new(p(from), p(to), MessageBody::parse(body).unwrap())
            .into_message(MessageId::new())
    }

    fn bodies(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.messages().iter().map(|m| m.body.as_str()).collect()
    }

    #[tokio::test]
    async fn send_without_principal_is_unauthenticated() {
        let store = InMemoryMessageStore::new();
        let channel = channel(&store);

        for body in ["hello", "", "   "] {
            let err = channel.send(None, body).await.unwrap_err();
            assert_eq!(err, ChatError::Unauthenticated);
        }
        assert_eq!(store.append_count(), 0);
    }

    #[tokio::test]
    async fn blank_body_is_rejected_before_the_store() {
        let store = InMemoryMessageStore::new();
        let channel = channel(&store);

        for body in ["", " ", "\n\t  "] {
            let err = channel.send(Some(&p("s1")), body).await.unwrap_err();
            assert_eq!(err, ChatError::EmptyMessage);
        }
        assert_eq!(store.append_count(), 0);
    }

    #[tokio::test]
    async fn store_rejection_is_a_write_failure() {
        let store = InMemoryMessageStore::new();
        store.fail_appends("permission denied");
        let channel = channel(&store);

        let err = channel.send(Some(&p("s1")), "hi").await.unwrap_err();

        assert!(matches!(err, ChatError::WriteFailure { reason } if reason.contains("permission denied")));
    }

    #[tokio::test]
    async fn scenario_hi_there() {
        let store = InMemoryMessageStore::new();
        let mut channel = channel(&store);
        channel.open(&p("s1")).await.unwrap();

        assert!(channel.next_snapshot().await.unwrap().unwrap().is_empty());

        channel.send(Some(&p("s1")), "hi").await.unwrap();
        let snapshot = channel.next_snapshot().await.unwrap().unwrap();
        assert_eq!(bodies(&snapshot), ["hi"]);

        channel.send(Some(&p("s1")), "there").await.unwrap();
        let snapshot = channel.next_snapshot().await.unwrap().unwrap();
        assert_eq!(bodies(&snapshot), ["hi", "there"]);
        assert!(snapshot.messages().iter().all(|m| m.is_from(&p("s1"))));
    }

    #[tokio::test]
    async fn n_sends_yield_n_ordered_messages() {
        let store = InMemoryMessageStore::new();
        let mut channel = channel(&store);
        channel.open(&p("s1")).await.unwrap();
        channel.next_snapshot().await.unwrap().unwrap();

        for i in 0..5 {
            channel.send(Some(&p("s1")), &format!("m{i}")).await.unwrap();
        }

        let snapshot = channel.next_snapshot().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 5);
        assert!(snapshot
            .messages()
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at));
        assert_eq!(bodies(&snapshot), ["m0", "m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn sent_message_round_trips() {
        let store = InMemoryMessageStore::new();
        let mut channel = channel(&store);
        channel.open(&p("s1")).await.unwrap();
        channel.next_snapshot().await.unwrap().unwrap();

        let id = channel.send(Some(&p("s1")), "hello").await.unwrap();

        let snapshot = channel.next_snapshot().await.unwrap().unwrap();
        let message = &snapshot.messages()[0];
        assert_eq!(message.id, id);
        assert_eq!(message.sender_id, p("s1"));
        assert_eq!(message.body, "hello");
        assert_eq!(message.participants, ConversationKey::new(p("s1"), p("admin1")));
    }

    #[tokio::test]
    async fn body_is_stored_trimmed() {
        let store = InMemoryMessageStore::new();
        let channel = channel(&store);

        channel.send(Some(&p("s1")), "  hello  ").await.unwrap();

        assert_eq!(store.records()[0].body, "hello");
    }

    #[tokio::test]
    async fn counterpart_replies_are_delivered() {
        let store = InMemoryMessageStore::new();
        let mut channel = channel(&store);
        channel.open(&p("s1")).await.unwrap();
        channel.next_snapshot().await.unwrap().unwrap();

        store.insert(reply("admin1", "s1", "how can I help?"));

        let snapshot = channel.next_snapshot().await.unwrap().unwrap();
        assert!(snapshot.messages()[0].is_from(&p("admin1")));
    }

    #[tokio::test]
    async fn emit_then_close_delivers_nothing() {
        let store = InMemoryMessageStore::new();
        let mut channel = channel(&store);
        channel.open(&p("s1")).await.unwrap();
        channel.next_snapshot().await.unwrap().unwrap();

        store.insert(reply("admin1", "s1", "late"));
        channel.close();

        assert!(channel.next_snapshot().await.is_none());
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn close_then_emit_delivers_nothing() {
        let store = InMemoryMessageStore::new();
        let mut channel = channel(&store);
        channel.open(&p("s1")).await.unwrap();
        channel.next_snapshot().await.unwrap().unwrap();

        channel.close();
        store.insert(reply("admin1", "s1", "late"));

        assert!(channel.next_snapshot().await.is_none());
    }

    #[tokio::test]
    async fn closed_subscription_stream_is_exhausted() {
        let store = InMemoryMessageStore::new();
        let mut subscription = Subscription::new(
            p("s1"),
            store
                .watch(ConversationQuery::participant(p("s1")))
                .await
                .unwrap(),
        );

        store.insert(reply("admin1", "s1", "pending"));
        subscription.close();
        subscription.close();

        assert!(subscription.next().await.is_none());
        assert!(subscription.is_closed());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let store = InMemoryMessageStore::new();
        let mut channel = channel(&store);

        channel.close();
        channel.open(&p("s1")).await.unwrap();
        channel.close();
        channel.close();

        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn open_is_idempotent_for_the_same_principal() {
        let store = InMemoryMessageStore::new();
        let mut channel = channel(&store);

        let first = channel.open(&p("s1")).await.unwrap();
        let second = channel.open(&p("s1")).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn reopen_after_close_restarts_from_scratch() {
        let store = InMemoryMessageStore::new();
        let mut channel = channel(&store);
        channel.send(Some(&p("s1")), "before").await.unwrap();

        let first = channel.open(&p("s1")).await.unwrap();
        channel.next_snapshot().await.unwrap().unwrap();
        channel.close();

        let second = channel.open(&p("s1")).await.unwrap();
        assert_ne!(first, second);
        let snapshot = channel.next_snapshot().await.unwrap().unwrap();
        assert_eq!(bodies(&snapshot), ["before"]);
    }

    #[tokio::test]
    async fn rebind_switches_principal_without_mixing() {
        let store = InMemoryMessageStore::new();
        let mut channel = channel(&store);
        channel.send(Some(&p("s1")), "from s1").await.unwrap();
        channel.send(Some(&p("s2")), "from s2").await.unwrap();

        channel.rebind(Some(&p("s1"))).await.unwrap();
        let snapshot = channel.next_snapshot().await.unwrap().unwrap();
        assert_eq!(bodies(&snapshot), ["from s1"]);

        channel.rebind(Some(&p("s2"))).await.unwrap();
        assert_eq!(channel.subscription().unwrap().principal(), &p("s2"));

        store.insert(reply("admin1", "s1", "for s1 only"));
        channel.send(Some(&p("s2")), "again").await.unwrap();

        let snapshot = channel.next_snapshot().await.unwrap().unwrap();
        assert!(snapshot
            .messages()
            .iter()
            .all(|m| m.participants.contains(&p("s2"))));
        assert_eq!(bodies(&snapshot), ["from s2", "again"]);
    }

    #[tokio::test]
    async fn rebind_to_none_closes() {
        let store = InMemoryMessageStore::new();
        let mut channel = channel(&store);
        channel.open(&p("s1")).await.unwrap();

        assert_eq!(channel.rebind(None).await.unwrap(), None);
        assert!(!channel.is_open());
        assert!(channel.next_snapshot().await.is_none());
    }

    #[tokio::test]
    async fn subscription_failure_kills_the_subscription() {
        let store = InMemoryMessageStore::new();
        let mut channel = channel(&store);
        channel.open(&p("s1")).await.unwrap();
        channel.next_snapshot().await.unwrap().unwrap();

        store.fail_subscriptions("network unreachable");

        let err = channel.next_snapshot().await.unwrap().unwrap_err();
        assert!(matches!(err, ChatError::SubscriptionFailure { .. }));
        assert!(!channel.is_open());
        assert!(channel.next_snapshot().await.is_none());

        store.clear_failures();
        channel.open(&p("s1")).await.unwrap();
        assert!(channel.next_snapshot().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn open_failure_is_a_subscription_failure() {
        let store = InMemoryMessageStore::new();
        store.fail_subscriptions("permission denied");
        let mut channel = channel(&store);

        let err = channel.open(&p("s1")).await.unwrap_err();

        assert!(matches!(err, ChatError::SubscriptionFailure { .. }));
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn membership_view_includes_third_party_records() {
        let store = InMemoryMessageStore::new();
        let mut channel = channel(&store);
        store.insert(reply("intruder", "s1", "psst"));

        channel.open(&p("s1")).await.unwrap();
        let snapshot = channel.next_snapshot().await.unwrap().unwrap();

        assert_eq!(bodies(&snapshot), ["psst"]);
    }

    #[tokio::test]
    async fn strict_isolation_hides_third_party_records() {
        let store = InMemoryMessageStore::new();
        let mut channel = ConversationChannel::new(
            Arc::new(store.clone()),
            ChannelConfig::new(p("admin1")).with_strict_isolation(true),
        );
        store.insert(reply("intruder", "s1", "psst"));
        store.insert(reply("admin1", "s1", "hello"));

        channel.open(&p("s1")).await.unwrap();
        let snapshot = channel.next_snapshot().await.unwrap().unwrap();

        assert_eq!(bodies(&snapshot), ["hello"]);
    }

    #[tokio::test]
    async fn snapshots_follow_created_at_not_arrival() {
        let store = InMemoryMessageStore::new();
        let mut channel = channel(&store);
        let now = Utc::now();
        let late = NewMessage::new(p("admin1"), p("s1"), MessageBody::parse("later").unwrap())
            .with_created_at(now + Duration::seconds(10))
            .into_message(MessageId::new());
        let early = NewMessage::new(p("admin1"), p("s1"), MessageBody::parse("earlier").unwrap())
            .with_created_at(now)
            .into_message(MessageId::new());
        store.insert(late);
        store.insert(early);

        channel.open(&p("s1")).await.unwrap();
        let snapshot = channel.next_snapshot().await.unwrap().unwrap();

        assert_eq!(bodies(&snapshot), ["earlier", "later"]);
    }
}
