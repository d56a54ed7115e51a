//! In-memory message store.
//!
//! Records live in a shared vector; a `watch` counter wakes live queries after
//! every change. Bursts of writes may be coalesced into one snapshot, which
//! always reflects the latest state. Faults can be injected to exercise the
//! failure paths of the channel.

use crate::error::StoreError;
use crate::message::{Message, NewMessage};
use crate::store::{ConversationQuery, MessageStore, Snapshot, SnapshotStream};
use async_trait::async_trait;
use futures::StreamExt;
use parley_core::MessageId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug)]
struct Inner {
    records: Mutex<Vec<Message>>,
    append_failure: Mutex<Option<String>>,
    subscription_failure: Mutex<Option<String>>,
    appends: AtomicUsize,
    version: watch::Sender<u64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Inner {
    fn bump(&self) {
        self.version.send_modify(|version| *version += 1);
    }

    fn snapshot(&self, query: &ConversationQuery) -> Snapshot {
        let matching = lock(&self.records)
            .iter()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();
        Snapshot::from_unordered(matching)
    }

    fn subscription_failure(&self) -> Option<String> {
        lock(&self.subscription_failure).clone()
    }
}

/// Message store kept in process memory. Clones share the same records.
#[derive(Debug, Clone)]
pub struct InMemoryMessageStore {
    inner: Arc<Inner>,
}

impl InMemoryMessageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                records: Mutex::new(Vec::new()),
                append_failure: Mutex::new(None),
                subscription_failure: Mutex::new(None),
                appends: AtomicUsize::new(0),
                version,
            }),
        }
    }

    /// Stores a message as-is, bypassing `append`.
    ///
    /// Models writes made by other clients, such as the counterpart's replies.
    pub fn insert(&self, message: Message) {
        lock(&self.inner.records).push(message);
        self.inner.bump();
    }

    /// Returns every stored message in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<Message> {
        lock(&self.inner.records).clone()
    }

    /// Returns how many times `append` has been called.
    #[must_use]
    pub fn append_count(&self) -> usize {
        self.inner.appends.load(Ordering::SeqCst)
    }

    /// Makes every following `append` fail with `reason`.
    pub fn fail_appends(&self, reason: impl Into<String>) {
        *lock(&self.inner.append_failure) = Some(reason.into());
    }

    /// Fails live queries with `reason`, including the ones already open.
    pub fn fail_subscriptions(&self, reason: impl Into<String>) {
        *lock(&self.inner.subscription_failure) = Some(reason.into());
        self.inner.bump();
    }

    /// Clears injected faults.
    pub fn clear_failures(&self) {
        *lock(&self.inner.append_failure) = None;
        *lock(&self.inner.subscription_failure) = None;
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

struct LiveQuery {
    inner: Arc<Inner>,
    query: ConversationQuery,
    version: watch::Receiver<u64>,
    started: bool,
    failed: bool,
}

impl LiveQuery {
    async fn next(mut self) -> Option<(Result<Snapshot, StoreError>, Self)> {
        if self.failed {
            return None;
        }
        if self.started {
            self.version.changed().await.ok()?;
        } else {
            self.started = true;
            self.version.mark_unchanged();
        }
        if let Some(message) = self.inner.subscription_failure() {
            self.failed = true;
            return Some((Err(StoreError::QueryFailed { message }), self));
        }
        let snapshot = self.inner.snapshot(&self.query);
        Some((Ok(snapshot), self))
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, record: NewMessage) -> Result<MessageId, StoreError> {
        self.inner.appends.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.inner.append_failure).clone() {
            return Err(StoreError::WriteFailed { message });
        }

        let id = MessageId::new();
        lock(&self.inner.records).push(record.into_message(id));
        self.inner.bump();
        debug!(message_id = %id, "message appended");
        Ok(id)
    }

    async fn watch(&self, query: ConversationQuery) -> Result<SnapshotStream, StoreError> {
        if let Some(message) = self.inner.subscription_failure() {
            return Err(StoreError::QueryFailed { message });
        }

        let live = LiveQuery {
            inner: Arc::clone(&self.inner),
            query,
            version: self.inner.version.subscribe(),
            started: false,
            failed: false,
        };
        Ok(futures::stream::unfold(live, LiveQuery::next).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageBody;
    use parley_core::PrincipalId;

    fn record(sender: &str, to: &str, body: &str) -> NewMessage {
        NewMessage::new(
            PrincipalId::new(sender),
            PrincipalId::new(to),
            MessageBody::parse(body).unwrap(),
        )
    }

    #[tokio::test]
    async fn first_snapshot_is_current_state() {
        let store = InMemoryMessageStore::new();
        store.append(record("s1", "admin1", "hi")).await.unwrap();

        let mut live = store
            .watch(ConversationQuery::participant(PrincipalId::new("s1")))
            .await
            .unwrap();

        let snapshot = live.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn appends_wake_live_queries() {
        let store = InMemoryMessageStore::new();
        let mut live = store
            .watch(ConversationQuery::participant(PrincipalId::new("s1")))
            .await
            .unwrap();
        assert!(live.next().await.unwrap().unwrap().is_empty());

        store.append(record("s1", "admin1", "hi")).await.unwrap();

        let snapshot = live.next().await.unwrap().unwrap();
        assert_eq!(snapshot.messages()[0].body, "hi");
    }

    #[tokio::test]
    async fn live_queries_filter_by_participant() {
        let store = InMemoryMessageStore::new();
        store.append(record("s1", "admin1", "mine")).await.unwrap();
        store.append(record("s2", "admin1", "theirs")).await.unwrap();

        let mut live = store
            .watch(ConversationQuery::participant(PrincipalId::new("s1")))
            .await
            .unwrap();

        let snapshot = live.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.messages()[0].body, "mine");
    }

    #[tokio::test]
    async fn injected_append_failure() {
        let store = InMemoryMessageStore::new();
        store.fail_appends("permission denied");

        let err = store.append(record("s1", "admin1", "hi")).await.unwrap_err();

        assert!(matches!(err, StoreError::WriteFailed { .. }));
        assert_eq!(store.append_count(), 1);
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn injected_subscription_failure_ends_live_query() {
        let store = InMemoryMessageStore::new();
        let mut live = store
            .watch(ConversationQuery::participant(PrincipalId::new("s1")))
            .await
            .unwrap();
        live.next().await.unwrap().unwrap();

        store.fail_subscriptions("network unreachable");

        let err = live.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StoreError::QueryFailed { .. }));
        assert!(live.next().await.is_none());
    }

    #[tokio::test]
    async fn watch_fails_while_subscriptions_are_failing() {
        let store = InMemoryMessageStore::new();
        store.fail_subscriptions("permission denied");

        let result = store
            .watch(ConversationQuery::participant(PrincipalId::new("s1")))
            .await;
        assert!(result.is_err());

        store.clear_failures();
        assert!(store
            .watch(ConversationQuery::participant(PrincipalId::new("s1")))
            .await
            .is_ok());
    }
}
