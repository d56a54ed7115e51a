//! NATS JetStream message store.
//!
//! Messages are published to `<collection>.messages` on a file-backed stream.
//! `append` returns only after JetStream acknowledges the publish. A live query
//! is an ephemeral pull consumer that replays the stream from the start: the
//! backlog present at subscription time is folded into the first snapshot,
//! then every matching record yields a new snapshot.
//!
//! All conversations share one subject and membership is filtered on the
//! client. Every live query therefore receives every conversation's records,
//! and each `open` re-reads the whole collection. This suits small
//! deployments; the subject is not partitioned per participant.

use crate::envelope::{decode, encode};
use crate::error::StoreError;
use crate::message::{Message, NewMessage};
use crate::store::{ConversationQuery, MessageStore, Snapshot, SnapshotStream};
use async_nats::jetstream;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use parley_core::MessageId;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

/// Default collection name.
const DEFAULT_COLLECTION: &str = "chats";

/// Configuration for the NATS-backed store.
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL.
    pub url: String,
    /// Collection the records belong to (defaults to `chats`).
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Stream name (defaults to the upper-cased collection).
    #[serde(default)]
    pub stream_name: Option<String>,
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl NatsConfig {
    /// Creates a new config with the given NATS URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            collection: default_collection(),
            stream_name: None,
        }
    }

    fn stream(&self) -> String {
        self.stream_name
            .clone()
            .unwrap_or_else(|| self.collection.to_uppercase())
    }

    fn subject(&self) -> String {
        format!("{}.messages", self.collection)
    }
}

/// Message store backed by a JetStream stream.
pub struct NatsMessageStore {
    jetstream: jetstream::Context,
    config: NatsConfig,
}

impl NatsMessageStore {
    /// Connects to NATS and ensures the stream exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or stream setup fails.
    pub async fn connect(config: NatsConfig) -> parley_core::Result<Self, StoreError> {
        let client = async_nats::connect(&config.url).await.map_err(|e| {
            StoreError::ConnectionFailed {
                message: e.to_string(),
            }
        })?;

        let jetstream = jetstream::new(client);

        let stream_config = jetstream::stream::Config {
            name: config.stream(),
            subjects: vec![config.subject()],
            storage: jetstream::stream::StorageType::File,
            retention: jetstream::stream::RetentionPolicy::Limits,
            ..Default::default()
        };

        jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| StoreError::ConnectionFailed {
                message: format!("failed to create stream: {e}"),
            })?;

        debug!(stream = %config.stream(), "message stream ready");
        Ok(Self { jetstream, config })
    }
}

/// Projection maintained by one live query.
struct Projection {
    records: BoxStream<'static, Result<Option<Message>, StoreError>>,
    query: ConversationQuery,
    messages: Vec<Message>,
    backlog: u64,
    started: bool,
    failed: bool,
}

impl Projection {
    /// Adds `message` in `created_at` order. Returns true if it was visible.
    fn absorb(&mut self, message: Message) -> bool {
        if !self.query.matches(&message) {
            return false;
        }
        let at = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(at, message);
        true
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::from_unordered(self.messages.clone())
    }

    async fn next(mut self) -> Option<(Result<Snapshot, StoreError>, Self)> {
        if self.failed {
            return None;
        }

        if !self.started {
            self.started = true;
            while self.backlog > 0 {
                self.backlog -= 1;
                match self.records.next().await? {
                    Ok(Some(message)) => {
                        self.absorb(message);
                    }
                    Ok(None) => {}
                    Err(err) => return Some(self.fail(err)),
                }
            }
            let snapshot = self.snapshot();
            return Some((Ok(snapshot), self));
        }

        loop {
            match self.records.next().await? {
                Ok(Some(message)) => {
                    if self.absorb(message) {
                        let snapshot = self.snapshot();
                        return Some((Ok(snapshot), self));
                    }
                }
                Ok(None) => {}
                Err(err) => return Some(self.fail(err)),
            }
        }
    }

    fn fail(mut self, err: StoreError) -> (Result<Snapshot, StoreError>, Self) {
        self.failed = true;
        (Err(err), self)
    }
}

#[async_trait]
impl MessageStore for NatsMessageStore {
    #[instrument(skip(self, record), fields(sender = %record.sender_id))]
    async fn append(&self, record: NewMessage) -> Result<MessageId, StoreError> {
        let id = MessageId::new();
        let bytes = encode(&record.into_message(id))?;

        self.jetstream
            .publish(self.config.subject(), bytes.into())
            .await
            .map_err(|e| StoreError::WriteFailed {
                message: e.to_string(),
            })?
            .await
            .map_err(|e| StoreError::WriteFailed {
                message: e.to_string(),
            })?;

        debug!(message_id = %id, "message acknowledged");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn watch(&self, query: ConversationQuery) -> Result<SnapshotStream, StoreError> {
        let stream = self
            .jetstream
            .get_stream(self.config.stream())
            .await
            .map_err(|e| StoreError::QueryFailed {
                message: format!("failed to get stream: {e}"),
            })?;

        let consumer_config = jetstream::consumer::pull::Config {
            filter_subject: self.config.subject(),
            deliver_policy: jetstream::consumer::DeliverPolicy::All,
            ack_policy: jetstream::consumer::AckPolicy::None,
            ..Default::default()
        };

        let consumer = stream
            .create_consumer(consumer_config)
            .await
            .map_err(|e| StoreError::QueryFailed {
                message: format!("failed to create consumer: {e}"),
            })?;
        let backlog = consumer.cached_info().num_pending;

        let records = consumer
            .messages()
            .await
            .map_err(|e| StoreError::QueryFailed {
                message: format!("failed to get messages: {e}"),
            })?
            .map(|record| -> Result<Option<Message>, StoreError> {
                let record = record.map_err(|e| StoreError::QueryFailed {
                    message: e.to_string(),
                })?;
                match decode(&record.payload) {
                    Err(err) => {
                        warn!(error = %err, "skipping undecodable record");
                        Ok(None)
                    }
                    decoded => decoded,
                }
            })
            .boxed();

        debug!(backlog, "live query started");
        let projection = Projection {
            records,
            query,
            messages: Vec::new(),
            backlog,
            started: false,
            failed: false,
        };
        Ok(futures::stream::unfold(projection, Projection::next).boxed())
    }
}
