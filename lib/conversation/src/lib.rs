//! Conversation service for parley.
//!
//! This crate provides:
//!
//! - **Messages**: the message record and the two-party conversation key
//! - **Message Store**: the store contract plus in-memory and NATS backends
//! - **Conversation Channel**: live subscriptions and sends for one counterpart
//! - **Chat View Model**: observable messages, pending error and draft
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use parley_conversation::{ChannelConfig, ConversationChannel, InMemoryMessageStore};
//! use parley_core::PrincipalId;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = InMemoryMessageStore::new();
//! let mut channel = ConversationChannel::new(
//!     Arc::new(store.clone()),
//!     ChannelConfig::new(PrincipalId::new("admin1")),
//! );
//! let student = PrincipalId::new("s1");
//!
//! channel.open(&student).await.expect("open");
//! assert!(channel.next_snapshot().await.expect("live").expect("snapshot").is_empty());
//!
//! channel.send(Some(&student), "hi").await.expect("send");
//! let snapshot = channel.next_snapshot().await.expect("live").expect("snapshot");
//! assert_eq!(snapshot.messages()[0].body, "hi");
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod message;
pub mod nats;
pub mod store;
pub mod view_model;

pub use channel::{ConversationChannel, Subscription};
pub use config::ChannelConfig;
pub use error::{ChatClosed, ChatError, StoreError};
pub use memory::InMemoryMessageStore;
pub use message::{ConversationKey, Message, MessageBody, NewMessage};
pub use nats::{NatsConfig, NatsMessageStore};
pub use store::{ConversationQuery, MembershipFilter, MessageStore, Snapshot, SnapshotStream};
pub use view_model::{Author, ChatCommand, ChatEntry, ChatHandle, ChatState, ChatViewModel};
