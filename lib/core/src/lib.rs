//! Core identifier types and error handling for parley.
//!
//! This crate provides the identifiers shared by the session and conversation
//! crates, plus the rootcause-based `Result` alias used where errors gain
//! context as they propagate.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{MessageId, ParseIdError, PrincipalId, SubscriptionId};
