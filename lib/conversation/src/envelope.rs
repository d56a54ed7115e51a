//! Wire format of records written to NATS.
//!
//! Each message document is wrapped as `{"version": N, "payload": {...}}` so
//! the document shape can change without breaking live subscribers. Readers
//! skip records from a newer writer instead of failing the subscription.

use crate::error::StoreError;
use crate::message::Message;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The envelope version this build writes.
pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    payload: T,
}

/// Encodes `message` for publishing.
///
/// # Errors
///
/// Returns [`StoreError::WriteFailed`] if the message cannot be serialized.
pub fn encode(message: &Message) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(&Envelope {
        version: CURRENT_VERSION,
        payload: message,
    })
    .map_err(|e| StoreError::WriteFailed {
        message: format!("failed to serialize message: {e}"),
    })
}

/// Decodes a published record.
///
/// Returns `Ok(None)` for records written with a newer envelope version.
///
/// # Errors
///
/// Returns [`StoreError::InvalidRecord`] if the bytes are not an envelope
/// holding a message document.
pub fn decode(bytes: &[u8]) -> Result<Option<Message>, StoreError> {
    let envelope: Envelope<serde_json::Value> =
        serde_json::from_slice(bytes).map_err(|e| StoreError::InvalidRecord {
            message: e.to_string(),
        })?;
    if envelope.version > CURRENT_VERSION {
        warn!(version = envelope.version, "skipping record from a newer writer");
        return Ok(None);
    }
    serde_json::from_value(envelope.payload)
        .map(Some)
        .map_err(|e| StoreError::InvalidRecord {
            message: e.to_string(),
        })
}
