//! Queue error taxonomy.

use crate::topic::Topic;
use thiserror::Error;

/// Errors surfaced by producers and consumers.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Serialized message exceeds the broker payload limit. The producer
    /// must split the batch instead.
    #[error("message {id} is {size} bytes, over the {limit}-byte limit")]
    MessageTooLarge {
        id: uuid::Uuid,
        size: usize,
        limit: usize,
    },

    /// FIFO topics require a non-empty session key.
    #[error("topic {0} requires a session key")]
    SessionRequired(Topic),

    /// The session lease expired or was taken over; the consumer must not
    /// complete in-flight work from it.
    #[error("session lease lost for {session}")]
    LeaseLost { session: String },

    /// Completion/abandon referenced a delivery the broker no longer
    /// tracks (lock expired and the message was redelivered).
    #[error("unknown delivery receipt {0}")]
    UnknownReceipt(uuid::Uuid),

    /// The broker is unreachable.
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    /// Message payload could not be serialized.
    #[error("message serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
