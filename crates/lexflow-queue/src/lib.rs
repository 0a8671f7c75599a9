//! Durable session queue contract and in-process implementation.
//!
//! The ingestion plane depends on a broker that provides per-session FIFO
//! delivery, visibility locks, scheduled delivery, duplicate suppression,
//! and dead-lettering. Those semantics live in the [`QueueProducer`] /
//! [`QueueConsumer`] traits; [`MemoryQueue`] implements them in-process
//! and honors every guarantee, which is what makes the ordering and
//! redelivery properties testable without a real broker.
//!
//! A session is a `<topic-prefix>_<normalized-tenant>` channel: within a
//! session consumer order equals producer order and at most one consumer
//! holds the session at a time. Across sessions there is no ordering.

mod error;
mod memory;
mod message;
mod topic;
mod traits;

pub use error::QueueError;
pub use memory::{MemoryQueue, MemoryQueueOptions};
pub use message::{MessageKind, QueueMessage, MAX_MESSAGE_BYTES};
pub use topic::Topic;
pub use traits::{
    DeadLetteredMessage, Delivery, QueueConsumer, QueueProducer, QueueStats, SessionLease,
    TopicDepths,
};
