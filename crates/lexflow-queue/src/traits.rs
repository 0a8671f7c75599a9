//! Broker contract consumed by the gateway and the workers.
//!
//! The gateway depends only on [`QueueProducer`]; workers depend on
//! [`QueueConsumer`]; health telemetry depends on [`QueueStats`]. Only the
//! process bootstrap knows the concrete implementation, which breaks the
//! otherwise-cyclic gateway ↔ worker ↔ producer references.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::QueueError;
use crate::message::QueueMessage;
use crate::topic::Topic;

/// Producer side: durable enqueue.
#[async_trait]
pub trait QueueProducer: Send + Sync {
    /// Durably enqueue one message. Validation (session presence, size
    /// limit) happens before anything is stored.
    async fn send(&self, topic: Topic, message: QueueMessage) -> Result<(), QueueError>;

    /// Enqueue a batch. The batch fails as a whole on the first invalid
    /// message; nothing before it is rolled back (at-least-once plane).
    async fn send_batch(&self, topic: Topic, messages: Vec<QueueMessage>)
        -> Result<(), QueueError>;
}

/// Exclusive hold on a session. While a lease is live the session's
/// messages are invisible to every other consumer.
#[derive(Debug)]
pub struct SessionLease {
    pub topic: Topic,
    pub session: String,
    pub lease_id: Uuid,
}

/// One received message under a visibility lock.
#[derive(Debug)]
pub struct Delivery {
    pub message: QueueMessage,
    pub topic: Topic,
    /// Times the broker has handed this message to a consumer (1-based).
    pub delivery_count: u32,
    /// Broker handle for complete/abandon/dead-letter.
    pub receipt: Uuid,
}

/// A message parked on the dead-letter topic.
#[derive(Debug, Clone)]
pub struct DeadLetteredMessage {
    pub message: QueueMessage,
    pub source_topic: Topic,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Consumer side: session leasing and delivery settlement.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Lease the next session on a FIFO topic that has ready messages and
    /// no active consumer. `None` when nothing is ready.
    async fn lease_session(&self, topic: Topic) -> Result<Option<SessionLease>, QueueError>;

    /// Receive up to `max` messages from a leased session, in producer
    /// order, each under a visibility lock.
    async fn receive(
        &self,
        lease: &SessionLease,
        max: usize,
    ) -> Result<Vec<Delivery>, QueueError>;

    /// Receive from a non-FIFO topic. No ordering is provided.
    async fn receive_any(&self, topic: Topic, max: usize) -> Result<Vec<Delivery>, QueueError>;

    /// Settle a delivery as done; the message is gone.
    async fn complete(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Return a delivery for redelivery. The delivery count increments;
    /// at the topic's limit the message is dead-lettered instead.
    async fn abandon(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Retire a delivery immediately (e.g. malformed payload).
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError>;

    /// Extend the session lease and the locks of its in-flight
    /// deliveries. Fails with `LeaseLost` if the lease already expired.
    async fn renew(&self, lease: &SessionLease) -> Result<(), QueueError>;

    /// Give the session back so another consumer can lease it.
    async fn release(&self, lease: SessionLease) -> Result<(), QueueError>;

    /// Drain parked dead letters (terminal-outcome consumer).
    async fn drain_dead_letters(
        &self,
        max: usize,
    ) -> Result<Vec<DeadLetteredMessage>, QueueError>;
}

/// Per-topic depth counters for `/queues`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TopicDepths {
    /// Ready + in-flight messages.
    pub active: u64,
    /// Withheld by `scheduled_for`.
    pub scheduled: u64,
    /// Dead-lettered from this topic since startup.
    pub dead_letter: u64,
}

/// Read-only telemetry over the broker.
#[async_trait]
pub trait QueueStats: Send + Sync {
    async fn depths(&self, topic: Topic) -> Result<TopicDepths, QueueError>;

    /// Cheap connectivity probe for health checks.
    async fn ping(&self) -> Result<(), QueueError>;
}
