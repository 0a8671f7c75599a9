//! Logical queue topics.

use std::fmt::{Display, Formatter};
use std::time::Duration;

/// The four logical queues of the ingestion plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Per-tenant ordered record processing.
    DemographicsFifo,
    /// Per-tenant ordered outbound webhook delivery.
    WebhooksFifo,
    /// Unordered document processing.
    Documents,
    /// Terminal parking lot for undeliverable messages.
    DeadLetter,
}

impl Topic {
    /// All topics, for telemetry iteration.
    pub const ALL: [Topic; 4] = [
        Topic::DemographicsFifo,
        Topic::WebhooksFifo,
        Topic::Documents,
        Topic::DeadLetter,
    ];

    /// The broker-side queue name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::DemographicsFifo => "demographics-fifo",
            Topic::WebhooksFifo => "webhooks-fifo",
            Topic::Documents => "documents",
            Topic::DeadLetter => "dead-letter",
        }
    }

    /// Whether the topic guarantees per-session FIFO and requires a
    /// session key on every message.
    #[must_use]
    pub fn is_fifo(self) -> bool {
        matches!(self, Topic::DemographicsFifo | Topic::WebhooksFifo)
    }

    /// Visibility-lock duration for deliveries on this topic.
    #[must_use]
    pub fn lock_duration(self) -> Duration {
        match self {
            Topic::WebhooksFifo => Duration::from_secs(120),
            _ => Duration::from_secs(300),
        }
    }

    /// Delivery count at which a message is dead-lettered.
    #[must_use]
    pub fn max_delivery_count(self) -> u32 {
        match self {
            Topic::WebhooksFifo => 5,
            _ => 3,
        }
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_topics_are_the_session_ones() {
        assert!(Topic::DemographicsFifo.is_fifo());
        assert!(Topic::WebhooksFifo.is_fifo());
        assert!(!Topic::Documents.is_fifo());
        assert!(!Topic::DeadLetter.is_fifo());
    }

    #[test]
    fn lock_durations_per_topic() {
        assert_eq!(
            Topic::DemographicsFifo.lock_duration(),
            Duration::from_secs(300)
        );
        assert_eq!(Topic::WebhooksFifo.lock_duration(), Duration::from_secs(120));
    }

    #[test]
    fn delivery_bounds_per_topic() {
        assert_eq!(Topic::DemographicsFifo.max_delivery_count(), 3);
        assert_eq!(Topic::Documents.max_delivery_count(), 3);
        assert_eq!(Topic::WebhooksFifo.max_delivery_count(), 5);
    }
}
