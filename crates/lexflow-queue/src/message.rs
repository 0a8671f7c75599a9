//! Queue message envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;
use crate::topic::Topic;

/// Maximum serialized payload size the broker accepts (~250 KB).
pub const MAX_MESSAGE_BYTES: usize = 250_000;

/// Default priority for gateway-produced messages.
const DEFAULT_PRIORITY: u8 = 5;

/// What the payload of a message means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Demographics,
    Webhook,
    DocumentProcessing,
}

/// A message as produced onto and consumed from a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Broker-level identity; duplicate ids on a FIFO topic are
    /// suppressed within the dedup window.
    pub id: Uuid,
    pub kind: MessageKind,
    /// Opaque JSON payload interpreted by the consuming worker.
    pub payload: serde_json::Value,
    /// Mandatory on FIFO topics, absent otherwise.
    pub session: Option<String>,
    /// 1 (lowest) to 10 (highest).
    pub priority: u8,
    /// Consumer-level retry counter (webhook retries enqueue successors
    /// with this incremented — distinct from the broker delivery count).
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    /// Broker withholds the message until this instant.
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Request correlation id, carried end to end.
    pub correlation_id: Uuid,
    /// Id of the in-flight message this one succeeds. The broker slots
    /// the successor into the predecessor's session position, so a
    /// scheduled retry cannot be overtaken by later messages on the
    /// same session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<Uuid>,
}

impl QueueMessage {
    /// A record-processing message for the demographics FIFO topic.
    #[must_use]
    pub fn demographics(session: String, payload: serde_json::Value, correlation_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: MessageKind::Demographics,
            payload,
            session: Some(session),
            priority: DEFAULT_PRIORITY,
            retry_count: 0,
            max_retries: 3,
            created_at: Utc::now(),
            scheduled_for: None,
            correlation_id,
            replaces: None,
        }
    }

    /// An outbound-webhook message for the webhooks FIFO topic.
    #[must_use]
    pub fn webhook(session: String, payload: serde_json::Value, correlation_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: MessageKind::Webhook,
            payload,
            session: Some(session),
            priority: DEFAULT_PRIORITY,
            retry_count: 0,
            max_retries: 3,
            created_at: Utc::now(),
            scheduled_for: None,
            correlation_id,
            replaces: None,
        }
    }

    /// A document-processing message for the unordered documents topic.
    #[must_use]
    pub fn document_processing(payload: serde_json::Value, correlation_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: MessageKind::DocumentProcessing,
            payload,
            session: None,
            priority: DEFAULT_PRIORITY,
            retry_count: 0,
            max_retries: 3,
            created_at: Utc::now(),
            scheduled_for: None,
            correlation_id,
            replaces: None,
        }
    }

    /// Successor for a webhook retry: same session, bumped retry counter,
    /// withheld until `not_before`. A fresh message id is minted so the
    /// FIFO duplicate suppression does not swallow the retry.
    #[must_use]
    pub fn retry_successor(&self, not_before: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            retry_count: self.retry_count + 1,
            created_at: Utc::now(),
            scheduled_for: Some(not_before),
            replaces: Some(self.id),
            ..self.clone()
        }
    }

    /// Serialized payload size used against [`MAX_MESSAGE_BYTES`].
    pub fn encoded_len(&self) -> Result<usize, QueueError> {
        Ok(serde_json::to_vec(self)?.len())
    }

    /// Producer-side validation against a topic's requirements.
    pub fn validate_for(&self, topic: Topic) -> Result<(), QueueError> {
        if topic.is_fifo() && self.session.as_deref().map_or(true, str::is_empty) {
            return Err(QueueError::SessionRequired(topic));
        }
        let size = self.encoded_len()?;
        if size > MAX_MESSAGE_BYTES {
            return Err(QueueError::MessageTooLarge {
                id: self.id,
                size,
                limit: MAX_MESSAGE_BYTES,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn demographics_messages_default_to_priority_5_three_retries() {
        let m = QueueMessage::demographics(
            "demographics_acme".to_string(),
            json!({"action": "create"}),
            Uuid::new_v4(),
        );
        assert_eq!(m.priority, 5);
        assert_eq!(m.max_retries, 3);
        assert_eq!(m.kind, MessageKind::Demographics);
        assert!(m.validate_for(Topic::DemographicsFifo).is_ok());
    }

    #[test]
    fn fifo_topics_reject_missing_session() {
        let m = QueueMessage::document_processing(json!({}), Uuid::new_v4());
        assert!(matches!(
            m.validate_for(Topic::WebhooksFifo),
            Err(QueueError::SessionRequired(Topic::WebhooksFifo))
        ));
        assert!(m.validate_for(Topic::Documents).is_ok());
    }

    #[test]
    fn oversize_payload_is_rejected() {
        let big = "x".repeat(MAX_MESSAGE_BYTES);
        let m = QueueMessage::demographics(
            "demographics_acme".to_string(),
            json!({ "blob": big }),
            Uuid::new_v4(),
        );
        assert!(matches!(
            m.validate_for(Topic::DemographicsFifo),
            Err(QueueError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn retry_successor_keeps_session_and_bumps_count() {
        let m = QueueMessage::webhook(
            "webhook_acme".to_string(),
            json!({"event": "demographics.created"}),
            Uuid::new_v4(),
        );
        let when = Utc::now() + chrono::Duration::seconds(2);
        let next = m.retry_successor(when);

        assert_ne!(next.id, m.id);
        assert_eq!(next.session, m.session);
        assert_eq!(next.retry_count, 1);
        assert_eq!(next.scheduled_for, Some(when));
        assert_eq!(next.correlation_id, m.correlation_id);
        assert_eq!(next.replaces, Some(m.id));
    }
}
