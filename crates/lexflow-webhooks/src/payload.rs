//! Webhook job and outbound payload shapes.

use chrono::{DateTime, Utc};
use lexflow_core::WebhookEventKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::signing::sign_payload;

/// What the gateway and workers put on the `webhooks-fifo` topic: the
/// event, the owning tenant, and a compact summary payload. The
/// dispatcher turns this into the signed outbound envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookJob {
    pub event: WebhookEventKind,
    pub tenant: String,
    pub data: Value,
    /// Links the audit row back to the record, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<Uuid>,
    /// Per-job target override (batch-completion notifications carry the
    /// caller-provided URL). Beats the configured tenant target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_url: Option<String>,
}

/// The envelope POSTed to tenant endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub event: WebhookEventKind,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub tenant: String,
}

impl WebhookPayload {
    #[must_use]
    pub fn new(job: &WebhookJob, correlation_id: Uuid) -> Self {
        Self {
            event: job.event,
            data: job.data.clone(),
            timestamp: Utc::now(),
            correlation_id,
            tenant: job.tenant.clone(),
        }
    }

    /// Serialize and sign: the returned object carries a `signature`
    /// field computed over the canonical JSON of everything else.
    pub fn into_signed_value(self, secret: &str) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        sign_payload(secret, &mut value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::verify_payload;
    use serde_json::json;

    #[test]
    fn signed_value_carries_all_envelope_fields() {
        let job = WebhookJob {
            event: WebhookEventKind::DemographicsCreated,
            tenant: "acme".to_string(),
            data: json!({"id": "abc"}),
            submission_id: None,
            override_url: None,
        };
        let value = WebhookPayload::new(&job, Uuid::new_v4())
            .into_signed_value("secret")
            .unwrap();

        assert_eq!(value["event"], "demographics.created");
        assert_eq!(value["tenant"], "acme");
        assert!(value["timestamp"].is_string());
        assert!(value["correlation_id"].is_string());
        assert!(value["signature"].is_string());
        assert!(verify_payload("secret", &value));
    }

    #[test]
    fn job_round_trips_through_queue_payload() {
        let job = WebhookJob {
            event: WebhookEventKind::DocumentUploaded,
            tenant: "acme".to_string(),
            data: json!({"blob_path": "acme/2026-01-01/x_f.pdf"}),
            submission_id: Some(Uuid::new_v4()),
            override_url: None,
        };
        let encoded = serde_json::to_value(&job).unwrap();
        let decoded: WebhookJob = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.event, WebhookEventKind::DocumentUploaded);
        assert_eq!(decoded.submission_id, job.submission_id);
    }
}
