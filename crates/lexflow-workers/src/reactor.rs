//! Blob-event reactor: object-store completion events → validated
//! uploads → document webhooks.

use lexflow_blob::{parse_blob_path, CapabilityIssuer};
use lexflow_core::{webhook_session, TenantId, WebhookEventKind, SYSTEM_WEBHOOK_SESSION};
use lexflow_db::models::DocumentStatus;
use lexflow_queue::{QueueMessage, QueueProducer, Topic};
use lexflow_webhooks::WebhookJob;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::documents::DocumentJob;
use crate::error::WorkerError;

/// A "blob written" notification from the object store's event feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobWrittenEvent {
    pub blob_path: String,
    #[serde(default)]
    pub size_bytes: Option<i64>,
}

/// C9: reacts to upload completions.
#[derive(Clone)]
pub struct BlobEventReactor {
    capabilities: CapabilityIssuer,
    producer: Arc<dyn QueueProducer>,
}

impl BlobEventReactor {
    #[must_use]
    pub fn new(capabilities: CapabilityIssuer, producer: Arc<dyn QueueProducer>) -> Self {
        Self {
            capabilities,
            producer,
        }
    }

    /// Handle one completion event. Paths that were never issued by this
    /// system are ignored, not errors.
    pub async fn handle(&self, event: &BlobWrittenEvent) -> Result<(), WorkerError> {
        if parse_blob_path(&event.blob_path).is_none() {
            tracing::warn!(
                target: "worker",
                blob_path = %event.blob_path,
                "Blob event path does not match the issued naming convention, ignoring"
            );
            return Ok(());
        }

        let Some(descriptor) = self.capabilities.descriptor_for_path(&event.blob_path).await?
        else {
            tracing::warn!(
                target: "worker",
                blob_path = %event.blob_path,
                "Blob event has no issued descriptor, ignoring"
            );
            return Ok(());
        };

        let validation = self
            .capabilities
            .validate_uploaded(&event.blob_path, descriptor.max_size_mb)
            .await?;

        if !validation.valid {
            let error = validation
                .error
                .unwrap_or_else(|| "validation failed".to_string());
            self.capabilities
                .update_status(
                    descriptor.correlation_id,
                    DocumentStatus::Failed,
                    validation.file_size_bytes,
                    Some(&error),
                )
                .await?;

            let webhook = WebhookJob {
                event: WebhookEventKind::DocumentValidationFailed,
                tenant: descriptor.tenant.clone(),
                data: json!({
                    "correlation_id": descriptor.correlation_id,
                    "blob_path": event.blob_path,
                    "error": error,
                }),
                submission_id: descriptor.demographic_id,
                override_url: None,
            };
            self.send_webhook(SYSTEM_WEBHOOK_SESSION.to_string(), webhook, descriptor.correlation_id)
                .await?;
            return Ok(());
        }

        self.capabilities
            .update_status(
                descriptor.correlation_id,
                DocumentStatus::Uploaded,
                validation.file_size_bytes,
                None,
            )
            .await?;

        let tenant = TenantId::new(descriptor.tenant.clone())
            .map_err(|e| WorkerError::Malformed(format!("stored tenant invalid: {e}")))?;

        let job = DocumentJob {
            correlation_id: descriptor.correlation_id,
            tenant: descriptor.tenant.clone(),
            blob_path: event.blob_path.clone(),
            max_size_mb: descriptor.max_size_mb,
        };
        self.producer
            .send(
                Topic::Documents,
                QueueMessage::document_processing(
                    serde_json::to_value(&job).map_err(lexflow_queue::QueueError::from)?,
                    descriptor.correlation_id,
                ),
            )
            .await?;

        let webhook = WebhookJob {
            event: WebhookEventKind::DocumentUploaded,
            tenant: descriptor.tenant.clone(),
            data: json!({
                "correlation_id": descriptor.correlation_id,
                "blob_path": event.blob_path,
                "file_size_mb": validation.file_size_mb,
            }),
            submission_id: descriptor.demographic_id,
            override_url: None,
        };
        self.send_webhook(webhook_session(&tenant), webhook, descriptor.correlation_id)
            .await?;

        tracing::info!(
            target: "worker",
            correlation_id = %descriptor.correlation_id,
            blob_path = %event.blob_path,
            file_size_mb = ?validation.file_size_mb,
            "Upload claimed and queued for processing"
        );

        Ok(())
    }

    async fn send_webhook(
        &self,
        session: String,
        job: WebhookJob,
        correlation_id: Uuid,
    ) -> Result<(), WorkerError> {
        let message = QueueMessage::webhook(
            session,
            serde_json::to_value(&job).map_err(lexflow_queue::QueueError::from)?,
            correlation_id,
        );
        self.producer.send(Topic::WebhooksFifo, message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_event_deserializes_without_size() {
        let event: BlobWrittenEvent =
            serde_json::from_value(json!({"blob_path": "t/2026-01-01/x_f.pdf"})).unwrap();
        assert!(event.size_bytes.is_none());
    }
}
