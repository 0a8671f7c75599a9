//! Document worker: unordered processing of claimed uploads.

use lexflow_blob::CapabilityIssuer;
use lexflow_db::models::DocumentStatus;
use lexflow_queue::{Delivery, MessageKind, QueueConsumer, Topic};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::WorkerError;

/// Payload of a `document_processing` queue message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentJob {
    pub correlation_id: Uuid,
    pub tenant: String,
    pub blob_path: String,
    pub max_size_mb: i32,
}

/// Consumes the non-FIFO `documents` topic. No ordering: uploads from
/// the same tenant may complete in any order.
pub struct DocumentWorker {
    consumer: Arc<dyn QueueConsumer>,
    capabilities: CapabilityIssuer,
    poll_interval: Duration,
}

impl DocumentWorker {
    #[must_use]
    pub fn new(consumer: Arc<dyn QueueConsumer>, capabilities: CapabilityIssuer) -> Self {
        Self {
            consumer,
            capabilities,
            poll_interval: Duration::from_millis(250),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(token).await;
        })
    }

    async fn run(&self, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                tracing::info!(target: "worker", "Document worker exiting");
                return;
            }

            let deliveries = match self.consumer.receive_any(Topic::Documents, 5).await {
                Ok(d) => d,
                Err(e) => {
                    tracing::error!(target: "worker", error = %e, "Document receive failed");
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };

            if deliveries.is_empty() {
                tokio::select! {
                    () = token.cancelled() => {}
                    () = tokio::time::sleep(self.poll_interval) => {}
                }
                continue;
            }

            for delivery in deliveries {
                match self.handle(&delivery).await {
                    Ok(()) => {
                        if let Err(e) = self.consumer.complete(&delivery).await {
                            tracing::warn!(target: "worker", error = %e, "Complete failed");
                        }
                    }
                    Err(e) if e.is_malformed() => {
                        tracing::error!(target: "worker", error = %e, "Malformed document job");
                        if let Err(e) = self.consumer.dead_letter(&delivery, "malformed").await {
                            tracing::error!(target: "worker", error = %e, "Dead-letter failed");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(target: "worker", error = %e, "Document processing failed");
                        if let Err(e) = self.consumer.abandon(&delivery).await {
                            tracing::error!(target: "worker", error = %e, "Abandon failed");
                        }
                    }
                }
            }
        }
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), WorkerError> {
        if delivery.message.kind != MessageKind::DocumentProcessing {
            return Err(WorkerError::Malformed(format!(
                "unexpected message kind {:?} on documents topic",
                delivery.message.kind
            )));
        }

        let job: DocumentJob = serde_json::from_value(delivery.message.payload.clone())
            .map_err(|e| WorkerError::Malformed(e.to_string()))?;

        self.capabilities
            .update_status(job.correlation_id, DocumentStatus::Processing, None, None)
            .await?;

        // Re-validate before finalizing; the blob may have been replaced
        // or removed between the reactor event and this worker.
        let validation = self
            .capabilities
            .validate_uploaded(&job.blob_path, job.max_size_mb)
            .await?;

        if validation.valid {
            self.capabilities
                .update_status(
                    job.correlation_id,
                    DocumentStatus::Completed,
                    validation.file_size_bytes,
                    None,
                )
                .await?;
            tracing::info!(
                target: "worker",
                correlation_id = %job.correlation_id,
                blob_path = %job.blob_path,
                file_size_mb = ?validation.file_size_mb,
                "Document processed"
            );
        } else {
            let error = validation.error.unwrap_or_else(|| "validation failed".to_string());
            self.capabilities
                .update_status(
                    job.correlation_id,
                    DocumentStatus::Failed,
                    validation.file_size_bytes,
                    Some(&error),
                )
                .await?;
            tracing::warn!(
                target: "worker",
                correlation_id = %job.correlation_id,
                blob_path = %job.blob_path,
                error = %error,
                "Document failed validation during processing"
            );
        }

        Ok(())
    }
}
