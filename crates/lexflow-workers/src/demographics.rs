//! Ordered demographics worker pool.
//!
//! Workers lease one session at a time, drain it in producer order, and
//! release it. A session held by one worker is invisible to the rest, so
//! per-tenant processing is strictly sequential while tenants proceed in
//! parallel across the pool.

use chrono::Utc;
use lexflow_core::{
    display_tenant_from_session, webhook_session, TenantId, WebhookEventKind,
};
use lexflow_db::models::{DemographicRecord, ProcessingState};
use lexflow_queue::{
    Delivery, MessageKind, QueueConsumer, QueueMessage, QueueProducer, SessionLease, Topic,
};
use lexflow_webhooks::WebhookJob;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::WorkerError;
use crate::sizing::{effective_pool_size, free_memory_mb};

/// Estimated memory per in-flight work item, used for pool bounding.
const PER_WORK_ITEM_MB: u64 = 64;

/// What a record mutation means to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordAction {
    Create,
    Update,
}

/// The record as carried inside a demographics message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEnvelope {
    pub id: Uuid,
    pub tenant: String,
    pub payload: serde_json::Value,
}

/// Payload of a `demographics` queue message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemographicsJob {
    pub action: RecordAction,
    pub record: RecordEnvelope,
}

/// The C7 pool.
pub struct DemographicsWorkerPool {
    consumer: Arc<dyn QueueConsumer>,
    producer: Arc<dyn QueueProducer>,
    pool: PgPool,
    configured_size: usize,
    poll_interval: Duration,
}

impl DemographicsWorkerPool {
    #[must_use]
    pub fn new(
        consumer: Arc<dyn QueueConsumer>,
        producer: Arc<dyn QueueProducer>,
        pool: PgPool,
        configured_size: usize,
    ) -> Self {
        Self {
            consumer,
            producer,
            pool,
            configured_size,
            poll_interval: Duration::from_millis(200),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Spawn the pool. Size is the configured value bounded by available
    /// memory.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        let size = effective_pool_size(self.configured_size, free_memory_mb(), PER_WORK_ITEM_MB);
        tracing::info!(
            target: "worker",
            configured = self.configured_size,
            effective = size,
            "Demographics worker pool starting"
        );

        (0..size)
            .map(|worker| {
                let pool = self.clone();
                let token = token.clone();
                tokio::spawn(async move {
                    pool.worker_loop(worker, token).await;
                })
            })
            .collect()
    }

    async fn worker_loop(&self, worker: usize, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                tracing::info!(target: "worker", worker, "Demographics worker exiting");
                return;
            }

            match self.consumer.lease_session(Topic::DemographicsFifo).await {
                Ok(Some(lease)) => self.drain_session(&lease, &token).await,
                Ok(None) => {
                    tokio::select! {
                        () = token.cancelled() => {}
                        () = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(target: "worker", worker, error = %e, "Session lease failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn drain_session(&self, lease: &SessionLease, token: &CancellationToken) {
        // Display form only; the session name itself is the partition key.
        let tenant_display = display_tenant_from_session(&lease.session).to_string();

        loop {
            let deliveries = match self.consumer.receive(lease, 10).await {
                Ok(d) if d.is_empty() => break,
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(
                        target: "worker",
                        session = %lease.session,
                        error = %e,
                        "Receive failed, dropping session"
                    );
                    return;
                }
            };

            for delivery in deliveries {
                self.settle(&delivery, self.handle(&delivery, &tenant_display).await)
                    .await;

                if let Err(e) = self.consumer.renew(lease).await {
                    // Cannot renew: the lock may already belong to someone
                    // else, so completing further work would break FIFO.
                    tracing::warn!(
                        target: "worker",
                        session = %lease.session,
                        error = %e,
                        "Lost session lease mid-drain"
                    );
                    return;
                }

                if token.is_cancelled() {
                    break;
                }
            }

            if token.is_cancelled() {
                break;
            }
        }

        if let Err(e) = self
            .consumer
            .release(SessionLease {
                topic: lease.topic,
                session: lease.session.clone(),
                lease_id: lease.lease_id,
            })
            .await
        {
            tracing::warn!(target: "worker", session = %lease.session, error = %e, "Release failed");
        }
    }

    async fn handle(&self, delivery: &Delivery, tenant_display: &str) -> Result<(), WorkerError> {
        if delivery.message.kind != MessageKind::Demographics {
            return Err(WorkerError::Malformed(format!(
                "unexpected message kind {:?} on demographics topic",
                delivery.message.kind
            )));
        }

        let job: DemographicsJob = serde_json::from_value(delivery.message.payload.clone())
            .map_err(|e| WorkerError::Malformed(e.to_string()))?;

        let started = std::time::Instant::now();
        let record = &job.record;

        DemographicRecord::set_processing_state(&self.pool, record.id, ProcessingState::Processing)
            .await?;

        // Reprocessing is idempotent: the record id is the natural key.
        let result = DemographicRecord::upsert(&self.pool, record.id, &record.tenant, &record.payload)
            .await;

        match result {
            Ok(_) => {
                DemographicRecord::set_processing_state(
                    &self.pool,
                    record.id,
                    ProcessingState::Completed,
                )
                .await?;
            }
            Err(e) => {
                DemographicRecord::set_processing_state(
                    &self.pool,
                    record.id,
                    ProcessingState::Failed,
                )
                .await
                .ok();
                return Err(e.into());
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            target: "worker",
            tenant = %tenant_display,
            record_id = %record.id,
            action = ?job.action,
            duration_ms,
            "Record processed"
        );

        self.emit_processed(&job, delivery, duration_ms).await?;
        Ok(())
    }

    async fn emit_processed(
        &self,
        job: &DemographicsJob,
        delivery: &Delivery,
        duration_ms: u64,
    ) -> Result<(), WorkerError> {
        let tenant = TenantId::new(job.record.tenant.clone())
            .map_err(|e| WorkerError::Malformed(format!("invalid tenant on record: {e}")))?;

        let webhook = WebhookJob {
            event: WebhookEventKind::DemographicsProcessed,
            tenant: job.record.tenant.clone(),
            data: json!({
                "id": job.record.id,
                "action": job.action,
                "processing_duration_ms": duration_ms,
                "processed_at": Utc::now(),
            }),
            submission_id: Some(job.record.id),
            override_url: None,
        };
        let message = QueueMessage::webhook(
            webhook_session(&tenant),
            serde_json::to_value(&webhook).map_err(lexflow_queue::QueueError::from)?,
            delivery.message.correlation_id,
        );

        self.producer.send(Topic::WebhooksFifo, message).await?;
        Ok(())
    }

    async fn settle(&self, delivery: &Delivery, outcome: Result<(), WorkerError>) {
        match outcome {
            Ok(()) => {
                if let Err(e) = self.consumer.complete(delivery).await {
                    tracing::warn!(target: "worker", error = %e, "Complete failed");
                }
            }
            Err(e) if e.is_malformed() => {
                tracing::error!(
                    target: "worker",
                    message_id = %delivery.message.id,
                    error = %e,
                    "Malformed message, dead-lettering"
                );
                if let Err(e) = self.consumer.dead_letter(delivery, "malformed").await {
                    tracing::error!(target: "worker", error = %e, "Dead-letter failed");
                }
            }
            Err(e) => {
                tracing::warn!(
                    target: "worker",
                    message_id = %delivery.message.id,
                    delivery_count = delivery.delivery_count,
                    error = %e,
                    "Processing failed, abandoning for redelivery"
                );
                if let Err(e) = self.consumer.abandon(delivery).await {
                    tracing::error!(target: "worker", error = %e, "Abandon failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_round_trips() {
        let job = DemographicsJob {
            action: RecordAction::Create,
            record: RecordEnvelope {
                id: Uuid::new_v4(),
                tenant: "Smith & Associates".to_string(),
                payload: json!({"firstname": "John"}),
            },
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["action"], "create");
        let back: DemographicsJob = serde_json::from_value(value).unwrap();
        assert_eq!(back.record.id, job.record.id);
    }

    #[test]
    fn malformed_payload_is_distinguished() {
        let err = serde_json::from_value::<DemographicsJob>(json!({"nope": 1}))
            .map_err(|e| WorkerError::Malformed(e.to_string()))
            .unwrap_err();
        assert!(err.is_malformed());
    }
}
