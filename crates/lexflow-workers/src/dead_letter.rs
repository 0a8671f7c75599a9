//! Dead-letter monitor: records terminal outcomes.

use lexflow_core::{webhook_session, TenantId, WebhookEventKind};
use lexflow_db::models::{DemographicRecord, ProcessingState};
use lexflow_queue::{
    DeadLetteredMessage, MessageKind, QueueConsumer, QueueMessage, QueueProducer, Topic,
};
use lexflow_webhooks::WebhookJob;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::demographics::DemographicsJob;

/// Periodically drains the dead-letter topic, marks the affected records
/// failed, and emits `demographics.failed` webhooks.
pub struct DeadLetterMonitor {
    consumer: Arc<dyn QueueConsumer>,
    producer: Arc<dyn QueueProducer>,
    pool: PgPool,
    poll_interval: Duration,
}

impl DeadLetterMonitor {
    #[must_use]
    pub fn new(
        consumer: Arc<dyn QueueConsumer>,
        producer: Arc<dyn QueueProducer>,
        pool: PgPool,
    ) -> Self {
        Self {
            consumer,
            producer,
            pool,
            poll_interval: Duration::from_secs(5),
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
            tokio::select! {
                () = token.cancelled() => {
                    tracing::info!(target: "worker", "Dead-letter monitor exiting");
                    return;
                }
                () = tokio::time::sleep(self.poll_interval) => {}
            }

            let entries = match self.consumer.drain_dead_letters(50).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::error!(target: "worker", error = %e, "Dead-letter drain failed");
                    continue;
                }
            };

            for entry in entries {
                self.record_outcome(&entry).await;
            }
        }
    }

    async fn record_outcome(&self, entry: &DeadLetteredMessage) {
        tracing::error!(
            target: "worker",
            message_id = %entry.message.id,
            source_topic = %entry.source_topic,
            kind = ?entry.message.kind,
            reason = %entry.reason,
            correlation_id = %entry.message.correlation_id,
            "Message dead-lettered"
        );

        // Only demographics messages have a record to fail and a tenant
        // to notify; webhook dead letters already left their audit trail.
        if entry.message.kind != MessageKind::Demographics {
            return;
        }
        let Ok(job) = serde_json::from_value::<DemographicsJob>(entry.message.payload.clone())
        else {
            return;
        };

        if let Err(e) = DemographicRecord::set_processing_state(
            &self.pool,
            job.record.id,
            ProcessingState::Failed,
        )
        .await
        {
            tracing::error!(
                target: "worker",
                record_id = %job.record.id,
                error = %e,
                "Failed to mark dead-lettered record as failed"
            );
        }

        let Ok(tenant) = TenantId::new(job.record.tenant.clone()) else {
            return;
        };
        let webhook = WebhookJob {
            event: WebhookEventKind::DemographicsFailed,
            tenant: job.record.tenant.clone(),
            data: json!({
                "id": job.record.id,
                "reason": entry.reason,
            }),
            submission_id: Some(job.record.id),
            override_url: None,
        };
        let Ok(payload) = serde_json::to_value(&webhook) else {
            return;
        };
        let message =
            QueueMessage::webhook(webhook_session(&tenant), payload, entry.message.correlation_id);

        if let Err(e) = self.producer.send(Topic::WebhooksFifo, message).await {
            tracing::error!(
                target: "worker",
                record_id = %job.record.id,
                error = %e,
                "Failed to enqueue demographics.failed webhook"
            );
        }
    }
}
