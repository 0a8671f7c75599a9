//! Session-ordered webhook dispatcher.
//!
//! Each worker leases one `webhooks-fifo` session at a time and drains it
//! in order, so per-tenant deliveries are strictly sequential while
//! tenants proceed in parallel across workers.
//!
//! Retries are scheduled successors, not broker redeliveries: broker
//! redelivery waits out the visibility lock and blocks the session head,
//! whereas completing the failed delivery and enqueuing a successor on
//! the same session with `scheduled_for` keeps the session free for the
//! wait without reordering — the successor still sits behind nothing,
//! because its predecessor completed.

use chrono::Utc;
use lexflow_core::TenantId;
use lexflow_db::models::{DeliveryAttempt, DeliveryStatus, NewDeliveryAttempt};
use lexflow_queue::{Delivery, QueueConsumer, QueueProducer, SessionLease, Topic};
use reqwest::Client;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::WebhookError;
use crate::payload::{WebhookJob, WebhookPayload};
use crate::targets::TargetResolver;

/// Retry delays cap at one minute.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Initial-attempt request timeout.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry-path request timeout.
const RETRY_TIMEOUT: Duration = Duration::from_secs(15);

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct WebhookDispatcherConfig {
    /// HMAC signing key (`WEBHOOK_SECRET`).
    pub secret: String,
    /// `User-Agent` header, `<product>/<version>`.
    pub user_agent: String,
    /// Concurrent session workers.
    pub workers: usize,
    /// Idle sleep between lease polls.
    pub poll_interval: Duration,
    /// Messages pulled per receive.
    pub receive_batch: usize,
}

impl WebhookDispatcherConfig {
    #[must_use]
    pub fn new(secret: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            user_agent: user_agent.into(),
            workers: 4,
            poll_interval: Duration::from_millis(200),
            receive_batch: 10,
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// The dispatcher proper. Cheap to clone behind an `Arc`.
pub struct WebhookDispatcher {
    consumer: Arc<dyn QueueConsumer>,
    producer: Arc<dyn QueueProducer>,
    pool: PgPool,
    targets: TargetResolver,
    config: WebhookDispatcherConfig,
    client: Client,
    retry_client: Client,
}

enum AttemptOutcome {
    Delivered {
        http_status: i16,
        body: String,
    },
    Failed {
        http_status: Option<i16>,
        body: Option<String>,
        error: String,
    },
}

impl WebhookDispatcher {
    pub fn new(
        consumer: Arc<dyn QueueConsumer>,
        producer: Arc<dyn QueueProducer>,
        pool: PgPool,
        targets: TargetResolver,
        config: WebhookDispatcherConfig,
    ) -> Result<Self, WebhookError> {
        let client = Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(WebhookError::ClientBuild)?;
        let retry_client = Client::builder()
            .timeout(RETRY_TIMEOUT)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(WebhookError::ClientBuild)?;

        Ok(Self {
            consumer,
            producer,
            pool,
            targets,
            config,
            client,
            retry_client,
        })
    }

    /// Spawn the configured number of session workers. Each finishes its
    /// current message on cancellation, releases its session, and exits.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        tracing::info!(
            target: "webhook_delivery",
            workers = self.config.workers,
            "Webhook dispatcher starting"
        );

        (0..self.config.workers)
            .map(|worker| {
                let dispatcher = self.clone();
                let token = token.clone();
                tokio::spawn(async move {
                    dispatcher.worker_loop(worker, token).await;
                })
            })
            .collect()
    }

    async fn worker_loop(&self, worker: usize, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                tracing::info!(target: "webhook_delivery", worker, "Dispatcher worker exiting");
                return;
            }

            match self.consumer.lease_session(Topic::WebhooksFifo).await {
                Ok(Some(lease)) => self.drain_session(&lease, &token).await,
                Ok(None) => {
                    tokio::select! {
                        () = token.cancelled() => {}
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                    continue;
                }
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        worker,
                        error = %e,
                        "Failed to lease session"
                    );
                    tokio::time::sleep(self.config.poll_interval).await;
                    continue;
                }
            }
        }
    }

    async fn drain_session(&self, lease: &SessionLease, token: &CancellationToken) {
        loop {
            let deliveries = match self.consumer.receive(lease, self.config.receive_batch).await {
                Ok(d) if d.is_empty() => break,
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(
                        target: "webhook_delivery",
                        session = %lease.session,
                        error = %e,
                        "Receive failed, dropping session"
                    );
                    return;
                }
            };

            for delivery in deliveries {
                self.handle_delivery(delivery).await;

                // A renewal failure means the lease is gone; stop without
                // touching further messages.
                if let Err(e) = self.consumer.renew(lease).await {
                    tracing::warn!(
                        target: "webhook_delivery",
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
            tracing::warn!(
                target: "webhook_delivery",
                session = %lease.session,
                error = %e,
                "Failed to release session"
            );
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let job: WebhookJob = match serde_json::from_value(delivery.message.payload.clone()) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    message_id = %delivery.message.id,
                    error = %e,
                    "Malformed webhook job, dead-lettering"
                );
                if let Err(e) = self.consumer.dead_letter(&delivery, "malformed").await {
                    tracing::error!(target: "webhook_delivery", error = %e, "Dead-letter failed");
                }
                return;
            }
        };

        let Ok(tenant) = TenantId::new(job.tenant.clone()) else {
            if let Err(e) = self.consumer.dead_letter(&delivery, "invalid tenant").await {
                tracing::error!(target: "webhook_delivery", error = %e, "Dead-letter failed");
            }
            return;
        };

        let resolved = job
            .override_url
            .clone()
            .or_else(|| self.targets.resolve(&tenant).map(str::to_string));
        let Some(target_url) = resolved else {
            tracing::info!(
                target: "webhook_delivery",
                tenant = %tenant,
                event = %job.event,
                "No webhook target configured, skipping delivery"
            );
            self.complete(&delivery).await;
            return;
        };

        let attempt = delivery.message.retry_count;
        let outcome = self.attempt_delivery(&job, &delivery, &target_url).await;

        match outcome {
            AttemptOutcome::Delivered { http_status, body } => {
                tracing::info!(
                    target: "webhook_delivery",
                    tenant = %tenant,
                    event = %job.event,
                    target_url = %target_url,
                    http_status,
                    attempt,
                    "Webhook delivered"
                );
                self.record_attempt(
                    &job,
                    &delivery,
                    &target_url,
                    DeliveryStatus::Delivered,
                    Some(http_status),
                    Some(body),
                    None,
                )
                .await;
                self.complete(&delivery).await;
            }
            AttemptOutcome::Failed {
                http_status,
                body,
                error,
            } => {
                tracing::warn!(
                    target: "webhook_delivery",
                    tenant = %tenant,
                    event = %job.event,
                    target_url = %target_url,
                    http_status = ?http_status,
                    attempt,
                    error = %error,
                    "Webhook delivery failed"
                );
                self.record_attempt(
                    &job,
                    &delivery,
                    &target_url,
                    DeliveryStatus::RetryFailed,
                    http_status,
                    body,
                    Some(error.clone()),
                )
                .await;

                if attempt + 1 < delivery.message.max_retries {
                    let delay_ms = backoff_ms(attempt);
                    let successor = delivery
                        .message
                        .retry_successor(Utc::now() + chrono::Duration::milliseconds(delay_ms as i64));
                    match self.producer.send(Topic::WebhooksFifo, successor).await {
                        Ok(()) => self.complete(&delivery).await,
                        Err(e) => {
                            // Could not schedule the retry; fall back to
                            // broker redelivery so the attempt is not lost.
                            tracing::error!(
                                target: "webhook_delivery",
                                error = %e,
                                "Failed to schedule retry, abandoning for redelivery"
                            );
                            if let Err(e) = self.consumer.abandon(&delivery).await {
                                tracing::error!(
                                    target: "webhook_delivery",
                                    error = %e,
                                    "Abandon failed"
                                );
                            }
                        }
                    }
                } else {
                    self.record_attempt(
                        &job,
                        &delivery,
                        &target_url,
                        DeliveryStatus::FailedPermanently,
                        http_status,
                        None,
                        Some("retries exhausted".to_string()),
                    )
                    .await;
                    self.complete(&delivery).await;
                }
            }
        }
    }

    async fn attempt_delivery(
        &self,
        job: &WebhookJob,
        delivery: &Delivery,
        target_url: &str,
    ) -> AttemptOutcome {
        let attempt = delivery.message.retry_count;
        let payload = WebhookPayload::new(job, delivery.message.correlation_id);
        let signed = match payload.into_signed_value(&self.config.secret) {
            Ok(v) => v,
            Err(e) => {
                return AttemptOutcome::Failed {
                    http_status: None,
                    body: None,
                    error: format!("payload serialization failed: {e}"),
                };
            }
        };
        let signature = signed["signature"].as_str().unwrap_or_default().to_string();
        let body = signed.to_string();

        let client = if attempt > 0 {
            &self.retry_client
        } else {
            &self.client
        };

        let result = client
            .post(target_url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Signature", signature)
            .header(
                "X-Correlation-ID",
                delivery.message.correlation_id.to_string(),
            )
            .header("X-Retry-Attempt", attempt.to_string())
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response
                    .text()
                    .await
                    .unwrap_or_default();

                if (200..300).contains(&status) {
                    AttemptOutcome::Delivered {
                        http_status: status as i16,
                        body,
                    }
                } else {
                    AttemptOutcome::Failed {
                        http_status: Some(status as i16),
                        body: Some(body),
                        error: format!("HTTP {status}"),
                    }
                }
            }
            Err(e) => {
                let error = if e.is_timeout() {
                    let timeout = if attempt > 0 { RETRY_TIMEOUT } else { ATTEMPT_TIMEOUT };
                    format!("request timeout ({}s)", timeout.as_secs())
                } else if e.is_connect() {
                    format!("connection failed: {e}")
                } else {
                    format!("request error: {e}")
                };
                AttemptOutcome::Failed {
                    http_status: None,
                    body: None,
                    error,
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_attempt(
        &self,
        job: &WebhookJob,
        delivery: &Delivery,
        target_url: &str,
        status: DeliveryStatus,
        http_status: Option<i16>,
        response_body: Option<String>,
        last_error: Option<String>,
    ) {
        let result = DeliveryAttempt::record(
            &self.pool,
            NewDeliveryAttempt {
                tenant: job.tenant.clone(),
                submission_id: job.submission_id,
                correlation_id: delivery.message.correlation_id,
                target_url: target_url.to_string(),
                event: job.event.as_str().to_string(),
                status,
                http_status,
                response_excerpt: response_body,
                attempt: delivery.message.retry_count as i32,
                last_error,
            },
        )
        .await;

        if let Err(e) = result {
            tracing::error!(
                target: "webhook_delivery",
                correlation_id = %delivery.message.correlation_id,
                error = %e,
                "Failed to record delivery attempt"
            );
        }
    }

    async fn complete(&self, delivery: &Delivery) {
        if let Err(e) = self.consumer.complete(delivery).await {
            tracing::warn!(
                target: "webhook_delivery",
                message_id = %delivery.message.id,
                error = %e,
                "Complete failed (lock lost?)"
            );
        }
    }
}

/// Exponential backoff: `min(2^attempt × 1000 ms, 60 s)`.
#[must_use]
pub fn backoff_ms(attempt: u32) -> u64 {
    let exp = attempt.min(16);
    (1000u64 << exp).min(MAX_BACKOFF_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_one_second() {
        assert_eq!(backoff_ms(0), 1000);
        assert_eq!(backoff_ms(1), 2000);
        assert_eq!(backoff_ms(2), 4000);
        assert_eq!(backoff_ms(5), 32_000);
    }

    #[test]
    fn backoff_caps_at_sixty_seconds() {
        assert_eq!(backoff_ms(6), 60_000);
        assert_eq!(backoff_ms(30), 60_000);
        assert_eq!(backoff_ms(u32::MAX), 60_000);
    }

    #[test]
    fn backoff_is_monotone() {
        let mut previous = 0;
        for attempt in 0..40 {
            let delay = backoff_ms(attempt);
            assert!(delay >= previous);
            previous = delay;
        }
    }
}
