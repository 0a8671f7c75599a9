//! Process-scoped gateway state.
//!
//! Everything here is constructed once at bootstrap and passed in; the
//! handlers and middleware hold no global state of their own.

use lexflow_auth::CredentialResolver;
use lexflow_blob::CapabilityIssuer;
use lexflow_queue::{QueueProducer, QueueStats};
use lexflow_ratelimit::RateLimiter;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub producer: Arc<dyn QueueProducer>,
    pub queue_stats: Arc<dyn QueueStats>,
    pub resolver: CredentialResolver,
    pub limiter: Arc<RateLimiter>,
    pub capabilities: CapabilityIssuer,
    /// Serialized-batch byte budget (`BATCH_SIZE_LIMIT_BYTES`).
    pub batch_size_limit_bytes: usize,
    pub version: &'static str,
    pub start_time: Instant,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        db: PgPool,
        producer: Arc<dyn QueueProducer>,
        queue_stats: Arc<dyn QueueStats>,
        resolver: CredentialResolver,
        limiter: Arc<RateLimiter>,
        capabilities: CapabilityIssuer,
        batch_size_limit_bytes: usize,
        version: &'static str,
    ) -> Self {
        Self {
            db,
            producer,
            queue_stats,
            resolver,
            limiter,
            capabilities,
            batch_size_limit_bytes,
            version,
            start_time: Instant::now(),
        }
    }

    /// Seconds since the gateway came up.
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
