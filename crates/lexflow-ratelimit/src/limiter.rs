//! The limiter proper.

use chrono::{DateTime, TimeZone, Utc};
use lexflow_core::RateLimitProfile;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::store::{CounterStore, StoreError};
use crate::window::WindowKind;

/// Outcome of one quota check, carrying everything the gateway needs for
/// the `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Limit of the reported window.
    pub limit: i64,
    /// Requests left in the reported window (0 when refused).
    pub remaining: i64,
    /// Refusals report the most-restrictive exhausted window; allowed
    /// requests report the window closest to exhaustion.
    pub window: WindowKind,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Seconds a refused client should wait before retrying.
    #[must_use]
    pub fn retry_after_secs(&self) -> i64 {
        ((self.reset_at - Utc::now()).num_seconds()).max(1)
    }
}

/// Four-fixed-window limiter over a pluggable counter store.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    degraded: AtomicBool,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether the limiter is currently failing open because the store
    /// is unreachable. Surfaced by `/health`.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Health probe against the backing store.
    pub async fn probe(&self) -> Result<(), StoreError> {
        self.store
            .get_many(std::slice::from_ref(&"health_probe".to_string()))
            .await
            .map(|_| ())
    }

    /// Check and consume one request against all four windows.
    ///
    /// Reads all counters in one batched call; if any window is at its
    /// limit the request is refused with that window's metadata and
    /// nothing is incremented. Otherwise all four counters increment
    /// with per-window TTL.
    pub async fn try_consume(
        &self,
        credential_id: Uuid,
        profile: &RateLimitProfile,
    ) -> RateLimitDecision {
        let now_ms = Utc::now().timestamp_millis();
        let keys: Vec<String> = WindowKind::ALL
            .iter()
            .map(|w| counter_key(credential_id, *w, now_ms))
            .collect();

        let counts = match self.store.get_many(&keys).await {
            Ok(counts) => counts,
            Err(e) => return self.fail_open(profile, now_ms, &e),
        };

        // Refuse on the most-restrictive exhausted window.
        for (window, count) in WindowKind::ALL.iter().zip(&counts) {
            let limit = window.limit_in(profile);
            if *count as i64 >= limit {
                return RateLimitDecision {
                    allowed: false,
                    limit,
                    remaining: 0,
                    window: *window,
                    reset_at: reset_at(*window, now_ms),
                };
            }
        }

        let entries: Vec<(String, std::time::Duration)> = WindowKind::ALL
            .iter()
            .zip(keys)
            .map(|(w, key)| (key, w.ttl()))
            .collect();
        if let Err(e) = self.store.increment_many(&entries).await {
            return self.fail_open(profile, now_ms, &e);
        }
        self.clear_degraded();

        // Report the window closest to exhaustion after this request.
        let (window, remaining) = WindowKind::ALL
            .iter()
            .zip(&counts)
            .map(|(w, count)| (*w, w.limit_in(profile) - *count as i64 - 1))
            .min_by_key(|(_, remaining)| *remaining)
            .unwrap_or((WindowKind::Burst, 0));

        RateLimitDecision {
            allowed: true,
            limit: window.limit_in(profile),
            remaining: remaining.max(0),
            window,
            reset_at: reset_at(window, now_ms),
        }
    }

    fn fail_open(
        &self,
        profile: &RateLimitProfile,
        now_ms: i64,
        error: &StoreError,
    ) -> RateLimitDecision {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                target: "security",
                error = %error,
                "Rate-limit store unavailable, failing open (minute window reported)"
            );
        }

        RateLimitDecision {
            allowed: true,
            limit: WindowKind::Minute.limit_in(profile),
            remaining: WindowKind::Minute.limit_in(profile),
            window: WindowKind::Minute,
            reset_at: reset_at(WindowKind::Minute, now_ms),
        }
    }

    fn clear_degraded(&self) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            tracing::info!(target: "security", "Rate-limit store recovered");
        }
    }
}

fn counter_key(credential_id: Uuid, window: WindowKind, now_ms: i64) -> String {
    format!(
        "rate_limit:{credential_id}:{}:{}",
        window.label(),
        window.bucket_index(now_ms)
    )
}

fn reset_at(window: WindowKind, now_ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(now_ms + window.ms_until_reset(now_ms))
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCounterStore;
    use async_trait::async_trait;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCounterStore::new()))
    }

    fn profile(burst: i32) -> RateLimitProfile {
        RateLimitProfile {
            burst_limit: burst,
            ..RateLimitProfile::default()
        }
    }

    #[tokio::test]
    async fn allows_until_burst_limit() {
        let limiter = limiter();
        let cred = Uuid::new_v4();
        let profile = profile(3);

        for _ in 0..3 {
            assert!(limiter.try_consume(cred, &profile).await.allowed);
        }
        let refused = limiter.try_consume(cred, &profile).await;
        assert!(!refused.allowed);
        assert_eq!(refused.window, WindowKind::Burst);
        assert_eq!(refused.remaining, 0);
        assert_eq!(refused.limit, 3);
        assert!(refused.retry_after_secs() >= 1);
    }

    #[tokio::test]
    async fn refusal_does_not_consume() {
        let limiter = limiter();
        let cred = Uuid::new_v4();
        let profile = profile(2);

        for _ in 0..2 {
            assert!(limiter.try_consume(cred, &profile).await.allowed);
        }
        // Two refusals in a row must not advance the other windows.
        for _ in 0..2 {
            assert!(!limiter.try_consume(cred, &profile).await.allowed);
        }

        // A different credential is unaffected.
        assert!(limiter.try_consume(Uuid::new_v4(), &profile).await.allowed);
    }

    #[tokio::test]
    async fn remaining_counts_down() {
        let limiter = limiter();
        let cred = Uuid::new_v4();
        let profile = profile(5);

        let first = limiter.try_consume(cred, &profile).await;
        assert_eq!(first.remaining, 4);
        let second = limiter.try_consume(cred, &profile).await;
        assert_eq!(second.remaining, 3);
        assert_eq!(second.window, WindowKind::Burst);
    }

    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn get_many(&self, _keys: &[String]) -> Result<Vec<u64>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn increment_many(
            &self,
            _entries: &[(String, std::time::Duration)],
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn broken_store_fails_open_and_reports_degraded() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore));
        let decision = limiter
            .try_consume(Uuid::new_v4(), &RateLimitProfile::default())
            .await;

        assert!(decision.allowed);
        assert_eq!(decision.window, WindowKind::Minute);
        assert!(limiter.is_degraded());
    }
}
