//! Counter storage behind the limiter.
//!
//! The production deployment points this at a shared store; the
//! in-process implementation backs tests and single-node setups. Both
//! methods are batched so one limiter check costs one store round-trip
//! per direction.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Counter store failures. Anything here sends the limiter into
/// fail-open mode; it never bubbles up to the request.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Batched counter reads and increments with per-key TTL.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current values for the given keys, zero for absent or expired.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<u64>, StoreError>;

    /// Increment each key by one. The TTL applies from the key's first
    /// write and bounds the bucket's lifetime.
    async fn increment_many(&self, entries: &[(String, Duration)]) -> Result<(), StoreError>;
}

/// In-process counter store.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, (u64, Instant)>>,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get_many(&self, keys: &[String]) -> Result<Vec<u64>, StoreError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| StoreError::Unavailable("counter store poisoned".to_string()))?;
        let now = Instant::now();
        counters.retain(|_, (_, expires)| *expires > now);

        Ok(keys
            .iter()
            .map(|k| counters.get(k).map_or(0, |(v, _)| *v))
            .collect())
    }

    async fn increment_many(&self, entries: &[(String, Duration)]) -> Result<(), StoreError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| StoreError::Unavailable("counter store poisoned".to_string()))?;
        let now = Instant::now();

        for (key, ttl) in entries {
            match counters.get_mut(key) {
                Some((value, expires)) if *expires > now => *value += 1,
                _ => {
                    counters.insert(key.clone(), (1, now + *ttl));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_keys_read_zero() {
        let store = MemoryCounterStore::new();
        let values = store.get_many(&["a".to_string()]).await.unwrap();
        assert_eq!(values, vec![0]);
    }

    #[tokio::test]
    async fn increments_accumulate() {
        let store = MemoryCounterStore::new();
        let entries = vec![("a".to_string(), Duration::from_secs(60))];
        store.increment_many(&entries).await.unwrap();
        store.increment_many(&entries).await.unwrap();

        let values = store.get_many(&["a".to_string()]).await.unwrap();
        assert_eq!(values, vec![2]);
    }

    #[tokio::test]
    async fn counters_expire_with_their_ttl() {
        let store = MemoryCounterStore::new();
        let entries = vec![("a".to_string(), Duration::from_millis(30))];
        store.increment_many(&entries).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let values = store.get_many(&["a".to_string()]).await.unwrap();
        assert_eq!(values, vec![0]);
    }
}
