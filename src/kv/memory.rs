//! Single-process key-value store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use super::{KeyValueStore, StoreError, StoreResult, WindowCount};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    resets_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, Entry>,
    counters: HashMap<String, Counter>,
}

/// Mutex-guarded map with per-entry expiry. Adequate for tests and a single
/// service instance; multi-instance deployments need [`super::RedisStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store mutex poisoned".to_string()))
    }

    /// Drops expired values and counters. Returns how many were removed.
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        let before = inner.values.len() + inner.counters.len();
        inner.values.retain(|_, entry| entry.expires_at > now);
        inner.counters.retain(|_, counter| counter.resets_at > now);
        Ok(before - inner.values.len() - inner.counters.len())
    }

    /// Start the expiry sweep background task.
    pub fn start_purge(&self, every: Duration) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;

            loop {
                interval.tick().await;
                match store.purge_expired() {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Purged expired store entries"),
                    Err(e) => tracing::error!(error = %e, "Store purge failed"),
                }
            }
        });
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let inner = self.lock()?;
        Ok(inner
            .values
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        if let Some(existing) = inner.values.get(key) {
            if existing.expires_at > now {
                return Ok(false);
            }
        }
        inner.values.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.values.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn increment(&self, key: &str, window: Duration) -> StoreResult<WindowCount> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        let counter = inner
            .counters
            .entry(key.to_string())
            .and_modify(|counter| {
                if counter.resets_at <= now {
                    *counter = Counter {
                        count: 0,
                        resets_at: now + window,
                    };
                }
            })
            .or_insert(Counter {
                count: 0,
                resets_at: now + window,
            });
        counter.count += 1;

        Ok(WindowCount {
            count: counter.count,
            reset_in: counter.resets_at.saturating_duration_since(now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_first_writer_wins() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.set_if_absent("k", b"first", ttl).await.unwrap());
        assert!(!store.set_if_absent("k", b"second", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"first".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_values_are_absent() {
        let store = MemoryStore::new();
        store
            .set_if_absent("k", b"v", Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store
            .set_if_absent("k", b"again", Duration::from_secs(10))
            .await
            .unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn increment_does_not_extend_window() {
        let store = MemoryStore::new();
        let window = Duration::from_secs(60);

        let first = store.increment("rl", window).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.reset_in, window);

        tokio::time::advance(Duration::from_secs(20)).await;
        let second = store.increment("rl", window).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.reset_in, Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn increment_resets_after_window() {
        let store = MemoryStore::new();
        let window = Duration::from_secs(1);

        store.increment("rl", window).await.unwrap();
        store.increment("rl", window).await.unwrap();
        tokio::time::advance(Duration::from_millis(1001)).await;

        assert_eq!(store.increment("rl", window).await.unwrap().count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_expired_entries() {
        let store = MemoryStore::new();
        store.set("a", b"1", Duration::from_secs(1)).await.unwrap();
        store.set("b", b"2", Duration::from_secs(100)).await.unwrap();
        store.increment("c", Duration::from_secs(1)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.purge_expired().unwrap(), 2);
        assert_eq!(store.get("b").await.unwrap(), Some(b"2".to_vec()));
    }
}
