//! Shared key-value store used by the idempotency gate and the rate limiter.
//!
//! All mutations go through atomic primitives. Callers never read a value,
//! modify it and write it back.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store value could not be decoded: {0}")]
    Serialization(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// State of a fixed-window counter after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u64,
    /// Time left until the window resets.
    pub reset_in: Duration,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Stores `value` only when `key` is absent. Returns `true` when this
    /// caller's write won.
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<bool>;

    /// Unconditional overwrite. Only the owner of a key claimed through
    /// `set_if_absent` may call this.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

    /// Atomically increments the counter at `key`. The window expiry is set
    /// on the first hit only and never extended by later hits.
    async fn increment(&self, key: &str, window: Duration) -> StoreResult<WindowCount>;
}
