//! Fixed-window rate limiting over the shared key-value store.

use std::sync::Arc;
use std::time::Duration;

use super::FailurePolicy;
use crate::error::AppError;
use crate::kv::KeyValueStore;

const KEY_PREFIX: &str = "ratelimit:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u64,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Result of an accepted hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub count: u64,
    pub limit: u64,
    pub remaining: u64,
    /// `false` when the store was unreachable and the hit was let through.
    pub enforced: bool,
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    config: RateLimitConfig,
    policy: FailurePolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, config: RateLimitConfig) -> Self {
        Self {
            store,
            config,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Counts one hit against `key`; rejects once the window's limit is passed.
    pub async fn check(&self, key: &str) -> Result<RateLimitDecision, AppError> {
        let store_key = format!("{}{}", KEY_PREFIX, key);
        let window = match self.store.increment(&store_key, self.config.window).await {
            Ok(window) => window,
            Err(e) => {
                return match self.policy {
                    FailurePolicy::FailOpen => {
                        tracing::error!(key, error = %e, "degraded: rate limit store unavailable, allowing request");
                        Ok(RateLimitDecision {
                            count: 0,
                            limit: self.config.max_requests,
                            remaining: self.config.max_requests,
                            enforced: false,
                        })
                    }
                    FailurePolicy::FailClosed => {
                        tracing::error!(key, error = %e, "degraded: rate limit store unavailable, rejecting request");
                        Err(AppError::Internal("rate limit store unavailable".to_string()))
                    }
                };
            }
        };

        if window.count > self.config.max_requests {
            let retry_after_secs = retry_after_secs(window.reset_in);
            tracing::warn!(key, count = window.count, retry_after_secs, "rate limit exceeded");
            return Err(AppError::RateLimitExceeded { retry_after_secs });
        }

        Ok(RateLimitDecision {
            count: window.count,
            limit: self.config.max_requests,
            remaining: self.config.max_requests - window.count,
            enforced: true,
        })
    }
}

/// Whole seconds until the window resets, rounded up and never zero.
fn retry_after_secs(reset_in: Duration) -> u64 {
    let millis = reset_in.as_millis() as u64;
    ((millis + 999) / 1000).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(59_001)), 60);
        assert_eq!(retry_after_secs(Duration::from_secs(60)), 60);
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }
}
