//! At-most-once execution of mutating operations per (actor, key).
//!
//! The first caller claims the key with `set_if_absent` before running the
//! operation, then overwrites the claim with the captured outcome. Any
//! concurrent or later caller with the same key observes either the claim
//! (and waits for the outcome) or the outcome itself, and replays it without
//! running the operation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::FailurePolicy;
use crate::error::AppError;
use crate::kv::{KeyValueStore, StoreError};

pub const DEFAULT_TTL: Duration = Duration::from_secs(600);
pub const MAX_KEY_LEN: usize = 255;

const KEY_PREFIX: &str = "idempotency:";
const IN_FLIGHT_TTL: Duration = Duration::from_secs(30);
const IN_FLIGHT_WAIT: Duration = Duration::from_secs(5);
const IN_FLIGHT_POLL: Duration = Duration::from_millis(50);

/// The final outcome of a wrapped operation, captured as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_encoding")]
    pub body: Vec<u8>,
}

impl CapturedResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

mod body_encoding {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
enum Entry {
    InFlight,
    Completed { response: CapturedResponse },
}

/// How a [`GateResult`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// The operation ran and its outcome was cached.
    Executed,
    /// A cached outcome was returned; the operation did not run.
    Replayed,
    /// The store was unavailable and the operation ran without caching.
    Unguarded,
}

#[derive(Debug, Clone)]
pub struct GateResult {
    pub response: CapturedResponse,
    pub outcome: GateOutcome,
}

#[derive(Clone)]
pub struct IdempotencyGate {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    policy: FailurePolicy,
}

impl IdempotencyGate {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn validate_key(key: Option<&str>) -> Result<&str, AppError> {
        let key = key.ok_or(AppError::MissingIdempotencyKey)?;
        let len = key.chars().count();
        if len == 0 || len > MAX_KEY_LEN {
            return Err(AppError::InvalidIdempotencyKey(format!(
                "must be between 1 and {} characters",
                MAX_KEY_LEN
            )));
        }
        Ok(key)
    }

    /// Store key for an (actor, client key) pair.
    pub fn cache_key(actor_id: &str, key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(actor_id.as_bytes());
        hasher.update(b":");
        hasher.update(key.as_bytes());
        format!("{}{}", KEY_PREFIX, hex::encode(hasher.finalize()))
    }

    pub async fn execute<F, Fut>(
        &self,
        actor_id: &str,
        key: Option<&str>,
        operation: F,
    ) -> Result<GateResult, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CapturedResponse>,
    {
        let key = Self::validate_key(key)?;
        let cache_key = Self::cache_key(actor_id, key);

        match self.lookup(&cache_key).await {
            Ok(Some(Entry::Completed { response })) => {
                tracing::debug!(actor_id, key, "idempotency cache hit, replaying response");
                return Ok(replayed(response));
            }
            Ok(Some(Entry::InFlight)) => {
                return self.await_winner(&cache_key, key, operation).await;
            }
            Ok(None) => {}
            Err(e) => return self.degraded(e, key, operation).await,
        }

        let claim = match encode(&Entry::InFlight) {
            Ok(claim) => claim,
            Err(e) => return self.degraded(e, key, operation).await,
        };
        match self
            .store
            .set_if_absent(&cache_key, &claim, IN_FLIGHT_TTL.min(self.ttl))
            .await
        {
            Ok(true) => {}
            Ok(false) => return self.await_winner(&cache_key, key, operation).await,
            Err(e) => return self.degraded(e, key, operation).await,
        }

        let response = operation().await;

        let completed = Entry::Completed {
            response: response.clone(),
        };
        let persisted = match encode(&completed) {
            Ok(bytes) => self.store.set(&cache_key, &bytes, self.ttl).await,
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            tracing::error!(
                actor_id,
                key,
                error = %e,
                "degraded: failed to persist idempotent response"
            );
        }

        Ok(GateResult {
            response,
            outcome: GateOutcome::Executed,
        })
    }

    async fn lookup(&self, cache_key: &str) -> Result<Option<Entry>, StoreError> {
        match self.store.get(cache_key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Another caller holds the claim; wait for its outcome and replay it.
    async fn await_winner<F, Fut>(
        &self,
        cache_key: &str,
        key: &str,
        operation: F,
    ) -> Result<GateResult, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CapturedResponse>,
    {
        let deadline = Instant::now() + IN_FLIGHT_WAIT;
        loop {
            match self.lookup(cache_key).await {
                Ok(Some(Entry::Completed { response })) => {
                    tracing::debug!(key, "replaying response of concurrent request");
                    return Ok(replayed(response));
                }
                Ok(Some(Entry::InFlight)) | Ok(None) => {}
                Err(e) => return self.degraded(e, key, operation).await,
            }

            if Instant::now() >= deadline {
                tracing::warn!(key, "idempotent request still in flight");
                return Err(AppError::DuplicateIdempotencyKey(
                    "a request with this key is still being processed".to_string(),
                ));
            }
            tokio::time::sleep(IN_FLIGHT_POLL).await;
        }
    }

    async fn degraded<F, Fut>(
        &self,
        err: StoreError,
        key: &str,
        operation: F,
    ) -> Result<GateResult, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CapturedResponse>,
    {
        match self.policy {
            FailurePolicy::FailOpen => {
                tracing::error!(key, error = %err, "degraded: idempotency store unavailable, executing unguarded");
                Ok(GateResult {
                    response: operation().await,
                    outcome: GateOutcome::Unguarded,
                })
            }
            FailurePolicy::FailClosed => {
                tracing::error!(key, error = %err, "degraded: idempotency store unavailable, rejecting request");
                Err(AppError::Internal(
                    "idempotency store unavailable".to_string(),
                ))
            }
        }
    }
}

fn encode(entry: &Entry) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(entry)?)
}

fn replayed(response: CapturedResponse) -> GateResult {
    GateResult {
        response,
        outcome: GateOutcome::Replayed,
    }
}
