#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use treasury_core::adapters::MemoryDatabase;
use treasury_core::config::Config;
use treasury_core::guard::{FailurePolicy, RateLimitConfig};
use treasury_core::kv::{KeyValueStore, MemoryStore, StoreError, StoreResult, WindowCount};
use treasury_core::processor::{
    PaymentProcessor, ProcessorConfig, ProcessorError, ProcessorReceipt,
};
use treasury_core::{create_app, AppState};

pub fn test_config() -> Config {
    Config {
        server_port: 0,
        database_url: None,
        redis_url: None,
        idempotency_ttl: Duration::from_secs(600),
        idempotency_failure_policy: FailurePolicy::FailOpen,
        rate_limit: RateLimitConfig {
            max_requests: 1_000,
            window: Duration::from_secs(60),
        },
        rate_limit_failure_policy: FailurePolicy::FailOpen,
        allowed_assets: vec!["USD".into(), "EUR".into(), "USDC".into()],
        assets_refresh: None,
        trusted_proxy_depth: 1,
        processor: ProcessorConfig::default(),
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub db: MemoryDatabase,
}

impl TestApp {
    pub fn new(config: Config) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: Config, store: Arc<dyn KeyValueStore>) -> Self {
        let db = MemoryDatabase::new();
        let state = AppState::new(&config, Arc::new(db.clone()), store, None);
        Self {
            router: create_app(state.clone()),
            state,
            db,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }
}

pub fn post_json(uri: &str, actor: &str, key: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-actor-id", actor);
    if let Some(key) = key {
        builder = builder.header("idempotency-key", key);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn get(uri: &str, actor: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-actor-id", actor)
        .body(Body::empty())
        .expect("request")
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

/// Key-value store whose backend is always down.
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<Vec<u8>>> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn set_if_absent(&self, _key: &str, _value: &[u8], _ttl: Duration) -> StoreResult<bool> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> StoreResult<()> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn increment(&self, _key: &str, _window: Duration) -> StoreResult<WindowCount> {
        Err(StoreError::Backend("connection refused".into()))
    }
}

/// Scripted processor that records every call it receives.
#[derive(Default)]
pub struct FakeProcessor {
    pub calls: AtomicUsize,
    pub failure: Mutex<Option<ProcessorError>>,
    pub delay: Option<Duration>,
}

impl FakeProcessor {
    pub fn failing(err: ProcessorError) -> Self {
        Self {
            failure: Mutex::new(Some(err)),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond(&self, reference: &str) -> Result<ProcessorReceipt, ProcessorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failure.lock().expect("poisoned mutex").clone() {
            return Err(err);
        }
        Ok(ProcessorReceipt {
            reference: format!("proc-{}", reference),
            status: "accepted".into(),
        })
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn approve(&self, external_ref: &str) -> Result<ProcessorReceipt, ProcessorError> {
        self.respond(external_ref).await
    }

    async fn complete(
        &self,
        external_ref: &str,
        _tx_reference: &str,
    ) -> Result<ProcessorReceipt, ProcessorError> {
        self.respond(external_ref).await
    }
}
