pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod extract;
pub mod guard;
pub mod handlers;
pub mod kv;
pub mod middleware;
pub mod ports;
pub mod processor;
pub mod response;
pub mod services;
pub mod validation;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{MemoryDatabase, PgDatabase};
use crate::config::assets::AssetAllowList;
use crate::config::Config;
use crate::guard::{IdempotencyGate, RateLimiter};
use crate::kv::{KeyValueStore, MemoryStore, RedisStore};
use crate::ports::Database;
use crate::processor::{HttpPaymentProcessor, PaymentProcessor};
use crate::services::{AuditTrail, PaymentStateMachine, WalletLedger};

#[derive(Clone)]
pub struct AppState {
    pub payments: PaymentStateMachine,
    pub wallets: WalletLedger,
    pub audit: AuditTrail,
    pub idempotency: IdempotencyGate,
    pub rate_limiter: RateLimiter,
    pub assets: Arc<AssetAllowList>,
    pub trusted_proxy_depth: usize,
}

impl AppState {
    /// Wires the engines and guards over the given backends.
    pub fn new(
        config: &Config,
        db: Arc<dyn Database>,
        store: Arc<dyn KeyValueStore>,
        processor: Option<Arc<dyn PaymentProcessor>>,
    ) -> Self {
        let assets = Arc::new(AssetAllowList::new(&config.allowed_assets));

        let mut payments = PaymentStateMachine::new(Arc::clone(&db), Arc::clone(&assets));
        if let Some(processor) = processor {
            payments = payments.with_processor(processor);
        }

        Self {
            payments,
            wallets: WalletLedger::new(Arc::clone(&db), Arc::clone(&assets)),
            audit: AuditTrail::new(db),
            idempotency: IdempotencyGate::new(Arc::clone(&store), config.idempotency_ttl)
                .with_policy(config.idempotency_failure_policy),
            rate_limiter: RateLimiter::new(store, config.rate_limit)
                .with_policy(config.rate_limit_failure_policy),
            assets,
            trusted_proxy_depth: config.trusted_proxy_depth,
        }
    }
}

/// Connects the configured backends, falling back to in-process ones.
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let db: Arc<dyn Database> = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            tracing::info!("Using Postgres persistence");
            Arc::new(PgDatabase::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory persistence");
            Arc::new(MemoryDatabase::new())
        }
    };

    let store: Arc<dyn KeyValueStore> = match &config.redis_url {
        Some(url) => {
            tracing::info!("Using Redis for idempotency and rate limiting");
            Arc::new(RedisStore::new(url)?)
        }
        None => {
            tracing::warn!("REDIS_URL not set, idempotency and rate limits are per-process");
            let store = MemoryStore::new();
            store.start_purge(Duration::from_secs(60));
            Arc::new(store)
        }
    };

    let processor: Option<Arc<dyn PaymentProcessor>> = match &config.processor.base_url {
        Some(base_url) => {
            tracing::info!(%base_url, "Payment processor client initialized");
            Some(Arc::new(HttpPaymentProcessor::new(config.processor.clone())))
        }
        None => None,
    };

    Ok(AppState::new(config, db, store, processor))
}

pub fn create_app(state: AppState) -> Router {
    let mutations = Router::new()
        .route("/payments", post(handlers::payments::create_payment))
        .route("/payments/:id/approve", post(handlers::payments::approve_payment))
        .route("/payments/:id/confirm", post(handlers::payments::confirm_payment))
        .route("/payments/:id/cancel", post(handlers::payments::cancel_payment))
        .route("/payments/:id/fail", post(handlers::payments::fail_payment))
        .route("/wallets", post(handlers::wallets::open_wallet))
        .route("/wallets/:id/deposit", post(handlers::wallets::deposit))
        .route("/wallets/:id/withdraw", post(handlers::wallets::withdraw))
        .route("/transfers", post(handlers::wallets::transfer))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::idempotency::idempotency_middleware,
        ));

    let reads = Router::new()
        .route("/payments/:id", get(handlers::payments::get_payment))
        .route("/payments/:id/audit", get(handlers::payments::payment_history))
        .route("/wallets/:id", get(handlers::wallets::get_wallet))
        .route("/wallets/:id/ledger", get(handlers::wallets::wallet_ledger))
        .route("/wallets/:id/audit", get(handlers::wallets::wallet_history));

    Router::new()
        .merge(mutations)
        .merge(reads)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::identity::identity_middleware,
        ))
        .route("/health", get(handlers::health))
        .layer(from_fn(middleware::request_logger::request_logger_middleware))
        .with_state(state)
}
