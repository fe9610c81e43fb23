mod common;

use axum::http::StatusCode;
use std::sync::Arc;
use std::time::Duration;

use common::{body_json, get, test_config, FailingStore, TestApp};
use treasury_core::error::AppError;
use treasury_core::guard::{FailurePolicy, RateLimitConfig, RateLimiter};
use treasury_core::kv::MemoryStore;

fn limiter(max_requests: u64) -> RateLimiter {
    RateLimiter::new(
        Arc::new(MemoryStore::new()),
        RateLimitConfig {
            max_requests,
            window: Duration::from_secs(60),
        },
    )
}

#[tokio::test]
async fn third_call_in_window_is_rejected() {
    let limiter = limiter(2);

    let first = limiter.check("actor:user-1").await.unwrap();
    let second = limiter.check("actor:user-1").await.unwrap();
    assert_eq!((first.count, first.remaining), (1, 1));
    assert_eq!((second.count, second.remaining), (2, 0));

    match limiter.check("actor:user-1").await {
        Err(AppError::RateLimitExceeded { retry_after_secs }) => assert!(retry_after_secs > 0),
        other => panic!("expected rate limit rejection, got {:?}", other),
    }

    let other_key = limiter.check("actor:user-2").await.unwrap();
    assert_eq!(other_key.count, 1);
}

#[tokio::test(start_paused = true)]
async fn counter_resets_after_window() {
    let limiter = limiter(1);

    limiter.check("ip:203.0.113.1").await.unwrap();
    assert!(limiter.check("ip:203.0.113.1").await.is_err());

    tokio::time::advance(Duration::from_secs(61)).await;

    let fresh = limiter.check("ip:203.0.113.1").await.unwrap();
    assert_eq!(fresh.count, 1);
}

#[tokio::test(start_paused = true)]
async fn retry_after_tracks_remaining_window() {
    let limiter = limiter(1);
    limiter.check("actor:user-1").await.unwrap();

    tokio::time::advance(Duration::from_secs(45)).await;

    match limiter.check("actor:user-1").await {
        Err(AppError::RateLimitExceeded { retry_after_secs }) => assert_eq!(retry_after_secs, 15),
        other => panic!("expected rate limit rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn store_outage_lets_requests_through_by_default() {
    let limiter = RateLimiter::new(Arc::new(FailingStore), RateLimitConfig::default());

    let decision = limiter.check("actor:user-1").await.unwrap();
    assert!(!decision.enforced);
}

#[tokio::test]
async fn store_outage_rejects_when_fail_closed() {
    let limiter = RateLimiter::new(Arc::new(FailingStore), RateLimitConfig::default())
        .with_policy(FailurePolicy::FailClosed);

    assert!(matches!(
        limiter.check("actor:user-1").await,
        Err(AppError::Internal(_))
    ));
}

#[tokio::test]
async fn http_limit_is_per_actor_with_headers() {
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        max_requests: 2,
        window: Duration::from_secs(60),
    };
    let app = TestApp::new(config);

    let first = app.send(get("/wallets/00000000-0000-0000-0000-000000000000", "user-1")).await;
    assert_eq!(first.status(), StatusCode::NOT_FOUND);
    assert_eq!(first.headers()["x-ratelimit-limit"], "2");
    assert_eq!(first.headers()["x-ratelimit-remaining"], "1");

    app.send(get("/wallets/00000000-0000-0000-0000-000000000000", "user-1")).await;
    let third = app.send(get("/wallets/00000000-0000-0000-0000-000000000000", "user-1")).await;
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = third.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0);
    assert_eq!(body_json(third).await["error"]["code"], "RATE_LIMIT_EXCEEDED");

    let other = app.send(get("/wallets/00000000-0000-0000-0000-000000000000", "user-2")).await;
    assert_eq!(other.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_is_not_rate_limited() {
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        max_requests: 1,
        window: Duration::from_secs(60),
    };
    let app = TestApp::new(config);

    for _ in 0..3 {
        let response = app.send(get("/health", "user-1")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
