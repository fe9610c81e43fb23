use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::domain::Actor;
use crate::AppState;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Counts the request against the caller's bucket before anything else runs.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let bucket = request
        .extensions()
        .get::<Actor>()
        .map(Actor::rate_limit_key)
        .unwrap_or_else(|| Actor::anonymous(None).rate_limit_key());

    let decision = match state.rate_limiter.check(&bucket).await {
        Ok(decision) => decision,
        Err(e) => return e.into_response(),
    };

    let mut response = next.run(request).await;
    if decision.enforced {
        let headers = response.headers_mut();
        headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
        headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    }
    response
}
