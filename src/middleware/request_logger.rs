use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::idempotency::IDEMPOTENCY_KEY_HEADER;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Tags each request with an id and logs its outcome and latency inside a
/// per-request span, so service-level events carry the same `request_id`.
///
/// Bodies are never logged; they carry amounts and account identifiers.
pub async fn request_logger_middleware(mut req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "request",
        %request_id,
        method = %req.method(),
        path = %req.uri().path(),
        idempotent = req.headers().contains_key(IDEMPOTENCY_KEY_HEADER),
    );

    let id_value = HeaderValue::from_str(&request_id.to_string()).ok();
    if let Some(value) = &id_value {
        req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }

    async move {
        let started = Instant::now();
        let mut response = next.run(req).await;
        let status = response.status();
        let latency_ms = started.elapsed().as_millis() as u64;

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), latency_ms, "request failed");
        } else {
            tracing::info!(status = status.as_u16(), latency_ms, "request completed");
        }

        if let Some(value) = id_value {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}
