use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::domain::Actor;
use crate::error::AppError;
use crate::guard::{CapturedResponse, GateOutcome};
use crate::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const REPLAYED_HEADER: &str = "idempotent-replayed";

/// Largest handler body that will be captured for replay.
const MAX_CAPTURED_BODY: usize = 1024 * 1024;

/// Response headers worth replaying.
const CAPTURED_HEADERS: [HeaderName; 2] = [header::CONTENT_TYPE, header::LOCATION];

/// Runs the downstream handler at most once per (actor, `Idempotency-Key`).
pub async fn idempotency_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let actor_id = request
        .extensions()
        .get::<Actor>()
        .map(|actor| actor.id.clone())
        .unwrap_or_else(|| Actor::anonymous(None).id);

    let key = match request.headers().get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => match value.to_str() {
            Ok(key) => Some(key.trim().to_string()),
            Err(_) => {
                return AppError::InvalidIdempotencyKey("header must be visible ASCII".to_string())
                    .into_response();
            }
        },
        None => None,
    };

    let result = state
        .idempotency
        .execute(&actor_id, key.as_deref(), || async move {
            capture(next.run(request).await).await
        })
        .await;

    match result {
        Ok(result) => {
            let replayed = result.outcome == GateOutcome::Replayed;
            let mut response = rebuild(result.response);
            if replayed {
                response
                    .headers_mut()
                    .insert(REPLAYED_HEADER, HeaderValue::from_static("true"));
            }
            response
        }
        Err(e) => e.into_response(),
    }
}

async fn capture(response: Response) -> CapturedResponse {
    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CAPTURED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "failed to buffer response for idempotency capture");
            return capture_error(AppError::Internal("response could not be captured".to_string()))
                .await;
        }
    };

    CAPTURED_HEADERS
        .iter()
        .filter_map(|name| {
            let value = parts.headers.get(name)?.to_str().ok()?;
            Some((name.as_str().to_string(), value.to_string()))
        })
        .fold(
            CapturedResponse::new(parts.status.as_u16(), bytes.to_vec()),
            |captured, (name, value)| captured.with_header(name, value),
        )
}

async fn capture_error(err: AppError) -> CapturedResponse {
    let response = err.into_response();
    let status = response.status().as_u16();
    let body = axum::body::to_bytes(response.into_body(), MAX_CAPTURED_BODY)
        .await
        .map(|bytes| bytes.to_vec())
        .unwrap_or_default();
    CapturedResponse::new(status, body).with_header("content-type", "application/json")
}

fn rebuild(captured: CapturedResponse) -> Response {
    let status = StatusCode::from_u16(captured.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, Body::from(captured.body)).into_response();

    for (name, value) in captured.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => tracing::warn!(header = %name, "dropping unreplayable cached header"),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;

    #[tokio::test]
    async fn capture_keeps_whitelisted_headers_only() {
        let mut response = (StatusCode::CREATED, Json(serde_json::json!({ "id": 1 }))).into_response();
        response
            .headers_mut()
            .insert(header::LOCATION, HeaderValue::from_static("/payments/1"));
        response
            .headers_mut()
            .insert("x-request-id", HeaderValue::from_static("abc"));

        let captured = capture(response).await;
        assert_eq!(captured.status, 201);
        assert_eq!(captured.body, br#"{"id":1}"#.to_vec());
        let names: Vec<_> = captured.headers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["content-type", "location"]);
    }

    #[tokio::test]
    async fn rebuild_restores_status_headers_and_body() {
        let captured = CapturedResponse::new(409, b"conflict".to_vec())
            .with_header("content-type", "text/plain");

        let response = rebuild(captured);
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"conflict");
    }
}
