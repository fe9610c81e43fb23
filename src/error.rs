use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::PaymentStatus;
use crate::ports::RepositoryError;
use crate::processor::ProcessorError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Idempotency-Key header is required for this operation")]
    MissingIdempotencyKey,

    #[error("Invalid idempotency key: {0}")]
    InvalidIdempotencyKey(String),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot transition payment from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Insufficient balance in wallet {wallet_id}")]
    InsufficientBalance { wallet_id: Uuid },

    #[error("Duplicate idempotency key: {0}")]
    DuplicateIdempotencyKey(String),

    #[error("Payment processor is misconfigured: {0}")]
    ProcessorConfig(String),

    #[error("Payment processor rejected the request: {0}")]
    ProcessorFailed(String),

    #[error("Payment processor timed out")]
    ProcessorTimeout,

    #[error("Payment processor unreachable: {0}")]
    ProcessorNetwork(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable wire code for the failure envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::MissingIdempotencyKey => "MISSING_IDEMPOTENCY_KEY",
            AppError::InvalidIdempotencyKey(_) => "INVALID_IDEMPOTENCY_KEY",
            AppError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            AppError::DuplicateIdempotencyKey(_) => "DUPLICATE_IDEMPOTENCY_KEY",
            AppError::ProcessorConfig(_) => "EXTERNAL_PROCESSOR_CONFIG_ERROR",
            AppError::ProcessorFailed(_) => "EXTERNAL_PROCESSOR_FAILED",
            AppError::ProcessorTimeout => "EXTERNAL_PROCESSOR_TIMEOUT",
            AppError::ProcessorNetwork(_) => "EXTERNAL_PROCESSOR_NETWORK_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::MissingIdempotencyKey
            | AppError::InvalidIdempotencyKey(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidTransition { .. } | AppError::DuplicateIdempotencyKey(_) => {
                StatusCode::CONFLICT
            }
            AppError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ProcessorConfig(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::ProcessorFailed(_) | AppError::ProcessorNetwork(_) => StatusCode::BAD_GATEWAY,
            AppError::ProcessorTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Whether the caller may retry the same request later.
    ///
    /// A processor timeout is retryable because the outcome of the external
    /// side effect is unknown, not because it failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::RateLimitExceeded { .. }
                | AppError::ProcessorTimeout
                | AppError::ProcessorNetwork(_)
        )
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::Conflict(what) => AppError::DuplicateIdempotencyKey(what),
            RepositoryError::Database(msg) => AppError::Internal(msg),
        }
    }
}

impl From<ProcessorError> for AppError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::Configuration(msg) => AppError::ProcessorConfig(msg),
            ProcessorError::Rejected(msg) => AppError::ProcessorFailed(msg),
            ProcessorError::Timeout => AppError::ProcessorTimeout,
            ProcessorError::Network(msg) => AppError::ProcessorNetwork(msg),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            },
        }));

        let mut response = (status, body).into_response();
        if let AppError::RateLimitExceeded { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[test]
    fn test_field_validation_becomes_bad_request() {
        let error = AppError::from(ValidationError::new("currency", "is required"));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.code(), "VALIDATION_ERROR");
        assert!(error.to_string().contains("currency: is required"));
    }

    #[test]
    fn test_missing_wallet_is_not_found() {
        let error = AppError::from(RepositoryError::NotFound(format!("wallet {}", Uuid::nil())));
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_invalid_transition_is_conflict() {
        let error = AppError::InvalidTransition {
            from: PaymentStatus::Confirmed,
            to: PaymentStatus::Confirmed,
        };
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
        assert_eq!(error.code(), "INVALID_TRANSITION");
    }

    #[test]
    fn test_processor_timeout_is_retryable_and_distinct() {
        let error = AppError::from(ProcessorError::Timeout);
        assert_eq!(error.code(), "EXTERNAL_PROCESSOR_TIMEOUT");
        assert_eq!(error.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert!(error.is_retryable());

        let rejected = AppError::from(ProcessorError::Rejected("card declined".into()));
        assert_eq!(rejected.code(), "EXTERNAL_PROCESSOR_FAILED");
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn test_repository_conflict_maps_to_duplicate_key() {
        let error = AppError::from(RepositoryError::Conflict("K1".to_string()));
        assert_eq!(error.code(), "DUPLICATE_IDEMPOTENCY_KEY");
    }

    #[tokio::test]
    async fn test_error_envelope_shape() {
        let wallet_id = Uuid::new_v4();
        let response = AppError::InsufficientBalance { wallet_id }.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "INSUFFICIENT_BALANCE");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains(&wallet_id.to_string()));
    }

    #[tokio::test]
    async fn test_rate_limit_response_carries_retry_after() {
        let response = AppError::RateLimitExceeded {
            retry_after_secs: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
