use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    Extension,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{Actor, EntityType};
use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::idempotency::IDEMPOTENCY_KEY_HEADER;
use crate::response::ApiResponse;
use crate::services::CreatePayment;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: BigDecimal,
    pub currency: String,
    pub external_reference: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmPaymentRequest {
    /// When present the confirmation is completed through the processor.
    pub transaction_reference: Option<String>,
}

pub async fn create_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<CreatePaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .ok_or(AppError::MissingIdempotencyKey)?;

    let payment = state
        .payments
        .create_payment(
            &actor,
            CreatePayment {
                amount: payload.amount,
                currency: payload.currency,
                idempotency_key,
                external_reference: payload.external_reference,
            },
        )
        .await?;

    let location = format!("/payments/{}", payment.id);
    Ok(([(header::LOCATION, location)], ApiResponse::created(payment)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let payment = state.payments.get_payment(id).await?;
    Ok(ApiResponse::ok(payment))
}

pub async fn payment_history(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.payments.get_payment(id).await?;
    let records = state
        .audit
        .history(EntityType::Payment, id)
        .await?;
    Ok(ApiResponse::ok(records))
}

pub async fn approve_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let payment = state.payments.approve(&actor, id).await?;
    Ok(ApiResponse::ok(payment))
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let request: ConfirmPaymentRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ConfirmPaymentRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("invalid confirm body: {}", e)))?
    };

    let payment = match request.transaction_reference.as_deref().map(str::trim) {
        Some(tx_reference) if !tx_reference.is_empty() => {
            state
                .payments
                .confirm_with_processor(&actor, id, tx_reference)
                .await?
        }
        _ => state.payments.confirm(&actor, id).await?,
    };
    Ok(ApiResponse::ok(payment))
}

pub async fn cancel_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let payment = state.payments.cancel(&actor, id).await?;
    Ok(ApiResponse::ok(payment))
}

pub async fn fail_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let payment = state.payments.fail(&actor, id).await?;
    Ok(ApiResponse::ok(payment))
}
