use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Extension,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{Actor, EntityType};
use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath};
use crate::response::ApiResponse;
use crate::services::OpenWallet;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MovementRequest {
    pub amount: BigDecimal,
    pub asset_type: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_wallet_id: Uuid,
    pub to_wallet_id: Uuid,
    pub amount: BigDecimal,
    pub asset_type: String,
}

pub async fn open_wallet(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    ApiJson(payload): ApiJson<OpenWallet>,
) -> Result<impl IntoResponse, AppError> {
    let wallet = state.wallets.open_wallet(&actor, payload).await?;
    let location = format!("/wallets/{}", wallet.id);
    Ok(([(header::LOCATION, location)], ApiResponse::created(wallet)))
}

pub async fn get_wallet(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let wallet = state.wallets.get_wallet(id).await?;
    Ok(ApiResponse::ok(wallet))
}

pub async fn wallet_ledger(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let entries = state.wallets.ledger_entries(id).await?;
    Ok(ApiResponse::ok(entries))
}

pub async fn wallet_history(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.wallets.get_wallet(id).await?;
    let records = state
        .audit
        .history(EntityType::Wallet, id)
        .await?;
    Ok(ApiResponse::ok(records))
}

pub async fn deposit(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<MovementRequest>,
) -> Result<impl IntoResponse, AppError> {
    let movement = state
        .wallets
        .deposit(&actor, id, &payload.amount, &payload.asset_type)
        .await?;
    Ok(ApiResponse::ok(movement))
}

pub async fn withdraw(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<MovementRequest>,
) -> Result<impl IntoResponse, AppError> {
    let movement = state
        .wallets
        .withdraw(&actor, id, &payload.amount, &payload.asset_type)
        .await?;
    Ok(ApiResponse::ok(movement))
}

pub async fn transfer(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    ApiJson(payload): ApiJson<TransferRequest>,
) -> Result<impl IntoResponse, AppError> {
    let receipt = state
        .wallets
        .transfer(
            &actor,
            payload.from_wallet_id,
            payload.to_wallet_id,
            &payload.amount,
            &payload.asset_type,
        )
        .await?;
    Ok(ApiResponse::ok(receipt))
}
