//! Wallet REST API handlers
//!
//! A caller may only see and top up its own wallet; any other user id
//! answers 404.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::dto::{RechargeRequest, WalletResponse};
use crate::application::services::{LedgerAudit, RechargeStarted};
use crate::domain::{DomainError, Wallet};
use crate::interfaces::http::common::{ApiError, ApiResponse, ApiResult, CallerId};
use crate::interfaces::http::router::ApiState;

fn ensure_owner(caller: &str, user_id: &str) -> Result<(), ApiError> {
    if caller != user_id {
        return Err(DomainError::not_found("Wallet", "user_id", user_id).into());
    }
    Ok(())
}

/// `POST /api/v1/wallets/{user}` — open the wallet (idempotent)
pub async fn open_wallet(
    State(state): State<ApiState>,
    CallerId(caller): CallerId,
    Path(user_id): Path<String>,
) -> ApiResult<Wallet> {
    ensure_owner(&caller, &user_id)?;
    let wallet = state.wallets.open_wallet(&user_id).await?;
    Ok(Json(ApiResponse::success(wallet)))
}

/// `GET /api/v1/wallets/{user}`
pub async fn get_wallet(
    State(state): State<ApiState>,
    CallerId(caller): CallerId,
    Path(user_id): Path<String>,
) -> ApiResult<WalletResponse> {
    ensure_owner(&caller, &user_id)?;
    let wallet = state.wallets.wallet(&user_id).await?;
    let entries = state.wallets.entries(&user_id).await?;
    Ok(Json(ApiResponse::success(WalletResponse::new(wallet, entries))))
}

/// `GET /api/v1/wallets/{user}/audit`
pub async fn audit_wallet(
    State(state): State<ApiState>,
    CallerId(caller): CallerId,
    Path(user_id): Path<String>,
) -> ApiResult<LedgerAudit> {
    ensure_owner(&caller, &user_id)?;
    let audit = state.wallets.audit(&user_id).await?;
    Ok(Json(ApiResponse::success(audit)))
}

/// `POST /api/v1/wallets/{user}/recharge`
pub async fn recharge_wallet(
    State(state): State<ApiState>,
    CallerId(caller): CallerId,
    Path(user_id): Path<String>,
    Json(body): Json<RechargeRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RechargeStarted>>), ApiError> {
    ensure_owner(&caller, &user_id)?;
    let started = state.reconciliation.start_recharge(&user_id, body.amount).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(started))))
}
