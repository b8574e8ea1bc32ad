//! Session REST API handlers
//!
//! User-facing commands require `X-User-Id`; `meter` and `fault` come from
//! the hardware monitor and are not scoped to a user.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use super::dto::{
    FaultRequest, RetrySettlementQuery, SessionClosedResponse, SessionResponse,
    SettlementResponse, StartSessionRequest, StopSessionRequest,
};
use crate::domain::{ChargingSession, MeterReading};
use crate::interfaces::http::common::{ApiError, ApiResponse, ApiResult, CallerId};
use crate::interfaces::http::router::ApiState;

fn with_cost(state: &ApiState, session: ChargingSession) -> Result<SessionResponse, ApiError> {
    Ok(SessionResponse {
        cost: state.sessions.cost_of(&session)?,
        session,
    })
}

/// `POST /api/v1/sessions`
pub async fn start_session(
    State(state): State<ApiState>,
    CallerId(user_id): CallerId,
    Json(body): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SessionResponse>>), ApiError> {
    let session = state.sessions.start(body.into_command(user_id)).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(with_cost(&state, session)?)),
    ))
}

/// `GET /api/v1/sessions` — the caller's sessions, newest first
pub async fn list_sessions(
    State(state): State<ApiState>,
    CallerId(user_id): CallerId,
) -> ApiResult<Vec<ChargingSession>> {
    let sessions = state.sessions.list_for_user(&user_id).await?;
    Ok(Json(ApiResponse::success(sessions)))
}

/// `GET /api/v1/sessions/{id}`
pub async fn get_session(
    State(state): State<ApiState>,
    CallerId(user_id): CallerId,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = state.sessions.get_for_user(&session_id, &user_id).await?;
    Ok(Json(ApiResponse::success(with_cost(&state, session)?)))
}

/// `POST /api/v1/sessions/{id}/pause`
pub async fn pause_session(
    State(state): State<ApiState>,
    CallerId(user_id): CallerId,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = state.sessions.pause(&session_id, &user_id).await?;
    Ok(Json(ApiResponse::success(with_cost(&state, session)?)))
}

/// `POST /api/v1/sessions/{id}/resume`
pub async fn resume_session(
    State(state): State<ApiState>,
    CallerId(user_id): CallerId,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = state.sessions.resume(&session_id, &user_id).await?;
    Ok(Json(ApiResponse::success(with_cost(&state, session)?)))
}

/// `POST /api/v1/sessions/{id}/stop`
pub async fn stop_session(
    State(state): State<ApiState>,
    CallerId(user_id): CallerId,
    Path(session_id): Path<String>,
    Json(body): Json<StopSessionRequest>,
) -> ApiResult<SessionClosedResponse> {
    let closed = state
        .sessions
        .stop(&session_id, &user_id, body.reason, body.meter)
        .await?;
    Ok(Json(ApiResponse::success(closed.into())))
}

/// `POST /api/v1/sessions/{id}/meter`
pub async fn record_meter(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(reading): Json<MeterReading>,
) -> ApiResult<SessionResponse> {
    let session = state.sessions.record_meter_reading(&session_id, reading).await?;
    Ok(Json(ApiResponse::success(with_cost(&state, session)?)))
}

/// `POST /api/v1/sessions/{id}/fault`
pub async fn fault_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(body): Json<FaultRequest>,
) -> ApiResult<SessionClosedResponse> {
    let closed = state.sessions.fault(&session_id, &body.reason).await?;
    Ok(Json(ApiResponse::success(closed.into())))
}

/// `POST /api/v1/sessions/{id}/settlement/retry[?payment_method=gateway]`
pub async fn retry_settlement(
    State(state): State<ApiState>,
    CallerId(user_id): CallerId,
    Path(session_id): Path<String>,
    Query(query): Query<RetrySettlementQuery>,
) -> ApiResult<SettlementResponse> {
    let outcome = state
        .settlement
        .retry_settlement(&session_id, &user_id, query.payment_method)
        .await?;
    Ok(Json(ApiResponse::success(outcome.into())))
}
