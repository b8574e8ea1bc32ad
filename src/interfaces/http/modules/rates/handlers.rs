//! Rate REST API handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::domain::Rate;
use crate::interfaces::http::common::{ApiResponse, ApiResult};
use crate::interfaces::http::router::ApiState;

/// `GET /api/v1/rates`
pub async fn list_rates(State(state): State<ApiState>) -> ApiResult<Vec<Rate>> {
    let rates = state.rates.list().await?;
    Ok(Json(ApiResponse::success(rates)))
}

/// `GET /api/v1/rates/{station}` — falls back to the default rate
pub async fn get_rate(
    State(state): State<ApiState>,
    Path(station_id): Path<String>,
) -> ApiResult<Rate> {
    let rate = state.rates.rate_for(&station_id).await?;
    Ok(Json(ApiResponse::success(rate)))
}
