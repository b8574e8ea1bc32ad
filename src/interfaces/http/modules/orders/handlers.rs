//! Order REST API handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::domain::{DomainError, Order};
use crate::interfaces::http::common::{ApiResponse, ApiResult, CallerId};
use crate::interfaces::http::router::ApiState;

/// `GET /api/v1/orders/{id}` — orders of other users answer 404
pub async fn get_order(
    State(state): State<ApiState>,
    CallerId(user_id): CallerId,
    Path(order_id): Path<String>,
) -> ApiResult<Order> {
    let order = state.orders.get(&order_id).await?;
    if order.user_id != user_id {
        return Err(DomainError::not_found("Order", "order_id", order_id).into());
    }
    Ok(Json(ApiResponse::success(order)))
}

/// `GET /api/v1/sessions/{id}/orders` — every settlement attempt of a session
pub async fn list_session_orders(
    State(state): State<ApiState>,
    CallerId(user_id): CallerId,
    Path(session_id): Path<String>,
) -> ApiResult<Vec<Order>> {
    // ownership check through the session itself
    state.sessions.get_for_user(&session_id, &user_id).await?;
    let orders = state.orders.for_session(&session_id).await?;
    Ok(Json(ApiResponse::success(orders)))
}
