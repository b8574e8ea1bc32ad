//! Domain error → HTTP status mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use super::ApiResponse;
use crate::shared::errors::{DomainError, ErrorKind};

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict | ErrorKind::InsufficientBalance => StatusCode::CONFLICT,
        ErrorKind::InvalidSignature => StatusCode::UNAUTHORIZED,
        ErrorKind::ExternalGateway => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        let status = status_for(err.kind());
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "Request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_statuses() {
        let cases = [
            (DomainError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (DomainError::not_found("Order", "order_id", "O1"), StatusCode::NOT_FOUND),
            (DomainError::ChargerBusy("CH-1".into()), StatusCode::CONFLICT),
            (
                DomainError::InsufficientBalance {
                    user_id: "u1".into(),
                    balance: rust_decimal::Decimal::ZERO,
                    required: rust_decimal::Decimal::ONE,
                },
                StatusCode::CONFLICT,
            ),
            (DomainError::InvalidSignature, StatusCode::UNAUTHORIZED),
            (DomainError::Gateway("down".into()), StatusCode::BAD_GATEWAY),
            (DomainError::Storage("io".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }
}
