//! Provider callback handler
//!
//! The provider posts a form-encoded body and expects the literal text
//! `success` once the payment is recorded; anything else makes it retry.

use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::Form;
use tracing::warn;

use crate::application::CallbackAck;
use crate::domain::ports::CallbackPayload;
use crate::interfaces::http::router::ApiState;

/// `POST /api/v1/payments/callback`
pub async fn payment_callback(
    State(state): State<ApiState>,
    payload: Result<Form<CallbackPayload>, FormRejection>,
) -> &'static str {
    let ack = match payload {
        Ok(Form(payload)) => state.reconciliation.handle_callback(&payload).await,
        Err(rejection) => {
            warn!(error = %rejection, "Unreadable payment callback body");
            metrics::counter!("gateway_callbacks_total", "outcome" => "malformed", "ack" => "fail")
                .increment(1);
            CallbackAck::Failure
        }
    };
    ack.as_str()
}
