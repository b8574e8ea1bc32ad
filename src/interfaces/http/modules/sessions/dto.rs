//! Session request / response DTOs

use serde::{Deserialize, Serialize};

use crate::application::services::{CostBreakdown, SessionClosed, StartSession};
use crate::application::SettlementOutcome;
use crate::domain::{
    ChargingSession, ChargingTargets, MeterReading, Order, PaymentMethod, StopReason,
    WalletTransaction,
};

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub charger_id: String,
    pub station_id: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub targets: ChargingTargets,
    #[serde(default)]
    pub start_energy_level: Option<u8>,
}

impl StartSessionRequest {
    pub fn into_command(self, user_id: String) -> StartSession {
        StartSession {
            user_id,
            charger_id: self.charger_id,
            station_id: self.station_id,
            payment_method: self.payment_method,
            targets: self.targets,
            start_energy_level: self.start_energy_level,
        }
    }
}

fn default_stop_reason() -> StopReason {
    StopReason::Local
}

#[derive(Debug, Deserialize)]
pub struct StopSessionRequest {
    #[serde(default = "default_stop_reason")]
    pub reason: StopReason,
    /// Final cumulative reading, when the charger reported one
    #[serde(default)]
    pub meter: Option<MeterReading>,
}

#[derive(Debug, Deserialize)]
pub struct FaultRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetrySettlementQuery {
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: ChargingSession,
    /// Live estimate while open, final once closed
    pub cost: CostBreakdown,
}

#[derive(Debug, Serialize)]
pub struct SettlementResponse {
    pub outcome: &'static str,
    pub order: Option<Order>,
    pub ledger_entry: Option<WalletTransaction>,
    pub redirect_url: Option<String>,
    pub error: Option<String>,
}

impl From<SettlementOutcome> for SettlementResponse {
    fn from(outcome: SettlementOutcome) -> Self {
        let label = outcome.label();
        let mut response = Self {
            outcome: label,
            order: None,
            ledger_entry: None,
            redirect_url: None,
            error: None,
        };
        match outcome {
            SettlementOutcome::Paid { order, entry } => {
                response.order = Some(order);
                response.ledger_entry = entry;
            }
            SettlementOutcome::AwaitingGateway { order, redirect } => {
                response.order = Some(order);
                response.redirect_url = Some(redirect.redirect_url);
            }
            SettlementOutcome::NotRequired => {}
            SettlementOutcome::Failed { order, error } => {
                response.order = order;
                response.error = Some(error.to_string());
            }
        }
        response
    }
}

#[derive(Debug, Serialize)]
pub struct SessionClosedResponse {
    pub session: ChargingSession,
    pub cost: CostBreakdown,
    pub settlement: SettlementResponse,
}

impl From<SessionClosed> for SessionClosedResponse {
    fn from(closed: SessionClosed) -> Self {
        Self {
            session: closed.session,
            cost: closed.cost,
            settlement: closed.settlement.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;

    #[test]
    fn stop_request_defaults_to_local() {
        let req: StopSessionRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.reason, StopReason::Local);
        assert!(req.meter.is_none());

        let req: StopSessionRequest =
            serde_json::from_str(r#"{"reason":"EVDisconnected","meter":{"energy_kwh":"12.5"}}"#).unwrap();
        assert_eq!(req.reason, StopReason::EvDisconnected);
        assert_eq!(req.meter.unwrap().energy_kwh, "12.5".parse().unwrap());
    }

    #[test]
    fn failed_settlement_carries_error_text() {
        let response = SettlementResponse::from(SettlementOutcome::Failed {
            order: None,
            error: DomainError::Gateway("timeout".into()),
        });
        assert_eq!(response.outcome, "failed");
        assert!(response.error.unwrap().contains("timeout"));
    }
}
