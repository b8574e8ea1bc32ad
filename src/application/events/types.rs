//! Settlement events
//!
//! Broadcast fire-and-forget to in-process subscribers. Publishing never
//! blocks or fails a settlement.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    SessionStarted(SessionStartedEvent),
    SessionStatusChanged(SessionStatusChangedEvent),
    SessionClosed(SessionClosedEvent),
    SettlementCompleted(SettlementCompletedEvent),
    SettlementFailed(SettlementFailedEvent),
    PaymentAwaiting(PaymentAwaitingEvent),
    WalletCredited(WalletCreditedEvent),
    OrderCancelled(OrderCancelledEvent),
    CallbackRejected(CallbackRejectedEvent),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::SessionStarted(_) => "session_started",
            Event::SessionStatusChanged(_) => "session_status_changed",
            Event::SessionClosed(_) => "session_closed",
            Event::SettlementCompleted(_) => "settlement_completed",
            Event::SettlementFailed(_) => "settlement_failed",
            Event::PaymentAwaiting(_) => "payment_awaiting",
            Event::WalletCredited(_) => "wallet_credited",
            Event::OrderCancelled(_) => "order_cancelled",
            Event::CallbackRejected(_) => "callback_rejected",
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Event::SessionStarted(e) => Some(&e.session_id),
            Event::SessionStatusChanged(e) => Some(&e.session_id),
            Event::SessionClosed(e) => Some(&e.session_id),
            Event::SettlementCompleted(e) => e.session_id.as_deref(),
            Event::SettlementFailed(e) => Some(&e.session_id),
            Event::PaymentAwaiting(e) => e.session_id.as_deref(),
            Event::WalletCredited(_) | Event::OrderCancelled(_) | Event::CallbackRejected(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartedEvent {
    pub session_id: String,
    pub user_id: String,
    pub charger_id: String,
    pub station_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatusChangedEvent {
    pub session_id: String,
    pub old_status: String,
    pub new_status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClosedEvent {
    pub session_id: String,
    pub user_id: String,
    pub status: String,
    pub energy_kwh: Decimal,
    pub energy_estimated: bool,
    pub duration_seconds: i64,
    pub total_cost: Decimal,
    pub currency: String,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementCompletedEvent {
    pub order_id: String,
    pub session_id: Option<String>,
    pub user_id: String,
    pub amount: Decimal,
    pub payment_method: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementFailedEvent {
    pub session_id: String,
    pub order_id: Option<String>,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAwaitingEvent {
    pub order_id: String,
    pub session_id: Option<String>,
    pub redirect_url: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletCreditedEvent {
    pub user_id: String,
    pub order_id: String,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order_id: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackRejectedEvent {
    pub order_id: Option<String>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Envelope carrying a unique id and the publish time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}
