//! Order domain entity

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, DomainResult};
use crate::shared::money::ensure_payable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Pays for a charging session
    Charging,
    /// Tops up the user's wallet
    Recharge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Prepaid wallet balance, settled synchronously
    #[default]
    Balance,
    /// External gateway, settled by asynchronous callback
    Gateway,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
    Refunded,
}

str_enum!(OrderType { Charging => "charging", Recharge => "recharge" });
str_enum!(PaymentMethod { Balance => "balance", Gateway => "gateway" });
str_enum!(OrderStatus {
    Pending => "pending",
    Paid => "paid",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

/// Result of applying `mark_paid` to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaidTransition {
    /// The order moved `pending → paid`.
    Applied,
    /// The order was already paid with the same reference; nothing changed.
    AlreadyApplied,
}

/// One settlement attempt. `amount` never changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub user_id: String,
    pub order_type: OrderType,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    /// Present iff `order_type == Charging`
    pub session_id: Option<String>,
    pub status: OrderStatus,
    /// Provider trade number for gateway orders
    pub external_reference: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(
        user_id: impl Into<String>,
        amount: Decimal,
        order_type: OrderType,
        payment_method: PaymentMethod,
        session_id: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(DomainError::Validation("user_id is required".into()));
        }
        let amount = ensure_payable(amount)?;
        match (order_type, &session_id) {
            (OrderType::Charging, None) => {
                return Err(DomainError::Validation(
                    "charging order requires a session_id".into(),
                ))
            }
            (OrderType::Recharge, Some(_)) => {
                return Err(DomainError::Validation(
                    "recharge order must not reference a session".into(),
                ))
            }
            _ => {}
        }

        Ok(Self {
            order_id: generate_order_id(now),
            user_id,
            order_type,
            amount,
            payment_method,
            session_id,
            status: OrderStatus::Pending,
            external_reference: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// `pending → paid`. A repeat with the same reference is a no-op success;
    /// anything else is `InvalidOrderState`.
    pub fn mark_paid(
        &mut self,
        external_reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<PaidTransition> {
        match self.status {
            OrderStatus::Pending => {
                self.status = OrderStatus::Paid;
                self.external_reference = external_reference.map(str::to_string);
                self.paid_at = Some(now);
                self.updated_at = now;
                Ok(PaidTransition::Applied)
            }
            OrderStatus::Paid if self.external_reference.as_deref() == external_reference => {
                Ok(PaidTransition::AlreadyApplied)
            }
            _ => Err(self.invalid_state("mark paid")),
        }
    }

    /// `pending → cancelled`.
    pub fn cancel(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != OrderStatus::Pending {
            return Err(self.invalid_state("cancel"));
        }
        self.status = OrderStatus::Cancelled;
        self.cancel_reason = Some(reason.into());
        self.updated_at = now;
        Ok(())
    }

    pub fn invalid_state(&self, operation: &'static str) -> DomainError {
        DomainError::InvalidOrderState {
            order_id: self.order_id.clone(),
            actual: self.status.to_string(),
            operation,
        }
    }
}

fn generate_order_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("ORD{}{}", now.format("%Y%m%d%H%M%S"), &suffix[..12])
}

// ── Tests ──────────────────────────────────────────────────────
