//! Payment gateway port
//!
//! Wire fields follow the provider's flat form convention:
//! `out_trade_no` is our order id, `trade_no` the provider's reference.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::DomainResult;

pub const FIELD_MERCHANT_ORDER_ID: &str = "out_trade_no";
pub const FIELD_EXTERNAL_REFERENCE: &str = "trade_no";
pub const FIELD_TRADE_STATUS: &str = "trade_status";
pub const FIELD_AMOUNT: &str = "total_amount";
pub const FIELD_SIGN: &str = "sign";

/// Request to open a payment at the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRequest {
    pub order_id: String,
    pub amount: Decimal,
    pub subject: String,
}

/// Where to send the user to complete payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRedirect {
    pub order_id: String,
    pub redirect_url: String,
}

/// Raw callback fields as received, including `sign`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackPayload {
    pub fields: BTreeMap<String, String>,
}

impl CallbackPayload {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallbackPayload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderTradeStatus {
    Success,
    Pending,
    Closed,
}

impl ProviderTradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "TRADE_SUCCESS",
            Self::Pending => "WAIT_BUYER_PAY",
            Self::Closed => "TRADE_CLOSED",
        }
    }

    /// `TRADE_FINISHED` is reported for settled trades past their refund
    /// window and counts as success.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TRADE_SUCCESS" | "TRADE_FINISHED" => Some(Self::Success),
            "WAIT_BUYER_PAY" => Some(Self::Pending),
            "TRADE_CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// A callback whose signature has been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedCallback {
    pub merchant_order_id: String,
    pub external_reference: String,
    pub status: ProviderTradeStatus,
    pub amount: Decimal,
}

/// Provider's view of an order, used by the pending-order sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentQuery {
    Paid { external_reference: String },
    NotPaid,
    NotFound,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a payment and return the redirect target. Any failure to reach the
    /// provider is `DomainError::Gateway`.
    async fn create_payment(&self, request: &PaymentRequest) -> DomainResult<PaymentRedirect>;
    /// Check the signature and parse the callback. Fails closed with
    /// `DomainError::InvalidSignature`; missing or malformed fields are
    /// `DomainError::Validation`.
    fn verify_callback(&self, payload: &CallbackPayload) -> DomainResult<VerifiedCallback>;
    async fn query_payment(&self, order_id: &str) -> DomainResult<PaymentQuery>;
}
