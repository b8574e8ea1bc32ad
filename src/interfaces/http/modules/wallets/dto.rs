//! Wallet request / response DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Wallet, WalletTransaction};

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub user_id: String,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
    /// Ledger entries, oldest first
    pub entries: Vec<WalletTransaction>,
}

impl WalletResponse {
    pub fn new(wallet: Wallet, entries: Vec<WalletTransaction>) -> Self {
        Self {
            user_id: wallet.user_id,
            balance: wallet.balance,
            updated_at: wallet.updated_at,
            entries,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RechargeRequest {
    pub amount: Decimal,
}
