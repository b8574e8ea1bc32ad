//! Wallet and ledger entry entities

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Credit,
    Debit,
}

str_enum!(EntryType { Credit => "credit", Debit => "debit" });

/// Denormalised balance. Only changes together with a new ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: String,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn open(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            balance: Decimal::ZERO,
            updated_at: now,
        }
    }
}

/// Append-only ledger entry. At most one per `related_order_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: String,
    pub user_id: String,
    pub entry_type: EntryType,
    pub amount: Decimal,
    pub related_order_id: String,
    /// Wallet balance right after this entry was applied
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn new(
        user_id: impl Into<String>,
        entry_type: EntryType,
        amount: Decimal,
        related_order_id: impl Into<String>,
        balance_after: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("WT{}", uuid::Uuid::new_v4().simple()),
            user_id: user_id.into(),
            entry_type,
            amount,
            related_order_id: related_order_id.into(),
            balance_after,
            created_at: now,
        }
    }

    /// Signed effect on the balance.
    pub fn delta(&self) -> Decimal {
        match self.entry_type {
            EntryType::Credit => self.amount,
            EntryType::Debit => -self.amount,
        }
    }
}

/// Outcome of posting an entry. `applied == false` means an entry for the
/// same order already existed and is returned unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerPosting {
    pub entry: WalletTransaction,
    pub applied: bool,
}
