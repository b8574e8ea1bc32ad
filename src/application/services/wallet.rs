//! Wallet ledger service
//!
//! Every balance change is a ledger entry posted through the repository's
//! atomic `post`; the balance is never written on its own.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::application::events::{Event, SharedEventBus, WalletCreditedEvent};
use crate::domain::{
    DomainError, DomainResult, EntryType, LedgerPosting, RepositoryProvider, Wallet,
    WalletTransaction,
};
use crate::shared::money::ensure_payable;

/// Result of checking a wallet's balance against its ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerAudit {
    pub user_id: String,
    pub balance: Decimal,
    pub ledger_sum: Decimal,
    pub entries: usize,
    pub consistent: bool,
}

pub struct WalletLedger {
    repos: Arc<dyn RepositoryProvider>,
    events: SharedEventBus,
}

impl WalletLedger {
    pub fn new(repos: Arc<dyn RepositoryProvider>, events: SharedEventBus) -> Self {
        Self { repos, events }
    }

    pub async fn open_wallet(&self, user_id: &str) -> DomainResult<Wallet> {
        if user_id.trim().is_empty() {
            return Err(DomainError::Validation("user_id is required".into()));
        }
        self.repos.wallets().open(user_id).await
    }

    pub async fn wallet(&self, user_id: &str) -> DomainResult<Wallet> {
        self.repos
            .wallets()
            .find(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Wallet", "user_id", user_id))
    }

    pub async fn balance(&self, user_id: &str) -> DomainResult<Decimal> {
        Ok(self.wallet(user_id).await?.balance)
    }

    /// Take `amount` from the wallet. Fails `InsufficientBalance` without a
    /// partial debit; a repeat for the same order returns the first entry.
    pub async fn debit(
        &self,
        user_id: &str,
        amount: Decimal,
        related_order_id: &str,
    ) -> DomainResult<LedgerPosting> {
        self.post(user_id, EntryType::Debit, amount, related_order_id).await
    }

    pub async fn credit(
        &self,
        user_id: &str,
        amount: Decimal,
        related_order_id: &str,
    ) -> DomainResult<LedgerPosting> {
        let posting = self.post(user_id, EntryType::Credit, amount, related_order_id).await?;
        if posting.applied {
            self.events.publish(Event::WalletCredited(WalletCreditedEvent {
                user_id: user_id.to_string(),
                order_id: related_order_id.to_string(),
                amount: posting.entry.amount,
                balance_after: posting.entry.balance_after,
                timestamp: Utc::now(),
            }));
        }
        Ok(posting)
    }

    pub async fn entries(&self, user_id: &str) -> DomainResult<Vec<WalletTransaction>> {
        self.wallet(user_id).await?;
        self.repos.wallets().entries(user_id).await
    }

    /// Compare the stored balance with the sum of ledger deltas.
    pub async fn audit(&self, user_id: &str) -> DomainResult<LedgerAudit> {
        let wallet = self.wallet(user_id).await?;
        let entries = self.repos.wallets().entries(user_id).await?;
        let ledger_sum: Decimal = entries.iter().map(WalletTransaction::delta).sum();
        let consistent = ledger_sum == wallet.balance;
        if !consistent {
            warn!(
                user_id,
                balance = %wallet.balance,
                ledger_sum = %ledger_sum,
                "Wallet balance does not match ledger"
            );
        }
        Ok(LedgerAudit {
            user_id: wallet.user_id,
            balance: wallet.balance,
            ledger_sum,
            entries: entries.len(),
            consistent,
        })
    }

    async fn post(
        &self,
        user_id: &str,
        entry_type: EntryType,
        amount: Decimal,
        related_order_id: &str,
    ) -> DomainResult<LedgerPosting> {
        let amount = ensure_payable(amount)?;
        let posting = self
            .repos
            .wallets()
            .post(user_id, entry_type, amount, related_order_id)
            .await?;

        if posting.applied {
            metrics::counter!("wallet_entries_total", "kind" => entry_type.as_str()).increment(1);
            info!(
                user_id,
                order_id = related_order_id,
                kind = %entry_type,
                amount = %amount,
                balance_after = %posting.entry.balance_after,
                "Ledger entry posted"
            );
        }
        Ok(posting)
    }
}
