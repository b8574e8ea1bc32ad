//! Wallet repository interface

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::model::{EntryType, LedgerPosting, Wallet, WalletTransaction};
use crate::domain::DomainResult;

#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// Create an empty wallet; returns the existing one if already open.
    async fn open(&self, user_id: &str) -> DomainResult<Wallet>;
    async fn find(&self, user_id: &str) -> DomainResult<Option<Wallet>>;
    /// Append an entry and move the balance in one atomic step.
    ///
    /// Idempotent on `related_order_id`: an existing entry is returned with
    /// `applied == false`. A debit that would make the balance negative fails
    /// `InsufficientBalance` and changes nothing. Unknown wallets fail
    /// `NotFound`.
    async fn post(
        &self,
        user_id: &str,
        entry_type: EntryType,
        amount: Decimal,
        related_order_id: &str,
    ) -> DomainResult<LedgerPosting>;
    async fn find_by_order(&self, related_order_id: &str) -> DomainResult<Option<WalletTransaction>>;
    /// Ledger entries of a user, oldest first.
    async fn entries(&self, user_id: &str) -> DomainResult<Vec<WalletTransaction>>;
}
