//! Settlement store interface

use async_trait::async_trait;

use crate::domain::order::Order;
use crate::domain::wallet::WalletTransaction;
use crate::domain::DomainResult;

/// What a settlement commit left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementReceipt {
    /// The order after the commit (always `paid`)
    pub order: Order,
    /// The ledger entry tied to the order, if the order moves money in the wallet
    pub entry: Option<WalletTransaction>,
    /// `true` when every step had already been applied by an earlier commit
    pub already_applied: bool,
}

#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Pay a pending balance order: debit the wallet, mark the order paid and,
    /// for a charging order, flag the session paid.
    ///
    /// Fails `InsufficientBalance` without any change, `AlreadySettled` when
    /// another order of the session is already paid, `InvalidOrderState` when
    /// the order is cancelled or refunded. Re-running a completed commit
    /// returns the same receipt with `already_applied == true`.
    async fn settle_from_balance(&self, order_id: &str) -> DomainResult<SettlementReceipt>;

    /// Apply a confirmed gateway payment: mark the order paid with
    /// `external_reference` and either credit the wallet (recharge) or flag
    /// the session paid (charging). Same failure and idempotency contract as
    /// [`SettlementStore::settle_from_balance`].
    async fn confirm_gateway_payment(
        &self,
        order_id: &str,
        external_reference: &str,
    ) -> DomainResult<SettlementReceipt>;
}
