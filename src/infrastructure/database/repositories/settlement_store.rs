//! SeaORM implementation of SettlementStore
//!
//! Each commit is one database transaction: read the order, post the ledger
//! entry, move the order `pending → paid` with a conditional update and flag
//! the session. Any failure rolls all of it back.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tracing::debug;

use super::order_repository::{find_order, other_paid_order, swap_order};
use super::session_repository::mark_session_paid;
use super::wallet_repository::{entry_for_order, post_in};
use super::db_err;
use crate::domain::settlement::SettlementStore;
use crate::domain::{
    DomainError, DomainResult, EntryType, Order, OrderStatus, OrderType, PaymentMethod,
    SettlementReceipt,
};

pub struct SeaOrmSettlementStore {
    db: DatabaseConnection,
}

impl SeaOrmSettlementStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

async fn load_for(
    txn: &DatabaseTransaction,
    order_id: &str,
    method: PaymentMethod,
) -> DomainResult<Order> {
    let order = find_order(txn, order_id).await?;
    if order.payment_method != method {
        return Err(DomainError::Validation(format!(
            "order {} is not a {} order",
            order_id, method
        )));
    }
    Ok(order)
}

async fn ensure_slot_free(txn: &DatabaseTransaction, order: &Order) -> DomainResult<()> {
    if let Some(session_id) = &order.session_id {
        if other_paid_order(txn, session_id, &order.order_id).await?.is_some() {
            return Err(DomainError::AlreadySettled(session_id.clone()));
        }
    }
    Ok(())
}

/// Re-apply the post-payment steps of an order that is already paid.
async fn replay(txn: DatabaseTransaction, order: Order) -> DomainResult<SettlementReceipt> {
    if let Some(session_id) = &order.session_id {
        mark_session_paid(&txn, session_id).await?;
    }
    let entry = entry_for_order(&txn, &order.order_id).await?;
    txn.commit().await.map_err(db_err)?;
    Ok(SettlementReceipt {
        order,
        entry,
        already_applied: true,
    })
}

/// Persist `paid` over the pending row and flag its session.
async fn commit_paid(txn: &DatabaseTransaction, paid: &Order) -> DomainResult<()> {
    if !swap_order(txn, OrderStatus::Pending, paid).await? {
        // moved on after we read it; the retry re-reads
        return Err(DomainError::Storage(format!(
            "order {} changed during settlement",
            paid.order_id
        )));
    }
    if let Some(session_id) = &paid.session_id {
        mark_session_paid(txn, session_id).await?;
    }
    Ok(())
}

#[async_trait]
impl SettlementStore for SeaOrmSettlementStore {
    async fn settle_from_balance(&self, order_id: &str) -> DomainResult<SettlementReceipt> {
        let txn = self.db.begin().await.map_err(db_err)?;
        let order = load_for(&txn, order_id, PaymentMethod::Balance).await?;

        match order.status {
            OrderStatus::Paid => return replay(txn, order).await,
            OrderStatus::Pending => {}
            _ => return Err(order.invalid_state("settle")),
        }

        ensure_slot_free(&txn, &order).await?;
        let posting = post_in(&txn, &order.user_id, EntryType::Debit, order.amount, order_id).await?;
        let mut paid = order;
        paid.mark_paid(None, Utc::now())?;
        commit_paid(&txn, &paid).await?;
        txn.commit().await.map_err(db_err)?;

        debug!(order_id, amount = %paid.amount, "Balance settlement committed");
        Ok(SettlementReceipt {
            order: paid,
            entry: Some(posting.entry),
            already_applied: false,
        })
    }

    async fn confirm_gateway_payment(
        &self,
        order_id: &str,
        external_reference: &str,
    ) -> DomainResult<SettlementReceipt> {
        let txn = self.db.begin().await.map_err(db_err)?;
        let order = load_for(&txn, order_id, PaymentMethod::Gateway).await?;

        match order.status {
            OrderStatus::Paid if order.external_reference.as_deref() == Some(external_reference) => {
                return replay(txn, order).await
            }
            OrderStatus::Pending => {}
            _ => return Err(order.invalid_state("confirm payment")),
        }

        ensure_slot_free(&txn, &order).await?;
        let entry = match order.order_type {
            OrderType::Recharge => Some(
                post_in(&txn, &order.user_id, EntryType::Credit, order.amount, order_id)
                    .await?
                    .entry,
            ),
            OrderType::Charging => None,
        };
        let mut paid = order;
        paid.mark_paid(Some(external_reference), Utc::now())?;
        commit_paid(&txn, &paid).await?;
        txn.commit().await.map_err(db_err)?;

        debug!(order_id, external_reference, "Gateway payment committed");
        Ok(SettlementReceipt {
            order: paid,
            entry,
            already_applied: false,
        })
    }
}
