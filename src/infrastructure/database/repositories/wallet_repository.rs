//! SeaORM implementation of WalletRepository

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tracing::debug;

use super::{db_err, is_unique_violation, parse_column};
use crate::domain::wallet::WalletRepository;
use crate::domain::{
    DomainError, DomainResult, EntryType, LedgerPosting, Wallet, WalletTransaction,
};
use crate::infrastructure::database::entities::{wallet, wallet_transaction};
use crate::shared::money::{from_minor_units, to_minor_units};

pub struct SeaOrmWalletRepository {
    db: DatabaseConnection,
}

impl SeaOrmWalletRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn wallet_to_domain(m: wallet::Model) -> Wallet {
    Wallet {
        user_id: m.user_id,
        balance: from_minor_units(m.balance),
        updated_at: m.updated_at,
    }
}

pub(super) fn entry_to_domain(m: wallet_transaction::Model) -> DomainResult<WalletTransaction> {
    Ok(WalletTransaction {
        id: m.id,
        user_id: m.user_id,
        entry_type: parse_column(&m.entry_type, "entry_type", EntryType::parse)?,
        amount: from_minor_units(m.amount),
        related_order_id: m.related_order_id,
        balance_after: from_minor_units(m.balance_after),
        created_at: m.created_at,
    })
}

pub(super) async fn entry_for_order<C: ConnectionTrait>(
    conn: &C,
    related_order_id: &str,
) -> DomainResult<Option<WalletTransaction>> {
    wallet_transaction::Entity::find()
        .filter(wallet_transaction::Column::RelatedOrderId.eq(related_order_id))
        .one(conn)
        .await
        .map_err(db_err)?
        .map(entry_to_domain)
        .transpose()
}

/// Append a ledger entry and move the balance on `conn`.
///
/// The balance moves with a conditional update (debits require
/// `balance >= amount`), so callers must run this inside a transaction
/// for the entry and the balance to commit together.
pub(super) async fn post_in<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
    entry_type: EntryType,
    amount: Decimal,
    related_order_id: &str,
) -> DomainResult<LedgerPosting> {
    if let Some(existing) = entry_for_order(conn, related_order_id).await? {
        if existing.entry_type != entry_type || existing.user_id != user_id {
            return Err(DomainError::Validation(format!(
                "order {} already has a {} entry for user {}",
                related_order_id, existing.entry_type, existing.user_id
            )));
        }
        return Ok(LedgerPosting {
            entry: existing,
            applied: false,
        });
    }

    let minor = to_minor_units(amount)?;
    let delta = match entry_type {
        EntryType::Credit => minor,
        EntryType::Debit => -minor,
    };
    let now = Utc::now();

    let mut update = wallet::Entity::update_many()
        .col_expr(wallet::Column::Balance, Expr::col(wallet::Column::Balance).add(delta))
        .col_expr(wallet::Column::UpdatedAt, Expr::value(now))
        .filter(wallet::Column::UserId.eq(user_id));
    update = match entry_type {
        EntryType::Debit => update.filter(wallet::Column::Balance.gte(minor)),
        // Keeps the integer column from overflowing.
        EntryType::Credit => update.filter(wallet::Column::Balance.lte(i64::MAX - minor)),
    };
    let result = update.exec(conn).await.map_err(db_err)?;

    let stored = wallet::Entity::find_by_id(user_id)
        .one(conn)
        .await
        .map_err(db_err)?
        .ok_or_else(|| DomainError::not_found("Wallet", "user_id", user_id))?;
    if result.rows_affected == 0 && entry_type == EntryType::Credit {
        return Err(DomainError::Validation(format!("wallet balance of {} overflows", user_id)));
    }
    if result.rows_affected == 0 {
        return Err(DomainError::InsufficientBalance {
            user_id: user_id.to_string(),
            balance: from_minor_units(stored.balance),
            required: amount,
        });
    }

    let entry = WalletTransaction::new(
        user_id,
        entry_type,
        amount,
        related_order_id,
        from_minor_units(stored.balance),
        now,
    );
    let model = wallet_transaction::ActiveModel {
        id: Set(entry.id.clone()),
        user_id: Set(entry.user_id.clone()),
        entry_type: Set(entry.entry_type.as_str().to_string()),
        amount: Set(minor),
        related_order_id: Set(entry.related_order_id.clone()),
        balance_after: Set(stored.balance),
        created_at: Set(now),
    };
    match model.insert(conn).await {
        Ok(_) => {}
        // a concurrent writer posted for the same order; the caller's
        // transaction rolls back and a retry finds that entry
        Err(e) if is_unique_violation(&e) => {
            return Err(DomainError::Storage(format!(
                "concurrent ledger entry for order {}",
                related_order_id
            )))
        }
        Err(e) => return Err(db_err(e)),
    }

    debug!(
        user_id,
        order_id = related_order_id,
        entry_type = %entry_type,
        amount = %amount,
        balance_after = %entry.balance_after,
        "Ledger entry posted"
    );
    Ok(LedgerPosting {
        entry,
        applied: true,
    })
}

// ── WalletRepository impl ───────────────────────────────────────

#[async_trait]
impl WalletRepository for SeaOrmWalletRepository {
    async fn open(&self, user_id: &str) -> DomainResult<Wallet> {
        if let Some(existing) = self.find(user_id).await? {
            return Ok(existing);
        }

        let wallet = Wallet::open(user_id, Utc::now());
        let model = wallet::ActiveModel {
            user_id: Set(wallet.user_id.clone()),
            balance: Set(0),
            updated_at: Set(wallet.updated_at),
        };
        match model.insert(&self.db).await {
            Ok(_) => Ok(wallet),
            Err(e) if is_unique_violation(&e) => self
                .find(user_id)
                .await?
                .ok_or_else(|| DomainError::not_found("Wallet", "user_id", user_id)),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn find(&self, user_id: &str) -> DomainResult<Option<Wallet>> {
        Ok(wallet::Entity::find_by_id(user_id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(wallet_to_domain))
    }

    async fn post(
        &self,
        user_id: &str,
        entry_type: EntryType,
        amount: Decimal,
        related_order_id: &str,
    ) -> DomainResult<LedgerPosting> {
        let txn = self.db.begin().await.map_err(db_err)?;
        let posting = post_in(&txn, user_id, entry_type, amount, related_order_id).await?;
        txn.commit().await.map_err(db_err)?;
        Ok(posting)
    }

    async fn find_by_order(&self, related_order_id: &str) -> DomainResult<Option<WalletTransaction>> {
        entry_for_order(&self.db, related_order_id).await
    }

    async fn entries(&self, user_id: &str) -> DomainResult<Vec<WalletTransaction>> {
        wallet_transaction::Entity::find()
            .filter(wallet_transaction::Column::UserId.eq(user_id))
            .order_by_asc(wallet_transaction::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(entry_to_domain)
            .collect()
    }
}
