//! In-memory storage implementation
//!
//! Every repository lives on one struct backed by `DashMap`s. Uniqueness
//! rules are enforced with claim maps updated through the map's entry API:
//! - `charger_claims` / `user_claims`: at most one open session per charger
//!   and per user
//! - `paid_by_session`: at most one paid order per session
//!
//! Settlement runs as a single-writer sequence per key (the session id for
//! charging orders, the order id otherwise). Each step is idempotent so a
//! sequence interrupted half way can simply be run again.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::order::OrderRepository;
use crate::domain::rate::RateRepository;
use crate::domain::session::SessionRepository;
use crate::domain::settlement::SettlementStore;
use crate::domain::wallet::WalletRepository;
use crate::domain::{
    ChargingSession, DomainError, DomainResult, EntryType, LedgerPosting, Order, OrderStatus,
    OrderType, PaymentMethod, PaymentStatus, Rate, RepositoryProvider, SessionStatus,
    SettlementReceipt, Wallet, WalletTransaction,
};

/// Exclusive hold on one settlement key. The map entry is dropped with the
/// last holder, so the lock table only grows with in-flight settlements.
struct SettlementPermit<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SettlementPermit<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters hold their own clone, so a count of one means nobody is queued.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// In-memory storage for development and testing
#[derive(Default)]
pub struct InMemoryStorage {
    sessions: DashMap<String, ChargingSession>,
    charger_claims: DashMap<String, String>,
    user_claims: DashMap<String, String>,
    orders: DashMap<String, Order>,
    paid_by_session: DashMap<String, String>,
    wallets: DashMap<String, Wallet>,
    entries_by_order: DashMap<String, WalletTransaction>,
    user_entries: DashMap<String, Vec<String>>,
    rates: DashMap<String, Rate>,
    settlement_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_settlement(&self, order: &Order) -> SettlementPermit<'_> {
        let key = match (order.order_type, &order.session_id) {
            (OrderType::Charging, Some(session_id)) => format!("session:{}", session_id),
            _ => format!("order:{}", order.order_id),
        };
        let lock = self.settlement_locks.entry(key.clone()).or_default().clone();
        SettlementPermit {
            locks: &self.settlement_locks,
            key,
            guard: Some(lock.lock_owned().await),
        }
    }

    fn load_order(&self, order_id: &str) -> DomainResult<Order> {
        self.orders
            .get(order_id)
            .map(|o| o.clone())
            .ok_or_else(|| DomainError::not_found("Order", "order_id", order_id))
    }

    fn release_claims(&self, session: &ChargingSession) {
        self.charger_claims
            .remove_if(&session.charger_id, |_, owner| owner == &session.session_id);
        self.user_claims
            .remove_if(&session.user_id, |_, owner| owner == &session.session_id);
    }

    /// Append a ledger entry under the wallet's shard lock. Dedup by order id.
    fn post_entry(
        &self,
        user_id: &str,
        entry_type: EntryType,
        amount: Decimal,
        related_order_id: &str,
    ) -> DomainResult<LedgerPosting> {
        let mut wallet = self
            .wallets
            .get_mut(user_id)
            .ok_or_else(|| DomainError::not_found("Wallet", "user_id", user_id))?;

        if let Some(existing) = self.entries_by_order.get(related_order_id) {
            if existing.entry_type != entry_type || existing.user_id != user_id {
                return Err(DomainError::Validation(format!(
                    "order {} already has a {} entry for user {}",
                    related_order_id, existing.entry_type, existing.user_id
                )));
            }
            return Ok(LedgerPosting {
                entry: existing.clone(),
                applied: false,
            });
        }

        let balance_after = match entry_type {
            EntryType::Credit => wallet.balance.checked_add(amount).ok_or_else(|| {
                DomainError::Validation(format!("wallet balance of {} overflows", user_id))
            })?,
            EntryType::Debit => {
                if wallet.balance < amount {
                    return Err(DomainError::InsufficientBalance {
                        user_id: user_id.to_string(),
                        balance: wallet.balance,
                        required: amount,
                    });
                }
                wallet.balance - amount
            }
        };

        let now = Utc::now();
        let entry = WalletTransaction::new(
            user_id,
            entry_type,
            amount,
            related_order_id,
            balance_after,
            now,
        );
        self.entries_by_order
            .insert(related_order_id.to_string(), entry.clone());
        self.user_entries
            .entry(user_id.to_string())
            .or_default()
            .push(related_order_id.to_string());
        wallet.balance = balance_after;
        wallet.updated_at = now;

        Ok(LedgerPosting {
            entry,
            applied: true,
        })
    }

    /// Claim the session's paid slot for `order_id`. Idempotent for the same order.
    fn claim_paid_slot(&self, session_id: &str, order_id: &str) -> DomainResult<()> {
        match self.paid_by_session.entry(session_id.to_string()) {
            Entry::Occupied(slot) if slot.get() != order_id => {
                Err(DomainError::AlreadySettled(session_id.to_string()))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(order_id.to_string());
                Ok(())
            }
        }
    }

    fn ensure_slot_free(&self, order: &Order) -> DomainResult<()> {
        if let Some(session_id) = &order.session_id {
            if let Some(paid) = self.paid_by_session.get(session_id) {
                if paid.value() != &order.order_id {
                    return Err(DomainError::AlreadySettled(session_id.clone()));
                }
            }
        }
        Ok(())
    }

    fn flag_session_paid(&self, session_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            if session.payment_status != PaymentStatus::Paid {
                session.payment_status = PaymentStatus::Paid;
                session.version += 1;
            }
        }
    }

    /// Steps after the order is paid. Each is a no-op when already done.
    fn finish_paid_order(&self, order: &Order) -> DomainResult<()> {
        if let Some(session_id) = &order.session_id {
            self.claim_paid_slot(session_id, &order.order_id)?;
            self.flag_session_paid(session_id);
        }
        Ok(())
    }
}

impl RepositoryProvider for InMemoryStorage {
    fn sessions(&self) -> &dyn SessionRepository {
        self
    }

    fn orders(&self) -> &dyn OrderRepository {
        self
    }

    fn wallets(&self) -> &dyn WalletRepository {
        self
    }

    fn rates(&self) -> &dyn RateRepository {
        self
    }

    fn settlement(&self) -> &dyn SettlementStore {
        self
    }
}

// ── Sessions ───────────────────────────────────────────────────

#[async_trait]
impl SessionRepository for InMemoryStorage {
    async fn insert_open(&self, session: &ChargingSession) -> DomainResult<()> {
        match self.charger_claims.entry(session.charger_id.clone()) {
            Entry::Occupied(_) => return Err(DomainError::ChargerBusy(session.charger_id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(session.session_id.clone());
            }
        }

        match self.user_claims.entry(session.user_id.clone()) {
            Entry::Occupied(_) => {
                self.charger_claims
                    .remove_if(&session.charger_id, |_, owner| owner == &session.session_id);
                return Err(DomainError::UserAlreadyCharging(session.user_id.clone()));
            }
            Entry::Vacant(slot) => {
                slot.insert(session.session_id.clone());
            }
        }

        self.sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn find_by_id(&self, session_id: &str) -> DomainResult<Option<ChargingSession>> {
        Ok(self.sessions.get(session_id).map(|s| s.clone()))
    }

    async fn compare_and_swap(
        &self,
        expected_status: SessionStatus,
        expected_version: i64,
        session: &ChargingSession,
    ) -> DomainResult<bool> {
        let Some(mut stored) = self.sessions.get_mut(&session.session_id) else {
            return Err(DomainError::not_found(
                "ChargingSession",
                "session_id",
                &session.session_id,
            ));
        };
        if stored.status != expected_status || stored.version != expected_version {
            return Ok(false);
        }
        *stored = session.clone();
        drop(stored);

        if !session.is_open() {
            self.release_claims(session);
        }
        Ok(true)
    }

    async fn set_payment_status(&self, session_id: &str, status: PaymentStatus) -> DomainResult<()> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| DomainError::not_found("ChargingSession", "session_id", session_id))?;
        if session.payment_status != status {
            session.payment_status = status;
            session.version += 1;
        }
        Ok(())
    }

    async fn find_open_for_user(&self, user_id: &str) -> DomainResult<Option<ChargingSession>> {
        let Some(session_id) = self.user_claims.get(user_id).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self
            .sessions
            .get(&session_id)
            .map(|s| s.clone())
            .filter(ChargingSession::is_open))
    }

    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<ChargingSession>> {
        let mut sessions: Vec<ChargingSession> = self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.clone())
            .collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }
}

// ── Orders ─────────────────────────────────────────────────────

#[async_trait]
impl OrderRepository for InMemoryStorage {
    async fn insert(&self, order: &Order) -> DomainResult<()> {
        self.ensure_slot_free(order)?;
        match self.orders.entry(order.order_id.clone()) {
            Entry::Occupied(_) => Err(DomainError::Validation(format!(
                "order {} already exists",
                order.order_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(())
            }
        }
    }

    async fn find_by_id(&self, order_id: &str) -> DomainResult<Option<Order>> {
        Ok(self.orders.get(order_id).map(|o| o.clone()))
    }

    async fn find_by_session(&self, session_id: &str) -> DomainResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| o.session_id.as_deref() == Some(session_id))
            .map(|o| o.clone())
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    /// Takes the settlement lock so a cancel can never interleave with a
    /// settlement sequence of the same key.
    async fn compare_and_swap(&self, expected: OrderStatus, order: &Order) -> DomainResult<bool> {
        let current = self.load_order(&order.order_id)?;
        let _permit = self.lock_settlement(&current).await;

        let mut stored = self
            .orders
            .get_mut(&order.order_id)
            .ok_or_else(|| DomainError::not_found("Order", "order_id", &order.order_id))?;
        if stored.status != expected {
            return Ok(false);
        }
        if order.status == OrderStatus::Paid {
            if let Some(session_id) = &order.session_id {
                self.claim_paid_slot(session_id, &order.order_id)?;
            }
        }
        *stored = order.clone();
        Ok(true)
    }

    async fn find_pending_before(
        &self,
        method: PaymentMethod,
        cutoff: DateTime<Utc>,
    ) -> DomainResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| {
                o.status == OrderStatus::Pending && o.payment_method == method && o.created_at < cutoff
            })
            .map(|o| o.clone())
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }
}

// ── Wallets ────────────────────────────────────────────────────

#[async_trait]
impl WalletRepository for InMemoryStorage {
    async fn open(&self, user_id: &str) -> DomainResult<Wallet> {
        Ok(self
            .wallets
            .entry(user_id.to_string())
            .or_insert_with(|| Wallet::open(user_id, Utc::now()))
            .clone())
    }

    async fn find(&self, user_id: &str) -> DomainResult<Option<Wallet>> {
        Ok(self.wallets.get(user_id).map(|w| w.clone()))
    }

    async fn post(
        &self,
        user_id: &str,
        entry_type: EntryType,
        amount: Decimal,
        related_order_id: &str,
    ) -> DomainResult<LedgerPosting> {
        self.post_entry(user_id, entry_type, amount, related_order_id)
    }

    async fn find_by_order(&self, related_order_id: &str) -> DomainResult<Option<WalletTransaction>> {
        Ok(self.entries_by_order.get(related_order_id).map(|e| e.clone()))
    }

    async fn entries(&self, user_id: &str) -> DomainResult<Vec<WalletTransaction>> {
        let ids = self
            .user_entries
            .get(user_id)
            .map(|ids| ids.clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| self.entries_by_order.get(id).map(|e| e.clone()))
            .collect())
    }
}

// ── Rates ──────────────────────────────────────────────────────

#[async_trait]
impl RateRepository for InMemoryStorage {
    async fn find_by_station(&self, station_id: &str) -> DomainResult<Option<Rate>> {
        Ok(self.rates.get(station_id).map(|r| r.clone()))
    }

    async fn upsert(&self, rate: Rate) -> DomainResult<()> {
        self.rates.insert(rate.station_id.clone(), rate);
        Ok(())
    }

    async fn find_all(&self) -> DomainResult<Vec<Rate>> {
        let mut rates: Vec<Rate> = self.rates.iter().map(|r| r.clone()).collect();
        rates.sort_by(|a, b| a.station_id.cmp(&b.station_id));
        Ok(rates)
    }
}

// ── Settlement ─────────────────────────────────────────────────

#[async_trait]
impl SettlementStore for InMemoryStorage {
    async fn settle_from_balance(&self, order_id: &str) -> DomainResult<SettlementReceipt> {
        let _permit = self.lock_settlement(&self.load_order(order_id)?).await;

        let mut order = self.load_order(order_id)?;
        if order.payment_method != PaymentMethod::Balance {
            return Err(DomainError::Validation(format!(
                "order {} is not a balance order",
                order_id
            )));
        }

        match order.status {
            OrderStatus::Paid => {
                self.finish_paid_order(&order)?;
                return Ok(SettlementReceipt {
                    entry: self.entries_by_order.get(order_id).map(|e| e.clone()),
                    order,
                    already_applied: true,
                });
            }
            OrderStatus::Pending => {}
            _ => return Err(order.invalid_state("settle")),
        }

        self.ensure_slot_free(&order)?;
        let posting = self.post_entry(&order.user_id, EntryType::Debit, order.amount, order_id)?;
        order.mark_paid(None, Utc::now())?;
        self.orders.insert(order.order_id.clone(), order.clone());
        self.finish_paid_order(&order)?;

        Ok(SettlementReceipt {
            order,
            entry: Some(posting.entry),
            already_applied: false,
        })
    }

    async fn confirm_gateway_payment(
        &self,
        order_id: &str,
        external_reference: &str,
    ) -> DomainResult<SettlementReceipt> {
        let _permit = self.lock_settlement(&self.load_order(order_id)?).await;

        let mut order = self.load_order(order_id)?;
        if order.payment_method != PaymentMethod::Gateway {
            return Err(DomainError::Validation(format!(
                "order {} is not a gateway order",
                order_id
            )));
        }

        match order.status {
            OrderStatus::Paid if order.external_reference.as_deref() == Some(external_reference) => {
                self.finish_paid_order(&order)?;
                return Ok(SettlementReceipt {
                    entry: self.entries_by_order.get(order_id).map(|e| e.clone()),
                    order,
                    already_applied: true,
                });
            }
            OrderStatus::Pending => {}
            _ => return Err(order.invalid_state("confirm payment")),
        }

        self.ensure_slot_free(&order)?;
        let entry = match order.order_type {
            OrderType::Recharge => Some(
                self.post_entry(&order.user_id, EntryType::Credit, order.amount, order_id)?
                    .entry,
            ),
            OrderType::Charging => None,
        };
        order.mark_paid(Some(external_reference), Utc::now())?;
        self.orders.insert(order.order_id.clone(), order.clone());
        self.finish_paid_order(&order)?;

        Ok(SettlementReceipt {
            order,
            entry,
            already_applied: false,
        })
    }
}
