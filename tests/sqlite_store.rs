//! SeaORM store over `sqlite::memory:` with migrations applied.

mod common;

use std::sync::Arc;

use chrono::Utc;

use charge_settlement::application::SettlementOutcome;
use charge_settlement::domain::{
    ChargingSession, ChargingTargets, DomainError, EntryType, Order, OrderStatus, OrderType,
    PaymentMethod, PaymentStatus, Rate, RepositoryProvider, SessionStatus,
};
use charge_settlement::infrastructure::database::migrate;
use charge_settlement::{init_database, DatabaseConfig, SeaOrmRepositoryProvider};

use common::{d, harness_over, meter, Harness, LOCAL};

async fn provider() -> Arc<SeaOrmRepositoryProvider> {
    let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
    migrate(&db).await.unwrap();
    Arc::new(SeaOrmRepositoryProvider::new(db))
}

async fn sql_harness() -> Harness {
    harness_over(provider().await)
}

fn rate() -> Rate {
    Rate::new("ST-1", d("0.60"), d("0.40"), "CNY").unwrap()
}

fn session(user: &str, charger: &str) -> ChargingSession {
    ChargingSession::open(
        user,
        charger,
        rate(),
        PaymentMethod::Balance,
        ChargingTargets::default(),
        None,
        Utc::now(),
    )
}

#[tokio::test]
async fn session_roundtrip_and_claims() {
    let repos = provider().await;
    let s = session("u1", "CP-1");
    repos.sessions().insert_open(&s).await.unwrap();

    let stored = repos.sessions().find_by_id(&s.session_id).await.unwrap().unwrap();
    assert_eq!(stored.user_id, "u1");
    assert_eq!(stored.status, SessionStatus::Active);
    assert_eq!(stored.rate.unit_price().unwrap(), d("1.00"));
    assert_eq!(stored.version, 1);

    let err = repos.sessions().insert_open(&session("u2", "CP-1")).await.unwrap_err();
    assert_eq!(err, DomainError::ChargerBusy("CP-1".into()));
    let err = repos.sessions().insert_open(&session("u1", "CP-2")).await.unwrap_err();
    assert_eq!(err, DomainError::UserAlreadyCharging("u1".into()));
}

#[tokio::test]
async fn session_cas_rejects_stale_version() {
    let repos = provider().await;
    let s = session("u1", "CP-1");
    repos.sessions().insert_open(&s).await.unwrap();

    let mut paused = s.clone();
    paused.pause(Utc::now()).unwrap();
    assert!(repos
        .sessions()
        .compare_and_swap(SessionStatus::Active, s.version, &paused)
        .await
        .unwrap());
    // Same expectation again: the row has moved on.
    assert!(!repos
        .sessions()
        .compare_and_swap(SessionStatus::Active, s.version, &paused)
        .await
        .unwrap());

    let missing = session("u9", "CP-9");
    let err = repos
        .sessions()
        .compare_and_swap(SessionStatus::Active, 1, &missing)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));
}

#[tokio::test]
async fn order_cas_and_pending_query() {
    let repos = provider().await;
    let order = Order::new("u1", d("12.34"), OrderType::Recharge, PaymentMethod::Gateway, None, Utc::now())
        .unwrap();
    repos.orders().insert(&order).await.unwrap();

    let stored = repos.orders().find_by_id(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.amount, d("12.34"));
    assert_eq!(stored.status, OrderStatus::Pending);

    let pending = repos
        .orders()
        .find_pending_before(PaymentMethod::Gateway, Utc::now() + chrono::Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    let mut cancelled = stored.clone();
    cancelled.cancel("test", Utc::now()).unwrap();
    assert!(repos
        .orders()
        .compare_and_swap(OrderStatus::Pending, &cancelled)
        .await
        .unwrap());
    assert!(!repos
        .orders()
        .compare_and_swap(OrderStatus::Pending, &cancelled)
        .await
        .unwrap());
    let stored = repos.orders().find_by_id(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.cancel_reason.as_deref(), Some("test"));
}

#[tokio::test]
async fn rates_upsert_replaces_prices() {
    let repos = provider().await;
    repos.rates().upsert(rate()).await.unwrap();
    repos
        .rates()
        .upsert(Rate::new("ST-1", d("0.75"), d("0.3333"), "CNY").unwrap())
        .await
        .unwrap();

    let all = repos.rates().find_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].service_fee_per_kwh, d("0.3333"));
}

#[tokio::test]
async fn balance_settlement_commits_atomically() {
    let h = sql_harness().await;
    h.fund("u1", d("100")).await;

    let s = h.start("u1", "CP-1", PaymentMethod::Balance).await;
    let closed = h
        .services
        .sessions
        .stop(&s.session_id, "u1", LOCAL, meter("10"))
        .await
        .unwrap();

    assert_eq!(closed.settlement.label(), "paid");
    assert_eq!(closed.session.payment_status, PaymentStatus::Paid);
    assert_eq!(closed.session.energy_delivered_kwh, d("10.000"));
    assert_eq!(h.balance("u1").await, d("90.00"));

    let entries = h.services.wallets.entries("u1").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].entry_type, EntryType::Debit);
    assert_eq!(entries[1].balance_after, d("90.00"));
    h.assert_ledger_consistent("u1").await;

    // Replaying the commit is a no-op.
    let order_id = closed.settlement.order().unwrap().order_id.clone();
    let receipt = h.services.repos.settlement().settle_from_balance(&order_id).await.unwrap();
    assert!(receipt.already_applied);
    assert_eq!(h.balance("u1").await, d("90.00"));
}

#[tokio::test]
async fn insufficient_balance_rolls_back() {
    let h = sql_harness().await;
    h.fund("u1", d("5")).await;

    let s = h.start("u1", "CP-1", PaymentMethod::Balance).await;
    let closed = h
        .services
        .sessions
        .stop(&s.session_id, "u1", LOCAL, meter("10"))
        .await
        .unwrap();

    assert!(matches!(
        closed.settlement,
        SettlementOutcome::Failed {
            error: DomainError::InsufficientBalance { .. },
            ..
        }
    ));
    assert_eq!(closed.session.payment_status, PaymentStatus::Pending);
    assert_eq!(h.balance("u1").await, d("5.00"));
    assert_eq!(h.services.wallets.entries("u1").await.unwrap().len(), 1);
    let orders = h.services.orders.for_session(&s.session_id).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Pending);
}

#[tokio::test]
async fn gateway_callback_is_idempotent() {
    let h = sql_harness().await;
    let s = h.start("u2", "CP-2", PaymentMethod::Gateway).await;
    let closed = h
        .services
        .sessions
        .stop(&s.session_id, "u2", LOCAL, meter("38.4"))
        .await
        .unwrap();
    let order = closed.settlement.order().cloned().unwrap();
    assert_eq!(order.amount, d("38.40"));

    let payload = h.paid_callback(&order.order_id, d("38.40"));
    for _ in 0..2 {
        assert_eq!(h.services.reconciliation.handle_callback(&payload).await.as_str(), "success");
    }

    let order = h.services.orders.get(&order.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.paid_at.is_some());
    let s = h.services.sessions.get(&s.session_id).await.unwrap();
    assert_eq!(s.payment_status, PaymentStatus::Paid);
    assert_eq!(s.status, SessionStatus::Completed);
}

#[tokio::test]
async fn recharge_credit_is_recorded_once() {
    let h = sql_harness().await;
    h.services.wallets.open_wallet("u3").await.unwrap();
    // Opening twice returns the same wallet.
    h.services.wallets.open_wallet("u3").await.unwrap();

    let recharge = h
        .services
        .reconciliation
        .start_recharge("u3", d("42.50"))
        .await
        .unwrap();
    let payload = h.paid_callback(&recharge.order.order_id, d("42.50"));
    for _ in 0..3 {
        h.services.reconciliation.handle_callback(&payload).await;
    }

    assert_eq!(h.balance("u3").await, d("42.50"));
    let entries = h.services.wallets.entries("u3").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].related_order_id, recharge.order.order_id);
    h.assert_ledger_consistent("u3").await;
}

#[tokio::test]
async fn closed_session_frees_charger() {
    let h = sql_harness().await;
    let s = h.start("u4", "CP-4", PaymentMethod::Balance).await;
    h.services.sessions.stop(&s.session_id, "u4", LOCAL, None).await.unwrap();

    let next = h.start("u5", "CP-4", PaymentMethod::Balance).await;
    assert_eq!(next.charger_id, "CP-4");
    let history = h.services.sessions.list_for_user("u4").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].payment_status, PaymentStatus::NotRequired);
}

#[tokio::test]
async fn oversized_reading_is_rejected_before_persisting() {
    let h = sql_harness().await;
    let s = h.start("u6", "CP-6", PaymentMethod::Gateway).await;

    let err = h
        .services
        .sessions
        .record_meter_reading(&s.session_id, meter("79000000000000000000000000000").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let closed = h
        .services
        .sessions
        .stop(&s.session_id, "u6", LOCAL, meter("12.5"))
        .await
        .unwrap();
    assert_eq!(closed.session.status, SessionStatus::Completed);
    assert_eq!(closed.session.energy_delivered_kwh, d("12.500"));
    assert_eq!(closed.session.total_cost, d("12.50"));
}
