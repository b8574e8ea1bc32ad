//! End-to-end settlement flows over the in-memory store and sandbox gateway.

mod common;

use chrono::Duration;

use charge_settlement::application::SettlementOutcome;
use charge_settlement::domain::ports::gateway::FIELD_AMOUNT;
use charge_settlement::domain::ports::{PaymentQuery, ProviderTradeStatus};
use charge_settlement::domain::{
    DomainError, EntryType, MeterReading, OrderStatus, OrderType, PaymentMethod, PaymentStatus,
    Rate, SessionStatus,
};
use charge_settlement::shared::money::MAX_ENERGY_KWH;
use charge_settlement::Event;

use common::{d, harness, meter, LOCAL};

#[tokio::test]
async fn balance_settlement_debits_wallet_once() {
    let h = harness();
    h.fund("u1", d("100")).await;

    let session = h.start("u1", "CP-1", PaymentMethod::Balance).await;
    let closed = h
        .services
        .sessions
        .stop(&session.session_id, "u1", LOCAL, meter("10"))
        .await
        .unwrap();

    assert_eq!(closed.session.status, SessionStatus::Completed);
    assert_eq!(closed.session.total_cost, d("10.00"));
    assert_eq!(closed.session.payment_status, PaymentStatus::Paid);
    assert_eq!(closed.cost.total, d("10.00"));
    assert!(!closed.cost.energy_estimated);

    let SettlementOutcome::Paid { order, entry } = closed.settlement else {
        panic!("expected paid outcome");
    };
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.amount, d("10.00"));
    let entry = entry.expect("balance settlement writes a ledger entry");
    assert_eq!(entry.entry_type, EntryType::Debit);
    assert_eq!(entry.amount, d("10.00"));
    assert_eq!(entry.balance_after, d("90.00"));

    assert_eq!(h.balance("u1").await, d("90.00"));
    let debits: Vec<_> = h
        .services
        .wallets
        .entries("u1")
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.entry_type == EntryType::Debit)
        .collect();
    assert_eq!(debits.len(), 1);
    h.assert_ledger_consistent("u1").await;
}

#[tokio::test]
async fn insufficient_balance_leaves_payment_pending() {
    let h = harness();
    h.fund("u1", d("5")).await;

    let session = h.start("u1", "CP-1", PaymentMethod::Balance).await;
    let closed = h
        .services
        .sessions
        .stop(&session.session_id, "u1", LOCAL, meter("10"))
        .await
        .unwrap();

    match &closed.settlement {
        SettlementOutcome::Failed { order, error } => {
            assert!(matches!(error, DomainError::InsufficientBalance { .. }));
            assert_eq!(order.as_ref().map(|o| o.status), Some(OrderStatus::Pending));
        }
        other => panic!("expected failure, got {}", other.label()),
    }
    assert_eq!(closed.session.status, SessionStatus::Completed);
    assert_eq!(closed.session.payment_status, PaymentStatus::Pending);
    assert_eq!(h.balance("u1").await, d("5.00"));
    h.assert_ledger_consistent("u1").await;
}

#[tokio::test]
async fn retry_after_top_up_reuses_pending_order() {
    let h = harness();
    h.fund("u1", d("5")).await;

    let session = h.start("u1", "CP-1", PaymentMethod::Balance).await;
    let closed = h
        .services
        .sessions
        .stop(&session.session_id, "u1", LOCAL, meter("10"))
        .await
        .unwrap();
    let first_order = closed.settlement.order().cloned().unwrap();

    h.fund("u1", d("10")).await;
    let outcome = h
        .services
        .settlement
        .retry_settlement(&session.session_id, "u1", None)
        .await
        .unwrap();

    let SettlementOutcome::Paid { order, .. } = outcome else {
        panic!("expected paid outcome");
    };
    assert_eq!(order.order_id, first_order.order_id);
    assert_eq!(h.balance("u1").await, d("5.00"));

    let session = h.services.sessions.get(&session.session_id).await.unwrap();
    assert_eq!(session.payment_status, PaymentStatus::Paid);

    let err = h
        .services
        .settlement
        .retry_settlement(&session.session_id, "u1", None)
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::AlreadySettled(session.session_id.clone()));
    h.assert_ledger_consistent("u1").await;
}

#[tokio::test]
async fn duplicate_gateway_callback_applies_once() {
    let h = harness();
    let session = h.start("u2", "CP-2", PaymentMethod::Gateway).await;
    let closed = h
        .services
        .sessions
        .stop(&session.session_id, "u2", LOCAL, meter("38.4"))
        .await
        .unwrap();

    let SettlementOutcome::AwaitingGateway { order, redirect } = closed.settlement else {
        panic!("expected gateway redirect");
    };
    assert_eq!(order.amount, d("38.40"));
    assert_eq!(redirect.order_id, order.order_id);
    assert_eq!(closed.session.payment_status, PaymentStatus::Pending);

    let mut events = h.services.events.subscribe();
    let payload = h.paid_callback(&order.order_id, d("38.40"));
    for _ in 0..2 {
        let ack = h.services.reconciliation.handle_callback(&payload).await;
        assert_eq!(ack.as_str(), "success");
    }

    let order = h.services.orders.get(&order.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.external_reference.as_deref(), Some(format!("T-{}", order.order_id).as_str()));
    let session = h.services.sessions.get(&session.session_id).await.unwrap();
    assert_eq!(session.payment_status, PaymentStatus::Paid);

    let mut completed = 0;
    while let Some(msg) = events.try_recv() {
        if matches!(msg.event, Event::SettlementCompleted(_)) {
            completed += 1;
        }
    }
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn tampered_or_mismatched_callbacks_are_rejected() {
    let h = harness();
    let session = h.start("u3", "CP-3", PaymentMethod::Gateway).await;
    let closed = h
        .services
        .sessions
        .stop(&session.session_id, "u3", LOCAL, meter("2"))
        .await
        .unwrap();
    let order = closed.settlement.order().cloned().unwrap();

    let mut tampered = h.paid_callback(&order.order_id, d("2.00"));
    tampered.fields.insert(FIELD_AMOUNT.into(), "0.01".into());
    assert_eq!(h.services.reconciliation.handle_callback(&tampered).await.as_str(), "fail");

    let wrong_amount = h.paid_callback(&order.order_id, d("1.99"));
    assert_eq!(
        h.services.reconciliation.handle_callback(&wrong_amount).await.as_str(),
        "fail"
    );

    let closed_trade = h.gateway.signed_callback(
        &order.order_id,
        "T-closed",
        ProviderTradeStatus::Closed,
        d("2.00"),
    );
    assert_eq!(
        h.services.reconciliation.handle_callback(&closed_trade).await.as_str(),
        "success"
    );

    let order = h.services.orders.get(&order.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn unreachable_gateway_cancels_order_and_retry_opens_new_one() {
    let h = harness();
    let session = h.start("u4", "CP-4", PaymentMethod::Gateway).await;

    h.gateway.set_fail_create(true);
    let closed = h
        .services
        .sessions
        .stop(&session.session_id, "u4", LOCAL, meter("5"))
        .await
        .unwrap();
    let cancelled = match closed.settlement {
        SettlementOutcome::Failed {
            order: Some(order),
            error: DomainError::Gateway(_),
        } => order,
        other => panic!("expected gateway failure, got {}", other.label()),
    };
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // A late success for the cancelled order is refused.
    let late = h.paid_callback(&cancelled.order_id, d("5.00"));
    assert_eq!(h.services.reconciliation.handle_callback(&late).await.as_str(), "fail");

    h.gateway.set_fail_create(false);
    let outcome = h
        .services
        .settlement
        .retry_settlement(&session.session_id, "u4", None)
        .await
        .unwrap();
    let SettlementOutcome::AwaitingGateway { order, .. } = outcome else {
        panic!("expected gateway redirect");
    };
    assert_ne!(order.order_id, cancelled.order_id);
    assert_eq!(order.amount, d("5.00"));
}

#[tokio::test]
async fn retry_with_balance_supersedes_gateway_order() {
    let h = harness();
    h.fund("u5", d("50")).await;
    let session = h.start("u5", "CP-5", PaymentMethod::Gateway).await;
    let closed = h
        .services
        .sessions
        .stop(&session.session_id, "u5", LOCAL, meter("12.5"))
        .await
        .unwrap();
    let gateway_order = closed.settlement.order().cloned().unwrap();

    let outcome = h
        .services
        .settlement
        .retry_settlement(&session.session_id, "u5", Some(PaymentMethod::Balance))
        .await
        .unwrap();
    assert_eq!(outcome.label(), "paid");
    assert_eq!(h.balance("u5").await, d("37.50"));

    let superseded = h.services.orders.get(&gateway_order.order_id).await.unwrap();
    assert_eq!(superseded.status, OrderStatus::Cancelled);

    let late = h.paid_callback(&gateway_order.order_id, d("12.50"));
    assert_eq!(h.services.reconciliation.handle_callback(&late).await.as_str(), "fail");

    let orders = h.services.orders.for_session(&session.session_id).await.unwrap();
    assert_eq!(orders.iter().filter(|o| o.status == OrderStatus::Paid).count(), 1);
    h.assert_ledger_consistent("u5").await;
}

#[tokio::test]
async fn fault_bills_energy_delivered_so_far() {
    let h = harness();
    h.fund("u6", d("20")).await;
    let session = h.start("u6", "CP-6", PaymentMethod::Balance).await;

    h.services
        .sessions
        .record_meter_reading(&session.session_id, meter("3.5").unwrap())
        .await
        .unwrap();
    let closed = h
        .services
        .sessions
        .fault(&session.session_id, "charger offline")
        .await
        .unwrap();

    assert_eq!(closed.session.status, SessionStatus::Faulted);
    assert_eq!(closed.session.energy_delivered_kwh, d("3.500"));
    assert_eq!(closed.session.total_cost, d("3.50"));
    assert_eq!(closed.settlement.label(), "paid");
    assert_eq!(h.balance("u6").await, d("16.50"));

    // The charger is free again.
    h.start("u7", "CP-6", PaymentMethod::Gateway).await;
}

#[tokio::test]
async fn oversized_meter_reading_is_rejected_and_session_still_closes() {
    let h = harness();
    h.services
        .rates
        .upsert(Rate::new("ST-1", d("1.50"), d("0.50"), "CNY").unwrap())
        .await
        .unwrap();
    let session = h.start("u20", "CP-20", PaymentMethod::Gateway).await;

    let huge = meter("79000000000000000000000000000").unwrap();
    let err = h
        .services
        .sessions
        .record_meter_reading(&session.session_id, huge.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    // The same value on the stop request is refused without closing.
    let err = h
        .services
        .sessions
        .stop(&session.session_id, "u20", LOCAL, Some(huge))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
    let open = h.services.sessions.get(&session.session_id).await.unwrap();
    assert_eq!(open.status, SessionStatus::Active);

    // The largest accepted reading still prices and settles.
    h.services
        .sessions
        .record_meter_reading(&session.session_id, MeterReading::energy(MAX_ENERGY_KWH))
        .await
        .unwrap();
    let closed = h
        .services
        .sessions
        .stop(&session.session_id, "u20", LOCAL, None)
        .await
        .unwrap();
    assert_eq!(closed.session.status, SessionStatus::Completed);
    assert_eq!(closed.session.total_cost, d("2000000000.00"));
    assert_eq!(closed.settlement.label(), "awaiting_gateway");

    h.start("u21", "CP-20", PaymentMethod::Balance).await;
}

#[tokio::test]
async fn stop_without_meter_uses_estimate_and_skips_payment() {
    let h = harness();
    let session = h.start("u8", "CP-8", PaymentMethod::Balance).await;
    let closed = h
        .services
        .sessions
        .stop(&session.session_id, "u8", LOCAL, None)
        .await
        .unwrap();

    assert!(closed.session.energy_estimated);
    assert!(closed.cost.energy_estimated);
    assert_eq!(closed.session.total_cost, d("0.00"));
    assert_eq!(closed.settlement.label(), "not_required");
    assert_eq!(closed.session.payment_status, PaymentStatus::NotRequired);
    assert!(h
        .services
        .orders
        .for_session(&session.session_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn pause_and_resume_keep_the_charger_claimed() {
    let h = harness();
    let session = h.start("u9", "CP-9", PaymentMethod::Balance).await;

    let paused = h.services.sessions.pause(&session.session_id, "u9").await.unwrap();
    assert_eq!(paused.status, SessionStatus::Suspended);
    assert!(h.services.sessions.pause(&session.session_id, "u9").await.is_err());

    let err = h
        .services
        .sessions
        .start(common::start_cmd("u10", "CP-9", PaymentMethod::Balance))
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::ChargerBusy("CP-9".into()));

    let resumed = h.services.sessions.resume(&session.session_id, "u9").await.unwrap();
    assert_eq!(resumed.status, SessionStatus::Active);
    assert!(resumed.version > paused.version);
}

#[tokio::test]
async fn one_open_session_per_user() {
    let h = harness();
    h.start("u11", "CP-11", PaymentMethod::Balance).await;
    let err = h
        .services
        .sessions
        .start(common::start_cmd("u11", "CP-12", PaymentMethod::Balance))
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::UserAlreadyCharging("u11".into()));
    assert!(h.services.sessions.active_for_user("u11").await.unwrap().is_some());
}

#[tokio::test]
async fn other_users_cannot_touch_a_session() {
    let h = harness();
    let session = h.start("u12", "CP-13", PaymentMethod::Balance).await;

    let err = h
        .services
        .sessions
        .stop(&session.session_id, "intruder", LOCAL, meter("1"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));
    let err = h
        .services
        .settlement
        .retry_settlement(&session.session_id, "intruder", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));

    let current = h.services.sessions.get(&session.session_id).await.unwrap();
    assert_eq!(current.status, SessionStatus::Active);
}

#[tokio::test]
async fn recharge_callback_credits_wallet_once() {
    let h = harness();
    h.services.wallets.open_wallet("u13").await.unwrap();

    let recharge = h
        .services
        .reconciliation
        .start_recharge("u13", d("25"))
        .await
        .unwrap();
    assert_eq!(recharge.order.order_type, OrderType::Recharge);

    let payload = h.paid_callback(&recharge.order.order_id, d("25"));
    for _ in 0..3 {
        h.services.reconciliation.handle_callback(&payload).await;
    }

    assert_eq!(h.balance("u13").await, d("25.00"));
    let entries = h.services.wallets.entries("u13").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entry_type, EntryType::Credit);
    assert_eq!(entries[0].related_order_id, recharge.order.order_id);
    h.assert_ledger_consistent("u13").await;
}

#[tokio::test]
async fn recharge_requires_existing_wallet() {
    let h = harness();
    let err = h
        .services
        .reconciliation
        .start_recharge("nobody", d("10"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));
}

#[tokio::test]
async fn sweep_resolves_stale_gateway_orders() {
    let h = harness();

    let paid_session = h.start("u14", "CP-14", PaymentMethod::Gateway).await;
    let paid_order = h
        .services
        .sessions
        .stop(&paid_session.session_id, "u14", LOCAL, meter("4"))
        .await
        .unwrap()
        .settlement
        .order()
        .cloned()
        .unwrap();
    h.gateway.set_query_result(
        &paid_order.order_id,
        PaymentQuery::Paid {
            external_reference: "T-swept".into(),
        },
    );

    let abandoned_session = h.start("u15", "CP-15", PaymentMethod::Gateway).await;
    let abandoned_order = h
        .services
        .sessions
        .stop(&abandoned_session.session_id, "u15", LOCAL, meter("6"))
        .await
        .unwrap()
        .settlement
        .order()
        .cloned()
        .unwrap();

    let report = h.services.reconciliation.sweep(Duration::zero()).await.unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.confirmed, 1);
    assert_eq!(report.cancelled, 1);

    let paid = h.services.orders.get(&paid_order.order_id).await.unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    assert_eq!(paid.external_reference.as_deref(), Some("T-swept"));
    let session = h.services.sessions.get(&paid_session.session_id).await.unwrap();
    assert_eq!(session.payment_status, PaymentStatus::Paid);

    let cancelled = h.services.orders.get(&abandoned_order.order_id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let again = h.services.reconciliation.sweep(Duration::zero()).await.unwrap();
    assert_eq!(again.examined, 0);
}
