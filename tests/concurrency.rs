//! Races on the in-memory store: claims, terminal transitions and callbacks.

mod common;

use futures_util::future::join_all;

use charge_settlement::domain::{DomainError, EntryType, OrderStatus, PaymentMethod, PaymentStatus};

use common::{d, harness, meter, start_cmd, LOCAL};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_on_one_charger_admit_one() {
    let h = harness();

    let tasks = (0..16).map(|i| {
        let sessions = h.services.sessions.clone();
        tokio::spawn(async move {
            sessions
                .start(start_cmd(&format!("user-{}", i), "CP-SHARED", PaymentMethod::Balance))
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let started = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(started, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert_eq!(
            result.as_ref().unwrap_err(),
            &DomainError::ChargerBusy("CP-SHARED".into())
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_by_one_user_admit_one() {
    let h = harness();

    let tasks = (0..8).map(|i| {
        let sessions = h.services.sessions.clone();
        tokio::spawn(async move {
            sessions
                .start(start_cmd("same-user", &format!("CP-{}", i), PaymentMethod::Balance))
                .await
        })
    });
    let started = join_all(tasks)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();
    assert_eq!(started, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stops_settle_once() {
    let h = harness();
    h.fund("u1", d("100")).await;
    let session = h.start("u1", "CP-1", PaymentMethod::Balance).await;

    let tasks = (0..2).map(|_| {
        let sessions = h.services.sessions.clone();
        let session_id = session.session_id.clone();
        tokio::spawn(async move { sessions.stop(&session_id, "u1", LOCAL, meter("10")).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let completed: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].settlement.label(), "paid");
    let rejected = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(rejected, DomainError::InvalidState { .. }));

    assert_eq!(h.balance("u1").await, d("90.00"));
    let debits = h
        .services
        .wallets
        .entries("u1")
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.entry_type == EntryType::Debit)
        .count();
    assert_eq!(debits, 1);
    h.assert_ledger_consistent("u1").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_callbacks_confirm_once() {
    let h = harness();
    let session = h.start("u2", "CP-2", PaymentMethod::Gateway).await;
    let order = h
        .services
        .sessions
        .stop(&session.session_id, "u2", LOCAL, meter("38.4"))
        .await
        .unwrap()
        .settlement
        .order()
        .cloned()
        .unwrap();

    let payload = h.paid_callback(&order.order_id, d("38.40"));
    let mut events = h.services.events.subscribe();
    let tasks = (0..8).map(|_| {
        let engine = h.services.reconciliation.clone();
        let payload = payload.clone();
        tokio::spawn(async move { engine.handle_callback(&payload).await })
    });
    for ack in join_all(tasks).await {
        assert_eq!(ack.unwrap().as_str(), "success");
    }

    let order = h.services.orders.get(&order.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    let session = h.services.sessions.get(&session.session_id).await.unwrap();
    assert_eq!(session.payment_status, PaymentStatus::Paid);

    let mut completed = 0;
    while let Some(msg) = events.try_recv() {
        if msg.event.event_type() == "settlement_completed" {
            completed += 1;
        }
    }
    assert_eq!(completed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_recharges_keep_ledger_consistent() {
    let h = harness();
    h.services.wallets.open_wallet("u3").await.unwrap();

    let mut payloads = Vec::new();
    for amount in ["10", "20", "30", "40"] {
        let recharge = h
            .services
            .reconciliation
            .start_recharge("u3", d(amount))
            .await
            .unwrap();
        payloads.push(h.paid_callback(&recharge.order.order_id, d(amount)));
    }

    // Every callback delivered twice, all at once.
    let tasks = payloads.iter().chain(payloads.iter()).map(|payload| {
        let engine = h.services.reconciliation.clone();
        let payload = payload.clone();
        tokio::spawn(async move { engine.handle_callback(&payload).await })
    });
    for ack in join_all(tasks).await {
        assert_eq!(ack.unwrap().as_str(), "success");
    }

    assert_eq!(h.balance("u3").await, d("100.00"));
    assert_eq!(h.services.wallets.entries("u3").await.unwrap().len(), 4);
    h.assert_ledger_consistent("u3").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_retries_debit_once() {
    let h = harness();
    h.fund("u4", d("5")).await;
    let session = h.start("u4", "CP-4", PaymentMethod::Balance).await;
    h.services
        .sessions
        .stop(&session.session_id, "u4", LOCAL, meter("8"))
        .await
        .unwrap();
    h.fund("u4", d("10")).await;

    let tasks = (0..6).map(|_| {
        let settlement = h.services.settlement.clone();
        let session_id = session.session_id.clone();
        tokio::spawn(async move { settlement.retry_settlement(&session_id, "u4", None).await })
    });
    let paid = join_all(tasks)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(outcome)) if outcome.label() == "paid"))
        .count();
    assert!(paid >= 1);

    assert_eq!(h.balance("u4").await, d("7.00"));
    let orders = h.services.orders.for_session(&session.session_id).await.unwrap();
    assert_eq!(orders.iter().filter(|o| o.status == OrderStatus::Paid).count(), 1);
    h.assert_ledger_consistent("u4").await;
}
