use accrual_reconciler::application::reconciler::{NotFoundPolicy, ReconcileOutcome, Reconciler};
use accrual_reconciler::domain::accrual::AccrualStatus;
use accrual_reconciler::domain::balance::Money;
use accrual_reconciler::domain::order::OrderStatus;
use accrual_reconciler::domain::ports::{BalanceStore, OrderStore};
use accrual_reconciler::infrastructure::in_memory::InMemoryStore;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_workers_credit_once() {
    let store = Arc::new(InMemoryStore::new());
    let reconciler = Arc::new(Reconciler::new(store.clone(), NotFoundPolicy::default()));

    for body in 0..50u64 {
        let snapshot = common::order(1_000_000 + body, 1);
        store.create(snapshot.clone()).await.unwrap();
        let response = common::response(&snapshot.number, AccrualStatus::Processed, Some(dec!(10)));

        // Two workers read the same NEW snapshot and both see PROCESSED.
        let racers: Vec<_> = (0..2)
            .map(|_| {
                let reconciler = Arc::clone(&reconciler);
                let snapshot = snapshot.clone();
                let response = response.clone();
                tokio::spawn(async move { reconciler.reconcile(&snapshot, &response).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for racer in racers {
            outcomes.push(racer.await.unwrap().unwrap());
        }
        let committed = outcomes
            .iter()
            .filter(|o| **o == ReconcileOutcome::Committed(OrderStatus::Processed))
            .count();
        let conflicts = outcomes
            .iter()
            .filter(|o| **o == ReconcileOutcome::Conflict)
            .count();
        assert_eq!((committed, conflicts), (1, 1));
    }

    let balance = store.balance(1).await.unwrap();
    assert_eq!(balance.current, Money::new(dec!(500)).unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_delivery_sums_exactly() {
    let store = Arc::new(InMemoryStore::new());
    let reconciler = Arc::new(Reconciler::new(store.clone(), NotFoundPolicy::default()));
    let mut rng = rand::thread_rng();

    let mut expected = [Decimal::ZERO; 3];
    let mut deliveries = Vec::new();
    for body in 0..60u64 {
        let user = body % 3;
        let snapshot = common::order(2_000_000 + body, user);
        store.create(snapshot.clone()).await.unwrap();

        let accrual = Decimal::new(rng.gen_range(1..100_000), 2);
        expected[user as usize] += accrual;
        let response = common::response(&snapshot.number, AccrualStatus::Processed, Some(accrual));
        for _ in 0..rng.gen_range(1..5) {
            deliveries.push((snapshot.clone(), response.clone()));
        }
    }

    let handles: Vec<_> = deliveries
        .into_iter()
        .map(|(snapshot, response)| {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move { reconciler.reconcile(&snapshot, &response).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for (user, total) in expected.iter().enumerate() {
        let balance = store.balance(user as u64).await.unwrap();
        assert_eq!(balance.current.value(), *total, "user {user}");
    }
}

#[tokio::test]
async fn test_terminal_order_is_never_reopened() {
    let store = Arc::new(InMemoryStore::new());
    let reconciler = Reconciler::new(store.clone(), NotFoundPolicy { limit: Some(1) });
    let snapshot = common::order(3_000_000, 9);
    store.create(snapshot.clone()).await.unwrap();

    let invalid = common::response(&snapshot.number, AccrualStatus::Invalid, None);
    assert_eq!(
        reconciler.reconcile(&snapshot, &invalid).await.unwrap(),
        ReconcileOutcome::Committed(OrderStatus::Invalid)
    );

    let stored = store.get(&snapshot.number).await.unwrap().unwrap();
    for status in [
        AccrualStatus::Registered,
        AccrualStatus::Processing,
        AccrualStatus::Processed,
    ] {
        let late = common::response(&snapshot.number, status, Some(dec!(99)));
        assert_eq!(
            reconciler.reconcile(&stored, &late).await.unwrap(),
            ReconcileOutcome::Unchanged
        );
    }
    assert_eq!(
        reconciler.not_found(&stored).await.unwrap(),
        ReconcileOutcome::Unchanged
    );

    let stored = store.get(&snapshot.number).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Invalid);
    assert_eq!(stored.accrual, Money::ZERO);
    assert_eq!(store.balance(9).await.unwrap().current, Money::ZERO);
}

#[tokio::test]
async fn test_registered_then_processed() {
    let store = Arc::new(InMemoryStore::new());
    let reconciler = Reconciler::new(store.clone(), NotFoundPolicy::default());
    let snapshot = common::order(4_000_000, 2);
    store.create(snapshot.clone()).await.unwrap();

    let registered = common::response(&snapshot.number, AccrualStatus::Registered, None);
    reconciler.reconcile(&snapshot, &registered).await.unwrap();
    let stored = store.get(&snapshot.number).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Processing);
    assert_eq!(
        serde_json::to_value(stored.status).unwrap(),
        serde_json::json!("PROCESSING")
    );

    let processed = common::response(&snapshot.number, AccrualStatus::Processed, Some(dec!(729.98)));
    reconciler.reconcile(&stored, &processed).await.unwrap();
    let stored = store.get(&snapshot.number).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Processed);
    assert_eq!(stored.accrual, Money::new(dec!(729.98)).unwrap());
    assert_eq!(
        store.balance(2).await.unwrap().current,
        Money::new(dec!(729.98)).unwrap()
    );
}
