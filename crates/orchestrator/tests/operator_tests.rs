mod common;

use common::*;
use meropools_context::ContextError;
use meropools_escrow::ReceiptBehavior;
use meropools_orchestrator::{LifecycleState, LoadOutcome, MatchingError};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════
// RECONCILER
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_refresh_reads_pool() {
    let h = harness().await;
    h.place(ALICE, "B3TR", "VET").await;
    h.place(BOB, "VET", "B3TR").await;

    let reconciler = h.reconciler();
    let summary = reconciler.refresh().await.unwrap();

    assert_eq!(summary.active_users, 2);
    assert_eq!(summary.active_orders, 2);
    assert_eq!(reconciler.working_set().await.active_orders.len(), 2);
}

#[tokio::test]
async fn test_matching_needs_two_orders() {
    let h = harness().await;
    h.place(ALICE, "B3TR", "VET").await;

    let reconciler = h.reconciler();
    reconciler.refresh().await.unwrap();
    let err = reconciler.trigger_matching().await.unwrap_err();

    assert!(matches!(err, MatchingError::InsufficientOrders { found: 1 }));
    assert_eq!(h.engine.call_count("run_batch_matching").await, 0);
}

#[tokio::test]
async fn test_matching_loads_batch_and_marks_orders_pending() {
    let h = harness().await;
    let alice = h.place(ALICE, "B3TR", "VET").await;
    let bob = h.place(BOB, "VET", "B3TR").await;

    let reconciler = h.reconciler();
    reconciler.refresh().await.unwrap();
    let outcome = reconciler.trigger_matching().await.unwrap();

    let LoadOutcome::Loaded(loaded) = outcome else {
        panic!("expected a loaded batch");
    };
    assert_eq!(loaded.batch.pair_count(), 1);
    assert_eq!(loaded.orders.len(), 2);

    let working = reconciler.working_set().await;
    assert!(working.active_orders.is_empty());
    assert_eq!(reconciler.pending_batches().await.len(), 1);

    for id in [&alice, &bob] {
        let lifecycle = h.coordinator.get(id).await.unwrap();
        assert_eq!(lifecycle.state, LifecycleState::SettlementPending);
        assert_eq!(lifecycle.batch_id.as_deref(), Some(loaded.batch_id()));

        // Matched in full before waiting on settlement
        let tail: Vec<_> = lifecycle.history.iter().rev().take(3).map(|t| t.to.clone()).collect();
        assert_eq!(
            tail,
            vec![
                LifecycleState::SettlementPending,
                LifecycleState::FullyMatched,
                LifecycleState::Active,
            ]
        );
    }
}

#[tokio::test]
async fn test_load_batch_is_idempotent() {
    let h = harness().await;
    h.place(ALICE, "B3TR", "VET").await;
    h.place(BOB, "VET", "B3TR").await;

    let reconciler = h.reconciler();
    reconciler.refresh().await.unwrap();
    let LoadOutcome::Loaded(loaded) = reconciler.trigger_matching().await.unwrap() else {
        panic!("expected a loaded batch");
    };

    let again = reconciler.load_batch(loaded.batch_id()).await.unwrap();
    assert_eq!(again, LoadOutcome::AlreadyLoaded);
    assert_eq!(reconciler.working_set().await.batches.len(), 1);
    assert_eq!(h.engine.call_count("get_batch_orders").await, 1);
}

#[tokio::test]
async fn test_load_unknown_batch() {
    let h = harness().await;
    let reconciler = h.reconciler();

    let err = reconciler.load_batch("batch_404").await.unwrap_err();
    assert!(matches!(err, MatchingError::BatchNotFound(id) if id == "batch_404"));
}

#[tokio::test]
async fn test_mark_settled_requires_loaded_batch() {
    let h = harness().await;
    let reconciler = h.reconciler();

    let err = reconciler.mark_settled("batch_1", "0xabc").await.unwrap_err();
    assert!(matches!(err, MatchingError::NotLoaded(_)));
}

#[tokio::test]
async fn test_unloaded_settlement_still_reaches_listener() {
    let h = harness().await;
    let alice = h.place(ALICE, "B3TR", "VET").await;
    h.place(BOB, "VET", "B3TR").await;

    let first = h.reconciler();
    first.refresh().await.unwrap();
    let LoadOutcome::Loaded(loaded) = first.trigger_matching().await.unwrap() else {
        panic!("expected a loaded batch");
    };

    // A restarted operator never loaded the batch
    let restarted = h.reconciler();
    let err = restarted
        .mark_settled(loaded.batch_id(), "0xabc")
        .await
        .unwrap_err();
    assert!(matches!(err, MatchingError::NotLoaded(_)));

    let lifecycle = h.coordinator.get(&alice).await.unwrap();
    assert_eq!(lifecycle.state, LifecycleState::Settled);
    assert_eq!(lifecycle.settlement_tx.as_deref(), Some("0xabc"));
}

#[tokio::test]
async fn test_observe_settlement_is_idempotent() {
    let h = harness().await;
    let alice = h.place(ALICE, "B3TR", "VET").await;
    h.place(BOB, "VET", "B3TR").await;

    let reconciler = h.reconciler();
    reconciler.refresh().await.unwrap();
    let LoadOutcome::Loaded(loaded) = reconciler.trigger_matching().await.unwrap() else {
        panic!("expected a loaded batch");
    };

    let first = h
        .coordinator
        .observe_settlement(loaded.batch_id(), "0xfeed")
        .await
        .unwrap();
    let second = h
        .coordinator
        .observe_settlement(loaded.batch_id(), "0xfeed")
        .await
        .unwrap();

    assert_eq!(first.len(), 2);
    assert!(second.is_empty());
    let lifecycle = h.coordinator.get(&alice).await.unwrap();
    assert_eq!(lifecycle.state, LifecycleState::Settled);
    assert_eq!(lifecycle.settlement_tx.as_deref(), Some("0xfeed"));
}

// ═══════════════════════════════════════════════════════════════════════════
// OPERATOR CYCLE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_cycle_matches_and_settles() {
    let h = harness().await;
    let alice = h.place(ALICE, "B3TR", "VET").await;
    let bob = h.place(BOB, "VET", "B3TR").await;
    let deposits = h.chain.send_count().await;

    let operator = h.operator();
    let report = operator.run_cycle().await.unwrap();

    assert_eq!(report.cycle, 1);
    assert!(!report.correlation_id.is_empty());
    assert_eq!(report.refreshed.map(|r| r.active_orders), Some(2));
    let batch_id = report.batch_id.clone().unwrap();
    assert_eq!(report.settled.len(), 1);
    assert!(report.failed.is_empty());
    assert_eq!(h.chain.send_count().await, deposits + 1);

    let tx_hash = &report.settled[0].tx_hash;
    assert_eq!(
        h.engine.settlement_for(&h.pool.context_id, &batch_id).await,
        Some(tx_hash.clone())
    );
    for id in [&alice, &bob] {
        let lifecycle = h.coordinator.get(id).await.unwrap();
        assert_eq!(lifecycle.state, LifecycleState::Settled);
        assert_eq!(lifecycle.settlement_tx.as_ref(), Some(tx_hash));
    }
    assert!(operator.reconciler().pending_batches().await.is_empty());
}

#[tokio::test]
async fn test_idle_cycle_does_nothing() {
    let h = harness().await;
    h.place(ALICE, "B3TR", "VET").await;
    let sends = h.chain.send_count().await;

    let operator = h.operator();
    let report = operator.run_cycle().await.unwrap();

    assert!(report.batch_id.is_none());
    assert!(report.settled.is_empty());
    assert_eq!(h.engine.call_count("run_batch_matching").await, 0);
    assert_eq!(h.chain.send_count().await, sends);
}

#[tokio::test]
async fn test_failed_write_back_retried_next_cycle() {
    let h = harness().await;
    let alice = h.place(ALICE, "B3TR", "VET").await;
    h.place(BOB, "VET", "B3TR").await;

    h.engine
        .fail_next(
            "submit_settlement_result",
            1,
            ContextError::Transient("node syncing".to_string()),
        )
        .await;

    let operator = h.operator();
    let first = operator.run_cycle().await.unwrap();
    assert!(first.settled.is_empty());
    assert_eq!(first.failed.len(), 1);
    assert_eq!(
        h.coordinator.get(&alice).await.unwrap().state,
        LifecycleState::SettlementPending
    );
    let sends = h.chain.send_count().await;

    let second = operator.run_cycle().await.unwrap();
    assert_eq!(second.cycle, 2);
    assert_eq!(second.write_backs.written_back.len(), 1);
    assert_eq!(h.chain.send_count().await, sends);
    assert_eq!(
        h.coordinator.get(&alice).await.unwrap().state,
        LifecycleState::Settled
    );
    assert!(operator.reconciler().pending_batches().await.is_empty());
}

#[tokio::test]
async fn test_unconfirmed_settlement_waits_for_review() {
    let h = harness().await;
    h.place(ALICE, "B3TR", "VET").await;
    h.place(BOB, "VET", "B3TR").await;
    h.chain.set_receipt_behavior(ReceiptBehavior::Pending).await;
    let deposits = h.chain.send_count().await;

    let operator = h.operator();
    let first = operator.run_cycle().await.unwrap();
    assert_eq!(first.failed.len(), 1);

    let second = operator.run_cycle().await.unwrap();
    assert_eq!(second.write_backs.needs_review.len(), 1);
    assert_eq!(second.failed.len(), 1);

    // Never resent while the first transaction may still land
    assert_eq!(h.chain.send_count().await, deposits + 1);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let h = harness().await;
    let operator = h.operator();

    tokio::time::timeout(
        Duration::from_secs(1),
        operator.run(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }),
    )
    .await
    .unwrap();

    assert!(h.engine.call_count("get_active_orders").await >= 1);
}
