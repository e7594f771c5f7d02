use cosmwasm_std::Uint128;
use meropools_context::client::methods;
use meropools_context::{
    CallScope, ContextError, EnvelopeStyle, ExecutionContextClient, InMemoryEngine, NodeAdmin,
    RpcContextClient,
};
use meropools_ratelimit::RetryPolicy;
use meropools_types::{
    OperatingMode, OrderCommitment, OrderStatus, PoolConfig, SubmitOrderRequest, UserId,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════
// FIXTURES
// ═══════════════════════════════════════════════════════════════════════════

const PRICE: u128 = 2_000_000_000_000_000_000;

fn pool_config() -> PoolConfig {
    PoolConfig {
        pool_name: "B3TR/VET".to_string(),
        min_order_amount: Uint128::new(10),
        max_order_amount: Uint128::new(1_000_000),
        supported_tokens: vec!["B3TR".to_string(), "VET".to_string()],
        batch_frequency_seconds: 30,
        fee_basis_points: 30,
        created_at: 0,
    }
}

fn commitment(seed: u8) -> OrderCommitment {
    OrderCommitment {
        commitment_hash: [seed; 32],
        encrypted_payload: vec![seed],
        nullifier_seed: [seed; 32],
        proof_of_funds: [seed; 32],
        timestamp: 1,
        expiry: u64::MAX,
    }
}

fn request(user: &str, amount: u128, price: u128) -> SubmitOrderRequest {
    SubmitOrderRequest {
        user_id: UserId::from(user),
        commitment: commitment(amount as u8),
        token_deposited: "B3TR".to_string(),
        amount_deposited: Uint128::new(amount),
        escrow_confirmed: true,
        settlement_address: "0x00000000000000000000000000000000000a11ce".to_string(),
        expected_price: Uint128::new(price),
        expected_exchange_token: "VET".to_string(),
        spread_bp: 50,
        time_limit_s: 3600,
        transaction_id: Some("0xabc".to_string()),
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2))
}

async fn pool() -> (Arc<InMemoryEngine>, RpcContextClient<Arc<InMemoryEngine>>, CallScope) {
    let engine = Arc::new(InMemoryEngine::new());
    let (context_id, operator) = engine.create_pool("app", pool_config()).await;
    let client = RpcContextClient::new(engine.clone()).with_retry(fast_retry());
    (engine, client, CallScope::new(context_id, operator))
}

// ═══════════════════════════════════════════════════════════════════════════
// ORDER FLOW
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_submit_numbers_orders_and_auto_joins() {
    let (_engine, client, scope) = pool().await;

    let first = client.submit_order(&scope, &request("alice", 100, PRICE)).await.unwrap();
    let second = client.submit_order(&scope, &request("bob", 100, PRICE)).await.unwrap();

    assert_eq!(first, "order_1");
    assert_eq!(second, "order_2");

    let users = client.get_active_users(&scope).await.unwrap();
    assert_eq!(users, vec![UserId::from("alice"), UserId::from("bob")]);

    let orders = client.get_user_orders(&scope, &UserId::from("alice")).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order_context_id, "trade_ctx_alice_order_1");
    assert_eq!(orders[0].transaction_id.as_deref(), Some("0xabc"));
}

#[tokio::test]
async fn test_pool_limits_enforced() {
    let (_engine, client, scope) = pool().await;

    let err = client.submit_order(&scope, &request("alice", 5, PRICE)).await.unwrap_err();
    assert_eq!(err, ContextError::Rejected("Order amount outside pool limits".to_string()));

    let mut unsupported = request("alice", 100, PRICE);
    unsupported.token_deposited = "VTHO".to_string();
    let err = client.submit_order(&scope, &unsupported).await.unwrap_err();
    assert_eq!(err, ContextError::Rejected("Token not supported by this pool".to_string()));

    let err = client.submit_order(&scope, &request("alice", 0, PRICE)).await.unwrap_err();
    assert_eq!(err, ContextError::Rejected("Amount must be > 0".to_string()));
}

#[tokio::test]
async fn test_cancel_rules() {
    let (_engine, client, scope) = pool().await;
    let alice = UserId::from("alice");
    let id = client.submit_order(&scope, &request("alice", 100, PRICE)).await.unwrap();

    let err = client
        .cancel_order(&scope, &UserId::from("mallory"), &id)
        .await
        .unwrap_err();
    assert_eq!(err, ContextError::Rejected("Not order owner".to_string()));

    client.cancel_order(&scope, &alice, &id).await.unwrap();

    let err = client.cancel_order(&scope, &alice, &id).await.unwrap_err();
    assert_eq!(err, ContextError::Rejected("Order not active".to_string()));

    let err = client.cancel_order(&scope, &alice, "order_99").await.unwrap_err();
    assert_eq!(err, ContextError::Rejected("Order not found".to_string()));
}

#[tokio::test]
async fn test_batch_matching_and_settlement_write_back() {
    let (engine, client, scope) = pool().await;
    client.submit_order(&scope, &request("alice", 100, PRICE)).await.unwrap();
    client
        .submit_order(&scope, &request("bob", 300, 4_000_000_000_000_000_000))
        .await
        .unwrap();
    client.submit_order(&scope, &request("carol", 50, PRICE)).await.unwrap();

    let batch_id = client.run_batch_matching(&scope).await.unwrap();
    assert_eq!(batch_id, "batch_1");

    let (batch, orders) = client
        .get_batch_orders(&scope, &batch_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.matched_orders, vec![("order_1".to_string(), "order_2".to_string())]);
    assert_eq!(batch.clearing_price, Uint128::new(3_000_000_000_000_000_000));
    assert_eq!(batch.total_volume, Uint128::new(100));
    assert_eq!(batch.nullifiers.len(), 2);
    assert!(orders.iter().all(|o| o.status == OrderStatus::FullyMatched && o.matched));

    // The unpaired order stays active
    let active = client.get_active_orders(&scope).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "order_3");

    client
        .submit_settlement_result(&scope, &batch_id, "0xfeed")
        .await
        .unwrap();
    assert_eq!(
        engine.settlement_for(&scope.context_id, &batch_id).await.as_deref(),
        Some("0xfeed")
    );
    let settled = engine.order(&scope.context_id, "order_1").await.unwrap();
    assert_eq!(settled.settlement_tx.as_deref(), Some("0xfeed"));
}

#[tokio::test]
async fn test_unknown_batch_is_none() {
    let (_engine, client, scope) = pool().await;
    assert!(client.get_batch_orders(&scope, "batch_9").await.unwrap().is_none());
    assert!(client.get_batch_result(&scope, "batch_9").await.unwrap().is_none());
}

#[tokio::test]
async fn test_mode_and_pool_config() {
    let (_engine, client, scope) = pool().await;
    assert_eq!(client.get_mode(&scope).await.unwrap(), OperatingMode::MatchingPool);
    assert_eq!(client.get_pool_config(&scope).await.unwrap(), Some(pool_config()));
}

// ═══════════════════════════════════════════════════════════════════════════
// ENVELOPES, MEMBERSHIP AND RETRIES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_every_envelope_style_decodes() {
    for style in [
        EnvelopeStyle::Bare,
        EnvelopeStyle::Result,
        EnvelopeStyle::Output,
        EnvelopeStyle::ResultOutput,
    ] {
        let (engine, client, scope) = pool().await;
        engine.set_envelope_style(style).await;

        let id = client.submit_order(&scope, &request("alice", 100, PRICE)).await.unwrap();
        assert_eq!(id, "order_1");
        client.submit_order(&scope, &request("bob", 100, PRICE)).await.unwrap();

        let batch_id = client.run_batch_matching(&scope).await.unwrap();
        let (batch, orders) = client.get_batch_orders(&scope, &batch_id).await.unwrap().unwrap();
        assert_eq!(batch.pair_count(), 1);
        assert_eq!(orders.len(), 2);
    }
}

#[tokio::test]
async fn test_malformed_batch_envelope_rejected() {
    let (engine, client, scope) = pool().await;
    engine
        .override_response(methods::GET_BATCH_ORDERS, json!({"output": {"batch": "batch_1"}}))
        .await;

    let err = client.get_batch_orders(&scope, "batch_1").await.unwrap_err();
    assert!(matches!(err, ContextError::MalformedEnvelope(_)));
}

#[tokio::test]
async fn test_unrecognised_listing_defaults_to_empty() {
    let (engine, client, scope) = pool().await;
    engine
        .override_response(methods::GET_ACTIVE_USERS, json!({"users": "alice"}))
        .await;

    assert!(client.get_active_users(&scope).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_non_member_executor_rejected() {
    let (engine, client, scope) = pool().await;
    let outsider = engine.create_identity().await.unwrap();
    let wrong = CallScope::new(&scope.context_id, outsider.public_key);

    let err = client.submit_order(&wrong, &request("alice", 100, PRICE)).await.unwrap_err();
    assert!(matches!(err, ContextError::Rejected(_)));
}

#[tokio::test]
async fn test_transient_failures_retried_for_queries() {
    let (engine, client, scope) = pool().await;
    engine
        .fail_next(
            methods::GET_ACTIVE_ORDERS,
            2,
            ContextError::Transient("Uninitialized".to_string()),
        )
        .await;

    assert!(client.get_active_orders(&scope).await.unwrap().is_empty());
    assert_eq!(engine.call_count(methods::GET_ACTIVE_ORDERS).await, 3);
}

#[tokio::test]
async fn test_transient_failures_exhaust_retry_bound() {
    let (engine, client, scope) = pool().await;
    engine
        .fail_next(
            methods::GET_ACTIVE_USERS,
            5,
            ContextError::Transient("Uninitialized".to_string()),
        )
        .await;

    let err = client.get_active_users(&scope).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(engine.call_count(methods::GET_ACTIVE_USERS).await, 3);
}

#[tokio::test]
async fn test_submit_order_never_retried() {
    let (engine, client, scope) = pool().await;
    engine
        .fail_next(
            methods::SUBMIT_ORDER,
            1,
            ContextError::Transient("Uninitialized".to_string()),
        )
        .await;

    let err = client.submit_order(&scope, &request("alice", 100, PRICE)).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(engine.call_count(methods::SUBMIT_ORDER).await, 1);
    assert!(client.get_active_orders(&scope).await.unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// MEMBERSHIP
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_invite_and_join_grants_membership() {
    let (engine, client, scope) = pool().await;
    let trader = engine.create_identity().await.unwrap();

    let payload = engine
        .invite_to_context(&scope.context_id, &scope.executor_public_key, &trader.public_key)
        .await
        .unwrap();
    let membership = engine.join_context(&payload).await.unwrap();

    assert_eq!(membership.context_id, scope.context_id);
    assert_eq!(membership.member_public_key, trader.public_key);
    assert!(engine.is_member(&scope.context_id, &trader.public_key).await);

    let trader_scope = CallScope::new(&scope.context_id, &trader.public_key);
    let id = client
        .submit_order(&trader_scope, &request(&trader.public_key, 100, PRICE))
        .await
        .unwrap();
    assert_eq!(id, "order_1");
}

#[tokio::test]
async fn test_invite_requires_member_inviter() {
    let (engine, _client, scope) = pool().await;
    let stranger = engine.create_identity().await.unwrap();
    let trader = engine.create_identity().await.unwrap();

    let err = engine
        .invite_to_context(&scope.context_id, &stranger.public_key, &trader.public_key)
        .await
        .unwrap_err();
    assert!(matches!(err, ContextError::Rejected(_)));
}
