#![allow(dead_code)]

use cosmwasm_std::Uint128;
use meropools_commitment::{CommitmentBuilder, OrderParams};
use meropools_context::{
    CallScope, DefaultContextService, ExecutionContextClient, InMemoryEngine, MemoryRecordStore,
    ProvisioningConfig, RpcContextClient,
};
use meropools_escrow::{ConfirmationConfig, EscrowAdapter, MockSettlementChain};
use meropools_orchestrator::{
    BatchReconciler, CoordinatorConfig, InMemoryLifecycleStore, LifecycleState,
    OrderLifecycleCoordinator, OrderRequest, PoolOperator, PoolTarget, Trader,
};
use meropools_ratelimit::RetryPolicy;
use meropools_settlement::{InMemoryStore, SettlementSubmitter};
use meropools_types::{PoolConfig, TokenRegistry, PRICE_SCALE};
use std::sync::Arc;
use std::time::Duration;

pub const ESCROW: &str = "0xc45adc41c6be7d172b7841b072b90c0abb6f663f";
pub const ALICE: &str = "0x00000000000000000000000000000000000a11ce";
pub const BOB: &str = "0x0000000000000000000000000000000000000b0b";

pub struct Harness {
    pub engine: Arc<InMemoryEngine>,
    pub chain: Arc<MockSettlementChain>,
    pub client: Arc<dyn ExecutionContextClient>,
    pub pool: PoolTarget,
    pub lifecycles: Arc<InMemoryLifecycleStore>,
    pub coordinator: Arc<OrderLifecycleCoordinator>,
}

pub fn pool_config() -> PoolConfig {
    PoolConfig {
        pool_name: "B3TR/VET".to_string(),
        min_order_amount: Uint128::new(PRICE_SCALE),
        max_order_amount: Uint128::new(1_000_000 * PRICE_SCALE),
        supported_tokens: vec!["B3TR".to_string(), "VET".to_string()],
        batch_frequency_seconds: 30,
        fee_basis_points: 30,
        created_at: 0,
    }
}

pub fn params(address: &str, token: &str, want: &str) -> OrderParams {
    OrderParams {
        token: token.to_string(),
        amount: Uint128::new(100 * PRICE_SCALE),
        expected_token: want.to_string(),
        expected_price: Uint128::new(2 * PRICE_SCALE),
        settlement_address: address.to_string(),
        spread_bp: 50,
        time_limit_s: 3600,
    }
}

pub fn market(address: &str, token: &str, want: &str) -> OrderRequest {
    OrderRequest::market(params(address, token, want))
}

pub async fn harness() -> Harness {
    harness_with(CoordinatorConfig::default()).await
}

pub async fn harness_with(config: CoordinatorConfig) -> Harness {
    let engine = Arc::new(InMemoryEngine::new());
    let (context_id, operator_identity) = engine.create_pool("meropools", pool_config()).await;

    // Injected failures surface directly
    let client: Arc<dyn ExecutionContextClient> =
        Arc::new(RpcContextClient::new(engine.clone()).with_retry(RetryPolicy::no_retry()));
    let pool = PoolTarget::discover(
        client.as_ref(),
        &CallScope::new(&context_id, &operator_identity),
    )
    .await
    .unwrap();

    let chain = Arc::new(MockSettlementChain::new());
    let escrow = Arc::new(EscrowAdapter::new(chain.clone(), ESCROW).with_confirmation(
        ConfirmationConfig {
            attempts: 2,
            interval: Duration::from_millis(1),
        },
    ));

    let contexts = Arc::new(DefaultContextService::new(
        engine.clone(),
        Arc::new(MemoryRecordStore::new()),
        ProvisioningConfig {
            application_id: "meropools".to_string(),
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        },
    ));

    let lifecycles = Arc::new(InMemoryLifecycleStore::new());
    let coordinator = Arc::new(OrderLifecycleCoordinator::new(
        client.clone(),
        engine.clone(),
        escrow,
        contexts,
        lifecycles.clone(),
        CommitmentBuilder::default(),
        pool.clone(),
        config,
    ));

    Harness {
        engine,
        chain,
        client,
        pool,
        lifecycles,
        coordinator,
    }
}

impl Harness {
    /// Open and drive an order to `Active`.
    pub async fn place(&self, address: &str, token: &str, want: &str) -> String {
        let id = self
            .coordinator
            .open(market(address, token, want), Trader::new(address))
            .await
            .unwrap();
        let lifecycle = self.coordinator.drive(&id).await.unwrap();
        assert_eq!(lifecycle.state, LifecycleState::Active);
        id
    }

    pub fn reconciler(&self) -> Arc<BatchReconciler> {
        Arc::new(
            BatchReconciler::new(self.client.clone(), self.pool.operator_scope())
                .with_listener(self.coordinator.clone()),
        )
    }

    pub fn operator(&self) -> PoolOperator {
        let escrow = Arc::new(EscrowAdapter::new(self.chain.clone(), ESCROW).with_confirmation(
            ConfirmationConfig {
                attempts: 2,
                interval: Duration::from_millis(1),
            },
        ));
        let submitter = Arc::new(SettlementSubmitter::new(
            escrow,
            self.client.clone(),
            self.pool.operator_scope(),
            TokenRegistry::testnet(),
            Arc::new(InMemoryStore::new()),
        ));
        PoolOperator::new(self.reconciler(), submitter)
    }

    pub fn pool_scope(&self, identity: &str) -> CallScope {
        self.pool.scope_for(identity)
    }
}
