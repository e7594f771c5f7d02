use async_trait::async_trait;
use meropools_commitment::CommitmentBuilder;
use meropools_context::{
    CallScope, ContextError, DefaultContextService, ExecutionContextClient, NodeAdmin,
};
use meropools_escrow::EscrowAdapter;
use meropools_metrics::MetricsCollector;
use meropools_types::{
    is_address, now_ns, BatchMatchResult, OperatingMode, OrderStatus, PoolConfig,
    SubmitOrderRequest, TokenRegistry, UserId, UserOrder,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{LifecycleError, PoolDiscoveryError};
use crate::lifecycle::{
    LifecycleState, LifecycleStep, OrderDraft, OrderLifecycle, OrderRequest, PriceMode, Trader,
};
use crate::reconciler::BatchListener;
use crate::store::LifecycleStore;

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════

/// The matching pool orders are placed into.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolTarget {
    pub context_id: String,
    /// Pool member that invites new traders
    pub operator_identity: String,
    pub config: PoolConfig,
}

impl PoolTarget {
    /// Look up the pool behind `scope` at the start of a session. The context
    /// must run as a matching pool and publish its configuration, which is
    /// then kept for the rest of the session.
    pub async fn discover(
        client: &dyn ExecutionContextClient,
        scope: &CallScope,
    ) -> Result<Self, PoolDiscoveryError> {
        let mode = client.get_mode(scope).await?;
        if mode != OperatingMode::MatchingPool {
            return Err(PoolDiscoveryError::NotAPool {
                context_id: scope.context_id.clone(),
                mode,
            });
        }

        let config = client
            .get_pool_config(scope)
            .await?
            .ok_or_else(|| PoolDiscoveryError::MissingConfig(scope.context_id.clone()))?;
        // The operator cycles at this rate
        if config.batch_frequency_seconds == 0 {
            return Err(PoolDiscoveryError::ZeroBatchFrequency(scope.context_id.clone()));
        }

        info!(
            context_id = %scope.context_id,
            pool = %config.pool_name,
            batch_frequency_seconds = config.batch_frequency_seconds,
            "Matching pool discovered"
        );
        Ok(Self {
            context_id: scope.context_id.clone(),
            operator_identity: scope.executor_public_key.clone(),
            config,
        })
    }

    pub fn scope_for(&self, identity: &str) -> CallScope {
        CallScope::new(&self.context_id, identity)
    }

    pub fn operator_scope(&self) -> CallScope {
        self.scope_for(&self.operator_identity)
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub tokens: TokenRegistry,
    /// Also record each order in the trader's private context
    pub record_private_history: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            tokens: TokenRegistry::testnet(),
            record_private_history: true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// COORDINATOR
// ═══════════════════════════════════════════════════════════════════════════

/// Drives orders from draft to settlement.
///
/// Every transition is persisted before the next side effect starts, so an
/// abandoned `drive` resumes from the last recorded state. Only one caller
/// may drive or cancel a given lifecycle at a time.
pub struct OrderLifecycleCoordinator {
    client: Arc<dyn ExecutionContextClient>,
    admin: Arc<dyn NodeAdmin>,
    escrow: Arc<EscrowAdapter>,
    contexts: Arc<DefaultContextService>,
    store: Arc<dyn LifecycleStore>,
    builder: CommitmentBuilder,
    pool: PoolTarget,
    config: CoordinatorConfig,
    metrics: Option<Arc<MetricsCollector>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Settlement address to joined pool identity
    members: RwLock<HashMap<String, String>>,
}

impl OrderLifecycleCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn ExecutionContextClient>,
        admin: Arc<dyn NodeAdmin>,
        escrow: Arc<EscrowAdapter>,
        contexts: Arc<DefaultContextService>,
        store: Arc<dyn LifecycleStore>,
        builder: CommitmentBuilder,
        pool: PoolTarget,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            client,
            admin,
            escrow,
            contexts,
            store,
            builder,
            pool,
            config,
            metrics: None,
            locks: Mutex::new(HashMap::new()),
            members: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn pool(&self) -> &PoolTarget {
        &self.pool
    }

    pub async fn get(&self, lifecycle_id: &str) -> Result<OrderLifecycle, LifecycleError> {
        self.store
            .get(lifecycle_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(lifecycle_id.to_string()))
    }

    pub async fn list_open(&self) -> Result<Vec<OrderLifecycle>, LifecycleError> {
        Ok(self.store.list_open().await?)
    }

    /// Validate an order locally and record its draft with a fresh
    /// commitment. Nothing leaves the process.
    pub async fn open(
        &self,
        request: OrderRequest,
        trader: Trader,
    ) -> Result<String, LifecycleError> {
        self.validate(&request, &trader)?;

        let commitment = self.builder.build(&request.params)?;
        let lifecycle_id = format!("lc_{}", Uuid::new_v4().simple());
        let lifecycle = OrderLifecycle::new(
            &lifecycle_id,
            trader,
            OrderDraft {
                request,
                commitment,
            },
            now_ns(),
        );
        self.store.create(&lifecycle).await?;

        if let Some(metrics) = &self.metrics {
            metrics.record_order_opened();
        }
        info!(
            lifecycle_id = %lifecycle_id,
            commitment = %lifecycle.draft.commitment.hash_hex(),
            "Order lifecycle opened"
        );
        Ok(lifecycle_id)
    }

    fn validate(&self, request: &OrderRequest, trader: &Trader) -> Result<(), LifecycleError> {
        let params = &request.params;

        if !is_address(&trader.settlement_address) {
            return Err(LifecycleError::MissingWallet);
        }
        if params.amount.is_zero() {
            return Err(LifecycleError::ZeroAmount);
        }
        for token in [&params.token, &params.expected_token] {
            if !self.pool.config.supports_token(token) || self.config.tokens.get(token).is_err()
            {
                return Err(LifecycleError::UnsupportedToken(token.clone()));
            }
        }
        if !self.pool.config.accepts_amount(params.amount) {
            return Err(LifecycleError::AmountOutsideLimits(params.amount.to_string()));
        }
        if request.price_mode == PriceMode::Custom && params.expected_price.is_zero() {
            return Err(LifecycleError::InvalidPrice);
        }
        Ok(())
    }

    /// Advance the lifecycle until it is `Active` in the pool or fails.
    pub async fn drive(&self, lifecycle_id: &str) -> Result<OrderLifecycle, LifecycleError> {
        let lock = self.lock_for(lifecycle_id).await;
        let _guard = lock
            .try_lock_owned()
            .map_err(|_| LifecycleError::Busy(lifecycle_id.to_string()))?;

        let mut lifecycle = self.get(lifecycle_id).await?;

        loop {
            match lifecycle.state.clone() {
                LifecycleState::Draft => self.deposit(&mut lifecycle).await?,
                LifecycleState::DepositSubmitted => {
                    // Broadcast started in an earlier call that never recorded
                    // an outcome; sending again could lock collateral twice
                    self.fail(
                        &mut lifecycle,
                        LifecycleStep::Deposit,
                        "deposit interrupted before confirmation",
                    )
                    .await?;
                }
                LifecycleState::DepositConfirmed => {
                    if self.joined_identity(&mut lifecycle).await {
                        self.submit_private(&mut lifecycle).await?;
                    } else {
                        self.provision_identity(&mut lifecycle).await?;
                    }
                }
                LifecycleState::IdentityProvisioned => self.join_pool(&mut lifecycle).await?,
                LifecycleState::ContextJoined => self.submit_private(&mut lifecycle).await?,
                LifecycleState::SubmittedPrivate => self.submit_pool(&mut lifecycle).await?,
                LifecycleState::SubmittedPool => {
                    self.advance(&mut lifecycle, LifecycleState::Active).await?;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_order_active();
                    }
                    info!(
                        lifecycle_id = %lifecycle.lifecycle_id,
                        order_id = ?lifecycle.order_id,
                        warnings = lifecycle.warnings.len(),
                        "Order active in pool"
                    );
                }
                LifecycleState::Failed { step, reason } => {
                    return Err(LifecycleError::Failed {
                        lifecycle_id: lifecycle.lifecycle_id,
                        step,
                        reason,
                    });
                }
                _ => return Ok(lifecycle),
            }
        }
    }

    /// Cancel an `Active` order in the pool.
    pub async fn cancel(&self, lifecycle_id: &str) -> Result<OrderLifecycle, LifecycleError> {
        let lock = self.lock_for(lifecycle_id).await;
        let _guard = lock
            .try_lock_owned()
            .map_err(|_| LifecycleError::Busy(lifecycle_id.to_string()))?;

        let mut lifecycle = self.get(lifecycle_id).await?;
        let not_cancellable = |lifecycle: &OrderLifecycle| LifecycleError::NotCancellable {
            lifecycle_id: lifecycle.lifecycle_id.clone(),
            state: lifecycle.state.to_string(),
        };

        if lifecycle.state != LifecycleState::Active {
            return Err(not_cancellable(&lifecycle));
        }
        let (Some(identity), Some(order_id)) =
            (lifecycle.pool_identity.clone(), lifecycle.order_id.clone())
        else {
            return Err(not_cancellable(&lifecycle));
        };

        self.client
            .cancel_order(
                &self.pool.scope_for(&identity),
                &UserId::new(identity.as_str()),
                &order_id,
            )
            .await?;

        self.advance(&mut lifecycle, LifecycleState::Cancelled).await?;
        self.record_departure(&LifecycleState::Active, &OrderStatus::Cancelled);
        info!(lifecycle_id, order_id = %order_id, "Order cancelled");
        Ok(lifecycle)
    }

    /// Apply the engine's view of the order.
    pub async fn observe(
        &self,
        lifecycle_id: &str,
        order: &UserOrder,
    ) -> Result<OrderLifecycle, LifecycleError> {
        let lock = self.lock_for(lifecycle_id).await;
        let _guard = lock.lock().await;

        let mut lifecycle = self.get(lifecycle_id).await?;
        if lifecycle.order_id.as_deref() != Some(order.id.as_str()) {
            debug!(lifecycle_id, order_id = %order.id, "Observed order belongs elsewhere");
            return Ok(lifecycle);
        }
        // Engine updates apply once placement has reached Active
        if lifecycle.state.is_placing() {
            debug!(lifecycle_id, state = %lifecycle.state, "Order still being placed");
            return Ok(lifecycle);
        }

        if let Some(tx_hash) = &order.settlement_tx {
            if lifecycle.state.advances_to(&LifecycleState::Settled) {
                let previous = lifecycle.state.clone();
                self.await_settlement(&mut lifecycle, None).await?;
                lifecycle.settlement_tx = Some(tx_hash.clone());
                self.advance(&mut lifecycle, LifecycleState::Settled).await?;
                self.record_departure(&previous, &OrderStatus::FullyMatched);
            }
            return Ok(lifecycle);
        }

        let Some(next) = LifecycleState::from_engine_status(&order.status) else {
            return Ok(lifecycle);
        };
        let allowed = match next {
            // Engine-enforced; only an unmatched order can end this way
            LifecycleState::Cancelled | LifecycleState::Expired => {
                lifecycle.state == LifecycleState::Active
            }
            _ => lifecycle.state.advances_to(&next),
        };
        if allowed {
            let previous = lifecycle.state.clone();
            self.advance(&mut lifecycle, next).await?;
            self.record_departure(&previous, &order.status);
        }
        Ok(lifecycle)
    }

    /// Fetch the engine's copy of the order and apply it with [`observe`].
    /// Lifecycles without a pool order are returned unchanged.
    ///
    /// [`observe`]: Self::observe
    pub async fn sync(&self, lifecycle_id: &str) -> Result<OrderLifecycle, LifecycleError> {
        let lifecycle = self.get(lifecycle_id).await?;
        let (Some(identity), Some(order_id)) =
            (lifecycle.pool_identity.clone(), lifecycle.order_id.clone())
        else {
            return Ok(lifecycle);
        };

        let orders = self
            .client
            .get_user_orders(
                &self.pool.scope_for(&identity),
                &UserId::new(identity.as_str()),
            )
            .await?;
        match orders.iter().find(|order| order.id == order_id) {
            Some(order) => self.observe(lifecycle_id, order).await,
            None => {
                warn!(lifecycle_id, order_id = %order_id, "Pool order not found in engine");
                Ok(lifecycle)
            }
        }
    }

    /// [`sync`](Self::sync) every open lifecycle placed in the pool. Returns
    /// the lifecycles whose state changed.
    pub async fn sync_open(&self) -> Result<Vec<OrderLifecycle>, LifecycleError> {
        let mut changed = Vec::new();
        for candidate in self.store.list_open().await? {
            if candidate.state.is_placing() || candidate.order_id.is_none() {
                continue;
            }
            match self.sync(&candidate.lifecycle_id).await {
                Ok(synced) if synced.state != candidate.state => changed.push(synced),
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        lifecycle_id = %candidate.lifecycle_id,
                        error = %e,
                        "Failed to sync lifecycle"
                    );
                }
            }
        }
        Ok(changed)
    }

    /// Orders of a freshly loaded batch await settlement. Returns the
    /// lifecycle ids that moved.
    pub async fn observe_batch(
        &self,
        batch_id: &str,
        order_ids: &[String],
    ) -> Result<Vec<String>, LifecycleError> {
        let mut moved = Vec::new();

        for candidate in self.store.list_open().await? {
            let in_batch = candidate
                .order_id
                .as_ref()
                .is_some_and(|id| order_ids.contains(id));
            if !in_batch {
                continue;
            }

            let lock = self.lock_for(&candidate.lifecycle_id).await;
            let _guard = lock.lock().await;
            let mut lifecycle = self.get(&candidate.lifecycle_id).await?;

            if lifecycle.state.is_live() {
                let previous = lifecycle.state.clone();
                self.await_settlement(&mut lifecycle, Some(batch_id)).await?;
                self.record_departure(&previous, &OrderStatus::FullyMatched);
                moved.push(lifecycle.lifecycle_id);
            }
        }

        if !moved.is_empty() {
            info!(batch_id, orders = moved.len(), "Orders awaiting settlement");
        }
        Ok(moved)
    }

    /// Mark every order of `batch_id` settled. Repeated calls are no-ops.
    pub async fn observe_settlement(
        &self,
        batch_id: &str,
        tx_hash: &str,
    ) -> Result<Vec<String>, LifecycleError> {
        let mut settled = Vec::new();

        for candidate in self.store.list_open().await? {
            if candidate.batch_id.as_deref() != Some(batch_id) {
                continue;
            }

            let lock = self.lock_for(&candidate.lifecycle_id).await;
            let _guard = lock.lock().await;
            let mut lifecycle = self.get(&candidate.lifecycle_id).await?;

            if lifecycle.state == LifecycleState::SettlementPending {
                lifecycle.settlement_tx = Some(tx_hash.to_string());
                self.advance(&mut lifecycle, LifecycleState::Settled).await?;
                settled.push(lifecycle.lifecycle_id);
            }
        }

        if !settled.is_empty() {
            info!(batch_id, tx_hash, orders = settled.len(), "Orders settled");
        }
        Ok(settled)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // STEPS
    // ═══════════════════════════════════════════════════════════════════════

    async fn deposit(&self, lifecycle: &mut OrderLifecycle) -> Result<(), LifecycleError> {
        let params = lifecycle.draft.request.params.clone();
        let token = match self.config.tokens.get(&params.token) {
            Ok(token) => token.clone(),
            Err(e) => {
                return self
                    .fail(lifecycle, LifecycleStep::Deposit, e.to_string())
                    .await;
            }
        };

        self.advance(lifecycle, LifecycleState::DepositSubmitted)
            .await?;

        let started = Instant::now();
        match self.escrow.deposit(params.amount, &token).await {
            Ok(receipt) => {
                lifecycle.deposit_tx = Some(receipt.tx_id.clone());
                self.advance(lifecycle, LifecycleState::DepositConfirmed)
                    .await?;
                if let Some(metrics) = &self.metrics {
                    metrics.record_deposit_confirmed(started.elapsed());
                }
                info!(
                    lifecycle_id = %lifecycle.lifecycle_id,
                    tx_id = %receipt.tx_id,
                    "Escrow deposit confirmed"
                );
                Ok(())
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_deposit_failed(e.label());
                }
                if let Some(tx_id) = e.tx_id() {
                    lifecycle.deposit_tx = Some(tx_id.to_string());
                }
                self.fail(lifecycle, LifecycleStep::Deposit, e.to_string())
                    .await
            }
        }
    }

    /// Pool identity the trader already joined with, if any.
    async fn joined_identity(&self, lifecycle: &mut OrderLifecycle) -> bool {
        if let Some(identity) = &lifecycle.trader.pool_identity {
            lifecycle.pool_identity = Some(identity.clone());
            return true;
        }
        let members = self.members.read().await;
        match members.get(&lifecycle.trader.settlement_address) {
            Some(identity) => {
                lifecycle.pool_identity = Some(identity.clone());
                true
            }
            None => false,
        }
    }

    async fn provision_identity(
        &self,
        lifecycle: &mut OrderLifecycle,
    ) -> Result<(), LifecycleError> {
        if lifecycle.pool_identity.is_none() {
            match self.admin.create_identity().await {
                Ok(identity) => {
                    debug!(
                        lifecycle_id = %lifecycle.lifecycle_id,
                        identity = %identity.public_key,
                        "Pool identity created"
                    );
                    lifecycle.pool_identity = Some(identity.public_key);
                }
                Err(e) => return self.step_failed(lifecycle, LifecycleStep::Identity, e).await,
            }
        }
        self.advance(lifecycle, LifecycleState::IdentityProvisioned)
            .await
    }

    async fn join_pool(&self, lifecycle: &mut OrderLifecycle) -> Result<(), LifecycleError> {
        let Some(identity) = lifecycle.pool_identity.clone() else {
            return self
                .fail(lifecycle, LifecycleStep::Join, "no pool identity provisioned")
                .await;
        };

        let invitation = match lifecycle.invitation.clone() {
            Some(invitation) => invitation,
            None => {
                let invitation = match self
                    .admin
                    .invite_to_context(
                        &self.pool.context_id,
                        &self.pool.operator_identity,
                        &identity,
                    )
                    .await
                {
                    Ok(invitation) => invitation,
                    Err(e) => return self.step_failed(lifecycle, LifecycleStep::Join, e).await,
                };
                lifecycle.invitation = Some(invitation.clone());
                lifecycle.updated_at = now_ns();
                self.store.save(lifecycle).await?;
                invitation
            }
        };

        let membership = match self.admin.join_context(&invitation).await {
            Ok(membership) => membership,
            Err(e) => return self.step_failed(lifecycle, LifecycleStep::Join, e).await,
        };
        if membership.context_id != self.pool.context_id {
            let reason = format!("joined {} instead of the pool", membership.context_id);
            return self.fail(lifecycle, LifecycleStep::Join, reason).await;
        }

        self.members
            .write()
            .await
            .insert(lifecycle.trader.settlement_address.clone(), identity);
        self.advance(lifecycle, LifecycleState::ContextJoined).await
    }

    /// Private history is best effort: the pool order is authoritative.
    async fn submit_private(&self, lifecycle: &mut OrderLifecycle) -> Result<(), LifecycleError> {
        if self.config.record_private_history {
            match self.record_private(lifecycle).await {
                Ok(order_id) => lifecycle.private_order_id = Some(order_id),
                Err(LifecycleError::Store(e)) => return Err(e.into()),
                Err(e) => {
                    warn!(
                        lifecycle_id = %lifecycle.lifecycle_id,
                        step = %LifecycleStep::SubmitPrivate,
                        error = %e,
                        "Private order record failed, continuing with pool submission"
                    );
                    lifecycle.warn(format!("{}: {e}", LifecycleStep::SubmitPrivate));
                    if let Some(metrics) = &self.metrics {
                        metrics.record_partial_write();
                    }
                }
            }
        }
        lifecycle.submitting = None;
        self.advance(lifecycle, LifecycleState::SubmittedPrivate)
            .await
    }

    async fn record_private(&self, lifecycle: &mut OrderLifecycle) -> Result<String, LifecycleError> {
        let ensured = self.contexts.ensure_default_context().await?;
        let user_id = UserId::new(ensured.record.member_public_key.as_str());
        self.submit_once(lifecycle, LifecycleStep::SubmitPrivate, &ensured.scope(), user_id)
            .await
    }

    /// The pool order uses the pool identity both as executor and owner;
    /// that pairing is how the engine finds it for matching.
    async fn submit_pool(&self, lifecycle: &mut OrderLifecycle) -> Result<(), LifecycleError> {
        let Some(identity) = lifecycle.pool_identity.clone() else {
            return self
                .fail(lifecycle, LifecycleStep::SubmitPool, "no pool identity provisioned")
                .await;
        };

        let scope = self.pool.scope_for(&identity);
        let user_id = UserId::new(identity.as_str());
        match self
            .submit_once(lifecycle, LifecycleStep::SubmitPool, &scope, user_id)
            .await
        {
            Ok(order_id) => {
                info!(
                    lifecycle_id = %lifecycle.lifecycle_id,
                    order_id = %order_id,
                    "Order submitted to pool"
                );
                lifecycle.order_id = Some(order_id);
                lifecycle.submitting = None;
                self.advance(lifecycle, LifecycleState::SubmittedPool).await
            }
            Err(LifecycleError::Context(e)) => {
                self.step_failed(lifecycle, LifecycleStep::SubmitPool, e)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Submit at most once per commitment. A resumed submission first looks
    /// for an order carrying this commitment before sending another.
    async fn submit_once(
        &self,
        lifecycle: &mut OrderLifecycle,
        step: LifecycleStep,
        scope: &CallScope,
        user_id: UserId,
    ) -> Result<String, LifecycleError> {
        if lifecycle.submitting == Some(step) {
            let existing = self.client.get_user_orders(scope, &user_id).await?;
            if let Some(order) = existing
                .iter()
                .find(|o| o.commitment.commitment_hash == lifecycle.commitment_hash())
            {
                debug!(
                    lifecycle_id = %lifecycle.lifecycle_id,
                    order_id = %order.id,
                    step = %step,
                    "Earlier submission found, reusing it"
                );
                return Ok(order.id.clone());
            }
        }

        lifecycle.submitting = Some(step);
        lifecycle.updated_at = now_ns();
        self.store.save(lifecycle).await?;

        let request = order_request(lifecycle, user_id);
        Ok(self.client.submit_order(scope, &request).await?)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TRANSITIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// A batched order is fully matched before it waits for settlement.
    async fn await_settlement(
        &self,
        lifecycle: &mut OrderLifecycle,
        batch_id: Option<&str>,
    ) -> Result<(), LifecycleError> {
        if lifecycle.state.advances_to(&LifecycleState::FullyMatched) {
            self.advance(lifecycle, LifecycleState::FullyMatched).await?;
        }
        if let Some(batch_id) = batch_id {
            lifecycle.batch_id = Some(batch_id.to_string());
        }
        if lifecycle.state.advances_to(&LifecycleState::SettlementPending) {
            self.advance(lifecycle, LifecycleState::SettlementPending)
                .await?;
        }
        Ok(())
    }

    async fn advance(
        &self,
        lifecycle: &mut OrderLifecycle,
        next: LifecycleState,
    ) -> Result<(), LifecycleError> {
        debug!(
            lifecycle_id = %lifecycle.lifecycle_id,
            from = %lifecycle.state,
            to = %next,
            "Lifecycle transition"
        );
        lifecycle.transition(next, now_ns());
        self.store.save(lifecycle).await?;
        self.release_if_terminal(lifecycle).await;
        Ok(())
    }

    /// Record `Failed` and return the matching error.
    async fn fail(
        &self,
        lifecycle: &mut OrderLifecycle,
        step: LifecycleStep,
        reason: impl Into<String>,
    ) -> Result<(), LifecycleError> {
        let reason = reason.into();
        error!(
            lifecycle_id = %lifecycle.lifecycle_id,
            step = %step,
            reason = %reason,
            error_type = "lifecycle_failed",
            "Order lifecycle failed"
        );
        lifecycle.fail(step, reason.clone(), now_ns());
        self.store.save(lifecycle).await?;
        self.release_if_terminal(lifecycle).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_order_failed(step.as_str());
        }
        Err(LifecycleError::Failed {
            lifecycle_id: lifecycle.lifecycle_id.clone(),
            step,
            reason,
        })
    }

    /// Transient failures leave the state as is for a later `drive`; anything
    /// else fails the lifecycle.
    async fn step_failed(
        &self,
        lifecycle: &mut OrderLifecycle,
        step: LifecycleStep,
        error: ContextError,
    ) -> Result<(), LifecycleError> {
        if error.is_retryable() {
            warn!(
                lifecycle_id = %lifecycle.lifecycle_id,
                step = %step,
                error = %error,
                "Lifecycle step interrupted, resumable"
            );
            return Err(LifecycleError::Interrupted {
                lifecycle_id: lifecycle.lifecycle_id.clone(),
                step,
                source: error,
            });
        }
        self.fail(lifecycle, step, error.to_string()).await
    }

    /// Status metrics follow an order while it is counted as active in the
    /// pool; later transitions are not counted again.
    fn record_departure(&self, previous: &LifecycleState, status: &OrderStatus) {
        if let Some(metrics) = &self.metrics {
            if matches!(
                previous,
                LifecycleState::Active | LifecycleState::PartiallyMatched
            ) {
                metrics.record_order_status(status);
            }
        }
    }

    async fn lock_for(&self, lifecycle_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(lifecycle_id.to_string())
            .or_default()
            .clone()
    }

    /// Terminal lifecycles take no more writers; their lock slot goes.
    async fn release_if_terminal(&self, lifecycle: &OrderLifecycle) {
        if lifecycle.state.is_terminal() {
            self.locks.lock().await.remove(&lifecycle.lifecycle_id);
        }
    }

    /// Lifecycles currently holding a writer lock slot.
    pub async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }
}

fn order_request(lifecycle: &OrderLifecycle, user_id: UserId) -> SubmitOrderRequest {
    let params = &lifecycle.draft.request.params;
    SubmitOrderRequest {
        user_id,
        commitment: lifecycle.draft.commitment.clone(),
        token_deposited: params.token.clone(),
        amount_deposited: params.amount,
        escrow_confirmed: lifecycle.deposit_tx.is_some(),
        settlement_address: lifecycle.trader.settlement_address.clone(),
        expected_price: params.expected_price,
        expected_exchange_token: params.expected_token.clone(),
        spread_bp: params.spread_bp,
        time_limit_s: params.time_limit_s,
        transaction_id: lifecycle.deposit_tx.clone(),
    }
}

#[async_trait]
impl BatchListener for OrderLifecycleCoordinator {
    async fn batch_loaded(&self, batch: &BatchMatchResult) {
        let order_ids: Vec<String> = batch.order_ids().map(str::to_string).collect();
        if let Err(e) = self.observe_batch(&batch.batch_id, &order_ids).await {
            warn!(batch_id = %batch.batch_id, error = %e, "Failed to apply loaded batch");
        }
    }

    async fn batch_settled(&self, batch_id: &str, tx_hash: &str) {
        if let Err(e) = self.observe_settlement(batch_id, tx_hash).await {
            warn!(batch_id, error = %e, "Failed to apply settlement");
        }
    }
}
