//! In-process execution engine.
//!
//! Mirrors the observable behaviour of the confidential engine closely enough
//! to drive the client, the provisioning service and the pool operator
//! without a node: order and batch numbering, pool limits, owner-only
//! cancellation, pairing of escrow-confirmed orders and settlement write-back.
//! Failures and response envelopes can be injected per method.

use async_trait::async_trait;
use cosmwasm_std::Uint128;
use meropools_types::{
    now_ns, BatchMatchResult, Nullifier, OperatingMode, OrderStatus, PoolConfig,
    SubmitOrderRequest, UserId, UserOrder,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::client::methods;
use crate::{
    CallScope, ContextError, ContextInfo, ContextInit, ContextMembership, Identity, NodeAdmin,
    Result, RpcTransport,
};

/// How successful responses are wrapped before they are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeStyle {
    Bare,
    Result,
    #[default]
    Output,
    ResultOutput,
}

impl EnvelopeStyle {
    fn wrap(self, value: Value) -> Value {
        match self {
            EnvelopeStyle::Bare => value,
            EnvelopeStyle::Result => json!({ "result": value }),
            EnvelopeStyle::Output => json!({ "output": value }),
            EnvelopeStyle::ResultOutput => json!({ "result": { "output": value } }),
        }
    }
}

struct EngineContext {
    application_id: String,
    name: Option<String>,
    is_private: bool,
    mode: OperatingMode,
    pool_config: Option<PoolConfig>,
    members: HashSet<String>,
    /// Keyed by order number so iteration follows submission order
    orders: BTreeMap<u64, UserOrder>,
    order_index: HashMap<String, u64>,
    user_orders: HashMap<String, Vec<String>>,
    order_counter: u64,
    batch_counter: u64,
    batches: HashMap<String, BatchMatchResult>,
    settlements: HashMap<String, String>,
    active_users: Vec<UserId>,
}

impl EngineContext {
    fn new(application_id: &str, mode: OperatingMode, pool_config: Option<PoolConfig>) -> Self {
        Self {
            application_id: application_id.to_string(),
            name: None,
            is_private: false,
            mode,
            pool_config,
            members: HashSet::new(),
            orders: BTreeMap::new(),
            order_index: HashMap::new(),
            user_orders: HashMap::new(),
            order_counter: 0,
            batch_counter: 0,
            batches: HashMap::new(),
            settlements: HashMap::new(),
            active_users: Vec::new(),
        }
    }

    fn info(&self, context_id: &str) -> ContextInfo {
        let first_member = self.members.iter().min().cloned();
        ContextInfo {
            context_id: context_id.to_string(),
            application_id: self.application_id.clone(),
            member_public_key: first_member.clone(),
            executor_id: first_member,
            context_name: self.name.clone(),
            is_private: Some(self.is_private),
        }
    }

    fn order_mut(&mut self, order_id: &str) -> Option<&mut UserOrder> {
        let key = self.order_index.get(order_id)?;
        self.orders.get_mut(key)
    }

    fn require_pool(&self, message: &str) -> Result<()> {
        if self.mode == OperatingMode::MatchingPool {
            Ok(())
        } else {
            Err(ContextError::Rejected(message.to_string()))
        }
    }

    fn join(&mut self, user_id: UserId) {
        if !self.active_users.contains(&user_id) {
            debug!(user_id = %user_id, "User joined matching pool");
            self.active_users.push(user_id);
        }
    }

    fn submit_order(&mut self, request: SubmitOrderRequest) -> Result<String> {
        if request.amount_deposited.is_zero() {
            return Err(ContextError::Rejected("Amount must be > 0".to_string()));
        }

        if self.mode == OperatingMode::MatchingPool {
            if let Some(config) = &self.pool_config {
                if !config.accepts_amount(request.amount_deposited) {
                    return Err(ContextError::Rejected(
                        "Order amount outside pool limits".to_string(),
                    ));
                }
                if !config.supports_token(&request.token_deposited) {
                    return Err(ContextError::Rejected(
                        "Token not supported by this pool".to_string(),
                    ));
                }
            }
            self.join(request.user_id.clone());
        }

        self.order_counter += 1;
        let order_id = format!("order_{}", self.order_counter);
        let now = now_ns();
        let user = request.user_id.clone();

        let order = UserOrder {
            id: order_id.clone(),
            order_context_id: format!("trade_ctx_{}_{}", user, order_id),
            user_context_id: user.to_string(),
            user_id: request.user_id,
            commitment: request.commitment,
            token_deposited: request.token_deposited,
            amount_deposited: request.amount_deposited,
            escrow_confirmed: request.escrow_confirmed,
            settlement_address: request.settlement_address,
            expected_price: request.expected_price,
            expected_exchange_token: request.expected_exchange_token,
            spread_bp: request.spread_bp,
            time_limit_s: request.time_limit_s,
            status: OrderStatus::Active,
            matched: false,
            settlement_tx: None,
            transaction_id: request.transaction_id,
            created_at: now,
            updated_at: now,
        };

        self.orders.insert(self.order_counter, order);
        self.order_index
            .insert(order_id.clone(), self.order_counter);
        self.user_orders
            .entry(user.to_string())
            .or_default()
            .push(order_id.clone());

        Ok(order_id)
    }

    fn cancel_order(&mut self, user_id: &UserId, order_id: &str) -> Result<()> {
        let order = self
            .order_mut(order_id)
            .ok_or_else(|| ContextError::Rejected("Order not found".to_string()))?;
        if &order.user_id != user_id {
            return Err(ContextError::Rejected("Not order owner".to_string()));
        }
        if order.status != OrderStatus::Active {
            return Err(ContextError::Rejected("Order not active".to_string()));
        }
        order.status = OrderStatus::Cancelled;
        order.updated_at = now_ns();
        Ok(())
    }

    fn matchable(&self) -> Vec<&UserOrder> {
        self.orders
            .values()
            .filter(|o| o.status == OrderStatus::Active && o.escrow_confirmed)
            .collect()
    }

    fn run_batch_matching(&mut self) -> Result<String> {
        self.require_pool("Batch matching only available in matching pools")?;

        self.batch_counter += 1;
        let batch_id = format!("batch_{}", self.batch_counter);

        let candidates = self.matchable();
        let mut matched_orders = Vec::new();
        let mut total_volume = Uint128::zero();
        let mut clearing_price = Uint128::zero();
        let mut nullifiers = Vec::new();

        for pair in candidates.chunks_exact(2) {
            let (a, b) = (pair[0], pair[1]);
            if matched_orders.is_empty() {
                clearing_price = clearing_price_for(a, b);
            }
            matched_orders.push((a.id.clone(), b.id.clone()));
            total_volume += a.amount_deposited.min(b.amount_deposited);
            nullifiers.push(nullifier_for(a, &batch_id));
            nullifiers.push(nullifier_for(b, &batch_id));
        }

        let now = now_ns();
        for (a, b) in &matched_orders {
            for id in [a, b] {
                if let Some(order) = self.order_mut(id) {
                    order.status = OrderStatus::FullyMatched;
                    order.matched = true;
                    order.updated_at = now;
                }
            }
        }

        debug!(batch_id = %batch_id, pairs = matched_orders.len(), "Batch matched");
        self.batches.insert(
            batch_id.clone(),
            BatchMatchResult {
                batch_id: batch_id.clone(),
                matched_orders,
                clearing_price,
                total_volume,
                nullifiers,
                timestamp: now,
            },
        );
        Ok(batch_id)
    }

    fn submit_settlement_result(&mut self, batch_id: &str, tx_hash: &str) -> Result<()> {
        self.require_pool("Operation only valid in matching pools")?;

        let ids: Vec<String> = self
            .batches
            .get(batch_id)
            .map(|b| b.order_ids().map(str::to_string).collect())
            .unwrap_or_default();

        let now = now_ns();
        for id in ids {
            if let Some(order) = self.order_mut(&id) {
                order.settlement_tx = Some(tx_hash.to_string());
                order.status = OrderStatus::FullyMatched;
                order.updated_at = now;
            }
        }
        self.settlements
            .insert(batch_id.to_string(), tx_hash.to_string());
        Ok(())
    }

    fn batch_orders(&self, batch_id: &str) -> Option<(BatchMatchResult, Vec<UserOrder>)> {
        let batch = self.batches.get(batch_id)?;
        let orders = batch
            .order_ids()
            .filter_map(|id| self.order_index.get(id))
            .filter_map(|key| self.orders.get(key))
            .cloned()
            .collect();
        Some((batch.clone(), orders))
    }

    fn user_orders(&self, user_id: &UserId) -> Vec<UserOrder> {
        self.user_orders
            .get(user_id.as_str())
            .into_iter()
            .flatten()
            .filter_map(|id| self.order_index.get(id))
            .filter_map(|key| self.orders.get(key))
            .cloned()
            .collect()
    }
}

fn clearing_price_for(a: &UserOrder, b: &UserOrder) -> Uint128 {
    if !a.expected_price.is_zero() && !b.expected_price.is_zero() {
        (a.expected_price + b.expected_price) / Uint128::new(2)
    } else {
        a.expected_price.max(b.expected_price)
    }
}

fn nullifier_for(order: &UserOrder, batch_id: &str) -> Nullifier {
    let mut hasher = Sha256::new();
    hasher.update(order.commitment.nullifier_seed);
    hasher.update(batch_id.as_bytes());
    Nullifier::from_bytes(&hasher.finalize())
}

#[derive(Debug, Deserialize)]
struct UserArgs {
    user_id: UserId,
}

#[derive(Debug, Deserialize)]
struct CancelArgs {
    user_id: UserId,
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct BatchArgs {
    batch_id: String,
}

#[derive(Debug, Deserialize)]
struct SettlementArgs {
    batch_id: String,
    tx_hash: String,
}

fn parse<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| ContextError::Rejected(format!("invalid arguments: {e}")))
}

#[derive(Default)]
struct EngineState {
    contexts: HashMap<String, EngineContext>,
    identities: HashSet<String>,
    invitations: HashMap<String, (String, String)>,
    identity_counter: u64,
    context_counter: u64,
    invitation_counter: u64,
    failures: HashMap<String, VecDeque<ContextError>>,
    envelopes: HashMap<String, Value>,
    envelope_style: EnvelopeStyle,
    calls: Vec<(String, String)>,
    admin_latency: Duration,
}

impl EngineState {
    fn next_key(&mut self, kind: &str) -> String {
        let counter = match kind {
            "identity" => {
                self.identity_counter += 1;
                self.identity_counter
            }
            _ => {
                self.context_counter += 1;
                self.context_counter
            }
        };
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update(counter.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    fn record_call(&mut self, target: &str, operation: &str) -> Result<()> {
        self.calls.push((target.to_string(), operation.to_string()));
        match self.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn context_mut(&mut self, context_id: &str) -> Result<&mut EngineContext> {
        self.contexts
            .get_mut(context_id)
            .ok_or_else(|| ContextError::Rejected(format!("context not found: {context_id}")))
    }
}

/// In-process engine implementing [`RpcTransport`] and [`NodeAdmin`].
#[derive(Default)]
pub struct InMemoryEngine {
    state: Mutex<EngineState>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a matching pool context with an operator identity as its first
    /// member. Returns `(context_id, operator_identity)`.
    pub async fn create_pool(&self, application_id: &str, config: PoolConfig) -> (String, String) {
        let mut state = self.state.lock().await;
        let context_id = state.next_key("context");
        let operator = state.next_key("identity");
        state.identities.insert(operator.clone());

        let mut context =
            EngineContext::new(application_id, OperatingMode::MatchingPool, Some(config));
        context.members.insert(operator.clone());
        state.contexts.insert(context_id.clone(), context);
        (context_id, operator)
    }

    /// Queue `times` failures for `operation` (an engine method or admin
    /// operation name).
    pub async fn fail_next(&self, operation: &str, times: usize, error: ContextError) {
        let mut state = self.state.lock().await;
        let queue = state.failures.entry(operation.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    pub async fn set_envelope_style(&self, style: EnvelopeStyle) {
        self.state.lock().await.envelope_style = style;
    }

    /// Answer every `method` call with `response` verbatim.
    pub async fn override_response(&self, method: &str, response: Value) {
        self.state
            .lock()
            .await
            .envelopes
            .insert(method.to_string(), response);
    }

    /// Delay applied to admin operations, to widen race windows in tests.
    pub async fn set_admin_latency(&self, latency: Duration) {
        self.state.lock().await.admin_latency = latency;
    }

    /// Drop a context from the node, as if it had been deleted.
    pub async fn remove_context(&self, context_id: &str) {
        self.state.lock().await.contexts.remove(context_id);
    }

    pub async fn set_order_status(&self, context_id: &str, order_id: &str, status: OrderStatus) {
        let mut state = self.state.lock().await;
        if let Some(order) = state
            .contexts
            .get_mut(context_id)
            .and_then(|c| c.order_mut(order_id))
        {
            order.status = status;
            order.updated_at = now_ns();
        }
    }

    pub async fn order(&self, context_id: &str, order_id: &str) -> Option<UserOrder> {
        let mut state = self.state.lock().await;
        state
            .contexts
            .get_mut(context_id)
            .and_then(|c| c.order_mut(order_id))
            .map(|o| o.clone())
    }

    pub async fn settlement_for(&self, context_id: &str, batch_id: &str) -> Option<String> {
        let state = self.state.lock().await;
        state
            .contexts
            .get(context_id)
            .and_then(|c| c.settlements.get(batch_id).cloned())
    }

    pub async fn is_member(&self, context_id: &str, identity: &str) -> bool {
        let state = self.state.lock().await;
        state
            .contexts
            .get(context_id)
            .is_some_and(|c| c.members.contains(identity))
    }

    /// Number of calls made for `operation` across all contexts.
    pub async fn call_count(&self, operation: &str) -> usize {
        let state = self.state.lock().await;
        state.calls.iter().filter(|(_, op)| op == operation).count()
    }

    /// Calls made for `operation` against `target` (a context id or `node`).
    pub async fn calls_to(&self, target: &str, operation: &str) -> usize {
        let state = self.state.lock().await;
        state
            .calls
            .iter()
            .filter(|(t, op)| t == target && op == operation)
            .count()
    }

    async fn admin_pause(&self) {
        let latency = self.state.lock().await.admin_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn dispatch(context: &mut EngineContext, method: &str, args: Value) -> Result<Value> {
        let value = match method {
            methods::SUBMIT_ORDER => json!(context.submit_order(parse(args)?)?),
            methods::CANCEL_ORDER => {
                let args: CancelArgs = parse(args)?;
                context.cancel_order(&args.user_id, &args.order_id)?;
                Value::Null
            }
            methods::JOIN_MATCHING_POOL | methods::ADD_USER_TO_POOL => {
                let args: UserArgs = parse(args)?;
                context.require_pool("Can only join matching pools")?;
                context.join(args.user_id);
                Value::Null
            }
            methods::RUN_BATCH_MATCHING => json!(context.run_batch_matching()?),
            methods::SUBMIT_SETTLEMENT_RESULT => {
                let args: SettlementArgs = parse(args)?;
                context.submit_settlement_result(&args.batch_id, &args.tx_hash)?;
                Value::Null
            }
            methods::GET_USER_ORDERS => {
                let args: UserArgs = parse(args)?;
                serde_json::to_value(context.user_orders(&args.user_id))?
            }
            methods::GET_BATCH_RESULT => {
                let args: BatchArgs = parse(args)?;
                serde_json::to_value(context.batches.get(&args.batch_id))?
            }
            methods::GET_BATCH_ORDERS => {
                let args: BatchArgs = parse(args)?;
                serde_json::to_value(context.batch_orders(&args.batch_id))?
            }
            methods::GET_MODE => serde_json::to_value(context.mode)?,
            methods::GET_POOL_CONFIG => serde_json::to_value(&context.pool_config)?,
            methods::GET_ACTIVE_USERS => serde_json::to_value(&context.active_users)?,
            methods::GET_ACTIVE_ORDERS => serde_json::to_value(context.matchable())?,
            other => {
                return Err(ContextError::Rejected(format!("unknown method: {other}")));
            }
        };
        Ok(value)
    }
}

#[async_trait]
impl RpcTransport for InMemoryEngine {
    async fn call(&self, scope: &CallScope, method: &str, args: Value) -> Result<Value> {
        let mut state = self.state.lock().await;
        state.record_call(&scope.context_id, method)?;

        if let Some(response) = state.envelopes.get(method) {
            return Ok(response.clone());
        }
        let style = state.envelope_style;

        let context = state.context_mut(&scope.context_id)?;
        if !context.members.contains(&scope.executor_public_key) {
            return Err(ContextError::Rejected(format!(
                "executor {} is not a member of context {}",
                scope.executor_public_key, scope.context_id
            )));
        }

        let value = Self::dispatch(context, method, args)?;
        Ok(style.wrap(value))
    }
}

#[async_trait]
impl NodeAdmin for InMemoryEngine {
    async fn create_identity(&self) -> Result<Identity> {
        self.admin_pause().await;
        let mut state = self.state.lock().await;
        state.record_call("node", "create_identity")?;
        let public_key = state.next_key("identity");
        state.identities.insert(public_key.clone());
        Ok(Identity { public_key })
    }

    async fn invite_to_context(
        &self,
        context_id: &str,
        inviter: &str,
        invitee: &str,
    ) -> Result<String> {
        self.admin_pause().await;
        let mut state = self.state.lock().await;
        state.record_call(context_id, "invite_to_context")?;

        if !state.identities.contains(invitee) {
            return Err(ContextError::Rejected(format!("unknown identity: {invitee}")));
        }
        let context = state.context_mut(context_id)?;
        if !context.members.contains(inviter) {
            return Err(ContextError::Rejected(format!(
                "inviter {inviter} is not a member of context {context_id}"
            )));
        }

        state.invitation_counter += 1;
        let payload = format!("invitation_{}_{}", state.invitation_counter, invitee);
        state
            .invitations
            .insert(payload.clone(), (context_id.to_string(), invitee.to_string()));
        Ok(payload)
    }

    async fn join_context(&self, invitation_payload: &str) -> Result<ContextMembership> {
        self.admin_pause().await;
        let mut state = self.state.lock().await;
        state.record_call("node", "join_context")?;

        let (context_id, invitee) = state
            .invitations
            .get(invitation_payload)
            .cloned()
            .ok_or_else(|| ContextError::Rejected("invalid invitation payload".to_string()))?;

        state
            .context_mut(&context_id)?
            .members
            .insert(invitee.clone());

        Ok(ContextMembership {
            context_id,
            member_public_key: invitee,
        })
    }

    async fn create_context(
        &self,
        application_id: &str,
        init: &ContextInit,
    ) -> Result<ContextMembership> {
        self.admin_pause().await;
        let mut state = self.state.lock().await;
        state.record_call("node", "create_context")?;

        let context_id = state.next_key("context");
        let member = state.next_key("identity");
        state.identities.insert(member.clone());

        let mode = if init.is_private {
            OperatingMode::UserPrivate
        } else {
            OperatingMode::MatchingPool
        };
        let mut context = EngineContext::new(application_id, mode, None);
        context.name = Some(init.context_name.clone());
        context.is_private = init.is_private;
        context.members.insert(member.clone());
        state.contexts.insert(context_id.clone(), context);

        Ok(ContextMembership {
            context_id,
            member_public_key: member,
        })
    }

    async fn get_context(&self, context_id: &str) -> Result<Option<ContextInfo>> {
        let mut state = self.state.lock().await;
        state.record_call("node", "get_context")?;
        Ok(state.contexts.get(context_id).map(|c| c.info(context_id)))
    }

    async fn list_contexts(&self) -> Result<Vec<ContextInfo>> {
        let mut state = self.state.lock().await;
        state.record_call("node", "list_contexts")?;
        let mut contexts: Vec<ContextInfo> = state
            .contexts
            .iter()
            .map(|(id, c)| c.info(id))
            .collect();
        contexts.sort_by(|a, b| a.context_id.cmp(&b.context_id));
        Ok(contexts)
    }
}
