use async_trait::async_trait;
use meropools_metrics::MetricsCollector;
use meropools_ratelimit::{retry, RetryPolicy};
use meropools_types::{
    BatchMatchResult, OperatingMode, PoolConfig, SubmitOrderRequest, UserId, UserOrder,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::envelope::{decode, decode_batch_orders, extract_order_id, normalize_list};
use crate::{CallScope, ContextError, Result, RpcTransport};

/// Engine method names.
pub mod methods {
    pub const SUBMIT_ORDER: &str = "submit_order";
    pub const CANCEL_ORDER: &str = "cancel_order";
    pub const JOIN_MATCHING_POOL: &str = "join_matching_pool";
    pub const RUN_BATCH_MATCHING: &str = "run_batch_matching";
    pub const SUBMIT_SETTLEMENT_RESULT: &str = "submit_settlement_result";
    pub const GET_USER_ORDERS: &str = "get_user_orders";
    pub const GET_BATCH_RESULT: &str = "get_batch_result";
    pub const GET_BATCH_ORDERS: &str = "get_batch_orders";
    pub const GET_MODE: &str = "get_mode";
    pub const GET_POOL_CONFIG: &str = "get_pool_config";
    pub const GET_ACTIVE_USERS: &str = "get_active_users";
    pub const GET_ACTIVE_ORDERS: &str = "get_active_orders";
    pub const ADD_USER_TO_POOL: &str = "add_user_to_pool";
}

/// Typed surface of the confidential execution engine.
#[async_trait]
pub trait ExecutionContextClient: Send + Sync {
    /// Not idempotent: callers must dedupe before re-submitting.
    async fn submit_order(&self, scope: &CallScope, request: &SubmitOrderRequest)
        -> Result<String>;

    async fn cancel_order(&self, scope: &CallScope, user_id: &UserId, order_id: &str)
        -> Result<()>;

    async fn join_matching_pool(&self, scope: &CallScope, user_id: &UserId) -> Result<()>;

    async fn run_batch_matching(&self, scope: &CallScope) -> Result<String>;

    async fn submit_settlement_result(
        &self,
        scope: &CallScope,
        batch_id: &str,
        tx_hash: &str,
    ) -> Result<()>;

    async fn get_user_orders(&self, scope: &CallScope, user_id: &UserId) -> Result<Vec<UserOrder>>;

    async fn get_batch_result(
        &self,
        scope: &CallScope,
        batch_id: &str,
    ) -> Result<Option<BatchMatchResult>>;

    async fn get_batch_orders(
        &self,
        scope: &CallScope,
        batch_id: &str,
    ) -> Result<Option<(BatchMatchResult, Vec<UserOrder>)>>;

    async fn get_mode(&self, scope: &CallScope) -> Result<OperatingMode>;

    async fn get_pool_config(&self, scope: &CallScope) -> Result<Option<PoolConfig>>;

    async fn get_active_users(&self, scope: &CallScope) -> Result<Vec<UserId>>;

    async fn get_active_orders(&self, scope: &CallScope) -> Result<Vec<UserOrder>>;

    async fn add_user_to_pool(&self, scope: &CallScope, user_id: &UserId) -> Result<()>;
}

/// [`ExecutionContextClient`] over any [`RpcTransport`].
///
/// Every call except `submit_order` is retried on transient failures.
pub struct RpcContextClient<T> {
    transport: T,
    retry: RetryPolicy,
    metrics: Option<Arc<MetricsCollector>>,
}

impl<T: RpcTransport> RpcContextClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            metrics: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn call(&self, scope: &CallScope, method: &str, args: Value) -> Result<Value> {
        retry(&self.retry, method, ContextError::is_retryable, move || {
            self.call_once(scope, method, args.clone())
        })
        .await
    }

    async fn call_once(&self, scope: &CallScope, method: &str, args: Value) -> Result<Value> {
        let started = Instant::now();
        let result = self.transport.call(scope, method, args).await;

        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(_) => "ok",
                Err(e) => e.label(),
            };
            metrics.record_rpc_call(method, outcome, started.elapsed());
        }
        debug!(method, ok = result.is_ok(), "Context call finished");
        result
    }
}

#[async_trait]
impl<T: RpcTransport> ExecutionContextClient for RpcContextClient<T> {
    async fn submit_order(
        &self,
        scope: &CallScope,
        request: &SubmitOrderRequest,
    ) -> Result<String> {
        let args = serde_json::to_value(request)?;
        let response = self.call_once(scope, methods::SUBMIT_ORDER, args).await?;
        let order_id = extract_order_id(response)?;
        info!(
            context_id = %scope.context_id,
            order_id = %order_id,
            "Order submitted"
        );
        Ok(order_id)
    }

    async fn cancel_order(
        &self,
        scope: &CallScope,
        user_id: &UserId,
        order_id: &str,
    ) -> Result<()> {
        let args = json!({ "user_id": user_id, "order_id": order_id });
        self.call(scope, methods::CANCEL_ORDER, args).await?;
        Ok(())
    }

    async fn join_matching_pool(&self, scope: &CallScope, user_id: &UserId) -> Result<()> {
        let args = json!({ "user_id": user_id });
        self.call(scope, methods::JOIN_MATCHING_POOL, args).await?;
        Ok(())
    }

    async fn run_batch_matching(&self, scope: &CallScope) -> Result<String> {
        let response = self
            .call(scope, methods::RUN_BATCH_MATCHING, json!({}))
            .await?;
        decode(response)
    }

    async fn submit_settlement_result(
        &self,
        scope: &CallScope,
        batch_id: &str,
        tx_hash: &str,
    ) -> Result<()> {
        let args = json!({ "batch_id": batch_id, "tx_hash": tx_hash });
        self.call(scope, methods::SUBMIT_SETTLEMENT_RESULT, args)
            .await?;
        Ok(())
    }

    async fn get_user_orders(&self, scope: &CallScope, user_id: &UserId) -> Result<Vec<UserOrder>> {
        let args = json!({ "user_id": user_id });
        let response = self.call(scope, methods::GET_USER_ORDERS, args).await?;
        decode::<Option<Vec<UserOrder>>>(response).map(Option::unwrap_or_default)
    }

    async fn get_batch_result(
        &self,
        scope: &CallScope,
        batch_id: &str,
    ) -> Result<Option<BatchMatchResult>> {
        let args = json!({ "batch_id": batch_id });
        let response = self.call(scope, methods::GET_BATCH_RESULT, args).await?;
        decode(response)
    }

    async fn get_batch_orders(
        &self,
        scope: &CallScope,
        batch_id: &str,
    ) -> Result<Option<(BatchMatchResult, Vec<UserOrder>)>> {
        let args = json!({ "batch_id": batch_id });
        let response = self.call(scope, methods::GET_BATCH_ORDERS, args).await?;
        decode_batch_orders(response)
    }

    async fn get_mode(&self, scope: &CallScope) -> Result<OperatingMode> {
        let response = self.call(scope, methods::GET_MODE, json!({})).await?;
        decode(response)
    }

    async fn get_pool_config(&self, scope: &CallScope) -> Result<Option<PoolConfig>> {
        let response = self
            .call(scope, methods::GET_POOL_CONFIG, json!({}))
            .await?;
        decode(response)
    }

    async fn get_active_users(&self, scope: &CallScope) -> Result<Vec<UserId>> {
        let response = self
            .call(scope, methods::GET_ACTIVE_USERS, json!({}))
            .await?;
        normalize_list(response)
    }

    async fn get_active_orders(&self, scope: &CallScope) -> Result<Vec<UserOrder>> {
        let response = self
            .call(scope, methods::GET_ACTIVE_ORDERS, json!({}))
            .await?;
        normalize_list(response)
    }

    async fn add_user_to_pool(&self, scope: &CallScope, user_id: &UserId) -> Result<()> {
        let args = json!({ "user_id": user_id });
        self.call(scope, methods::ADD_USER_TO_POOL, args).await?;
        Ok(())
    }
}
