//! Wiring of the operator components from configuration

use anyhow::{Context, Result};
use meropools_config::AppConfig;
use meropools_context::{
    CallScope, DefaultContextService, ExecutionContextClient, FileRecordStore, HttpNodeAdmin,
    HttpTransport, ProvisioningConfig, RpcContextClient,
};
use meropools_escrow::{ConfirmationConfig, EscrowAdapter, RemoteSigner, ThorClient};
use meropools_metrics::MetricsCollector;
use meropools_orchestrator::{BatchReconciler, PoolOperator, PoolTarget};
use meropools_ratelimit::RetryPolicy;
use meropools_settlement::{SettlementSubmitter, SqliteStore};
use meropools_types::TokenRegistry;
use std::sync::Arc;
use tracing::info;

pub struct App {
    pub config: AppConfig,
    pub metrics: Arc<MetricsCollector>,
    /// Pool as published by the node, fetched once at startup
    pub pool: PoolTarget,
    pub operator: PoolOperator,
    pub contexts: DefaultContextService,
}

impl App {
    pub async fn build(config: AppConfig, metrics: Arc<MetricsCollector>) -> Result<Self> {
        let node = &config.context_node;

        let mut transport = HttpTransport::with_timeout(&node.node_url, node.timeout())
            .context("failed to build node transport")?;
        let mut admin = HttpNodeAdmin::with_timeout(&node.node_url, node.timeout())
            .context("failed to build node admin client")?;
        if let Some(token) = &node.auth_token {
            transport = transport.with_auth_token(token);
            admin = admin.with_auth_token(token);
        }

        let client: Arc<dyn ExecutionContextClient> = Arc::new(
            RpcContextClient::new(transport)
                .with_retry(RetryPolicy::new(
                    node.max_retries,
                    node.retry_initial(),
                    node.retry_max(),
                ))
                .with_metrics(metrics.clone()),
        );
        let pool = PoolTarget::discover(
            client.as_ref(),
            &CallScope::new(&node.context_id, &node.operator_identity),
        )
        .await
        .with_context(|| format!("failed to discover matching pool {}", node.context_id))?;
        let scope = pool.operator_scope();

        let chain_config = &config.settlement_chain;
        let signer = RemoteSigner::new(&chain_config.signer_url, chain_config.timeout())
            .context("failed to build signer client")?;
        let chain = ThorClient::new(
            &chain_config.rpc_url,
            &chain_config.escrow_contract,
            Arc::new(signer),
            chain_config.timeout(),
        )
        .context("failed to build settlement chain client")?;
        let escrow = Arc::new(
            EscrowAdapter::new(Arc::new(chain), &chain_config.escrow_contract).with_confirmation(
                ConfirmationConfig {
                    attempts: chain_config.receipt_poll_attempts,
                    interval: chain_config.receipt_poll_interval(),
                },
            ),
        );

        let store = SqliteStore::new(&config.storage.settlement_db)
            .await
            .with_context(|| {
                format!(
                    "failed to open settlement store at {}",
                    config.storage.settlement_db.display()
                )
            })?;

        let submitter = Arc::new(
            SettlementSubmitter::new(
                escrow,
                client.clone(),
                scope.clone(),
                token_registry(&config)?,
                Arc::new(store),
            )
            .with_metrics(metrics.clone()),
        );
        let reconciler = Arc::new(
            BatchReconciler::new(client, scope)
                .with_min_orders(config.pool.min_orders_for_matching)
                .with_metrics(metrics.clone()),
        );
        let operator = PoolOperator::new(reconciler, submitter).with_metrics(metrics.clone());

        let contexts = DefaultContextService::new(
            Arc::new(admin),
            Arc::new(FileRecordStore::new(&config.storage.default_context_path)),
            ProvisioningConfig::new(&node.application_id),
        );

        info!(
            context_id = %node.context_id,
            pool = %pool.config.pool_name,
            escrow = %chain_config.escrow_contract,
            "Operator components ready"
        );
        Ok(Self {
            config,
            metrics,
            pool,
            operator,
            contexts,
        })
    }
}

/// Built-in tokens plus configured ones. Symbols are upper-cased since the
/// environment layer lower-cases keys.
pub fn token_registry(config: &AppConfig) -> Result<TokenRegistry> {
    let mut tokens = TokenRegistry::testnet();
    for (symbol, address) in &config.settlement_chain.tokens {
        tokens
            .register(symbol.to_uppercase(), address)
            .with_context(|| format!("invalid token {symbol}"))?;
    }
    Ok(tokens)
}
