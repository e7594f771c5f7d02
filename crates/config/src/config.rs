//! Core configuration structures for the MeroPools coordinator

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Confidential execution node
    pub context_node: ContextNodeConfig,

    /// Settlement chain and escrow contract
    pub settlement_chain: SettlementChainConfig,

    /// Matching pool operation
    #[serde(default)]
    pub pool: PoolSettings,

    /// Local persistence
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Network environment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Environment type (mainnet, testnet, local)
    #[serde(default = "default_environment")]
    pub environment: Environment,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output (pretty, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Enable metrics collection
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Metrics server port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Environment types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Mainnet,
    Testnet,
    Local,
}

/// Execution node the coordinator talks to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextNodeConfig {
    /// Node base URL
    pub node_url: String,

    /// Matching pool context
    pub context_id: String,

    /// Operator identity, a member of the pool context
    pub operator_identity: String,

    /// Application the contexts run
    pub application_id: String,

    /// Bearer token for the node API
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Attempts per call, transient failures only
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,

    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

impl ContextNodeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_initial(&self) -> Duration {
        Duration::from_millis(self.retry_initial_ms)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_millis(self.retry_max_ms)
    }
}

/// Settlement chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementChainConfig {
    /// Thor node REST URL
    pub rpc_url: String,

    /// Escrow contract address
    pub escrow_contract: String,

    /// Signing service clauses are posted to
    pub signer_url: String,

    /// Receipt checks before a transaction counts as unconfirmed
    #[serde(default = "default_receipt_poll_attempts")]
    pub receipt_poll_attempts: u32,

    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Token contracts by symbol, added to the built-in registry
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

impl SettlementChainConfig {
    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Pool operator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Seconds between operator cycles. Unset follows the batch frequency
    /// the pool publishes in its configuration.
    #[serde(default)]
    pub batch_frequency_seconds: Option<u64>,

    /// Active orders required before matching runs
    #[serde(default = "default_min_orders_for_matching")]
    pub min_orders_for_matching: usize,
}

impl PoolSettings {
    /// Interval between operator cycles for a pool that publishes
    /// `advertised_seconds`.
    pub fn cycle_interval(&self, advertised_seconds: u64) -> Duration {
        Duration::from_secs(self.batch_frequency_seconds.unwrap_or(advertised_seconds))
    }
}

/// Local persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database of in-flight settlements
    #[serde(default = "default_settlement_db")]
    pub settlement_db: PathBuf,

    /// File holding the default private context record
    #[serde(default = "default_context_path")]
    pub default_context_path: PathBuf,
}

// Default value functions
fn default_environment() -> Environment {
    Environment::Local
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_initial_ms() -> u64 {
    200
}

fn default_retry_max_ms() -> u64 {
    5000
}

fn default_receipt_poll_attempts() -> u32 {
    30
}

fn default_receipt_poll_interval_ms() -> u64 {
    2000
}

fn default_min_orders_for_matching() -> usize {
    2
}

fn default_settlement_db() -> PathBuf {
    PathBuf::from("data/settlements.db")
}

fn default_context_path() -> PathBuf {
    PathBuf::from("data/default_context.json")
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_enabled: default_true(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ContextNodeConfig {
    fn default() -> Self {
        Self {
            node_url: String::new(),
            context_id: String::new(),
            operator_identity: String::new(),
            application_id: String::new(),
            auth_token: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

impl Default for SettlementChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            escrow_contract: String::new(),
            signer_url: String::new(),
            receipt_poll_attempts: default_receipt_poll_attempts(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            timeout_ms: default_timeout_ms(),
            tokens: HashMap::new(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            batch_frequency_seconds: None,
            min_orders_for_matching: default_min_orders_for_matching(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            settlement_db: default_settlement_db(),
            default_context_path: default_context_path(),
        }
    }
}
