//! Configuration validation

use crate::{AppConfig, ConfigError, Result};

/// Validation error details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the entire application configuration, reporting every problem
/// at once.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let errors = collect_errors(config);
    if errors.is_empty() {
        return Ok(());
    }

    let error_msg = errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    Err(ConfigError::ValidationError(error_msg))
}

/// Every validation failure in `config`.
pub fn collect_errors(config: &AppConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Network
    if let Err(e) = validate_log_level(&config.network.log_level) {
        errors.push(e);
    }

    if !matches!(config.network.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "network.log_format",
            format!(
                "invalid log format '{}', must be pretty or json",
                config.network.log_format
            ),
        ));
    }

    if config.network.metrics_enabled && config.network.metrics_port == 0 {
        errors.push(ValidationError::new(
            "network.metrics_port",
            "metrics port must be greater than 0",
        ));
    }

    // Context node
    let node = &config.context_node;
    if let Err(e) = validate_url(&node.node_url) {
        errors.push(ValidationError::new("context_node.node_url", e));
    }

    for (field, value) in [
        ("context_node.context_id", &node.context_id),
        ("context_node.operator_identity", &node.operator_identity),
        ("context_node.application_id", &node.application_id),
    ] {
        if value.is_empty() {
            errors.push(ValidationError::new(field, "is required"));
        }
    }

    if node.timeout_ms == 0 {
        errors.push(ValidationError::new(
            "context_node.timeout_ms",
            "must be greater than 0",
        ));
    }

    if node.max_retries == 0 {
        errors.push(ValidationError::new(
            "context_node.max_retries",
            "must be at least 1",
        ));
    }

    if node.retry_initial_ms > node.retry_max_ms {
        errors.push(ValidationError::new(
            "context_node.retry_initial_ms",
            "must not exceed retry_max_ms",
        ));
    }

    // Settlement chain
    let chain = &config.settlement_chain;
    if let Err(e) = validate_url(&chain.rpc_url) {
        errors.push(ValidationError::new("settlement_chain.rpc_url", e));
    }

    if let Err(e) = validate_url(&chain.signer_url) {
        errors.push(ValidationError::new("settlement_chain.signer_url", e));
    }

    if !meropools_types::is_address(&chain.escrow_contract) {
        errors.push(ValidationError::new(
            "settlement_chain.escrow_contract",
            "must be a 0x-prefixed 20-byte address",
        ));
    }

    if chain.receipt_poll_attempts == 0 {
        errors.push(ValidationError::new(
            "settlement_chain.receipt_poll_attempts",
            "must be greater than 0",
        ));
    }

    if chain.timeout_ms == 0 {
        errors.push(ValidationError::new(
            "settlement_chain.timeout_ms",
            "must be greater than 0",
        ));
    }

    for (symbol, address) in &chain.tokens {
        if !meropools_types::is_address(address) {
            errors.push(ValidationError::new(
                format!("settlement_chain.tokens.{symbol}"),
                format!("invalid token address '{address}'"),
            ));
        }
    }

    // Pool
    if config.pool.batch_frequency_seconds == Some(0) {
        errors.push(ValidationError::new(
            "pool.batch_frequency_seconds",
            "must be greater than 0",
        ));
    }

    if config.pool.min_orders_for_matching < 2 {
        errors.push(ValidationError::new(
            "pool.min_orders_for_matching",
            "at least 2 orders are needed to match",
        ));
    }

    // Storage
    if config.storage.settlement_db.as_os_str().is_empty() {
        errors.push(ValidationError::new(
            "storage.settlement_db",
            "path is required",
        ));
    }

    if config.storage.default_context_path.as_os_str().is_empty() {
        errors.push(ValidationError::new(
            "storage.default_context_path",
            "path is required",
        ));
    }

    errors
}

/// Validate a URL
pub fn validate_url(url: &str) -> std::result::Result<(), String> {
    if url.is_empty() {
        return Err("URL cannot be empty".to_string());
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err("URL must start with http:// or https://".to_string());
    }

    Ok(())
}

fn validate_log_level(level: &str) -> std::result::Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::new(
            "network.log_level",
            format!(
                "invalid log level '{level}', must be one of: trace, debug, info, warn, error"
            ),
        )),
    }
}
