use std::time::Duration;

use meropools_types::OrderStatus;
use prometheus::{Encoder, Registry, TextEncoder};

use crate::metrics::*;

/// Metrics collector for the MeroPools coordinator
pub struct MetricsCollector {
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Self {
        let registry = Registry::new();
        Self { registry }
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Registry) -> Self {
        Self { registry }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ORDER LIFECYCLE METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_order_opened(&self) {
        ORDERS_OPENED.inc();
    }

    /// Record a lifecycle reaching the pool
    pub fn record_order_active(&self) {
        ACTIVE_ORDERS.inc();
    }

    /// Record a lifecycle failing at `step`
    pub fn record_order_failed(&self, step: &str) {
        ORDERS_FAILED.with_label_values(&[step]).inc();
    }

    /// Record an engine status observation for a live order
    pub fn record_order_status(&self, status: &OrderStatus) {
        ORDER_STATUS_COUNT
            .with_label_values(&[status.label()])
            .inc();

        if status.is_terminal() {
            ACTIVE_ORDERS.dec();
        }
    }

    pub fn record_partial_write(&self) {
        PARTIAL_WRITES.inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ESCROW METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_deposit_confirmed(&self, latency: Duration) {
        DEPOSITS_CONFIRMED.inc();
        DEPOSIT_LATENCY.observe(latency.as_millis() as f64);
    }

    pub fn record_deposit_failed(&self, reason: &str) {
        DEPOSITS_FAILED.with_label_values(&[reason]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXECUTION CONTEXT RPC METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record one execution context call attempt
    pub fn record_rpc_call(&self, method: &str, outcome: &str, latency: Duration) {
        RPC_CALLS.with_label_values(&[method, outcome]).inc();
        RPC_LATENCY
            .with_label_values(&[method])
            .observe(latency.as_millis() as f64);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BATCH METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_batch_triggered(&self) {
        BATCHES_TRIGGERED.inc();
    }

    /// Record a batch result entering the working set
    pub fn record_batch_loaded(&self, pair_count: usize) {
        BATCHES_LOADED.inc();
        MATCHED_PAIRS.inc_by(pair_count as u64);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SETTLEMENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_settlement_submitted(&self) {
        SETTLEMENTS_SUBMITTED.inc();
    }

    pub fn record_write_back(&self, success: bool) {
        if success {
            SETTLEMENTS_WRITTEN_BACK.inc();
        } else {
            WRITE_BACK_FAILURES.inc();
        }
    }

    pub fn record_settlement_duration(&self, duration: Duration) {
        SETTLEMENT_DURATION.observe(duration.as_millis() as f64);
    }

    pub fn set_pending_settlements(&self, count: i64) {
        PENDING_SETTLEMENTS.set(count);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OPERATOR METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_cycle(&self, duration: Duration) {
        OPERATOR_CYCLES.inc();
        OPERATOR_CYCLE_DURATION.observe(duration.as_millis() as f64);
    }

    pub fn record_error(&self, error_type: &str) {
        ERRORS.with_label_values(&[error_type]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPORT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Export metrics in Prometheus text format
    ///
    /// Includes the process-wide default registry plus anything registered
    /// on this collector's own registry.
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut metric_families = prometheus::gather();
        metric_families.extend(self.registry.gather());
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingError(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingError(e.to_string()))
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics error types
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("encoding error: {0}")]
    EncodingError(String),
}
