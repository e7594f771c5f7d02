use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    // ═══════════════════════════════════════════════════════════════════════════
    // ORDER LIFECYCLE METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Lifecycles opened by the coordinator
    pub static ref ORDERS_OPENED: IntCounter = register_int_counter!(
        "meropools_orders_opened_total",
        "Total number of order lifecycles opened"
    )
    .unwrap();

    /// Lifecycles currently live in the pool
    pub static ref ACTIVE_ORDERS: IntGauge = register_int_gauge!(
        "meropools_orders_active",
        "Current number of orders active in the matching pool"
    )
    .unwrap();

    /// Lifecycle failures by the step that failed
    pub static ref ORDERS_FAILED: IntCounterVec = register_int_counter_vec!(
        "meropools_orders_failed_total",
        "Total lifecycle failures by step",
        &["step"]
    )
    .unwrap();

    /// Engine order status observations
    pub static ref ORDER_STATUS_COUNT: IntCounterVec = register_int_counter_vec!(
        "meropools_order_status_total",
        "Order status observations by status",
        &["status"]
    )
    .unwrap();

    /// Non-fatal partial writes (private context recording)
    pub static ref PARTIAL_WRITES: IntCounter = register_int_counter!(
        "meropools_partial_writes_total",
        "Total non-fatal partial write failures"
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // ESCROW METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub static ref DEPOSITS_CONFIRMED: IntCounter = register_int_counter!(
        "meropools_deposits_confirmed_total",
        "Total escrow deposits confirmed on chain"
    )
    .unwrap();

    pub static ref DEPOSITS_FAILED: IntCounterVec = register_int_counter_vec!(
        "meropools_deposits_failed_total",
        "Total escrow deposit failures by reason",
        &["reason"]
    )
    .unwrap();

    /// Deposit send-to-confirmation latency (in milliseconds)
    pub static ref DEPOSIT_LATENCY: Histogram = register_histogram!(
        "meropools_deposit_latency_ms",
        "Escrow deposit confirmation latency in milliseconds",
        vec![500.0, 1000.0, 5000.0, 10000.0, 20000.0, 30000.0, 60000.0]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // EXECUTION CONTEXT RPC METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub static ref RPC_CALLS: IntCounterVec = register_int_counter_vec!(
        "meropools_rpc_calls_total",
        "Execution context calls by method and outcome",
        &["method", "outcome"]
    )
    .unwrap();

    /// Per-method call latency (in milliseconds)
    pub static ref RPC_LATENCY: HistogramVec = register_histogram_vec!(
        "meropools_rpc_latency_ms",
        "Execution context call latency in milliseconds",
        &["method"],
        vec![10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 30000.0]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // BATCH METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub static ref BATCHES_TRIGGERED: IntCounter = register_int_counter!(
        "meropools_batches_triggered_total",
        "Total batch matching runs triggered"
    )
    .unwrap();

    pub static ref BATCHES_LOADED: IntCounter = register_int_counter!(
        "meropools_batches_loaded_total",
        "Total batch results loaded into the working set"
    )
    .unwrap();

    pub static ref MATCHED_PAIRS: IntCounter = register_int_counter!(
        "meropools_matched_pairs_total",
        "Total matched order pairs across loaded batches"
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // SETTLEMENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub static ref SETTLEMENTS_SUBMITTED: IntCounter = register_int_counter!(
        "meropools_settlements_submitted_total",
        "Total settlement transactions confirmed on chain"
    )
    .unwrap();

    pub static ref SETTLEMENTS_WRITTEN_BACK: IntCounter = register_int_counter!(
        "meropools_settlements_written_back_total",
        "Total settlement results written back to the pool context"
    )
    .unwrap();

    pub static ref WRITE_BACK_FAILURES: IntCounter = register_int_counter!(
        "meropools_write_back_failures_total",
        "Total settlement write-back failures"
    )
    .unwrap();

    pub static ref PENDING_SETTLEMENTS: IntGauge = register_int_gauge!(
        "meropools_settlements_pending",
        "Current number of settlements awaiting completion"
    )
    .unwrap();

    /// Settlement duration from submission to write-back (in milliseconds)
    pub static ref SETTLEMENT_DURATION: Histogram = register_histogram!(
        "meropools_settlement_duration_ms",
        "Settlement duration in milliseconds",
        vec![1000.0, 5000.0, 10000.0, 30000.0, 60000.0, 120000.0]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // OPERATOR METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub static ref OPERATOR_CYCLES: IntCounter = register_int_counter!(
        "meropools_operator_cycles_total",
        "Total pool operator cycles run"
    )
    .unwrap();

    pub static ref OPERATOR_CYCLE_DURATION: Histogram = register_histogram!(
        "meropools_operator_cycle_duration_ms",
        "Pool operator cycle duration in milliseconds",
        vec![100.0, 500.0, 1000.0, 5000.0, 10000.0, 30000.0]
    )
    .unwrap();

    /// Error events seen by the tracing layer, by `error_type` field
    pub static ref ERRORS: IntCounterVec = register_int_counter_vec!(
        "meropools_errors_total",
        "Error events by type",
        &["error_type"]
    )
    .unwrap();
}
