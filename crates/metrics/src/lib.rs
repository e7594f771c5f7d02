//! Metrics and monitoring for the MeroPools coordinator
//!
//! # Features
//!
//! - Prometheus metrics for order lifecycles, escrow deposits, execution
//!   context calls, batches and settlements
//! - HTTP endpoint for metrics scraping
//! - Tracing initialisation (JSON or pretty) with error-event counting
//! - Correlation IDs for operator cycles
//!
//! # Example
//!
//! ```no_run
//! use meropools_metrics::{MetricsCollector, MetricsServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let collector = Arc::new(MetricsCollector::new());
//!     collector.record_order_opened();
//!
//!     let server = MetricsServer::new(collector.clone(), "0.0.0.0:9090".to_string());
//!     server.serve().await.unwrap();
//! }
//! ```

pub mod collector;
pub mod http;
pub mod metrics;
pub mod tracing;

pub use collector::{MetricsCollector, MetricsError};
pub use http::{router, MetricsServer, MetricsServerError};
pub use tracing::{
    default_filter, init_tracing, CorrelationId, CycleSpan, LogFormat,
    MetricsLayer, TracingError,
};
