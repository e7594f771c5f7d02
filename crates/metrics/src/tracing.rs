use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{field::Visit, Event, Level, Subscriber};
use tracing_subscriber::{
    fmt,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::collector::MetricsCollector;

/// Output format for the fmt layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = TracingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(TracingError::UnknownFormat(other.to_string())),
        }
    }
}

/// Default filter directives for a base level
///
/// `RUST_LOG` takes precedence when set.
pub fn default_filter(level: &str) -> String {
    format!("{level},meropools=debug")
}

/// Initialize tracing with metrics integration
pub fn init_tracing(
    level: &str,
    format: LogFormat,
    collector: Arc<MetricsCollector>,
) -> Result<(), TracingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(level)))
        .map_err(|e| TracingError::InitError(e.to_string()))?;

    let (json_layer, pretty_layer) = match format {
        LogFormat::Json => (
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .json(),
            ),
            None,
        ),
        LogFormat::Pretty => (
            None,
            Some(fmt::layer().with_target(true).with_level(true).pretty()),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .with(MetricsLayer::new(collector))
        .try_init()
        .map_err(|e| TracingError::InitError(e.to_string()))?;

    Ok(())
}

/// Tracing layer that counts error events by their `error_type` field
pub struct MetricsLayer {
    collector: Arc<MetricsCollector>,
}

impl MetricsLayer {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }
}

impl<S> Layer<S> for MetricsLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }

        let mut visitor = ErrorTypeVisitor::default();
        event.record(&mut visitor);
        let error_type = visitor.error_type.as_deref().unwrap_or("unclassified");
        self.collector.record_error(error_type);
    }
}

#[derive(Default)]
struct ErrorTypeVisitor {
    error_type: Option<String>,
}

impl Visit for ErrorTypeVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "error_type" {
            self.error_type = Some(format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "error_type" {
            self.error_type = Some(value.to_string());
        }
    }
}

/// Correlation ID for tracking one operator cycle across components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(uuid::Uuid);

impl CorrelationId {
    /// Generate a new correlation ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the correlation ID as a string
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Span context for one pool operator cycle
#[derive(Debug, Clone)]
pub struct CycleSpan {
    pub correlation_id: CorrelationId,
    pub context_id: String,
    pub cycle: u64,
}

impl CycleSpan {
    pub fn new(context_id: impl Into<String>, cycle: u64) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            context_id: context_id.into(),
            cycle,
        }
    }

    /// Tracing span for this cycle, for use with `Instrument`
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "operator_cycle",
            correlation_id = %self.correlation_id,
            context_id = %self.context_id,
            cycle = self.cycle,
        )
    }
}

/// Tracing error types
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("tracing initialization error: {0}")]
    InitError(String),
    #[error("unknown log format: {0}")]
    UnknownFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_generation() {
        let id1 = CorrelationId::new();
        let id2 = CorrelationId::new();

        assert_ne!(id1, id2);
        assert!(id1.as_str().len() == 36);
    }

    #[test]
    fn test_cycle_span_creation() {
        let span = CycleSpan::new("ctx", 7);

        assert_eq!(span.context_id, "ctx");
        assert_eq!(span.cycle, 7);
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter("info"), "info,meropools=debug");
    }

    #[test]
    fn test_error_events_counted_by_type() {
        let collector = Arc::new(MetricsCollector::new());
        let subscriber = tracing_subscriber::registry().with(MetricsLayer::new(collector.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(error_type = "write_back", "settlement write-back failed");
            tracing::warn!(error_type = "ignored", "warnings are not counted");
        });

        let metrics = collector.export_metrics().unwrap();
        assert!(metrics.contains("error_type=\"write_back\""));
        assert!(!metrics.contains("error_type=\"ignored\""));
    }
}
