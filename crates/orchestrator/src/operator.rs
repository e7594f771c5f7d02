use meropools_metrics::{CycleSpan, MetricsCollector};
use meropools_settlement::{SettlementReceipt, SettlementSubmitter, WriteBackReport};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn, Instrument};

use crate::error::{MatchingError, OperatorError};
use crate::reconciler::{BatchReconciler, LoadOutcome, RefreshSummary};

/// What one operator cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub correlation_id: String,
    pub write_backs: WriteBackReport,
    pub refreshed: Option<RefreshSummary>,
    /// Batch produced by this cycle's matching run
    pub batch_id: Option<String>,
    pub settled: Vec<SettlementReceipt>,
    /// `(batch_id, error)` for settlements that did not complete
    pub failed: Vec<(String, String)>,
}

/// The pool operator loop: write-back retries, refresh, matching and
/// settlement.
pub struct PoolOperator {
    reconciler: Arc<BatchReconciler>,
    submitter: Arc<SettlementSubmitter>,
    metrics: Option<Arc<MetricsCollector>>,
    cycles: AtomicU64,
}

impl PoolOperator {
    pub fn new(reconciler: Arc<BatchReconciler>, submitter: Arc<SettlementSubmitter>) -> Self {
        Self {
            reconciler,
            submitter,
            metrics: None,
            cycles: AtomicU64::new(0),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn reconciler(&self) -> &Arc<BatchReconciler> {
        &self.reconciler
    }

    pub fn submitter(&self) -> &Arc<SettlementSubmitter> {
        &self.submitter
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, OperatorError> {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let span = CycleSpan::new(&self.reconciler.scope().context_id, cycle);
        let correlation_id = span.correlation_id.as_str();

        self.cycle(cycle, correlation_id).instrument(span.span()).await
    }

    async fn cycle(&self, cycle: u64, correlation_id: String) -> Result<CycleReport, OperatorError> {
        let started = Instant::now();
        let mut report = CycleReport {
            cycle,
            correlation_id,
            ..CycleReport::default()
        };

        report.write_backs = self.submitter.retry_write_backs().await?;
        for receipt in &report.write_backs.written_back {
            // Batches settled before a restart are not in the working set
            if let Err(MatchingError::NotLoaded(_)) = self
                .reconciler
                .mark_settled(&receipt.batch_id, &receipt.tx_hash)
                .await
            {
                info!(batch_id = %receipt.batch_id, "Written back batch from an earlier run");
            }
        }

        let summary = self.reconciler.refresh().await?;
        report.refreshed = Some(summary);

        match self.reconciler.trigger_matching().await {
            Ok(LoadOutcome::Loaded(loaded)) => {
                report.batch_id = Some(loaded.batch.batch_id.clone());
            }
            Ok(LoadOutcome::AlreadyLoaded) => {}
            Err(MatchingError::InsufficientOrders { found }) => {
                info!(found, "Not enough active orders to match");
            }
            Err(e) => return Err(e.into()),
        }

        for pending in self.reconciler.pending_batches().await {
            let batch_id = pending.batch_id().to_string();
            match self.submitter.settle(&pending.batch, &pending.orders).await {
                Ok(receipt) => {
                    self.reconciler
                        .mark_settled(&batch_id, &receipt.tx_hash)
                        .await?;
                    report.settled.push(receipt);
                }
                Err(e) => {
                    error!(
                        batch_id = %batch_id,
                        error = %e,
                        error_type = "settlement",
                        "Batch settlement incomplete"
                    );
                    report.failed.push((batch_id, e.to_string()));
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_cycle(started.elapsed());
        }
        info!(
            cycle,
            orders = summary.active_orders,
            settled = report.settled.len(),
            failed = report.failed.len(),
            "Operator cycle complete"
        );
        Ok(report)
    }

    /// Run a cycle every `interval` until `shutdown` resolves. A failed
    /// cycle is logged and the loop carries on.
    pub async fn run<F>(&self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(interval_s = interval.as_secs(), "Pool operator started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Pool operator shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "Operator cycle failed");
                        if let Some(metrics) = &self.metrics {
                            metrics.record_error("operator_cycle");
                        }
                    }
                }
            }
        }
    }
}
