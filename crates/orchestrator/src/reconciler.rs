use async_trait::async_trait;
use meropools_context::{CallScope, ExecutionContextClient};
use meropools_metrics::MetricsCollector;
use meropools_types::{BatchMatchResult, UserId, UserOrder};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::MatchingError;

/// Orders a batch needs before matching is attempted.
pub const MIN_ORDERS_FOR_MATCHING: usize = 2;

/// Told about batches as the reconciler learns of them.
#[async_trait]
pub trait BatchListener: Send + Sync {
    async fn batch_loaded(&self, batch: &BatchMatchResult);

    async fn batch_settled(&self, batch_id: &str, tx_hash: &str);
}

// ═══════════════════════════════════════════════════════════════════════════
// WORKING SET
// ═══════════════════════════════════════════════════════════════════════════

/// A batch with the orders it references, as fetched from the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedBatch {
    pub batch: BatchMatchResult,
    pub orders: Vec<UserOrder>,
    /// Settlement transaction once written back
    pub settlement_tx: Option<String>,
}

impl LoadedBatch {
    pub fn batch_id(&self) -> &str {
        &self.batch.batch_id
    }

    /// Matched but not yet settled. Batches without pairs never are.
    pub fn is_pending(&self) -> bool {
        self.settlement_tx.is_none() && self.batch.pair_count() > 0
    }
}

/// The pool operator's view of the pool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingSet {
    pub active_users: Vec<UserId>,
    pub active_orders: Vec<UserOrder>,
    /// Load order
    pub batches: Vec<LoadedBatch>,
    batch_ids: HashSet<String>,
}

impl WorkingSet {
    pub fn contains_batch(&self, batch_id: &str) -> bool {
        self.batch_ids.contains(batch_id)
    }

    pub fn batch(&self, batch_id: &str) -> Option<&LoadedBatch> {
        self.batches.iter().find(|b| b.batch_id() == batch_id)
    }

    fn batch_mut(&mut self, batch_id: &str) -> Option<&mut LoadedBatch> {
        self.batches.iter_mut().find(|b| b.batch_id() == batch_id)
    }

    /// Returns false if the batch was already present.
    fn insert_batch(&mut self, loaded: LoadedBatch) -> bool {
        if !self.batch_ids.insert(loaded.batch.batch_id.clone()) {
            return false;
        }
        self.active_orders
            .retain(|o| !loaded.batch.contains_order(&o.id));
        self.batches.push(loaded);
        true
    }

    pub fn pending(&self) -> impl Iterator<Item = &LoadedBatch> {
        self.batches.iter().filter(|b| b.is_pending())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    pub active_users: usize,
    pub active_orders: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(LoadedBatch),
    AlreadyLoaded,
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RECONCILER
// ═══════════════════════════════════════════════════════════════════════════

/// Keeps the operator's working set in step with the pool context and
/// triggers matching.
pub struct BatchReconciler {
    client: Arc<dyn ExecutionContextClient>,
    scope: CallScope,
    working: Mutex<WorkingSet>,
    listener: Option<Arc<dyn BatchListener>>,
    metrics: Option<Arc<MetricsCollector>>,
    min_orders: usize,
}

impl BatchReconciler {
    /// `scope` is the pool context under the operator identity.
    pub fn new(client: Arc<dyn ExecutionContextClient>, scope: CallScope) -> Self {
        Self {
            client,
            scope,
            working: Mutex::new(WorkingSet::default()),
            listener: None,
            metrics: None,
            min_orders: MIN_ORDERS_FOR_MATCHING,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn BatchListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Never below two: a single order cannot be matched.
    pub fn with_min_orders(mut self, min_orders: usize) -> Self {
        self.min_orders = min_orders.max(MIN_ORDERS_FOR_MATCHING);
        self
    }

    pub fn scope(&self) -> &CallScope {
        &self.scope
    }

    pub async fn working_set(&self) -> WorkingSet {
        self.working.lock().await.clone()
    }

    /// Re-read active users and orders from the pool.
    pub async fn refresh(&self) -> Result<RefreshSummary, MatchingError> {
        let users = self.client.get_active_users(&self.scope).await?;
        let orders = self.client.get_active_orders(&self.scope).await?;

        let summary = RefreshSummary {
            active_users: users.len(),
            active_orders: orders.len(),
        };

        let mut working = self.working.lock().await;
        working.active_users = users;
        working.active_orders = orders;

        debug!(
            users = summary.active_users,
            orders = summary.active_orders,
            "Working set refreshed"
        );
        Ok(summary)
    }

    /// Run one batch over the known active orders and load its result.
    pub async fn trigger_matching(&self) -> Result<LoadOutcome, MatchingError> {
        let found = self.working.lock().await.active_orders.len();
        if found < self.min_orders {
            return Err(MatchingError::InsufficientOrders { found });
        }

        let batch_id = self.client.run_batch_matching(&self.scope).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_batch_triggered();
        }
        info!(batch_id = %batch_id, orders = found, "Batch matching triggered");

        self.load_batch(&batch_id).await
    }

    /// Fetch a batch and its orders into the working set. Loading a batch
    /// twice leaves one entry and reports `AlreadyLoaded`.
    pub async fn load_batch(&self, batch_id: &str) -> Result<LoadOutcome, MatchingError> {
        if self.working.lock().await.contains_batch(batch_id) {
            debug!(batch_id, "Batch already loaded");
            return Ok(LoadOutcome::AlreadyLoaded);
        }

        let (batch, orders) = self
            .client
            .get_batch_orders(&self.scope, batch_id)
            .await?
            .ok_or_else(|| MatchingError::BatchNotFound(batch_id.to_string()))?;

        let loaded = LoadedBatch {
            batch,
            orders,
            settlement_tx: None,
        };

        // Re-checked under the lock: a concurrent load may have won
        if !self.working.lock().await.insert_batch(loaded.clone()) {
            return Ok(LoadOutcome::AlreadyLoaded);
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_batch_loaded(loaded.batch.pair_count());
        }
        info!(
            batch_id,
            pairs = loaded.batch.pair_count(),
            clearing_price = %loaded.batch.clearing_price,
            "Batch loaded"
        );

        if let Some(listener) = &self.listener {
            listener.batch_loaded(&loaded.batch).await;
        }
        Ok(LoadOutcome::Loaded(loaded))
    }

    /// Loaded batches still waiting for settlement, oldest first.
    pub async fn pending_batches(&self) -> Vec<LoadedBatch> {
        self.working.lock().await.pending().cloned().collect()
    }

    /// Record the written-back settlement of a batch. The listener hears of
    /// it either way; `NotLoaded` means the working set had no copy, as with
    /// batches settled before a restart.
    pub async fn mark_settled(&self, batch_id: &str, tx_hash: &str) -> Result<(), MatchingError> {
        let loaded = {
            let mut working = self.working.lock().await;
            match working.batch_mut(batch_id) {
                Some(loaded) => {
                    loaded.settlement_tx = Some(tx_hash.to_string());
                    true
                }
                None => false,
            }
        };

        if let Some(listener) = &self.listener {
            listener.batch_settled(batch_id, tx_hash).await;
        }
        if !loaded {
            return Err(MatchingError::NotLoaded(batch_id.to_string()));
        }
        Ok(())
    }
}
