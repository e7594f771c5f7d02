use async_trait::async_trait;
use meropools_escrow::Clause;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

// ═══════════════════════════════════════════════════════════════════════════
// CORE TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// How far a batch settlement has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementPhase {
    /// Persisted, transaction not yet known to be included
    AwaitingChain,
    /// Included on chain, write-back outstanding
    ChainSettled,
    /// Written back into the pool context
    WrittenBack,
}

impl SettlementPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementPhase::AwaitingChain => "AwaitingChain",
            SettlementPhase::ChainSettled => "ChainSettled",
            SettlementPhase::WrittenBack => "WrittenBack",
        }
    }
}

impl fmt::Display for SettlementPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementPhase {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AwaitingChain" => Ok(SettlementPhase::AwaitingChain),
            "ChainSettled" => Ok(SettlementPhase::ChainSettled),
            "WrittenBack" => Ok(SettlementPhase::WrittenBack),
            other => Err(StoreError::SerializationError(format!(
                "unknown settlement phase: {other}"
            ))),
        }
    }
}

/// Durable record of one batch settlement in flight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingSettlement {
    pub batch_id: String,
    pub phase: SettlementPhase,
    pub clauses: Vec<Clause>,
    pub tx_hash: Option<String>,
    /// Write-back attempts so far
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl PendingSettlement {
    pub fn new(batch_id: impl Into<String>, clauses: Vec<Clause>, created_at: u64) -> Self {
        Self {
            batch_id: batch_id.into(),
            phase: SettlementPhase::AwaitingChain,
            clauses,
            tx_hash: None,
            attempts: 0,
            last_error: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// An `AwaitingChain` record has an on-chain outcome nobody observed.
    /// Resubmitting could double-spend escrow, so it is left to an operator.
    pub fn needs_review(&self) -> bool {
        self.phase == SettlementPhase::AwaitingChain
    }
}

/// Phase change recorded for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseTransition {
    pub from_phase: Option<SettlementPhase>,
    pub to_phase: SettlementPhase,
    pub timestamp: u64,
    pub tx_hash: Option<String>,
    pub details: Option<String>,
}

impl PhaseTransition {
    pub fn new(
        from_phase: Option<SettlementPhase>,
        to_phase: SettlementPhase,
        timestamp: u64,
    ) -> Self {
        Self {
            from_phase,
            to_phase,
            timestamp,
            tx_hash: None,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TYPES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("settlement not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),
}

// ═══════════════════════════════════════════════════════════════════════════
// STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════

/// Pending settlement storage - can be implemented for different backends
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Insert or replace the record for `settlement.batch_id`
    async fn upsert(&self, settlement: &PendingSettlement) -> Result<(), StoreError>;

    async fn get(&self, batch_id: &str) -> Result<Option<PendingSettlement>, StoreError>;

    /// Every record still in the store, oldest first
    async fn list_pending(&self) -> Result<Vec<PendingSettlement>, StoreError>;

    /// Drop the record; its transition history is kept
    async fn remove(&self, batch_id: &str) -> Result<(), StoreError>;

    async fn record_transition(
        &self,
        batch_id: &str,
        transition: PhaseTransition,
    ) -> Result<(), StoreError>;

    async fn history(&self, batch_id: &str) -> Result<Vec<PhaseTransition>, StoreError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE (for testing)
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct InMemoryStore {
    settlements: Arc<RwLock<HashMap<String, PendingSettlement>>>,
    transitions: Arc<RwLock<HashMap<String, Vec<PhaseTransition>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get number of pending records (for testing)
    pub async fn len(&self) -> usize {
        self.settlements.read().await.len()
    }

    /// Check if store is empty (for testing)
    pub async fn is_empty(&self) -> bool {
        self.settlements.read().await.is_empty()
    }
}

#[async_trait]
impl SettlementStore for InMemoryStore {
    async fn upsert(&self, settlement: &PendingSettlement) -> Result<(), StoreError> {
        self.settlements
            .write()
            .await
            .insert(settlement.batch_id.clone(), settlement.clone());
        Ok(())
    }

    async fn get(&self, batch_id: &str) -> Result<Option<PendingSettlement>, StoreError> {
        Ok(self.settlements.read().await.get(batch_id).cloned())
    }

    async fn list_pending(&self) -> Result<Vec<PendingSettlement>, StoreError> {
        let mut results: Vec<_> = self.settlements.read().await.values().cloned().collect();
        results.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.batch_id.cmp(&b.batch_id))
        });
        Ok(results)
    }

    async fn remove(&self, batch_id: &str) -> Result<(), StoreError> {
        self.settlements
            .write()
            .await
            .remove(batch_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(batch_id.to_string()))
    }

    async fn record_transition(
        &self,
        batch_id: &str,
        transition: PhaseTransition,
    ) -> Result<(), StoreError> {
        if !self.settlements.read().await.contains_key(batch_id) {
            return Err(StoreError::NotFound(batch_id.to_string()));
        }

        self.transitions
            .write()
            .await
            .entry(batch_id.to_string())
            .or_default()
            .push(transition);

        Ok(())
    }

    async fn history(&self, batch_id: &str) -> Result<Vec<PhaseTransition>, StoreError> {
        Ok(self
            .transitions
            .read()
            .await
            .get(batch_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(batch_id: &str, created_at: u64) -> PendingSettlement {
        PendingSettlement::new(
            batch_id,
            vec![Clause::call(
                "0xc45adc41c6be7d172b7841b072b90c0abb6f663f",
                "0xa2c47dee".to_string(),
            )],
            created_at,
        )
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = InMemoryStore::new();
        let record = pending("batch_1", 100);

        store.upsert(&record).await.unwrap();
        assert_eq!(store.get("batch_1").await.unwrap(), Some(record.clone()));

        let mut settled = record;
        settled.phase = SettlementPhase::ChainSettled;
        settled.tx_hash = Some("0xabc".to_string());
        store.upsert(&settled).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("batch_1").await.unwrap(), Some(settled));
    }

    #[tokio::test]
    async fn test_list_pending_oldest_first() {
        let store = InMemoryStore::new();
        store.upsert(&pending("batch_2", 200)).await.unwrap();
        store.upsert(&pending("batch_1", 100)).await.unwrap();

        let ids: Vec<_> = store
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.batch_id)
            .collect();
        assert_eq!(ids, vec!["batch_1", "batch_2"]);
    }

    #[tokio::test]
    async fn test_remove_keeps_history() {
        let store = InMemoryStore::new();
        store.upsert(&pending("batch_1", 100)).await.unwrap();
        store
            .record_transition(
                "batch_1",
                PhaseTransition::new(None, SettlementPhase::AwaitingChain, 100),
            )
            .await
            .unwrap();

        store.remove("batch_1").await.unwrap();

        assert!(store.is_empty().await);
        assert_eq!(store.history("batch_1").await.unwrap().len(), 1);
        assert!(matches!(
            store.remove("batch_1").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_transition_requires_record() {
        let store = InMemoryStore::new();
        let result = store
            .record_transition(
                "batch_9",
                PhaseTransition::new(None, SettlementPhase::AwaitingChain, 1),
            )
            .await;

        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_phase_round_trip() {
        for phase in [
            SettlementPhase::AwaitingChain,
            SettlementPhase::ChainSettled,
            SettlementPhase::WrittenBack,
        ] {
            assert_eq!(phase.as_str().parse::<SettlementPhase>().unwrap(), phase);
        }
        assert!("Settled".parse::<SettlementPhase>().is_err());
    }

    #[test]
    fn test_needs_review_only_awaiting_chain() {
        let mut record = pending("batch_1", 1);
        assert!(record.needs_review());

        record.phase = SettlementPhase::ChainSettled;
        assert!(!record.needs_review());
    }
}
