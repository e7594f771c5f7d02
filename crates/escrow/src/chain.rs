use async_trait::async_trait;
use cosmwasm_std::Uint128;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{ChainError, Clause};

/// Inclusion receipt for a settlement-chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub reverted: bool,
    pub block_number: u64,
}

/// Raw settlement-chain surface used by the escrow adapter.
#[async_trait]
pub trait SettlementChain: Send + Sync {
    /// Sign and broadcast one multi-clause transaction. `None` means the node
    /// did not hand back a transaction id.
    async fn send(&self, clauses: &[Clause]) -> Result<Option<String>, ChainError>;

    /// Receipt for `tx_id`, or `None` while it is not yet included.
    async fn receipt(&self, tx_id: &str) -> Result<Option<TxReceipt>, ChainError>;

    /// Collateral held by the escrow contract for `owner` in `token`.
    async fn escrow_balance(&self, owner: &str, token: &str) -> Result<Uint128, ChainError>;
}

/// How the mock chain answers receipt queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptBehavior {
    /// Included on the first receipt query
    Confirm,
    /// Included after this many `None` answers
    ConfirmAfter(u32),
    Revert,
    /// Never included
    Pending,
}

/// Mock settlement chain for testing
pub struct MockSettlementChain {
    sent: Arc<RwLock<Vec<Vec<Clause>>>>,
    receipt_queries: Arc<RwLock<HashMap<String, u32>>>,
    balances: Arc<RwLock<HashMap<(String, String), Uint128>>>,
    behavior: Arc<RwLock<ReceiptBehavior>>,
    drop_tx_id: Arc<RwLock<bool>>,
    should_fail: Arc<RwLock<bool>>,
}

impl MockSettlementChain {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(RwLock::new(Vec::new())),
            receipt_queries: Arc::new(RwLock::new(HashMap::new())),
            balances: Arc::new(RwLock::new(HashMap::new())),
            behavior: Arc::new(RwLock::new(ReceiptBehavior::Confirm)),
            drop_tx_id: Arc::new(RwLock::new(false)),
            should_fail: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn set_receipt_behavior(&self, behavior: ReceiptBehavior) {
        *self.behavior.write().await = behavior;
    }

    /// Make `send` return no transaction id.
    pub async fn set_drop_tx_id(&self, drop: bool) {
        *self.drop_tx_id.write().await = drop;
    }

    /// Make `send` fail outright.
    pub async fn set_should_fail(&self, fail: bool) {
        *self.should_fail.write().await = fail;
    }

    pub async fn set_balance(&self, owner: &str, token: &str, amount: Uint128) {
        self.balances
            .write()
            .await
            .insert((owner.to_lowercase(), token.to_lowercase()), amount);
    }

    /// Every transaction broadcast so far, in order.
    pub async fn sent(&self) -> Vec<Vec<Clause>> {
        self.sent.read().await.clone()
    }

    pub async fn send_count(&self) -> usize {
        self.sent.read().await.len()
    }
}

impl Default for MockSettlementChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementChain for MockSettlementChain {
    async fn send(&self, clauses: &[Clause]) -> Result<Option<String>, ChainError> {
        if *self.should_fail.read().await {
            return Err(ChainError::Request("mock chain unavailable".to_string()));
        }

        let mut sent = self.sent.write().await;
        sent.push(clauses.to_vec());

        if *self.drop_tx_id.read().await {
            return Ok(None);
        }
        Ok(Some(format!("0x{:064x}", sent.len())))
    }

    async fn receipt(&self, tx_id: &str) -> Result<Option<TxReceipt>, ChainError> {
        let seen = {
            let mut queries = self.receipt_queries.write().await;
            let seen = queries.entry(tx_id.to_string()).or_insert(0);
            *seen += 1;
            *seen
        };

        let receipt = |reverted| TxReceipt {
            reverted,
            block_number: 1_000 + u64::from(seen),
        };

        Ok(match *self.behavior.read().await {
            ReceiptBehavior::Confirm => Some(receipt(false)),
            ReceiptBehavior::ConfirmAfter(n) if seen > n => Some(receipt(false)),
            ReceiptBehavior::ConfirmAfter(_) => None,
            ReceiptBehavior::Revert => Some(receipt(true)),
            ReceiptBehavior::Pending => None,
        })
    }

    async fn escrow_balance(&self, owner: &str, token: &str) -> Result<Uint128, ChainError> {
        Ok(self
            .balances
            .read()
            .await
            .get(&(owner.to_lowercase(), token.to_lowercase()))
            .copied()
            .unwrap_or_default())
    }
}
