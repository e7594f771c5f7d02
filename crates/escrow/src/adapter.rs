use cosmwasm_std::Uint128;
use meropools_ratelimit::Backoff;
use meropools_types::TokenInfo;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{deposit_clauses, Clause, EscrowError, SettlementChain, TxReceipt};

/// Bounded receipt polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationConfig {
    /// Receipt queries before giving up
    pub attempts: u32,
    /// Fixed delay between queries
    pub interval: Duration,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_secs(2),
        }
    }
}

/// Proof that collateral was locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceipt {
    pub tx_id: String,
    pub block_number: u64,
    pub clause_count: usize,
}

/// Builds and submits escrow transactions, waiting for inclusion.
pub struct EscrowAdapter {
    chain: Arc<dyn SettlementChain>,
    escrow_contract: String,
    confirmation: ConfirmationConfig,
}

impl EscrowAdapter {
    pub fn new(chain: Arc<dyn SettlementChain>, escrow_contract: impl Into<String>) -> Self {
        Self {
            chain,
            escrow_contract: escrow_contract.into(),
            confirmation: ConfirmationConfig::default(),
        }
    }

    pub fn with_confirmation(mut self, confirmation: ConfirmationConfig) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn escrow_contract(&self) -> &str {
        &self.escrow_contract
    }

    pub fn build_deposit_clauses(
        &self,
        amount: Uint128,
        token: &TokenInfo,
    ) -> Result<Vec<Clause>, EscrowError> {
        deposit_clauses(&self.escrow_contract, token, amount)
    }

    /// Lock `amount` of `token` in escrow. Succeeds only once the transaction
    /// is included without reverting.
    pub async fn deposit(
        &self,
        amount: Uint128,
        token: &TokenInfo,
    ) -> Result<DepositReceipt, EscrowError> {
        let clauses = self.build_deposit_clauses(amount, token)?;
        info!(
            token = %token.symbol,
            amount = %amount,
            clauses = clauses.len(),
            "Submitting escrow deposit"
        );
        self.submit(clauses).await
    }

    /// Broadcast `clauses` as one transaction and wait for its receipt.
    pub async fn submit(&self, clauses: Vec<Clause>) -> Result<DepositReceipt, EscrowError> {
        let tx_id = self
            .chain
            .send(&clauses)
            .await?
            .ok_or(EscrowError::SendTimeout)?;

        debug!(tx_id = %tx_id, "Transaction broadcast, awaiting receipt");
        let receipt = self.await_receipt(&tx_id).await?;

        if receipt.reverted {
            warn!(tx_id = %tx_id, block = receipt.block_number, "Transaction reverted");
            return Err(EscrowError::Reverted { tx_id });
        }

        info!(tx_id = %tx_id, block = receipt.block_number, "Transaction confirmed");
        Ok(DepositReceipt {
            tx_id,
            block_number: receipt.block_number,
            clause_count: clauses.len(),
        })
    }

    pub async fn escrow_balance(&self, owner: &str, token: &str) -> Result<Uint128, EscrowError> {
        Ok(self.chain.escrow_balance(owner, token).await?)
    }

    async fn await_receipt(&self, tx_id: &str) -> Result<TxReceipt, EscrowError> {
        let attempts = self.confirmation.attempts.max(1);
        let mut backoff = Backoff::fixed(self.confirmation.interval).with_max_attempts(attempts - 1);

        loop {
            match self.chain.receipt(tx_id).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                // The transaction is already out; a failed query counts as "not yet"
                Err(e) => warn!(tx_id = %tx_id, error = %e, "Receipt query failed"),
            }
            match backoff.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    warn!(tx_id = %tx_id, attempts, "Receipt not found within bound");
                    return Err(EscrowError::SentButUnconfirmed {
                        tx_id: tx_id.to_string(),
                        attempts,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockSettlementChain, ReceiptBehavior};
    use meropools_types::TokenRegistry;

    const ESCROW: &str = "0xc45adc41c6be7d172b7841b072b90c0abb6f663f";

    fn adapter(chain: Arc<MockSettlementChain>) -> EscrowAdapter {
        EscrowAdapter::new(chain, ESCROW).with_confirmation(ConfirmationConfig {
            attempts: 3,
            interval: Duration::from_millis(1),
        })
    }

    fn b3tr() -> TokenInfo {
        TokenRegistry::testnet().get("B3TR").unwrap().clone()
    }

    #[tokio::test]
    async fn test_deposit_confirmed() {
        let chain = Arc::new(MockSettlementChain::new());
        let adapter = adapter(chain.clone());

        let receipt = adapter.deposit(Uint128::new(100), &b3tr()).await.unwrap();

        assert!(receipt.tx_id.starts_with("0x"));
        assert_eq!(receipt.clause_count, 2);
        assert_eq!(chain.send_count().await, 1);
    }

    #[tokio::test]
    async fn test_deposit_confirmed_after_polling() {
        let chain = Arc::new(MockSettlementChain::new());
        chain.set_receipt_behavior(ReceiptBehavior::ConfirmAfter(2)).await;

        let receipt = adapter(chain).deposit(Uint128::new(100), &b3tr()).await.unwrap();
        assert_eq!(receipt.block_number, 1_003);
    }

    #[tokio::test]
    async fn test_missing_tx_id_is_send_timeout() {
        let chain = Arc::new(MockSettlementChain::new());
        chain.set_drop_tx_id(true).await;

        let err = adapter(chain).deposit(Uint128::new(100), &b3tr()).await.unwrap_err();
        assert!(matches!(err, EscrowError::SendTimeout));
        assert_eq!(err.tx_id(), None);
    }

    #[tokio::test]
    async fn test_revert_is_distinct_from_timeout() {
        let chain = Arc::new(MockSettlementChain::new());
        chain.set_receipt_behavior(ReceiptBehavior::Revert).await;

        let err = adapter(chain).deposit(Uint128::new(100), &b3tr()).await.unwrap_err();
        assert!(matches!(err, EscrowError::Reverted { .. }));
        assert!(err.tx_id().is_some());
        assert!(err.left_chain_untouched());
    }

    #[tokio::test]
    async fn test_unconfirmed_after_bound() {
        let chain = Arc::new(MockSettlementChain::new());
        chain.set_receipt_behavior(ReceiptBehavior::Pending).await;

        let err = adapter(chain).deposit(Uint128::new(100), &b3tr()).await.unwrap_err();
        assert!(!err.left_chain_untouched());
        match err {
            EscrowError::SentButUnconfirmed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_zero_amount_never_reaches_chain() {
        let chain = Arc::new(MockSettlementChain::new());
        let err = adapter(chain.clone())
            .deposit(Uint128::zero(), &b3tr())
            .await
            .unwrap_err();

        assert!(matches!(err, EscrowError::ZeroAmount));
        assert_eq!(chain.send_count().await, 0);
    }

    #[tokio::test]
    async fn test_chain_failure_propagates() {
        let chain = Arc::new(MockSettlementChain::new());
        chain.set_should_fail(true).await;

        let err = adapter(chain).deposit(Uint128::new(1), &b3tr()).await.unwrap_err();
        assert!(matches!(err, EscrowError::Chain(_)));
    }
}
