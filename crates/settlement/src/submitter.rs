use chrono::Utc;
use cosmwasm_std::Uint128;
use meropools_context::{CallScope, ExecutionContextClient};
use meropools_escrow::{settle_trade_clause, Clause, EscrowAdapter, TradeLeg};
use meropools_metrics::MetricsCollector;
use meropools_types::{BatchMatchResult, TokenRegistry, UserOrder, PRICE_SCALE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::store::{PendingSettlement, PhaseTransition, SettlementPhase, SettlementStore};
use crate::SettlementError;

fn now() -> u64 {
    Utc::now().timestamp() as u64
}

// ═══════════════════════════════════════════════════════════════════════════
// RESULTS
// ═══════════════════════════════════════════════════════════════════════════

/// A batch whose settlement is recorded in the pool context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub batch_id: String,
    pub tx_hash: String,
    /// No transaction was sent by this call; an earlier one was reused
    pub resumed: bool,
}

/// Outcome of [`SettlementSubmitter::retry_write_backs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBackReport {
    pub written_back: Vec<SettlementReceipt>,
    /// `(batch_id, error)` for write-backs that failed again
    pub failed: Vec<(String, String)>,
    /// Batches stuck in `AwaitingChain`
    pub needs_review: Vec<String>,
}

/// Operator decision for a settlement stuck in `AwaitingChain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewResolution {
    /// The transaction was found on chain
    Included { tx_hash: String },
    /// Nothing reached the chain; the batch may be settled from scratch
    NotIncluded,
}

// ═══════════════════════════════════════════════════════════════════════════
// CLAUSE BUILDING
// ═══════════════════════════════════════════════════════════════════════════

/// `amount_a * clearing_price / 1e18`
pub fn counter_amount(amount_a: Uint128, clearing_price: Uint128) -> Option<Uint128> {
    amount_a
        .checked_multiply_ratio(clearing_price, PRICE_SCALE)
        .ok()
}

/// One `settleTrade` clause per matched pair, in batch order.
pub fn build_settlement_clauses(
    escrow: &str,
    tokens: &TokenRegistry,
    batch: &BatchMatchResult,
    orders: &[UserOrder],
) -> Result<Vec<Clause>, SettlementError> {
    if batch.matched_orders.is_empty() {
        return Err(SettlementError::EmptyBatch(batch.batch_id.clone()));
    }

    let find = |order_id: &str| {
        orders
            .iter()
            .find(|o| o.id == order_id)
            .ok_or_else(|| SettlementError::MissingOrder {
                batch_id: batch.batch_id.clone(),
                order_id: order_id.to_string(),
            })
    };

    batch
        .matched_orders
        .iter()
        .map(|(a_id, b_id)| {
            let a = find(a_id)?;
            let b = find(b_id)?;

            let counter = counter_amount(a.amount_deposited, batch.clearing_price).ok_or_else(
                || SettlementError::Overflow {
                    batch_id: batch.batch_id.clone(),
                },
            )?;

            let leg_a = TradeLeg {
                user: a.settlement_address.clone(),
                token: tokens.address_of(&a.token_deposited)?.to_string(),
                amount: a.amount_deposited,
            };
            let leg_b = TradeLeg {
                user: b.settlement_address.clone(),
                token: tokens.address_of(&b.token_deposited)?.to_string(),
                amount: counter,
            };

            Ok(settle_trade_clause(escrow, &leg_a, &leg_b)?)
        })
        .collect()
}

/// Settlement tx already written back for every order of the batch, if any.
fn recorded_settlement(orders: &[UserOrder]) -> Option<String> {
    let first = orders.first()?.settlement_tx.clone()?;
    orders
        .iter()
        .all(|o| o.settlement_tx.as_deref() == Some(first.as_str()))
        .then_some(first)
}

// ═══════════════════════════════════════════════════════════════════════════
// SUBMITTER
// ═══════════════════════════════════════════════════════════════════════════

/// Settles loaded batches on chain and records the transaction in the pool.
///
/// Every phase change is persisted before the next side effect. A batch
/// leaves the store only after its write-back succeeded, and a transaction
/// that may have reached the chain is never resubmitted.
pub struct SettlementSubmitter {
    escrow: Arc<EscrowAdapter>,
    client: Arc<dyn ExecutionContextClient>,
    scope: CallScope,
    tokens: TokenRegistry,
    store: Arc<dyn SettlementStore>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl SettlementSubmitter {
    pub fn new(
        escrow: Arc<EscrowAdapter>,
        client: Arc<dyn ExecutionContextClient>,
        scope: CallScope,
        tokens: TokenRegistry,
        store: Arc<dyn SettlementStore>,
    ) -> Self {
        Self {
            escrow,
            client,
            scope,
            tokens,
            store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<dyn SettlementStore> {
        &self.store
    }

    pub fn build_clauses(
        &self,
        batch: &BatchMatchResult,
        orders: &[UserOrder],
    ) -> Result<Vec<Clause>, SettlementError> {
        build_settlement_clauses(self.escrow.escrow_contract(), &self.tokens, batch, orders)
    }

    /// Settle `batch` and write the transaction back into the pool context.
    pub async fn settle(
        &self,
        batch: &BatchMatchResult,
        orders: &[UserOrder],
    ) -> Result<SettlementReceipt, SettlementError> {
        let batch_id = batch.batch_id.as_str();

        if let Some(existing) = self.store.get(batch_id).await? {
            return match existing.phase {
                SettlementPhase::ChainSettled => {
                    info!(batch_id, "Chain settlement already done, retrying write-back only");
                    self.write_back(existing).await
                }
                SettlementPhase::AwaitingChain => Err(SettlementError::NeedsReview {
                    batch_id: batch_id.to_string(),
                }),
                SettlementPhase::WrittenBack => {
                    let tx_hash = existing.tx_hash.clone().ok_or_else(|| {
                        SettlementError::InvalidState(format!("{batch_id} written back without tx"))
                    })?;
                    self.store.remove(batch_id).await?;
                    Ok(SettlementReceipt {
                        batch_id: batch_id.to_string(),
                        tx_hash,
                        resumed: true,
                    })
                }
            };
        }

        if let Some(tx_hash) = recorded_settlement(orders) {
            info!(batch_id, tx_hash = %tx_hash, "Batch already settled in pool context");
            return Ok(SettlementReceipt {
                batch_id: batch_id.to_string(),
                tx_hash,
                resumed: true,
            });
        }

        let clauses = self.build_clauses(batch, orders)?;
        let started = Instant::now();

        let mut pending = PendingSettlement::new(batch_id, clauses.clone(), now());
        self.store.upsert(&pending).await?;
        self.store
            .record_transition(
                batch_id,
                PhaseTransition::new(None, SettlementPhase::AwaitingChain, pending.created_at)
                    .with_details(format!("{} clauses", clauses.len())),
            )
            .await?;
        self.update_pending_gauge().await;

        info!(
            batch_id,
            pairs = batch.pair_count(),
            clearing_price = %batch.clearing_price,
            "Submitting settlement transaction"
        );

        let receipt = match self.escrow.submit(clauses).await {
            Ok(receipt) => receipt,
            Err(e) if e.left_chain_untouched() => {
                warn!(batch_id, error = %e, "Settlement transaction did not change chain state");
                self.store.remove(batch_id).await?;
                self.update_pending_gauge().await;
                return Err(e.into());
            }
            Err(e) => {
                error!(
                    batch_id,
                    error = %e,
                    error_type = "settlement_unconfirmed",
                    "Settlement outcome unknown, holding for review"
                );
                pending.last_error = Some(e.to_string());
                pending.updated_at = now();
                self.store.upsert(&pending).await?;
                return Err(e.into());
            }
        };

        pending.phase = SettlementPhase::ChainSettled;
        pending.tx_hash = Some(receipt.tx_id.clone());
        pending.updated_at = now();
        self.store.upsert(&pending).await?;
        self.store
            .record_transition(
                batch_id,
                PhaseTransition::new(
                    Some(SettlementPhase::AwaitingChain),
                    SettlementPhase::ChainSettled,
                    pending.updated_at,
                )
                .with_tx_hash(&receipt.tx_id)
                .with_details(format!("block {}", receipt.block_number)),
            )
            .await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_settlement_submitted();
        }

        let result = self.write_back(pending).await;
        if result.is_ok() {
            if let Some(metrics) = &self.metrics {
                metrics.record_settlement_duration(started.elapsed());
            }
        }
        result
    }

    /// Re-attempt the write-back of every `ChainSettled` record. Never
    /// touches the chain.
    pub async fn retry_write_backs(&self) -> Result<WriteBackReport, SettlementError> {
        let mut report = WriteBackReport::default();

        for pending in self.store.list_pending().await? {
            match pending.phase {
                SettlementPhase::AwaitingChain => {
                    warn!(batch_id = %pending.batch_id, "Settlement needs review");
                    report.needs_review.push(pending.batch_id);
                }
                SettlementPhase::ChainSettled | SettlementPhase::WrittenBack => {
                    let batch_id = pending.batch_id.clone();
                    match self.write_back(pending).await {
                        Ok(receipt) => report.written_back.push(receipt),
                        Err(e) => report.failed.push((batch_id, e.to_string())),
                    }
                }
            }
        }

        Ok(report)
    }

    /// Records in `AwaitingChain`.
    pub async fn needs_review(&self) -> Result<Vec<PendingSettlement>, SettlementError> {
        Ok(self
            .store
            .list_pending()
            .await?
            .into_iter()
            .filter(PendingSettlement::needs_review)
            .collect())
    }

    pub async fn pending(&self) -> Result<Vec<PendingSettlement>, SettlementError> {
        Ok(self.store.list_pending().await?)
    }

    /// Apply an operator's finding for a batch held in `AwaitingChain`.
    pub async fn resolve_review(
        &self,
        batch_id: &str,
        resolution: ReviewResolution,
    ) -> Result<Option<SettlementReceipt>, SettlementError> {
        let mut pending = self
            .store
            .get(batch_id)
            .await?
            .filter(PendingSettlement::needs_review)
            .ok_or_else(|| {
                SettlementError::InvalidState(format!("{batch_id} is not awaiting review"))
            })?;

        match resolution {
            ReviewResolution::NotIncluded => {
                self.store
                    .record_transition(
                        batch_id,
                        PhaseTransition::new(
                            Some(SettlementPhase::AwaitingChain),
                            SettlementPhase::AwaitingChain,
                            now(),
                        )
                        .with_details("discarded after review"),
                    )
                    .await?;
                self.store.remove(batch_id).await?;
                self.update_pending_gauge().await;
                info!(batch_id, "Settlement discarded after review");
                Ok(None)
            }
            ReviewResolution::Included { tx_hash } => {
                pending.phase = SettlementPhase::ChainSettled;
                pending.tx_hash = Some(tx_hash.clone());
                pending.updated_at = now();
                self.store.upsert(&pending).await?;
                self.store
                    .record_transition(
                        batch_id,
                        PhaseTransition::new(
                            Some(SettlementPhase::AwaitingChain),
                            SettlementPhase::ChainSettled,
                            pending.updated_at,
                        )
                        .with_tx_hash(tx_hash)
                        .with_details("confirmed after review"),
                    )
                    .await?;
                self.write_back(pending).await.map(Some)
            }
        }
    }

    async fn write_back(
        &self,
        mut pending: PendingSettlement,
    ) -> Result<SettlementReceipt, SettlementError> {
        let batch_id = pending.batch_id.clone();
        let tx_hash = pending.tx_hash.clone().ok_or_else(|| {
            SettlementError::InvalidState(format!("{batch_id} has no settlement transaction"))
        })?;

        pending.attempts += 1;
        let result = self
            .client
            .submit_settlement_result(&self.scope, &batch_id, &tx_hash)
            .await;

        if let Some(metrics) = &self.metrics {
            metrics.record_write_back(result.is_ok());
        }

        match result {
            Ok(()) => {
                self.store
                    .record_transition(
                        &batch_id,
                        PhaseTransition::new(
                            Some(pending.phase),
                            SettlementPhase::WrittenBack,
                            now(),
                        )
                        .with_tx_hash(&tx_hash),
                    )
                    .await?;
                self.store.remove(&batch_id).await?;
                self.update_pending_gauge().await;

                info!(batch_id = %batch_id, tx_hash = %tx_hash, "Settlement written back");
                Ok(SettlementReceipt {
                    batch_id,
                    tx_hash,
                    resumed: pending.attempts > 1,
                })
            }
            Err(e) => {
                error!(
                    batch_id = %batch_id,
                    tx_hash = %tx_hash,
                    attempts = pending.attempts,
                    error = %e,
                    error_type = "write_back",
                    "Settlement write-back failed, batch stays pending"
                );
                pending.last_error = Some(e.to_string());
                pending.updated_at = now();
                self.store.upsert(&pending).await?;
                Err(SettlementError::WriteBack {
                    batch_id,
                    tx_hash,
                    source: e,
                })
            }
        }
    }

    async fn update_pending_gauge(&self) {
        if let Some(metrics) = &self.metrics {
            if let Ok(pending) = self.store.list_pending().await {
                metrics.set_pending_settlements(pending.len() as i64);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_amount_scales_by_clearing_price() {
        let amount = Uint128::new(100 * PRICE_SCALE);
        let price = Uint128::new(2 * PRICE_SCALE);

        assert_eq!(
            counter_amount(amount, price),
            Some(Uint128::new(200 * PRICE_SCALE))
        );
    }

    #[test]
    fn test_counter_amount_truncates() {
        // 3 * 0.5 = 1.5, floored
        assert_eq!(
            counter_amount(Uint128::new(3), Uint128::new(PRICE_SCALE / 2)),
            Some(Uint128::new(1))
        );
    }

    #[test]
    fn test_counter_amount_overflow() {
        assert_eq!(counter_amount(Uint128::MAX, Uint128::MAX), None);
    }
}
