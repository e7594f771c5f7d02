use meropools_context::ContextError;
use meropools_escrow::EscrowError;
use meropools_types::TokenError;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("batch {0} has no matched pairs")]
    EmptyBatch(String),

    #[error("batch {batch_id} references order {order_id} that was not loaded")]
    MissingOrder { batch_id: String, order_id: String },

    #[error("counter amount overflow in batch {batch_id}")]
    Overflow { batch_id: String },

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("settlement transaction failed: {0}")]
    Escrow(#[from] EscrowError),

    /// A previous attempt reached the chain with an unknown outcome
    #[error("batch {batch_id} needs manual review before it can be settled")]
    NeedsReview { batch_id: String },

    /// On-chain settlement succeeded; only the write-back is outstanding
    #[error("write-back of {tx_hash} for batch {batch_id} failed: {source}")]
    WriteBack {
        batch_id: String,
        tx_hash: String,
        source: ContextError,
    },

    #[error("invalid settlement state: {0}")]
    InvalidState(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
