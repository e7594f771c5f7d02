use meropools_commitment::CommitmentError;
use meropools_context::ContextError;
use meropools_settlement::SettlementError;
use meropools_types::OperatingMode;
use thiserror::Error;

use crate::lifecycle::LifecycleStep;
use crate::store::LifecycleStoreError;

#[derive(Debug, Error)]
pub enum LifecycleError {
    // Local validation, raised before any network call
    #[error("order amount must be greater than zero")]
    ZeroAmount,

    #[error("token {0} is not supported by this pool")]
    UnsupportedToken(String),

    #[error("order amount {0} is outside pool limits")]
    AmountOutsideLimits(String),

    #[error("custom price must be greater than zero")]
    InvalidPrice,

    #[error("no settlement wallet connected")]
    MissingWallet,

    #[error("commitment error: {0}")]
    Commitment(#[from] CommitmentError),

    #[error("lifecycle not found: {0}")]
    NotFound(String),

    /// Another caller is driving this lifecycle
    #[error("lifecycle {0} is busy")]
    Busy(String),

    #[error("cannot cancel lifecycle {lifecycle_id} in state {state}")]
    NotCancellable { lifecycle_id: String, state: String },

    /// The lifecycle reached `Failed`
    #[error("lifecycle {lifecycle_id} failed at {step}: {reason}")]
    Failed {
        lifecycle_id: String,
        step: LifecycleStep,
        reason: String,
    },

    /// A step was interrupted by a transient failure; `drive` resumes it
    #[error("lifecycle {lifecycle_id} interrupted at {step}: {source}")]
    Interrupted {
        lifecycle_id: String,
        step: LifecycleStep,
        source: ContextError,
    },

    #[error("context error: {0}")]
    Context(#[from] ContextError),

    #[error("store error: {0}")]
    Store(#[from] LifecycleStoreError),
}

impl LifecycleError {
    /// Rejected locally, nothing was sent anywhere.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LifecycleError::ZeroAmount
                | LifecycleError::UnsupportedToken(_)
                | LifecycleError::AmountOutsideLimits(_)
                | LifecycleError::InvalidPrice
                | LifecycleError::MissingWallet
                | LifecycleError::Commitment(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum PoolDiscoveryError {
    #[error("context {context_id} runs in {mode:?} mode, not as a matching pool")]
    NotAPool {
        context_id: String,
        mode: OperatingMode,
    },

    #[error("matching pool {0} publishes no pool configuration")]
    MissingConfig(String),

    #[error("matching pool {0} publishes a zero batch frequency")]
    ZeroBatchFrequency(String),

    #[error("context error: {0}")]
    Context(#[from] ContextError),
}

#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("at least 2 active orders are required for matching, found {found}")]
    InsufficientOrders { found: usize },

    #[error("batch {0} not found")]
    BatchNotFound(String),

    #[error("batch {0} is not loaded")]
    NotLoaded(String),

    #[error("context error: {0}")]
    Context(#[from] ContextError),
}

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("matching error: {0}")]
    Matching(#[from] MatchingError),

    #[error("settlement error: {0}")]
    Settlement(#[from] SettlementError),
}
