pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod operator;
pub mod reconciler;
pub mod store;

// Re-export main types
pub use coordinator::{CoordinatorConfig, OrderLifecycleCoordinator, PoolTarget};
pub use error::{LifecycleError, MatchingError, OperatorError, PoolDiscoveryError};
pub use lifecycle::{
    LifecycleState, LifecycleStep, LifecycleTransition, OrderDraft, OrderLifecycle, OrderRequest,
    PriceMode, Trader,
};
pub use operator::{CycleReport, PoolOperator};
pub use reconciler::{
    BatchListener, BatchReconciler, LoadOutcome, LoadedBatch, RefreshSummary, WorkingSet,
    MIN_ORDERS_FOR_MATCHING,
};
pub use store::{InMemoryLifecycleStore, LifecycleStore, LifecycleStoreError};
