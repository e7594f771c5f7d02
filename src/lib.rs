//! MeroPools: privacy-preserving order placement and batch settlement.
//!
//! Traders lock collateral in an escrow contract on the settlement chain and
//! place a commitment-only order in a confidential matching pool. The pool
//! operator periodically matches orders in batches, settles each batch with
//! one chain transaction and writes the result back into the pool.
//!
//! - [`commitment`]: order commitments
//! - [`escrow`]: escrow deposits and settlement transactions
//! - [`context`]: the confidential execution network
//! - [`orchestrator`]: order lifecycles, batch reconciliation, operator loop
//! - [`settlement`]: durable two-phase batch settlement

pub use meropools_commitment as commitment;
pub use meropools_context as context;
pub use meropools_escrow as escrow;
pub use meropools_orchestrator as orchestrator;
pub use meropools_settlement as settlement;
pub use meropools_types as types;

pub use meropools_orchestrator::{
    OrderLifecycleCoordinator, OrderRequest, PoolOperator, PoolTarget, Trader,
};
