//! Batch settlement: one `settleTrade` clause per matched pair, sent as a
//! single transaction, then written back into the pool context.
//!
//! Progress is persisted in a [`SettlementStore`] so that a crash between
//! the chain and the write-back never leads to a second on-chain settlement.

pub mod error;
pub mod sqlite_store;
pub mod store;
pub mod submitter;

pub use error::*;
pub use sqlite_store::*;
pub use store::*;
pub use submitter::{
    build_settlement_clauses, counter_amount, ReviewResolution, SettlementReceipt,
    SettlementSubmitter, WriteBackReport,
};
