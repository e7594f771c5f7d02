//! Escrow deposits and settlement transactions on the public settlement chain.
//!
//! Clauses are ABI-encoded calls against the escrow contract (and ERC-20 style
//! tokens for allowances). [`EscrowAdapter`] broadcasts them through a
//! [`SettlementChain`] and polls for the receipt a bounded number of times.

pub mod abi;
mod adapter;
mod chain;
mod clause;
mod error;
pub mod thor;

pub use adapter::{ConfirmationConfig, DepositReceipt, EscrowAdapter};
pub use chain::{MockSettlementChain, ReceiptBehavior, SettlementChain, TxReceipt};
pub use clause::{
    approve_clause, deposit_clause, deposit_clauses, escrow_balance_call, settle_trade_clause,
    Clause, TradeLeg,
};
pub use error::{ChainError, EscrowError};
pub use thor::{ClauseSigner, RemoteSigner, ThorClient};
