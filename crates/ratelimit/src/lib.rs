//! Retry scheduling for MeroPools network calls.
//!
//! - `Backoff`: exponential or fixed delay schedule with an optional attempt bound
//! - `RetryPolicy` / `retry`: bounded retry of transient failures

pub mod backoff;
pub mod policy;

pub use backoff::Backoff;
pub use policy::{retry, RetryPolicy};
