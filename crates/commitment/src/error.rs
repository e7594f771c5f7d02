use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitmentError {
    #[error("{field} must be exactly 32 bytes, got {len}")]
    InvalidLength { field: &'static str, len: usize },

    #[error("encrypted payload is empty")]
    EmptyPayload,

    #[error("expiry {expiry} must be after timestamp {timestamp}")]
    ExpiryNotAfterTimestamp { timestamp: u64, expiry: u64 },

    #[error("time limit must be greater than zero")]
    ZeroTimeLimit,

    #[error("time limit of {0}s overflows the expiry timestamp")]
    TimeLimitOverflow(u64),

    #[error("randomness unavailable: {0}")]
    Randomness(String),

    #[error("payload encoding failed: {0}")]
    Encoding(String),
}
