pub mod batch;
pub mod context;
pub mod order;
pub mod pool;
pub mod serde_helpers;
pub mod token;
pub mod units;

pub use batch::*;
pub use context::*;
pub use order::*;
pub use pool::*;
pub use token::*;
pub use units::*;

/// Fixed-point precision shared by amounts and prices.
pub const DECIMALS: u32 = 18;

/// 10^18, the fixed-point unit.
pub const PRICE_SCALE: u128 = 1_000_000_000_000_000_000;

/// Current unix time in nanoseconds.
pub fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Current unix time in seconds.
pub fn current_timestamp() -> u64 {
    now_ns() / 1_000_000_000
}
