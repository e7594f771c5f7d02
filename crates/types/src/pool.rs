use cosmwasm_std::Uint128;
use serde::{Deserialize, Serialize};

use crate::serde_helpers::flexible_uint128;

/// Which kind of context the engine instance is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatingMode {
    UserPrivate,
    MatchingPool,
}

/// Static per-pool parameters, fetched once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub pool_name: String,
    #[serde(with = "flexible_uint128")]
    pub min_order_amount: Uint128,
    #[serde(with = "flexible_uint128")]
    pub max_order_amount: Uint128,
    pub supported_tokens: Vec<String>,
    pub batch_frequency_seconds: u64,
    pub fee_basis_points: u32,
    pub created_at: u64,
}

impl PoolConfig {
    pub fn accepts_amount(&self, amount: Uint128) -> bool {
        amount >= self.min_order_amount && amount <= self.max_order_amount
    }

    pub fn supports_token(&self, token: &str) -> bool {
        self.supported_tokens.iter().any(|t| t == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> PoolConfig {
        PoolConfig {
            pool_name: "B3TR/VET".to_string(),
            min_order_amount: Uint128::new(10),
            max_order_amount: Uint128::new(1_000),
            supported_tokens: vec!["B3TR".to_string(), "VET".to_string()],
            batch_frequency_seconds: 60,
            fee_basis_points: 30,
            created_at: 0,
        }
    }

    #[test]
    fn test_amount_bounds_are_inclusive() {
        let pool = pool();
        assert!(pool.accepts_amount(Uint128::new(10)));
        assert!(pool.accepts_amount(Uint128::new(1_000)));
        assert!(!pool.accepts_amount(Uint128::new(9)));
        assert!(!pool.accepts_amount(Uint128::new(1_001)));
    }

    #[test]
    fn test_supported_tokens() {
        let pool = pool();
        assert!(pool.supports_token("VET"));
        assert!(!pool.supports_token("VTHO"));
    }

    #[test]
    fn test_mode_wire_names() {
        let mode: OperatingMode = serde_json::from_str(r#""MatchingPool""#).unwrap();
        assert_eq!(mode, OperatingMode::MatchingPool);
    }
}
