use cosmwasm_std::Uint128;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::serde_helpers::flexible_uint128;

/// Member identity inside an execution context (the member public key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Privacy-preserving fingerprint of an order, created once per order and
/// never regenerated for the same order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCommitment {
    pub commitment_hash: [u8; 32],
    pub encrypted_payload: Vec<u8>,
    pub nullifier_seed: [u8; 32],
    pub proof_of_funds: [u8; 32],
    /// Nanoseconds since the unix epoch
    pub timestamp: u64,
    /// Nanoseconds since the unix epoch
    pub expiry: u64,
}

impl OrderCommitment {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.commitment_hash)
    }

    pub fn is_expired(&self, now_ns: u64) -> bool {
        now_ns >= self.expiry
    }
}

/// Order status as reported by the execution context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Active,
    Cancelled,
    PartiallyMatched {
        #[serde(with = "flexible_uint128")]
        filled_amount: Uint128,
    },
    FullyMatched,
    Expired,
}

impl OrderStatus {
    /// Forward-progress rank; status may only move to an equal or higher rank.
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::Active => 0,
            OrderStatus::PartiallyMatched { .. } => 1,
            OrderStatus::Cancelled | OrderStatus::FullyMatched | OrderStatus::Expired => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    pub fn is_matched(&self) -> bool {
        matches!(
            self,
            OrderStatus::PartiallyMatched { .. } | OrderStatus::FullyMatched
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Active => "active",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::PartiallyMatched { .. } => "partially_matched",
            OrderStatus::FullyMatched => "fully_matched",
            OrderStatus::Expired => "expired",
        }
    }
}

/// A submitted order, owned by the execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserOrder {
    pub id: String,
    pub user_id: UserId,
    pub commitment: OrderCommitment,

    // ═══════════════════════════════════════════════════════════════════════════
    // COLLATERAL
    // ═══════════════════════════════════════════════════════════════════════════
    pub token_deposited: String,
    #[serde(with = "flexible_uint128")]
    pub amount_deposited: Uint128,
    pub escrow_confirmed: bool,
    #[serde(alias = "vechain_address")]
    pub settlement_address: String,

    // ═══════════════════════════════════════════════════════════════════════════
    // TERMS
    // ═══════════════════════════════════════════════════════════════════════════
    #[serde(with = "flexible_uint128")]
    pub expected_price: Uint128,
    pub expected_exchange_token: String,
    #[serde(alias = "spread")]
    pub spread_bp: u32,
    #[serde(alias = "time_limit")]
    pub time_limit_s: u64,

    // ═══════════════════════════════════════════════════════════════════════════
    // ENGINE STATE
    // ═══════════════════════════════════════════════════════════════════════════
    #[serde(default)]
    pub order_context_id: String,
    #[serde(default)]
    pub user_context_id: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub matched: bool,
    #[serde(default)]
    pub settlement_tx: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Arguments of the engine's `submit_order` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOrderRequest {
    pub user_id: UserId,
    pub commitment: OrderCommitment,
    pub token_deposited: String,
    #[serde(with = "flexible_uint128")]
    pub amount_deposited: Uint128,
    pub escrow_confirmed: bool,
    #[serde(alias = "vechain_address")]
    pub settlement_address: String,
    #[serde(with = "flexible_uint128")]
    pub expected_price: Uint128,
    pub expected_exchange_token: String,
    #[serde(alias = "spread")]
    pub spread_bp: u32,
    #[serde(alias = "time_limit")]
    pub time_limit_s: u64,
    #[serde(default)]
    pub transaction_id: Option<String>,
}
