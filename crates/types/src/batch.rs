use cosmwasm_std::Uint128;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::serde_helpers::{flexible_uint128, HexOrBytesVisitor};

/// Spent-order marker emitted by the matching engine, held as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Nullifier(String);

impl Nullifier {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Nullifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(HexOrBytesVisitor).map(Nullifier)
    }
}

impl fmt::Display for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one single-price batch auction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMatchResult {
    pub batch_id: String,
    pub matched_orders: Vec<(String, String)>,
    /// Price of one unit of the counter asset, 18-decimal fixed point
    #[serde(with = "flexible_uint128")]
    pub clearing_price: Uint128,
    #[serde(with = "flexible_uint128")]
    pub total_volume: Uint128,
    #[serde(default)]
    pub nullifiers: Vec<Nullifier>,
    pub timestamp: u64,
}

impl BatchMatchResult {
    /// Every order id that appears in a matched pair, in pair order.
    pub fn order_ids(&self) -> impl Iterator<Item = &str> {
        self.matched_orders
            .iter()
            .flat_map(|(a, b)| [a.as_str(), b.as_str()])
    }

    pub fn contains_order(&self, order_id: &str) -> bool {
        self.order_ids().any(|id| id == order_id)
    }

    pub fn pair_count(&self) -> usize {
        self.matched_orders.len()
    }
}

/// Settlement transaction recorded against a batch; at most one per batch id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub batch_id: String,
    pub tx_hash: String,
}

impl SettlementRecord {
    pub fn new(batch_id: impl Into<String>, tx_hash: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            tx_hash: tx_hash.into(),
        }
    }
}
