use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Address of the chain's native asset.
pub const NATIVE_TOKEN_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("unknown token: {0}")]
    UnknownToken(String),

    #[error("invalid token address for {symbol}: {address}")]
    InvalidAddress { symbol: String, address: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub address: String,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_decimals() -> u32 {
    crate::DECIMALS
}

impl TokenInfo {
    pub fn is_native(&self) -> bool {
        self.address.eq_ignore_ascii_case(NATIVE_TOKEN_ADDRESS)
    }
}

/// Symbol to settlement-chain address mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRegistry {
    tokens: BTreeMap<String, TokenInfo>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// VeChain testnet deployment.
    pub fn testnet() -> Self {
        let mut registry = Self::new();
        for (symbol, address) in [
            ("B3TR", "0xbf64cf86894Ee0877C4e7d03936e35Ee8D8b864F"),
            ("VOT3", "0xa704c45971995467696EE9544Da77DD42Bc9706E"),
            ("VTHO", "0x0000000000000000000000000000456E65726779"),
            ("VET", NATIVE_TOKEN_ADDRESS),
        ] {
            // Constant addresses above are well-formed.
            let _ = registry.register(symbol, address);
        }
        registry
    }

    pub fn register(
        &mut self,
        symbol: impl Into<String>,
        address: impl Into<String>,
    ) -> Result<(), TokenError> {
        let symbol = symbol.into();
        let address = address.into();
        if !is_address(&address) {
            return Err(TokenError::InvalidAddress { symbol, address });
        }
        self.tokens.insert(
            symbol.clone(),
            TokenInfo {
                symbol,
                address,
                decimals: crate::DECIMALS,
            },
        );
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> Result<&TokenInfo, TokenError> {
        self.tokens
            .get(symbol)
            .ok_or_else(|| TokenError::UnknownToken(symbol.to_string()))
    }

    pub fn address_of(&self, symbol: &str) -> Result<&str, TokenError> {
        self.get(symbol).map(|t| t.address.as_str())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.tokens.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// `0x` followed by 40 hex digits.
pub fn is_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}
