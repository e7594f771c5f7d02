//! Minimal ABI call encoding for the escrow and ERC-20 surfaces.

use cosmwasm_std::Uint128;
use meropools_types::is_address;

use crate::EscrowError;

/// `approve(address,uint256)`
pub const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];
/// `deposit(address,uint256)`
pub const DEPOSIT_SELECTOR: [u8; 4] = [0x47, 0xe7, 0xef, 0x24];
/// `settleTrade(address,address,uint256,address,address,uint256)`
pub const SETTLE_TRADE_SELECTOR: [u8; 4] = [0xa2, 0xc4, 0x7d, 0xee];
/// `getEscrowBalance(address,address)`
pub const GET_ESCROW_BALANCE_SELECTOR: [u8; 4] = [0xf3, 0x72, 0x11, 0x1f];

/// One 32-byte ABI word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word([u8; 32]);

impl Word {
    pub fn address(address: &str) -> Result<Self, EscrowError> {
        if !is_address(address) {
            return Err(EscrowError::InvalidAddress(address.to_string()));
        }
        let raw = hex::decode(&address[2..])
            .map_err(|_| EscrowError::InvalidAddress(address.to_string()))?;
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&raw);
        Ok(Self(word))
    }

    pub fn uint(value: Uint128) -> Self {
        let mut word = [0u8; 32];
        word[16..].copy_from_slice(&value.u128().to_be_bytes());
        Self(word)
    }
}

/// Selector followed by static arguments, as `0x`-prefixed hex.
pub fn encode_call(selector: [u8; 4], args: &[Word]) -> String {
    let mut data = Vec::with_capacity(4 + 32 * args.len());
    data.extend_from_slice(&selector);
    for word in args {
        data.extend_from_slice(&word.0);
    }
    format!("0x{}", hex::encode(data))
}

/// Decode a single `uint256` return value that fits in 128 bits.
pub fn decode_uint(data: &str) -> Result<Uint128, EscrowError> {
    let raw = hex::decode(data.strip_prefix("0x").unwrap_or(data))
        .map_err(|e| EscrowError::Decode(e.to_string()))?;
    if raw.len() != 32 {
        return Err(EscrowError::Decode(format!(
            "expected 32-byte word, got {} bytes",
            raw.len()
        )));
    }
    if raw[..16].iter().any(|b| *b != 0) {
        return Err(EscrowError::Decode("uint256 exceeds 128 bits".to_string()));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&raw[16..]);
    Ok(Uint128::new(u128::from_be_bytes(low)))
}
