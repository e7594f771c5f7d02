use cosmwasm_std::Uint128;
use meropools_types::{is_address, TokenInfo, NATIVE_TOKEN_ADDRESS};
use serde::{Deserialize, Serialize};

use crate::abi::{
    encode_call, Word, APPROVE_SELECTOR, DEPOSIT_SELECTOR, GET_ESCROW_BALANCE_SELECTOR,
    SETTLE_TRADE_SELECTOR,
};
use crate::EscrowError;

/// One call inside a multi-clause settlement-chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    pub to: String,
    #[serde(with = "meropools_types::serde_helpers::flexible_uint128")]
    pub value: Uint128,
    /// `0x`-prefixed call data
    pub data: String,
}

impl Clause {
    pub fn call(to: impl Into<String>, data: String) -> Self {
        Self {
            to: to.into(),
            value: Uint128::zero(),
            data,
        }
    }

    pub fn with_value(mut self, value: Uint128) -> Self {
        self.value = value;
        self
    }
}

/// One side of a matched pair as it is paid out on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeLeg {
    pub user: String,
    pub token: String,
    pub amount: Uint128,
}

pub fn approve_clause(
    token_address: &str,
    spender: &str,
    amount: Uint128,
) -> Result<Clause, EscrowError> {
    check_address(token_address)?;
    let data = encode_call(
        APPROVE_SELECTOR,
        &[Word::address(spender)?, Word::uint(amount)],
    );
    Ok(Clause::call(token_address, data))
}

pub fn deposit_clause(
    escrow: &str,
    token_address: &str,
    amount: Uint128,
) -> Result<Clause, EscrowError> {
    check_address(escrow)?;
    let data = encode_call(
        DEPOSIT_SELECTOR,
        &[Word::address(token_address)?, Word::uint(amount)],
    );
    Ok(Clause::call(escrow, data))
}

/// Clauses that lock `amount` of `token` in the escrow contract.
///
/// ERC-20 style tokens need an allowance first, so they produce
/// `[approve, deposit]`. The native asset is a single value-bearing deposit
/// against the zero address.
pub fn deposit_clauses(
    escrow: &str,
    token: &TokenInfo,
    amount: Uint128,
) -> Result<Vec<Clause>, EscrowError> {
    if amount.is_zero() {
        return Err(EscrowError::ZeroAmount);
    }

    if token.is_native() {
        return Ok(vec![
            deposit_clause(escrow, NATIVE_TOKEN_ADDRESS, amount)?.with_value(amount)
        ]);
    }

    Ok(vec![
        approve_clause(&token.address, escrow, amount)?,
        deposit_clause(escrow, &token.address, amount)?,
    ])
}

pub fn settle_trade_clause(
    escrow: &str,
    a: &TradeLeg,
    b: &TradeLeg,
) -> Result<Clause, EscrowError> {
    check_address(escrow)?;
    let data = encode_call(
        SETTLE_TRADE_SELECTOR,
        &[
            Word::address(&a.user)?,
            Word::address(&a.token)?,
            Word::uint(a.amount),
            Word::address(&b.user)?,
            Word::address(&b.token)?,
            Word::uint(b.amount),
        ],
    );
    Ok(Clause::call(escrow, data))
}

/// Call data for the `getEscrowBalance(owner, token)` view.
pub fn escrow_balance_call(owner: &str, token_address: &str) -> Result<String, EscrowError> {
    Ok(encode_call(
        GET_ESCROW_BALANCE_SELECTOR,
        &[Word::address(owner)?, Word::address(token_address)?],
    ))
}

fn check_address(address: &str) -> Result<(), EscrowError> {
    if is_address(address) {
        Ok(())
    } else {
        Err(EscrowError::InvalidAddress(address.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meropools_types::TokenRegistry;

    const ESCROW: &str = "0xc45adc41c6be7d172b7841b072b90c0abb6f663f";
    const ALICE: &str = "0x00000000000000000000000000000000000a11ce";
    const BOB: &str = "0x0000000000000000000000000000000000000b0b";

    #[test]
    fn test_erc20_deposit_is_approve_then_deposit() {
        let registry = TokenRegistry::testnet();
        let b3tr = registry.get("B3TR").unwrap();

        let clauses = deposit_clauses(ESCROW, b3tr, Uint128::new(500)).unwrap();

        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].to, b3tr.address);
        assert!(clauses[0].data.starts_with("0x095ea7b3"));
        assert_eq!(clauses[0].value, Uint128::zero());
        assert_eq!(clauses[1].to, ESCROW);
        assert!(clauses[1].data.starts_with("0x47e7ef24"));
        assert_eq!(clauses[1].value, Uint128::zero());
    }

    #[test]
    fn test_native_deposit_carries_value() {
        let registry = TokenRegistry::testnet();
        let vet = registry.get("VET").unwrap();

        let clauses = deposit_clauses(ESCROW, vet, Uint128::new(42)).unwrap();

        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].to, ESCROW);
        assert_eq!(clauses[0].value, Uint128::new(42));
        assert!(clauses[0].data.starts_with("0x47e7ef24"));
    }

    #[test]
    fn test_zero_deposit_rejected() {
        let registry = TokenRegistry::testnet();
        let result = deposit_clauses(ESCROW, registry.get("VET").unwrap(), Uint128::zero());
        assert!(matches!(result, Err(EscrowError::ZeroAmount)));
    }

    #[test]
    fn test_settle_trade_encoding() {
        let registry = TokenRegistry::testnet();
        let a = TradeLeg {
            user: ALICE.to_string(),
            token: registry.address_of("B3TR").unwrap().to_string(),
            amount: Uint128::new(100),
        };
        let b = TradeLeg {
            user: BOB.to_string(),
            token: registry.address_of("VET").unwrap().to_string(),
            amount: Uint128::new(200),
        };

        let clause = settle_trade_clause(ESCROW, &a, &b).unwrap();

        assert_eq!(clause.to, ESCROW);
        assert!(clause.data.starts_with("0xa2c47dee"));
        assert_eq!(clause.data.len(), 2 + 8 + 6 * 64);
        assert!(clause.data.ends_with(&format!("{:064x}", 200)));
    }

    #[test]
    fn test_settle_trade_rejects_bad_user() {
        let a = TradeLeg {
            user: "alice".to_string(),
            token: NATIVE_TOKEN_ADDRESS.to_string(),
            amount: Uint128::new(1),
        };
        let b = TradeLeg {
            user: BOB.to_string(),
            token: NATIVE_TOKEN_ADDRESS.to_string(),
            amount: Uint128::new(1),
        };
        assert!(matches!(
            settle_trade_clause(ESCROW, &a, &b),
            Err(EscrowError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_clause_value_serializes_as_string() {
        let clause = Clause::call(ESCROW, "0x".to_string()).with_value(Uint128::new(7));
        let json = serde_json::to_value(&clause).unwrap();
        assert_eq!(json["value"], "7");
    }
}
