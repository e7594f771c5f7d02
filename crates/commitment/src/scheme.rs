use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{CommitmentError, OrderParams};

/// Cryptographic primitive behind an order commitment.
///
/// Production deployments plug in a real encryption and proof system here;
/// [`PlaceholderScheme`] only reproduces the observable shape of one.
pub trait CommitmentScheme: Send + Sync {
    /// Private order fields in sealed form. Must be non-empty.
    fn seal_payload(&self, params: &OrderParams) -> Result<Vec<u8>, CommitmentError>;

    /// Fresh 32-byte seed from which the engine derives the order nullifier.
    fn nullifier_seed(&self) -> Result<Vec<u8>, CommitmentError>;

    /// 32-byte attestation that the trader holds the committed collateral.
    fn proof_of_funds(&self, params: &OrderParams) -> Result<Vec<u8>, CommitmentError>;

    /// Content fingerprint over the sealed payload, seed, proof and validity window.
    fn content_hash(
        &self,
        payload: &[u8],
        nullifier_seed: &[u8; 32],
        proof_of_funds: &[u8; 32],
        timestamp: u64,
        expiry: u64,
    ) -> Vec<u8>;
}

/// Stores the order terms as clear JSON and uses random bytes as the proof.
/// Provides no confidentiality.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderScheme;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceholderPayload<'a> {
    token: &'a str,
    amount: String,
    expected_token: &'a str,
    expected_price: String,
    settlement_address: &'a str,
    spread_bp: u32,
}

impl PlaceholderScheme {
    fn random_32() -> Result<Vec<u8>, CommitmentError> {
        let mut bytes = vec![0u8; 32];
        getrandom::getrandom(&mut bytes).map_err(|e| CommitmentError::Randomness(e.to_string()))?;
        Ok(bytes)
    }
}

impl CommitmentScheme for PlaceholderScheme {
    fn seal_payload(&self, params: &OrderParams) -> Result<Vec<u8>, CommitmentError> {
        let payload = PlaceholderPayload {
            token: &params.token,
            amount: params.amount.to_string(),
            expected_token: &params.expected_token,
            expected_price: params.expected_price.to_string(),
            settlement_address: &params.settlement_address,
            spread_bp: params.spread_bp,
        };
        serde_json::to_vec(&payload).map_err(|e| CommitmentError::Encoding(e.to_string()))
    }

    fn nullifier_seed(&self) -> Result<Vec<u8>, CommitmentError> {
        Self::random_32()
    }

    fn proof_of_funds(&self, _params: &OrderParams) -> Result<Vec<u8>, CommitmentError> {
        Self::random_32()
    }

    fn content_hash(
        &self,
        payload: &[u8],
        nullifier_seed: &[u8; 32],
        proof_of_funds: &[u8; 32],
        timestamp: u64,
        expiry: u64,
    ) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        hasher.update(nullifier_seed);
        hasher.update(proof_of_funds);
        hasher.update(timestamp.to_be_bytes());
        hasher.update(expiry.to_be_bytes());
        hasher.finalize().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::Uint128;

    fn params() -> OrderParams {
        OrderParams {
            token: "B3TR".to_string(),
            amount: Uint128::new(100),
            expected_token: "VET".to_string(),
            expected_price: Uint128::new(2),
            settlement_address: "0xabc".to_string(),
            spread_bp: 50,
            time_limit_s: 60,
        }
    }

    #[test]
    fn test_placeholder_payload_is_json() {
        let payload = PlaceholderScheme.seal_payload(&params()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["token"], "B3TR");
        assert_eq!(value["expectedToken"], "VET");
        assert_eq!(value["amount"], "100");
    }

    #[test]
    fn test_random_fields_differ() {
        let a = PlaceholderScheme.nullifier_seed().unwrap();
        let b = PlaceholderScheme.nullifier_seed().unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_content_hash_binds_window() {
        let seed = [1u8; 32];
        let proof = [2u8; 32];
        let h1 = PlaceholderScheme.content_hash(b"x", &seed, &proof, 1, 2);
        let h2 = PlaceholderScheme.content_hash(b"x", &seed, &proof, 1, 3);
        assert_eq!(h1.len(), 32);
        assert_ne!(h1, h2);
    }
}
