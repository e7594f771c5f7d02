use cosmwasm_std::Uint128;
use meropools_types::OrderCommitment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::{CommitmentError, CommitmentScheme, PlaceholderScheme};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Plaintext order terms a commitment is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderParams {
    pub token: String,
    pub amount: Uint128,
    pub expected_token: String,
    pub expected_price: Uint128,
    pub settlement_address: String,
    pub spread_bp: u32,
    pub time_limit_s: u64,
}

type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Derives an [`OrderCommitment`] from order terms.
///
/// Each call yields a fresh nullifier seed, so callers retrying the same order
/// must reuse the commitment they already hold instead of building again.
#[derive(Clone)]
pub struct CommitmentBuilder {
    scheme: Arc<dyn CommitmentScheme>,
    clock: Clock,
}

impl fmt::Debug for CommitmentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitmentBuilder").finish_non_exhaustive()
    }
}

impl Default for CommitmentBuilder {
    fn default() -> Self {
        Self::new(Arc::new(PlaceholderScheme))
    }
}

impl CommitmentBuilder {
    pub fn new(scheme: Arc<dyn CommitmentScheme>) -> Self {
        Self {
            scheme,
            clock: Arc::new(meropools_types::now_ns),
        }
    }

    /// Override the nanosecond clock (tests, replay).
    pub fn with_clock(mut self, clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(&self, params: &OrderParams) -> Result<OrderCommitment, CommitmentError> {
        if params.time_limit_s == 0 {
            return Err(CommitmentError::ZeroTimeLimit);
        }

        let timestamp = (self.clock)();
        let expiry = params
            .time_limit_s
            .checked_mul(NANOS_PER_SECOND)
            .and_then(|window| timestamp.checked_add(window))
            .ok_or(CommitmentError::TimeLimitOverflow(params.time_limit_s))?;

        let encrypted_payload = self.scheme.seal_payload(params)?;
        let nullifier_seed = fixed_field("nullifier_seed", self.scheme.nullifier_seed()?)?;
        let proof_of_funds = fixed_field("proof_of_funds", self.scheme.proof_of_funds(params)?)?;
        let commitment_hash = fixed_field(
            "commitment_hash",
            self.scheme.content_hash(
                &encrypted_payload,
                &nullifier_seed,
                &proof_of_funds,
                timestamp,
                expiry,
            ),
        )?;

        let commitment = OrderCommitment {
            commitment_hash,
            encrypted_payload,
            nullifier_seed,
            proof_of_funds,
            timestamp,
            expiry,
        };
        validate_commitment(&commitment)?;

        debug!(
            commitment = %commitment.hash_hex(),
            expiry = commitment.expiry,
            "Built order commitment"
        );
        Ok(commitment)
    }
}

/// Convert scheme output into a fixed 32-byte field.
pub fn fixed_field(field: &'static str, bytes: Vec<u8>) -> Result<[u8; 32], CommitmentError> {
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CommitmentError::InvalidLength { field, len })
}

/// Assemble a commitment from untyped parts, checking every invariant.
pub fn commitment_from_parts(
    commitment_hash: Vec<u8>,
    encrypted_payload: Vec<u8>,
    nullifier_seed: Vec<u8>,
    proof_of_funds: Vec<u8>,
    timestamp: u64,
    expiry: u64,
) -> Result<OrderCommitment, CommitmentError> {
    let commitment = OrderCommitment {
        commitment_hash: fixed_field("commitment_hash", commitment_hash)?,
        encrypted_payload,
        nullifier_seed: fixed_field("nullifier_seed", nullifier_seed)?,
        proof_of_funds: fixed_field("proof_of_funds", proof_of_funds)?,
        timestamp,
        expiry,
    };
    validate_commitment(&commitment)?;
    Ok(commitment)
}

/// Fixed-size fields are enforced by the type; this checks the rest.
pub fn validate_commitment(commitment: &OrderCommitment) -> Result<(), CommitmentError> {
    if commitment.encrypted_payload.is_empty() {
        return Err(CommitmentError::EmptyPayload);
    }
    if commitment.expiry <= commitment.timestamp {
        return Err(CommitmentError::ExpiryNotAfterTimestamp {
            timestamp: commitment.timestamp,
            expiry: commitment.expiry,
        });
    }
    Ok(())
}
