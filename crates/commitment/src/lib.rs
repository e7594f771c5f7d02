//! Order commitments for private order submission.
//!
//! A commitment binds the private order terms, a nullifier seed and a proof of
//! funds to a validity window. The cryptographic primitive is injected through
//! [`CommitmentScheme`].

mod builder;
mod error;
mod scheme;

pub use builder::{
    commitment_from_parts, fixed_field, validate_commitment, CommitmentBuilder, OrderParams,
};
pub use error::CommitmentError;
pub use scheme::{CommitmentScheme, PlaceholderScheme};
