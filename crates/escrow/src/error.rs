use meropools_types::TokenError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("invalid amount: must be greater than zero")]
    ZeroAmount,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("no transaction id returned before timeout")]
    SendTimeout,

    #[error("transaction {tx_id} reverted")]
    Reverted { tx_id: String },

    #[error("transaction {tx_id} sent but unconfirmed after {attempts} receipt checks")]
    SentButUnconfirmed { tx_id: String, attempts: u32 },

    #[error("signer error: {0}")]
    Signer(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
}

impl EscrowError {
    /// Transaction id carried by the error, when one was obtained.
    pub fn tx_id(&self) -> Option<&str> {
        match self {
            EscrowError::Reverted { tx_id } | EscrowError::SentButUnconfirmed { tx_id, .. } => {
                Some(tx_id)
            }
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EscrowError::ZeroAmount => "zero_amount",
            EscrowError::InvalidAddress(_) => "invalid_address",
            EscrowError::Token(_) => "token",
            EscrowError::SendTimeout => "send_timeout",
            EscrowError::Reverted { .. } => "reverted",
            EscrowError::SentButUnconfirmed { .. } => "unconfirmed",
            EscrowError::Signer(_) => "signer",
            EscrowError::Decode(_) => "decode",
            EscrowError::Chain(_) => "chain",
        }
    }

    /// True when the failure is known to have left chain state unchanged:
    /// rejected before broadcast, refused by the node, or reverted.
    pub fn left_chain_untouched(&self) -> bool {
        matches!(
            self,
            EscrowError::ZeroAmount
                | EscrowError::InvalidAddress(_)
                | EscrowError::Token(_)
                | EscrowError::Signer(_)
                | EscrowError::Reverted { .. }
                | EscrowError::Chain(ChainError::Status { .. })
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("node returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Response(String),
}
