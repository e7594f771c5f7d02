use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// Backend is syncing or briefly unreachable; safe to retry.
    #[error("syncing state, retry later: {0}")]
    Transient(String),

    /// Business rule failure reported by the engine.
    #[error("rejected by engine: {0}")]
    Rejected(String),

    #[error("malformed response envelope: {0}")]
    MalformedEnvelope(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("default context not provisioned after {attempts} attempts")]
    ProvisioningTimeout { attempts: u32 },

    #[error("context record store error: {0}")]
    RecordStore(String),
}

impl ContextError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ContextError::Transient(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ContextError::Transient(_) => "transient",
            ContextError::Rejected(_) => "rejected",
            ContextError::MalformedEnvelope(_) => "malformed_envelope",
            ContextError::Decode(_) => "decode",
            ContextError::Transport(_) => "transport",
            ContextError::ProvisioningTimeout { .. } => "provisioning_timeout",
            ContextError::RecordStore(_) => "record_store",
        }
    }
}

impl From<serde_json::Error> for ContextError {
    fn from(e: serde_json::Error) -> Self {
        ContextError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ContextError>;
