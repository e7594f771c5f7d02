use serde::{Deserialize, Serialize};

/// Name the private per-trader context is created under.
pub const DEFAULT_CONTEXT_NAME: &str = "default";

/// Persisted record of the trader's private default context, used to scope
/// every private-context call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultContextRecord {
    pub context_id: String,
    pub member_public_key: String,
    pub executor_id: String,
    #[serde(default)]
    pub application_id: String,
    #[serde(rename = "context_name", alias = "contextName")]
    pub context_name: String,
    #[serde(rename = "is_private", alias = "isPrivate")]
    pub is_private: bool,
}

impl DefaultContextRecord {
    /// Only private contexts named `default` may scope private calls.
    pub fn is_valid(&self) -> bool {
        self.is_private && self.context_name == DEFAULT_CONTEXT_NAME && !self.context_id.is_empty()
    }
}
