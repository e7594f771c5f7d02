//! Node administration: identities, invitations and context membership.

use async_trait::async_trait;
use meropools_types::{DefaultContextRecord, DEFAULT_CONTEXT_NAME};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::{ContextError, Result, DEFAULT_RPC_TIMEOUT};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub public_key: String,
}

/// Membership obtained by creating or joining a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMembership {
    pub context_id: String,
    pub member_public_key: String,
}

/// Initialization parameters for a new context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextInit {
    pub is_private: bool,
    pub context_name: String,
}

impl ContextInit {
    pub fn default_private() -> Self {
        Self {
            is_private: true,
            context_name: DEFAULT_CONTEXT_NAME.to_string(),
        }
    }
}

/// Context as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextInfo {
    #[serde(alias = "id")]
    pub context_id: String,
    #[serde(default)]
    pub application_id: String,
    #[serde(default)]
    pub member_public_key: Option<String>,
    #[serde(default)]
    pub executor_id: Option<String>,
    #[serde(default, alias = "context_name")]
    pub context_name: Option<String>,
    #[serde(default, alias = "is_private")]
    pub is_private: Option<bool>,
}

impl ContextInfo {
    pub fn is_default_private(&self) -> bool {
        self.is_private == Some(true)
            && self.context_name.as_deref() == Some(DEFAULT_CONTEXT_NAME)
    }

    /// Does the node's view agree with a stored default context record?
    /// Flags the node does not report are taken from the record.
    pub fn confirms(&self, record: &DefaultContextRecord) -> bool {
        self.context_id == record.context_id
            && self.is_private != Some(false)
            && self
                .context_name
                .as_deref()
                .map_or(true, |name| name == DEFAULT_CONTEXT_NAME)
    }

    pub fn into_record(self) -> DefaultContextRecord {
        let executor_id = self.executor_id.unwrap_or_default();
        DefaultContextRecord {
            context_id: self.context_id,
            member_public_key: self
                .member_public_key
                .unwrap_or_else(|| executor_id.clone()),
            executor_id,
            application_id: self.application_id,
            context_name: self
                .context_name
                .unwrap_or_else(|| DEFAULT_CONTEXT_NAME.to_string()),
            is_private: self.is_private.unwrap_or(false),
        }
    }
}

#[async_trait]
pub trait NodeAdmin: Send + Sync {
    async fn create_identity(&self) -> Result<Identity>;

    /// Returns the invitation payload the invitee joins with.
    async fn invite_to_context(
        &self,
        context_id: &str,
        inviter: &str,
        invitee: &str,
    ) -> Result<String>;

    async fn join_context(&self, invitation_payload: &str) -> Result<ContextMembership>;

    async fn create_context(
        &self,
        application_id: &str,
        init: &ContextInit,
    ) -> Result<ContextMembership>;

    async fn get_context(&self, context_id: &str) -> Result<Option<ContextInfo>>;

    async fn list_contexts(&self) -> Result<Vec<ContextInfo>>;
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// [`NodeAdmin`] over the node's admin HTTP API.
pub struct HttpNodeAdmin {
    base_url: String,
    client: reqwest::Client,
    auth_token: Option<String>,
}

impl HttpNodeAdmin {
    pub fn new(node_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(node_url, DEFAULT_RPC_TIMEOUT)
    }

    pub fn with_timeout(node_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ContextError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: format!("{}/admin-api", node_url.into().trim_end_matches('/')),
            client,
            auth_token: None,
        })
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Node admin request");
        let builder = self.client.request(method, url);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ContextError::Transient(e.to_string())
            } else {
                ContextError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("HTTP {status}: {body}");
            return Err(if status.is_server_error() {
                ContextError::Transient(message)
            } else {
                ContextError::Rejected(message)
            });
        }

        let envelope: DataEnvelope<T> = response
            .json()
            .await
            .map_err(|e| ContextError::Decode(format!("failed to parse response: {e}")))?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl NodeAdmin for HttpNodeAdmin {
    async fn create_identity(&self) -> Result<Identity> {
        self.send(self.request(reqwest::Method::POST, "/identity/context"))
            .await
    }

    async fn invite_to_context(
        &self,
        context_id: &str,
        inviter: &str,
        invitee: &str,
    ) -> Result<String> {
        let body = json!({
            "contextId": context_id,
            "inviterId": inviter,
            "inviteeId": invitee,
        });
        self.send(
            self.request(reqwest::Method::POST, "/contexts/invite")
                .json(&body),
        )
        .await
    }

    async fn join_context(&self, invitation_payload: &str) -> Result<ContextMembership> {
        let body = json!({ "invitationPayload": invitation_payload });
        self.send(self.request(reqwest::Method::POST, "/contexts/join").json(&body))
            .await
    }

    async fn create_context(
        &self,
        application_id: &str,
        init: &ContextInit,
    ) -> Result<ContextMembership> {
        let params = serde_json::to_vec(init)?;
        let body = json!({
            "applicationId": application_id,
            "protocol": "near",
            "initializationParams": params,
        });
        self.send(self.request(reqwest::Method::POST, "/contexts").json(&body))
            .await
    }

    async fn get_context(&self, context_id: &str) -> Result<Option<ContextInfo>> {
        let path = format!("/contexts/{context_id}");
        match self.send(self.request(reqwest::Method::GET, &path)).await {
            Ok(info) => Ok(Some(info)),
            Err(ContextError::Rejected(message)) if message.starts_with("HTTP 404") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_contexts(&self) -> Result<Vec<ContextInfo>> {
        let data: Value = self
            .send(self.request(reqwest::Method::GET, "/contexts"))
            .await?;
        let list = match data {
            Value::Object(mut map) => map.remove("contexts").unwrap_or(Value::Null),
            other => other,
        };
        match list {
            Value::Null => Ok(Vec::new()),
            list => Ok(serde_json::from_value(list)?),
        }
    }
}
