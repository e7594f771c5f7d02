use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::{ContextError, Result};

/// Default per-call timeout for execution context RPC.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Context and executor identity every call runs under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallScope {
    pub context_id: String,
    pub executor_public_key: String,
}

impl CallScope {
    pub fn new(context_id: impl Into<String>, executor_public_key: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            executor_public_key: executor_public_key.into(),
        }
    }
}

/// Raw method execution against an execution context.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, scope: &CallScope, method: &str, args: Value) -> Result<Value>;
}

#[async_trait]
impl<T: RpcTransport + ?Sized> RpcTransport for Arc<T> {
    async fn call(&self, scope: &CallScope, method: &str, args: Value) -> Result<Value> {
        (**self).call(scope, method, args).await
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: ExecuteParams<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteParams<'a> {
    context_id: &'a str,
    method: &'a str,
    args_json: Value,
    executor_public_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// JSON-RPC transport to a node's `/jsonrpc` endpoint.
pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
    auth_token: Option<String>,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(node_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(node_url, DEFAULT_RPC_TIMEOUT)
    }

    pub fn with_timeout(node_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ContextError::Transport(e.to_string()))?;

        Ok(Self {
            endpoint: format!("{}/jsonrpc", node_url.into().trim_end_matches('/')),
            client,
            auth_token: None,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, scope: &CallScope, method: &str, args: Value) -> Result<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: "execute",
            params: ExecuteParams {
                context_id: &scope.context_id,
                method,
                args_json: args,
                executor_public_key: &scope.executor_public_key,
            },
        };

        debug!(
            context_id = %scope.context_id,
            method,
            "Executing context method"
        );

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(classify_request_error)?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContextError::Transient(format!("HTTP {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContextError::Transport(format!("HTTP {status}: {body}")));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ContextError::Decode(format!("failed to parse response: {e}")))?;

        if let Some(error) = body.error {
            return Err(classify_rpc_error(&error));
        }
        Ok(body.result.unwrap_or(Value::Null))
    }
}

fn classify_request_error(e: reqwest::Error) -> ContextError {
    if e.is_timeout() || e.is_connect() {
        ContextError::Transient(e.to_string())
    } else {
        ContextError::Transport(e.to_string())
    }
}

/// Map a JSON-RPC error object onto the error taxonomy.
///
/// Uninitialised contexts and `UnknownServerError`s that carry a cause are
/// what a node reports while it is still syncing state.
pub fn classify_rpc_error(error: &Value) -> ContextError {
    let message = error_message(error);

    if error.get("type").and_then(Value::as_str) == Some("Uninitialized")
        || message.contains("Uninitialized")
    {
        return ContextError::Transient(message);
    }

    if let Some(inner) = error.get("error") {
        let unknown = inner.get("name").and_then(Value::as_str) == Some("UnknownServerError");
        if unknown && inner.get("cause").map(Value::is_object).unwrap_or(false) {
            return ContextError::Transient(message);
        }
    }

    ContextError::Rejected(message)
}

fn error_message(error: &Value) -> String {
    if let Some(s) = error.as_str() {
        return s.to_string();
    }
    if let Some(s) = error.get("message").and_then(Value::as_str) {
        return s.to_string();
    }
    match error.get("data") {
        Some(Value::String(s)) => s.clone(),
        Some(data) => data.to_string(),
        None => json!(error).to_string(),
    }
}
