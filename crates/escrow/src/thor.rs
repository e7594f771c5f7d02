//! Settlement chain access through the Thor REST API.

use async_trait::async_trait;
use cosmwasm_std::Uint128;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::abi::decode_uint;
use crate::clause::escrow_balance_call;
use crate::{ChainError, Clause, SettlementChain, TxReceipt};

/// Turns clauses into a signed raw transaction. Key custody lives behind
/// this trait.
#[async_trait]
pub trait ClauseSigner: Send + Sync {
    async fn sign(&self, clauses: &[Clause]) -> Result<String, ChainError>;
}

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    clauses: &'a [Clause],
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    raw: String,
}

/// Delegates signing to an external signing service.
pub struct RemoteSigner {
    url: String,
    client: reqwest::Client,
}

impl RemoteSigner {
    /// A signer that does not answer within `timeout` fails the send.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Request(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl ClauseSigner for RemoteSigner {
    async fn sign(&self, clauses: &[Clause]) -> Result<String, ChainError> {
        let response = self
            .client
            .post(&self.url)
            .json(&SignRequest { clauses })
            .send()
            .await
            .map_err(|e| ChainError::Request(e.to_string()))?;

        let signed: SignResponse = read_json(response).await?;
        Ok(signed.raw)
    }
}

#[derive(Debug, Serialize)]
struct RawTx {
    raw: String,
}

#[derive(Debug, Deserialize)]
struct TxIdResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReceiptResponse {
    reverted: bool,
    meta: ReceiptMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptMeta {
    block_number: u64,
}

#[derive(Debug, Serialize)]
struct CallRequest {
    clauses: Vec<CallClause>,
}

#[derive(Debug, Serialize)]
struct CallClause {
    to: String,
    value: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct CallResult {
    data: String,
    reverted: bool,
    #[serde(default, rename = "vmError")]
    vm_error: String,
}

/// Thor node client
pub struct ThorClient {
    base_url: String,
    escrow_contract: String,
    client: reqwest::Client,
    signer: Arc<dyn ClauseSigner>,
}

impl ThorClient {
    pub fn new(
        base_url: impl Into<String>,
        escrow_contract: impl Into<String>,
        signer: Arc<dyn ClauseSigner>,
        timeout: Duration,
    ) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Request(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            escrow_contract: escrow_contract.into(),
            client,
            signer,
        })
    }
}

#[async_trait]
impl SettlementChain for ThorClient {
    async fn send(&self, clauses: &[Clause]) -> Result<Option<String>, ChainError> {
        let raw = self.signer.sign(clauses).await?;
        let url = format!("{}/transactions", self.base_url);

        debug!(clauses = clauses.len(), "Broadcasting transaction");

        let response = match self.client.post(&url).json(&RawTx { raw }).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!("Broadcast timed out without a transaction id");
                return Ok(None);
            }
            Err(e) => return Err(ChainError::Request(e.to_string())),
        };

        let body: TxIdResponse = read_json(response).await?;
        Ok(body.id)
    }

    async fn receipt(&self, tx_id: &str) -> Result<Option<TxReceipt>, ChainError> {
        let url = format!("{}/transactions/{}/receipt", self.base_url, tx_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChainError::Request(e.to_string()))?;

        let receipt: Option<ReceiptResponse> = read_json(response).await?;
        Ok(receipt.map(|r| TxReceipt {
            reverted: r.reverted,
            block_number: r.meta.block_number,
        }))
    }

    async fn escrow_balance(&self, owner: &str, token: &str) -> Result<Uint128, ChainError> {
        let data =
            escrow_balance_call(owner, token).map_err(|e| ChainError::Response(e.to_string()))?;
        let url = format!("{}/accounts/*", self.base_url);
        let request = CallRequest {
            clauses: vec![CallClause {
                to: self.escrow_contract.clone(),
                value: "0x0".to_string(),
                data,
            }],
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::Request(e.to_string()))?;

        let results: Vec<CallResult> = read_json(response).await?;
        let result = results
            .into_iter()
            .next()
            .ok_or_else(|| ChainError::Response("empty call result".to_string()))?;

        if result.reverted {
            return Err(ChainError::Response(format!(
                "balance call reverted: {}",
                result.vm_error
            )));
        }

        decode_uint(&result.data).map_err(|e| ChainError::Response(e.to_string()))
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ChainError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ChainError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| ChainError::Response(format!("failed to parse response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_unresponsive_signer_times_out() {
        // Accepts connections but never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let signer =
            RemoteSigner::new(format!("http://{addr}/sign"), Duration::from_millis(100)).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), signer.sign(&[]))
            .await
            .expect("signer call should fail on its own timeout");

        assert!(matches!(result, Err(ChainError::Request(_))));
        server.abort();
    }
}
