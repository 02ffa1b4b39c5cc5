//! Soroban JSON-RPC client.
//!
//! Thin wrapper over the `getLatestLedger` / `getEvents` /
//! `simulateTransaction` / `sendTransaction` / `getTransaction` methods. An
//! `error` member in a 200 response body is surfaced as [`RpcError::Rpc`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as Json};
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// RPC client errors
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed rpc response: {0}")]
    Malformed(String),
}

/// One contract event as returned by `getEvents`. Topic entries and the
/// payload are kept as raw JSON; the decoder copes with both the XDR-blob
/// and pre-expanded shapes.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub ledger: u32,
    #[serde(default)]
    pub topic: Vec<Json>,
    #[serde(default)]
    pub value: Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    Pending,
    Duplicate,
    TryAgainLater,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    Success,
    Failed,
    NotFound,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionResponse {
    pub status: SendStatus,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub error_result_xdr: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTransactionResponse {
    pub status: TxStatus,
    #[serde(default)]
    pub result_xdr: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResponse {
    #[serde(default)]
    pub error: Option<String>,
    /// Base64 `SorobanTransactionData` to splice into the transaction ext.
    #[serde(default)]
    pub transaction_data: Option<String>,
    /// Resource fee in stroops, as a decimal string.
    #[serde(default)]
    pub min_resource_fee: Option<String>,
    #[serde(default)]
    pub results: Vec<SimulateHostResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateHostResult {
    /// Base64 `SorobanAuthorizationEntry` blobs for the invocation.
    #[serde(default)]
    pub auth: Vec<String>,
    #[serde(default)]
    pub xdr: Option<String>,
}

/// Read-side ledger queries, split out so the poller can run against a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    async fn latest_ledger(&self) -> Result<u32, RpcError>;

    async fn contract_events(
        &self,
        start_ledger: u32,
        contract_id: &str,
        limit: u32,
    ) -> Result<Vec<RawEvent>, RpcError>;
}

pub struct SorobanRpcClient {
    client: reqwest::Client,
    url: String,
}

impl SorobanRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    async fn call(&self, method: &str, params: Json) -> Result<Json, RpcError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        let body: Json = response.json().await?;
        if let Some(err) = body.get("error") {
            return Err(RpcError::Rpc {
                code: err.get("code").and_then(Json::as_i64).unwrap_or(0),
                message: err
                    .get("message")
                    .and_then(Json::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| RpcError::Malformed(format!("{method}: missing result")))
    }

    pub async fn get_latest_ledger(&self) -> Result<u32, RpcError> {
        let result = self.call("getLatestLedger", json!({})).await?;
        result
            .get("sequence")
            .and_then(Json::as_u64)
            .map(|s| s as u32)
            .ok_or_else(|| RpcError::Malformed("getLatestLedger: missing sequence".to_string()))
    }

    pub async fn get_events(
        &self,
        start_ledger: u32,
        contract_id: &str,
        limit: u32,
    ) -> Result<Vec<RawEvent>, RpcError> {
        let params = json!({
            "startLedger": start_ledger,
            "filters": [{
                "type": "contract",
                "contractIds": [contract_id],
            }],
            "pagination": { "limit": limit },
        });
        let result = self.call("getEvents", params).await?;
        let events = result.get("events").cloned().unwrap_or(Json::Array(vec![]));
        serde_json::from_value(events).map_err(|e| RpcError::Malformed(format!("getEvents: {e}")))
    }

    pub async fn simulate_transaction(
        &self,
        envelope_b64: &str,
    ) -> Result<SimulateResponse, RpcError> {
        let result = self
            .call("simulateTransaction", json!({ "transaction": envelope_b64 }))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::Malformed(format!("simulateTransaction: {e}")))
    }

    pub async fn send_transaction(
        &self,
        envelope_b64: &str,
    ) -> Result<SendTransactionResponse, RpcError> {
        let result = self
            .call("sendTransaction", json!({ "transaction": envelope_b64 }))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::Malformed(format!("sendTransaction: {e}")))
    }

    pub async fn get_transaction(&self, hash: &str) -> Result<GetTransactionResponse, RpcError> {
        let result = self.call("getTransaction", json!({ "hash": hash })).await?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::Malformed(format!("getTransaction: {e}")))
    }
}

#[async_trait]
impl LedgerQuery for SorobanRpcClient {
    async fn latest_ledger(&self) -> Result<u32, RpcError> {
        self.get_latest_ledger().await
    }

    async fn contract_events(
        &self,
        start_ledger: u32,
        contract_id: &str,
        limit: u32,
    ) -> Result<Vec<RawEvent>, RpcError> {
        self.get_events(start_ledger, contract_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_event_deserializes() {
        let payload = json!({
            "type": "contract",
            "ledger": 4500,
            "id": "0004599586954117120-0000000001",
            "pagingToken": "0004599586954117120-0000000001",
            "topic": ["AAAADwAAAARsb2Nr"],
            "value": "AAAAAQ==",
            "inSuccessfulContractCall": true
        });
        let event: RawEvent = serde_json::from_value(payload).unwrap();
        assert_eq!(event.ledger, 4500);
        assert_eq!(event.id, "0004599586954117120-0000000001");
        assert_eq!(event.topic.len(), 1);
    }

    #[test]
    fn raw_event_tolerates_missing_fields() {
        let event: RawEvent = serde_json::from_value(json!({})).unwrap();
        assert!(event.id.is_empty());
        assert!(event.value.is_null());
    }

    #[test]
    fn send_status_covers_wire_strings() {
        let resp: SendTransactionResponse = serde_json::from_value(json!({
            "status": "TRY_AGAIN_LATER",
            "hash": "abc"
        }))
        .unwrap();
        assert_eq!(resp.status, SendStatus::TryAgainLater);

        let resp: SendTransactionResponse =
            serde_json::from_value(json!({"status": "DUPLICATE", "hash": "abc"})).unwrap();
        assert_eq!(resp.status, SendStatus::Duplicate);

        let resp: SendTransactionResponse =
            serde_json::from_value(json!({"status": "SOMETHING_NEW", "hash": "abc"})).unwrap();
        assert_eq!(resp.status, SendStatus::Unknown);
    }

    #[test]
    fn tx_status_covers_wire_strings() {
        let resp: GetTransactionResponse =
            serde_json::from_value(json!({"status": "NOT_FOUND"})).unwrap();
        assert_eq!(resp.status, TxStatus::NotFound);

        let resp: GetTransactionResponse = serde_json::from_value(json!({
            "status": "FAILED",
            "resultXdr": "AAAA"
        }))
        .unwrap();
        assert_eq!(resp.status, TxStatus::Failed);
        assert_eq!(resp.result_xdr.as_deref(), Some("AAAA"));
    }

    #[test]
    fn simulate_response_deserializes() {
        let resp: SimulateResponse = serde_json::from_value(json!({
            "transactionData": "AAAD",
            "minResourceFee": "58181",
            "results": [{"auth": ["AAAB"], "xdr": "AAAC"}],
            "latestLedger": 1234
        }))
        .unwrap();
        assert!(resp.error.is_none());
        assert_eq!(resp.min_resource_fee.as_deref(), Some("58181"));
        assert_eq!(resp.results[0].auth, vec!["AAAB".to_string()]);
    }
}
