//! C8/C9 collaborator — a minimal EVM JSON-RPC client.
//!
//! Deliberately narrow: this crate never streams logs, subscribes to new
//! heads, or builds a typed contract binding. It calls exactly three
//! methods (`eth_call`, `eth_getBalance`, `eth_getTransactionReceipt`),
//! mirroring the request/response/retry shape of `bridges/lifi.rs`'s HTTP
//! client rather than pulling in a provider/middleware stack like
//! `blockchain/rpc.rs` does for the full node-RPC surface this crate
//! doesn't need.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// A transaction receipt, trimmed to the fields this crate's confirmation
/// monitors actually read.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: Option<String>,
    pub status: Option<String>,
    pub gas_used: Option<String>,
}

impl TransactionReceipt {
    /// `status` is `"0x1"` on success, `"0x0"` on revert, absent on
    /// pre-Byzantium chains (none of this system's targets qualify, but
    /// defensively treat absence as "still pending").
    pub fn is_success(&self) -> Option<bool> {
        self.status.as_deref().map(|s| s == "0x1")
    }

    pub fn is_mined(&self) -> bool {
        self.block_number.is_some()
    }
}

/// One EVM chain's RPC endpoint. Stateless beyond the HTTP client and an
/// id counter for JSON-RPC request correlation.
pub struct RpcClient {
    http: Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("failed to build RPC http client"),
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut attempt = 0;
        loop {
            let response = self.http.post(&self.endpoint).json(&request).send().await;
            match response {
                Ok(resp) if resp.status().as_u16() == 429 && attempt < MAX_RETRIES => {
                    warn!(method, attempt, "rpc endpoint rate limited, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(500 * (attempt as u64 + 1))).await;
                    attempt += 1;
                    continue;
                }
                Ok(resp) if !resp.status().is_success() => {
                    return Err(anyhow!("rpc call {method} failed with status {}", resp.status()));
                }
                Ok(resp) => {
                    let body: JsonRpcResponse = resp.json().await?;
                    if let Some(error) = body.error {
                        return Err(anyhow!("rpc error {method} [{}]: {}", error.code, error.message));
                    }
                    return body.result.ok_or_else(|| anyhow!("rpc call {method} returned no result"));
                }
                Err(err) if attempt < MAX_RETRIES => {
                    debug!(method, attempt, error = %err, "rpc call failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(300 * (attempt as u64 + 1))).await;
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(anyhow!("rpc call {method} failed: {err}")),
            }
        }
    }

    /// `eth_call` against a fixed block tag (always `"latest"` — this
    /// crate never needs a historical read).
    pub async fn eth_call(&self, to: &str, data: &str) -> Result<String> {
        let tx = json!({ "to": to, "data": data });
        let result = self.call("eth_call", json!([tx, "latest"])).await?;
        result.as_str().map(str::to_string).ok_or_else(|| anyhow!("eth_call returned non-string result"))
    }

    pub async fn eth_get_balance(&self, address: &str) -> Result<num_bigint::BigUint> {
        let result = self.call("eth_getBalance", json!([address, "latest"])).await?;
        let hex_value = result.as_str().ok_or_else(|| anyhow!("eth_getBalance returned non-string result"))?;
        crate::calldata::decode_uint256(hex_value)
    }

    pub async fn eth_get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<TransactionReceipt>> {
        let result = self.call("eth_getTransactionReceipt", json!([tx_hash])).await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(result)?))
    }
}

/// Resolves a chain id to its RPC endpoint URL. Backed by a plain map
/// rather than a config file format of its own — callers build this from
/// [`crate::config::ClientConfig::rpc_endpoints`].
#[derive(Debug, Clone, Default)]
pub struct RpcEndpoints(HashMap<u64, String>);

impl RpcEndpoints {
    pub fn new(endpoints: HashMap<u64, String>) -> Self {
        Self(endpoints)
    }

    pub fn get(&self, chain_id: u64) -> Result<&str> {
        self.0.get(&chain_id).map(String::as_str).ok_or_else(|| anyhow!("no RPC endpoint configured for chain {chain_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_success_parses_status_word() {
        let receipt = TransactionReceipt {
            transaction_hash: "0xabc".into(),
            block_number: Some("0x10".into()),
            status: Some("0x1".into()),
            gas_used: Some("0x5208".into()),
        };
        assert_eq!(receipt.is_success(), Some(true));
        assert!(receipt.is_mined());
    }

    #[test]
    fn receipt_pending_has_no_block_number() {
        let receipt = TransactionReceipt { transaction_hash: "0xabc".into(), block_number: None, status: None, gas_used: None };
        assert!(!receipt.is_mined());
        assert_eq!(receipt.is_success(), None);
    }

    #[test]
    fn rpc_endpoints_errors_on_missing_chain() {
        let endpoints = RpcEndpoints::default();
        assert!(endpoints.get(1).is_err());
    }
}
