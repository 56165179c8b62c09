//! JSON-RPC client for Ethereum-compatible nodes.
//!
//! Speaks just enough of the JSON-RPC 2.0 API to drive the indexer:
//! `eth_blockNumber` and `eth_getBlockByNumber` with full transaction bodies.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::trace;

use crate::chain::types::{parse_block_number, to_quantity, RpcBlock, Transaction};
use crate::chain::BlockReader;
use crate::error::{Error, Result};

const ETH_BLOCK_NUMBER: &str = "eth_blockNumber";
const ETH_GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for the JSON-RPC client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcClientConfig {
    /// Node endpoint
    pub url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            url: "https://cloudflare-eth.com".to_string(),
            timeout_secs: 30,
            user_agent: format!("txwatch/{}", crate::VERSION),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESPONSE ENVELOPE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

impl RpcEnvelope {
    fn into_result(self) -> Result<Value> {
        if let Some(err) = self.error {
            return Err(Error::RpcResponse {
                code: err.code,
                message: err.message,
            });
        }
        match self.result {
            Some(Value::Null) | None => Err(Error::Decode("empty result".into())),
            Some(value) => Ok(value),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

/// HTTP JSON-RPC block reader
pub struct JsonRpcClient {
    client: Client,
    config: RpcClientConfig,
}

impl JsonRpcClient {
    /// Create a new client
    pub fn new(config: RpcClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });
        trace!(method, "JSON-RPC call");

        let envelope: RpcEnvelope = self
            .client
            .post(&self.config.url)
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;

        envelope.into_result()
    }
}

#[async_trait]
impl BlockReader for JsonRpcClient {
    async fn latest_block_number(&self) -> Result<u64> {
        let result = self.call(ETH_BLOCK_NUMBER, json!([])).await?;
        let quantity = result
            .as_str()
            .ok_or_else(|| Error::Decode(format!("expected hex string, got {}", result)))?;
        parse_block_number(quantity)
    }

    async fn block_transactions(&self, block_number: u64) -> Result<Vec<Transaction>> {
        let result = self
            .call(ETH_GET_BLOCK_BY_NUMBER, json!([to_quantity(block_number), true]))
            .await?;
        decode_block(result)
    }
}

fn decode_block(value: Value) -> Result<Vec<Transaction>> {
    let block: RpcBlock = serde_json::from_value(value)?;
    block
        .transactions
        .into_iter()
        .map(Transaction::try_from)
        .collect()
}
