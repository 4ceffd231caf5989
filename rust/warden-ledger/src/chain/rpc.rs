use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::trace;

use crate::{Address, ChainError};

use super::{ChainClient, Receipt, TxRef};

/// Configuration for the [JsonRpcChain] client
#[derive(Clone, Debug)]
pub struct JsonRpcConfig {
    /// Node endpoint URL
    pub endpoint: String,

    /// Node-managed account that signs and pays for transactions
    pub sender: Address,

    /// Delay between receipt polls
    pub poll_interval: Duration,

    /// Optional per-request HTTP timeout
    pub request_timeout: Option<Duration>,
}

/// A [ChainClient] that talks Ethereum JSON-RPC to a node.
///
/// Transactions are sent with `eth_sendTransaction` from an account the node
/// manages, so signing and gas estimation stay on the node.
pub struct JsonRpcChain {
    config: JsonRpcConfig,
    client: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    status: Option<String>,
    contract_address: Option<Address>,
}

impl JsonRpcChain {
    /// Create a new JSON-RPC client with the given configuration
    pub fn new(config: JsonRpcConfig) -> Result<Self, ChainError> {
        let mut client_builder = reqwest::Client::builder();

        if let Some(timeout) = config.request_timeout {
            client_builder = client_builder.timeout(timeout);
        }

        let client = client_builder
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        Ok(Self {
            config,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!(method, id, "Sending JSON-RPC request");

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChainError::Transport(format!(
                "{method} returned HTTP {}",
                response.status()
            )));
        }

        let body: RpcResponse<T> = response.json().await?;
        match body.error {
            Some(RpcErrorObject { code, message }) => Err(ChainError::Rpc { code, message }),
            None => Ok(body.result),
        }
    }

    async fn required<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ChainError> {
        self.request(method, params)
            .await?
            .ok_or_else(|| ChainError::Malformed(format!("{method} returned no result")))
    }
}

fn hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn parse_hex_data(text: &str) -> Result<Vec<u8>, ChainError> {
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Malformed("hex data without 0x prefix".into()))?;
    hex::decode(digits).map_err(|e| ChainError::Malformed(e.to_string()))
}

#[async_trait]
impl ChainClient for JsonRpcChain {
    async fn submit(&self, to: Address, calldata: Vec<u8>) -> Result<TxRef, ChainError> {
        let hash: String = self
            .required(
                "eth_sendTransaction",
                json!([{
                    "from": self.config.sender,
                    "to": to,
                    "data": hex_data(&calldata),
                }]),
            )
            .await?;
        Ok(TxRef::new(hash))
    }

    async fn call(&self, to: Address, calldata: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let data: String = self
            .required(
                "eth_call",
                json!([{ "to": to, "data": hex_data(&calldata) }, "latest"]),
            )
            .await?;
        parse_hex_data(&data)
    }

    async fn confirm(&self, tx: &TxRef) -> Result<Receipt, ChainError> {
        loop {
            let receipt: Option<RpcReceipt> = self
                .request("eth_getTransactionReceipt", json!([tx.as_str()]))
                .await?;

            if let Some(receipt) = receipt {
                let success = receipt.status.as_deref() != Some("0x0");
                return Ok(Receipt {
                    tx: TxRef::new(receipt.transaction_hash),
                    success,
                    contract_address: receipt.contract_address,
                });
            }

            trace!(%tx, "Receipt not yet available");
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn deploy(&self, init_code: Vec<u8>) -> Result<TxRef, ChainError> {
        let hash: String = self
            .required(
                "eth_sendTransaction",
                json!([{
                    "from": self.config.sender,
                    "data": hex_data(&init_code),
                }]),
            )
            .await?;
        Ok(TxRef::new(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_round_trips_hex_data() {
        assert_eq!(hex_data(&[0xde, 0xad]), "0xdead");
        assert_eq!(parse_hex_data("0xdead").unwrap(), vec![0xde, 0xad]);
        assert_eq!(parse_hex_data("0x").unwrap(), Vec::<u8>::new());
        assert!(matches!(
            parse_hex_data("dead"),
            Err(ChainError::Malformed(_))
        ));
    }

    #[test]
    fn it_parses_receipts_from_the_node() {
        let receipt: RpcResponse<RpcReceipt> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "transactionHash": "0xabc",
                "status": "0x1",
                "contractAddress": "0x8626f6940e2eb28930efb4cef49b2d1f2c9c1199",
                "blockNumber": "0x10"
            }
        }))
        .unwrap();
        let receipt = receipt.result.unwrap();
        assert_eq!(receipt.transaction_hash, "0xabc");
        assert_eq!(receipt.status.as_deref(), Some("0x1"));
        assert!(receipt.contract_address.is_some());
    }

    #[test]
    fn it_parses_error_objects() {
        let response: RpcResponse<String> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "execution reverted" }
        }))
        .unwrap();
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32000);
    }

    #[test]
    fn it_builds_a_client() {
        let chain = JsonRpcChain::new(JsonRpcConfig {
            endpoint: "http://localhost:8545".into(),
            sender: Address::ZERO,
            poll_interval: Duration::from_millis(500),
            request_timeout: Some(Duration::from_secs(10)),
        });
        assert!(chain.is_ok());
    }
}
