use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use url::Url;

use super::{ChainRpc, Receipt, RpcError};

/// JSON-RPC client for a single HTTP(S) node
///
/// Holds one `reqwest::Client`, so consecutive calls reuse the same pooled connection
#[derive(Debug)]
pub struct HttpRpc {
    url: Url,
    client: reqwest::Client,
    id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    result: Value,
    error: Option<ErrorObject>,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct BlockHashes {
    #[serde(default)]
    transactions: Vec<B256>,
}

impl HttpRpc {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            url: Url::parse(url)?,
            client,
            id: AtomicU64::new(1),
        })
    }

    /// Sends a single JSON-RPC request
    ///
    /// Any non-2xx status, and any response carrying an `error` object, is an error, even if the
    /// body also holds a result
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        let id = self.id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let resp = self.client.post(self.url.clone()).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RpcError::Status(status));
        }

        let bytes = resp.bytes().await?;
        let resp: Response = serde_json::from_slice(&bytes)?;

        if let Some(err) = resp.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        Ok(serde_json::from_value(resp.result)?)
    }
}

#[async_trait]
impl ChainRpc for HttpRpc {
    async fn block_number(&self) -> Result<u64, RpcError> {
        let number: U64 = self.request("eth_blockNumber", json!([])).await?;
        Ok(number.to::<u64>())
    }

    async fn block_transactions(&self, number: u64) -> Result<Option<Vec<B256>>, RpcError> {
        let block: Option<BlockHashes> = self
            .request(
                "eth_getBlockByNumber",
                json!([format!("{:#x}", number), false]),
            )
            .await?;

        Ok(block.map(|b| b.transactions))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError> {
        self.request("eth_getTransactionReceipt", json!([hash]))
            .await
    }

    async fn code(&self, address: Address) -> Result<Bytes, RpcError> {
        self.request("eth_getCode", json!([address, "latest"])).await
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        self.request("eth_getBalance", json!([address, "latest"]))
            .await
    }
}
