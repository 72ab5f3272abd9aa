mod http;
pub mod test_utils;

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::Deserialize;

pub use http::HttpRpc;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected http status {0}")]
    Status(reqwest::StatusCode),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The subset of a transaction receipt needed to find the address a transaction touched
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(default)]
    pub contract_address: Option<Address>,

    #[serde(default)]
    pub to: Option<Address>,
}

impl Receipt {
    /// The created contract for deployments, the destination otherwise
    pub fn candidate(&self) -> Option<Address> {
        self.contract_address.or(self.to)
    }
}

/// Read-only view of chain state, as exposed by a JSON-RPC node
///
/// Abstracted so the watcher can be driven by a rotating pool of HTTP nodes in production, and
/// by an in-memory chain in tests
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Current chain head
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Transaction hashes of a block. `None` if the node doesn't know the block yet
    async fn block_transactions(&self, number: u64) -> Result<Option<Vec<B256>>, RpcError>;

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError>;

    /// Deployed bytecode at the latest block. Empty for externally owned accounts
    async fn code(&self, address: Address) -> Result<Bytes, RpcError>;

    /// Balance in wei at the latest block
    async fn balance(&self, address: Address) -> Result<U256, RpcError>;
}

#[async_trait]
impl<T: ChainRpc + ?Sized> ChainRpc for Arc<T> {
    async fn block_number(&self) -> Result<u64, RpcError> {
        (**self).block_number().await
    }

    async fn block_transactions(&self, number: u64) -> Result<Option<Vec<B256>>, RpcError> {
        (**self).block_transactions(number).await
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError> {
        (**self).transaction_receipt(hash).await
    }

    async fn code(&self, address: Address) -> Result<Bytes, RpcError> {
        (**self).code(address).await
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        (**self).balance(address).await
    }
}
