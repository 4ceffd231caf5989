use crate::{Address, ChainError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

mod memory;
pub use memory::*;

mod rpc;
pub use rpc::*;

/// Reference to a submitted transaction (its hash, as reported by the chain).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(String);

impl TxRef {
    /// Wrap a transaction hash string.
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// The transaction hash.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxRef({})", self.0)
    }
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// The transaction this receipt confirms.
    pub tx: TxRef,
    /// `false` if execution reverted.
    pub success: bool,
    /// Address of the created contract, for deployments.
    pub contract_address: Option<Address>,
}

/// A [ChainClient] is a facade over whatever node, wallet or emulator can
/// carry the session contract's calls.
///
/// Transaction signing, gas and broadcasting are the implementation's
/// business. The gateway only needs to submit calldata, read through a
/// call, wait for a receipt and deploy the contract once.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Submit a state-changing call to `to` and return its transaction
    /// reference without waiting for it to be mined.
    async fn submit(&self, to: Address, calldata: Vec<u8>) -> Result<TxRef, ChainError>;

    /// Execute a read-only call against `to` and return the raw return data.
    async fn call(&self, to: Address, calldata: Vec<u8>) -> Result<Vec<u8>, ChainError>;

    /// Wait until `tx` is mined and return its receipt.
    async fn confirm(&self, tx: &TxRef) -> Result<Receipt, ChainError>;

    /// Submit a contract-creation transaction carrying `init_code`.
    async fn deploy(&self, init_code: Vec<u8>) -> Result<TxRef, ChainError>;
}
