use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    Address, ChainError, SessionCall, SessionRecord, encode_bool, encode_session, keccak256_iter,
};

use super::{ChainClient, Receipt, TxRef};

#[derive(Default)]
struct ChainState {
    contracts: HashMap<Address, HashMap<Address, SessionRecord>>,
    receipts: HashMap<TxRef, Receipt>,
    nonce: u64,
    deployments: usize,
    skew: u64,
    offline: bool,
}

impl ChainState {
    fn next_digest(&mut self, payload: &[u8]) -> [u8; 32] {
        self.nonce += 1;
        let nonce = self.nonce.to_be_bytes();
        keccak256_iter([b"warden-memory-chain".as_slice(), &nonce, payload])
    }

    fn next_hash(&mut self, payload: &[u8]) -> TxRef {
        TxRef::new(format!("0x{}", hex::encode(self.next_digest(payload))))
    }

    fn now(&self) -> u64 {
        u64::try_from(Utc::now().timestamp()).unwrap_or_default() + self.skew
    }

    fn ensure_online(&self) -> Result<(), ChainError> {
        if self.offline {
            Err(ChainError::Transport("memory chain is offline".into()))
        } else {
            Ok(())
        }
    }
}

/// An in-process emulation of a chain carrying the session contract.
///
/// Calldata is decoded with [`SessionCall`] and executed with the contract's
/// semantics, so the gateway exercises exactly the bytes it would send to a
/// node. Writes take effect on submission; [`ChainClient::confirm`] waits for
/// the configured latency before handing back the receipt. Each receipt is
/// handed out once and then dropped, so a long-lived emulator does not
/// accumulate them. Clones share the same chain.
#[derive(Clone, Default)]
pub struct MemoryChain {
    state: Arc<RwLock<ChainState>>,
    latency: Duration,
    call_latency: Duration,
}

impl MemoryChain {
    /// A chain that already carries a session contract at `address`.
    pub fn with_contract(address: Address) -> Self {
        let mut state = ChainState::default();
        state.contracts.insert(address, HashMap::new());
        Self {
            state: Arc::new(RwLock::new(state)),
            ..Self::default()
        }
    }

    /// Delay every confirmation by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delay every read-only call by `latency`.
    pub fn with_call_latency(mut self, latency: Duration) -> Self {
        self.call_latency = latency;
        self
    }

    /// Move the chain clock forward by `by`.
    pub async fn advance(&self, by: Duration) {
        self.state.write().await.skew += by.as_secs();
    }

    /// Simulate a lost connection: every request fails with a transport error
    /// while `offline` is set.
    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }

    /// Number of contract deployments this chain has executed.
    pub async fn deployments(&self) -> usize {
        self.state.read().await.deployments
    }

    /// Read a stored session directly, bypassing the ABI.
    pub async fn session(&self, contract: Address, owner: Address) -> Option<SessionRecord> {
        let state = self.state.read().await;
        state.contracts.get(&contract)?.get(&owner).copied()
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    async fn submit(&self, to: Address, calldata: Vec<u8>) -> Result<TxRef, ChainError> {
        let call = SessionCall::decode(&calldata)?;
        let mut state = self.state.write().await;
        state.ensure_online()?;
        if !call.is_write() {
            return Err(ChainError::Malformed(format!(
                "{} is a view function",
                call.signature()
            )));
        }

        let now = state.now();
        let sessions = state
            .contracts
            .get_mut(&to)
            .ok_or_else(|| ChainError::NoContract(to.to_string()))?;
        match call {
            SessionCall::Register {
                owner,
                commitment,
                ttl,
            } => {
                sessions.insert(
                    owner,
                    SessionRecord {
                        commitment,
                        expires_at: now.saturating_add(ttl),
                        active: true,
                    },
                );
            }
            SessionCall::Revoke { owner } => {
                if let Some(record) = sessions.get_mut(&owner) {
                    record.active = false;
                }
            }
            SessionCall::Verify { .. } | SessionCall::Get { .. } => {}
        }

        let tx = state.next_hash(&calldata);
        state.receipts.insert(
            tx.clone(),
            Receipt {
                tx: tx.clone(),
                success: true,
                contract_address: None,
            },
        );
        Ok(tx)
    }

    async fn call(&self, to: Address, calldata: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let call = SessionCall::decode(&calldata)?;
        if !self.call_latency.is_zero() {
            tokio::time::sleep(self.call_latency).await;
        }
        let state = self.state.read().await;
        state.ensure_online()?;
        let sessions = state
            .contracts
            .get(&to)
            .ok_or_else(|| ChainError::NoContract(to.to_string()))?;
        let record = sessions.get(&call.owner()).copied().unwrap_or_default();

        match call {
            SessionCall::Verify { commitment, .. } => {
                Ok(encode_bool(record.attests(&commitment, state.now())))
            }
            SessionCall::Get { .. } => Ok(encode_session(&record)),
            SessionCall::Register { .. } | SessionCall::Revoke { .. } => Err(
                ChainError::Malformed(format!("{} changes state", call.signature())),
            ),
        }
    }

    async fn confirm(&self, tx: &TxRef) -> Result<Receipt, ChainError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut state = self.state.write().await;
        state.ensure_online()?;
        state
            .receipts
            .remove(tx)
            .ok_or_else(|| ChainError::UnknownTransaction(tx.clone()))
    }

    async fn deploy(&self, init_code: Vec<u8>) -> Result<TxRef, ChainError> {
        let mut state = self.state.write().await;
        state.ensure_online()?;
        if init_code.is_empty() {
            return Err(ChainError::Malformed("empty init code".into()));
        }

        let digest = state.next_digest(&init_code);
        let tx = TxRef::new(format!("0x{}", hex::encode(digest)));
        let address = Address::from_digest(&digest);

        state.contracts.insert(address, HashMap::new());
        state.deployments += 1;
        state.receipts.insert(
            tx.clone(),
            Receipt {
                tx: tx.clone(),
                success: true,
                contract_address: Some(address),
            },
        );
        Ok(tx)
    }
}
