//! The single point of contact with the session contract.

use std::{future::Future, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{
    Address, ChainClient, ChainError, Commitment, LedgerError, LedgerSettings, Operation,
    SessionCall, SessionRecord, TxRef, decode_bool, decode_session,
};

/// Where a session lives, as reported to relying parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnChainInfo {
    /// The session contract, or `None` while it is still being provisioned.
    pub contract_address: Option<Address>,
    /// Human-readable network name.
    pub network: String,
    /// Chain id.
    pub chain_id: u64,
}

/// Reads and writes session commitments through a [`ChainClient`].
///
/// Construct one per process and share it behind an [`Arc`]. The contract
/// address is resolved at most once: a configured address is adopted at
/// construction, otherwise [`LedgerGateway::ensure_provisioned`] deploys the
/// contract and caches the result for the lifetime of the gateway.
///
/// Writes wait for their receipt. A returned [`TxRef`] always names a mined
/// transaction, and every round-trip is bounded by
/// [`LedgerSettings::timeout`].
pub struct LedgerGateway {
    client: Arc<dyn ChainClient>,
    settings: LedgerSettings,
    contract: OnceCell<Address>,
}

impl LedgerGateway {
    /// Create a gateway over `client`.
    pub fn new(client: Arc<dyn ChainClient>, settings: LedgerSettings) -> Self {
        let contract = OnceCell::new_with(settings.contract_address);
        Self {
            client,
            settings,
            contract,
        }
    }

    /// The settings this gateway was built with.
    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// The session contract, once known.
    pub fn contract_address(&self) -> Option<Address> {
        self.contract.get().copied()
    }

    /// Network identity for response shaping.
    pub fn on_chain_info(&self) -> OnChainInfo {
        OnChainInfo {
            contract_address: self.contract_address(),
            network: self.settings.network.clone(),
            chain_id: self.settings.chain_id,
        }
    }

    /// Resolve the session contract, deploying it if nothing is configured.
    ///
    /// Concurrent first calls are serialized; exactly one deployment is
    /// submitted and every caller observes its address. Once resolved the
    /// address never changes.
    pub async fn ensure_provisioned(&self) -> Result<Address, LedgerError> {
        let address = self.contract.get_or_try_init(|| self.deploy()).await?;
        Ok(*address)
    }

    /// Store `commitment` for `owner`, replacing any previous session.
    pub async fn register(
        &self,
        owner: Address,
        commitment: Commitment,
        ttl: Duration,
    ) -> Result<TxRef, LedgerError> {
        debug!(%owner, %commitment, ttl = ttl.as_secs(), "Registering session");
        self.write(
            Operation::Register,
            SessionCall::Register {
                owner,
                commitment,
                ttl: ttl.as_secs(),
            },
        )
        .await
    }

    /// Mark `owner`'s session inactive.
    pub async fn revoke(&self, owner: Address) -> Result<TxRef, LedgerError> {
        let call = SessionCall::Revoke { owner };
        self.write(Operation::Revoke, call).await
    }

    /// Returns `true` only when the ledger positively attests that `owner`
    /// holds a live session committed to exactly `commitment`.
    ///
    /// Any failure to obtain that answer is logged and reported as `false`.
    pub async fn verify(&self, owner: Address, commitment: Commitment) -> bool {
        match self.try_verify(owner, commitment).await {
            Ok(verified) => verified,
            Err(error) => {
                warn!(
                    %owner,
                    operation = %Operation::Verify,
                    error = %error,
                    cause = ?std::error::Error::source(&error).map(ToString::to_string),
                    "Ledger verification failed; treating session as unverified"
                );
                false
            }
        }
    }

    /// Like [`LedgerGateway::verify`] but surfaces the failure.
    pub async fn try_verify(
        &self,
        owner: Address,
        commitment: Commitment,
    ) -> Result<bool, LedgerError> {
        let call = SessionCall::Verify { owner, commitment };
        let data = self.read(Operation::Verify, call).await?;
        let verified = decode_bool(&data)
            .map_err(|e| LedgerError::from_chain(Operation::Verify, ChainError::Abi(e)))?;
        debug!(%owner, %commitment, verified, "Ledger verification answered");
        Ok(verified)
    }

    /// Read `owner`'s session record.
    pub async fn get(&self, owner: Address) -> Result<SessionRecord, LedgerError> {
        let call = SessionCall::Get { owner };
        let data = self.read(Operation::Get, call).await?;
        decode_session(&data)
            .map_err(|e| LedgerError::from_chain(Operation::Get, ChainError::Abi(e)))
    }

    fn contract(&self) -> Result<Address, LedgerError> {
        self.contract_address()
            .ok_or(LedgerError::ContractNotProvisioned)
    }

    async fn deploy(&self) -> Result<Address, LedgerError> {
        let init_code = self
            .settings
            .init_code()?
            .ok_or(LedgerError::ContractNotProvisioned)?;
        info!(
            network = %self.settings.network,
            chain_id = self.settings.chain_id,
            "Deploying session contract"
        );

        let client = &self.client;
        let receipt = self
            .bounded(Operation::Deploy, async {
                let tx = client.deploy(init_code).await?;
                client.confirm(&tx).await
            })
            .await?;
        if !receipt.success {
            return Err(LedgerError::from_chain(
                Operation::Deploy,
                ChainError::Reverted(receipt.tx),
            ));
        }

        let address = receipt.contract_address.ok_or_else(|| {
            LedgerError::from_chain(
                Operation::Deploy,
                ChainError::Malformed("deployment receipt carries no contract address".into()),
            )
        })?;
        info!(contract = %address, tx = %receipt.tx, "Session contract deployed");
        Ok(address)
    }

    async fn write(&self, operation: Operation, call: SessionCall) -> Result<TxRef, LedgerError> {
        let owner = call.owner();
        let contract = self.contract()?;
        let client = &self.client;

        let result = self
            .bounded(operation, async {
                let tx = client.submit(contract, call.encode()).await?;
                let receipt = client.confirm(&tx).await?;
                if receipt.success {
                    Ok(tx)
                } else {
                    Err(ChainError::Reverted(tx))
                }
            })
            .await;

        match &result {
            Ok(tx) => info!(%owner, %operation, %tx, "Ledger write confirmed"),
            Err(error) => warn!(
                %owner,
                %operation,
                error = %error,
                cause = ?std::error::Error::source(error).map(ToString::to_string),
                "Ledger write failed"
            ),
        }
        result
    }

    async fn read(&self, operation: Operation, call: SessionCall) -> Result<Vec<u8>, LedgerError> {
        let contract = self.contract()?;
        let future = self.client.call(contract, call.encode());
        self.bounded(operation, future).await
    }

    async fn bounded<T, F>(&self, operation: Operation, future: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, ChainError>>,
    {
        let after = self.settings.timeout();
        match tokio::time::timeout(after, future).await {
            Ok(result) => result.map_err(|source| LedgerError::from_chain(operation, source)),
            Err(_) => Err(LedgerError::LedgerTimeout { operation, after }),
        }
    }
}
