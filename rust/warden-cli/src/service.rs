use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};
use warden_auth::{
    AccessPolicy, AuthorizationGate, CatalogError, ClaimIssuer, SessionRegistry, SignInVerifier,
};
use warden_ledger::{
    ChainClient, ChainError, JsonRpcChain, JsonRpcConfig, Ledger, LedgerGateway, LedgerSettings,
    MemoryChain,
};

use crate::{ALLOW_FAIL_OPEN_VAR, Config};

/// Errors that stop the process from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The tool list cannot form a catalog.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The chain client could not be constructed.
    #[error("failed to construct chain client: {0}")]
    Chain(#[from] ChainError),

    /// A JSON-RPC chain needs a sending account.
    #[error("ledger.sender is required when ledger.rpc_url is set")]
    MissingSender,

    /// Production mode without a ledger would refuse every request.
    #[error(
        "refusing to start in production mode with the ledger disabled; \
         set {ALLOW_FAIL_OPEN_VAR}=1 to override"
    )]
    LedgerRequired,
}

/// Construct the chain client `settings` describe, or `None` when the
/// ledger is disabled.
pub fn chain_client(
    settings: &LedgerSettings,
) -> Result<Option<Arc<dyn ChainClient>>, StartupError> {
    if !settings.enabled {
        return Ok(None);
    }

    match &settings.rpc_url {
        Some(endpoint) => {
            let sender = settings.sender.ok_or(StartupError::MissingSender)?;
            let chain = JsonRpcChain::new(JsonRpcConfig {
                endpoint: endpoint.clone(),
                sender,
                poll_interval: settings.confirmation_poll(),
                request_timeout: Some(settings.timeout()),
            })?;
            info!(%endpoint, %sender, network = %settings.network, "Using JSON-RPC chain");
            Ok(Some(Arc::new(chain)))
        }
        None => {
            warn!(
                "No ledger.rpc_url configured; \
                 using an in-memory chain that lives only as long as this process"
            );
            let chain = match settings.contract_address {
                Some(address) => MemoryChain::with_contract(address),
                None => MemoryChain::default(),
            };
            Ok(Some(Arc::new(chain)))
        }
    }
}

/// Refuse a production start without a ledger unless explicitly overridden.
pub fn check_policy(
    policy: AccessPolicy,
    ledger: &Ledger,
    allow_override: bool,
) -> Result<(), StartupError> {
    match (policy, ledger.is_enabled()) {
        (AccessPolicy::Development, enabled) => {
            warn!(
                ledger_enabled = enabled,
                "Development mode: requests without a claim are admitted, \
                 and claims are not checked on-chain when the ledger is disabled"
            );
            Ok(())
        }
        (AccessPolicy::Production, true) => Ok(()),
        (AccessPolicy::Production, false) if allow_override => {
            warn!(
                "Production mode with the ledger disabled (allowed via {ALLOW_FAIL_OPEN_VAR}); \
                 every claim will be refused"
            );
            Ok(())
        }
        (AccessPolicy::Production, false) => {
            error!(
                "Production mode requires the ledger; \
                 enable [ledger] or set {ALLOW_FAIL_OPEN_VAR}=1"
            );
            Err(StartupError::LedgerRequired)
        }
    }
}

/// Every component wired from one [`Config`].
#[derive(Clone)]
pub struct Services {
    /// The shared ledger handle.
    pub ledger: Ledger,
    /// Sign-in handling.
    pub issuer: ClaimIssuer,
    /// Request-time authorization.
    pub gate: AuthorizationGate,
    /// Status, verification and revocation.
    pub registry: SessionRegistry,
}

impl Services {
    /// Wire services with the chain client the configuration names.
    pub fn build(config: &Config, allow_override: bool) -> Result<Self, StartupError> {
        let client = chain_client(&config.ledger)?;
        Self::with_client(config, client, allow_override)
    }

    /// Wire services over an explicit chain client.
    pub fn with_client(
        config: &Config,
        client: Option<Arc<dyn ChainClient>>,
        allow_override: bool,
    ) -> Result<Self, StartupError> {
        let catalog = Arc::new(config.catalog()?);
        let ledger = match client {
            Some(client) => Ledger::enabled(LedgerGateway::new(client, config.ledger.clone())),
            None => Ledger::Disabled,
        };

        let policy = config.policy.mode;
        check_policy(policy, &ledger, allow_override)?;

        let verifier = SignInVerifier::new(config.ledger.chain_id, config.sign_in.clone());
        Ok(Self {
            issuer: ClaimIssuer::new(catalog, ledger.clone(), verifier.clone())
                .with_session(config.session),
            gate: AuthorizationGate::new(ledger.clone(), policy),
            registry: SessionRegistry::new(ledger.clone(), verifier),
            ledger,
        })
    }

    /// Log the operating mode and resolve the session contract.
    ///
    /// A provisioning failure is logged, not returned: issuance keeps working
    /// and hands out unanchored claims until the contract is reachable.
    pub async fn start(&self) {
        info!(
            policy = %self.gate.policy(),
            ledger_enabled = self.ledger.is_enabled(),
            chain_id = self.issuer.chain_id(),
            sign_in_domain = ?self.issuer.verifier().settings().domain.as_deref(),
            tools = self.issuer.catalog().len(),
            "Starting warden"
        );

        let Ok(gateway) = self.ledger.gateway() else {
            return;
        };
        match gateway.ensure_provisioned().await {
            Ok(address) => info!(contract = %address, "Using session contract"),
            Err(error) => warn!(
                error = %error,
                cause = ?std::error::Error::source(&error).map(ToString::to_string),
                "Failed to set up session contract"
            ),
        }
    }
}
