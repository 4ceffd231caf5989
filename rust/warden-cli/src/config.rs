//! Configuration loading and validation.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use warden_auth::{
    AccessPolicy, Capability, Catalog, CatalogError, SessionSettings, SignInSettings,
};
use warden_ledger::{AddressError, LedgerSettings};

/// Overrides `ledger.contract_address`.
pub const CONTRACT_ADDRESS_VAR: &str = "WARDEN_CONTRACT_ADDRESS";
/// Overrides `ledger.rpc_url`.
pub const RPC_URL_VAR: &str = "WARDEN_RPC_URL";
/// Lets production mode start without a ledger.
pub const ALLOW_FAIL_OPEN_VAR: &str = "WARDEN_ALLOW_FAIL_OPEN";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for [`Config`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override is malformed.
    #[error("{var} is not a valid address: {source}")]
    Env {
        /// The variable.
        var: &'static str,
        /// Why it failed to parse.
        source: AddressError,
    },

    /// The configuration parsed but is unusable.
    #[error("invalid configuration: {}", join(.0))]
    Invalid(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validation errors for configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// `[[tools]]` is empty.
    #[error("at least one [[tools]] entry is required")]
    NoTools,
    /// The tool list cannot form a catalog.
    #[error("tools: {0}")]
    Catalog(#[from] CatalogError),
    /// `session.ttl_secs` is zero.
    #[error("session.ttl_secs must be positive")]
    ZeroTtl,
    /// Production mode accepts sign-in messages for any domain.
    #[error("sign_in.domain is required in production mode")]
    MissingDomain,
    /// `sign_in.max_age_secs` is zero.
    #[error("sign_in.max_age_secs must be positive")]
    ZeroMaxAge,
    /// `ledger.chain_id` is zero.
    #[error("ledger.chain_id must be positive")]
    ZeroChainId,
    /// `ledger.timeout_secs` is zero.
    #[error("ledger.timeout_secs must be positive")]
    ZeroTimeout,
    /// `ledger.confirmation_poll_ms` is zero.
    #[error("ledger.confirmation_poll_ms must be positive")]
    ZeroPollInterval,
    /// `ledger.rpc_url` is not a URL.
    #[error("ledger.rpc_url is not a valid URL: {0}")]
    InvalidRpcUrl(String),
    /// `ledger.rpc_url` is set without `ledger.sender`.
    #[error("ledger.sender is required when ledger.rpc_url is set")]
    MissingSender,
    /// `ledger.contract_init_code` is unusable.
    #[error("{0}")]
    InvalidInitCode(String),
}

/// Access policy table.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PolicyConfig {
    /// Fail-open or fail-closed behaviour.
    #[serde(default)]
    pub mode: AccessPolicy,
}

/// Process configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Ledger integration.
    #[serde(default)]
    pub ledger: LedgerSettings,
    /// Session lifetime.
    #[serde(default)]
    pub session: SessionSettings,
    /// Which sign-in messages are accepted.
    #[serde(default)]
    pub sign_in: SignInSettings,
    /// Access policy.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// The capability catalog.
    #[serde(default)]
    pub tools: Vec<Capability>,
}

impl Config {
    /// Load, apply environment overrides and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Config::from_toml(&content)?;
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Parse without overrides or validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides read through `lookup`. Empty values count
    /// as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|value| !value.is_empty());

        if let Some(value) = get(CONTRACT_ADDRESS_VAR) {
            let address = value.parse().map_err(|source| ConfigError::Env {
                var: CONTRACT_ADDRESS_VAR,
                source,
            })?;
            self.ledger.contract_address = Some(address);
        }
        if let Some(value) = get(RPC_URL_VAR) {
            self.ledger.rpc_url = Some(value);
        }
        Ok(())
    }

    /// Build the capability catalog.
    pub fn catalog(&self) -> Result<Catalog, CatalogError> {
        Catalog::new(self.tools.iter().cloned())
    }

    /// Validate, returning all errors found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.tools.is_empty() {
            errors.push(ValidationError::NoTools);
        } else if let Err(error) = self.catalog() {
            errors.push(error.into());
        }

        if self.session.ttl_secs == 0 {
            errors.push(ValidationError::ZeroTtl);
        }
        if self.sign_in.max_age_secs == 0 {
            errors.push(ValidationError::ZeroMaxAge);
        }
        if self.policy.mode == AccessPolicy::Production && self.sign_in.domain.is_none() {
            errors.push(ValidationError::MissingDomain);
        }

        let ledger = &self.ledger;
        if ledger.chain_id == 0 {
            errors.push(ValidationError::ZeroChainId);
        }
        if ledger.enabled {
            if ledger.timeout_secs == 0 {
                errors.push(ValidationError::ZeroTimeout);
            }
            if ledger.confirmation_poll_ms == 0 {
                errors.push(ValidationError::ZeroPollInterval);
            }
            if let Some(rpc_url) = &ledger.rpc_url {
                if let Err(error) = url::Url::parse(rpc_url) {
                    errors.push(ValidationError::InvalidRpcUrl(error.to_string()));
                }
                if ledger.sender.is_none() {
                    errors.push(ValidationError::MissingSender);
                }
            }
            if let Err(error) = ledger.init_code() {
                errors.push(ValidationError::InvalidInitCode(error.to_string()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
