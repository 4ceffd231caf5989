use crate::{Address, LedgerError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_network() -> String {
    "Soneium Minato".to_string()
}

fn default_chain_id() -> u64 {
    1946
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_confirmation_poll_ms() -> u64 {
    500
}

fn default_enabled() -> bool {
    true
}

/// Settings for the ledger integration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Human-readable network name reported to relying parties.
    #[serde(default = "default_network")]
    pub network: String,

    /// Chain id sign-in messages must name.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Set to `false` to run without any ledger integration.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// JSON-RPC endpoint. Without one the process uses an in-memory chain.
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Node-managed account that submits transactions.
    #[serde(default)]
    pub sender: Option<Address>,

    /// Deployed session contract. Reused as-is when present.
    #[serde(default)]
    pub contract_address: Option<Address>,

    /// Hex init code deployed once when no contract address is configured.
    #[serde(default)]
    pub contract_init_code: Option<String>,

    /// Bound on every ledger round-trip, confirmation included.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Receipt polling interval for JSON-RPC chains.
    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            network: default_network(),
            chain_id: default_chain_id(),
            enabled: default_enabled(),
            rpc_url: None,
            sender: None,
            contract_address: None,
            contract_init_code: None,
            timeout_secs: default_timeout_secs(),
            confirmation_poll_ms: default_confirmation_poll_ms(),
        }
    }
}

impl LedgerSettings {
    /// Use an already deployed contract.
    pub fn with_contract(mut self, address: Address) -> Self {
        self.contract_address = Some(address);
        self
    }

    /// Provide init code for one-time provisioning.
    pub fn with_init_code(mut self, init_code: impl Into<String>) -> Self {
        self.contract_init_code = Some(init_code.into());
        self
    }

    /// Override the round-trip bound, rounded up to whole seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = u64::try_from(timeout.as_millis().div_ceil(1_000)).unwrap_or(u64::MAX);
        self
    }

    /// The bound applied to every ledger round-trip.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The receipt polling interval.
    pub fn confirmation_poll(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }

    /// Decode the configured init code, if any.
    pub fn init_code(&self) -> Result<Option<Vec<u8>>, LedgerError> {
        let Some(text) = self.contract_init_code.as_deref() else {
            return Ok(None);
        };
        let digits = text.strip_prefix("0x").unwrap_or(text);
        let bytes = hex::decode(digits).map_err(|e| {
            LedgerError::InvalidSettings(format!("contract_init_code is not hex: {e}"))
        })?;
        if bytes.is_empty() {
            return Err(LedgerError::InvalidSettings(
                "contract_init_code is empty".into(),
            ));
        }
        Ok(Some(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_fills_defaults_from_an_empty_table() {
        let settings: LedgerSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, LedgerSettings::default());
        assert_eq!(settings.timeout(), Duration::from_secs(30));
        assert_eq!(settings.chain_id, 1946);
        assert!(settings.enabled);
    }

    #[test]
    fn it_decodes_init_code() {
        let settings = LedgerSettings::default().with_init_code("0x6080");
        assert_eq!(settings.init_code().unwrap(), Some(vec![0x60, 0x80]));
        assert_eq!(LedgerSettings::default().init_code().unwrap(), None);
        assert!(matches!(
            LedgerSettings::default().with_init_code("0xzz").init_code(),
            Err(LedgerError::InvalidSettings(_))
        ));
        assert!(matches!(
            LedgerSettings::default().with_init_code("0x").init_code(),
            Err(LedgerError::InvalidSettings(_))
        ));
    }

    #[test]
    fn it_never_rounds_a_timeout_down_to_zero() {
        let settings = LedgerSettings::default().with_timeout(Duration::from_millis(250));
        assert_eq!(settings.timeout(), Duration::from_secs(1));
        let settings = LedgerSettings::default().with_timeout(Duration::from_millis(5_001));
        assert_eq!(settings.timeout(), Duration::from_secs(6));
        let settings = LedgerSettings::default().with_timeout(Duration::from_secs(5));
        assert_eq!(settings.timeout(), Duration::from_secs(5));
    }
}
