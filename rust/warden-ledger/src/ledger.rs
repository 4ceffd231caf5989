use std::sync::Arc;

use crate::{LedgerError, LedgerGateway};

/// The process-wide ledger handle.
///
/// Components hold a clone of this rather than reaching for a global. A
/// `Disabled` ledger answers every operation with
/// [`LedgerError::LedgerUnavailable`].
#[derive(Clone, Default)]
pub enum Ledger {
    /// No chain client is configured.
    #[default]
    Disabled,
    /// A shared gateway.
    Enabled(Arc<LedgerGateway>),
}

impl Ledger {
    /// Wrap a gateway.
    pub fn enabled(gateway: LedgerGateway) -> Self {
        Ledger::Enabled(Arc::new(gateway))
    }

    /// Returns `true` if a gateway is configured.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Ledger::Enabled(_))
    }

    /// The gateway, or `LedgerUnavailable`.
    pub fn gateway(&self) -> Result<&LedgerGateway, LedgerError> {
        match self {
            Ledger::Enabled(gateway) => Ok(gateway),
            Ledger::Disabled => Err(LedgerError::LedgerUnavailable),
        }
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ledger::Disabled => f.write_str("Ledger::Disabled"),
            Ledger::Enabled(gateway) => f
                .debug_tuple("Ledger::Enabled")
                .field(&gateway.contract_address())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LedgerSettings, MemoryChain};

    #[test]
    fn it_reports_unavailable_when_disabled() {
        let ledger = Ledger::default();
        assert!(!ledger.is_enabled());
        assert!(matches!(
            ledger.gateway(),
            Err(LedgerError::LedgerUnavailable)
        ));
    }

    #[test]
    fn it_shares_one_gateway_across_clones() {
        let ledger = Ledger::enabled(LedgerGateway::new(
            Arc::new(MemoryChain::default()),
            LedgerSettings::default(),
        ));
        let clone = ledger.clone();
        assert!(clone.is_enabled());
        assert!(std::ptr::eq(
            ledger.gateway().unwrap(),
            clone.gateway().unwrap()
        ));
    }
}
