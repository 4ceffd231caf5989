use crate::{AbiError, TxRef};
use std::{fmt, time::Duration};
use thiserror::Error;

/// Errors reported by a [`crate::ChainClient`].
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// The node could not be reached or the connection failed mid-request.
    #[error("chain transport failed: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error object.
    #[error("chain rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// A transaction was mined but reverted, or a call reverted.
    #[error("transaction {0} reverted")]
    Reverted(TxRef),

    /// A call targeted an address with no contract.
    #[error("no contract deployed at {0}")]
    NoContract(String),

    /// The node returned a payload that could not be decoded.
    #[error("malformed chain response: {0}")]
    Malformed(String),

    /// Calldata or return data did not match the contract ABI.
    #[error("abi error: {0}")]
    Abi(#[from] AbiError),

    /// A receipt was requested for a transaction the chain does not know.
    #[error("unknown transaction {0}")]
    UnknownTransaction(TxRef),
}

impl From<reqwest::Error> for ChainError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ChainError::Malformed(error.to_string())
        } else {
            ChainError::Transport(error.to_string())
        }
    }
}

/// The ledger operation an error or log line refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `registerSession`
    Register,
    /// `verifySession`
    Verify,
    /// `revokeSession`
    Revoke,
    /// `getSession`
    Get,
    /// Session-contract deployment
    Deploy,
}

impl Operation {
    /// Returns `true` for operations that submit a transaction.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::Register | Operation::Revoke | Operation::Deploy
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Register => "register",
            Operation::Verify => "verify",
            Operation::Revoke => "revoke",
            Operation::Get => "get",
            Operation::Deploy => "deploy",
        })
    }
}

/// Errors produced by the [`crate::LedgerGateway`].
///
/// Display output names the operation but never the underlying transport
/// payload, so it is safe to hand to a requesting client. The chain error is
/// kept as the [`std::error::Error::source`] for logs.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No chain client is configured for this process.
    #[error("ledger integration is not available")]
    LedgerUnavailable,

    /// No session contract address is cached or configured.
    #[error("session contract is not provisioned")]
    ContractNotProvisioned,

    /// A state-changing call could not be submitted or confirmed.
    #[error("ledger {operation} submission failed")]
    SubmissionFailed {
        /// The attempted operation.
        operation: Operation,
        /// Underlying chain error.
        #[source]
        source: ChainError,
    },

    /// A read-only call failed.
    #[error("ledger {operation} call failed")]
    CallFailed {
        /// The attempted operation.
        operation: Operation,
        /// Underlying chain error.
        #[source]
        source: ChainError,
    },

    /// The ledger did not answer within the configured bound.
    #[error("ledger {operation} timed out after {}s", .after.as_secs())]
    LedgerTimeout {
        /// The attempted operation.
        operation: Operation,
        /// The bound that elapsed.
        after: Duration,
    },

    /// The ledger settings are unusable (for example malformed init code).
    #[error("invalid ledger settings: {0}")]
    InvalidSettings(String),
}

impl LedgerError {
    /// Wrap a chain error according to whether `operation` writes.
    pub fn from_chain(operation: Operation, source: ChainError) -> Self {
        if operation.is_write() {
            LedgerError::SubmissionFailed { operation, source }
        } else {
            LedgerError::CallFailed { operation, source }
        }
    }

    /// Returns `true` if the caller may retry the same request later.
    ///
    /// The gateway itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::SubmissionFailed { .. }
                | LedgerError::CallFailed { .. }
                | LedgerError::LedgerTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_keeps_transport_detail_out_of_display() {
        let error = LedgerError::from_chain(
            Operation::Register,
            ChainError::Rpc {
                code: -32000,
                message: "insufficient funds for gas * price + value".into(),
            },
        );
        assert_eq!(error.to_string(), "ledger register submission failed");
        let source = std::error::Error::source(&error).unwrap().to_string();
        assert!(source.contains("insufficient funds"));
    }

    #[test]
    fn it_classifies_reads_and_writes() {
        assert!(matches!(
            LedgerError::from_chain(Operation::Get, ChainError::Transport("down".into())),
            LedgerError::CallFailed { .. }
        ));
        assert!(matches!(
            LedgerError::from_chain(Operation::Deploy, ChainError::Transport("down".into())),
            LedgerError::SubmissionFailed { .. }
        ));
        assert!(!LedgerError::ContractNotProvisioned.is_retryable());
        assert!(
            LedgerError::LedgerTimeout {
                operation: Operation::Verify,
                after: Duration::from_secs(30)
            }
            .is_retryable()
        );
    }
}
