//! Error types for sign-in, claim handling and the service surface.
//!
//! [`ErrorCode`] and [`ServiceError`] give HTTP handlers a consistent shape
//! for failures; every library error maps onto a code without leaking
//! transport detail into the message.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use warden_ledger::{Address, AddressError, LedgerError};

use crate::{DenyReason, SignInPurpose};

/// Failures decoding or recovering a personal-sign signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The signature is not 65 bytes.
    #[error("signature must be 65 bytes, got {0}")]
    InvalidLength(usize),

    /// The signature is not hex.
    #[error("signature is not valid hex")]
    InvalidHex,

    /// The trailing `v` byte is not one of 0, 1, 27 or 28.
    #[error("unsupported recovery id {0}")]
    InvalidRecoveryId(u8),

    /// `r` or `s` is out of range.
    #[error("signature scalars are out of range")]
    InvalidScalars,

    /// No public key could be recovered.
    #[error("public key recovery failed")]
    RecoveryFailed,

    /// Recovery succeeded but yielded a different account.
    #[error("signature was produced by {recovered}, not {expected}")]
    SignerMismatch {
        /// The account the message names.
        expected: Address,
        /// The account that signed.
        recovered: Address,
    },
}

/// Failures parsing a sign-in message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// The first line is not a sign-in request header.
    #[error("missing sign-in header line")]
    MissingHeader,

    /// The account line is missing.
    #[error("missing account address")]
    MissingAddress,

    /// The account line is not an address.
    #[error("invalid account address: {0}")]
    InvalidAddress(#[from] AddressError),

    /// A required field is absent.
    #[error("missing field {0:?}")]
    MissingField(&'static str),

    /// A field could not be parsed.
    #[error("invalid value for {field:?}: {value}")]
    InvalidField {
        /// The field name.
        field: &'static str,
        /// The offending value.
        value: String,
    },

    /// A line appears where no field is expected.
    #[error("unexpected line {0:?}")]
    UnexpectedLine(String),

    /// A tool resource carries a description that is not valid percent-encoded UTF-8.
    #[error("tool resource {0:?} is not valid percent-encoded UTF-8")]
    InvalidResource(String),
}

/// Failures issuing a claim or authenticating a signed message.
#[derive(Debug, Error)]
pub enum IssueError {
    /// The sign-in message could not be parsed.
    #[error("malformed sign-in message: {0}")]
    MalformedMessage(#[from] MessageError),

    /// The signature does not prove control of the message account.
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    /// The message names a different chain.
    #[error("message is for chain {actual}, expected {expected}")]
    ChainMismatch {
        /// The configured chain id.
        expected: u64,
        /// The chain id in the message.
        actual: u64,
    },

    /// The message's expiration time has passed.
    #[error("sign-in message expired at {at}")]
    MessageExpired {
        /// The expiration time.
        at: DateTime<Utc>,
    },

    /// The message's not-before time is still in the future.
    #[error("sign-in message is not valid before {at}")]
    MessageNotYetValid {
        /// The not-before time.
        at: DateTime<Utc>,
    },

    /// The message was issued longer ago than the accepted window.
    #[error("sign-in message issued at {issued_at} is too old")]
    MessageStale {
        /// The message's issue time.
        issued_at: DateTime<Utc>,
    },

    /// The message is addressed to another domain.
    #[error("sign-in message is for {actual}, expected {expected}")]
    DomainMismatch {
        /// The configured domain.
        expected: String,
        /// The domain in the message.
        actual: String,
    },

    /// The message URI is not on the expected domain.
    #[error("sign-in URI {uri} is not on the expected domain")]
    UriMismatch {
        /// The URI in the message.
        uri: String,
    },

    /// The message's nonce has already been accepted once.
    #[error("sign-in nonce has already been used")]
    NonceReused,

    /// The message asks for a different operation than the one attempted.
    #[error("sign-in message is not a {expected} request")]
    WrongPurpose {
        /// The operation that was attempted.
        expected: SignInPurpose,
    },

    /// The message declares no capabilities.
    #[error("no capabilities requested")]
    NoCapabilities,

    /// A capability is declared more than once.
    #[error("capability {0:?} requested more than once")]
    DuplicateCapability(String),

    /// Declared capabilities are missing from the catalog.
    #[error("unknown capabilities: {}", .names.join(", "))]
    UnknownCapability {
        /// Every declared name the catalog lacks, in declaration order.
        names: Vec<String>,
    },

    /// A ledger operation the caller required failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Failures decoding a presented bearer claim.
#[derive(Debug, Error)]
pub enum ClaimCodecError {
    /// The header does not use the `Bearer` scheme.
    #[error("authorization header does not use the Bearer scheme")]
    MissingScheme,

    /// The token is not base64.
    #[error("claim is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// The decoded token is not a claim.
    #[error("claim is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Error codes returned by authorization services.
///
/// Each code maps to an HTTP status code via [`ErrorCode::status_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // 400 Bad Request
    /// The sign-in message could not be parsed
    MalformedMessage,
    /// The presented claim could not be decoded
    MalformedClaim,
    /// The sign-in message asks for a different operation
    WrongPurpose,
    /// No capabilities were requested
    NoCapabilities,
    /// A capability was requested twice
    DuplicateCapability,
    /// A requested capability is not in the catalog
    UnknownCapability,

    // 401 Unauthorized
    /// Signature verification failed
    InvalidSignature,
    /// The message targets another chain
    ChainMismatch,
    /// The sign-in message is outside its validity window
    MessageExpired,
    /// The sign-in message is addressed to another domain
    DomainMismatch,
    /// The sign-in nonce was already used
    NonceReused,
    /// No claim was presented
    MissingClaim,
    /// The claim's expiry has passed
    ClaimExpired,

    // 403 Forbidden
    /// The claim does not list the requested capability
    NotAuthorizedLocally,
    /// The ledger did not attest the claim
    LedgerVerificationFailed,

    // 5xx
    /// Ledger integration is disabled or not provisioned
    LedgerUnavailable,
    /// The ledger did not answer in time
    LedgerTimeout,
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCode::MalformedMessage
            | ErrorCode::MalformedClaim
            | ErrorCode::WrongPurpose
            | ErrorCode::NoCapabilities
            | ErrorCode::DuplicateCapability
            | ErrorCode::UnknownCapability => 400,

            ErrorCode::InvalidSignature
            | ErrorCode::ChainMismatch
            | ErrorCode::MessageExpired
            | ErrorCode::DomainMismatch
            | ErrorCode::NonceReused
            | ErrorCode::MissingClaim
            | ErrorCode::ClaimExpired => 401,

            ErrorCode::NotAuthorizedLocally | ErrorCode::LedgerVerificationFailed => 403,

            ErrorCode::InternalError => 500,
            ErrorCode::LedgerUnavailable => 503,
            ErrorCode::LedgerTimeout => 504,
        }
    }
}

/// Service error with code and message.
///
/// Framework-specific code turns this into a response. The message is always
/// the sanitized `Display` of the originating error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceError {
    /// The error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
}

impl ServiceError {
    /// Create a new service error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        self.code.status_code()
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

fn ledger_code(error: &LedgerError) -> ErrorCode {
    match error {
        LedgerError::LedgerUnavailable | LedgerError::ContractNotProvisioned => {
            ErrorCode::LedgerUnavailable
        }
        LedgerError::LedgerTimeout { .. } => ErrorCode::LedgerTimeout,
        _ => ErrorCode::InternalError,
    }
}

impl IssueError {
    /// The service code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            IssueError::MalformedMessage(_) => ErrorCode::MalformedMessage,
            IssueError::InvalidSignature(_) => ErrorCode::InvalidSignature,
            IssueError::ChainMismatch { .. } => ErrorCode::ChainMismatch,
            IssueError::MessageExpired { .. }
            | IssueError::MessageNotYetValid { .. }
            | IssueError::MessageStale { .. } => ErrorCode::MessageExpired,
            IssueError::DomainMismatch { .. } | IssueError::UriMismatch { .. } => {
                ErrorCode::DomainMismatch
            }
            IssueError::NonceReused => ErrorCode::NonceReused,
            IssueError::WrongPurpose { .. } => ErrorCode::WrongPurpose,
            IssueError::NoCapabilities => ErrorCode::NoCapabilities,
            IssueError::DuplicateCapability(_) => ErrorCode::DuplicateCapability,
            IssueError::UnknownCapability { .. } => ErrorCode::UnknownCapability,
            IssueError::Ledger(error) => ledger_code(error),
        }
    }
}

impl From<IssueError> for ServiceError {
    fn from(error: IssueError) -> Self {
        ServiceError::new(error.code(), error.to_string())
    }
}

impl From<LedgerError> for ServiceError {
    fn from(error: LedgerError) -> Self {
        ServiceError::new(ledger_code(&error), error.to_string())
    }
}

impl From<DenyReason> for ServiceError {
    fn from(reason: DenyReason) -> Self {
        ServiceError::new(reason.code(), reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use warden_ledger::{ChainError, Operation};

    #[test]
    fn it_maps_codes_to_statuses() {
        assert_eq!(ErrorCode::MalformedClaim.status_code(), 400);
        assert_eq!(ErrorCode::InvalidSignature.status_code(), 401);
        assert_eq!(ErrorCode::LedgerVerificationFailed.status_code(), 403);
        assert_eq!(ErrorCode::LedgerTimeout.status_code(), 504);
    }

    #[test]
    fn it_serializes_codes_in_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::NotAuthorizedLocally).unwrap(),
            "\"NOT_AUTHORIZED_LOCALLY\""
        );
    }

    #[test]
    fn it_keeps_transport_detail_out_of_service_messages() {
        let error = IssueError::Ledger(LedgerError::from_chain(
            Operation::Register,
            ChainError::Transport("connect to 10.0.0.7:8545 refused".into()),
        ));
        let service = ServiceError::from(error);
        assert_eq!(service.code, ErrorCode::InternalError);
        assert!(!service.message.contains("10.0.0.7"));
    }

    #[test]
    fn it_lists_every_unknown_capability() {
        let error = IssueError::UnknownCapability {
            names: vec!["delete".into(), "drop".into()],
        };
        assert_eq!(error.to_string(), "unknown capabilities: delete, drop");
        assert_eq!(error.code().status_code(), 400);
    }

    #[test]
    fn it_classifies_sign_in_rejections() {
        let stale = IssueError::MessageStale {
            issued_at: DateTime::UNIX_EPOCH,
        };
        assert_eq!(stale.code(), ErrorCode::MessageExpired);

        let foreign = IssueError::UriMismatch {
            uri: "https://evil.example".into(),
        };
        assert_eq!(foreign.code(), ErrorCode::DomainMismatch);
        assert_eq!(foreign.code().status_code(), 401);

        assert_eq!(IssueError::NonceReused.code().status_code(), 401);

        let purpose = IssueError::WrongPurpose {
            expected: SignInPurpose::Revoke,
        };
        assert_eq!(purpose.to_string(), "sign-in message is not a revocation request");
        assert_eq!(purpose.code().status_code(), 400);
    }

    #[test]
    fn it_classifies_ledger_timeouts() {
        let error = LedgerError::LedgerTimeout {
            operation: Operation::Verify,
            after: Duration::from_secs(5),
        };
        assert_eq!(ServiceError::from(error).code, ErrorCode::LedgerTimeout);
    }
}
