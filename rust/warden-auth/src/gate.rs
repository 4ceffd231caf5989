use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use warden_ledger::Ledger;

use crate::{AccessPolicy, BearerClaim, ErrorCode};

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// No claim was presented.
    MissingClaim,
    /// The presented claim could not be decoded.
    MalformedClaim,
    /// The claim does not list the requested capability.
    NotAuthorizedLocally,
    /// The claim's expiry has passed.
    ClaimExpired,
    /// The ledger did not attest the claim, or could not be asked.
    LedgerVerificationFailed,
}

impl DenyReason {
    /// The service code for this reason.
    pub fn code(&self) -> ErrorCode {
        match self {
            DenyReason::MissingClaim => ErrorCode::MissingClaim,
            DenyReason::MalformedClaim => ErrorCode::MalformedClaim,
            DenyReason::NotAuthorizedLocally => ErrorCode::NotAuthorizedLocally,
            DenyReason::ClaimExpired => ErrorCode::ClaimExpired,
            DenyReason::LedgerVerificationFailed => ErrorCode::LedgerVerificationFailed,
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DenyReason::MissingClaim => "no session claim presented",
            DenyReason::MalformedClaim => "session claim could not be decoded",
            DenyReason::NotAuthorizedLocally => "session does not authorize this tool",
            DenyReason::ClaimExpired => "session has expired",
            DenyReason::LedgerVerificationFailed => "session verification failed on-chain",
        })
    }
}

/// The outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Proceed with the invocation.
    Allow,
    /// Refuse it.
    Deny(DenyReason),
}

impl Decision {
    /// Returns `true` for [`Decision::Allow`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// `Ok` to proceed, or the reason to refuse.
    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason),
        }
    }
}

/// Request-time check combining the presented claim with the ledger.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    ledger: Ledger,
    policy: AccessPolicy,
}

impl AuthorizationGate {
    /// Create a gate.
    pub fn new(ledger: Ledger, policy: AccessPolicy) -> Self {
        Self { ledger, policy }
    }

    /// The policy in force.
    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    /// Decide whether `claim` authorizes invoking `requested` now.
    pub async fn authorize(&self, claim: Option<&BearerClaim>, requested: &str) -> Decision {
        self.authorize_at(claim, requested, Utc::now()).await
    }

    /// Decode an `Authorization` header value and authorize it.
    pub async fn authorize_header(&self, header: Option<&str>, requested: &str) -> Decision {
        let Some(header) = header else {
            return self.authorize(None, requested).await;
        };
        match BearerClaim::from_authorization_header(header) {
            Ok(claim) => self.authorize(Some(&claim), requested).await,
            Err(error) => {
                debug!(tool = requested, error = %error, "Rejecting undecodable claim");
                Decision::Deny(DenyReason::MalformedClaim)
            }
        }
    }

    /// [`AuthorizationGate::authorize`] with an explicit clock.
    ///
    /// Checks run cheapest first: local membership, then claimed expiry, then
    /// the ledger. The ledger enforces its own expiry, so an edited
    /// `expiresAt` cannot extend a session.
    pub async fn authorize_at(
        &self,
        claim: Option<&BearerClaim>,
        requested: &str,
        now: DateTime<Utc>,
    ) -> Decision {
        let Some(claim) = claim else {
            return if self.policy.is_fail_open() {
                warn!(
                    tool = requested,
                    "No session claim presented; allowed in development mode"
                );
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::MissingClaim)
            };
        };
        let owner = claim.owner;

        if !claim.grants(requested) {
            debug!(%owner, tool = requested, "Tool not listed in claim");
            return Decision::Deny(DenyReason::NotAuthorizedLocally);
        }
        if claim.is_expired_at(now) {
            debug!(%owner, tool = requested, expires_at = %claim.expires_at, "Claim expired");
            return Decision::Deny(DenyReason::ClaimExpired);
        }

        let gateway = match self.ledger.gateway() {
            Ok(gateway) => gateway,
            Err(_) if self.policy.is_fail_open() => {
                warn!(
                    %owner,
                    tool = requested,
                    "Ledger disabled; skipping on-chain verification in development mode"
                );
                return Decision::Allow;
            }
            Err(error) => {
                warn!(%owner, tool = requested, error = %error, "Ledger unavailable; refusing");
                return Decision::Deny(DenyReason::LedgerVerificationFailed);
            }
        };

        if gateway.verify(owner, claim.commitment()).await {
            debug!(%owner, tool = requested, "Tool authorized");
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::LedgerVerificationFailed)
        }
    }
}
