use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use warden_ledger::{
    Address, Commitment, Ledger, LedgerError, LedgerGateway, OnChainInfo, SessionRecord, TxRef,
    commit,
};

use crate::{IssueError, SignInPurpose, SignInVerifier};

/// A stored session as seen by relying parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// The committed capability hash.
    pub commitment: Commitment,
    /// When the ledger stops attesting the session.
    pub expires_at: DateTime<Utc>,
    /// The stored active flag. `false` after revocation.
    pub active: bool,
    /// Active and unexpired at the time of the query, judged by the
    /// caller's clock. The contract enforces expiry by block time, which
    /// may differ by a few seconds.
    pub live: bool,
}

impl SessionView {
    fn new(record: &SessionRecord, now: DateTime<Utc>) -> Self {
        let expires_at = i64::try_from(record.expires_at)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let now = u64::try_from(now.timestamp()).unwrap_or_default();
        Self {
            commitment: record.commitment,
            expires_at,
            active: record.active,
            live: record.is_live_at(now),
        }
    }
}

/// Answer to [`SessionRegistry::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// The queried owner.
    pub address: Address,
    /// `true` only if the ledger answered.
    pub on_chain: bool,
    /// The stored session, if the owner has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionView>,
    /// Where the answer came from.
    #[serde(flatten)]
    pub ledger: Option<OnChainInfo>,
    /// Sanitized failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Answer to [`SessionRegistry::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// The queried owner.
    pub address: Address,
    /// `true` only if the ledger answered.
    pub on_chain: bool,
    /// `true` only on a positive ledger attestation.
    pub verified: bool,
    /// The commitment that was checked.
    pub commitment: Commitment,
    /// Where the answer came from.
    #[serde(flatten)]
    pub ledger: Option<OnChainInfo>,
    /// Sanitized failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Answer to [`SessionRegistry::revoke`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeResponse {
    /// The owner whose session was revoked.
    pub address: Address,
    /// `true` only if the ledger answered.
    pub on_chain: bool,
    /// `true` only once the revocation is mined.
    pub revoked: bool,
    /// The revocation transaction.
    #[serde(rename = "txHash", skip_serializing_if = "Option::is_none")]
    pub tx: Option<TxRef>,
    /// Where the answer came from.
    #[serde(flatten)]
    pub ledger: Option<OnChainInfo>,
    /// Sanitized failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The query surface relying parties use to inspect and end sessions.
///
/// Ledger failures never surface as errors here; they are folded into the
/// response with `on_chain: false` and a negative answer.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    ledger: Ledger,
    verifier: SignInVerifier,
}

fn report(owner: Address, what: &str, error: &LedgerError) -> String {
    warn!(
        %owner,
        error = %error,
        cause = ?std::error::Error::source(error).map(ToString::to_string),
        "Session {what} failed"
    );
    error.to_string()
}

impl SessionRegistry {
    /// Create a registry. Signed revocations must pass `verifier`.
    pub fn new(ledger: Ledger, verifier: SignInVerifier) -> Self {
        Self { ledger, verifier }
    }

    fn gateway(&self, owner: Address, what: &str) -> Result<&LedgerGateway, String> {
        self.ledger
            .gateway()
            .map_err(|error| report(owner, what, &error))
    }

    /// The owner's stored session.
    pub async fn status(&self, owner: Address) -> StatusResponse {
        self.status_at(owner, Utc::now()).await
    }

    /// [`SessionRegistry::status`] with an explicit clock for liveness.
    pub async fn status_at(&self, owner: Address, now: DateTime<Utc>) -> StatusResponse {
        let unanswered = |error| StatusResponse {
            address: owner,
            on_chain: false,
            session: None,
            ledger: None,
            error: Some(error),
        };
        let gateway = match self.gateway(owner, "status") {
            Ok(gateway) => gateway,
            Err(error) => return unanswered(error),
        };

        match gateway.get(owner).await {
            Ok(record) => StatusResponse {
                address: owner,
                on_chain: true,
                session: (!record.is_empty()).then(|| SessionView::new(&record, now)),
                ledger: Some(gateway.on_chain_info()),
                error: None,
            },
            Err(error) => unanswered(report(owner, "status", &error)),
        }
    }

    /// Whether the ledger attests `capabilities`, in this order, for `owner`.
    pub async fn verify<S: AsRef<str>>(
        &self,
        owner: Address,
        capabilities: &[S],
    ) -> VerifyResponse {
        let commitment = commit(capabilities);
        let unanswered = |error| VerifyResponse {
            address: owner,
            on_chain: false,
            verified: false,
            commitment,
            ledger: None,
            error: Some(error),
        };
        let gateway = match self.gateway(owner, "verification") {
            Ok(gateway) => gateway,
            Err(error) => return unanswered(error),
        };

        match gateway.try_verify(owner, commitment).await {
            Ok(verified) => VerifyResponse {
                address: owner,
                on_chain: true,
                verified,
                commitment,
                ledger: Some(gateway.on_chain_info()),
                error: None,
            },
            Err(error) => unanswered(report(owner, "verification", &error)),
        }
    }

    /// End the owner's session.
    ///
    /// The caller must already have authenticated `owner`; see
    /// [`SessionRegistry::revoke_signed`] for the self-authenticating form.
    pub async fn revoke(&self, owner: Address) -> RevokeResponse {
        let unanswered = |error| RevokeResponse {
            address: owner,
            on_chain: false,
            revoked: false,
            tx: None,
            ledger: None,
            error: Some(error),
        };
        let gateway = match self.gateway(owner, "revocation") {
            Ok(gateway) => gateway,
            Err(error) => return unanswered(error),
        };

        match gateway.revoke(owner).await {
            Ok(tx) => {
                info!(%owner, %tx, "Session revoked");
                RevokeResponse {
                    address: owner,
                    on_chain: true,
                    revoked: true,
                    tx: Some(tx),
                    ledger: Some(gateway.on_chain_info()),
                    error: None,
                }
            }
            Err(error) => unanswered(report(owner, "revocation", &error)),
        }
    }

    /// Revoke the session of whoever signed `message`.
    ///
    /// The message must carry the revocation marker and no tools, so a
    /// sign-in message captured for issuance cannot end a session.
    pub async fn revoke_signed(
        &self,
        message: &str,
        signature: &str,
    ) -> Result<RevokeResponse, IssueError> {
        self.revoke_signed_at(message, signature, Utc::now()).await
    }

    /// [`SessionRegistry::revoke_signed`] with an explicit clock.
    pub async fn revoke_signed_at(
        &self,
        message: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<RevokeResponse, IssueError> {
        let message = self
            .verifier
            .verify(message, signature, SignInPurpose::Revoke, now)
            .await?;
        Ok(self.revoke(message.address).await)
    }
}
