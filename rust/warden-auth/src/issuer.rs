use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{info, warn};
use warden_ledger::{Address, Commitment, Ledger, LedgerError, OnChainInfo, TxRef, commit};

use crate::{
    Anchor, BearerClaim, Catalog, IssueError, SessionSettings, SignInPurpose, SignInVerifier,
};

/// A freshly issued claim.
#[derive(Debug, Clone)]
pub struct IssuedClaim {
    /// The claim handed to the client.
    pub claim: BearerClaim,
    /// The commitment submitted to the ledger.
    pub commitment: Commitment,
}

impl IssuedClaim {
    /// The bearer token for the claim.
    pub fn token(&self) -> String {
        self.claim.encode()
    }
}

/// Turns signed sign-in messages into bearer claims and ledger sessions.
///
/// A message's nonce is spent once it passes verification, even if a later
/// step such as catalog resolution rejects it.
///
/// Issuance is not transactional with registration: if the ledger write
/// fails the claim is still returned, tagged [`Anchor::Unanchored`], and will
/// not pass the gate until the owner signs in again.
#[derive(Clone)]
pub struct ClaimIssuer {
    catalog: Arc<Catalog>,
    ledger: Ledger,
    verifier: SignInVerifier,
    session: SessionSettings,
}

impl ClaimIssuer {
    /// Create an issuer accepting the messages `verifier` accepts.
    pub fn new(catalog: Arc<Catalog>, ledger: Ledger, verifier: SignInVerifier) -> Self {
        Self {
            catalog,
            ledger,
            verifier,
            session: SessionSettings::default(),
        }
    }

    /// Override the session lifetime.
    pub fn with_session(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }

    /// The capability catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The chain sign-in messages must name.
    pub fn chain_id(&self) -> u64 {
        self.verifier.chain_id()
    }

    /// The sign-in verifier, shared with revocation.
    pub fn verifier(&self) -> &SignInVerifier {
        &self.verifier
    }

    /// Issue a claim for a signed sign-in message.
    pub async fn issue(&self, message: &str, signature: &str) -> Result<IssuedClaim, IssueError> {
        self.issue_at(message, signature, Utc::now()).await
    }

    /// [`ClaimIssuer::issue`] with an explicit clock.
    pub async fn issue_at(
        &self,
        message: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedClaim, IssueError> {
        let parsed = self
            .verifier
            .verify(message, signature, SignInPurpose::Issue, now)
            .await?;
        let owner = parsed.address;

        let declared = parsed.declared_names()?;
        let capabilities = self.catalog.resolve(&declared)?;
        let commitment = commit(&declared);

        let expires_at = TimeDelta::from_std(self.session.ttl())
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let (anchor, on_chain) = match self.register(owner, commitment).await {
            Ok((tx, info)) => (Anchor::Anchored { tx }, Some(info)),
            Err(error) => {
                warn!(
                    %owner,
                    error = %error,
                    cause = ?std::error::Error::source(&error).map(ToString::to_string),
                    "Session not anchored; the claim will not verify"
                );
                (
                    Anchor::Unanchored {
                        reason: error.to_string(),
                    },
                    None,
                )
            }
        };

        info!(
            %owner,
            %commitment,
            capabilities = ?declared,
            anchored = anchor.is_anchored(),
            "Issued claim"
        );

        Ok(IssuedClaim {
            claim: BearerClaim {
                owner,
                capabilities,
                expires_at,
                anchor,
                on_chain,
            },
            commitment,
        })
    }

    async fn register(
        &self,
        owner: Address,
        commitment: Commitment,
    ) -> Result<(TxRef, OnChainInfo), LedgerError> {
        let gateway = self.ledger.gateway()?;
        let tx = gateway
            .register(owner, commitment, self.session.ttl())
            .await?;
        Ok((tx, gateway.on_chain_info()))
    }
}
