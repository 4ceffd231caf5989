//! Sign-in verification shared by issuance and revocation.

use std::{collections::HashMap, fmt, sync::Arc};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;
use warden_ledger::Address;

use crate::{IssueError, PersonalSignature, SignInMessage, SignInSettings};

/// How far in the future `Issued At` may lie, in seconds.
const CLOCK_SKEW_SECS: i64 = 60;

/// Check that `signature` proves control of the account `message` names, on
/// `chain_id`, at `now`.
///
/// Returns the parsed message. The signature is checked against the exact
/// text received, never a re-rendering of it. This covers only what the
/// message itself states; [`SignInVerifier`] adds the checks that need
/// configuration or memory.
pub fn authenticate(
    message: &str,
    signature: &str,
    chain_id: u64,
    now: DateTime<Utc>,
) -> Result<SignInMessage, IssueError> {
    let parsed: SignInMessage = message.parse()?;
    let signature: PersonalSignature = signature.parse()?;
    signature.verify(message.as_bytes(), parsed.address)?;

    if parsed.chain_id != chain_id {
        return Err(IssueError::ChainMismatch {
            expected: chain_id,
            actual: parsed.chain_id,
        });
    }
    if let Some(at) = parsed.expiration_time
        && now >= at
    {
        return Err(IssueError::MessageExpired { at });
    }
    if let Some(at) = parsed.not_before
        && now < at
    {
        return Err(IssueError::MessageNotYetValid { at });
    }

    debug!(owner = %parsed.address, domain = %parsed.domain, "Sign-in message authenticated");
    Ok(parsed)
}

/// The operation a signed message is presented for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignInPurpose {
    /// Exchange the message for a claim.
    Issue,
    /// End the signer's session.
    Revoke,
}

impl fmt::Display for SignInPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignInPurpose::Issue => "issuance",
            SignInPurpose::Revoke => "revocation",
        })
    }
}

type NonceKey = (Address, String);

/// Verifies signed messages for a purpose and accepts each one at most once.
///
/// Clones share the memory of used nonces, so every component that accepts
/// signed messages should hold a clone of the same verifier. Nonces are
/// forgotten once the message they came from is too old to pass the
/// freshness check anyway.
#[derive(Debug, Clone)]
pub struct SignInVerifier {
    chain_id: u64,
    settings: SignInSettings,
    nonces: Arc<Mutex<HashMap<NonceKey, DateTime<Utc>>>>,
}

impl SignInVerifier {
    /// A verifier for messages on `chain_id`.
    pub fn new(chain_id: u64, settings: SignInSettings) -> Self {
        Self {
            chain_id,
            settings,
            nonces: Arc::default(),
        }
    }

    /// The chain messages must name.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The acceptance rules.
    pub fn settings(&self) -> &SignInSettings {
        &self.settings
    }

    /// Accept `message` for `purpose` at `now`.
    ///
    /// Runs [`authenticate`], then checks freshness, domain and purpose, and
    /// last consumes the nonce. A message rejected by an earlier check can be
    /// corrected and re-signed with the same nonce; an accepted one never
    /// verifies again.
    pub async fn verify(
        &self,
        message: &str,
        signature: &str,
        purpose: SignInPurpose,
        now: DateTime<Utc>,
    ) -> Result<SignInMessage, IssueError> {
        let parsed = authenticate(message, signature, self.chain_id, now)?;
        self.check_freshness(&parsed, now)?;
        self.check_domain(&parsed)?;
        check_purpose(&parsed, purpose)?;
        self.consume_nonce(&parsed, now).await?;
        Ok(parsed)
    }

    fn max_age_secs(&self) -> i64 {
        i64::try_from(self.settings.max_age_secs).unwrap_or(i64::MAX)
    }

    fn check_freshness(
        &self,
        message: &SignInMessage,
        now: DateTime<Utc>,
    ) -> Result<(), IssueError> {
        let age = now.signed_duration_since(message.issued_at).num_seconds();
        if age < -CLOCK_SKEW_SECS {
            return Err(IssueError::MessageNotYetValid {
                at: message.issued_at,
            });
        }
        if age > self.max_age_secs() {
            return Err(IssueError::MessageStale {
                issued_at: message.issued_at,
            });
        }
        Ok(())
    }

    fn check_domain(&self, message: &SignInMessage) -> Result<(), IssueError> {
        let Some(expected) = self.settings.domain.as_deref().map(authority) else {
            return Ok(());
        };
        if !authority(&message.domain).eq_ignore_ascii_case(expected) {
            return Err(IssueError::DomainMismatch {
                expected: expected.to_string(),
                actual: message.domain.clone(),
            });
        }

        let on_domain = Url::parse(&message.uri)
            .ok()
            .and_then(|uri| uri_authority(&uri))
            .is_some_and(|actual| actual.eq_ignore_ascii_case(expected));
        if !on_domain {
            return Err(IssueError::UriMismatch {
                uri: message.uri.clone(),
            });
        }
        Ok(())
    }

    async fn consume_nonce(
        &self,
        message: &SignInMessage,
        now: DateTime<Utc>,
    ) -> Result<(), IssueError> {
        let forget_at = TimeDelta::try_seconds(self.max_age_secs().saturating_add(1))
            .and_then(|retention| message.issued_at.checked_add_signed(retention))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut nonces = self.nonces.lock().await;
        nonces.retain(|_, until| *until > now);

        let key = (message.address, message.nonce.clone());
        if nonces.contains_key(&key) {
            warn!(
                owner = %message.address,
                nonce = %message.nonce,
                "Rejecting replayed sign-in message"
            );
            return Err(IssueError::NonceReused);
        }
        nonces.insert(key, forget_at);
        Ok(())
    }
}

fn check_purpose(message: &SignInMessage, purpose: SignInPurpose) -> Result<(), IssueError> {
    let fits = match purpose {
        SignInPurpose::Issue => !message.is_revocation(),
        SignInPurpose::Revoke => {
            message.is_revocation()
                && message.tool_list.is_none()
                && message.declared_tools()?.is_empty()
        }
    };
    if fits {
        Ok(())
    } else {
        Err(IssueError::WrongPurpose { expected: purpose })
    }
}

/// `domain` without a scheme or trailing slash.
fn authority(domain: &str) -> &str {
    domain
        .split_once("://")
        .map_or(domain, |(_, rest)| rest)
        .trim_end_matches('/')
}

fn uri_authority(uri: &Url) -> Option<String> {
    let host = uri.host_str()?;
    Some(match uri.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Capability, personal_message_hash};
    use k256::ecdsa::SigningKey;
    use testresult::TestResult;

    const CHAIN_ID: u64 = 1946;

    fn wallet() -> (SigningKey, Address) {
        let key = SigningKey::from_slice(&[7; 32]).unwrap();
        let address = crate::address_of(key.verifying_key());
        (key, address)
    }

    fn sign(key: &SigningKey, message: &str) -> String {
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&personal_message_hash(message.as_bytes()))
            .unwrap();
        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte());
        hex::encode(bytes)
    }

    fn issued_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn message(owner: Address, domain: &str, uri: &str, nonce: &str) -> SignInMessage {
        SignInMessage::new(domain, owner, uri, CHAIN_ID, nonce, issued_at())
            .with_tools(&[Capability::new("search", "Search the web")])
    }

    fn verifier() -> SignInVerifier {
        SignInVerifier::new(CHAIN_ID, SignInSettings::for_domain("app.example.com"))
    }

    #[tokio::test]
    async fn it_accepts_each_message_once() -> TestResult {
        let (key, owner) = wallet();
        let text = message(owner, "app.example.com", "https://app.example.com/login", "nonce0001")
            .to_string();
        let signature = sign(&key, &text);
        let verifier = verifier();
        let now = issued_at() + TimeDelta::seconds(5);

        let parsed = verifier
            .verify(&text, &signature, SignInPurpose::Issue, now)
            .await?;
        assert_eq!(parsed.address, owner);
        assert!(matches!(
            verifier
                .verify(&text, &signature, SignInPurpose::Issue, now)
                .await,
            Err(IssueError::NonceReused)
        ));
        assert!(matches!(
            verifier
                .clone()
                .verify(&text, &signature, SignInPurpose::Issue, now)
                .await,
            Err(IssueError::NonceReused)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn it_forgets_nonces_once_their_messages_are_stale() -> TestResult {
        let (key, owner) = wallet();
        let verifier = verifier();
        let text = message(owner, "app.example.com", "https://app.example.com", "nonce0002")
            .to_string();
        let signature = sign(&key, &text);
        verifier
            .verify(&text, &signature, SignInPurpose::Issue, issued_at())
            .await?;

        let later = issued_at() + TimeDelta::seconds(601);
        let other = message(owner, "app.example.com", "https://app.example.com", "nonce0003");
        let other = SignInMessage {
            issued_at: later,
            ..other
        }
        .to_string();
        verifier
            .verify(&other, &sign(&key, &other), SignInPurpose::Issue, later)
            .await?;
        assert_eq!(verifier.nonces.lock().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_messages_outside_the_freshness_window() -> TestResult {
        let (key, owner) = wallet();
        let text = message(owner, "app.example.com", "https://app.example.com", "nonce0004")
            .to_string();
        let signature = sign(&key, &text);
        let verifier = verifier();

        let late = issued_at() + TimeDelta::seconds(601);
        assert!(matches!(
            verifier
                .verify(&text, &signature, SignInPurpose::Issue, late)
                .await,
            Err(IssueError::MessageStale { .. })
        ));
        let early = issued_at() - TimeDelta::minutes(5);
        assert!(matches!(
            verifier
                .verify(&text, &signature, SignInPurpose::Issue, early)
                .await,
            Err(IssueError::MessageNotYetValid { .. })
        ));

        let in_window = issued_at() + TimeDelta::seconds(600);
        verifier
            .verify(&text, &signature, SignInPurpose::Issue, in_window)
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_messages_for_other_domains() -> TestResult {
        let (key, owner) = wallet();
        let verifier = verifier();
        let now = issued_at();

        let foreign =
            message(owner, "evil.example", "https://evil.example", "nonce0005").to_string();
        match verifier
            .verify(&foreign, &sign(&key, &foreign), SignInPurpose::Issue, now)
            .await
        {
            Err(IssueError::DomainMismatch { expected, actual }) => {
                assert_eq!(expected, "app.example.com");
                assert_eq!(actual, "evil.example");
            }
            other => panic!("expected DomainMismatch, got {other:?}"),
        }

        let redirected =
            message(owner, "app.example.com", "https://evil.example/cb", "nonce0006").to_string();
        assert!(matches!(
            verifier
                .verify(&redirected, &sign(&key, &redirected), SignInPurpose::Issue, now)
                .await,
            Err(IssueError::UriMismatch { .. })
        ));

        let with_scheme =
            message(owner, "https://APP.example.com", "https://app.example.com", "nonce0007")
                .to_string();
        verifier
            .verify(&with_scheme, &sign(&key, &with_scheme), SignInPurpose::Issue, now)
            .await?;

        let open = SignInVerifier::new(CHAIN_ID, SignInSettings::default());
        open.verify(&foreign, &sign(&key, &foreign), SignInPurpose::Issue, now)
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn it_keeps_issuance_and_revocation_apart() -> TestResult {
        let (key, owner) = wallet();
        let verifier = verifier();
        let now = issued_at();

        let issuance =
            message(owner, "app.example.com", "https://app.example.com", "nonce0008").to_string();
        assert!(matches!(
            verifier
                .verify(&issuance, &sign(&key, &issuance), SignInPurpose::Revoke, now)
                .await,
            Err(IssueError::WrongPurpose {
                expected: SignInPurpose::Revoke
            })
        ));

        let mixed = message(owner, "app.example.com", "https://app.example.com", "nonce0009")
            .with_revocation()
            .to_string();
        assert!(matches!(
            verifier
                .verify(&mixed, &sign(&key, &mixed), SignInPurpose::Revoke, now)
                .await,
            Err(IssueError::WrongPurpose { .. })
        ));

        let revocation = SignInMessage::new(
            "app.example.com",
            owner,
            "https://app.example.com",
            CHAIN_ID,
            "nonce0010",
            issued_at(),
        )
        .with_revocation()
        .to_string();
        let signature = sign(&key, &revocation);
        assert!(matches!(
            verifier
                .verify(&revocation, &signature, SignInPurpose::Issue, now)
                .await,
            Err(IssueError::WrongPurpose {
                expected: SignInPurpose::Issue
            })
        ));
        verifier
            .verify(&revocation, &signature, SignInPurpose::Revoke, now)
            .await?;
        Ok(())
    }
}
