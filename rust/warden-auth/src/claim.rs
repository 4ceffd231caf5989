use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_ledger::{Address, Commitment, OnChainInfo, TxRef, commit};

use crate::{Capability, ClaimCodecError};

/// Whether issuance managed to record the session on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Anchor {
    /// The registration transaction was mined.
    Anchored {
        /// The registration transaction.
        tx: TxRef,
    },
    /// Registration failed; the claim will not verify.
    Unanchored {
        /// Sanitized failure description.
        reason: String,
    },
}

impl Anchor {
    /// Returns `true` for [`Anchor::Anchored`].
    pub fn is_anchored(&self) -> bool {
        matches!(self, Anchor::Anchored { .. })
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Anchor::Unanchored {
            reason: "not reported".into(),
        }
    }
}

/// The client-held copy of a session.
///
/// Nothing in a claim is trusted. The gate recomputes the commitment from
/// `capabilities` and asks the ledger whether `owner` holds exactly that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BearerClaim {
    /// The session owner.
    #[serde(rename = "address")]
    pub owner: Address,
    /// The authorized capabilities in committed order.
    #[serde(rename = "tools", default)]
    pub capabilities: Vec<Capability>,
    /// When the session ends.
    pub expires_at: DateTime<Utc>,
    /// Ledger registration outcome.
    #[serde(default)]
    pub anchor: Anchor,
    /// Where the session is recorded, for anchored claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_chain: Option<OnChainInfo>,
}

impl BearerClaim {
    /// Capability names in committed order.
    pub fn names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns `true` if the claim lists `name`.
    pub fn grants(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == name)
    }

    /// The commitment the ledger must hold for this claim to verify.
    pub fn commitment(&self) -> Commitment {
        commit(&self.names())
    }

    /// Returns `true` once `now` is past the claim's expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Encode the claim as a bearer token: base64 of its JSON.
    pub fn encode(&self) -> String {
        #[allow(clippy::expect_used)]
        let json = serde_json::to_vec(self).expect("claims always serialize");
        BASE64_STANDARD.encode(json)
    }

    /// Decode a bearer token.
    pub fn decode(token: &str) -> Result<Self, ClaimCodecError> {
        let json = BASE64_STANDARD.decode(token.trim())?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// The value of an `Authorization` header carrying this claim.
    pub fn to_authorization_header(&self) -> String {
        format!("Bearer {}", self.encode())
    }

    /// Decode the claim from an `Authorization` header value.
    pub fn from_authorization_header(header: &str) -> Result<Self, ClaimCodecError> {
        let (scheme, token) = header
            .trim()
            .split_once(' ')
            .ok_or(ClaimCodecError::MissingScheme)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(ClaimCodecError::MissingScheme);
        }
        Self::decode(token)
    }
}
