//! Commitments over ordered tool lists.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// The size of a [`Commitment`] in bytes.
pub const COMMITMENT_SIZE: usize = 32;

/// A fixed-size binding to an exact, ordered list of tool names.
///
/// This is the value a session contract stores per owner and the value
/// relying parties recompute from a bearer claim.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Commitment([u8; COMMITMENT_SIZE]);

/// Errors produced when parsing a [`Commitment`] from hex.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitmentError {
    /// The `0x` prefix is missing.
    #[error("commitment must start with 0x")]
    MissingPrefix,

    /// The input is not 64 hex digits.
    #[error("commitment must be 64 hex digits")]
    InvalidHex,
}

impl Commitment {
    /// The all-zero commitment stored for owners with no session.
    pub const ZERO: Commitment = Commitment([0; COMMITMENT_SIZE]);

    /// Wrap raw commitment bytes.
    pub const fn new(bytes: [u8; COMMITMENT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw commitment bytes.
    pub const fn as_bytes(&self) -> &[u8; COMMITMENT_SIZE] {
        &self.0
    }

    /// Returns `true` for the all-zero commitment.
    pub fn is_zero(&self) -> bool {
        self.0 == [0; COMMITMENT_SIZE]
    }
}

/// Commit to an ordered list of tool names.
///
/// The names are serialized as a compact JSON array in the order given
/// (UTF-8) and hashed with SHA-256. Order is significant: `["a", "b"]` and
/// `["b", "a"]` produce different commitments, so issuers and verifiers must
/// carry the list in the order the owner signed it.
pub fn commit<S: AsRef<str>>(names: &[S]) -> Commitment {
    let names: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
    #[allow(clippy::expect_used)]
    let canonical = serde_json::to_vec(&names).expect("a list of strings always serializes");
    Commitment(Sha256::digest(&canonical).into())
}

impl From<[u8; COMMITMENT_SIZE]> for Commitment {
    fn from(bytes: [u8; COMMITMENT_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({self})")
    }
}

impl FromStr for Commitment {
    type Err = CommitmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").ok_or(CommitmentError::MissingPrefix)?;
        let mut bytes = [0u8; COMMITMENT_SIZE];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| CommitmentError::InvalidHex)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Commitment {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
