//! Wallet and contract addresses.

use crate::keccak256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// The size of an account address in bytes.
pub const ADDRESS_SIZE: usize = 20;

/// A 20-byte account address.
///
/// Addresses render as `0x`-prefixed lowercase hex. Parsing accepts any case;
/// a mixed-case input is treated as an [EIP-55] checksum and must match.
///
/// [EIP-55]: https://eips.ethereum.org/EIPS/eip-55
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_SIZE]);

/// Errors produced when parsing an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The `0x` prefix is missing.
    #[error("address must start with 0x")]
    MissingPrefix,

    /// The address does not contain exactly 40 hex digits.
    #[error("address must have 40 hex digits, got {0}")]
    InvalidLength(usize),

    /// The address contains characters outside `[0-9a-fA-F]`.
    #[error("address contains non-hex characters")]
    InvalidHex,

    /// The mixed-case spelling does not match the EIP-55 checksum.
    #[error("address checksum mismatch, expected {expected}")]
    Checksum {
        /// The correctly checksummed spelling.
        expected: String,
    },
}

impl Address {
    /// The all-zero address.
    pub const ZERO: Address = Address([0; ADDRESS_SIZE]);

    /// Wrap raw address bytes.
    pub const fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw address bytes.
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Derive the account address of an uncompressed secp256k1 public key
    /// (the 64 bytes following the `0x04` SEC1 tag).
    pub fn from_public_key(uncompressed: &[u8; 64]) -> Self {
        let digest = keccak256(uncompressed);
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(&digest[12..]);
        Self(bytes)
    }

    /// Derive an address from the trailing 20 bytes of a 32-byte digest.
    pub(crate) fn from_digest(digest: &[u8; 32]) -> Self {
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(&digest[12..]);
        Self(bytes)
    }

    /// Render the EIP-55 mixed-case checksum spelling.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let digest = keccak256(lower.as_bytes());
        let mut out = String::with_capacity(2 + lower.len());
        out.push_str("0x");
        for (index, ch) in lower.chars().enumerate() {
            let nibble = (digest[index / 2] >> if index % 2 == 0 { 4 } else { 0 }) & 0x0f;
            if ch.is_ascii_alphabetic() && nibble >= 8 {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
        }
        out
    }
}

impl From<[u8; ADDRESS_SIZE]> for Address {
    fn from(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or(AddressError::MissingPrefix)?;
        if digits.len() != ADDRESS_SIZE * 2 {
            return Err(AddressError::InvalidLength(digits.len()));
        }

        let mut bytes = [0u8; ADDRESS_SIZE];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| AddressError::InvalidHex)?;
        let address = Self(bytes);

        let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
        if has_upper && has_lower {
            let expected = address.to_checksum();
            if expected[2..] != *digits {
                return Err(AddressError::Checksum { expected });
            }
        }

        Ok(address)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
