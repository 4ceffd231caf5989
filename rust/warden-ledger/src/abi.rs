//! Solidity ABI encoding for the session contract.
//!
//! Only the static types the contract uses are supported: `address`,
//! `bytes32`, `uint256` (restricted to values that fit a `u64`) and `bool`.
//! Each occupies one 32-byte big-endian word after the 4-byte selector.

use crate::{ADDRESS_SIZE, Address, Commitment, SessionRecord, keccak256};
use thiserror::Error;

/// Size of one ABI word.
pub const WORD_SIZE: usize = 32;

/// Size of a function selector.
pub const SELECTOR_SIZE: usize = 4;

/// Canonical signature of `registerSession`.
pub const REGISTER_SESSION: &str = "registerSession(address,bytes32,uint256)";
/// Canonical signature of `verifySession`.
pub const VERIFY_SESSION: &str = "verifySession(address,bytes32)";
/// Canonical signature of `revokeSession`.
pub const REVOKE_SESSION: &str = "revokeSession(address)";
/// Canonical signature of `getSession`.
pub const GET_SESSION: &str = "getSession(address)";

/// Errors produced while decoding ABI data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    /// The calldata selector matches none of the session functions.
    #[error("unknown function selector 0x{}", hex::encode(.0))]
    UnknownSelector([u8; SELECTOR_SIZE]),

    /// The input is shorter than the encoding requires.
    #[error("expected at least {expected} bytes, got {actual}")]
    Truncated {
        /// Required length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// An address word has non-zero padding.
    #[error("address word has non-zero padding")]
    InvalidAddress,

    /// A bool word is neither 0 nor 1.
    #[error("bool word is neither 0 nor 1")]
    InvalidBool,

    /// A uint256 word does not fit in a u64.
    #[error("uint256 value exceeds u64")]
    Overflow,
}

/// Compute the 4-byte selector of a canonical function signature.
pub fn selector(signature: &str) -> [u8; SELECTOR_SIZE] {
    let digest = keccak256(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// A call to one of the four session-contract functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCall {
    /// Store `commitment` for `owner`, expiring `ttl` seconds from now.
    Register {
        /// Session owner.
        owner: Address,
        /// Commitment to the authorized tools.
        commitment: Commitment,
        /// Time-to-live in seconds.
        ttl: u64,
    },
    /// Ask whether `owner`'s live session attests to `commitment`.
    Verify {
        /// Session owner.
        owner: Address,
        /// Commitment to check.
        commitment: Commitment,
    },
    /// Deactivate `owner`'s session.
    Revoke {
        /// Session owner.
        owner: Address,
    },
    /// Read `owner`'s session record.
    Get {
        /// Session owner.
        owner: Address,
    },
}

impl SessionCall {
    /// The canonical Solidity signature of the called function.
    pub fn signature(&self) -> &'static str {
        match self {
            SessionCall::Register { .. } => REGISTER_SESSION,
            SessionCall::Verify { .. } => VERIFY_SESSION,
            SessionCall::Revoke { .. } => REVOKE_SESSION,
            SessionCall::Get { .. } => GET_SESSION,
        }
    }

    /// The session owner this call is keyed by.
    pub fn owner(&self) -> Address {
        match self {
            SessionCall::Register { owner, .. }
            | SessionCall::Verify { owner, .. }
            | SessionCall::Revoke { owner }
            | SessionCall::Get { owner } => *owner,
        }
    }

    /// Returns `true` for calls that change contract state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            SessionCall::Register { .. } | SessionCall::Revoke { .. }
        )
    }

    /// Encode as calldata: selector followed by the argument words.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SELECTOR_SIZE + 3 * WORD_SIZE);
        out.extend_from_slice(&selector(self.signature()));
        match self {
            SessionCall::Register {
                owner,
                commitment,
                ttl,
            } => {
                out.extend_from_slice(&address_word(owner));
                out.extend_from_slice(commitment.as_bytes());
                out.extend_from_slice(&uint_word(*ttl));
            }
            SessionCall::Verify { owner, commitment } => {
                out.extend_from_slice(&address_word(owner));
                out.extend_from_slice(commitment.as_bytes());
            }
            SessionCall::Revoke { owner } | SessionCall::Get { owner } => {
                out.extend_from_slice(&address_word(owner));
            }
        }
        out
    }

    /// Decode calldata produced by [`SessionCall::encode`].
    pub fn decode(calldata: &[u8]) -> Result<Self, AbiError> {
        let head = calldata.get(..SELECTOR_SIZE).ok_or(AbiError::Truncated {
            expected: SELECTOR_SIZE,
            actual: calldata.len(),
        })?;
        let mut chosen = [0u8; SELECTOR_SIZE];
        chosen.copy_from_slice(head);
        let args = Words(&calldata[SELECTOR_SIZE..]);

        if chosen == selector(REGISTER_SESSION) {
            Ok(SessionCall::Register {
                owner: args.address(0)?,
                commitment: args.commitment(1)?,
                ttl: args.uint(2)?,
            })
        } else if chosen == selector(VERIFY_SESSION) {
            Ok(SessionCall::Verify {
                owner: args.address(0)?,
                commitment: args.commitment(1)?,
            })
        } else if chosen == selector(REVOKE_SESSION) {
            Ok(SessionCall::Revoke {
                owner: args.address(0)?,
            })
        } else if chosen == selector(GET_SESSION) {
            Ok(SessionCall::Get {
                owner: args.address(0)?,
            })
        } else {
            Err(AbiError::UnknownSelector(chosen))
        }
    }
}

/// Encode the `(bool)` return of `verifySession`.
pub fn encode_bool(value: bool) -> Vec<u8> {
    uint_word(u64::from(value)).to_vec()
}

/// Decode the `(bool)` return of `verifySession`.
pub fn decode_bool(data: &[u8]) -> Result<bool, AbiError> {
    Words(data).bool(0)
}

/// Encode the `(bytes32, uint256, bool)` return of `getSession`.
pub fn encode_session(record: &SessionRecord) -> Vec<u8> {
    let mut out = Vec::with_capacity(3 * WORD_SIZE);
    out.extend_from_slice(record.commitment.as_bytes());
    out.extend_from_slice(&uint_word(record.expires_at));
    out.extend_from_slice(&uint_word(u64::from(record.active)));
    out
}

/// Decode the `(bytes32, uint256, bool)` return of `getSession`.
pub fn decode_session(data: &[u8]) -> Result<SessionRecord, AbiError> {
    let words = Words(data);
    Ok(SessionRecord {
        commitment: words.commitment(0)?,
        expires_at: words.uint(1)?,
        active: words.bool(2)?,
    })
}

fn address_word(address: &Address) -> [u8; WORD_SIZE] {
    let mut word = [0u8; WORD_SIZE];
    word[WORD_SIZE - ADDRESS_SIZE..].copy_from_slice(address.as_bytes());
    word
}

fn uint_word(value: u64) -> [u8; WORD_SIZE] {
    let mut word = [0u8; WORD_SIZE];
    word[WORD_SIZE - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

struct Words<'a>(&'a [u8]);

impl Words<'_> {
    fn word(&self, index: usize) -> Result<&[u8; WORD_SIZE], AbiError> {
        let start = index * WORD_SIZE;
        let end = start + WORD_SIZE;
        self.0
            .get(start..end)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(AbiError::Truncated {
                expected: end,
                actual: self.0.len(),
            })
    }

    fn address(&self, index: usize) -> Result<Address, AbiError> {
        let word = self.word(index)?;
        let (padding, body) = word.split_at(WORD_SIZE - ADDRESS_SIZE);
        if padding.iter().any(|byte| *byte != 0) {
            return Err(AbiError::InvalidAddress);
        }
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(body);
        Ok(Address::new(bytes))
    }

    fn commitment(&self, index: usize) -> Result<Commitment, AbiError> {
        Ok(Commitment::new(*self.word(index)?))
    }

    fn uint(&self, index: usize) -> Result<u64, AbiError> {
        let word = self.word(index)?;
        let (high, low) = word.split_at(WORD_SIZE - 8);
        if high.iter().any(|byte| *byte != 0) {
            return Err(AbiError::Overflow);
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(low);
        Ok(u64::from_be_bytes(bytes))
    }

    fn bool(&self, index: usize) -> Result<bool, AbiError> {
        match self.uint(index) {
            Ok(0) => Ok(false),
            Ok(1) => Ok(true),
            Ok(_) | Err(AbiError::Overflow) => Err(AbiError::InvalidBool),
            Err(other) => Err(other),
        }
    }
}
