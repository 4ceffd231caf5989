use sha3::{Digest, Keccak256};

/// The size of a Keccak-256 digest in bytes.
pub const KECCAK256_SIZE: usize = 32;

/// Computes the Keccak-256 digest used throughout Ethereum (function
/// selectors, address derivation, personal-sign prefixes).
///
/// This is the original Keccak padding, not NIST SHA3-256.
pub fn keccak256(bytes: &[u8]) -> [u8; KECCAK256_SIZE] {
    Keccak256::digest(bytes).into()
}

/// Computes Keccak-256 over several chunks as if they were concatenated.
pub fn keccak256_iter<'a, I>(chunks: I) -> [u8; KECCAK256_SIZE]
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut hasher = Keccak256::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    hasher.finalize().into()
}
