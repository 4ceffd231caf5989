use std::{fmt, str::FromStr};

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use warden_ledger::{Address, keccak256_iter};

use crate::SignatureError;

/// Length of an `r || s || v` signature.
pub const SIGNATURE_SIZE: usize = 65;

const PERSONAL_SIGN_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n";

/// The EIP-191 digest a wallet signs for `personal_sign`.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let length = message.len().to_string();
    keccak256_iter([PERSONAL_SIGN_PREFIX, length.as_bytes(), message])
}

/// A recoverable secp256k1 signature as produced by wallets.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PersonalSignature([u8; SIGNATURE_SIZE]);

impl PersonalSignature {
    /// Wrap raw signature bytes, checking the recovery byte.
    pub fn new(bytes: [u8; SIGNATURE_SIZE]) -> Result<Self, SignatureError> {
        let signature = Self(bytes);
        signature.recovery_id()?;
        Ok(signature)
    }

    /// Decode from a byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignatureError> {
        let bytes: [u8; SIGNATURE_SIZE] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidLength(bytes.len()))?;
        Self::new(bytes)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    fn recovery_id(&self) -> Result<RecoveryId, SignatureError> {
        let v = self.0[64];
        let normalized = match v {
            0 | 1 => v,
            27 | 28 => v - 27,
            _ => return Err(SignatureError::InvalidRecoveryId(v)),
        };
        RecoveryId::from_byte(normalized).ok_or(SignatureError::InvalidRecoveryId(v))
    }

    /// Recover the account that signed `message` with `personal_sign`.
    pub fn recover(&self, message: &[u8]) -> Result<Address, SignatureError> {
        let digest = personal_message_hash(message);
        let mut recovery_id = self.recovery_id()?;
        let mut signature =
            EcdsaSignature::from_slice(&self.0[..64]).map_err(|_| SignatureError::InvalidScalars)?;

        // Recovery only accepts low-s signatures; flipping s flips the parity of R.
        if let Some(normalized) = signature.normalize_s() {
            signature = normalized;
            recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
        }

        let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
            .map_err(|_| SignatureError::RecoveryFailed)?;
        Ok(address_of(&key))
    }

    /// Fail unless `expected` signed `message`.
    pub fn verify(&self, message: &[u8], expected: Address) -> Result<(), SignatureError> {
        let recovered = self.recover(message)?;
        if recovered == expected {
            Ok(())
        } else {
            Err(SignatureError::SignerMismatch {
                expected,
                recovered,
            })
        }
    }
}

/// The account address of a secp256k1 verifying key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let mut uncompressed = [0u8; 64];
    uncompressed.copy_from_slice(&point.as_bytes()[1..]);
    Address::from_public_key(&uncompressed)
}

impl FromStr for PersonalSignature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|_| SignatureError::InvalidHex)?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for PersonalSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PersonalSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PersonalSignature({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;
    use testresult::TestResult;

    fn sign(key: &SigningKey, message: &[u8]) -> PersonalSignature {
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&personal_message_hash(message))
            .unwrap();
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte() + 27;
        PersonalSignature::new(bytes).unwrap()
    }

    #[test]
    fn it_derives_the_well_known_address_of_key_one() -> TestResult {
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let key = SigningKey::from_slice(&secret)?;
        assert_eq!(
            address_of(key.verifying_key()),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf".parse::<Address>()?
        );
        Ok(())
    }

    #[test]
    fn it_recovers_the_signer() -> TestResult {
        let key = SigningKey::from_slice(&[7u8; 32])?;
        let signer = address_of(key.verifying_key());
        let signature = sign(&key, b"hello warden");

        assert_eq!(signature.recover(b"hello warden")?, signer);
        signature.verify(b"hello warden", signer)?;
        Ok(())
    }

    #[test]
    fn it_accepts_zero_based_recovery_bytes() -> TestResult {
        let key = SigningKey::from_slice(&[9u8; 32])?;
        let mut bytes = *sign(&key, b"payload").as_bytes();
        bytes[64] -= 27;
        let signature = PersonalSignature::new(bytes)?;
        assert_eq!(signature.recover(b"payload")?, address_of(key.verifying_key()));
        Ok(())
    }

    #[test]
    fn it_detects_a_different_message() -> TestResult {
        let key = SigningKey::from_slice(&[7u8; 32])?;
        let signer = address_of(key.verifying_key());
        let signature = sign(&key, b"hello warden");

        assert!(matches!(
            signature.verify(b"hello wardem", signer),
            Err(SignatureError::SignerMismatch { .. }) | Err(SignatureError::RecoveryFailed)
        ));
        Ok(())
    }

    #[test]
    fn it_parses_hex_signatures() -> TestResult {
        let key = SigningKey::from_slice(&[7u8; 32])?;
        let signature = sign(&key, b"hello");
        let text = signature.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.parse::<PersonalSignature>()?, signature);
        assert_eq!(text[2..].parse::<PersonalSignature>()?, signature);
        Ok(())
    }

    #[test]
    fn it_rejects_malformed_signatures() {
        assert_eq!(
            "0x1234".parse::<PersonalSignature>(),
            Err(SignatureError::InvalidLength(2))
        );
        assert_eq!(
            "0xzz".parse::<PersonalSignature>(),
            Err(SignatureError::InvalidHex)
        );
        let mut bytes = [1u8; SIGNATURE_SIZE];
        bytes[64] = 5;
        assert_eq!(
            PersonalSignature::new(bytes),
            Err(SignatureError::InvalidRecoveryId(5))
        );
    }
}
