use std::{fmt, str};

use k256::ecdsa::{
    signature::{Signer, Verifier},
    SigningKey, VerifyingKey,
};
use rand_core::OsRng;
use thiserror::Error;

/// Errors from key handling and signature verification.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid public key encoding")]
    InvalidPublicKey,
    #[error("invalid secret key")]
    InvalidSecretKey,
    #[error("invalid signature encoding")]
    InvalidSignature,
    #[error("signature verification failed")]
    VerificationFailed,
}

/// A validator public key in compressed SEC1 form (33 bytes).
///
/// Ordering is lexicographic over the encoded bytes, which is what the
/// scheduler uses to break selection ties.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PublicKey([u8; 33]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 33]) -> Self {
        Self(bytes)
    }

    /// Parse and validate a compressed SEC1 encoding.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        VerifyingKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        let arr: [u8; 33] = bytes.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    /// Verify `sig` over `msg` under this key.
    pub fn verify(&self, msg: &[u8], sig: &Signature) -> Result<(), CryptoError> {
        let vk =
            VerifyingKey::from_sec1_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig = k256::ecdsa::Signature::from_slice(&sig.0)
            .map_err(|_| CryptoError::InvalidSignature)?;
        vk.verify(msg, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..", &hex::encode(&self.0[..5]))
    }
}

impl str::FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s).map_err(|_| CryptoError::InvalidPublicKey)?;
        Self::from_slice(&raw)
    }
}

/// A fixed-length (64-byte) ECDSA signature.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Signature(pub(crate) [u8; 64]);

impl Signature {
    pub const LEN: usize = 64;

    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self([0; 64])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sig:{}..", &hex::encode(&self.0[..4]))
    }
}

/// A local signing keypair.
///
/// Signing is deterministic (RFC 6979), so all honest nodes producing the
/// same payload bytes produce the same signature.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
    public: PublicKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Load a keypair from a 32-byte secret scalar.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let signing = SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self::from_signing_key(signing))
    }

    fn from_signing_key(signing: SigningKey) -> Self {
        let point = signing.verifying_key().to_encoded_point(true);
        let mut buf = [0u8; 33];
        buf.copy_from_slice(point.as_bytes());
        Self {
            signing,
            public: PublicKey::from_bytes(buf),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// The raw secret scalar, for key-store round trips.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes().into()
    }

    pub fn sign(&self, msg: &[u8]) -> Signature {
        let sig: k256::ecdsa::Signature = self.signing.sign(msg);
        let mut buf = [0u8; 64];
        buf.copy_from_slice(&sig.to_bytes());
        Signature(buf)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public)
    }
}
