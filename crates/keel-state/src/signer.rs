//! Pluggable signing and verification seam.
//!
//! The engine never interprets key or signature bytes itself; it signs
//! mutation hashes through a [`Signer`] and checks them through a
//! [`Verifier`] at admission. The default implementations use ed25519,
//! with the verifying key doubling as the source's [`PublicKey`].

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use keel_types::{Hash, PublicKey};

use crate::error::CryptoError;

/// Produces signatures over mutation hashes on behalf of one source.
pub trait Signer: Send + Sync {
    /// The source identity the signatures verify against.
    fn public_key(&self) -> PublicKey;

    /// Sign a mutation hash.
    fn sign(&self, hash: &Hash) -> Result<Vec<u8>, CryptoError>;
}

/// Checks a signature over a mutation hash against a source key.
pub trait Verifier: Send + Sync {
    /// Verify `signature` over `hash` by `source`.
    fn verify(&self, source: &PublicKey, hash: &Hash, signature: &[u8])
        -> Result<(), CryptoError>;
}

/// Default [`Signer`]: ed25519 over the raw 32-byte hash.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Wrap an existing signing key.
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Derive a signing key deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(seed))
    }
}

impl Signer for Ed25519Signer {
    fn public_key(&self) -> PublicKey {
        PublicKey::from(self.key.verifying_key().to_bytes())
    }

    fn sign(&self, hash: &Hash) -> Result<Vec<u8>, CryptoError> {
        let signature: Signature = self.key.sign(hash.as_bytes());
        Ok(signature.to_bytes().to_vec())
    }
}

/// Default [`Verifier`]: the source key must be a 32-byte ed25519
/// verifying key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl Verifier for Ed25519Verifier {
    fn verify(
        &self,
        source: &PublicKey,
        hash: &Hash,
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        let key_bytes: [u8; 32] = source
            .as_bytes()
            .try_into()
            .map_err(|_| CryptoError::MalformedKey)?;
        let verifying_key =
            VerifyingKey::from_bytes(&key_bytes).map_err(|_| CryptoError::MalformedKey)?;

        let signature_bytes: [u8; 64] = signature
            .try_into()
            .map_err(|_| CryptoError::MalformedSignature)?;
        let signature = Signature::from_bytes(&signature_bytes);

        verifying_key
            .verify(hash.as_bytes(), &signature)
            .map_err(|_| CryptoError::SignatureVerification)
    }
}
