// Ed25519 keypair generation and signature verification.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::{OnboardError, Result};

/// An Ed25519 signing keypair used to issue and sign certificates.
#[derive(Debug)]
pub struct SigningKeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl SigningKeyPair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Reconstruct from a 32-byte secret seed (deterministic tests).
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// The 32-byte public key.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Sign a message, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Verify an Ed25519 signature against a raw 32-byte public key.
pub fn verify_signature(public_key: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<()> {
    let vk = VerifyingKey::from_bytes(public_key).map_err(|_| OnboardError::SignatureInvalid)?;
    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| OnboardError::SignatureInvalid)?;
    let sig = Signature::from_bytes(&sig_bytes);
    vk.verify(message, &sig)
        .map_err(|_| OnboardError::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let kp = SigningKeyPair::generate();
        let sig = kp.sign(b"payload");
        verify_signature(&kp.public_key_bytes(), b"payload", &sig).unwrap();
    }

    #[test]
    fn wrong_message_fails() {
        let kp = SigningKeyPair::generate();
        let sig = kp.sign(b"payload");
        assert!(verify_signature(&kp.public_key_bytes(), b"other", &sig).is_err());
    }

    #[test]
    fn seed_is_deterministic() {
        let a = SigningKeyPair::from_seed(&[7; 32]);
        let b = SigningKeyPair::from_seed(&[7; 32]);
        assert_eq!(a.public_key_bytes(), b.public_key_bytes());
    }
}
