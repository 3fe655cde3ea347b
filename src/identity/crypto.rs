//! Cryptographic utilities for devices and nodes.
//!
//! Provides Ed25519 signing/verification and SHA3-256 hashing.

use crate::core::{Error, Hash256, Result};
use crate::identity::document::DevicePublicKey;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha3::{Digest, Sha3_256};

/// Ed25519 key pair held by a device (or a roster node when cosigning).
#[derive(Clone)]
pub struct DeviceKeyPair {
    signing_key: SigningKey,
}

impl DeviceKeyPair {
    /// Create a new key pair from the OS random source.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut csprng = rand::rngs::OsRng;
        let mut secret_key_bytes = [0u8; 32];
        csprng.fill_bytes(&mut secret_key_bytes);
        let signing_key = SigningKey::from_bytes(&secret_key_bytes);
        Self { signing_key }
    }

    /// Public half, in the form stored in a document.
    pub fn public_key(&self) -> DevicePublicKey {
        DevicePublicKey::new(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

impl Default for DeviceKeyPair {
    fn default() -> Self {
        Self::generate()
    }
}

impl std::fmt::Debug for DeviceKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKeyPair")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Verify a signature against a stored device key.
pub fn verify(public_key: &DevicePublicKey, message: &[u8], signature: &[u8]) -> Result<()> {
    let key = VerifyingKey::from_bytes(public_key.as_bytes())
        .map_err(|e| Error::InvalidKeyFormat(e.to_string()))?;
    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| Error::InvalidProof("Invalid signature length".into()))?;
    let sig = Signature::from_bytes(&sig_bytes);
    key.verify(message, &sig)?;
    Ok(())
}

/// Compute SHA3-256 hash of data.
pub fn sha3_256(data: &[u8]) -> Hash256 {
    sha3_256_multi(&[data])
}

/// Compute SHA3-256 hash of multiple data chunks.
pub fn sha3_256_multi(chunks: &[&[u8]]) -> Hash256 {
    let mut hasher = Sha3_256::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Hash256::new(bytes)
}
