use ed25519_dalek::{Signature, Signer, SigningKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid key length: {0}")]
    InvalidLength(usize),
    #[error("invalid hex key")]
    InvalidHex,
}

/// Ed25519 signing keypair.
pub struct SigningKeypair {
    pub signing_key: SigningKey,
}

impl SigningKeypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    /// Parse a hex-encoded 32-byte secret.
    pub fn from_secret_hex(secret: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(secret).map_err(|_| KeyError::InvalidHex)?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength(bytes.len()))?;
        Ok(Self::from_secret_bytes(&secret))
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Detached ed25519 signature over `data`.
    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        let signature: Signature = self.signing_key.sign(data);
        signature.to_bytes()
    }
}

/// SHA-256 of `data`.
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
