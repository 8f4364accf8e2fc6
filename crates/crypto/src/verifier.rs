//! Oracle proof verification.
//!
//! The oracle proves a result by signing
//! `"fhescore-decryption-v1" || request_id_le || cleartext` with its ed25519 key.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use fhescore_core::{ProofVerifier, RequestId, VerifyError};
use tracing::warn;

const DECRYPTION_DOMAIN: &[u8] = b"fhescore-decryption-v1";

/// Canonical bytes the oracle signs for a decryption result.
pub fn decryption_message(request_id: RequestId, cleartext: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(DECRYPTION_DOMAIN.len() + 8 + cleartext.len());
    data.extend_from_slice(DECRYPTION_DOMAIN);
    data.extend_from_slice(&request_id.to_le_bytes());
    data.extend_from_slice(cleartext);
    data
}

/// Accepts results signed by a single trusted oracle key.
#[derive(Debug, Clone)]
pub struct Ed25519ProofVerifier {
    oracle_key: [u8; 32],
}

impl Ed25519ProofVerifier {
    pub fn new(oracle_key: [u8; 32]) -> Self {
        Self { oracle_key }
    }

    fn signed_by_oracle(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        // An unparseable key verifies nothing.
        VerifyingKey::from_bytes(&self.oracle_key)
            .map(|key| key.verify(message, &Signature::from_bytes(signature)).is_ok())
            .unwrap_or(false)
    }
}

impl ProofVerifier for Ed25519ProofVerifier {
    fn verify(
        &self,
        request_id: RequestId,
        cleartext: &[u8],
        proof: &[u8],
    ) -> Result<(), VerifyError> {
        let signature: [u8; 64] = proof.try_into().map_err(|_| VerifyError::MalformedProof)?;
        let message = decryption_message(request_id, cleartext);
        if self.signed_by_oracle(&message, &signature) {
            Ok(())
        } else {
            warn!(
                request_id,
                oracle = hex::encode(self.oracle_key),
                "decryption proof rejected"
            );
            Err(VerifyError::InvalidSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SigningKeypair;

    #[test]
    fn test_accepts_oracle_signature() {
        let oracle = SigningKeypair::generate();
        let verifier = Ed25519ProofVerifier::new(oracle.public_key_bytes());
        let proof = oracle.sign(&decryption_message(3, b"result"));
        assert!(verifier.verify(3, b"result", &proof).is_ok());
    }

    #[test]
    fn test_rejects_other_request_id() {
        let oracle = SigningKeypair::generate();
        let verifier = Ed25519ProofVerifier::new(oracle.public_key_bytes());
        let proof = oracle.sign(&decryption_message(3, b"result"));
        assert_eq!(
            verifier.verify(4, b"result", &proof),
            Err(VerifyError::InvalidSignature)
        );
    }

    #[test]
    fn test_rejects_tampered_cleartext() {
        let oracle = SigningKeypair::generate();
        let verifier = Ed25519ProofVerifier::new(oracle.public_key_bytes());
        let proof = oracle.sign(&decryption_message(3, b"result"));
        assert_eq!(
            verifier.verify(3, b"resulu", &proof),
            Err(VerifyError::InvalidSignature)
        );
    }

    #[test]
    fn test_rejects_other_signer() {
        let oracle = SigningKeypair::generate();
        let impostor = SigningKeypair::generate();
        let verifier = Ed25519ProofVerifier::new(oracle.public_key_bytes());
        let proof = impostor.sign(&decryption_message(3, b"result"));
        assert_eq!(
            verifier.verify(3, b"result", &proof),
            Err(VerifyError::InvalidSignature)
        );
    }

    #[test]
    fn test_rejects_short_proof() {
        let verifier = Ed25519ProofVerifier::new([1u8; 32]);
        assert_eq!(
            verifier.verify(1, b"result", &[0u8; 10]),
            Err(VerifyError::MalformedProof)
        );
    }
}
