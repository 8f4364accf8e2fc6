//! Commitments over ciphertext handles.
//!
//! - `binding_id = SHA256("fhescore-binding-v1" || handle)`
//! - `state_digest = SHA256("fhescore-state-v1" || handle || platform_identity)`
//!
//! The state digest pins a decryption request to one exact ciphertext handle
//! on one deployment, so a result computed for a different aggregate (or
//! another platform) never matches. It does not depend on how an engine
//! derives its binding ids.

use fhescore_core::{BindingId, CiphertextHandle, StateDigest};
use sha2::{Digest, Sha256};

const BINDING_DOMAIN: &[u8] = b"fhescore-binding-v1";
const STATE_DOMAIN: &[u8] = b"fhescore-state-v1";

/// Public correlation id for a handle.
pub fn binding_id(handle: &CiphertextHandle) -> BindingId {
    let mut hasher = Sha256::new();
    hasher.update(BINDING_DOMAIN);
    hasher.update(handle.as_bytes());
    hasher.finalize().into()
}

/// Digest binding a handle to the platform identity.
pub fn state_digest(handle: &CiphertextHandle, platform_identity: &[u8; 32]) -> StateDigest {
    let mut hasher = Sha256::new();
    hasher.update(STATE_DOMAIN);
    hasher.update(handle.as_bytes());
    hasher.update(platform_identity);
    hasher.finalize().into()
}
