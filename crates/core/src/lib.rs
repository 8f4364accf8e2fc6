//! fhescore Core
//!
//! Identifiers, events, errors and collaborator traits shared by all fhescore crates.
//! The homomorphic engine, the decryption oracle and the proof verifier live outside
//! this workspace; the ledger only talks to them through the traits defined here.

pub mod cleartext;
pub mod events;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use events::LedgerEvent;

/// Sequential batch identifier, starting at 1.
pub type BatchId = u64;

/// Opaque identifier returned by the decryption oracle.
pub type RequestId = u64;

/// SHA-256 commitment over the ciphertext a decryption request was issued for.
pub type StateDigest = [u8; 32];

/// Public correlation id derived from a ciphertext handle.
pub type BindingId = [u8; 32];

/// Actor identity as a 32-byte public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(#[serde(with = "hex::serde")] pub [u8; 32]);

impl ActorId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; 32]> for ActorId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", hex::encode(&self.0[..8]))
    }
}

/// Opaque reference to a homomorphically encrypted value.
///
/// The all-zero handle is the uninitialized handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CiphertextHandle(pub [u8; 32]);

impl CiphertextHandle {
    pub const UNINITIALIZED: Self = Self([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero_handle(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

// Handles are deliberately not printed in full.
impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CiphertextHandle({}..)", hex::encode(&self.0[..4]))
    }
}

/// Roles an actor can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Owner,
    Provider,
}

/// Rate-limited action kinds. Each kind has its own cooldown clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActionKind {
    Submission = 0,
    DecryptionRequest = 1,
}

impl ActionKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Submission),
            1 => Some(Self::DecryptionRequest),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Submission => "submission",
            Self::DecryptionRequest => "decryption_request",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown ciphertext handle")]
    UnknownHandle,
    #[error("homomorphic operation failed: {0}")]
    OperationFailed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle rejected request: {0}")]
    Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("malformed proof")]
    MalformedProof,
    #[error("proof does not match cleartext")]
    InvalidSignature,
}

/// Homomorphic-encryption collaborator.
///
/// `add` must be commutative and associative so the final aggregate does not
/// depend on submission order.
pub trait HomomorphicEngine: Send + Sync {
    /// A fresh encryption of zero.
    fn zero(&self) -> CiphertextHandle;
    /// Homomorphic addition.
    fn add(
        &self,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
    ) -> Result<CiphertextHandle, EngineError>;
    /// Whether the handle refers to a properly initialized ciphertext.
    fn is_initialized(&self, handle: &CiphertextHandle) -> bool;
    /// Public identifier bound to the handle, safe to publish. Used in events
    /// only; state digests are taken over the handle itself.
    fn binding_id(&self, handle: &CiphertextHandle) -> BindingId;
}

/// Asynchronous decryption oracle.
///
/// A request returns immediately with an id; the result arrives later through
/// the ledger's callback entry point. Ids must be unique per oracle. The ledger
/// refuses an id it has already recorded, which leaves the oracle's new request
/// orphaned.
pub trait DecryptionOracle: Send + Sync {
    fn request_decryption(&self, handles: &[CiphertextHandle]) -> Result<RequestId, OracleError>;
}

/// Verifies that a cleartext was produced by the oracle for a given request.
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, request_id: RequestId, cleartext: &[u8], proof: &[u8])
        -> Result<(), VerifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_from_u8() {
        assert_eq!(ActionKind::from_u8(0), Some(ActionKind::Submission));
        assert_eq!(ActionKind::from_u8(1), Some(ActionKind::DecryptionRequest));
        assert_eq!(ActionKind::from_u8(2), None);
        assert_eq!(ActionKind::DecryptionRequest as u8, 1);
    }

    #[test]
    fn test_actor_id_hex() {
        let id = ActorId::new([0xab; 32]);
        let s = id.to_hex();
        assert_eq!(s.len(), 64);
        assert_eq!(ActorId::from_hex(&s).unwrap(), id);
        assert!(ActorId::from_hex("abcd").is_err());
        assert_eq!(id.to_string(), s);
    }

    #[test]
    fn test_actor_id_serde_as_hex() {
        let id = ActorId::new([1u8; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let parsed: ActorId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_uninitialized_handle() {
        assert!(CiphertextHandle::default().is_zero_handle());
        assert_eq!(CiphertextHandle::default(), CiphertextHandle::UNINITIALIZED);
        assert!(!CiphertextHandle([1u8; 32]).is_zero_handle());
    }
}
