//! fhescore Crypto
//!
//! Hashing and signature primitives used around the ledger: state digests,
//! ciphertext binding ids, ed25519 keypairs and the oracle proof verifier.
//! With the `mock` feature it also ships in-process stand-ins for the
//! homomorphic engine and the decryption oracle.

pub mod digest;
pub mod keys;
#[cfg(feature = "mock")]
pub mod mock;
pub mod verifier;

pub use digest::{binding_id, state_digest};
pub use keys::{hash, KeyError, SigningKeypair};
pub use verifier::{decryption_message, Ed25519ProofVerifier};
