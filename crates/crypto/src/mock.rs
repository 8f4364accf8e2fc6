//! In-process stand-ins for the homomorphic engine and decryption oracle.
//!
//! `MockEngine` keeps plaintexts in a table keyed by random-looking handles, so
//! handles stay opaque to the ledger while tests can still check sums.
//! `MockOracle` queues requests and fulfills them on demand with a cleartext
//! signed by its own ed25519 key. Neither offers any confidentiality.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use fhescore_core::cleartext::encode_u64_word;
use fhescore_core::{
    BindingId, CiphertextHandle, DecryptionOracle, EngineError, HomomorphicEngine, OracleError,
    RequestId,
};
use tracing::debug;

use crate::digest::binding_id;
use crate::keys::{hash, SigningKeypair};
use crate::verifier::{decryption_message, Ed25519ProofVerifier};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct EngineState {
    values: HashMap<CiphertextHandle, u64>,
    counter: u64,
}

impl EngineState {
    fn fresh(&mut self, value: u64) -> CiphertextHandle {
        self.counter += 1;
        let mut seed = b"fhescore-mock-handle".to_vec();
        seed.extend_from_slice(&self.counter.to_le_bytes());
        let handle = CiphertextHandle(hash(&seed));
        self.values.insert(handle, value);
        handle
    }
}

/// Additive engine over `u64` (wrapping), one fresh handle per result.
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<EngineState>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// "Encrypt" a score.
    pub fn encrypt(&self, value: u64) -> CiphertextHandle {
        lock(&self.state).fresh(value)
    }

    /// Plaintext behind a handle, if the engine issued it.
    pub fn decrypt(&self, handle: &CiphertextHandle) -> Option<u64> {
        lock(&self.state).values.get(handle).copied()
    }

}

impl HomomorphicEngine for MockEngine {
    fn zero(&self) -> CiphertextHandle {
        self.encrypt(0)
    }

    fn add(
        &self,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
    ) -> Result<CiphertextHandle, EngineError> {
        let mut state = lock(&self.state);
        let lhs = *state.values.get(a).ok_or(EngineError::UnknownHandle)?;
        let rhs = *state.values.get(b).ok_or(EngineError::UnknownHandle)?;
        Ok(state.fresh(lhs.wrapping_add(rhs)))
    }

    fn is_initialized(&self, handle: &CiphertextHandle) -> bool {
        !handle.is_zero_handle() && lock(&self.state).values.contains_key(handle)
    }

    fn binding_id(&self, handle: &CiphertextHandle) -> BindingId {
        binding_id(handle)
    }
}

/// Result the oracle hands back to the ledger's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fulfillment {
    pub request_id: RequestId,
    pub cleartext: Vec<u8>,
    pub proof: Vec<u8>,
}

#[derive(Default)]
struct OracleState {
    next_id: RequestId,
    pending: BTreeMap<RequestId, Vec<CiphertextHandle>>,
    unavailable: bool,
}

/// Queueing oracle that decrypts through a shared [`MockEngine`].
pub struct MockOracle {
    engine: Arc<MockEngine>,
    keypair: SigningKeypair,
    state: Mutex<OracleState>,
}

impl MockOracle {
    pub fn new(engine: Arc<MockEngine>) -> Self {
        Self::with_keypair(engine, SigningKeypair::generate())
    }

    pub fn with_keypair(engine: Arc<MockEngine>, keypair: SigningKeypair) -> Self {
        Self {
            engine,
            keypair,
            state: Mutex::new(OracleState {
                next_id: 1,
                ..OracleState::default()
            }),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public_key_bytes()
    }

    /// Verifier that trusts this oracle's key.
    pub fn verifier(&self) -> Ed25519ProofVerifier {
        Ed25519ProofVerifier::new(self.public_key())
    }

    /// Make subsequent requests fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    /// Request ids not yet fulfilled.
    pub fn pending(&self) -> Vec<RequestId> {
        lock(&self.state).pending.keys().copied().collect()
    }

    /// Decrypt the handles captured at request time and sign the sum.
    ///
    /// Removes the request from the queue; `None` if it is unknown or a handle
    /// was not issued by the engine.
    pub fn fulfill(&self, request_id: RequestId) -> Option<Fulfillment> {
        let handles = lock(&self.state).pending.remove(&request_id)?;
        let mut total = 0u64;
        for handle in &handles {
            total = total.wrapping_add(self.engine.decrypt(handle)?);
        }
        let cleartext = encode_u64_word(total);
        let proof = self
            .keypair
            .sign(&decryption_message(request_id, &cleartext))
            .to_vec();
        debug!(request_id, "mock oracle fulfilled request");
        Some(Fulfillment {
            request_id,
            cleartext,
            proof,
        })
    }
}

impl DecryptionOracle for MockOracle {
    fn request_decryption(&self, handles: &[CiphertextHandle]) -> Result<RequestId, OracleError> {
        let mut state = lock(&self.state);
        if state.unavailable {
            return Err(OracleError::Unavailable("mock oracle offline".to_string()));
        }
        let request_id = state.next_id;
        state.next_id += 1;
        state.pending.insert(request_id, handles.to_vec());
        Ok(request_id)
    }
}
