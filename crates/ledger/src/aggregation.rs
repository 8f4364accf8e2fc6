//! Homomorphic accumulation of encrypted scores.

use std::sync::Arc;

use fhescore_core::{BindingId, CiphertextHandle, HomomorphicEngine};

use crate::{LedgerError, Result};

/// Thin policy layer over the homomorphic engine collaborator.
#[derive(Clone)]
pub struct AggregationEngine {
    engine: Arc<dyn HomomorphicEngine>,
}

impl AggregationEngine {
    pub fn new(engine: Arc<dyn HomomorphicEngine>) -> Self {
        Self { engine }
    }

    pub fn zero(&self) -> CiphertextHandle {
        self.engine.zero()
    }

    /// Fails on an uninitialized incoming handle instead of treating it as zero.
    pub fn require_initialized(&self, incoming: &CiphertextHandle) -> Result<()> {
        if incoming.is_zero_handle() || !self.engine.is_initialized(incoming) {
            return Err(LedgerError::UninitializedCiphertext);
        }
        Ok(())
    }

    /// `aggregate + incoming`.
    pub fn accumulate(
        &self,
        aggregate: &CiphertextHandle,
        incoming: &CiphertextHandle,
    ) -> Result<CiphertextHandle> {
        self.require_initialized(incoming)?;
        Ok(self.engine.add(aggregate, incoming)?)
    }

    pub fn binding_id(&self, handle: &CiphertextHandle) -> BindingId {
        self.engine.binding_id(handle)
    }
}

impl std::fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationEngine").finish_non_exhaustive()
    }
}
