//! The ledger: one owned state value and every operation on it.
//!
//! Each operation runs its guards in a fixed order, stages everything that can
//! fail, and only then mutates state. A returned error means nothing changed.

use std::sync::Arc;

use fhescore_core::{
    ActionKind, ActorId, BatchId, CiphertextHandle, DecryptionOracle, HomomorphicEngine,
    LedgerEvent, ProofVerifier, RequestId,
};
use tracing::{debug, info, warn};

use crate::aggregation::AggregationEngine;
use crate::batch::{Batch, BatchManager};
use crate::config::LedgerConfig;
use crate::cooldown::CooldownRegistry;
use crate::decryption::{DecryptionCoordinator, DecryptionRequest};
use crate::roles::RoleRegistry;
use crate::{LedgerError, Result};

/// Owner-only administrative operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminOp {
    AddProvider(ActorId),
    RemoveProvider(ActorId),
    Pause,
    Unpause,
    SetCooldown(u64),
    OpenBatch(BatchId),
    CloseBatch(BatchId),
}

pub struct Ledger {
    roles: RoleRegistry,
    cooldowns: CooldownRegistry,
    batches: BatchManager,
    aggregation: AggregationEngine,
    decryption: DecryptionCoordinator,
    oracle: Arc<dyn DecryptionOracle>,
    verifier: Arc<dyn ProofVerifier>,
}

fn rejected<T>(op: &'static str, caller: &ActorId, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        warn!(op, caller = %caller, error = %e, "operation rejected");
    }
    result
}

impl Ledger {
    /// Build a ledger with batch 1 open.
    pub fn new(
        config: LedgerConfig,
        engine: Arc<dyn HomomorphicEngine>,
        oracle: Arc<dyn DecryptionOracle>,
        verifier: Arc<dyn ProofVerifier>,
        now: u64,
    ) -> Result<Self> {
        config.validate()?;
        let aggregation = AggregationEngine::new(engine);
        let batches = BatchManager::new(config.batch_capacity, aggregation.zero(), now);
        info!(
            owner = %config.owner,
            cooldown_secs = config.cooldown_secs,
            batch_capacity = config.batch_capacity,
            "ledger initialized"
        );
        Ok(Self {
            roles: RoleRegistry::new(config.owner),
            cooldowns: CooldownRegistry::new(config.cooldown_secs),
            batches,
            decryption: DecryptionCoordinator::new(&config),
            aggregation,
            oracle,
            verifier,
        })
    }

    // -- Read surface --

    pub fn owner(&self) -> &ActorId {
        self.roles.owner()
    }

    pub fn is_provider(&self, actor: &ActorId) -> bool {
        self.roles.is_provider(actor)
    }

    pub fn is_paused(&self) -> bool {
        self.roles.is_paused()
    }

    pub fn cooldown_secs(&self) -> u64 {
        self.cooldowns.cooldown_secs()
    }

    pub fn current_batch_id(&self) -> BatchId {
        self.batches.current_id()
    }

    pub fn batch(&self, id: BatchId) -> Option<&Batch> {
        self.batches.get(id)
    }

    pub fn decryption_request(&self, request_id: RequestId) -> Option<&DecryptionRequest> {
        self.decryption.get(request_id)
    }

    pub fn pending_requests(&self) -> Vec<&DecryptionRequest> {
        self.decryption.pending().collect()
    }

    pub fn expired_requests(&self, now: u64) -> Vec<&DecryptionRequest> {
        self.decryption.expired(now).collect()
    }

    pub fn last_action(&self, actor: &ActorId, kind: ActionKind) -> Option<u64> {
        self.cooldowns.last_action(actor, kind)
    }

    pub fn providers(&self) -> Vec<ActorId> {
        self.roles.providers().copied().collect()
    }

    pub fn batch_capacity(&self) -> u32 {
        self.batches.capacity()
    }

    /// Batches accepting submissions; empty or just the current batch.
    pub fn active_batches(&self) -> Vec<&Batch> {
        self.batches.active().collect()
    }

    // -- Administrative surface --

    pub fn admin(&mut self, caller: &ActorId, op: AdminOp, now: u64) -> Result<Vec<LedgerEvent>> {
        rejected("admin", caller, self.try_admin(caller, op, now))
    }

    pub fn add_provider(&mut self, caller: &ActorId, provider: ActorId) -> Result<Vec<LedgerEvent>> {
        self.admin(caller, AdminOp::AddProvider(provider), 0)
    }

    pub fn remove_provider(
        &mut self,
        caller: &ActorId,
        provider: ActorId,
    ) -> Result<Vec<LedgerEvent>> {
        self.admin(caller, AdminOp::RemoveProvider(provider), 0)
    }

    pub fn pause(&mut self, caller: &ActorId) -> Result<Vec<LedgerEvent>> {
        self.admin(caller, AdminOp::Pause, 0)
    }

    pub fn unpause(&mut self, caller: &ActorId) -> Result<Vec<LedgerEvent>> {
        self.admin(caller, AdminOp::Unpause, 0)
    }

    pub fn set_cooldown(&mut self, caller: &ActorId, secs: u64) -> Result<Vec<LedgerEvent>> {
        self.admin(caller, AdminOp::SetCooldown(secs), 0)
    }

    pub fn open_batch(
        &mut self,
        caller: &ActorId,
        id: BatchId,
        now: u64,
    ) -> Result<Vec<LedgerEvent>> {
        self.admin(caller, AdminOp::OpenBatch(id), now)
    }

    pub fn close_batch(
        &mut self,
        caller: &ActorId,
        id: BatchId,
        now: u64,
    ) -> Result<Vec<LedgerEvent>> {
        self.admin(caller, AdminOp::CloseBatch(id), now)
    }

    fn try_admin(&mut self, caller: &ActorId, op: AdminOp, now: u64) -> Result<Vec<LedgerEvent>> {
        self.roles.require_owner(caller)?;

        let event = match op {
            AdminOp::AddProvider(provider) => {
                let changed = self.roles.add_provider(provider);
                info!(provider = %provider, changed, "provider added");
                LedgerEvent::ProviderAdded { provider }
            }
            AdminOp::RemoveProvider(provider) => {
                let changed = self.roles.remove_provider(&provider);
                info!(provider = %provider, changed, "provider removed");
                LedgerEvent::ProviderRemoved { provider }
            }
            AdminOp::Pause => {
                self.roles.set_paused(true);
                info!("ledger paused");
                LedgerEvent::Paused
            }
            AdminOp::Unpause => {
                self.roles.set_paused(false);
                info!("ledger unpaused");
                LedgerEvent::Unpaused
            }
            AdminOp::SetCooldown(secs) => {
                self.cooldowns.set_cooldown_secs(secs);
                info!(cooldown_secs = secs, "cooldown updated");
                LedgerEvent::CooldownUpdated {
                    cooldown_secs: secs,
                }
            }
            AdminOp::OpenBatch(id) => {
                self.batches.check_open(id)?;
                let zero = self.aggregation.zero();
                let mut events = Vec::with_capacity(2);
                if let Some(superseded) = self.batches.open_unchecked(id, zero, now) {
                    events.push(LedgerEvent::BatchClosed {
                        batch_id: superseded,
                    });
                }
                events.push(LedgerEvent::BatchOpened { batch_id: id });
                return Ok(events);
            }
            AdminOp::CloseBatch(id) => {
                self.batches.check_close(id)?;
                self.batches.close_unchecked(id, now);
                LedgerEvent::BatchClosed { batch_id: id }
            }
        };
        Ok(vec![event])
    }

    // -- Provider surface --

    /// Add an encrypted score to a batch.
    ///
    /// Guards, in order: provider, not paused, batch active, submission
    /// cooldown. Filling the batch closes it and opens the next one in the
    /// same operation.
    pub fn submit(
        &mut self,
        caller: &ActorId,
        batch_id: BatchId,
        score: CiphertextHandle,
        now: u64,
    ) -> Result<Vec<LedgerEvent>> {
        rejected("submit", caller, self.try_submit(caller, batch_id, score, now))
    }

    fn try_submit(
        &mut self,
        caller: &ActorId,
        batch_id: BatchId,
        score: CiphertextHandle,
        now: u64,
    ) -> Result<Vec<LedgerEvent>> {
        self.roles.require_provider(caller)?;
        self.roles.require_unpaused()?;
        let batch = self.batches.require_active(batch_id)?;
        let stamp = self.cooldowns.check(caller, ActionKind::Submission, now)?;

        let aggregate = self.aggregation.accumulate(&batch.aggregate, &score)?;
        let fills = self.batches.fills_on_next(batch);
        let next_zero = fills.then(|| self.aggregation.zero());

        // Nothing below can fail.
        self.cooldowns.commit(stamp);
        let count = self.batches.record_submission(batch_id, aggregate);
        debug!(
            provider = %caller,
            batch_id,
            submissions = count,
            "score accepted"
        );

        let mut events = vec![LedgerEvent::ScoreSubmitted {
            provider: *caller,
            batch_id,
            binding_id: self.aggregation.binding_id(&score),
        }];

        if let Some(zero) = next_zero {
            events.push(LedgerEvent::AggregateCommitted {
                batch_id,
                binding_id: self.aggregation.binding_id(&aggregate),
            });
            self.batches.close_unchecked(batch_id, now);
            events.push(LedgerEvent::BatchClosed { batch_id });

            let next = self.batches.next_id();
            if let Some(superseded) = self.batches.open_unchecked(next, zero, now) {
                events.push(LedgerEvent::BatchClosed {
                    batch_id: superseded,
                });
            }
            events.push(LedgerEvent::BatchOpened { batch_id: next });
            info!(closed = batch_id, opened = next, "batch rolled over at capacity");
        }

        Ok(events)
    }

    /// Ask the oracle to decrypt a batch's current aggregate.
    ///
    /// Guards, in order: provider, not paused, decryption cooldown, batch state
    /// allowed by the configured target.
    pub fn request_decryption(
        &mut self,
        caller: &ActorId,
        batch_id: BatchId,
        now: u64,
    ) -> Result<(RequestId, Vec<LedgerEvent>)> {
        rejected(
            "request_decryption",
            caller,
            self.try_request_decryption(caller, batch_id, now),
        )
    }

    fn try_request_decryption(
        &mut self,
        caller: &ActorId,
        batch_id: BatchId,
        now: u64,
    ) -> Result<(RequestId, Vec<LedgerEvent>)> {
        self.roles.require_provider(caller)?;
        self.roles.require_unpaused()?;
        let stamp = self
            .cooldowns
            .check(caller, ActionKind::DecryptionRequest, now)?;
        let batch = self
            .batches
            .get(batch_id)
            .ok_or(LedgerError::InvalidBatchId(batch_id))?;
        self.decryption.check_target(batch)?;

        let handle = batch.aggregate;
        let state_digest = self.decryption.digest(&handle);
        let request_id = self.oracle.request_decryption(&[handle])?;
        if let Err(e) = self.decryption.check_new(request_id) {
            warn!(
                request_id,
                batch_id,
                "oracle reused a request id; its new request is orphaned"
            );
            return Err(e);
        }

        self.cooldowns.commit(stamp);
        self.decryption.insert(DecryptionRequest {
            request_id,
            batch_id,
            state_digest,
            processed: false,
            requester: *caller,
            requested_at: now,
            aggregate_score: None,
        });
        info!(
            request_id,
            batch_id,
            requester = %caller,
            state_digest = hex::encode(state_digest),
            "decryption requested"
        );

        Ok((
            request_id,
            vec![LedgerEvent::DecryptionRequested {
                request_id,
                batch_id,
                state_digest,
            }],
        ))
    }

    // -- Oracle surface --

    /// Apply the oracle's answer to a pending request.
    ///
    /// Steps, in order: callback authority, request lookup, replay, expiry,
    /// state digest, proof, cleartext decoding.
    pub fn on_decryption_result(
        &mut self,
        caller: &ActorId,
        request_id: RequestId,
        cleartext: &[u8],
        proof: &[u8],
        now: u64,
    ) -> Result<Vec<LedgerEvent>> {
        rejected(
            "decryption_result",
            caller,
            self.try_decryption_result(caller, request_id, cleartext, proof, now),
        )
    }

    fn try_decryption_result(
        &mut self,
        caller: &ActorId,
        request_id: RequestId,
        cleartext: &[u8],
        proof: &[u8],
        now: u64,
    ) -> Result<Vec<LedgerEvent>> {
        self.decryption.check_authority(caller)?;
        let request = self.decryption.require_pending(request_id, now)?;
        let batch_id = request.batch_id;

        let batch = self
            .batches
            .get(batch_id)
            .ok_or(LedgerError::InvalidBatchId(batch_id))?;
        let current = self.decryption.digest(&batch.aggregate);
        self.decryption.check_digest(request, &current)?;

        self.verifier.verify(request_id, cleartext, proof)?;
        let aggregate_score = DecryptionCoordinator::decode(cleartext)?;

        self.decryption.complete(request_id, aggregate_score);
        info!(request_id, batch_id, aggregate_score, "decryption completed");

        Ok(vec![LedgerEvent::DecryptionCompleted {
            request_id,
            batch_id,
            aggregate_score,
        }])
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("owner", self.roles.owner())
            .field("paused", &self.roles.is_paused())
            .field("current_batch", &self.batches.current_id())
            .field("batches", &self.batches.len())
            .finish_non_exhaustive()
    }
}
