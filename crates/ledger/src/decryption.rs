//! Decryption request bookkeeping and callback validation.
//!
//! A request pins the exact aggregate it was issued for through a state
//! digest over the aggregate handle. When the oracle answers, the batch's
//! current handle is digested again; any submission in between changes the
//! handle and the answer is refused. Each request can be completed once.

use std::collections::BTreeMap;

use fhescore_core::cleartext::decode_u64_word;
use fhescore_core::{ActorId, BatchId, CiphertextHandle, RequestId, StateDigest};
use fhescore_crypto::state_digest;

use crate::batch::Batch;
use crate::config::{DecryptionTarget, LedgerConfig};
use crate::{LedgerError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionRequest {
    pub request_id: RequestId,
    pub batch_id: BatchId,
    /// Fixed at creation.
    pub state_digest: StateDigest,
    pub processed: bool,
    pub requester: ActorId,
    pub requested_at: u64,
    /// Set when the callback is applied.
    pub aggregate_score: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DecryptionCoordinator {
    requests: BTreeMap<RequestId, DecryptionRequest>,
    platform_identity: [u8; 32],
    target: DecryptionTarget,
    callback_authority: Option<ActorId>,
    request_ttl_secs: Option<u64>,
}

impl DecryptionCoordinator {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            requests: BTreeMap::new(),
            platform_identity: config.platform_identity,
            target: config.decryption_target,
            callback_authority: config.callback_authority,
            request_ttl_secs: config.request_ttl_secs,
        }
    }

    /// Digest of an aggregate handle on this deployment.
    pub fn digest(&self, handle: &CiphertextHandle) -> StateDigest {
        state_digest(handle, &self.platform_identity)
    }

    pub fn get(&self, request_id: RequestId) -> Option<&DecryptionRequest> {
        self.requests.get(&request_id)
    }

    /// Requests still waiting for the oracle.
    pub fn pending(&self) -> impl Iterator<Item = &DecryptionRequest> {
        self.requests.values().filter(|r| !r.processed)
    }

    /// Pending requests whose results would now be refused as expired.
    pub fn expired(&self, now: u64) -> impl Iterator<Item = &DecryptionRequest> {
        self.pending().filter(move |r| self.is_expired(r, now))
    }

    pub fn is_expired(&self, request: &DecryptionRequest, now: u64) -> bool {
        match self.request_ttl_secs {
            Some(ttl) => now > request.requested_at.saturating_add(ttl),
            None => false,
        }
    }

    /// Whether the batch's state allows a request under the configured target.
    pub fn check_target(&self, batch: &Batch) -> Result<()> {
        match (self.target, batch.is_active()) {
            (DecryptionTarget::Active, false) => Err(LedgerError::BatchClosed(batch.id)),
            (DecryptionTarget::Closed, true) => Err(LedgerError::BatchStillActive(batch.id)),
            _ => Ok(()),
        }
    }

    pub fn check_authority(&self, caller: &ActorId) -> Result<()> {
        match self.callback_authority {
            Some(authority) if authority != *caller => {
                Err(LedgerError::UnauthorizedCallback(*caller))
            }
            _ => Ok(()),
        }
    }

    pub fn check_new(&self, request_id: RequestId) -> Result<()> {
        if self.requests.contains_key(&request_id) {
            Err(LedgerError::DuplicateRequest(request_id))
        } else {
            Ok(())
        }
    }

    /// Look up a request that may still be completed.
    pub fn require_pending(&self, request_id: RequestId, now: u64) -> Result<&DecryptionRequest> {
        let request = self
            .get(request_id)
            .ok_or(LedgerError::UnknownRequest(request_id))?;
        if request.processed {
            return Err(LedgerError::ReplayAttempt(request_id));
        }
        if self.is_expired(request, now) {
            return Err(LedgerError::RequestExpired(request_id));
        }
        Ok(request)
    }

    pub fn check_digest(&self, request: &DecryptionRequest, current: &StateDigest) -> Result<()> {
        if request.state_digest == *current {
            Ok(())
        } else {
            Err(LedgerError::InvalidState {
                request_id: request.request_id,
                batch_id: request.batch_id,
            })
        }
    }

    pub fn decode(cleartext: &[u8]) -> Result<u64> {
        decode_u64_word(cleartext).ok_or(LedgerError::InvalidCleartext)
    }

    /// Callers validate with [`Self::check_new`] first.
    pub(crate) fn insert(&mut self, request: DecryptionRequest) {
        self.requests.insert(request.request_id, request);
    }

    pub(crate) fn complete(&mut self, request_id: RequestId, score: u64) {
        if let Some(request) = self.requests.get_mut(&request_id) {
            request.processed = true;
            request.aggregate_score = Some(score);
        }
    }
}

#[cfg(test)]
mod tests {
    use fhescore_core::cleartext::encode_u64_word;

    use super::*;
    use crate::batch::BatchManager;

    const OWNER: ActorId = ActorId::new([1u8; 32]);
    const ALICE: ActorId = ActorId::new([2u8; 32]);
    const ORACLE: ActorId = ActorId::new([9u8; 32]);

    fn request(id: RequestId, at: u64) -> DecryptionRequest {
        DecryptionRequest {
            request_id: id,
            batch_id: 1,
            state_digest: [4u8; 32],
            processed: false,
            requester: ALICE,
            requested_at: at,
            aggregate_score: None,
        }
    }

    #[test]
    fn test_replay_after_complete() {
        let mut coordinator = DecryptionCoordinator::new(&LedgerConfig::new(OWNER, [0u8; 32]));
        coordinator.insert(request(1, 0));
        assert!(coordinator.require_pending(1, 0).is_ok());
        coordinator.complete(1, 42);
        assert_eq!(
            coordinator.require_pending(1, 0).err(),
            Some(LedgerError::ReplayAttempt(1))
        );
        assert_eq!(coordinator.get(1).unwrap().aggregate_score, Some(42));
        assert_eq!(
            coordinator.require_pending(2, 0).err(),
            Some(LedgerError::UnknownRequest(2))
        );
    }

    #[test]
    fn test_duplicate_request_id() {
        let mut coordinator = DecryptionCoordinator::new(&LedgerConfig::new(OWNER, [0u8; 32]));
        coordinator.insert(request(7, 0));
        assert_eq!(coordinator.check_new(7), Err(LedgerError::DuplicateRequest(7)));
        assert!(coordinator.check_new(8).is_ok());
    }

    #[test]
    fn test_ttl_expiry() {
        let config = LedgerConfig::new(OWNER, [0u8; 32]).with_request_ttl_secs(100);
        let mut coordinator = DecryptionCoordinator::new(&config);
        coordinator.insert(request(1, 10));
        assert!(coordinator.require_pending(1, 110).is_ok());
        assert_eq!(
            coordinator.require_pending(1, 111).err(),
            Some(LedgerError::RequestExpired(1))
        );
        assert_eq!(coordinator.expired(111).count(), 1);
        assert_eq!(coordinator.expired(110).count(), 0);
    }

    #[test]
    fn test_unbounded_without_ttl() {
        let mut coordinator = DecryptionCoordinator::new(&LedgerConfig::new(OWNER, [0u8; 32]));
        coordinator.insert(request(1, 0));
        assert!(coordinator.require_pending(1, u64::MAX).is_ok());
        assert_eq!(coordinator.pending().count(), 1);
    }

    #[test]
    fn test_callback_authority() {
        let open = DecryptionCoordinator::new(&LedgerConfig::new(OWNER, [0u8; 32]));
        assert!(open.check_authority(&ALICE).is_ok());

        let restricted = DecryptionCoordinator::new(
            &LedgerConfig::new(OWNER, [0u8; 32]).with_callback_authority(ORACLE),
        );
        assert!(restricted.check_authority(&ORACLE).is_ok());
        assert_eq!(
            restricted.check_authority(&ALICE),
            Err(LedgerError::UnauthorizedCallback(ALICE))
        );
    }

    #[test]
    fn test_target_policy() {
        let mut batches = BatchManager::new(10, CiphertextHandle([1u8; 32]), 0);
        batches.open(2, CiphertextHandle([2u8; 32]), 0).unwrap();
        let closed = batches.get(1).unwrap();
        let active = batches.get(2).unwrap();

        let base = LedgerConfig::new(OWNER, [0u8; 32]);
        let by_target = |target| {
            DecryptionCoordinator::new(&base.clone().with_decryption_target(target))
        };

        let active_only = by_target(DecryptionTarget::Active);
        assert!(active_only.check_target(active).is_ok());
        assert_eq!(active_only.check_target(closed), Err(LedgerError::BatchClosed(1)));

        let closed_only = by_target(DecryptionTarget::Closed);
        assert!(closed_only.check_target(closed).is_ok());
        assert_eq!(
            closed_only.check_target(active),
            Err(LedgerError::BatchStillActive(2))
        );

        let any = by_target(DecryptionTarget::Any);
        assert!(any.check_target(active).is_ok());
        assert!(any.check_target(closed).is_ok());
    }

    #[test]
    fn test_digest_mismatch() {
        let coordinator = DecryptionCoordinator::new(&LedgerConfig::new(OWNER, [0u8; 32]));
        let req = request(1, 0);
        assert!(coordinator.check_digest(&req, &[4u8; 32]).is_ok());
        assert_eq!(
            coordinator.check_digest(&req, &[5u8; 32]),
            Err(LedgerError::InvalidState {
                request_id: 1,
                batch_id: 1
            })
        );
    }

    #[test]
    fn test_decode() {
        assert_eq!(DecryptionCoordinator::decode(&encode_u64_word(77)), Ok(77));
        assert_eq!(
            DecryptionCoordinator::decode(b"seventy-seven"),
            Err(LedgerError::InvalidCleartext)
        );
    }
}
