//! Batch table: sequential ids, Active → Closed lifecycle, capacity tracking.
//!
//! Only the current batch is ever active; opening a new one closes it.

use std::collections::BTreeMap;

use fhescore_core::{BatchId, CiphertextHandle};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{LedgerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    Active,
    /// Terminal for this id.
    Closed,
}

/// One submission window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub id: BatchId,
    pub state: BatchState,
    /// Accepted submissions so far.
    pub submission_count: u32,
    /// Running homomorphic sum of accepted scores.
    pub aggregate: CiphertextHandle,
    pub opened_at: u64,
    pub closed_at: Option<u64>,
}

impl Batch {
    fn fresh(id: BatchId, zero: CiphertextHandle, now: u64) -> Self {
        Self {
            id,
            state: BatchState::Active,
            submission_count: 0,
            aggregate: zero,
            opened_at: now,
            closed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == BatchState::Active
    }
}

/// Owns every batch ever opened. Batches are never removed.
#[derive(Debug, Clone)]
pub struct BatchManager {
    batches: BTreeMap<BatchId, Batch>,
    current: BatchId,
    capacity: u32,
}

impl BatchManager {
    /// Start with batch 1 open and current.
    pub fn new(capacity: u32, zero: CiphertextHandle, now: u64) -> Self {
        let mut batches = BTreeMap::new();
        batches.insert(1, Batch::fresh(1, zero, now));
        Self {
            batches,
            current: 1,
            capacity,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Batch that new submissions are expected to target.
    pub fn current_id(&self) -> BatchId {
        self.current
    }

    /// The only id `open` will accept.
    pub fn next_id(&self) -> BatchId {
        self.batches.keys().next_back().map_or(1, |last| last + 1)
    }

    pub fn get(&self, id: BatchId) -> Option<&Batch> {
        self.batches.get(&id)
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Batch> {
        self.batches.values()
    }

    /// Look up a batch that must accept work.
    pub fn require_active(&self, id: BatchId) -> Result<&Batch> {
        let batch = self.get(id).ok_or(LedgerError::InvalidBatchId(id))?;
        if batch.is_active() {
            Ok(batch)
        } else {
            Err(LedgerError::BatchClosed(id))
        }
    }

    pub fn check_open(&self, id: BatchId) -> Result<()> {
        if id == self.next_id() {
            Ok(())
        } else {
            Err(LedgerError::InvalidBatchId(id))
        }
    }

    pub fn check_close(&self, id: BatchId) -> Result<()> {
        self.require_active(id).map(|_| ())
    }

    /// Whether one more submission would fill the batch.
    pub fn fills_on_next(&self, batch: &Batch) -> bool {
        batch.submission_count.saturating_add(1) >= self.capacity
    }

    /// Open `id` and make it current, closing the batch it supersedes if that
    /// one is still active. Returns the id closed that way.
    ///
    /// Callers validate with [`Self::check_open`].
    pub(crate) fn open_unchecked(
        &mut self,
        id: BatchId,
        zero: CiphertextHandle,
        now: u64,
    ) -> Option<BatchId> {
        let previous = self.current;
        let superseded = self
            .get(previous)
            .is_some_and(Batch::is_active)
            .then_some(previous);
        if let Some(previous) = superseded {
            self.close_unchecked(previous, now);
        }
        self.batches.insert(id, Batch::fresh(id, zero, now));
        self.current = id;
        info!(batch_id = id, "batch opened");
        superseded
    }

    /// Batches still accepting submissions. At most one, the current batch.
    pub fn active(&self) -> impl Iterator<Item = &Batch> {
        self.iter().filter(|b| b.is_active())
    }

    pub(crate) fn close_unchecked(&mut self, id: BatchId, now: u64) {
        if let Some(batch) = self.batches.get_mut(&id) {
            batch.state = BatchState::Closed;
            batch.closed_at = Some(now);
            info!(
                batch_id = id,
                submissions = batch.submission_count,
                "batch closed"
            );
        }
    }

    /// Store the new aggregate and bump the counter; returns the new count.
    pub(crate) fn record_submission(&mut self, id: BatchId, aggregate: CiphertextHandle) -> u32 {
        match self.batches.get_mut(&id) {
            Some(batch) => {
                batch.aggregate = aggregate;
                batch.submission_count += 1;
                batch.submission_count
            }
            None => 0,
        }
    }

    pub fn open(
        &mut self,
        id: BatchId,
        zero: CiphertextHandle,
        now: u64,
    ) -> Result<Option<BatchId>> {
        self.check_open(id)?;
        Ok(self.open_unchecked(id, zero, now))
    }

    pub fn close(&mut self, id: BatchId, now: u64) -> Result<()> {
        self.check_close(id)?;
        self.close_unchecked(id, now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(b: u8) -> CiphertextHandle {
        CiphertextHandle([b; 32])
    }

    #[test]
    fn test_starts_with_batch_one() {
        let manager = BatchManager::new(10, handle(1), 100);
        let batch = manager.get(1).unwrap();
        assert!(batch.is_active());
        assert_eq!(batch.submission_count, 0);
        assert_eq!(batch.aggregate, handle(1));
        assert_eq!(batch.opened_at, 100);
        assert_eq!(manager.current_id(), 1);
        assert_eq!(manager.next_id(), 2);
    }

    #[test]
    fn test_open_requires_next_sequential_id() {
        let mut manager = BatchManager::new(10, handle(1), 0);
        assert_eq!(manager.open(3, handle(2), 0), Err(LedgerError::InvalidBatchId(3)));
        assert_eq!(manager.open(1, handle(2), 0), Err(LedgerError::InvalidBatchId(1)));
        assert_eq!(manager.open(2, handle(2), 0), Ok(Some(1)));
        assert_eq!(manager.current_id(), 2);
        assert_eq!(manager.next_id(), 3);
    }

    #[test]
    fn test_open_supersedes_active_current() {
        let mut manager = BatchManager::new(10, handle(1), 0);
        assert_eq!(manager.open(2, handle(2), 40), Ok(Some(1)));
        let old = manager.get(1).unwrap();
        assert!(!old.is_active());
        assert_eq!(old.closed_at, Some(40));
        assert_eq!(manager.require_active(1).err(), Some(LedgerError::BatchClosed(1)));
        assert_eq!(
            manager.active().map(|b| b.id).collect::<Vec<_>>(),
            vec![2]
        );

        manager.close(2, 50).unwrap();
        assert_eq!(manager.active().count(), 0);
        assert_eq!(manager.open(3, handle(3), 60), Ok(None));
        assert_eq!(manager.iter().count(), 3);
        assert_eq!(manager.capacity(), 10);
    }

    #[test]
    fn test_close_twice_fails() {
        let mut manager = BatchManager::new(10, handle(1), 0);
        assert!(manager.close(1, 50).is_ok());
        assert_eq!(manager.get(1).unwrap().closed_at, Some(50));
        assert_eq!(manager.close(1, 60), Err(LedgerError::BatchClosed(1)));
        assert_eq!(manager.close(9, 60), Err(LedgerError::InvalidBatchId(9)));
    }

    #[test]
    fn test_require_active() {
        let mut manager = BatchManager::new(10, handle(1), 0);
        assert!(manager.require_active(1).is_ok());
        assert_eq!(
            manager.require_active(2).err(),
            Some(LedgerError::InvalidBatchId(2))
        );
        manager.close(1, 0).unwrap();
        assert_eq!(
            manager.require_active(1).err(),
            Some(LedgerError::BatchClosed(1))
        );
    }

    #[test]
    fn test_fills_on_next() {
        let mut manager = BatchManager::new(3, handle(1), 0);
        assert!(!manager.fills_on_next(manager.get(1).unwrap()));
        manager.record_submission(1, handle(2));
        manager.record_submission(1, handle(3));
        let batch = manager.get(1).unwrap().clone();
        assert_eq!(batch.submission_count, 2);
        assert_eq!(batch.aggregate, handle(3));
        assert!(manager.fills_on_next(&batch));
    }
}
