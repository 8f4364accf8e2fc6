//! Signals emitted by successful ledger operations.
//!
//! Events are published for off-chain correlation. None of them carries a
//! ciphertext or an individual score; the only plaintext ever emitted is a
//! verified batch aggregate in [`LedgerEvent::DecryptionCompleted`].

use serde::{Deserialize, Serialize};

use crate::{ActorId, BatchId, BindingId, RequestId, StateDigest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    ProviderAdded {
        provider: ActorId,
    },
    ProviderRemoved {
        provider: ActorId,
    },
    Paused,
    Unpaused,
    CooldownUpdated {
        cooldown_secs: u64,
    },
    BatchOpened {
        batch_id: BatchId,
    },
    BatchClosed {
        batch_id: BatchId,
    },
    ScoreSubmitted {
        provider: ActorId,
        batch_id: BatchId,
        binding_id: BindingId,
    },
    /// The batch reached capacity; its aggregate is final.
    AggregateCommitted {
        batch_id: BatchId,
        binding_id: BindingId,
    },
    DecryptionRequested {
        request_id: RequestId,
        batch_id: BatchId,
        state_digest: StateDigest,
    },
    DecryptionCompleted {
        request_id: RequestId,
        batch_id: BatchId,
        aggregate_score: u64,
    },
}

impl LedgerEvent {
    /// Short stable name, used as a log field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProviderAdded { .. } => "provider_added",
            Self::ProviderRemoved { .. } => "provider_removed",
            Self::Paused => "paused",
            Self::Unpaused => "unpaused",
            Self::CooldownUpdated { .. } => "cooldown_updated",
            Self::BatchOpened { .. } => "batch_opened",
            Self::BatchClosed { .. } => "batch_closed",
            Self::ScoreSubmitted { .. } => "score_submitted",
            Self::AggregateCommitted { .. } => "aggregate_committed",
            Self::DecryptionRequested { .. } => "decryption_requested",
            Self::DecryptionCompleted { .. } => "decryption_completed",
        }
    }

    /// Compact binary encoding for relaying.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_binary_encoding() {
        let event = LedgerEvent::DecryptionRequested {
            request_id: 7,
            batch_id: 3,
            state_digest: [9u8; 32],
        };
        let bytes = event.to_bytes().unwrap();
        assert_eq!(LedgerEvent::from_bytes(&bytes).unwrap(), event);
    }

    #[test]
    fn test_event_rejects_garbage() {
        assert!(LedgerEvent::from_bytes(&[0xff; 3]).is_err());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(LedgerEvent::Paused.name(), "paused");
        assert_eq!(
            LedgerEvent::BatchClosed { batch_id: 1 }.name(),
            "batch_closed"
        );
    }
}
