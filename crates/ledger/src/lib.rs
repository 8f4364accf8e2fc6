//! fhescore Ledger
//!
//! Accepts encrypted scores from authorized providers into sequential batches,
//! aggregates them homomorphically, and releases only verified batch aggregates
//! through an asynchronous decryption oracle.
//!
//! All shared state lives in one [`Ledger`] value. Every operation checks its
//! preconditions in a fixed order, then commits all of its effects or none.
//! [`LedgerService`] serializes operations from many callers onto that value.

pub mod aggregation;
pub mod batch;
pub mod config;
pub mod cooldown;
pub mod decryption;
pub mod ledger;
pub mod roles;
pub mod service;

pub use aggregation::AggregationEngine;
pub use batch::{Batch, BatchManager, BatchState};
pub use config::{DecryptionTarget, LedgerConfig, LedgerSettings};
pub use cooldown::{CooldownRegistry, CooldownStamp};
pub use decryption::{DecryptionCoordinator, DecryptionRequest};
pub use ledger::{AdminOp, Ledger};
pub use roles::{has_role, RoleRegistry};
pub use service::{Clock, LedgerHandle, LedgerService, ManualClock, ServiceError, SystemClock};

use fhescore_core::{
    ActionKind, ActorId, BatchId, EngineError, OracleError, RequestId, VerifyError,
};
use thiserror::Error;

/// Error classes callers can branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authorization,
    Availability,
    Throughput,
    Lifecycle,
    Consistency,
    Collaborator,
    Configuration,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("caller {0} is not the owner")]
    NotOwner(ActorId),
    #[error("caller {0} is not a provider")]
    NotProvider(ActorId),
    #[error("caller {0} may not deliver decryption results")]
    UnauthorizedCallback(ActorId),
    #[error("ledger is paused")]
    Paused,
    #[error("{kind:?} cooldown active until {ready_at}")]
    RateLimited { kind: ActionKind, ready_at: u64 },
    #[error("invalid batch id {0}")]
    InvalidBatchId(BatchId),
    #[error("batch {0} is closed")]
    BatchClosed(BatchId),
    #[error("batch {0} is still active")]
    BatchStillActive(BatchId),
    #[error("ciphertext handle is not initialized")]
    UninitializedCiphertext,
    #[error("aggregate of batch {batch_id} changed since request {request_id}")]
    InvalidState {
        request_id: RequestId,
        batch_id: BatchId,
    },
    #[error("request {0} already processed")]
    ReplayAttempt(RequestId),
    #[error("unknown decryption request {0}")]
    UnknownRequest(RequestId),
    #[error("decryption request {0} already exists")]
    DuplicateRequest(RequestId),
    #[error("decryption request {0} expired")]
    RequestExpired(RequestId),
    #[error("invalid decryption proof: {0}")]
    InvalidProof(#[from] VerifyError),
    #[error("cleartext is not a 32-byte u64 word")]
    InvalidCleartext,
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotOwner(_) | Self::NotProvider(_) | Self::UnauthorizedCallback(_) => {
                ErrorKind::Authorization
            }
            Self::Paused => ErrorKind::Availability,
            Self::RateLimited { .. } => ErrorKind::Throughput,
            Self::InvalidBatchId(_)
            | Self::BatchClosed(_)
            | Self::BatchStillActive(_)
            | Self::UninitializedCiphertext => ErrorKind::Lifecycle,
            Self::InvalidState { .. }
            | Self::ReplayAttempt(_)
            | Self::UnknownRequest(_)
            | Self::DuplicateRequest(_)
            | Self::RequestExpired(_)
            | Self::InvalidProof(_)
            | Self::InvalidCleartext => ErrorKind::Consistency,
            Self::Engine(_) | Self::Oracle(_) => ErrorKind::Collaborator,
            Self::InvalidConfig(_) => ErrorKind::Configuration,
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
