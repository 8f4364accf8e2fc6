//! Ledger configuration.
//!
//! [`LedgerConfig`] is what a [`crate::Ledger`] is built from. [`LedgerSettings`]
//! is its on-disk JSON form, with identities written as hex strings.

use fhescore_core::ActorId;
use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result};

/// Submissions that fill a batch.
pub const DEFAULT_BATCH_CAPACITY: u32 = 10;
pub const DEFAULT_COOLDOWN_SECS: u64 = 30;

/// Which batches a decryption request may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptionTarget {
    /// Only batches still accepting submissions.
    #[default]
    Active,
    /// Only closed batches, whose aggregate is final.
    Closed,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub owner: ActorId,
    /// Identity of this deployment, mixed into every state digest.
    pub platform_identity: [u8; 32],
    pub cooldown_secs: u64,
    pub batch_capacity: u32,
    pub decryption_target: DecryptionTarget,
    /// When set, only this actor may deliver decryption results.
    pub callback_authority: Option<ActorId>,
    /// When set, results for requests older than this are refused.
    pub request_ttl_secs: Option<u64>,
}

impl LedgerConfig {
    pub fn new(owner: ActorId, platform_identity: [u8; 32]) -> Self {
        Self {
            owner,
            platform_identity,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            decryption_target: DecryptionTarget::default(),
            callback_authority: None,
            request_ttl_secs: None,
        }
    }

    pub fn with_cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    pub fn with_batch_capacity(mut self, capacity: u32) -> Self {
        self.batch_capacity = capacity;
        self
    }

    pub fn with_decryption_target(mut self, target: DecryptionTarget) -> Self {
        self.decryption_target = target;
        self
    }

    pub fn with_callback_authority(mut self, authority: ActorId) -> Self {
        self.callback_authority = Some(authority);
        self
    }

    pub fn with_request_ttl_secs(mut self, ttl: u64) -> Self {
        self.request_ttl_secs = Some(ttl);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_capacity == 0 {
            return Err(LedgerError::InvalidConfig(
                "batch_capacity must be at least 1".to_string(),
            ));
        }
        if self.request_ttl_secs == Some(0) {
            return Err(LedgerError::InvalidConfig(
                "request_ttl_secs must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Persistent ledger settings (JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub owner: Option<ActorId>,
    #[serde(with = "hex::serde")]
    pub platform_identity: [u8; 32],
    pub cooldown_secs: u64,
    pub batch_capacity: u32,
    pub decryption_target: DecryptionTarget,
    pub callback_authority: Option<ActorId>,
    pub request_ttl_secs: Option<u64>,
    /// Providers the owner registers at startup.
    pub providers: Vec<ActorId>,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            owner: None,
            platform_identity: [0u8; 32],
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            decryption_target: DecryptionTarget::default(),
            callback_authority: None,
            request_ttl_secs: None,
            providers: Vec::new(),
        }
    }
}

impl LedgerSettings {
    pub fn to_config(&self) -> Result<LedgerConfig> {
        let owner = self
            .owner
            .ok_or_else(|| LedgerError::InvalidConfig("owner is not set".to_string()))?;
        let config = LedgerConfig {
            owner,
            platform_identity: self.platform_identity,
            cooldown_secs: self.cooldown_secs,
            batch_capacity: self.batch_capacity,
            decryption_target: self.decryption_target,
            callback_authority: self.callback_authority,
            request_ttl_secs: self.request_ttl_secs,
        };
        config.validate()?;
        Ok(config)
    }
}
