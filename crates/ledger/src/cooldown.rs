//! Per-actor, per-action rate limiting.
//!
//! A check does not write anything. It returns a [`CooldownStamp`] that the
//! caller commits once the whole operation has succeeded, so a failed
//! operation never consumes the actor's cooldown.

use std::collections::HashMap;

use fhescore_core::{ActionKind, ActorId};

use crate::{LedgerError, Result};

/// Staged timestamp update produced by a passing check.
#[must_use = "a cooldown stamp does nothing until committed"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownStamp {
    actor: ActorId,
    kind: ActionKind,
    at: u64,
}

#[derive(Debug, Clone)]
pub struct CooldownRegistry {
    cooldown_secs: u64,
    last_action: HashMap<(ActorId, ActionKind), u64>,
}

impl CooldownRegistry {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown_secs,
            last_action: HashMap::new(),
        }
    }

    pub fn cooldown_secs(&self) -> u64 {
        self.cooldown_secs
    }

    pub fn set_cooldown_secs(&mut self, secs: u64) {
        self.cooldown_secs = secs;
    }

    pub fn last_action(&self, actor: &ActorId, kind: ActionKind) -> Option<u64> {
        self.last_action.get(&(*actor, kind)).copied()
    }

    /// Earliest time the actor may act again; `None` if it never acted.
    pub fn ready_at(&self, actor: &ActorId, kind: ActionKind) -> Option<u64> {
        self.last_action(actor, kind)
            .map(|last| last.saturating_add(self.cooldown_secs))
    }

    /// Passes when `now >= last + cooldown` or the actor has no entry.
    pub fn check(&self, actor: &ActorId, kind: ActionKind, now: u64) -> Result<CooldownStamp> {
        if let Some(ready_at) = self.ready_at(actor, kind) {
            if now < ready_at {
                return Err(LedgerError::RateLimited { kind, ready_at });
            }
        }
        Ok(CooldownStamp {
            actor: *actor,
            kind,
            at: now,
        })
    }

    pub fn commit(&mut self, stamp: CooldownStamp) {
        self.last_action.insert((stamp.actor, stamp.kind), stamp.at);
    }
}
