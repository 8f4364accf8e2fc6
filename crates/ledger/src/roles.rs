//! Owner identity, provider membership and the pause flag.

use std::collections::BTreeSet;

use fhescore_core::{ActorId, Role};

use crate::{LedgerError, Result};

/// Who may do what. The owner is fixed at construction.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    owner: ActorId,
    providers: BTreeSet<ActorId>,
    paused: bool,
}

/// Pure role predicate over a registry value.
pub fn has_role(registry: &RoleRegistry, actor: &ActorId, role: Role) -> bool {
    match role {
        Role::Owner => registry.owner == *actor,
        Role::Provider => registry.providers.contains(actor),
    }
}

impl RoleRegistry {
    pub fn new(owner: ActorId) -> Self {
        Self {
            owner,
            providers: BTreeSet::new(),
            paused: false,
        }
    }

    pub fn owner(&self) -> &ActorId {
        &self.owner
    }

    pub fn is_provider(&self, actor: &ActorId) -> bool {
        has_role(self, actor, Role::Provider)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn providers(&self) -> impl Iterator<Item = &ActorId> {
        self.providers.iter()
    }

    pub fn require_owner(&self, caller: &ActorId) -> Result<()> {
        if has_role(self, caller, Role::Owner) {
            Ok(())
        } else {
            Err(LedgerError::NotOwner(*caller))
        }
    }

    pub fn require_provider(&self, caller: &ActorId) -> Result<()> {
        if has_role(self, caller, Role::Provider) {
            Ok(())
        } else {
            Err(LedgerError::NotProvider(*caller))
        }
    }

    pub fn require_unpaused(&self) -> Result<()> {
        if self.paused {
            Err(LedgerError::Paused)
        } else {
            Ok(())
        }
    }

    /// Returns whether membership changed. Callers signal either way.
    pub fn add_provider(&mut self, provider: ActorId) -> bool {
        self.providers.insert(provider)
    }

    pub fn remove_provider(&mut self, provider: &ActorId) -> bool {
        self.providers.remove(provider)
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: ActorId = ActorId::new([1u8; 32]);
    const ALICE: ActorId = ActorId::new([2u8; 32]);

    #[test]
    fn test_owner_is_not_implicitly_provider() {
        let registry = RoleRegistry::new(OWNER);
        assert!(has_role(&registry, &OWNER, Role::Owner));
        assert!(!has_role(&registry, &OWNER, Role::Provider));
        assert_eq!(
            registry.require_provider(&OWNER),
            Err(LedgerError::NotProvider(OWNER))
        );
    }

    #[test]
    fn test_membership_is_idempotent() {
        let mut registry = RoleRegistry::new(OWNER);
        assert!(registry.add_provider(ALICE));
        assert!(!registry.add_provider(ALICE));
        assert!(registry.is_provider(&ALICE));
        assert!(registry.remove_provider(&ALICE));
        assert!(!registry.remove_provider(&ALICE));
        assert!(!registry.is_provider(&ALICE));
    }

    #[test]
    fn test_require_owner() {
        let registry = RoleRegistry::new(OWNER);
        assert!(registry.require_owner(&OWNER).is_ok());
        assert_eq!(registry.require_owner(&ALICE), Err(LedgerError::NotOwner(ALICE)));
    }

    #[test]
    fn test_pause_flag() {
        let mut registry = RoleRegistry::new(OWNER);
        assert!(registry.require_unpaused().is_ok());
        registry.set_paused(true);
        assert_eq!(registry.require_unpaused(), Err(LedgerError::Paused));
    }
}
