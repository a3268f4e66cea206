//! Effective permission computation.
//!
//! A role's effective set is an ordered fold over its root-first ancestor
//! chain: `grant` sets the inherited value to true, `deny` sets it to false,
//! `unset` leaves it alone. The most specific decision wins. Only keys whose
//! final value is true *and* whose module is active end up in the set.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::error::{ConfigError, ResolveError};
use super::hierarchy::HierarchyResolver;
use super::models::{Decision, MenuKey, RoleId};
use super::snapshot::ConfigSnapshot;

// ═══════════════════════════════════════════════════════════════════════════════
// Effective permission set
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered set of menu keys a role may access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissionSet {
    pub role: RoleId,
    keys: BTreeSet<MenuKey>,
}

impl EffectivePermissionSet {
    pub fn new(role: RoleId, keys: BTreeSet<MenuKey>) -> Self {
        Self { role, keys }
    }

    /// The set for a role that resolves to nothing (inactive or unknown).
    pub fn empty(role: RoleId) -> Self {
        Self::new(role, BTreeSet::new())
    }

    pub fn contains(&self, key: &MenuKey) -> bool {
        self.keys.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MenuKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &BTreeSet<MenuKey> {
        &self.keys
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decision trace
// ═══════════════════════════════════════════════════════════════════════════════

/// One step of the fold for a single menu key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceStep {
    pub role: RoleId,
    pub decision: Decision,
    /// Inherited value after applying this role's decision.
    pub granted: bool,
}

/// How a role's decision for one menu key was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionTrace {
    pub role: RoleId,
    pub menu: MenuKey,
    pub steps: Vec<TraceStep>,
    pub module_active: bool,
    pub granted: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Index
// ═══════════════════════════════════════════════════════════════════════════════

/// Computes effective permission sets over a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct PermissionIndex<'a> {
    snapshot: &'a ConfigSnapshot,
    resolver: HierarchyResolver<'a>,
}

impl<'a> PermissionIndex<'a> {
    pub fn new(snapshot: &'a ConfigSnapshot, max_depth: usize) -> Self {
        Self {
            snapshot,
            resolver: HierarchyResolver::new(snapshot, max_depth),
        }
    }

    pub fn resolver(&self) -> &HierarchyResolver<'a> {
        &self.resolver
    }

    /// Compute the effective permission set for `role`.
    ///
    /// Inactive ancestors still contribute their decisions; only the queried
    /// role's own active flag is checked.
    pub fn effective_permissions(
        &self,
        role: &RoleId,
    ) -> Result<EffectivePermissionSet, ResolveError> {
        let own = self
            .snapshot
            .role(role)
            .ok_or_else(|| ResolveError::RoleNotFound(role.clone()))?;
        if !own.active {
            return Err(ResolveError::RoleInactive(role.clone()));
        }

        let chain = self.resolver.resolve_ancestors(role)?;

        let mut inherited: BTreeMap<&MenuKey, bool> = BTreeMap::new();
        for ancestor in &chain {
            for (key, decision) in self.snapshot.decisions_for(&ancestor.id) {
                match decision {
                    Decision::Grant => {
                        inherited.insert(key, true);
                    }
                    Decision::Deny => {
                        inherited.insert(key, false);
                    }
                    Decision::Unset => {}
                }
            }
        }

        let keys = inherited
            .into_iter()
            .filter(|(key, granted)| {
                *granted && self.snapshot.menu(key).is_some_and(|m| m.active)
            })
            .map(|(key, _)| key.clone())
            .collect();

        Ok(EffectivePermissionSet::new(role.clone(), keys))
    }

    /// Explain the decision for a single `(role, menu)` pair.
    pub fn explain(&self, role: &RoleId, menu: &MenuKey) -> Result<PermissionTrace, ResolveError> {
        let chain = self.resolver.resolve_ancestors(role)?;

        let mut granted = false;
        let steps = chain
            .iter()
            .map(|ancestor| {
                let decision = self.snapshot.decision(&ancestor.id, menu);
                match decision {
                    Decision::Grant => granted = true,
                    Decision::Deny => granted = false,
                    Decision::Unset => {}
                }
                TraceStep {
                    role: ancestor.id.clone(),
                    decision,
                    granted,
                }
            })
            .collect();

        let module_active = self.snapshot.menu(menu).is_some_and(|m| m.active);
        let role_active = chain.last().is_some_and(|r| r.active);

        Ok(PermissionTrace {
            role: role.clone(),
            menu: menu.clone(),
            steps,
            module_active,
            granted: granted && module_active && role_active,
        })
    }

    /// Permission records that reference a menu module missing from the snapshot.
    pub fn orphaned_permissions(&self) -> Vec<ConfigError> {
        self.snapshot
            .permissions()
            .filter(|perm| self.snapshot.menu(&perm.menu).is_none())
            .map(|perm| ConfigError::OrphanedPermission {
                role: perm.role,
                menu: perm.menu,
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
