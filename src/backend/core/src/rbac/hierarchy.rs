//! Role hierarchy resolution.
//!
//! Roles form a forest through their `parent` identifiers. The resolver walks
//! parent pointers with a visited set, so a cyclic configuration produces
//! [`ConfigError::CycleDetected`] instead of looping.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use super::error::{ConfigError, ResolveError};
use super::models::{Role, RoleId};
use super::snapshot::ConfigSnapshot;

/// Default maximum number of roles in one ancestor chain (the role included).
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Walks the role-parent graph of a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct HierarchyResolver<'a> {
    snapshot: &'a ConfigSnapshot,
    max_depth: usize,
}

impl<'a> HierarchyResolver<'a> {
    pub fn new(snapshot: &'a ConfigSnapshot, max_depth: usize) -> Self {
        Self {
            snapshot,
            max_depth,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Ancestor chain of `role`, root first and `role` itself last.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::RoleNotFound`] if `role` is not in the snapshot
    /// - [`ConfigError::CycleDetected`] if a role is revisited before a root
    /// - [`ConfigError::DanglingParent`] if a parent reference does not resolve
    /// - [`ConfigError::DepthExceeded`] if the chain is longer than `max_depth`
    pub fn resolve_ancestors(&self, role: &RoleId) -> Result<Vec<&'a Role>, ResolveError> {
        let mut current = self
            .snapshot
            .role(role)
            .ok_or_else(|| ResolveError::RoleNotFound(role.clone()))?;

        let mut chain: Vec<&'a Role> = Vec::new();
        let mut visited: HashSet<&'a RoleId> = HashSet::new();

        // Terminates: every iteration either stops or grows `visited`.
        loop {
            if !visited.insert(&current.id) {
                let start = chain
                    .iter()
                    .position(|r| r.id == current.id)
                    .unwrap_or(0);
                let mut cycle: Vec<RoleId> = chain[start..].iter().map(|r| r.id.clone()).collect();
                cycle.push(current.id.clone());
                return Err(ConfigError::CycleDetected { chain: cycle }.into());
            }
            chain.push(current);

            let Some(parent_id) = current.parent.as_ref() else {
                break;
            };
            current = self.snapshot.role(parent_id).ok_or_else(|| ConfigError::DanglingParent {
                role: current.id.clone(),
                parent: parent_id.clone(),
            })?;
        }

        if chain.len() > self.max_depth {
            return Err(ConfigError::DepthExceeded {
                role: role.clone(),
                max_depth: self.max_depth,
            }
            .into());
        }

        chain.reverse();
        Ok(chain)
    }

    /// Every role that inherits through `role`, in identifier order.
    /// `role` itself is not included. Cycles are tolerated.
    pub fn descendants(&self, role: &RoleId) -> Vec<RoleId> {
        let mut children: BTreeMap<&RoleId, Vec<&RoleId>> = BTreeMap::new();
        for r in self.snapshot.roles() {
            if let Some(parent) = &r.parent {
                children.entry(parent).or_default().push(&r.id);
            }
        }

        let mut found: BTreeSet<RoleId> = BTreeSet::new();
        let mut queue: VecDeque<&RoleId> = VecDeque::from([role]);
        while let Some(next) = queue.pop_front() {
            for child in children.get(next).into_iter().flatten() {
                if *child != role && found.insert((*child).clone()) {
                    queue.push_back(child);
                }
            }
        }

        found.into_iter().collect()
    }

    /// Run [`resolve_ancestors`](Self::resolve_ancestors) for every role and
    /// collect the configuration faults.
    pub fn faults(&self) -> Vec<ConfigError> {
        self.snapshot
            .roles()
            .filter_map(|r| match self.resolve_ancestors(&r.id) {
                Err(ResolveError::Config(e)) => Some(e),
                _ => None,
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
