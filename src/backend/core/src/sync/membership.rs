//! External group-membership store interface.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::rbac::{GroupId, RoleId};

/// Failure reported by the membership store.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum MembershipError {
    /// May succeed if retried (timeouts, throttling).
    #[error("Transient membership store failure: {0}")]
    Transient(String),

    #[error("Permanent membership store failure: {0}")]
    Permanent(String),
}

impl MembershipError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient(_) => "transient",
            Self::Permanent(_) => "permanent",
        }
    }
}

/// The external group store that role memberships are reconciled against.
///
/// Implementations must tolerate concurrent calls for distinct roles.
pub trait GroupMembershipStore: Send + Sync {
    fn get_membership(&self, role: &RoleId) -> Result<BTreeSet<GroupId>, MembershipError>;

    fn add_membership(&self, role: &RoleId, group: &GroupId) -> Result<(), MembershipError>;

    fn remove_membership(&self, role: &RoleId, group: &GroupId) -> Result<(), MembershipError>;

    /// Roles holding any membership. Lets a full sync clean up roles whose
    /// mappings were removed.
    fn known_roles(&self) -> Vec<RoleId> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FailurePoint {
    Read(RoleId),
    Write(RoleId, GroupId),
}

/// In-process membership store.
///
/// Failures can be scheduled per role or per (role, group) to simulate an
/// unreliable external system. A scheduled failure fires once per `times`.
#[derive(Debug, Default)]
pub struct InMemoryMembershipStore {
    memberships: DashMap<RoleId, BTreeSet<GroupId>>,
    failures: DashMap<FailurePoint, (MembershipError, u32)>,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed memberships for `role`.
    pub fn with_memberships<I, G>(self, role: impl Into<RoleId>, groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<GroupId>,
    {
        self.memberships
            .insert(role.into(), groups.into_iter().map(Into::into).collect());
        self
    }

    /// Fail the next `times` writes for `(role, group)` with `error`.
    pub fn fail_writes(&self, role: impl Into<RoleId>, group: impl Into<GroupId>, error: MembershipError, times: u32) {
        self.failures
            .insert(FailurePoint::Write(role.into(), group.into()), (error, times));
    }

    /// Fail the next `times` reads for `role` with `error`.
    pub fn fail_reads(&self, role: impl Into<RoleId>, error: MembershipError, times: u32) {
        self.failures.insert(FailurePoint::Read(role.into()), (error, times));
    }

    /// Current memberships, bypassing scheduled failures.
    pub fn groups_of(&self, role: &RoleId) -> BTreeSet<GroupId> {
        self.memberships
            .get(role)
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    fn take_failure(&self, point: FailurePoint) -> Result<(), MembershipError> {
        let mut exhausted = false;
        let result = match self.failures.get_mut(&point) {
            Some(mut scheduled) if scheduled.1 > 0 => {
                scheduled.1 -= 1;
                exhausted = scheduled.1 == 0;
                Err(scheduled.0.clone())
            }
            _ => Ok(()),
        };
        if exhausted {
            self.failures.remove(&point);
        }
        result
    }
}

impl GroupMembershipStore for InMemoryMembershipStore {
    fn get_membership(&self, role: &RoleId) -> Result<BTreeSet<GroupId>, MembershipError> {
        self.take_failure(FailurePoint::Read(role.clone()))?;
        Ok(self.groups_of(role))
    }

    fn add_membership(&self, role: &RoleId, group: &GroupId) -> Result<(), MembershipError> {
        self.take_failure(FailurePoint::Write(role.clone(), group.clone()))?;
        self.memberships
            .entry(role.clone())
            .or_default()
            .insert(group.clone());
        Ok(())
    }

    fn remove_membership(&self, role: &RoleId, group: &GroupId) -> Result<(), MembershipError> {
        self.take_failure(FailurePoint::Write(role.clone(), group.clone()))?;
        if let Some(mut groups) = self.memberships.get_mut(role) {
            groups.remove(group);
        }
        Ok(())
    }

    fn known_roles(&self) -> Vec<RoleId> {
        self.memberships
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }
}
