//! Reconciliation reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::membership::MembershipError;
use crate::audit::SyncAction;
use crate::rbac::{GroupId, RoleId};

/// A single failed operation. Recorded in the report and the audit log; never
/// aborts the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperationError {
    pub action: SyncAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupId>,
    pub error: MembershipError,
}

impl std::fmt::Display for SyncOperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{} {}: {}", self.action, group, self.error),
            None => write!(f, "{}: {}", self.action, self.error),
        }
    }
}

/// Outcome of one attempted membership operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperationOutcome {
    pub action: SyncAction,
    pub group: GroupId,
    /// Store calls made, retries included.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SyncOperationError>,
}

impl SyncOperationOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of reconciling one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub role: RoleId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Every attempted operation, additions first, each set in group order.
    pub operations: Vec<SyncOperationOutcome>,
    /// Set when the current memberships could not be read; no operations ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_error: Option<SyncOperationError>,
    /// Audit entries that could not be written.
    #[serde(default)]
    pub audit_failures: u32,
}

impl SyncReport {
    pub fn new(role: RoleId) -> Self {
        let now = Utc::now();
        Self {
            role,
            started_at: now,
            finished_at: now,
            operations: Vec::new(),
            read_error: None,
            audit_failures: 0,
        }
    }

    /// True when nothing needed doing.
    pub fn is_converged(&self) -> bool {
        self.operations.is_empty() && self.read_error.is_none()
    }

    /// True when every attempted operation succeeded.
    pub fn is_success(&self) -> bool {
        self.read_error.is_none() && self.operations.iter().all(SyncOperationOutcome::is_success)
    }

    pub fn added(&self) -> impl Iterator<Item = &GroupId> {
        self.succeeded(SyncAction::AddMembership)
    }

    pub fn removed(&self) -> impl Iterator<Item = &GroupId> {
        self.succeeded(SyncAction::RemoveMembership)
    }

    pub fn failures(&self) -> impl Iterator<Item = &SyncOperationError> {
        self.read_error
            .iter()
            .chain(self.operations.iter().filter_map(|op| op.error.as_ref()))
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    fn succeeded(&self, action: SyncAction) -> impl Iterator<Item = &GroupId> {
        self.operations
            .iter()
            .filter(move |op| op.action == action && op.is_success())
            .map(|op| &op.group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(action: SyncAction, group: &str, error: Option<MembershipError>) -> SyncOperationOutcome {
        SyncOperationOutcome {
            action,
            group: GroupId::new(group),
            attempts: 1,
            error: error.map(|error| SyncOperationError {
                action,
                group: Some(GroupId::new(group)),
                error,
            }),
        }
    }

    #[test]
    fn test_empty_report_is_converged() {
        let report = SyncReport::new("admin".into());
        assert!(report.is_converged());
        assert!(report.is_success());
    }

    #[test]
    fn test_accessors_split_by_outcome() {
        let mut report = SyncReport::new("admin".into());
        report.operations = vec![
            op(SyncAction::AddMembership, "G1", None),
            op(SyncAction::RemoveMembership, "G3", Some(MembershipError::Permanent("denied".into()))),
        ];
        assert_eq!(report.added().map(GroupId::as_str).collect::<Vec<_>>(), vec!["G1"]);
        assert_eq!(report.removed().count(), 0);
        assert_eq!(report.failure_count(), 1);
        assert!(!report.is_success());
        assert!(!report.is_converged());
        assert_eq!(
            report.failures().next().unwrap().to_string(),
            "remove_membership G3: Permanent membership store failure: denied"
        );
    }
}
