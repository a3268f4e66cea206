//! Health checker implementations.
//!
//! This module provides health checkers for:
//! - **Permission configuration**: hierarchy faults and orphaned permission rows
//! - **Group sync**: failed sync attempts recorded in the audit log
//!
//! # Example
//!
//! ```rust,ignore
//! use menugate_core::health::{HealthChecker, PermissionConfigChecker};
//!
//! let checker = PermissionConfigChecker::new(store.clone(), DEFAULT_MAX_DEPTH);
//! let health = checker.check();
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn};

use super::check::{ComponentHealth, HealthStatus};
use crate::audit::SyncAuditLog;
use crate::rbac::{HierarchyResolver, PermissionIndex, SnapshotStore};

/// A single named health check. Checks are synchronous and read-only.
pub trait HealthChecker: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self) -> ComponentHealth;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Integrity of the current configuration snapshot.
///
/// Hierarchy faults (cycles, excessive depth, dangling parents) make requests
/// for the affected roles fail and are reported as `error`. Permission rows
/// naming a missing menu are harmless to resolution and reported as `warning`.
pub struct PermissionConfigChecker {
    store: Arc<SnapshotStore>,
    max_depth: usize,
}

impl PermissionConfigChecker {
    pub fn new(store: Arc<SnapshotStore>, max_depth: usize) -> Self {
        Self { store, max_depth }
    }
}

impl HealthChecker for PermissionConfigChecker {
    fn name(&self) -> &str {
        "permission_config"
    }

    fn check(&self) -> ComponentHealth {
        let start = Instant::now();
        let snapshot = self.store.current();

        let hierarchy_faults = HierarchyResolver::new(&snapshot, self.max_depth).faults();
        let orphans = PermissionIndex::new(&snapshot, self.max_depth).orphaned_permissions();

        let (mut health, message) = if !hierarchy_faults.is_empty() {
            error!(faults = hierarchy_faults.len(), "Role hierarchy faults detected");
            (
                ComponentHealth::error(self.name()),
                format!("{} role hierarchy fault(s)", hierarchy_faults.len()),
            )
        } else if !orphans.is_empty() {
            warn!(orphans = orphans.len(), "Permission rows reference missing menus");
            (
                ComponentHealth::warning(self.name()),
                format!("{} orphaned permission row(s)", orphans.len()),
            )
        } else {
            (
                ComponentHealth::healthy(self.name()),
                "Configuration is consistent".to_string(),
            )
        };

        health = health
            .with_message(message)
            .with_issues(hierarchy_faults.iter().map(ToString::to_string))
            .with_issues(orphans.iter().map(ToString::to_string))
            .with_metadata("roles", snapshot.role_count())
            .with_metadata("menus", snapshot.menu_count())
            .with_metadata("hierarchy_faults", hierarchy_faults.len())
            .with_metadata("orphaned_permissions", orphans.len())
            .with_metadata("loaded_at", snapshot.loaded_at());

        health.with_latency(start.elapsed())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Group Sync
// ═══════════════════════════════════════════════════════════════════════════════

pub const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_ERROR_THRESHOLD: u64 = 5;

/// Recent sync failures from the audit log.
///
/// | failures in window  | status  |
/// |---------------------|---------|
/// | 0                   | healthy |
/// | 1 ..= threshold     | warning |
/// | above threshold     | error   |
pub struct SyncHealthChecker {
    audit: SyncAuditLog,
    window: Duration,
    error_threshold: u64,
}

impl SyncHealthChecker {
    pub fn new(audit: SyncAuditLog) -> Self {
        Self {
            audit,
            window: DEFAULT_FAILURE_WINDOW,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_error_threshold(mut self, threshold: u64) -> Self {
        self.error_threshold = threshold;
        self
    }

    fn status_for(&self, failures: u64) -> HealthStatus {
        match failures {
            0 => HealthStatus::Healthy,
            n if n <= self.error_threshold => HealthStatus::Warning,
            _ => HealthStatus::Error,
        }
    }
}

impl HealthChecker for SyncHealthChecker {
    fn name(&self) -> &str {
        "group_sync"
    }

    fn check(&self) -> ComponentHealth {
        let start = Instant::now();
        let window_secs = self.window.as_secs();

        match self.audit.recent_failures(self.window) {
            Ok(failures) => {
                let health = match self.status_for(failures) {
                    HealthStatus::Healthy => ComponentHealth::healthy(self.name()),
                    HealthStatus::Warning => ComponentHealth::warning(self.name()),
                    HealthStatus::Error => ComponentHealth::error(self.name()),
                };
                health
                    .with_message(format!("{failures} failed sync attempt(s) in the last {window_secs}s"))
                    .with_metadata("failures", failures)
                    .with_metadata("window_secs", window_secs)
                    .with_metadata("error_threshold", self.error_threshold)
                    .with_metadata("sink", self.audit.sink_name())
                    .with_latency(start.elapsed())
            }
            Err(e) => {
                error!(error = %e, "Audit log query failed during health check");
                ComponentHealth::error(self.name())
                    .with_message("Audit log unavailable")
                    .with_issue(e.to_string())
                    .with_latency(start.elapsed())
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditError, AuditFilter, AuditSink, SyncAction, SyncLogEntry};
    use crate::cache::InvalidationBus;
    use crate::rbac::{
        ConfigSnapshot, GroupId, MenuModule, Role, RoleId, RoleMenuPermission, SnapshotDocument,
        DEFAULT_MAX_DEPTH,
    };

    fn store(snapshot: ConfigSnapshot) -> Arc<SnapshotStore> {
        Arc::new(SnapshotStore::new(snapshot, Arc::new(InvalidationBus::new())))
    }

    fn record_failures(audit: &SyncAuditLog, n: usize) {
        let role = RoleId::new("admin");
        for i in 0..n {
            audit
                .append(SyncLogEntry::failure(
                    SyncAction::AddMembership,
                    &role,
                    &GroupId::new(format!("G{i}")),
                    "denied",
                ))
                .unwrap();
        }
    }

    #[test]
    fn test_consistent_config_is_healthy() {
        let snapshot = ConfigSnapshot::builder()
            .role(Role::new("staff"))
            .menu(MenuModule::root("learning"))
            .grant("staff", "learning")
            .build()
            .unwrap();
        let health = PermissionConfigChecker::new(store(snapshot), DEFAULT_MAX_DEPTH).check();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.metadata["roles"], 1);
    }

    #[test]
    fn test_orphaned_permission_is_warning() {
        let snapshot = ConfigSnapshot::builder()
            .role(Role::new("staff"))
            .grant("staff", "retired-menu")
            .build()
            .unwrap();
        let health = PermissionConfigChecker::new(store(snapshot), DEFAULT_MAX_DEPTH).check();
        assert_eq!(health.status, HealthStatus::Warning);
        assert_eq!(health.issues.len(), 1);
    }

    #[test]
    fn test_hierarchy_cycle_is_error() {
        let document = SnapshotDocument {
            roles: vec![
                Role::new("a").with_parent("b"),
                Role::new("b").with_parent("a"),
            ],
            permissions: vec![RoleMenuPermission::grant("a", "missing")],
            ..Default::default()
        };
        let snapshot = ConfigSnapshot::from_document(document).unwrap();
        let health = PermissionConfigChecker::new(store(snapshot), DEFAULT_MAX_DEPTH).check();
        assert_eq!(health.status, HealthStatus::Error);
        assert!(health.issues.len() >= 2);
    }

    #[test]
    fn test_sync_thresholds() {
        let audit = SyncAuditLog::in_memory();
        let checker = SyncHealthChecker::new(audit.clone()).with_error_threshold(2);
        assert_eq!(checker.check().status, HealthStatus::Healthy);

        record_failures(&audit, 2);
        assert_eq!(checker.check().status, HealthStatus::Warning);

        record_failures(&audit, 1);
        let health = checker.check();
        assert_eq!(health.status, HealthStatus::Error);
        assert_eq!(health.metadata["failures"], 3);
    }

    #[test]
    fn test_successes_do_not_count() {
        let audit = SyncAuditLog::in_memory();
        audit
            .append(SyncLogEntry::success(
                SyncAction::AddMembership,
                &"admin".into(),
                &"G1".into(),
                "added",
            ))
            .unwrap();
        assert!(SyncHealthChecker::new(audit).check().is_healthy());
    }

    struct UnreadableSink;

    impl AuditSink for UnreadableSink {
        fn append(&self, _entry: &SyncLogEntry) -> Result<(), AuditError> {
            Ok(())
        }

        fn query(&self, _filter: &AuditFilter) -> Result<Vec<SyncLogEntry>, AuditError> {
            Err(AuditError::QueryFailed("disk unavailable".into()))
        }

        fn name(&self) -> &'static str {
            "unreadable"
        }
    }

    #[test]
    fn test_unreadable_audit_log_is_error() {
        let checker = SyncHealthChecker::new(SyncAuditLog::new(Arc::new(UnreadableSink)));
        let health = checker.check();
        assert_eq!(health.status, HealthStatus::Error);
        assert_eq!(health.issues.len(), 1);
    }
}
