//! Role-to-group reconciliation.

use chrono::Utc;
use dashmap::DashMap;
use metrics::{counter, histogram};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::membership::{GroupMembershipStore, MembershipError};
use super::report::{SyncOperationError, SyncOperationOutcome, SyncReport};
use super::SyncConfig;
use crate::audit::{SyncAction, SyncAuditLog, SyncLogEntry};
use crate::rbac::{GroupId, RoleId, SnapshotStore};

/// Reconciles each role's external group memberships with its mappings.
///
/// Syncs of the same role are serialized; distinct roles may run in parallel.
/// A started sync always runs to completion.
pub struct GroupSyncEngine {
    store: Arc<SnapshotStore>,
    membership: Arc<dyn GroupMembershipStore>,
    audit: SyncAuditLog,
    config: SyncConfig,
    role_locks: DashMap<RoleId, Arc<Mutex<()>>>,
}

impl GroupSyncEngine {
    pub fn new(
        store: Arc<SnapshotStore>,
        membership: Arc<dyn GroupMembershipStore>,
        audit: SyncAuditLog,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            membership,
            audit,
            config,
            role_locks: DashMap::new(),
        }
    }

    pub fn audit_log(&self) -> &SyncAuditLog {
        &self.audit
    }

    /// Bring `role`'s memberships in line with its mapped groups.
    ///
    /// Additions are applied before removals. Every attempt is audited before
    /// this returns. A converged role yields an empty report.
    #[instrument(skip_all, fields(role = %role))]
    pub fn sync_role(&self, role: &RoleId) -> SyncReport {
        let lock = self.role_lock(role);
        let _guard = lock.lock();

        let start = Instant::now();
        let mut report = SyncReport::new(role.clone());
        let desired = self.store.current().mapped_groups(role);

        let actual = match self.membership.get_membership(role) {
            Ok(actual) => actual,
            Err(e) => {
                warn!(error = %e, "Failed to read current memberships");
                counter!("menugate_sync_operations_total", "action" => SyncAction::ReadMembership.as_str(), "status" => "failed")
                    .increment(1);
                self.record(&mut report, SyncLogEntry::read_failure(role, e.to_string()));
                report.read_error = Some(SyncOperationError {
                    action: SyncAction::ReadMembership,
                    group: None,
                    error: e,
                });
                report.finished_at = Utc::now();
                return report;
            }
        };

        let additions: BTreeSet<&GroupId> = desired.difference(&actual).collect();
        let removals: BTreeSet<&GroupId> = actual.difference(&desired).collect();

        let operations = additions
            .into_iter()
            .map(|group| (group, SyncAction::AddMembership))
            .chain(removals.into_iter().map(|group| (group, SyncAction::RemoveMembership)));

        // Each outcome is audited exactly once, as soon as it is known.
        for (group, action) in operations {
            let outcome = self.attempt(role, group, action);
            self.record(&mut report, audit_entry(role, &outcome));
            report.operations.push(outcome);
        }

        report.finished_at = Utc::now();
        histogram!("menugate_sync_duration_seconds").record(start.elapsed().as_secs_f64());

        if report.is_converged() {
            debug!("Role already converged");
        } else {
            info!(
                added = report.added().count(),
                removed = report.removed().count(),
                failed = report.failure_count(),
                "Role sync finished"
            );
        }
        report
    }

    /// Sync every role that has mappings or existing memberships.
    ///
    /// Roles are spread over `parallelism` worker threads. Reports come back
    /// in role order.
    pub fn sync_all(&self) -> Vec<SyncReport> {
        let snapshot = self.store.current();
        let roles: BTreeSet<RoleId> = snapshot
            .roles_with_mappings()
            .cloned()
            .chain(self.membership.known_roles())
            .collect();
        let roles: Vec<RoleId> = roles.into_iter().collect();
        if roles.is_empty() {
            return Vec::new();
        }

        let workers = self.config.parallelism.max(1).min(roles.len());
        let chunk_size = roles.len().div_ceil(workers);
        info!(roles = roles.len(), workers, "Starting full group sync");

        let mut reports: Vec<SyncReport> = std::thread::scope(|scope| {
            let handles: Vec<_> = roles
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || chunk.iter().map(|role| self.sync_role(role)).collect::<Vec<_>>())
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(reports) => reports,
                    Err(_) => {
                        error!("Sync worker panicked");
                        Vec::new()
                    }
                })
                .collect()
        });

        reports.sort_by(|a, b| a.role.cmp(&b.role));
        reports
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn role_lock(&self, role: &RoleId) -> Arc<Mutex<()>> {
        self.role_locks
            .entry(role.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run one operation, retrying transient failures.
    fn attempt(&self, role: &RoleId, group: &GroupId, action: SyncAction) -> SyncOperationOutcome {
        let max_attempts = self.config.transient_retries.saturating_add(1);
        let mut attempts = 0;

        let result = loop {
            attempts += 1;
            let result = match action {
                SyncAction::AddMembership => self.membership.add_membership(role, group),
                _ => self.membership.remove_membership(role, group),
            };
            match result {
                Err(MembershipError::Transient(ref message)) if attempts < max_attempts => {
                    debug!(group = %group, action = %action, attempts, error = %message, "Retrying transient failure");
                }
                other => break other,
            }
        };

        let status = if result.is_ok() { "ok" } else { "failed" };
        counter!("menugate_sync_operations_total", "action" => action.as_str(), "status" => status)
            .increment(1);

        SyncOperationOutcome {
            action,
            group: group.clone(),
            attempts,
            error: result.err().map(|error| {
                warn!(group = %group, action = %action, error = %error, "Membership operation failed");
                SyncOperationError {
                    action,
                    group: Some(group.clone()),
                    error,
                }
            }),
        }
    }

    /// Append to the audit log. A write failure goes to the diagnostic channel
    /// and is counted on the report; nothing is rolled back.
    fn record(&self, report: &mut SyncReport, entry: SyncLogEntry) {
        if let Err(e) = self.audit.append(entry.clone()) {
            report.audit_failures += 1;
            counter!("menugate_audit_write_failures_total").increment(1);
            error!(
                target: "menugate::audit",
                entry_id = %entry.id,
                role = %entry.role,
                action = %entry.action,
                target_id = %entry.target_id,
                success = entry.success,
                error = %e,
                "Failed to append sync audit entry"
            );
        }
    }
}

fn audit_entry(role: &RoleId, outcome: &SyncOperationOutcome) -> SyncLogEntry {
    match &outcome.error {
        None => {
            let message = match outcome.action {
                SyncAction::AddMembership => "membership added",
                _ => "membership removed",
            };
            SyncLogEntry::success(outcome.action, role, &outcome.group, message)
        }
        Some(e) => SyncLogEntry::failure(outcome.action, role, &outcome.group, e.error.to_string()),
    }
}

impl std::fmt::Debug for GroupSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupSyncEngine")
            .field("config", &self.config)
            .field("audit", &self.audit)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
