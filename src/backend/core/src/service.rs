//! Service facade wiring the components together.
//!
//! ```text
//! SnapshotStore ──publish──▶ InvalidationBus ──▶ PermissionCache
//!       │                                            │
//!       ├──────────────▶ AuthorizationGate ◀─────────┘
//!       │
//!       └──────────────▶ GroupSyncEngine ──▶ SyncAuditLog ──▶ HealthService
//! ```

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::audit::{JsonLinesAuditSink, SyncAuditLog};
use crate::cache::{InvalidationBus, PermissionCache};
use crate::config::Config;
use crate::error::Result;
use crate::health::{HealthService, PermissionConfigChecker, SyncHealthChecker};
use crate::rbac::{
    AppliedChange, AuthorizationGate, ConfigChange, ConfigSnapshot, Replaced, RoleId, SnapshotStore,
};
use crate::sync::{GroupMembershipStore, GroupSyncEngine, SyncReport};

/// Result of [`MenugateService::apply_change`].
#[derive(Debug, Clone, Serialize)]
pub struct ChangeOutcome {
    /// Cache entries dropped by the change
    pub invalidated: u64,
    /// Present when the change edited a role's group mappings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncReport>,
}

/// Result of [`MenugateService::reload_snapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct ReloadOutcome {
    /// False when the file matched the snapshot already in effect
    pub changed: bool,
    pub invalidated: u64,
    /// One report per role whose group mappings changed
    pub syncs: Vec<SyncReport>,
}

/// Everything a running Menugate instance needs.
#[derive(Clone)]
pub struct MenugateService {
    store: Arc<SnapshotStore>,
    gate: Arc<AuthorizationGate>,
    sync: Arc<GroupSyncEngine>,
    audit: SyncAuditLog,
    health: Arc<HealthService>,
}

impl MenugateService {
    /// Build from configuration: load the snapshot file (if any) and open
    /// the audit file (if any).
    pub fn from_config(config: &Config, membership: Arc<dyn GroupMembershipStore>) -> Result<Self> {
        let bus = Arc::new(InvalidationBus::new());
        let store = match &config.snapshot.path {
            Some(path) => SnapshotStore::from_file(path, bus)?,
            None => SnapshotStore::new(ConfigSnapshot::empty(), bus),
        };
        let audit = match &config.audit.file {
            Some(path) => SyncAuditLog::new(Arc::new(JsonLinesAuditSink::open(path)?)),
            None => SyncAuditLog::in_memory(),
        };
        Ok(Self::new(config, store, membership, audit))
    }

    /// Assemble around an existing store and audit log.
    pub fn new(
        config: &Config,
        store: SnapshotStore,
        membership: Arc<dyn GroupMembershipStore>,
        audit: SyncAuditLog,
    ) -> Self {
        let max_depth = config.hierarchy.max_depth;
        let store = Arc::new(store);
        let cache = Arc::new(PermissionCache::new(config.cache.clone()));
        let gate = Arc::new(AuthorizationGate::new(store.clone(), cache, max_depth));
        let sync = Arc::new(GroupSyncEngine::new(
            store.clone(),
            membership,
            audit.clone(),
            config.sync.clone(),
        ));

        let health = HealthService::new(config.health.clone())
            .with_checker(Arc::new(PermissionConfigChecker::new(store.clone(), max_depth)))
            .with_checker(Arc::new(
                SyncHealthChecker::new(audit.clone())
                    .with_window(config.health.failure_window)
                    .with_error_threshold(config.health.error_threshold),
            ));

        let snapshot = store.current();
        info!(
            roles = snapshot.role_count(),
            menus = snapshot.menu_count(),
            audit_sink = audit.sink_name(),
            max_depth,
            "Menugate service assembled"
        );

        Self {
            store,
            gate,
            sync,
            audit,
            health: Arc::new(health),
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn gate(&self) -> &Arc<AuthorizationGate> {
        &self.gate
    }

    pub fn sync_engine(&self) -> &Arc<GroupSyncEngine> {
        &self.sync
    }

    pub fn audit(&self) -> &SyncAuditLog {
        &self.audit
    }

    pub fn health(&self) -> &Arc<HealthService> {
        &self.health
    }

    /// Apply a configuration change. A mapping change is followed by a sync
    /// of the role it touched.
    pub fn apply_change(&self, change: ConfigChange) -> Result<ChangeOutcome> {
        let sync_role = change.mapping_role().cloned();
        let AppliedChange { invalidated, .. } = self.store.apply(change)?;
        let sync = sync_role.map(|role| self.sync.sync_role(&role));
        Ok(ChangeOutcome { invalidated, sync })
    }

    /// Re-read the snapshot file. Every role whose group mappings changed,
    /// removed roles included, is synced before returning.
    pub fn reload_snapshot(&self) -> Result<ReloadOutcome> {
        let Replaced {
            changed,
            invalidated,
            remapped,
        } = self.store.reload()?;
        let syncs: Vec<SyncReport> = remapped.iter().map(|role| self.sync.sync_role(role)).collect();
        if !syncs.is_empty() {
            info!(roles = syncs.len(), "Synced roles with changed group mappings");
        }
        Ok(ReloadOutcome {
            changed,
            invalidated,
            syncs,
        })
    }

    pub fn sync_role(&self, role: &RoleId) -> SyncReport {
        self.sync.sync_role(role)
    }

    pub fn sync_all(&self) -> Vec<SyncReport> {
        self.sync.sync_all()
    }
}

impl std::fmt::Debug for MenugateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenugateService")
            .field("store", &self.store)
            .field("audit", &self.audit)
            .field("health", &self.health)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthStatus;
    use crate::rbac::{GroupId, MenuKey, MenuModule, Role, RoleMenuPermission};
    use crate::sync::InMemoryMembershipStore;
    use std::collections::BTreeSet;

    fn service(membership: Arc<InMemoryMembershipStore>) -> MenugateService {
        let snapshot = ConfigSnapshot::builder()
            .role(Role::new("staff"))
            .role(Role::new("teacher").with_parent("staff"))
            .menu(MenuModule::root("learning"))
            .menu(MenuModule::level1("word-learning", "learning"))
            .grant("staff", "learning")
            .grant("staff", "word-learning")
            .build()
            .unwrap();
        let store = SnapshotStore::new(snapshot, Arc::new(InvalidationBus::new()));
        MenugateService::new(&Config::default(), store, membership, SyncAuditLog::in_memory())
    }

    #[test]
    fn test_permission_change_reaches_gate() {
        let service = service(Arc::new(InMemoryMembershipStore::new()));
        let teacher = RoleId::new("teacher");
        let menu = MenuKey::new("word-learning");
        assert!(service.gate().is_authorized(&teacher, &menu).unwrap());

        let outcome = service
            .apply_change(ConfigChange::SetPermission {
                permission: RoleMenuPermission::deny("teacher", "word-learning"),
            })
            .unwrap();
        assert!(outcome.sync.is_none());
        assert!(!service.gate().is_authorized(&teacher, &menu).unwrap());
    }

    #[test]
    fn test_mapping_change_triggers_sync() {
        let membership = Arc::new(InMemoryMembershipStore::new());
        let service = service(membership.clone());

        let groups: BTreeSet<GroupId> = ["G1", "G2"].into_iter().map(GroupId::new).collect();
        let outcome = service
            .apply_change(ConfigChange::SetMappings {
                role: RoleId::new("teacher"),
                groups: groups.clone(),
            })
            .unwrap();

        let report = outcome.sync.unwrap();
        assert_eq!(report.added().count(), 2);
        assert_eq!(membership.groups_of(&RoleId::new("teacher")), groups);
    }

    #[test]
    fn test_health_is_wired() {
        let service = service(Arc::new(InMemoryMembershipStore::new()));
        let report = service.health().check_health();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.components.len(), 2);
    }

    #[test]
    fn test_reload_without_source_fails() {
        let service = service(Arc::new(InMemoryMembershipStore::new()));
        assert!(service.reload_snapshot().is_err());
    }
}
