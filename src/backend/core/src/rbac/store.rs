//! Holder of the current configuration snapshot.
//!
//! Readers take a cheap `Arc` clone of the current snapshot and resolve against
//! it without further locking. Writers are serialized; each write builds a new
//! validated snapshot, swaps it in and publishes the matching invalidation
//! event before returning.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::ConfigError;
use super::models::{GroupId, MenuKey, MenuModule, Role, RoleGroupMapping, RoleId, RoleMenuPermission};
use super::snapshot::{ConfigSnapshot, SnapshotError};
use crate::cache::{InvalidationBus, InvalidationEvent, InvalidationScope};

/// An incremental configuration write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ConfigChange {
    UpsertRole { role: Role },
    /// Removes the role with its permission records and group mappings.
    RemoveRole { role: RoleId },
    UpsertMenu { menu: MenuModule },
    /// Permission records pointing at the menu are kept and become orphaned.
    RemoveMenu { menu: MenuKey },
    SetPermission { permission: RoleMenuPermission },
    SetMappings { role: RoleId, groups: BTreeSet<GroupId> },
}

impl ConfigChange {
    /// The invalidation event this change publishes, if it can affect
    /// permission sets.
    pub fn invalidation_event(&self) -> Option<InvalidationEvent> {
        match self {
            Self::UpsertRole { role } => Some(InvalidationEvent::role(role.id.clone())),
            Self::RemoveRole { role } => Some(InvalidationEvent::role(role.clone())),
            Self::UpsertMenu { menu } => Some(InvalidationEvent::menu(menu.key.clone())),
            Self::RemoveMenu { menu } => Some(InvalidationEvent::menu(menu.clone())),
            Self::SetPermission { permission } => Some(InvalidationEvent::permission(
                permission.role.clone(),
                permission.menu.clone(),
            )),
            Self::SetMappings { .. } => None,
        }
    }

    /// The role whose group mappings this change rewrites.
    pub fn mapping_role(&self) -> Option<&RoleId> {
        match self {
            Self::SetMappings { role, .. } | Self::RemoveRole { role } => Some(role),
            _ => None,
        }
    }
}

/// Result of applying a [`ConfigChange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub event: Option<InvalidationEvent>,
    /// Cache entries dropped by subscribers.
    pub invalidated: u64,
}

/// Changed records above which a replacement invalidates every cached set.
pub const FULL_INVALIDATION_THRESHOLD: usize = 64;

/// Result of [`SnapshotStore::replace`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replaced {
    /// False when the new snapshot matched the current one
    pub changed: bool,
    /// Cache entries dropped by subscribers
    pub invalidated: u64,
    /// Roles whose group mappings differ, removed roles included
    pub remapped: BTreeSet<RoleId>,
}

/// Atomically swappable configuration snapshot.
pub struct SnapshotStore {
    current: RwLock<Arc<ConfigSnapshot>>,
    write_lock: Mutex<()>,
    bus: Arc<InvalidationBus>,
    source: Option<PathBuf>,
}

impl SnapshotStore {
    pub fn new(snapshot: ConfigSnapshot, bus: Arc<InvalidationBus>) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            write_lock: Mutex::new(()),
            bus,
            source: None,
        }
    }

    /// Load the initial snapshot from `path` and remember it for [`reload`](Self::reload).
    pub fn from_file(path: impl AsRef<Path>, bus: Arc<InvalidationBus>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let snapshot = ConfigSnapshot::load(path)?;
        Ok(Self {
            source: Some(path.to_path_buf()),
            ..Self::new(snapshot, bus)
        })
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn bus(&self) -> &Arc<InvalidationBus> {
        &self.bus
    }

    /// The snapshot in effect right now.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.current.read().clone()
    }

    /// Swap in a whole new snapshot.
    ///
    /// Nothing is swapped or published when the new snapshot holds the same
    /// records as the current one. Otherwise each changed role, menu and
    /// permission record is published as its own event, collapsing to
    /// [`InvalidationEvent::All`] past [`FULL_INVALIDATION_THRESHOLD`] changes.
    pub fn replace(&self, snapshot: ConfigSnapshot) -> Replaced {
        let _guard = self.write_lock.lock();
        let before = self.current();
        let diff = before.diff(&snapshot);
        if diff.is_empty() {
            debug!("Configuration snapshot unchanged");
            return Replaced::default();
        }

        let after = Arc::new(snapshot);
        *self.current.write() = after.clone();

        let scope = InvalidationScope::new(&before, &after);
        let invalidated = if diff.permission_changes() > FULL_INVALIDATION_THRESHOLD {
            self.bus.publish(InvalidationEvent::All, scope)
        } else {
            let roles = diff.roles.iter().cloned().map(InvalidationEvent::role);
            let menus = diff.menus.iter().cloned().map(InvalidationEvent::menu);
            let permissions = diff
                .permissions
                .iter()
                .map(|(role, menu)| InvalidationEvent::permission(role.clone(), menu.clone()));
            roles
                .chain(menus)
                .chain(permissions)
                .map(|event| self.bus.publish(event, scope))
                .sum::<u64>()
        };

        info!(
            roles = after.role_count(),
            menus = after.menu_count(),
            changed_roles = diff.roles.len(),
            changed_menus = diff.menus.len(),
            changed_permissions = diff.permissions.len(),
            remapped = diff.mappings.len(),
            invalidated,
            "Configuration snapshot replaced"
        );

        Replaced {
            changed: true,
            invalidated,
            remapped: diff.mappings,
        }
    }

    /// Re-read the source file. A failed reload keeps the current snapshot.
    pub fn reload(&self) -> Result<Replaced, SnapshotError> {
        let path = self.source.as_ref().ok_or(SnapshotError::NoSource)?;
        match ConfigSnapshot::load(path) {
            Ok(snapshot) => Ok(self.replace(snapshot)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Snapshot reload failed, keeping current snapshot");
                Err(e)
            }
        }
    }

    /// Apply an incremental change, then publish its invalidation event.
    ///
    /// The change is rejected, and the current snapshot kept, if the result
    /// fails load-time validation.
    pub fn apply(&self, change: ConfigChange) -> Result<AppliedChange, ConfigError> {
        let _guard = self.write_lock.lock();
        let before = self.current();
        let event = change.invalidation_event();

        let mut document = before.to_document();
        match change {
            ConfigChange::UpsertRole { role } => {
                document.roles.retain(|r| r.id != role.id);
                document.roles.push(role);
            }
            ConfigChange::RemoveRole { role } => {
                document.roles.retain(|r| r.id != role);
                document.permissions.retain(|p| p.role != role);
                document.mappings.retain(|m| m.role != role);
            }
            ConfigChange::UpsertMenu { menu } => {
                document.menus.retain(|m| m.key != menu.key);
                document.menus.push(menu);
            }
            ConfigChange::RemoveMenu { menu } => {
                document.menus.retain(|m| m.key != menu);
            }
            ConfigChange::SetPermission { permission } => {
                document
                    .permissions
                    .retain(|p| !(p.role == permission.role && p.menu == permission.menu));
                document.permissions.push(permission);
            }
            ConfigChange::SetMappings { role, groups } => {
                document.mappings.retain(|m| m.role != role);
                document.mappings.extend(
                    groups
                        .into_iter()
                        .map(|group| RoleGroupMapping::new(role.clone(), group)),
                );
            }
        }

        let after = Arc::new(ConfigSnapshot::from_document(document)?);
        *self.current.write() = after.clone();

        let invalidated = match &event {
            Some(event) => self
                .bus
                .publish(event.clone(), InvalidationScope::new(&before, &after)),
            None => 0,
        };

        Ok(AppliedChange { event, invalidated })
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("source", &self.source)
            .field("roles", &self.current.read().role_count())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::Decision;

    fn store() -> SnapshotStore {
        let snapshot = ConfigSnapshot::builder()
            .role(Role::new("staff"))
            .role(Role::new("teacher").with_parent("staff"))
            .menu(MenuModule::root("learning"))
            .menu(MenuModule::level1("vocabulary", "learning"))
            .grant("staff", "learning")
            .mapping("staff", "G1")
            .build()
            .unwrap();
        SnapshotStore::new(snapshot, Arc::new(InvalidationBus::new()))
    }

    #[test]
    fn test_set_permission_overwrites_record() {
        let store = store();
        let applied = store
            .apply(ConfigChange::SetPermission {
                permission: RoleMenuPermission::deny("staff", "learning"),
            })
            .unwrap();
        assert_eq!(applied.event, Some(InvalidationEvent::permission("staff", "learning")));
        assert_eq!(
            store.current().decision(&"staff".into(), &"learning".into()),
            Decision::Deny
        );
    }

    #[test]
    fn test_invalid_change_keeps_snapshot() {
        let store = store();
        let err = store
            .apply(ConfigChange::RemoveMenu { menu: "learning".into() })
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMenuGrouping { .. }));
        assert!(store.current().menu(&"learning".into()).is_some());
    }

    #[test]
    fn test_remove_role_drops_its_records() {
        let store = store();
        store
            .apply(ConfigChange::RemoveRole { role: "staff".into() })
            .unwrap();
        let current = store.current();
        assert!(current.role(&"staff".into()).is_none());
        assert_eq!(current.decisions_for(&"staff".into()).count(), 0);
        assert!(current.mapped_groups(&"staff".into()).is_empty());
    }

    #[test]
    fn test_set_mappings_publishes_nothing() {
        let store = store();
        let mut rx = store.bus().subscribe();
        let applied = store
            .apply(ConfigChange::SetMappings {
                role: "teacher".into(),
                groups: [GroupId::new("G2")].into_iter().collect(),
            })
            .unwrap();
        assert!(applied.event.is_none());
        assert!(rx.try_recv().is_err());
        assert_eq!(store.current().mapped_groups(&"teacher".into()).len(), 1);
    }

    #[test]
    fn test_replace_publishes_per_record_events() {
        let store = store();
        let mut rx = store.bus().subscribe();
        let next = ConfigSnapshot::builder()
            .role(Role::new("staff"))
            .role(Role::new("teacher").with_parent("staff"))
            .menu(MenuModule::root("learning"))
            .menu(MenuModule::level1("vocabulary", "learning"))
            .grant("staff", "learning")
            .grant("teacher", "vocabulary")
            .mapping("staff", "G1")
            .build()
            .unwrap();

        let replaced = store.replace(next);
        assert!(replaced.changed);
        assert!(replaced.remapped.is_empty());
        assert_eq!(
            rx.try_recv().unwrap(),
            InvalidationEvent::permission("teacher", "vocabulary")
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_replace_with_identical_snapshot_is_a_no_op() {
        let store = store();
        let mut rx = store.bus().subscribe();
        let loaded_at = store.current().loaded_at();

        let same = ConfigSnapshot::from_document(store.current().to_document()).unwrap();
        let replaced = store.replace(same);

        assert_eq!(replaced, Replaced::default());
        assert!(rx.try_recv().is_err());
        assert_eq!(store.current().loaded_at(), loaded_at);
    }

    #[test]
    fn test_replace_reports_remapped_roles() {
        let store = store();
        let replaced = store.replace(ConfigSnapshot::empty());
        assert!(replaced.changed);
        assert_eq!(replaced.remapped, BTreeSet::from([RoleId::new("staff")]));
        assert_eq!(store.current().role_count(), 0);
    }

    #[test]
    fn test_large_replacement_publishes_all() {
        let store = store();
        let mut rx = store.bus().subscribe();
        let mut builder = ConfigSnapshot::builder();
        for i in 0..=FULL_INVALIDATION_THRESHOLD {
            builder = builder.role(Role::new(format!("role-{}", i)));
        }
        store.replace(builder.build().unwrap());
        assert_eq!(rx.try_recv().unwrap(), InvalidationEvent::All);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reload_without_source_fails() {
        let store = store();
        assert!(matches!(store.reload(), Err(SnapshotError::NoSource)));
    }

    #[test]
    fn test_reload_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.toml");
        std::fs::write(&path, "[[roles]]\nid = \"staff\"\n").unwrap();

        let store = SnapshotStore::from_file(&path, Arc::new(InvalidationBus::new())).unwrap();
        assert_eq!(store.current().role_count(), 1);

        std::fs::write(&path, "[[roles]]\nid = \"staff\"\n\n[[roles]]\nid = \"admin\"\n").unwrap();
        assert!(store.reload().unwrap().changed);
        assert_eq!(store.current().role_count(), 2);
        assert!(!store.reload().unwrap().changed);

        std::fs::write(&path, "not = [valid").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.current().role_count(), 2);
    }
}
