//! Immutable configuration snapshot: roles, menu modules, menu decisions and
//! role-to-group mappings.
//!
//! A snapshot is validated once at load time (uniqueness, menu grouping) and
//! then treated as atomic and read-only. Hierarchy faults (cycles, excessive
//! depth, dangling parents) are not rejected here; they surface at resolution
//! time and through the health check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::error::ConfigError;
use super::models::{
    Decision, GroupId, MenuKey, MenuLevel, MenuModule, Role, RoleGroupMapping, RoleId,
    RoleMenuPermission,
};

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors from loading or rebuilding a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse snapshot {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("No snapshot source file configured")]
    NoSource,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Document (on-disk form)
// ═══════════════════════════════════════════════════════════════════════════════

/// Serialized form of a snapshot as produced by the configuration store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub menus: Vec<MenuModule>,
    #[serde(default)]
    pub permissions: Vec<RoleMenuPermission>,
    #[serde(default)]
    pub mappings: Vec<RoleGroupMapping>,
}

impl SnapshotDocument {
    /// Parse a document, choosing JSON or TOML from the file extension.
    pub fn parse(path: &Path, content: &str) -> Result<Self, SnapshotError> {
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let parsed = if is_json {
            serde_json::from_str(content).map_err(|e| e.to_string())
        } else {
            toml::from_str(content).map_err(|e| e.to_string())
        };

        parsed.map_err(|message| SnapshotError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Snapshot
// ═══════════════════════════════════════════════════════════════════════════════

/// Validated, read-only view over the configuration.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    roles: BTreeMap<RoleId, Role>,
    menus: BTreeMap<MenuKey, MenuModule>,
    decisions: BTreeMap<RoleId, BTreeMap<MenuKey, Decision>>,
    mappings: BTreeMap<RoleId, BTreeSet<GroupId>>,
    loaded_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    /// An empty snapshot (no roles, no menus).
    pub fn empty() -> Self {
        Self {
            roles: BTreeMap::new(),
            menus: BTreeMap::new(),
            decisions: BTreeMap::new(),
            mappings: BTreeMap::new(),
            loaded_at: Utc::now(),
        }
    }

    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    /// Read and validate a snapshot file (`.json` or TOML).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document = SnapshotDocument::parse(path, &content)?;
        let snapshot = Self::from_document(document)?;
        debug!(
            path = %path.display(),
            roles = snapshot.roles.len(),
            menus = snapshot.menus.len(),
            "Loaded configuration snapshot"
        );
        Ok(snapshot)
    }

    /// Validate a document and index it.
    pub fn from_document(document: SnapshotDocument) -> Result<Self, ConfigError> {
        let mut roles = BTreeMap::new();
        for role in document.roles {
            if roles.contains_key(&role.id) {
                return Err(ConfigError::DuplicateRole(role.id));
            }
            roles.insert(role.id.clone(), role);
        }

        let mut menus = BTreeMap::new();
        for menu in document.menus {
            if menus.contains_key(&menu.key) {
                return Err(ConfigError::DuplicateMenu(menu.key));
            }
            menus.insert(menu.key.clone(), menu);
        }
        for menu in menus.values() {
            validate_grouping(menu, &menus)?;
        }

        let mut decisions: BTreeMap<RoleId, BTreeMap<MenuKey, Decision>> = BTreeMap::new();
        for perm in document.permissions {
            let per_role = decisions.entry(perm.role.clone()).or_default();
            if per_role.contains_key(&perm.menu) {
                return Err(ConfigError::DuplicatePermission {
                    role: perm.role,
                    menu: perm.menu,
                });
            }
            per_role.insert(perm.menu, perm.decision);
        }

        let mut mappings: BTreeMap<RoleId, BTreeSet<GroupId>> = BTreeMap::new();
        for mapping in document.mappings {
            mappings.entry(mapping.role).or_default().insert(mapping.group);
        }

        Ok(Self {
            roles,
            menus,
            decisions,
            mappings,
            loaded_at: Utc::now(),
        })
    }

    /// Convert back into the serialized form (used to apply incremental changes).
    pub fn to_document(&self) -> SnapshotDocument {
        SnapshotDocument {
            roles: self.roles.values().cloned().collect(),
            menus: self.menus.values().cloned().collect(),
            permissions: self.permissions().collect(),
            mappings: self
                .mappings
                .iter()
                .flat_map(|(role, groups)| {
                    groups
                        .iter()
                        .map(move |group| RoleGroupMapping::new(role.clone(), group.clone()))
                })
                .collect(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    pub fn role(&self, id: &RoleId) -> Option<&Role> {
        self.roles.get(id)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Menus
    // ─────────────────────────────────────────────────────────────────────────

    pub fn menu(&self, key: &MenuKey) -> Option<&MenuModule> {
        self.menus.get(key)
    }

    pub fn menus(&self) -> impl Iterator<Item = &MenuModule> {
        self.menus.values()
    }

    pub fn menu_count(&self) -> usize {
        self.menus.len()
    }

    /// The module serving `path`: the one whose url is the longest matching prefix.
    pub fn menu_for_route(&self, path: &str) -> Option<&MenuModule> {
        self.menus
            .values()
            .filter(|m| m.matches_route(path))
            .max_by_key(|m| m.url.as_deref().map_or(0, |u| u.trim_end_matches('/').len()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decisions
    // ─────────────────────────────────────────────────────────────────────────

    /// Explicit decisions recorded directly on `role`, ordered by menu key.
    pub fn decisions_for(&self, role: &RoleId) -> impl Iterator<Item = (&MenuKey, Decision)> {
        self.decisions
            .get(role)
            .into_iter()
            .flat_map(|per_role| per_role.iter().map(|(k, d)| (k, *d)))
    }

    /// The decision recorded on `role` for `menu` (`Unset` when absent).
    pub fn decision(&self, role: &RoleId, menu: &MenuKey) -> Decision {
        self.decisions
            .get(role)
            .and_then(|per_role| per_role.get(menu))
            .copied()
            .unwrap_or_default()
    }

    /// Every permission record in the snapshot.
    pub fn permissions(&self) -> impl Iterator<Item = RoleMenuPermission> + '_ {
        self.decisions.iter().flat_map(|(role, per_role)| {
            per_role
                .iter()
                .map(move |(menu, decision)| RoleMenuPermission::new(role.clone(), menu.clone(), *decision))
        })
    }

    /// Roles carrying any explicit record for `menu`.
    pub fn roles_deciding(&self, menu: &MenuKey) -> Vec<RoleId> {
        self.decisions
            .iter()
            .filter(|(_, per_role)| per_role.contains_key(menu))
            .map(|(role, _)| role.clone())
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Group mappings
    // ─────────────────────────────────────────────────────────────────────────

    /// Desired external groups for `role`.
    pub fn mapped_groups(&self, role: &RoleId) -> BTreeSet<GroupId> {
        self.mappings.get(role).cloned().unwrap_or_default()
    }

    /// Roles that have at least one group mapping.
    pub fn roles_with_mappings(&self) -> impl Iterator<Item = &RoleId> {
        self.mappings
            .iter()
            .filter(|(_, groups)| !groups.is_empty())
            .map(|(role, _)| role)
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Records that differ between `self` and `other`. Load time is ignored.
    pub fn diff(&self, other: &ConfigSnapshot) -> SnapshotDiff {
        let decisions = |snapshot: &ConfigSnapshot| -> BTreeMap<(RoleId, MenuKey), Decision> {
            snapshot
                .decisions
                .iter()
                .flat_map(|(role, per_role)| {
                    per_role
                        .iter()
                        .map(move |(menu, decision)| ((role.clone(), menu.clone()), *decision))
                })
                .collect()
        };

        SnapshotDiff {
            roles: changed_keys(&self.roles, &other.roles),
            menus: changed_keys(&self.menus, &other.menus),
            permissions: changed_keys(&decisions(self), &decisions(other)),
            mappings: changed_keys(&self.mappings, &other.mappings),
        }
    }
}

/// Per-record differences between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Roles added, removed or changed
    pub roles: BTreeSet<RoleId>,
    /// Menu modules added, removed or changed
    pub menus: BTreeSet<MenuKey>,
    /// (role, menu) decisions added, removed or changed
    pub permissions: BTreeSet<(RoleId, MenuKey)>,
    /// Roles whose mapped groups differ
    pub mappings: BTreeSet<RoleId>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
            && self.menus.is_empty()
            && self.permissions.is_empty()
            && self.mappings.is_empty()
    }

    /// Number of changed records that can affect permission sets.
    pub fn permission_changes(&self) -> usize {
        self.roles.len() + self.menus.len() + self.permissions.len()
    }
}

/// Keys present in only one map, or mapped to different values.
fn changed_keys<K: Ord + Clone, V: PartialEq>(a: &BTreeMap<K, V>, b: &BTreeMap<K, V>) -> BTreeSet<K> {
    let mut changed: BTreeSet<K> = a
        .iter()
        .filter(|(key, value)| b.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect();
    changed.extend(b.keys().filter(|key| !a.contains_key(*key)).cloned());
    changed
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Check that a module's `group` points at an existing module exactly one
/// level up.
fn validate_grouping(
    menu: &MenuModule,
    menus: &BTreeMap<MenuKey, MenuModule>,
) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidMenuGrouping {
        key: menu.key.clone(),
        reason,
    };

    match (menu.level.enclosing(), &menu.group) {
        (None, None) => Ok(()),
        (None, Some(group)) => Err(invalid(format!(
            "root module must not belong to a group (found {})",
            group
        ))),
        (Some(expected), None) => Err(invalid(format!(
            "{} module must name its enclosing {} module",
            menu.level, expected
        ))),
        (Some(expected), Some(group)) => match menus.get(group) {
            None => Err(invalid(format!("enclosing module {} does not exist", group))),
            Some(parent) if parent.level != expected => Err(invalid(format!(
                "enclosing module {} is {}, expected {}",
                group, parent.level, expected
            ))),
            Some(_) => Ok(()),
        },
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Fluent builder for snapshots.
///
/// ```rust,ignore
/// let snapshot = ConfigSnapshot::builder()
///     .role(Role::new("staff"))
///     .role(Role::new("teacher").with_parent("staff"))
///     .menu(MenuModule::root("word-learning"))
///     .grant("staff", "word-learning")
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    document: SnapshotDocument,
}

impl SnapshotBuilder {
    pub fn role(mut self, role: Role) -> Self {
        self.document.roles.push(role);
        self
    }

    pub fn menu(mut self, menu: MenuModule) -> Self {
        self.document.menus.push(menu);
        self
    }

    pub fn permission(mut self, permission: RoleMenuPermission) -> Self {
        self.document.permissions.push(permission);
        self
    }

    pub fn grant(self, role: impl Into<RoleId>, menu: impl Into<MenuKey>) -> Self {
        self.permission(RoleMenuPermission::grant(role, menu))
    }

    pub fn deny(self, role: impl Into<RoleId>, menu: impl Into<MenuKey>) -> Self {
        self.permission(RoleMenuPermission::deny(role, menu))
    }

    pub fn mapping(mut self, role: impl Into<RoleId>, group: impl Into<GroupId>) -> Self {
        self.document.mappings.push(RoleGroupMapping::new(role, group));
        self
    }

    pub fn build(self) -> Result<ConfigSnapshot, ConfigError> {
        ConfigSnapshot::from_document(self.document)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
