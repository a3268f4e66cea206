//! Authorization data models: roles, menu modules, tri-state decisions and
//! role-to-group mappings.

use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed role identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RoleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RoleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique key of a menu module (e.g. `word-learning`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MenuKey(pub String);

impl MenuKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MenuKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MenuKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MenuKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a group in the external group/permission store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for GroupId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// A role in the hierarchy. The parent is stored as an identifier, never as a
/// live reference, so the snapshot is an arena keyed by [`RoleId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role identifier.
    pub id: RoleId,
    /// Parent role this role inherits menu decisions from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<RoleId>,
    /// Inactive roles resolve to no permissions.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Role {
    /// Create an active root role.
    pub fn new(id: impl Into<RoleId>) -> Self {
        let id = id.into();
        Self {
            name: id.as_str().to_string(),
            id,
            parent: None,
            active: true,
            description: String::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<RoleId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Menu modules
// ═══════════════════════════════════════════════════════════════════════════════

/// Menu level. Levels form a strict containment order: `root ⊃ level1 ⊃ level2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuLevel {
    Root,
    Level1,
    Level2,
}

impl MenuLevel {
    /// The level a module's `group` must point at, if any.
    pub fn enclosing(&self) -> Option<MenuLevel> {
        match self {
            Self::Root => None,
            Self::Level1 => Some(Self::Root),
            Self::Level2 => Some(Self::Level1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Level1 => "level1",
            Self::Level2 => "level2",
        }
    }
}

impl fmt::Display for MenuLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, leveled unit of navigable functionality subject to access control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuModule {
    pub key: MenuKey,
    pub level: MenuLevel,
    /// Key of the enclosing module one level up. Absent for root modules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<MenuKey>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Route prefix served by this module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl MenuModule {
    fn new(key: impl Into<MenuKey>, level: MenuLevel, group: Option<MenuKey>) -> Self {
        let key = key.into();
        Self {
            name: key.as_str().to_string(),
            key,
            level,
            group,
            icon: None,
            url: None,
            sort_order: 0,
            active: true,
        }
    }

    pub fn root(key: impl Into<MenuKey>) -> Self {
        Self::new(key, MenuLevel::Root, None)
    }

    pub fn level1(key: impl Into<MenuKey>, group: impl Into<MenuKey>) -> Self {
        Self::new(key, MenuLevel::Level1, Some(group.into()))
    }

    pub fn level2(key: impl Into<MenuKey>, group: impl Into<MenuKey>) -> Self {
        Self::new(key, MenuLevel::Level2, Some(group.into()))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether `path` falls under this module's route prefix.
    ///
    /// `/reports` matches `/reports` and `/reports/daily` but not `/reportsx`.
    pub fn matches_route(&self, path: &str) -> bool {
        let Some(url) = self.url.as_deref() else {
            return false;
        };
        let prefix = url.trim_end_matches('/');
        if prefix.is_empty() {
            return path.starts_with('/');
        }
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
            None => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decisions and mappings
// ═══════════════════════════════════════════════════════════════════════════════

/// Tri-state menu decision recorded for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Grant,
    Deny,
    /// No explicit decision at this role; inherited value stays in effect.
    #[default]
    Unset,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Deny => "deny",
            Self::Unset => "unset",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (role, menu) decision record. At most one per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMenuPermission {
    pub role: RoleId,
    pub menu: MenuKey,
    #[serde(default)]
    pub decision: Decision,
}

impl RoleMenuPermission {
    pub fn new(role: impl Into<RoleId>, menu: impl Into<MenuKey>, decision: Decision) -> Self {
        Self {
            role: role.into(),
            menu: menu.into(),
            decision,
        }
    }

    pub fn grant(role: impl Into<RoleId>, menu: impl Into<MenuKey>) -> Self {
        Self::new(role, menu, Decision::Grant)
    }

    pub fn deny(role: impl Into<RoleId>, menu: impl Into<MenuKey>) -> Self {
        Self::new(role, menu, Decision::Deny)
    }
}

/// External group membership implied by holding a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleGroupMapping {
    pub role: RoleId,
    pub group: GroupId,
}

impl RoleGroupMapping {
    pub fn new(role: impl Into<RoleId>, group: impl Into<GroupId>) -> Self {
        Self {
            role: role.into(),
            group: group.into(),
        }
    }
}

fn default_true() -> bool {
    true
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_level_enclosing() {
        assert_eq!(MenuLevel::Root.enclosing(), None);
        assert_eq!(MenuLevel::Level1.enclosing(), Some(MenuLevel::Root));
        assert_eq!(MenuLevel::Level2.enclosing(), Some(MenuLevel::Level1));
    }

    #[test]
    fn test_route_matching_respects_segment_boundary() {
        let module = MenuModule::level1("reports", "admin").with_url("/admin/reports/");
        assert!(module.matches_route("/admin/reports"));
        assert!(module.matches_route("/admin/reports/daily"));
        assert!(module.matches_route("/admin/reports?page=2"));
        assert!(!module.matches_route("/admin/reportsx"));
        assert!(!module.matches_route("/admin"));
    }

    #[test]
    fn test_module_without_url_matches_nothing() {
        let module = MenuModule::root("learning");
        assert!(!module.matches_route("/learning"));
    }

    #[test]
    fn test_role_defaults_from_toml() {
        let role: Role = toml::from_str(r#"id = "teacher"
parent = "staff""#)
        .unwrap();
        assert!(role.active);
        assert_eq!(role.parent, Some(RoleId::new("staff")));
    }

    #[test]
    fn test_decision_serde_lowercase() {
        let perm: RoleMenuPermission =
            serde_json::from_str(r#"{"role":"staff","menu":"word-learning","decision":"deny"}"#)
                .unwrap();
        assert_eq!(perm.decision, Decision::Deny);

        let unset: RoleMenuPermission =
            serde_json::from_str(r#"{"role":"staff","menu":"word-learning"}"#).unwrap();
        assert_eq!(unset.decision, Decision::Unset);
    }
}
