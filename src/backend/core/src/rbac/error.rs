//! Resolution-path errors.
//!
//! [`ConfigError`] covers configuration faults: they are fatal to the resolution
//! that hit them and are surfaced through the health check. [`ResolveError`]
//! adds the per-role conditions callers map onto "no permissions".

use thiserror::Error;

use super::models::{MenuKey, RoleId};

/// Configuration faults in the role/menu snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Role hierarchy cycle detected: {}", join_chain(.chain))]
    CycleDetected { chain: Vec<RoleId> },

    #[error("Role hierarchy of {role} exceeds maximum depth {max_depth}")]
    DepthExceeded { role: RoleId, max_depth: usize },

    #[error("Role {role} references missing parent role {parent}")]
    DanglingParent { role: RoleId, parent: RoleId },

    #[error("Permission for role {role} references missing menu module {menu}")]
    OrphanedPermission { role: RoleId, menu: MenuKey },

    #[error("Menu module {key} violates grouping convention: {reason}")]
    InvalidMenuGrouping { key: MenuKey, reason: String },

    #[error("Duplicate role: {0}")]
    DuplicateRole(RoleId),

    #[error("Duplicate menu module: {0}")]
    DuplicateMenu(MenuKey),

    #[error("Duplicate permission for role {role} on menu {menu}")]
    DuplicatePermission { role: RoleId, menu: MenuKey },
}

impl ConfigError {
    /// Faults that make a role's ancestor chain unresolvable.
    pub fn is_hierarchy_fault(&self) -> bool {
        matches!(
            self,
            Self::CycleDetected { .. } | Self::DepthExceeded { .. } | Self::DanglingParent { .. }
        )
    }
}

fn join_chain(chain: &[RoleId]) -> String {
    chain
        .iter()
        .map(RoleId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors from resolving a single role.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Role not found: {0}")]
    RoleNotFound(RoleId),

    #[error("Role is inactive: {0}")]
    RoleInactive(RoleId),
}

impl ResolveError {
    /// The configuration fault behind this error, if any.
    pub fn config_fault(&self) -> Option<&ConfigError> {
        match self {
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_chain() {
        let err = ConfigError::CycleDetected {
            chain: vec![RoleId::new("a"), RoleId::new("b"), RoleId::new("a")],
        };
        assert_eq!(err.to_string(), "Role hierarchy cycle detected: a -> b -> a");
        assert!(err.is_hierarchy_fault());
    }

    #[test]
    fn test_orphan_is_not_hierarchy_fault() {
        let err = ConfigError::OrphanedPermission {
            role: RoleId::new("staff"),
            menu: MenuKey::new("gone"),
        };
        assert!(!err.is_hierarchy_fault());
        assert!(ResolveError::from(err).config_fault().is_some());
    }
}
