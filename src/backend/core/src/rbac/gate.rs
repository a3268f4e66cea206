//! Request-facing authorization gate.
//!
//! Every check runs a small state machine:
//!
//! ```text
//! Unresolved ──(cache hit)──────────────────► Authorized | Denied
//!     │
//!     └──► Resolving ──(PermissionIndex)──► Authorized | Denied | Error
//! ```
//!
//! `Denied` is a normal outcome. `Error` is reserved for configuration faults
//! in the role hierarchy and is fatal to the request.

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use super::error::{ConfigError, ResolveError};
use super::menu_tree::{MenuTree, MenuTreeBuilder};
use super::models::{MenuKey, RoleId};
use super::permission::{EffectivePermissionSet, PermissionIndex, PermissionTrace};
use super::store::SnapshotStore;
use crate::cache::PermissionCache;

// ═══════════════════════════════════════════════════════════════════════════════
// State machine
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-request gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Unresolved,
    Resolving,
    Authorized,
    Denied,
    Error,
}

impl GateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authorized | Self::Denied | Self::Error)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: GateState) -> bool {
        matches!(
            (self, next),
            (Self::Unresolved, Self::Resolving)
                | (Self::Unresolved, Self::Authorized)
                | (Self::Unresolved, Self::Denied)
                | (Self::Resolving, Self::Authorized)
                | (Self::Resolving, Self::Denied)
                | (Self::Resolving, Self::Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unresolved => "unresolved",
            Self::Resolving => "resolving",
            Self::Authorized => "authorized",
            Self::Denied => "denied",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The menu key is not in the role's effective set.
    NotGranted,
    RoleInactive,
    UnknownRole,
    /// No menu module serves the requested path.
    UnknownRoute,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotGranted => "not_granted",
            Self::RoleInactive => "role_inactive",
            Self::UnknownRole => "unknown_role",
            Self::UnknownRoute => "unknown_route",
        }
    }
}

/// Tracks the transitions of one gate run.
#[derive(Debug)]
struct GateRun {
    state: GateState,
    transitions: Vec<GateState>,
    started: Instant,
}

impl GateRun {
    fn new() -> Self {
        Self {
            state: GateState::Unresolved,
            transitions: vec![GateState::Unresolved],
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: GateState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal gate transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
        self.transitions.push(next);
    }
}

/// Final outcome of a gate run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub role: RoleId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu: Option<MenuKey>,
    pub state: GateState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    #[serde(skip)]
    pub error: Option<ConfigError>,
    pub cache_hit: bool,
    pub transitions: Vec<GateState>,
}

impl GateDecision {
    pub fn is_authorized(&self) -> bool {
        self.state == GateState::Authorized
    }

    pub fn is_denied(&self) -> bool {
        self.state == GateState::Denied
    }

    /// `Ok(true)` when authorized, `Ok(false)` when denied, the fault otherwise.
    pub fn into_result(self) -> Result<bool, ConfigError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.state == GateState::Authorized),
        }
    }
}

/// A resolution that produced no permission set.
enum Unresolvable {
    Denied(DenyReason),
    Fault(ConfigError),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Gate
// ═══════════════════════════════════════════════════════════════════════════════

/// Entry point for authorization queries.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    store: Arc<SnapshotStore>,
    cache: Arc<PermissionCache>,
    max_depth: usize,
}

impl AuthorizationGate {
    /// Create a gate and subscribe its cache to the store's invalidation bus.
    pub fn new(store: Arc<SnapshotStore>, cache: Arc<PermissionCache>, max_depth: usize) -> Self {
        store.bus().register(cache.clone());
        Self {
            store,
            cache,
            max_depth,
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    /// Decide whether `role` may access `menu`.
    pub fn authorize(&self, role: &RoleId, menu: &MenuKey) -> GateDecision {
        let mut run = GateRun::new();
        let outcome = self.permission_set(role, &mut run);
        self.finish(role, Some(menu.clone()), run, outcome.map(|(set, hit)| (set.contains(menu), hit)))
    }

    /// Decide whether `role` may access the module serving `path`.
    pub fn authorize_route(&self, role: &RoleId, path: &str) -> GateDecision {
        let snapshot = self.store.current();
        match snapshot.menu_for_route(path) {
            Some(module) => self.authorize(role, &module.key),
            None => {
                let run = GateRun::new();
                self.finish(role, None, run, Err(Unresolvable::Denied(DenyReason::UnknownRoute)))
            }
        }
    }

    /// Boolean query surface: denied is `Ok(false)`, a configuration fault is `Err`.
    pub fn is_authorized(&self, role: &RoleId, menu: &MenuKey) -> Result<bool, ConfigError> {
        self.authorize(role, menu).into_result()
    }

    /// Effective set for `role`. Inactive and unknown roles get the empty set.
    pub fn effective_permissions(
        &self,
        role: &RoleId,
    ) -> Result<Arc<EffectivePermissionSet>, ConfigError> {
        let mut run = GateRun::new();
        match self.permission_set(role, &mut run) {
            Ok((set, _)) => Ok(set),
            Err(Unresolvable::Denied(_)) => Ok(Arc::new(EffectivePermissionSet::empty(role.clone()))),
            Err(Unresolvable::Fault(e)) => Err(e),
        }
    }

    /// Navigable menu tree for `role`.
    pub fn menu_tree(&self, role: &RoleId) -> Result<MenuTree, ConfigError> {
        let set = self.effective_permissions(role)?;
        let snapshot = self.store.current();
        Ok(MenuTreeBuilder::new(&snapshot).build_tree(&set))
    }

    /// Step-by-step account of the decision for `(role, menu)`. Never cached.
    pub fn explain(&self, role: &RoleId, menu: &MenuKey) -> Result<PermissionTrace, ResolveError> {
        let snapshot = self.store.current();
        PermissionIndex::new(&snapshot, self.max_depth).explain(role, menu)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    /// Cached set, or a fresh resolution. The flag reports a cache hit.
    fn permission_set(
        &self,
        role: &RoleId,
        run: &mut GateRun,
    ) -> Result<(Arc<EffectivePermissionSet>, bool), Unresolvable> {
        if let Some(set) = self.cache.get(role) {
            return Ok((set, true));
        }

        run.advance(GateState::Resolving);
        let epoch = self.cache.epoch();
        let snapshot = self.store.current();
        let index = PermissionIndex::new(&snapshot, self.max_depth);

        match index.effective_permissions(role) {
            Ok(set) => {
                self.cache.insert_if_current(set.clone(), epoch);
                Ok((Arc::new(set), false))
            }
            Err(ResolveError::RoleNotFound(_)) => Err(Unresolvable::Denied(DenyReason::UnknownRole)),
            Err(ResolveError::RoleInactive(_)) => Err(Unresolvable::Denied(DenyReason::RoleInactive)),
            Err(ResolveError::Config(e)) => Err(Unresolvable::Fault(e)),
        }
    }

    fn finish(
        &self,
        role: &RoleId,
        menu: Option<MenuKey>,
        mut run: GateRun,
        outcome: Result<(bool, bool), Unresolvable>,
    ) -> GateDecision {
        let (state, reason, error, cache_hit) = match outcome {
            Ok((true, hit)) => (GateState::Authorized, None, None, hit),
            Ok((false, hit)) => (GateState::Denied, Some(DenyReason::NotGranted), None, hit),
            Err(Unresolvable::Denied(reason)) => (GateState::Denied, Some(reason), None, false),
            Err(Unresolvable::Fault(e)) => (GateState::Error, None, Some(e), false),
        };
        run.advance(state);

        let elapsed = run.started.elapsed();
        counter!("menugate_gate_decisions_total", "outcome" => state.as_str()).increment(1);
        histogram!("menugate_gate_duration_seconds").record(elapsed.as_secs_f64());

        match (&state, &error) {
            (GateState::Error, Some(e)) => error!(
                role = %role,
                menu = menu.as_ref().map(MenuKey::as_str).unwrap_or("-"),
                error = %e,
                "Authorization failed on configuration fault"
            ),
            _ => debug!(
                role = %role,
                menu = menu.as_ref().map(MenuKey::as_str).unwrap_or("-"),
                state = state.as_str(),
                reason = reason.map(|r| r.as_str()).unwrap_or("-"),
                cache_hit,
                "Authorization decided"
            ),
        }

        GateDecision {
            role: role.clone(),
            menu,
            state,
            reason,
            error,
            cache_hit,
            transitions: run.transitions,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InvalidationBus;
    use crate::rbac::hierarchy::DEFAULT_MAX_DEPTH;
    use crate::rbac::models::{MenuModule, Role, RoleMenuPermission};
    use crate::rbac::snapshot::ConfigSnapshot;
    use crate::rbac::store::ConfigChange;

    fn gate_with(snapshot: ConfigSnapshot) -> AuthorizationGate {
        let store = Arc::new(SnapshotStore::new(snapshot, Arc::new(InvalidationBus::new())));
        AuthorizationGate::new(store, Arc::new(PermissionCache::default()), DEFAULT_MAX_DEPTH)
    }

    fn school() -> ConfigSnapshot {
        ConfigSnapshot::builder()
            .role(Role::new("staff"))
            .role(Role::new("teacher").with_parent("staff"))
            .role(Role::new("retired").with_parent("staff").deactivated())
            .menu(MenuModule::root("learning").with_url("/learning"))
            .menu(MenuModule::level1("word-learning", "learning").with_url("/learning/words"))
            .grant("staff", "learning")
            .grant("staff", "word-learning")
            .build()
            .unwrap()
    }

    #[test]
    fn test_transitions_on_miss_then_hit() {
        let gate = gate_with(school());
        let first = gate.authorize(&"teacher".into(), &"word-learning".into());
        assert!(first.is_authorized());
        assert!(!first.cache_hit);
        assert_eq!(
            first.transitions,
            vec![GateState::Unresolved, GateState::Resolving, GateState::Authorized]
        );

        let second = gate.authorize(&"teacher".into(), &"word-learning".into());
        assert!(second.cache_hit);
        assert_eq!(second.transitions, vec![GateState::Unresolved, GateState::Authorized]);
    }

    #[test]
    fn test_not_granted_is_denied_not_error() {
        let gate = gate_with(school());
        let decision = gate.authorize(&"teacher".into(), &"admin".into());
        assert_eq!(decision.state, GateState::Denied);
        assert_eq!(decision.reason, Some(DenyReason::NotGranted));
        assert_eq!(gate.is_authorized(&"teacher".into(), &"admin".into()), Ok(false));
    }

    #[test]
    fn test_inactive_and_unknown_roles_are_denied() {
        let gate = gate_with(school());
        let inactive = gate.authorize(&"retired".into(), &"learning".into());
        assert_eq!(inactive.reason, Some(DenyReason::RoleInactive));
        let unknown = gate.authorize(&"ghost".into(), &"learning".into());
        assert_eq!(unknown.reason, Some(DenyReason::UnknownRole));

        assert!(gate.effective_permissions(&"retired".into()).unwrap().is_empty());
        assert!(gate.menu_tree(&"ghost".into()).unwrap().is_empty());
    }

    #[test]
    fn test_cycle_is_error() {
        let snapshot = ConfigSnapshot::builder()
            .role(Role::new("a").with_parent("b"))
            .role(Role::new("b").with_parent("a"))
            .menu(MenuModule::root("learning"))
            .build()
            .unwrap();
        let gate = gate_with(snapshot);
        let decision = gate.authorize(&"a".into(), &"learning".into());
        assert_eq!(decision.state, GateState::Error);
        assert!(matches!(decision.error, Some(ConfigError::CycleDetected { .. })));
        assert!(gate.is_authorized(&"a".into(), &"learning".into()).is_err());
        assert!(gate.cache().is_empty());
    }

    #[test]
    fn test_depth_exceeded_is_error() {
        let mut builder = ConfigSnapshot::builder()
            .role(Role::new("level-0"))
            .menu(MenuModule::root("learning"))
            .grant("level-0", "learning");
        for i in 1..=DEFAULT_MAX_DEPTH {
            builder = builder.role(Role::new(format!("level-{}", i)).with_parent(format!("level-{}", i - 1)));
        }
        let gate = gate_with(builder.build().unwrap());

        let deepest = RoleId::new(format!("level-{}", DEFAULT_MAX_DEPTH));
        let decision = gate.authorize(&deepest, &"learning".into());
        assert_eq!(decision.state, GateState::Error);
        assert!(matches!(
            decision.error,
            Some(ConfigError::DepthExceeded { max_depth, .. }) if max_depth == DEFAULT_MAX_DEPTH
        ));
        assert!(gate.cache().is_empty());

        // One level up the chain still fits.
        let within = RoleId::new(format!("level-{}", DEFAULT_MAX_DEPTH - 1));
        assert_eq!(gate.is_authorized(&within, &"learning".into()), Ok(true));
    }

    #[test]
    fn test_permission_change_invalidates_descendants() {
        let gate = gate_with(school());
        assert_eq!(gate.is_authorized(&"teacher".into(), &"word-learning".into()), Ok(true));

        gate.store()
            .apply(ConfigChange::SetPermission {
                permission: RoleMenuPermission::deny("staff", "word-learning"),
            })
            .unwrap();

        let decision = gate.authorize(&"teacher".into(), &"word-learning".into());
        assert!(!decision.cache_hit);
        assert!(decision.is_denied());
    }

    #[test]
    fn test_route_check_uses_longest_prefix() {
        let gate = gate_with(school());
        let decision = gate.authorize_route(&"teacher".into(), "/learning/words/17");
        assert!(decision.is_authorized());
        assert_eq!(decision.menu, Some("word-learning".into()));

        let unknown = gate.authorize_route(&"teacher".into(), "/billing");
        assert_eq!(unknown.reason, Some(DenyReason::UnknownRoute));
        assert_eq!(unknown.transitions, vec![GateState::Unresolved, GateState::Denied]);
    }

    #[test]
    fn test_menu_tree_for_role() {
        let gate = gate_with(school());
        let tree = gate.menu_tree(&"teacher".into()).unwrap();
        let root = tree.roots().next().unwrap();
        assert_eq!(root.key().as_str(), "learning");
        assert_eq!(root.children_count(), 1);
    }

    #[test]
    fn test_state_transition_table() {
        assert!(GateState::Unresolved.can_transition_to(GateState::Resolving));
        assert!(!GateState::Unresolved.can_transition_to(GateState::Error));
        assert!(!GateState::Authorized.can_transition_to(GateState::Denied));
        assert!(GateState::Error.is_terminal());
    }
}
