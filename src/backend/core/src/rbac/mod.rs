//! Hierarchical role-based menu authorization.
//!
//! This module provides:
//! - **Models**: Role, MenuModule, tri-state decisions and group mappings
//! - **Snapshot**: validated, read-only configuration with an atomic store
//! - **Hierarchy**: ancestor-chain resolution with cycle and depth checks
//! - **Permission Index**: the override fold producing effective permission sets
//! - **Menu Tree**: ordered, nested navigation built from an effective set
//! - **Gate**: the per-request state machine, backed by the permission cache
//! - **Authorization Middleware**: tower layer enforcing menu access
//!
//! # Usage
//!
//! ```rust,ignore
//! use menugate_core::rbac::{AuthorizationGate, ConfigSnapshot, SnapshotStore};
//!
//! let store = Arc::new(SnapshotStore::from_file("config/snapshot.toml", bus)?);
//! let gate = Arc::new(AuthorizationGate::new(store, cache, DEFAULT_MAX_DEPTH));
//!
//! if gate.is_authorized(&"teacher".into(), &"word-learning".into())? {
//!     // ...
//! }
//!
//! let app = Router::new()
//!     .route("/learning/words", get(list_words))
//!     .layer(RequireMenuLayer::menu(gate, "word-learning"));
//! ```

pub mod error;
pub mod gate;
pub mod hierarchy;
pub mod menu_tree;
pub mod middleware;
pub mod models;
pub mod permission;
pub mod snapshot;
pub mod store;

pub use error::{ConfigError, ResolveError};
pub use gate::{AuthorizationGate, DenyReason, GateDecision, GateState};
pub use hierarchy::{HierarchyResolver, DEFAULT_MAX_DEPTH};
pub use menu_tree::{MenuNode, MenuNodeView, MenuNodes, MenuTree, MenuTreeBuilder};
pub use middleware::{MenuAccessContext, RequireMenuLayer, RequireMenuService, ROLE_HEADER};
pub use models::{
    Decision, GroupId, MenuKey, MenuLevel, MenuModule, Role, RoleGroupMapping, RoleId,
    RoleMenuPermission,
};
pub use permission::{EffectivePermissionSet, PermissionIndex, PermissionTrace, TraceStep};
pub use snapshot::{ConfigSnapshot, SnapshotBuilder, SnapshotDiff, SnapshotDocument, SnapshotError};
pub use store::{AppliedChange, ConfigChange, Replaced, SnapshotStore};
