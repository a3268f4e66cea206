#![allow(clippy::result_large_err)]
//! # Menugate Core
//!
//! Hierarchical role-based menu authorization.
//!
//! ## Architecture
//!
//! - **RBAC**: Role hierarchy resolution, effective permission computation and
//!   the authorization gate, evaluated against an immutable configuration snapshot
//! - **Cache**: Per-role effective permission cache with event-driven invalidation
//! - **Sync**: Reconciliation of role-to-group mappings into an external membership store
//! - **Audit**: Append-only log of every membership change attempted by sync
//! - **Health**: Configuration integrity and sync failure-rate checks
//! - **Telemetry**: Structured logging and Prometheus metrics
//! - **API**: HTTP surface over the service facade
//!
//! ```rust,ignore
//! use menugate_core::prelude::*;
//!
//! let snapshot = ConfigSnapshot::builder()
//!     .role(Role::new("staff"))
//!     .role(Role::new("teacher").with_parent("staff"))
//!     .menu(MenuModule::root("learning"))
//!     .grant("staff", "learning")
//!     .build()?;
//!
//! let store = Arc::new(SnapshotStore::new(snapshot, Arc::new(InvalidationBus::new())));
//! let gate = AuthorizationGate::new(store, Arc::new(PermissionCache::new(CacheConfig::default())), 10);
//! assert!(gate.is_authorized(&"teacher".into(), &"learning".into())?);
//! ```

pub mod api;
pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod rbac;
pub mod service;
pub mod sync;
pub mod telemetry;

pub use error::{ErrorCode, ErrorDetails, ErrorSeverity, MenugateError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::audit::{AuditFilter, SyncAction, SyncAuditLog, SyncLogEntry};
    pub use crate::cache::{CacheConfig, CacheStats, InvalidationBus, InvalidationEvent, PermissionCache};
    pub use crate::config::Config;
    pub use crate::error::{ErrorCode, MenugateError, Result};
    pub use crate::health::{HealthReport, HealthService, HealthStatus};
    pub use crate::rbac::{
        AuthorizationGate, ConfigChange, ConfigError, ConfigSnapshot, DenyReason,
        EffectivePermissionSet, GateDecision, GateState, GroupId, MenuKey, MenuModule,
        MenuTree, RequireMenuLayer, ResolveError, Role, RoleId, RoleMenuPermission,
        SnapshotStore,
    };
    pub use crate::service::{ChangeOutcome, MenugateService, ReloadOutcome};
    pub use crate::sync::{GroupMembershipStore, GroupSyncEngine, InMemoryMembershipStore, SyncReport};
    pub use std::sync::Arc;
}
