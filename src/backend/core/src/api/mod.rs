//! HTTP API for the Menugate service.
//!
//! # Endpoints
//!
//! ## Probes and metrics (unversioned)
//! - `GET /health`, `GET /health/live`, `GET /health/ready`
//! - `GET /metrics` - Prometheus text format
//!
//! ## Authorization
//! - `GET /api/v1/authorize?role=&menu=`
//! - `GET /api/v1/authorize/route?role=&path=`
//! - `GET /api/v1/authorize/explain?role=&menu=`
//! - `GET /api/v1/roles/:role/permissions`
//! - `GET /api/v1/roles/:role/menu-tree`
//!
//! ## Sync and audit
//! - `POST /api/v1/roles/:role/sync`
//! - `POST /api/v1/sync`
//! - `GET /api/v1/audit?role=&target=&action=&success=&since=&until=&limit=`
//!
//! ## Configuration
//! - `POST /api/v1/snapshot/reload`
//! - `POST /api/v1/changes`
//! - `GET /api/v1/cache/stats`
//! - `GET /api/v1/cache/invalidations?limit=`

mod handlers;
pub mod middleware;

pub use handlers::{AuditQuery, AuthorizeResponse, ReloadResponse};

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::health::health_routes;
use crate::service::MenugateService;
use crate::telemetry::MetricsRegistry;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: MenugateService,
    pub metrics: MetricsRegistry,
}

impl AppState {
    pub fn new(service: MenugateService, metrics: MetricsRegistry) -> Self {
        Self { service, metrics }
    }
}

/// V1 API route constants.
pub mod paths {
    pub const AUTHORIZE: &str = "/api/v1/authorize";
    pub const AUTHORIZE_ROUTE: &str = "/api/v1/authorize/route";
    pub const AUTHORIZE_EXPLAIN: &str = "/api/v1/authorize/explain";
    pub const ROLE_PERMISSIONS: &str = "/api/v1/roles/:role/permissions";
    pub const ROLE_MENU_TREE: &str = "/api/v1/roles/:role/menu-tree";
    pub const ROLE_SYNC: &str = "/api/v1/roles/:role/sync";
    pub const SYNC_ALL: &str = "/api/v1/sync";
    pub const AUDIT: &str = "/api/v1/audit";
    pub const SNAPSHOT_RELOAD: &str = "/api/v1/snapshot/reload";
    pub const CHANGES: &str = "/api/v1/changes";
    pub const CACHE_STATS: &str = "/api/v1/cache/stats";
    pub const CACHE_INVALIDATIONS: &str = "/api/v1/cache/invalidations";
}

/// Build the full router: probes, metrics and the v1 API.
///
/// ```rust,ignore
/// let app = build_router(AppState::new(service, metrics));
/// axum::serve(listener, app).await?;
/// ```
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route(paths::AUTHORIZE, get(handlers::authorize))
        .route(paths::AUTHORIZE_ROUTE, get(handlers::authorize_route))
        .route(paths::AUTHORIZE_EXPLAIN, get(handlers::explain))
        .route(paths::ROLE_PERMISSIONS, get(handlers::role_permissions))
        .route(paths::ROLE_MENU_TREE, get(handlers::role_menu_tree))
        .route(paths::ROLE_SYNC, post(handlers::sync_role))
        .route(paths::SYNC_ALL, post(handlers::sync_all))
        .route(paths::AUDIT, get(handlers::query_audit))
        .route(paths::SNAPSHOT_RELOAD, post(handlers::reload_snapshot))
        .route(paths::CHANGES, post(handlers::apply_change))
        .route(paths::CACHE_STATS, get(handlers::cache_stats))
        .route(paths::CACHE_INVALIDATIONS, get(handlers::recent_invalidations))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state.clone());

    Router::new()
        .merge(api)
        .merge(health_routes(state.service.health().clone()))
        .layer(axum_middleware::from_fn(middleware::content_type_validation))
        .layer(axum_middleware::from_fn(middleware::track_requests))
        .layer(axum_middleware::from_fn(middleware::request_headers))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// API response wrapper.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }

    pub fn error_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            error_code: Some(code.into()),
        }
    }
}
