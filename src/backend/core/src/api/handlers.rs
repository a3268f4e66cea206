//! API request handlers.
//!
//! All handlers return `Result<impl IntoResponse, MenugateError>` so that errors
//! are converted to HTTP status codes via `MenugateError`'s `IntoResponse`.
//! Authorization queries run inline (in-memory and lock-free); sync, audit
//! and snapshot I/O run on the blocking pool.

use axum::{
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::middleware::validate_limit;
use super::{ApiResponse, AppState};
use crate::audit::{AuditFilter, SyncAction};
use crate::error::{MenugateError, Result};
use crate::rbac::{ConfigChange, DenyReason, GateDecision, GateState, MenuKey, RoleId};
use crate::sync::SyncReport;

// ═══════════════════════════════════════════════════════════════════════════════
// Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authorization
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub role: RoleId,
    pub menu: MenuKey,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeRouteQuery {
    pub role: RoleId,
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    pub role: RoleId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu: Option<MenuKey>,
    pub authorized: bool,
    pub state: GateState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    pub cache_hit: bool,
}

impl TryFrom<GateDecision> for AuthorizeResponse {
    type Error = MenugateError;

    /// A gate `Error` becomes a 500; `Denied` is a normal 200 answer.
    fn try_from(decision: GateDecision) -> Result<Self> {
        if let Some(error) = decision.error {
            return Err(error.into());
        }
        Ok(Self {
            authorized: decision.state == GateState::Authorized,
            role: decision.role,
            menu: decision.menu,
            state: decision.state,
            reason: decision.reason,
            cache_hit: decision.cache_hit,
        })
    }
}

/// GET /api/v1/authorize?role=&menu=
pub async fn authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<impl IntoResponse> {
    let decision = state.service.gate().authorize(&query.role, &query.menu);
    let response = AuthorizeResponse::try_from(decision)?;
    Ok(Json(ApiResponse::success(response)))
}

/// GET /api/v1/authorize/route?role=&path=
pub async fn authorize_route(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeRouteQuery>,
) -> Result<impl IntoResponse> {
    let decision = state.service.gate().authorize_route(&query.role, &query.path);
    let response = AuthorizeResponse::try_from(decision)?;
    Ok(Json(ApiResponse::success(response)))
}

/// GET /api/v1/authorize/explain?role=&menu=
pub async fn explain(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<impl IntoResponse> {
    let trace = state.service.gate().explain(&query.role, &query.menu)?;
    Ok(Json(ApiResponse::success(trace)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Roles
// ═══════════════════════════════════════════════════════════════════════════════

fn ensure_role_exists(state: &AppState, role: &RoleId) -> Result<()> {
    match state.service.store().current().role(role) {
        Some(_) => Ok(()),
        None => Err(MenugateError::role_not_found(role)),
    }
}

/// GET /api/v1/roles/:role/permissions
pub async fn role_permissions(
    State(state): State<AppState>,
    Path(role): Path<RoleId>,
) -> Result<impl IntoResponse> {
    ensure_role_exists(&state, &role)?;
    let set = state.service.gate().effective_permissions(&role)?;
    Ok(Json(ApiResponse::success((*set).clone())))
}

/// GET /api/v1/roles/:role/menu-tree
pub async fn role_menu_tree(
    State(state): State<AppState>,
    Path(role): Path<RoleId>,
) -> Result<impl IntoResponse> {
    ensure_role_exists(&state, &role)?;
    let tree = state.service.gate().menu_tree(&role)?;
    Ok(Json(ApiResponse::success(tree.to_view())))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sync
// ═══════════════════════════════════════════════════════════════════════════════

/// POST /api/v1/roles/:role/sync
pub async fn sync_role(
    State(state): State<AppState>,
    Path(role): Path<RoleId>,
) -> Result<impl IntoResponse> {
    let service = state.service.clone();
    let report = tokio::task::spawn_blocking(move || service.sync_role(&role)).await?;
    Ok(Json(ApiResponse::success(report)))
}

/// POST /api/v1/sync
pub async fn sync_all(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let service = state.service.clone();
    let reports = tokio::task::spawn_blocking(move || service.sync_all()).await?;
    Ok(Json(ApiResponse::success(reports)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Audit
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub role: Option<RoleId>,
    pub target: Option<String>,
    pub action: Option<SyncAction>,
    pub success: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    fn into_filter(self) -> Result<AuditFilter> {
        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err(MenugateError::validation("`since` must not be after `until`"));
            }
        }
        Ok(AuditFilter {
            role: self.role,
            target_id: self.target,
            action: self.action,
            success: self.success,
            since: self.since,
            until: self.until,
            limit: Some(validate_limit(self.limit)),
        })
    }
}

/// GET /api/v1/audit?role=&success=&limit=
pub async fn query_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<impl IntoResponse> {
    let filter = query.into_filter()?;
    let audit = state.service.audit().clone();
    let entries = tokio::task::spawn_blocking(move || audit.query(&filter)).await??;
    Ok(Json(ApiResponse::success(entries)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub changed: bool,
    pub invalidated: u64,
    pub roles: usize,
    pub menus: usize,
    /// Sync reports for roles whose group mappings changed
    pub syncs: Vec<SyncReport>,
}

/// POST /api/v1/snapshot/reload
pub async fn reload_snapshot(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let service = state.service.clone();
    let outcome = tokio::task::spawn_blocking(move || service.reload_snapshot()).await??;
    let snapshot = state.service.store().current();
    Ok(Json(ApiResponse::success(ReloadResponse {
        changed: outcome.changed,
        invalidated: outcome.invalidated,
        roles: snapshot.role_count(),
        menus: snapshot.menu_count(),
        syncs: outcome.syncs,
    })))
}

/// POST /api/v1/changes
pub async fn apply_change(
    State(state): State<AppState>,
    Json(change): Json<ConfigChange>,
) -> Result<impl IntoResponse> {
    let service = state.service.clone();
    let outcome = tokio::task::spawn_blocking(move || service.apply_change(change)).await??;
    Ok(Json(ApiResponse::success(outcome)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.service.gate().cache().stats()))
}

/// GET /api/v1/cache/invalidations?limit=
pub async fn recent_invalidations(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> impl IntoResponse {
    let entries = state
        .service
        .store()
        .bus()
        .recent_invalidations(validate_limit(query.limit));
    Json(ApiResponse::success(entries))
}
