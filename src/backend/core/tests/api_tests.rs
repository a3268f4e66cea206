//! Tests for the HTTP API.
//!
//! Tests cover:
//! - Authorization endpoints (menu key, route, explain)
//! - Role permission and menu tree listings
//! - Sync triggers and audit queries
//! - Configuration changes and snapshot reload
//! - Health probes and error envelopes

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use menugate_core::api::{build_router, ApiResponse, AppState};
use menugate_core::audit::SyncAuditLog;
use menugate_core::cache::InvalidationBus;
use menugate_core::config::Config;
use menugate_core::rbac::{
    ConfigSnapshot, GroupId, MenuModule, Role, RoleId, SnapshotStore, DEFAULT_MAX_DEPTH,
};
use menugate_core::service::MenugateService;
use menugate_core::sync::InMemoryMembershipStore;
use menugate_core::telemetry::MetricsRegistry;
use serde_json::{json, Value};
use tower::ServiceExt;

// ============================================================================
// Test Utilities
// ============================================================================

fn school_snapshot() -> ConfigSnapshot {
    ConfigSnapshot::builder()
        .role(Role::new("staff"))
        .role(Role::new("teacher").with_parent("staff"))
        .role(Role::new("admin"))
        .role(Role::new("retired").with_parent("staff").deactivated())
        .menu(MenuModule::root("learning").with_url("/learning"))
        .menu(MenuModule::level1("word-learning", "learning").with_url("/learning/words"))
        .menu(MenuModule::root("reports").with_url("/reports"))
        .grant("staff", "learning")
        .grant("staff", "word-learning")
        .grant("admin", "reports")
        .mapping("admin", "G1")
        .mapping("admin", "G2")
        .build()
        .unwrap()
}

fn test_app_with(snapshot: ConfigSnapshot, membership: Arc<InMemoryMembershipStore>) -> Router {
    let store = SnapshotStore::new(snapshot, Arc::new(InvalidationBus::new()));
    let service = MenugateService::new(&Config::default(), store, membership, SyncAuditLog::in_memory());
    build_router(AppState::new(service, MetricsRegistry::disabled()))
}

fn test_app() -> Router {
    test_app_with(school_snapshot(), Arc::new(InMemoryMembershipStore::new()))
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

// ============================================================================
// ApiResponse Tests
// ============================================================================

#[test]
fn test_api_response_serialization_success() {
    let response = ApiResponse::success(json!({"key": "value"}));
    let parsed: Value = serde_json::to_value(&response).unwrap();

    assert_eq!(parsed["success"], true);
    assert_eq!(parsed["data"]["key"], "value");
    assert!(parsed.get("error").is_none());
}

// ============================================================================
// Authorization Tests
// ============================================================================

#[tokio::test]
async fn test_authorize_inherited_grant() {
    let (status, body) = get(test_app(), "/api/v1/authorize?role=teacher&menu=word-learning").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["authorized"], true);
    assert_eq!(body["data"]["state"], "authorized");
    assert!(body["data"].get("reason").is_none());
}

#[tokio::test]
async fn test_authorize_not_granted_is_ok_with_reason() {
    let (status, body) = get(test_app(), "/api/v1/authorize?role=teacher&menu=reports").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["authorized"], false);
    assert_eq!(body["data"]["state"], "denied");
    assert_eq!(body["data"]["reason"], "not_granted");
}

#[tokio::test]
async fn test_authorize_unknown_and_inactive_roles() {
    let (status, body) = get(test_app(), "/api/v1/authorize?role=ghost&menu=learning").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reason"], "unknown_role");

    let (status, body) = get(test_app(), "/api/v1/authorize?role=retired&menu=learning").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reason"], "role_inactive");
}

#[tokio::test]
async fn test_authorize_cycle_is_server_error() {
    let snapshot = ConfigSnapshot::builder()
        .role(Role::new("a").with_parent("b"))
        .role(Role::new("b").with_parent("a"))
        .menu(MenuModule::root("learning"))
        .grant("a", "learning")
        .build()
        .unwrap();
    let app = test_app_with(snapshot, Arc::new(InMemoryMembershipStore::new()));

    let (status, body) = get(app, "/api/v1/authorize?role=a&menu=learning").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "CONFIG_FAULT");
}

#[tokio::test]
async fn test_authorize_depth_exceeded_is_server_error() {
    let mut builder = ConfigSnapshot::builder()
        .role(Role::new("r0"))
        .menu(MenuModule::root("learning"))
        .grant("r0", "learning");
    for i in 1..=DEFAULT_MAX_DEPTH {
        builder = builder.role(Role::new(format!("r{}", i)).with_parent(format!("r{}", i - 1)));
    }
    let app = test_app_with(builder.build().unwrap(), Arc::new(InMemoryMembershipStore::new()));

    let uri = format!("/api/v1/authorize?role=r{}&menu=learning", DEFAULT_MAX_DEPTH);
    let (status, body) = get(app, &uri).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "CONFIG_FAULT");
}

#[tokio::test]
async fn test_authorize_missing_query_param_is_rejected() {
    let (status, _) = get(test_app(), "/api/v1/authorize?role=teacher").await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_authorize_route_by_prefix() {
    let (status, body) = get(
        test_app(),
        "/api/v1/authorize/route?role=teacher&path=/learning/words/daily",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["authorized"], true);
    assert_eq!(body["data"]["menu"], "word-learning");
}

#[tokio::test]
async fn test_authorize_unknown_route_is_denied() {
    let (status, body) = get(test_app(), "/api/v1/authorize/route?role=admin&path=/nowhere").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["authorized"], false);
    assert_eq!(body["data"]["reason"], "unknown_route");
}

#[tokio::test]
async fn test_explain_returns_trace() {
    let (status, body) = get(
        test_app(),
        "/api/v1/authorize/explain?role=teacher&menu=learning",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["data"].is_object());
}

#[tokio::test]
async fn test_explain_unknown_role_is_not_found() {
    let (status, body) = get(test_app(), "/api/v1/authorize/explain?role=ghost&menu=learning").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "ROLE_NOT_FOUND");
}

// ============================================================================
// Role Listing Tests
// ============================================================================

#[tokio::test]
async fn test_role_permissions() {
    let (status, body) = get(test_app(), "/api/v1/roles/teacher/permissions").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role"], "teacher");
    assert_eq!(body["data"]["keys"], json!(["learning", "word-learning"]));
}

#[tokio::test]
async fn test_role_permissions_unknown_role() {
    let (status, body) = get(test_app(), "/api/v1/roles/ghost/permissions").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_role_menu_tree() {
    let (status, body) = get(test_app(), "/api/v1/roles/teacher/menu-tree").await;

    assert_eq!(status, StatusCode::OK);
    let roots = body["data"].as_array().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0]["key"], "learning");
    assert_eq!(roots[0]["children"][0]["key"], "word-learning");
}

// ============================================================================
// Sync and Audit Tests
// ============================================================================

#[tokio::test]
async fn test_sync_role_then_audit() {
    let membership = Arc::new(InMemoryMembershipStore::new());
    let app = test_app_with(school_snapshot(), membership.clone());

    let (status, body) = send(app.clone(), Method::POST, "/api/v1/roles/admin/sync", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role"], "admin");
    assert_eq!(body["data"]["operations"].as_array().unwrap().len(), 2);

    let expected: BTreeSet<GroupId> = ["G1", "G2"].into_iter().map(GroupId::new).collect();
    assert_eq!(membership.groups_of(&RoleId::new("admin")), expected);

    let (status, body) = get(app, "/api/v1/audit?role=admin&success=true").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_sync_all() {
    let (status, body) = send(test_app(), Method::POST, "/api/v1/sync", None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_array());
}

#[tokio::test]
async fn test_audit_rejects_inverted_range() {
    let (status, body) = get(
        test_app(),
        "/api/v1/audit?since=2026-02-01T00:00:00Z&until=2026-01-01T00:00:00Z",
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[tokio::test]
async fn test_change_invalidates_cached_decision() {
    let app = test_app();

    let (_, body) = get(app.clone(), "/api/v1/authorize?role=teacher&menu=word-learning").await;
    assert_eq!(body["data"]["authorized"], true);

    let change = json!({
        "op": "set_permission",
        "permission": { "role": "teacher", "menu": "word-learning", "decision": "deny" }
    });
    let (status, body) = send(app.clone(), Method::POST, "/api/v1/changes", Some(change)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["invalidated"].as_u64().is_some());

    let (_, body) = get(app, "/api/v1/authorize?role=teacher&menu=word-learning").await;
    assert_eq!(body["data"]["authorized"], false);
    assert_eq!(body["data"]["cache_hit"], false);
}

#[tokio::test]
async fn test_invalid_change_is_rejected() {
    let change = json!({
        "op": "upsert_menu",
        "menu": { "key": "orphan", "level": "level1", "group": "missing" }
    });
    let (status, body) = send(test_app(), Method::POST, "/api/v1/changes", Some(change)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_CHANGE");
}

#[tokio::test]
async fn test_change_requires_json_content_type() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/changes")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("op=remove_role"))
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_reload_without_source_is_conflict() {
    let (status, body) = send(test_app(), Method::POST, "/api/v1/snapshot/reload", None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "SNAPSHOT_SOURCE_MISSING");
}

#[tokio::test]
async fn test_cache_stats_and_invalidations() {
    let app = test_app();
    get(app.clone(), "/api/v1/authorize?role=teacher&menu=learning").await;
    get(app.clone(), "/api/v1/authorize?role=teacher&menu=learning").await;

    let (status, body) = get(app.clone(), "/api/v1/cache/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["hits"], 1);

    let (status, body) = get(app, "/api/v1/cache/invalidations?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_array());
}

// ============================================================================
// Health and Headers
// ============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let (status, body) = get(test_app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = get(test_app(), "/health/live").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(test_app(), "/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn test_health_reports_cycle_as_unready() {
    let snapshot = ConfigSnapshot::builder()
        .role(Role::new("a").with_parent("b"))
        .role(Role::new("b").with_parent("a"))
        .build()
        .unwrap();
    let app = test_app_with(snapshot, Arc::new(InMemoryMembershipStore::new()));

    let (status, body) = get(app, "/health/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let request = Request::builder()
        .uri("/health/live")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();

    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-123");
}
