//! End-to-end authorization tests.
//!
//! These tests load snapshots from disk and drive the gate through the
//! service facade, covering reload, incremental changes and cache behavior.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use menugate_core::cache::{InvalidationBus, InvalidationEvent};
use menugate_core::config::Config;
use menugate_core::error::ErrorCode;
use menugate_core::health::HealthStatus;
use menugate_core::rbac::{
    AuthorizationGate, ConfigChange, ConfigError, ConfigSnapshot, DenyReason, GateState, MenuKey,
    MenuModule, Role, RoleId, RoleMenuPermission, SnapshotError, SnapshotStore,
};
use menugate_core::service::MenugateService;
use menugate_core::sync::InMemoryMembershipStore;

// ============================================================================
// Test Utilities
// ============================================================================

const SCHOOL_SNAPSHOT: &str = r#"
[[roles]]
id = "staff"
name = "Staff"

[[roles]]
id = "teacher"
parent = "staff"

[[roles]]
id = "senior-teacher"
parent = "teacher"

[[menus]]
key = "learning"
level = "root"
url = "/learning"
sort_order = 1

[[menus]]
key = "word-learning"
level = "level1"
group = "learning"
url = "/learning/words"

[[menus]]
key = "grammar"
level = "level1"
group = "learning"
url = "/learning/grammar"

[[permissions]]
role = "staff"
menu = "learning"
decision = "grant"

[[permissions]]
role = "staff"
menu = "word-learning"
decision = "grant"

[[permissions]]
role = "teacher"
menu = "grammar"
decision = "grant"

[[permissions]]
role = "senior-teacher"
menu = "word-learning"
decision = "deny"
"#;

fn write_snapshot(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

fn service_for(path: &Path) -> MenugateService {
    let mut config = Config::default();
    config.snapshot.path = Some(path.to_path_buf());
    MenugateService::from_config(&config, Arc::new(InMemoryMembershipStore::new())).unwrap()
}

fn role(id: &str) -> RoleId {
    RoleId::new(id)
}

fn menu(key: &str) -> MenuKey {
    MenuKey::new(key)
}

// ============================================================================
// Snapshot Loading
// ============================================================================

#[test]
fn test_toml_snapshot_drives_inheritance() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshot(dir.path(), "snapshot.toml", SCHOOL_SNAPSHOT);
    let service = service_for(&path);
    let gate = service.gate();

    assert!(gate.is_authorized(&role("teacher"), &menu("word-learning")).unwrap());
    assert!(gate.is_authorized(&role("teacher"), &menu("grammar")).unwrap());
    assert!(!gate.is_authorized(&role("staff"), &menu("grammar")).unwrap());

    // Own deny beats the inherited grant, the grandparent grant still flows through.
    assert!(!gate.is_authorized(&role("senior-teacher"), &menu("word-learning")).unwrap());
    assert!(gate.is_authorized(&role("senior-teacher"), &menu("learning")).unwrap());
}

#[test]
fn test_json_snapshot_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let json = r#"{
        "roles": [{ "id": "admin" }],
        "menus": [{ "key": "reports", "level": "root" }],
        "permissions": [{ "role": "admin", "menu": "reports", "decision": "grant" }],
        "mappings": [{ "role": "admin", "group": "G1" }]
    }"#;
    let path = write_snapshot(dir.path(), "snapshot.json", json);

    let snapshot = ConfigSnapshot::load(&path).unwrap();
    assert_eq!(snapshot.role_count(), 1);
    assert_eq!(snapshot.mapped_groups(&role("admin")).len(), 1);
}

#[test]
fn test_malformed_snapshot_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshot(dir.path(), "broken.toml", "[[roles]]\nparent = ");

    match ConfigSnapshot::load(&path) {
        Err(SnapshotError::Parse { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn test_duplicate_role_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshot(
        dir.path(),
        "dup.toml",
        "[[roles]]\nid = \"staff\"\n\n[[roles]]\nid = \"staff\"\n",
    );

    assert!(matches!(
        ConfigSnapshot::load(&path),
        Err(SnapshotError::Config(ConfigError::DuplicateRole(_)))
    ));
}

// ============================================================================
// Reload
// ============================================================================

#[test]
fn test_reload_picks_up_new_permissions() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshot(dir.path(), "snapshot.toml", SCHOOL_SNAPSHOT);
    let service = service_for(&path);

    assert!(!service.gate().is_authorized(&role("staff"), &menu("grammar")).unwrap());

    let updated = format!(
        "{}\n[[permissions]]\nrole = \"staff\"\nmenu = \"grammar\"\ndecision = \"grant\"\n",
        SCHOOL_SNAPSHOT
    );
    write_snapshot(dir.path(), "snapshot.toml", &updated);
    service.reload_snapshot().unwrap();

    assert!(service.gate().is_authorized(&role("staff"), &menu("grammar")).unwrap());
    assert!(service.gate().is_authorized(&role("teacher"), &menu("grammar")).unwrap());
}

#[test]
fn test_unchanged_reload_keeps_cached_sets() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshot(dir.path(), "snapshot.toml", SCHOOL_SNAPSHOT);
    let service = service_for(&path);
    let gate = service.gate();

    gate.authorize(&role("teacher"), &menu("grammar"));
    assert_eq!(gate.cache().len(), 1);

    let outcome = service.reload_snapshot().unwrap();
    assert!(!outcome.changed);
    assert_eq!(outcome.invalidated, 0);
    assert_eq!(gate.cache().len(), 1);
    assert!(gate.authorize(&role("teacher"), &menu("grammar")).cache_hit);
}

#[test]
fn test_reload_invalidates_only_affected_roles() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshot(dir.path(), "snapshot.toml", SCHOOL_SNAPSHOT);
    let service = service_for(&path);
    let gate = service.gate();

    gate.authorize(&role("staff"), &menu("learning"));
    gate.authorize(&role("teacher"), &menu("grammar"));
    gate.authorize(&role("senior-teacher"), &menu("grammar"));
    assert_eq!(gate.cache().len(), 3);

    // A new grant on senior-teacher leaves its ancestors' sets valid.
    let updated = format!(
        "{}\n[[permissions]]\nrole = \"senior-teacher\"\nmenu = \"grammar\"\ndecision = \"deny\"\n",
        SCHOOL_SNAPSHOT
    );
    write_snapshot(dir.path(), "snapshot.toml", &updated);
    let outcome = service.reload_snapshot().unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.invalidated, 1);
    assert!(outcome.syncs.is_empty());

    assert!(gate.authorize(&role("staff"), &menu("learning")).cache_hit);
    assert!(gate.authorize(&role("teacher"), &menu("grammar")).cache_hit);
    let senior = gate.authorize(&role("senior-teacher"), &menu("grammar"));
    assert!(!senior.cache_hit);
    assert!(senior.is_denied());
}

#[test]
fn test_failed_reload_keeps_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshot(dir.path(), "snapshot.toml", SCHOOL_SNAPSHOT);
    let service = service_for(&path);

    write_snapshot(dir.path(), "snapshot.toml", "not = [valid");
    let err = service.reload_snapshot().unwrap_err();
    assert_eq!(err.code(), ErrorCode::SnapshotLoadFailed);

    assert_eq!(service.store().current().role_count(), 3);
    assert!(service.gate().is_authorized(&role("teacher"), &menu("learning")).unwrap());
}

// ============================================================================
// Incremental Changes
// ============================================================================

#[test]
fn test_parent_change_reaches_descendants() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshot(dir.path(), "snapshot.toml", SCHOOL_SNAPSHOT);
    let service = service_for(&path);
    let gate = service.gate();

    assert!(gate.is_authorized(&role("senior-teacher"), &menu("grammar")).unwrap());

    service
        .apply_change(ConfigChange::SetPermission {
            permission: RoleMenuPermission::deny("teacher", "grammar"),
        })
        .unwrap();

    assert!(!gate.is_authorized(&role("teacher"), &menu("grammar")).unwrap());
    assert!(!gate.is_authorized(&role("senior-teacher"), &menu("grammar")).unwrap());
}

#[test]
fn test_deactivated_menu_is_hidden() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshot(dir.path(), "snapshot.toml", SCHOOL_SNAPSHOT);
    let service = service_for(&path);

    service
        .apply_change(ConfigChange::UpsertMenu {
            menu: MenuModule::level1("grammar", "learning")
                .with_url("/learning/grammar")
                .deactivated(),
        })
        .unwrap();

    let decision = service.gate().authorize(&role("teacher"), &menu("grammar"));
    assert_eq!(decision.state, GateState::Denied);
    assert_eq!(decision.reason, Some(DenyReason::NotGranted));

    let tree = service.gate().menu_tree(&role("teacher")).unwrap();
    let keys: Vec<String> = tree
        .to_view()
        .iter()
        .flat_map(|root| root.children.iter().map(|c| c.key.to_string()))
        .collect();
    assert_eq!(keys, vec!["word-learning".to_string()]);
}

#[test]
fn test_cycle_introduced_by_change_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshot(dir.path(), "snapshot.toml", SCHOOL_SNAPSHOT);
    let service = service_for(&path);

    service
        .apply_change(ConfigChange::UpsertRole {
            role: Role::new("staff").with_parent("senior-teacher"),
        })
        .unwrap();

    let decision = service.gate().authorize(&role("teacher"), &menu("learning"));
    assert_eq!(decision.state, GateState::Error);
    assert!(matches!(decision.error, Some(ConfigError::CycleDetected { .. })));

    let report = service.health().check_health();
    assert_eq!(report.status, HealthStatus::Error);
}

#[test]
fn test_removed_menu_leaves_orphan_warning() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshot(dir.path(), "snapshot.toml", SCHOOL_SNAPSHOT);
    let service = service_for(&path);

    service
        .apply_change(ConfigChange::RemoveMenu { menu: menu("grammar") })
        .unwrap();

    assert!(!service.gate().is_authorized(&role("teacher"), &menu("grammar")).unwrap());
    let report = service.health().check_health();
    let component = report.get_component("permission_config").unwrap();
    assert_eq!(component.status, HealthStatus::Warning);
}

// ============================================================================
// Cache and Invalidation
// ============================================================================

#[test]
fn test_cache_hit_on_repeat_and_miss_after_change() {
    let snapshot = ConfigSnapshot::builder()
        .role(Role::new("staff"))
        .role(Role::new("teacher").with_parent("staff"))
        .menu(MenuModule::root("learning"))
        .grant("staff", "learning")
        .build()
        .unwrap();
    let store = SnapshotStore::new(snapshot, Arc::new(InvalidationBus::new()));
    let service = MenugateService::new(
        &Config::default(),
        store,
        Arc::new(InMemoryMembershipStore::new()),
        menugate_core::audit::SyncAuditLog::in_memory(),
    );
    let gate: &Arc<AuthorizationGate> = service.gate();

    assert!(!gate.authorize(&role("teacher"), &menu("learning")).cache_hit);
    assert!(gate.authorize(&role("teacher"), &menu("learning")).cache_hit);

    service
        .apply_change(ConfigChange::SetPermission {
            permission: RoleMenuPermission::deny("staff", "learning"),
        })
        .unwrap();

    let decision = gate.authorize(&role("teacher"), &menu("learning"));
    assert!(!decision.cache_hit);
    assert!(decision.is_denied());
}

#[tokio::test]
async fn test_bus_broadcasts_change_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshot(dir.path(), "snapshot.toml", SCHOOL_SNAPSHOT);
    let service = service_for(&path);
    let mut events = service.store().bus().subscribe();

    service
        .apply_change(ConfigChange::SetPermission {
            permission: RoleMenuPermission::grant("staff", "grammar"),
        })
        .unwrap();

    let event = events.recv().await.unwrap();
    assert!(matches!(event, InvalidationEvent::Permission { .. }));

    let recent = service.store().bus().recent_invalidations(10);
    assert_eq!(recent.len(), 1);
}

#[test]
fn test_bundled_sample_snapshot_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../config/snapshot.toml");
    let service = service_for(&path);
    let gate = service.gate();

    assert!(gate.is_authorized(&role("teacher"), &menu("word-learning")).unwrap());
    assert!(!gate.is_authorized(&role("staff"), &menu("word-learning")).unwrap());
    assert!(gate.is_authorized(&role("admin"), &menu("reports")).unwrap());
    // Deactivated modules stay hidden even when granted.
    assert!(!gate.is_authorized(&role("admin"), &menu("legacy-tool")).unwrap());

    let decision = gate.authorize(&role("retired"), &menu("learning"));
    assert_eq!(decision.reason, Some(DenyReason::RoleInactive));

    let snapshot = service.store().current();
    assert_eq!(snapshot.mapped_groups(&role("admin")).len(), 2);
}
