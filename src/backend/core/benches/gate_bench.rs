//! Benchmarks for permission resolution and the authorization gate.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use menugate_core::cache::{CacheConfig, InvalidationBus, PermissionCache};
use menugate_core::rbac::{AuthorizationGate, ConfigSnapshot, MenuKey, MenuModule, PermissionIndex, Role, RoleId, SnapshotStore, DEFAULT_MAX_DEPTH};

/// A linear chain `r0 <- r1 <- ... <- r{depth-1}` where every role grants `menus_per_role` menus.
fn chain_snapshot(depth: usize, menus_per_role: usize) -> ConfigSnapshot {
    let mut builder = ConfigSnapshot::builder();
    for level in 0..depth {
        let role = if level == 0 { Role::new("r0") } else { Role::new(format!("r{level}")).with_parent(format!("r{}", level - 1)) };
        builder = builder.role(role);
        for m in 0..menus_per_role {
            let key = format!("menu-{level}-{m}");
            builder = builder.menu(MenuModule::root(key.as_str()).with_url(format!("/m/{level}/{m}"))).grant(format!("r{level}"), key.as_str());
        }
    }
    builder.build().expect("benchmark snapshot is valid")
}

fn gate_for(snapshot: ConfigSnapshot, cache_enabled: bool) -> AuthorizationGate {
    let store = Arc::new(SnapshotStore::new(snapshot, Arc::new(InvalidationBus::new())));
    let cache = Arc::new(PermissionCache::new(CacheConfig { enabled: cache_enabled, ..CacheConfig::default() }));
    AuthorizationGate::new(store, cache, DEFAULT_MAX_DEPTH)
}

fn bench_effective_permissions(c: &mut Criterion) {
    let mut group = c.benchmark_group("effective_permissions");
    for depth in [1, 4, 8] {
        let snapshot = chain_snapshot(depth, 20);
        let leaf = RoleId::new(format!("r{}", depth - 1));
        group.throughput(Throughput::Elements((depth * 20) as u64));
        group.bench_with_input(BenchmarkId::new("depth", depth), &leaf, |b, role| {
            b.iter(|| black_box(PermissionIndex::new(&snapshot, DEFAULT_MAX_DEPTH).effective_permissions(role).unwrap()));
        });
    }
    group.finish();
}

fn bench_gate_authorize(c: &mut Criterion) {
    let mut group = c.benchmark_group("gate_authorize");
    let role = RoleId::new("r7");
    let menu = MenuKey::new("menu-0-3");

    let cached = gate_for(chain_snapshot(8, 20), true);
    cached.authorize(&role, &menu);
    group.bench_function("cache_hit", |b| { b.iter(|| black_box(cached.authorize(&role, &menu))); });

    let uncached = gate_for(chain_snapshot(8, 20), false);
    group.bench_function("cache_disabled", |b| { b.iter(|| black_box(uncached.authorize(&role, &menu))); });

    group.bench_function("route_lookup", |b| { b.iter(|| black_box(cached.authorize_route(&role, "/m/3/7/detail"))); });
    group.finish();
}

fn bench_menu_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("menu_tree");
    let gate = gate_for(chain_snapshot(4, 50), true);
    let role = RoleId::new("r3");
    group.bench_function("build_view", |b| { b.iter(|| black_box(gate.menu_tree(&role).unwrap().to_view())); });
    group.finish();
}

criterion_group!(benches, bench_effective_permissions, bench_gate_authorize, bench_menu_tree);
criterion_main!(benches);
