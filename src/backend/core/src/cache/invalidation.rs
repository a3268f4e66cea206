//! Event-driven invalidation of cached permission sets.
//!
//! Configuration writes publish an [`InvalidationEvent`] on the
//! [`InvalidationBus`]. Each registered [`InvalidationSubscriber`] receives the
//! event together with the snapshots before and after the write, so it can
//! work out which roles were affected under either version of the hierarchy.

use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::debug;

use crate::rbac::hierarchy::{HierarchyResolver, DEFAULT_MAX_DEPTH};
use crate::rbac::{ConfigSnapshot, MenuKey, RoleId};

const RECENT_LOG_CAPACITY: usize = 256;

// ═══════════════════════════════════════════════════════════════════════════════
// Invalidation Events
// ═══════════════════════════════════════════════════════════════════════════════

/// A configuration write that may change effective permission sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvalidationEvent {
    /// A role was added, removed or changed (parent, active flag).
    Role { role: RoleId },

    /// A menu module was added, removed or changed (active flag, grouping).
    Menu { menu: MenuKey },

    /// A single (role, menu) decision changed.
    Permission { role: RoleId, menu: MenuKey },

    /// Too many records changed at once to track individually.
    All,
}

impl InvalidationEvent {
    pub fn role(role: impl Into<RoleId>) -> Self {
        Self::Role { role: role.into() }
    }

    pub fn menu(menu: impl Into<MenuKey>) -> Self {
        Self::Menu { menu: menu.into() }
    }

    pub fn permission(role: impl Into<RoleId>, menu: impl Into<MenuKey>) -> Self {
        Self::Permission {
            role: role.into(),
            menu: menu.into(),
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Role { .. } => "role",
            Self::Menu { .. } => "menu",
            Self::Permission { .. } => "permission",
            Self::All => "all",
        }
    }
}

/// The snapshots on either side of a configuration write.
#[derive(Debug, Clone, Copy)]
pub struct InvalidationScope<'a> {
    pub before: &'a ConfigSnapshot,
    pub after: &'a ConfigSnapshot,
}

impl<'a> InvalidationScope<'a> {
    pub fn new(before: &'a ConfigSnapshot, after: &'a ConfigSnapshot) -> Self {
        Self { before, after }
    }

    /// Roles whose effective set may have changed, or `None` for "every role".
    ///
    /// A role event affects the role and all of its descendants. A menu event
    /// affects every role holding a decision on that menu, plus descendants.
    pub fn affected_roles(&self, event: &InvalidationEvent) -> Option<BTreeSet<RoleId>> {
        let seeds: Vec<RoleId> = match event {
            InvalidationEvent::All => return None,
            InvalidationEvent::Role { role } | InvalidationEvent::Permission { role, .. } => {
                vec![role.clone()]
            }
            InvalidationEvent::Menu { menu } => {
                let mut roles = self.before.roles_deciding(menu);
                roles.extend(self.after.roles_deciding(menu));
                roles
            }
        };

        let mut affected = BTreeSet::new();
        for snapshot in [self.before, self.after] {
            let resolver = HierarchyResolver::new(snapshot, DEFAULT_MAX_DEPTH);
            for seed in &seeds {
                affected.extend(resolver.descendants(seed));
            }
        }
        affected.extend(seeds);
        Some(affected)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Subscriber Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Receives invalidation events from an [`InvalidationBus`].
pub trait InvalidationSubscriber: Send + Sync {
    /// Drop state affected by `event`. Returns the number of entries removed.
    fn on_invalidation(&self, event: &InvalidationEvent, scope: InvalidationScope<'_>) -> u64;

    /// Get the subscriber name.
    fn name(&self) -> &'static str;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Bus
// ═══════════════════════════════════════════════════════════════════════════════

/// Log entry for invalidation operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationLogEntry {
    /// Event that triggered the invalidation
    pub event: InvalidationEvent,

    /// Number of entries invalidated across all subscribers
    pub count: u64,

    pub timestamp: DateTime<Utc>,

    pub duration_us: u64,
}

/// Synchronous publish/subscribe hub for invalidation events.
///
/// Subscribers run inline on the publishing thread, so once
/// [`publish`](Self::publish) returns every subscriber has processed the
/// event. External observers can additionally listen on a broadcast channel.
pub struct InvalidationBus {
    subscribers: RwLock<Vec<Arc<dyn InvalidationSubscriber>>>,
    sender: broadcast::Sender<InvalidationEvent>,
    recent: Mutex<VecDeque<InvalidationLogEntry>>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(RECENT_LOG_CAPACITY);
        Self {
            subscribers: RwLock::new(Vec::new()),
            sender,
            recent: Mutex::new(VecDeque::with_capacity(RECENT_LOG_CAPACITY)),
        }
    }

    /// Register a subscriber.
    pub fn register(&self, subscriber: Arc<dyn InvalidationSubscriber>) {
        debug!(subscriber = subscriber.name(), "Registered invalidation subscriber");
        self.subscribers.write().push(subscriber);
    }

    /// Listen for events on a broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationEvent> {
        self.sender.subscribe()
    }

    /// Deliver `event` to every subscriber. Returns the total entries removed.
    pub fn publish(&self, event: InvalidationEvent, scope: InvalidationScope<'_>) -> u64 {
        let start = Instant::now();
        let subscribers = self.subscribers.read().clone();

        let count: u64 = subscribers
            .iter()
            .map(|s| s.on_invalidation(&event, scope))
            .sum();

        counter!("menugate_invalidations_total", "type" => event.event_type()).increment(1);
        debug!(
            event_type = event.event_type(),
            removed = count,
            subscribers = subscribers.len(),
            "Published invalidation event"
        );

        // No receivers is not an error.
        let _ = self.sender.send(event.clone());

        let mut recent = self.recent.lock();
        if recent.len() == RECENT_LOG_CAPACITY {
            recent.pop_front();
        }
        recent.push_back(InvalidationLogEntry {
            event,
            count,
            timestamp: Utc::now(),
            duration_us: start.elapsed().as_micros() as u64,
        });

        count
    }

    /// Get recent invalidation log entries, newest first.
    pub fn recent_invalidations(&self, limit: usize) -> Vec<InvalidationLogEntry> {
        self.recent.lock().iter().rev().take(limit).cloned().collect()
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InvalidationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationBus")
            .field("subscribers", &self.subscribers.read().len())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::{MenuModule, Role};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn snapshot() -> ConfigSnapshot {
        ConfigSnapshot::builder()
            .role(Role::new("staff"))
            .role(Role::new("teacher").with_parent("staff"))
            .role(Role::new("head").with_parent("teacher"))
            .role(Role::new("student"))
            .menu(MenuModule::root("word-learning"))
            .grant("staff", "word-learning")
            .grant("student", "word-learning")
            .build()
            .unwrap()
    }

    #[derive(Default)]
    struct Counting {
        seen: AtomicU64,
    }

    impl InvalidationSubscriber for Counting {
        fn on_invalidation(&self, _event: &InvalidationEvent, _scope: InvalidationScope<'_>) -> u64 {
            self.seen.fetch_add(1, Ordering::SeqCst);
            1
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[test]
    fn test_role_event_reaches_descendants() {
        let s = snapshot();
        let scope = InvalidationScope::new(&s, &s);
        let affected = scope.affected_roles(&InvalidationEvent::role("teacher")).unwrap();
        let names: Vec<&str> = affected.iter().map(RoleId::as_str).collect();
        assert_eq!(names, vec!["head", "teacher"]);
    }

    #[test]
    fn test_menu_event_reaches_deciding_roles() {
        let s = snapshot();
        let scope = InvalidationScope::new(&s, &s);
        let affected = scope.affected_roles(&InvalidationEvent::menu("word-learning")).unwrap();
        assert_eq!(affected.len(), 4);
    }

    #[test]
    fn test_reparenting_uses_both_snapshots() {
        let before = snapshot();
        let after = ConfigSnapshot::builder()
            .role(Role::new("staff"))
            .role(Role::new("teacher"))
            .role(Role::new("head").with_parent("student"))
            .role(Role::new("student"))
            .build()
            .unwrap();
        let scope = InvalidationScope::new(&before, &after);
        let affected = scope.affected_roles(&InvalidationEvent::role("teacher")).unwrap();
        assert!(affected.contains(&RoleId::new("head")));
    }

    #[test]
    fn test_all_event_affects_everything() {
        let s = snapshot();
        assert!(InvalidationScope::new(&s, &s)
            .affected_roles(&InvalidationEvent::All)
            .is_none());
    }

    #[test]
    fn test_bus_delivers_to_every_subscriber() {
        let s = snapshot();
        let bus = InvalidationBus::new();
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        bus.register(a.clone());
        bus.register(b.clone());

        let removed = bus.publish(InvalidationEvent::All, InvalidationScope::new(&s, &s));
        assert_eq!(removed, 2);
        assert_eq!(a.seen.load(Ordering::SeqCst), 1);
        assert_eq!(b.seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.recent_invalidations(10).len(), 1);
    }

    #[test]
    fn test_broadcast_receivers_see_events() {
        let s = snapshot();
        let bus = InvalidationBus::new();
        let mut rx = bus.subscribe();
        bus.publish(InvalidationEvent::permission("staff", "word-learning"), InvalidationScope::new(&s, &s));
        let received = rx.try_recv().unwrap();
        assert_eq!(received.event_type(), "permission");
    }

    #[test]
    fn test_event_serde_tagged() {
        let json = serde_json::to_value(InvalidationEvent::permission("staff", "word-learning")).unwrap();
        assert_eq!(json["type"], "permission");
        assert_eq!(json["role"], "staff");
    }
}
