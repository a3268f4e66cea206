//! Permission-set cache for the authorization gate.
//!
//! Entries are keyed by role and hold the resolved [`EffectivePermissionSet`].
//! Staleness is bounded two ways: configuration writes publish events on the
//! [`InvalidationBus`] and the cache drops every affected role, and a fallback
//! TTL expires entries that missed an event.
//!
//! # Usage
//!
//! ```rust,ignore
//! use menugate_core::cache::{CacheConfig, PermissionCache};
//!
//! let cache = Arc::new(PermissionCache::new(CacheConfig::default()));
//! bus.register(cache.clone());
//!
//! let epoch = cache.epoch();
//! if cache.get(&role).is_none() {
//!     let set = index.effective_permissions(&role)?;
//!     cache.insert_if_current(set, epoch);
//! }
//! ```

pub mod invalidation;

pub use invalidation::{
    InvalidationBus, InvalidationEvent, InvalidationLogEntry, InvalidationScope,
    InvalidationSubscriber,
};

use dashmap::DashMap;
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::rbac::{EffectivePermissionSet, MenuKey, RoleId};

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Fallback time-to-live for cached sets
    #[serde(with = "humantime_serde", default = "default_ttl")]
    pub ttl: Duration,

    /// Enable the cache. When disabled every request resolves.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_enabled() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_ttl(),
            enabled: default_enabled(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct CachedSet {
    set: Arc<EffectivePermissionSet>,
    inserted_at: Instant,
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
    pub invalidated: u64,
    pub expired: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

/// Role-keyed cache of effective permission sets.
#[derive(Debug)]
pub struct PermissionCache {
    entries: DashMap<RoleId, CachedSet>,
    config: CacheConfig,
    /// Bumped before every invalidation. Resolutions started under an older
    /// epoch must not be inserted.
    epoch: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidated: AtomicU64,
    expired: AtomicU64,
}

impl PermissionCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            epoch: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidated: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Current invalidation epoch. Read this before resolving.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Look up a valid (not expired, not invalidated) set for `role`.
    pub fn get(&self, role: &RoleId) -> Option<Arc<EffectivePermissionSet>> {
        if !self.config.enabled {
            return None;
        }

        let found = self.entries.get(role).map(|entry| {
            (entry.inserted_at.elapsed() < self.config.ttl).then(|| entry.set.clone())
        });

        match found {
            Some(Some(set)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                counter!("menugate_cache_hits_total").increment(1);
                trace!(role = %role, "Permission cache hit");
                Some(set)
            }
            Some(None) => {
                self.entries
                    .remove_if(role, |_, entry| entry.inserted_at.elapsed() >= self.config.ttl);
                self.expired.fetch_add(1, Ordering::Relaxed);
                self.record_miss(role);
                None
            }
            None => {
                self.record_miss(role);
                None
            }
        }
    }

    /// Insert `set` unless an invalidation happened since `epoch` was read.
    ///
    /// Returns whether the entry was stored.
    pub fn insert_if_current(&self, set: EffectivePermissionSet, epoch: u64) -> bool {
        if !self.config.enabled {
            return false;
        }

        // The epoch check runs under the shard lock for this role. Invalidation
        // bumps the epoch before taking the same lock to remove, so a stale set
        // is either rejected here or removed afterwards.
        let role = set.role.clone();
        let entry = self.entries.entry(role);
        if self.epoch() != epoch {
            debug!(role = %entry.key(), "Discarding permission set resolved before invalidation");
            return false;
        }
        entry.insert(CachedSet {
            set: Arc::new(set),
            inserted_at: Instant::now(),
        });
        gauge!("menugate_cache_entries").set(self.entries.len() as f64);
        true
    }

    /// Drop the entries for `roles`.
    pub fn invalidate_roles<'a>(&self, roles: impl IntoIterator<Item = &'a RoleId>) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let removed = roles
            .into_iter()
            .filter(|role| self.entries.remove(*role).is_some())
            .count() as u64;
        self.record_invalidated(removed)
    }

    /// Drop every entry whose set contains `menu`.
    fn invalidate_containing(&self, menu: &MenuKey) -> u64 {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.set.contains(menu));
        self.record_invalidated(before.saturating_sub(self.entries.len()) as u64)
    }

    /// Drop every entry.
    pub fn clear(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let removed = self.entries.len() as u64;
        self.entries.clear();
        self.record_invalidated(removed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            entries: self.entries.len() as u64,
            invalidated: self.invalidated.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    fn record_miss(&self, role: &RoleId) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("menugate_cache_misses_total").increment(1);
        trace!(role = %role, "Permission cache miss");
    }

    fn record_invalidated(&self, removed: u64) -> u64 {
        self.invalidated.fetch_add(removed, Ordering::Relaxed);
        gauge!("menugate_cache_entries").set(self.entries.len() as f64);
        removed
    }
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl InvalidationSubscriber for PermissionCache {
    fn on_invalidation(&self, event: &InvalidationEvent, scope: InvalidationScope<'_>) -> u64 {
        match scope.affected_roles(event) {
            None => self.clear(),
            Some(roles) => {
                let mut removed = self.invalidate_roles(&roles);
                if let InvalidationEvent::Menu { menu } = event {
                    removed += self.invalidate_containing(menu);
                }
                removed
            }
        }
    }

    fn name(&self) -> &'static str {
        "permission_cache"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
