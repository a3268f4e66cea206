//! Append-only audit trail of group synchronization attempts.
//!
//! Entries are created only by the sync engine and are never mutated or
//! deleted. Storage is pluggable through [`AuditSink`]; an in-memory sink and
//! a JSON-lines file sink ([`file::JsonLinesAuditSink`]) are provided.
//!
//! # Usage
//!
//! ```rust,ignore
//! let log = SyncAuditLog::new(Arc::new(InMemoryAuditSink::new()));
//! log.append(SyncLogEntry::success(SyncAction::AddMembership, &role, &group, "added"))?;
//!
//! let failures = log.recent_failures(Duration::from_secs(24 * 3600))?;
//! let entries = log.query(&AuditFilter::new().role("admin").failures_only().limit(20))?;
//! ```

pub mod file;

pub use file::JsonLinesAuditSink;

use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::rbac::{GroupId, RoleId};

// ═══════════════════════════════════════════════════════════════════════════════
// Entries
// ═══════════════════════════════════════════════════════════════════════════════

/// Operation attempted against the membership store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    AddMembership,
    RemoveMembership,
    /// Reading the role's current memberships before diffing.
    ReadMembership,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddMembership => "add_membership",
            Self::RemoveMembership => "remove_membership",
            Self::ReadMembership => "read_membership",
        }
    }
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of object an entry targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditTargetType {
    Group,
    Role,
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub id: Uuid,
    pub action: SyncAction,
    pub target_type: AuditTargetType,
    pub target_id: String,
    pub role: RoleId,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Result text on success, error text on failure.
    pub message: String,
}

impl SyncLogEntry {
    fn new(
        action: SyncAction,
        target_type: AuditTargetType,
        target_id: String,
        role: &RoleId,
        success: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            target_type,
            target_id,
            role: role.clone(),
            timestamp: Utc::now(),
            success,
            message: message.into(),
        }
    }

    /// A successful membership operation on `group`.
    pub fn success(action: SyncAction, role: &RoleId, group: &GroupId, message: impl Into<String>) -> Self {
        Self::new(action, AuditTargetType::Group, group.to_string(), role, true, message)
    }

    /// A failed membership operation on `group`.
    pub fn failure(action: SyncAction, role: &RoleId, group: &GroupId, error: impl Into<String>) -> Self {
        Self::new(action, AuditTargetType::Group, group.to_string(), role, false, error)
    }

    /// A failed read of the role's memberships.
    pub fn read_failure(role: &RoleId, error: impl Into<String>) -> Self {
        Self::new(
            SyncAction::ReadMembership,
            AuditTargetType::Role,
            role.to_string(),
            role,
            false,
            error,
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit write failed: {0}")]
    WriteFailed(String),

    #[error("Audit query failed: {0}")]
    QueryFailed(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Filter
// ═══════════════════════════════════════════════════════════════════════════════

/// Query filter. Results are newest first; `limit` keeps the newest N.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<SyncAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, role: impl Into<RoleId>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn action(mut self, action: SyncAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn failures_only(mut self) -> Self {
        self.success = Some(false);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &SyncLogEntry) -> bool {
        self.role.as_ref().map_or(true, |r| *r == entry.role)
            && self.target_id.as_ref().map_or(true, |t| *t == entry.target_id)
            && self.action.map_or(true, |a| a == entry.action)
            && self.success.map_or(true, |s| s == entry.success)
            && self.since.map_or(true, |t| entry.timestamp >= t)
            && self.until.map_or(true, |t| entry.timestamp <= t)
    }

    /// Apply the filter to entries stored oldest first.
    pub fn apply<'a>(&self, entries: impl DoubleEndedIterator<Item = &'a SyncLogEntry>) -> Vec<SyncLogEntry> {
        entries
            .rev()
            .filter(|e| self.matches(e))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sink
// ═══════════════════════════════════════════════════════════════════════════════

/// Storage behind the audit log.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &SyncLogEntry) -> Result<(), AuditError>;

    fn query(&self, filter: &AuditFilter) -> Result<Vec<SyncLogEntry>, AuditError>;

    fn name(&self) -> &'static str;
}

/// Process-local sink.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    entries: RwLock<Vec<SyncLogEntry>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append(&self, entry: &SyncLogEntry) -> Result<(), AuditError> {
        self.entries.write().push(entry.clone());
        Ok(())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<SyncLogEntry>, AuditError> {
        Ok(filter.apply(self.entries.read().iter()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Log
// ═══════════════════════════════════════════════════════════════════════════════

/// Append-only sync audit log over a pluggable sink.
#[derive(Clone)]
pub struct SyncAuditLog {
    sink: Arc<dyn AuditSink>,
}

impl SyncAuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryAuditSink::new()))
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    /// Append an entry. Storage failures are returned, never retried here.
    pub fn append(&self, entry: SyncLogEntry) -> Result<(), AuditError> {
        let result = self.sink.append(&entry);
        let status = if result.is_ok() { "ok" } else { "failed" };
        counter!("menugate_audit_writes_total", "status" => status).increment(1);
        result
    }

    pub fn query(&self, filter: &AuditFilter) -> Result<Vec<SyncLogEntry>, AuditError> {
        self.sink.query(filter)
    }

    /// Number of failed attempts within `window` of now.
    pub fn recent_failures(&self, window: Duration) -> Result<u64, AuditError> {
        let window = chrono::Duration::from_std(window)
            .map_err(|e| AuditError::QueryFailed(e.to_string()))?;
        let since = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let failures = self.sink.query(&AuditFilter::new().failures_only().since(since))?;
        Ok(failures.len() as u64)
    }
}

impl std::fmt::Debug for SyncAuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncAuditLog")
            .field("sink", &self.sink.name())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
