//! Group membership synchronization.
//!
//! The [`GroupSyncEngine`] diffs each role's mapped groups against the
//! memberships held in an external [`GroupMembershipStore`], applies every
//! addition and removal independently, and audits each attempt.
//!
//! # Usage
//!
//! ```rust,ignore
//! let engine = GroupSyncEngine::new(store, membership, audit_log, SyncConfig::default());
//! let report = engine.sync_role(&"admin".into());
//! for failure in report.failures() {
//!     eprintln!("{failure}");
//! }
//! ```

pub mod engine;
pub mod membership;
pub mod report;

pub use engine::GroupSyncEngine;
pub use membership::{GroupMembershipStore, InMemoryMembershipStore, MembershipError};
pub use report::{SyncOperationError, SyncOperationOutcome, SyncReport};

use serde::{Deserialize, Serialize};

/// Sync engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Extra attempts for an operation that failed transiently.
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,

    /// Worker threads used by a full sync.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

fn default_transient_retries() -> u32 {
    2
}

fn default_parallelism() -> usize {
    4
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            transient_retries: default_transient_retries(),
            parallelism: default_parallelism(),
        }
    }
}
