//! Health Check System
//!
//! Per-check status for permission-config integrity and group sync health,
//! with Kubernetes-style liveness and readiness probes.

mod check;
mod checker;
mod routes;

pub use check::*;
pub use checker::*;
pub use routes::*;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Health check configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Window over which failed sync attempts are counted
    #[serde(with = "humantime_serde", default = "default_failure_window")]
    pub failure_window: Duration,
    /// Failures in the window above which sync health is `error`
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u64,
    /// Whether `/health` includes per-check details
    #[serde(default = "default_include_details")]
    pub include_details: bool,
}

fn default_failure_window() -> Duration {
    DEFAULT_FAILURE_WINDOW
}

fn default_error_threshold() -> u64 {
    DEFAULT_ERROR_THRESHOLD
}

fn default_include_details() -> bool {
    true
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_window: default_failure_window(),
            error_threshold: default_error_threshold(),
            include_details: default_include_details(),
        }
    }
}

/// Health service running all registered checks
pub struct HealthService {
    config: HealthConfig,
    checkers: Vec<Arc<dyn HealthChecker>>,
    started_at: Instant,
}

impl HealthService {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            checkers: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    pub fn register_checker(&mut self, checker: Arc<dyn HealthChecker>) {
        self.checkers.push(checker);
    }

    pub fn with_checker(mut self, checker: Arc<dyn HealthChecker>) -> Self {
        self.register_checker(checker);
        self
    }

    /// Run every check in registration order.
    pub fn check_health(&self) -> HealthReport {
        let components = self.checkers.iter().map(|checker| checker.check()).collect();

        let mut report = HealthReport::new()
            .with_uptime(self.started_at.elapsed())
            .with_components(components);

        if !self.config.include_details {
            for component in &mut report.components {
                component.issues.clear();
                component.metadata.clear();
            }
        }
        report
    }

    pub fn is_ready(&self) -> bool {
        self.check_health().is_operational()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl std::fmt::Debug for HealthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.checkers.iter().map(|c| c.name()).collect();
        f.debug_struct("HealthService")
            .field("config", &self.config)
            .field("checkers", &names)
            .finish()
    }
}
