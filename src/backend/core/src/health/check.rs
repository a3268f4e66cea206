//! Health check definitions and status types.
//!
//! This module provides:
//! - `HealthStatus` enum representing check states
//! - `ComponentHealth` struct for individual check reports
//! - `HealthReport` struct for aggregated service health
//!
//! # Health Status Semantics
//!
//! - **Healthy**: nothing to report
//! - **Warning**: operational, but something needs attention (orphaned
//!   permission rows, a few recent sync failures)
//! - **Error**: some requests will fail or memberships are drifting
//!   (hierarchy faults, sync failures above the threshold)
//!
//! # Example
//!
//! ```rust,ignore
//! use menugate_core::health::{ComponentHealth, HealthReport};
//!
//! let sync = ComponentHealth::warning("group_sync")
//!     .with_message("2 failed sync operations in the last 24h")
//!     .with_metadata("failures", 2);
//!
//! let report = HealthReport::new().with_component(sync);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const SERVICE_NAME: &str = "menugate";

// ═══════════════════════════════════════════════════════════════════════════════
// Health Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Health status of a check or of the whole service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Warning,
    Error,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Healthy or warning.
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Healthy | Self::Warning)
    }

    /// Combine two statuses, returning the worse one.
    pub fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Self::Error, _) | (_, Self::Error) => Self::Error,
            (Self::Warning, _) | (_, Self::Warning) => Self::Warning,
            _ => Self::Healthy,
        }
    }

    /// Convert to HTTP status code.
    pub fn to_http_status(&self) -> u16 {
        match self {
            Self::Healthy | Self::Warning => 200,
            Self::Error => 503,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Component Health
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a single health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Check name
    pub name: String,

    pub status: HealthStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Time taken by the check in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,

    pub checked_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Individual findings (fault descriptions, failed entries)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

impl ComponentHealth {
    fn with_initial_status(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            message: None,
            latency_ms: None,
            checked_at: Utc::now(),
            metadata: HashMap::new(),
            issues: Vec::new(),
        }
    }

    pub fn healthy(name: impl Into<String>) -> Self {
        Self::with_initial_status(name, HealthStatus::Healthy)
    }

    pub fn warning(name: impl Into<String>) -> Self {
        Self::with_initial_status(name, HealthStatus::Warning)
    }

    pub fn error(name: impl Into<String>) -> Self {
        Self::with_initial_status(name, HealthStatus::Error)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = Some(latency.as_millis() as u64);
        self
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }

    pub fn with_issues<I, S>(mut self, issues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.issues.extend(issues.into_iter().map(Into::into));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), v);
        }
        self
    }

    /// Raise the status to at least `status`.
    pub fn escalate(mut self, status: HealthStatus) -> Self {
        self.status = self.status.combine(status);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Health Report
// ═══════════════════════════════════════════════════════════════════════════════

/// Aggregated health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Worst status across checks
    pub status: HealthStatus,

    pub service: String,

    pub version: String,

    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentHealth>,

    pub summary: HealthSummary,
}

impl HealthReport {
    pub fn new() -> Self {
        Self {
            status: HealthStatus::Healthy,
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            uptime_secs: None,
            components: Vec::new(),
            summary: HealthSummary::default(),
        }
    }

    pub fn with_component(mut self, component: ComponentHealth) -> Self {
        self.status = self.status.combine(component.status);
        self.components.push(component);
        self.update_summary();
        self
    }

    pub fn with_components(mut self, components: Vec<ComponentHealth>) -> Self {
        for component in components {
            self.status = self.status.combine(component.status);
            self.components.push(component);
        }
        self.update_summary();
        self
    }

    pub fn with_uptime(mut self, uptime: Duration) -> Self {
        self.uptime_secs = Some(uptime.as_secs());
        self
    }

    pub fn is_operational(&self) -> bool {
        self.status.is_operational()
    }

    pub fn http_status(&self) -> u16 {
        self.status.to_http_status()
    }

    pub fn get_component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.name == name)
    }

    fn update_summary(&mut self) {
        let count = |status: HealthStatus| self.components.iter().filter(|c| c.status == status).count();
        self.summary = HealthSummary {
            total: self.components.len(),
            healthy: count(HealthStatus::Healthy),
            warning: count(HealthStatus::Warning),
            error: count(HealthStatus::Error),
        };
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary counts for a health report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub warning: usize,
    pub error: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Readiness and Liveness
// ═══════════════════════════════════════════════════════════════════════════════

/// Liveness probe response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub alive: bool,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

impl LivenessResponse {
    pub fn alive() -> Self {
        Self {
            alive: true,
            service: SERVICE_NAME.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Readiness probe response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unready_components: Vec<String>,
}

impl ReadinessResponse {
    /// Build from health report. Warnings do not make the service unready.
    pub fn from_health_report(report: &HealthReport) -> Self {
        let unready: Vec<String> = report
            .components
            .iter()
            .filter(|c| !c.status.is_operational())
            .map(|c| c.name.clone())
            .collect();

        Self {
            ready: unready.is_empty(),
            service: report.service.clone(),
            timestamp: Utc::now(),
            reason: (!unready.is_empty()).then(|| "One or more checks report errors".to_string()),
            unready_components: unready,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
