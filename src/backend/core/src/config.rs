//! Configuration management.
//!
//! Sources, later overriding earlier:
//! 1. built-in defaults (every field has one)
//! 2. an optional TOML file
//! 3. environment variables prefixed `MENUGATE`, `__` separating sections,
//!    e.g. `MENUGATE__SERVER__PORT=9000` or `MENUGATE__CACHE__TTL=10m`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::health::HealthConfig;
use crate::rbac::DEFAULT_MAX_DEPTH;
use crate::sync::SyncConfig;
use crate::telemetry::TelemetryConfig;

const ENV_PREFIX: &str = "MENUGATE";

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub observability: TelemetryConfig,

    #[serde(default)]
    pub hierarchy: HierarchyConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub snapshot: SnapshotConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Longest allowed ancestor chain, the role itself included
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshot file (`.toml` or `.json`). Without one the server starts empty.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// How often the server re-reads `path`; zero disables refresh
    #[serde(with = "humantime_serde", default = "default_refresh_interval")]
    pub refresh_interval: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: None,
            refresh_interval: default_refresh_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// JSON-lines audit file. Without one the log is kept in memory.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_depth() -> usize { DEFAULT_MAX_DEPTH }
fn default_refresh_interval() -> Duration { Duration::from_secs(60) }

impl Config {
    /// Load configuration from the environment only.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::build(None)
    }

    /// Load from a TOML file, then apply environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        Self::build(Some(path.as_ref()))
    }

    fn build(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.hierarchy.max_depth, 10);
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.health.error_threshold, 5);
        assert!(config.snapshot.path.is_none());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9100

[hierarchy]
max_depth = 4

[cache]
ttl = "30s"

[snapshot]
path = "config/snapshot.toml"
refresh_interval = "5m"

[health]
failure_window = "12h"
error_threshold = 2
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.hierarchy.max_depth, 4);
        assert_eq!(config.cache.ttl, Duration::from_secs(30));
        assert_eq!(config.snapshot.refresh_interval, Duration::from_secs(300));
        assert_eq!(config.health.failure_window, Duration::from_secs(12 * 3600));
        assert_eq!(config.health.error_threshold, 2);
        assert_eq!(config.observability.logging.level, "info");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::from_file("/nonexistent/menugate.toml").is_err());
    }
}
