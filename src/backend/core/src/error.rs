//! Crate-wide error handling for the Menugate service.
//!
//! This module provides:
//! - A single `MenugateError` carrying a stable, machine-readable `ErrorCode`
//! - HTTP status code mapping for API responses
//! - User-friendly messages vs detailed internal messages
//! - Severity-based logging with tracing integration
//! - Metrics integration for error tracking
//!
//! Component errors (`ConfigError`, `ResolveError`, `SnapshotError`,
//! `AuditError`) convert into `MenugateError` at the request boundary.
//!
//! # Usage
//!
//! ```rust,ignore
//! use menugate_core::error::{MenugateError, Result};
//!
//! async fn permissions(role: RoleId) -> Result<Json<EffectivePermissionSet>> {
//!     let set = gate.effective_permissions(&role)?;
//!     Ok(Json((*set).clone()))
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::audit::AuditError;
use crate::rbac::{ConfigError, ResolveError, SnapshotError};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Menugate operations.
pub type Result<T> = std::result::Result<T, MenugateError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authorization (1000-1099)
    Forbidden,
    MissingRole,
    RoleNotFound,
    MenuNotFound,
    RouteNotFound,

    // Permission configuration (1100-1199)
    ConfigFault,
    InvalidChange,

    // Snapshot (1200-1299)
    SnapshotLoadFailed,
    SnapshotSourceMissing,

    // Audit (1300-1399)
    AuditWriteFailed,
    AuditQueryFailed,

    // Validation (4100-4199)
    ValidationError,
    InvalidInput,

    // Service configuration (5000-5099)
    ConfigurationError,
    InvalidConfiguration,

    // Internal (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::Forbidden => 1000,
            Self::MissingRole => 1001,
            Self::RoleNotFound => 1002,
            Self::MenuNotFound => 1003,
            Self::RouteNotFound => 1004,

            Self::ConfigFault => 1100,
            Self::InvalidChange => 1101,

            Self::SnapshotLoadFailed => 1200,
            Self::SnapshotSourceMissing => 1201,

            Self::AuditWriteFailed => 1300,
            Self::AuditQueryFailed => 1301,

            Self::ValidationError => 4100,
            Self::InvalidInput => 4101,

            Self::ConfigurationError => 5000,
            Self::InvalidConfiguration => 5001,

            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::Forbidden | Self::MissingRole => StatusCode::FORBIDDEN,

            Self::RoleNotFound | Self::MenuNotFound | Self::RouteNotFound => StatusCode::NOT_FOUND,

            Self::SnapshotSourceMissing => StatusCode::CONFLICT,

            Self::InvalidChange | Self::ValidationError | Self::InvalidInput => {
                StatusCode::UNPROCESSABLE_ENTITY
            }

            Self::AuditQueryFailed => StatusCode::SERVICE_UNAVAILABLE,

            Self::ConfigFault
            | Self::SnapshotLoadFailed
            | Self::AuditWriteFailed
            | Self::ConfigurationError
            | Self::InvalidConfiguration
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "authorization",
            1100..=1199 => "permission_config",
            1200..=1299 => "snapshot",
            1300..=1399 => "audit",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            _ => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging and alerting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors and normal denials
    Low,
    /// Operational issues (rejected changes, unreadable audit log)
    Medium,
    /// Broken configuration
    High,
    /// Requires immediate attention
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::Forbidden
            | ErrorCode::MissingRole
            | ErrorCode::RoleNotFound
            | ErrorCode::MenuNotFound
            | ErrorCode::RouteNotFound
            | ErrorCode::ValidationError
            | ErrorCode::InvalidInput => Self::Low,

            ErrorCode::InvalidChange
            | ErrorCode::SnapshotSourceMissing
            | ErrorCode::AuditQueryFailed => Self::Medium,

            ErrorCode::ConfigFault
            | ErrorCode::SnapshotLoadFailed
            | ErrorCode::AuditWriteFailed
            | ErrorCode::ConfigurationError
            | ErrorCode::InvalidConfiguration => Self::High,

            ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID (role, menu, route)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.context.is_empty() && self.entity_id.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for the service boundary.
#[derive(Error, Debug)]
pub struct MenugateError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    details: ErrorDetails,

    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for MenugateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl MenugateError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn role_not_found(role: impl fmt::Display) -> Self {
        let role = role.to_string();
        Self::new(ErrorCode::RoleNotFound, format!("Role not found: {}", role))
            .with_details(ErrorDetails::new().with_entity("role", role))
    }

    pub fn menu_not_found(menu: impl fmt::Display) -> Self {
        let menu = menu.to_string();
        Self::new(ErrorCode::MenuNotFound, format!("Menu module not found: {}", menu))
            .with_details(ErrorDetails::new().with_entity("menu", menu))
    }

    pub fn route_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(ErrorCode::RouteNotFound, format!("No menu module serves route: {}", path))
            .with_details(ErrorDetails::new().with_entity("route", path))
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "menugate_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false for errors
    pub success: bool,

    pub error: ErrorInfo,
}

/// Detailed error information for API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,

    pub numeric_code: u32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,

    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&MenugateError> for ErrorResponse {
    fn from(error: &MenugateError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                details: (!error.details.is_empty()).then(|| error.details.clone()),
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for MenugateError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════════════════

impl From<ConfigError> for MenugateError {
    fn from(error: ConfigError) -> Self {
        let (code, user_msg) = match &error {
            e if e.is_hierarchy_fault() => (
                ErrorCode::ConfigFault,
                "Role hierarchy configuration is invalid",
            ),
            ConfigError::OrphanedPermission { .. } => (
                ErrorCode::ConfigFault,
                "Permission configuration references a missing menu",
            ),
            _ => (
                ErrorCode::InvalidChange,
                "The configuration change failed validation",
            ),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<ResolveError> for MenugateError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::Config(config) => config.into(),
            ResolveError::RoleNotFound(role) => Self::role_not_found(role),
            ResolveError::RoleInactive(role) => {
                Self::forbidden(format!("Role is inactive: {}", role))
                    .with_details(ErrorDetails::new().with_entity("role", role.to_string()))
            }
        }
    }
}

impl From<SnapshotError> for MenugateError {
    fn from(error: SnapshotError) -> Self {
        match error {
            SnapshotError::Config(config) => config.into(),
            SnapshotError::NoSource => Self::new(
                ErrorCode::SnapshotSourceMissing,
                "No snapshot source file is configured",
            ),
            other => Self::with_internal(
                ErrorCode::SnapshotLoadFailed,
                "Failed to load configuration snapshot",
                other.to_string(),
            )
            .with_source(other),
        }
    }
}

impl From<AuditError> for MenugateError {
    fn from(error: AuditError) -> Self {
        let code = match &error {
            AuditError::WriteFailed(_) => ErrorCode::AuditWriteFailed,
            AuditError::QueryFailed(_) => ErrorCode::AuditQueryFailed,
        };
        Self::with_internal(code, "Audit log is unavailable", error.to_string()).with_source(error)
    }
}

impl From<tokio::task::JoinError> for MenugateError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "Background task failed",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<config::ConfigError> for MenugateError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (ErrorCode::ConfigurationError, "Configuration error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
