//! Axum middleware that enforces menu access on requests.
//!
//! The caller's role is read from the `x-role` header (set by the upstream
//! identity layer). A denied request gets a 403, a configuration fault a 500.
//! On success a [`MenuAccessContext`] is inserted into the request extensions.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

use super::gate::{AuthorizationGate, GateDecision, GateState};
use super::models::{MenuKey, RoleId};

/// Header carrying the caller's role identifier.
pub const ROLE_HEADER: &str = "x-role";

// ═══════════════════════════════════════════════════════════════════════════════
// Access Context (extracted in handlers)
// ═══════════════════════════════════════════════════════════════════════════════

/// Verified menu access for the current request.
#[derive(Debug, Clone)]
pub struct MenuAccessContext {
    pub role: RoleId,
    /// The menu module the request was authorized against.
    pub menu: MenuKey,
    pub cache_hit: bool,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for MenuAccessContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<MenuAccessContext>()
            .cloned()
            .ok_or_else(|| {
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "MISSING_ACCESS_CONTEXT",
                    "Menu access context not available. Ensure RequireMenuLayer is applied.",
                )
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum Target {
    Menu(MenuKey),
    Route,
}

/// Layer that wraps services with menu access enforcement.
///
/// # Example
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/learning/words", get(list_words))
///     .layer(RequireMenuLayer::menu(gate.clone(), "word-learning"));
///
/// // or authorize by the module serving the request path
/// let app = Router::new()
///     .nest("/learning", learning_routes())
///     .layer(RequireMenuLayer::route(gate));
/// ```
#[derive(Clone)]
pub struct RequireMenuLayer {
    gate: Arc<AuthorizationGate>,
    target: Target,
}

impl RequireMenuLayer {
    /// Require access to a fixed menu key.
    pub fn menu(gate: Arc<AuthorizationGate>, menu: impl Into<MenuKey>) -> Self {
        Self {
            gate,
            target: Target::Menu(menu.into()),
        }
    }

    /// Require access to the module whose url is the longest prefix of the path.
    pub fn route(gate: Arc<AuthorizationGate>) -> Self {
        Self {
            gate,
            target: Target::Route,
        }
    }
}

impl<S> Layer<S> for RequireMenuLayer {
    type Service = RequireMenuService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireMenuService {
            inner,
            gate: self.gate.clone(),
            target: self.target.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Service that enforces menu access per request.
#[derive(Clone)]
pub struct RequireMenuService<S> {
    inner: S,
    gate: Arc<AuthorizationGate>,
    target: Target,
}

impl<S> Service<Request<Body>> for RequireMenuService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let gate = self.gate.clone();
        let target = self.target.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let role = request
                .headers()
                .get(ROLE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(RoleId::new);

            let Some(role) = role else {
                return Ok(error_response(
                    StatusCode::FORBIDDEN,
                    "FORBIDDEN",
                    "Role header required for this resource",
                ));
            };

            let decision = match &target {
                Target::Menu(menu) => gate.authorize(&role, menu),
                Target::Route => gate.authorize_route(&role, request.uri().path()),
            };

            if let Some(response) = rejection(&decision) {
                return Ok(response);
            }

            if let Some(menu) = decision.menu {
                request.extensions_mut().insert(MenuAccessContext {
                    role,
                    menu,
                    cache_hit: decision.cache_hit,
                });
            }

            inner.call(request).await
        })
    }
}

/// The response for a non-authorized decision, if any.
fn rejection(decision: &GateDecision) -> Option<Response> {
    match decision.state {
        GateState::Authorized => None,
        GateState::Error => Some(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "CONFIG_FAULT",
            &decision
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "Authorization configuration fault".to_string()),
        )),
        _ => {
            warn!(
                role = %decision.role,
                menu = decision.menu.as_ref().map(MenuKey::as_str).unwrap_or("-"),
                reason = decision.reason.map(|r| r.as_str()).unwrap_or("-"),
                "Menu access denied"
            );
            Some(error_response(
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "You do not have access to this menu",
            ))
        }
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = serde_json::json!({
        "success": false,
        "error": {
            "code": code,
            "message": message,
        }
    });
    (status, Json(body)).into_response()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
