//! HTTP middleware: content-type enforcement, request ids and request metrics.

use axum::{
    extract::{MatchedPath, Request},
    http::{
        header::{HeaderName, HeaderValue, CONTENT_TYPE},
        Method, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::telemetry::RequestDurationHistogram;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// POST, PUT and PATCH requests that carry a body must be JSON.
///
/// Bodiless posts (sync triggers, reload) are allowed without a content type.
pub async fn content_type_validation(req: Request, next: Next) -> Response {
    if matches!(*req.method(), Method::POST | Method::PUT | Method::PATCH) {
        if let Some(content_type) = req.headers().get(CONTENT_TYPE) {
            let ct_str = content_type.to_str().unwrap_or("");
            if !ct_str.contains("application/json") {
                return (
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    Json(serde_json::json!({
                        "success": false,
                        "error": "Content-Type must be application/json",
                        "error_code": "UNSUPPORTED_MEDIA_TYPE"
                    })),
                )
                    .into_response();
            }
        }
    }
    next.run(req).await
}

/// Echo or assign `x-request-id` and set standard response headers.
pub async fn request_headers(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if let Ok(val) = HeaderValue::from_str(&request_id) {
        let _ = headers.try_insert(HeaderName::from_static(REQUEST_ID_HEADER), val);
    }
    let _ = headers.try_insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );

    response
}

/// Record duration and count per matched route.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let timer = RequestDurationHistogram::start(req.method().as_str(), &path);

    let response = next.run(req).await;
    timer.finish(response.status().as_u16());
    response
}

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;

/// Clamp an audit query limit to `1..=1000`, defaulting to 100.
pub fn validate_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_AUDIT_LIMIT).clamp(1, MAX_AUDIT_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_limit_defaults() {
        assert_eq!(validate_limit(None), 100);
    }

    #[test]
    fn test_validate_limit_clamps() {
        assert_eq!(validate_limit(Some(0)), 1);
        assert_eq!(validate_limit(Some(50_000)), 1000);
        assert_eq!(validate_limit(Some(25)), 25);
    }
}
