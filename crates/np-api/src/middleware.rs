//! ngo-portal/crates/np-api/src/middleware.rs Middleware
//!
//! Bearer-token guard for mutating requests and the CORS policy for the
//! separately hosted front-end.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use np_core::error::AppError;
use np_core::traits::AuthProvider;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::error::ApiError;

/// Rejects POST/PUT/DELETE requests without a valid `Authorization: Bearer`
/// header. Reads pass through, as does everything when auth is disabled.
pub async fn require_bearer(
    State(auth): State<Arc<dyn AuthProvider>>,
    request: Request,
    next: Next,
) -> Response {
    let read_only = matches!(*request.method(), Method::GET | Method::HEAD | Method::OPTIONS);
    if read_only || !auth.is_enabled() {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());

    let Some(token) = token else {
        return ApiError::from(AppError::Unauthorized("missing bearer token".into())).into_response();
    };
    if !auth.verify_bearer(&token).await {
        warn!(method = %request.method(), uri = %request.uri(), "rejected bearer token");
        return ApiError::from(AppError::Unauthorized("invalid bearer token".into())).into_response();
    }
    next.run(request).await
}

/// CORS for the public site. With `allow_any_origin` off only same-origin
/// requests are served.
pub fn cors_policy(allow_any_origin: bool) -> CorsLayer {
    if !allow_any_origin {
        return CorsLayer::new();
    }
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(3600))
}
