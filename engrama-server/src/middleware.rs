//! Request admission pipeline
//!
//! One fixed chain of gates, in order:
//! 1. public paths pass through everything;
//! 2. the sliding-window rate limiter, keyed by API key else client
//!    address;
//! 3. `/v1/channels/*` requires the admin token, compared in constant
//!    time, fail-closed when none is configured;
//! 4. everything else requires a valid API key, whose scope rides the
//!    request as an [`AuthContext`].

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use tracing::warn;

use engrama_core::EngramaError;

use crate::error::ApiError;
use crate::rate_limit::LimiterDecision;
use crate::state::AppState;

/// Header carrying the memory-operation credential
pub const API_KEY_HEADER: &str = "x-api-key";
/// Header carrying the channel-management credential
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Paths that bypass every gate
const PUBLIC_PATHS: &[&str] = &["/", "/health"];

/// Authenticated scope attached to memory-path requests.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Tenant the key belongs to
    pub tenant_id: String,
    /// Project the key belongs to
    pub project_id: String,
    /// End-user binding of a user-scoped key; `None` for project-scoped
    /// keys
    pub bound_user_id: Option<String>,
}

/// The admission middleware. Mounted once around the whole router.
pub async fn admission(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if PUBLIC_PATHS.contains(&path.as_str()) || path.starts_with("/docs") {
        return next.run(request).await;
    }

    let identity = limiter_identity(&request);
    if state.limiter.check(&identity).await == LimiterDecision::Limited {
        return ApiError(EngramaError::RateLimited(format!(
            "limit is {} requests per minute",
            state.limiter.max_rpm()
        )))
        .into_response();
    }

    if path.starts_with("/v1/channels") {
        return match check_admin_token(&state, request.headers()) {
            Ok(()) => next.run(request).await,
            Err(e) => ApiError(e).into_response(),
        };
    }

    let Some(secret) = header_value(request.headers(), API_KEY_HEADER) else {
        return ApiError(EngramaError::Unauthorized(
            "missing API key; provide it in the X-API-Key header".to_string(),
        ))
        .into_response();
    };

    match state.channels.verify_api_key(&secret).await {
        Ok(Some(key)) => {
            request.extensions_mut().insert(AuthContext {
                tenant_id: key.tenant_id,
                project_id: key.project_id,
                bound_user_id: key.user_id,
            });
            next.run(request).await
        }
        Ok(None) => {
            warn!(path = %path, "invalid API key attempt");
            ApiError(EngramaError::Unauthorized("invalid API key".to_string())).into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}

fn check_admin_token(state: &AppState, headers: &HeaderMap) -> Result<(), EngramaError> {
    // Fail-closed: with no admin token configured, channel management is
    // unreachable.
    let Some(expected) = state.config.admin_token.as_deref() else {
        warn!("channel management request rejected: no admin token configured");
        return Err(EngramaError::Forbidden(
            "channel management is disabled: no admin token configured".to_string(),
        ));
    };

    let Some(provided) = header_value(headers, ADMIN_TOKEN_HEADER) else {
        return Err(EngramaError::Unauthorized(
            "missing admin token; provide it in the X-Admin-Token header".to_string(),
        ));
    };

    if constant_time_eq(&provided, expected) {
        Ok(())
    } else {
        warn!("invalid admin token attempt");
        Err(EngramaError::Forbidden("invalid admin token".to_string()))
    }
}

/// Digest-equality comparison: timing depends on the digest, never on how
/// many leading bytes of the token matched.
fn constant_time_eq(a: &str, b: &str) -> bool {
    Sha256::digest(a.as_bytes()) == Sha256::digest(b.as_bytes())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// Limiter identity: the API key when present, else the client address.
fn limiter_identity(request: &Request) -> String {
    if let Some(key) = header_value(request.headers(), API_KEY_HEADER) {
        return key;
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ci| ci.0.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_comparison_matches_equality() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(!constant_time_eq("secret", "secre_"));
        assert!(!constant_time_eq("", "secret"));
    }
}
