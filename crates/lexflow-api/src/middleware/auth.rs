//! API-key authentication and scope authorization.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use lexflow_auth::{AuthFailure, TenantContext};
use lexflow_core::Scope;

use crate::error::ApiError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Authenticate the request and attach a [`TenantContext`] extension.
/// Scope checks run separately in [`authorize_middleware`], which knows
/// each route's requirement.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(presented) = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
    else {
        return ApiError::MissingApiKey.into_response();
    };

    let client_ip = client_ip(&request);

    match state.resolver.resolve(&presented, &client_ip, &[]).await {
        Ok(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(failure) => map_failure(&failure).into_response(),
    }
}

/// Authorize the already-authenticated request: the route's required
/// scopes must be a subset of the credential's grant.
pub async fn authorize_middleware(request: Request<Body>, next: Next) -> Response {
    let Some(context) = request.extensions().get::<TenantContext>() else {
        // Only reachable if the auth layer is missing from the stack.
        return ApiError::Internal("authorization ran without authentication".to_string())
            .into_response();
    };

    let required = route_scopes(request.method().as_str(), request.uri().path());
    if !context.has_scopes(required) {
        tracing::warn!(
            target: "security",
            tenant = %context.tenant,
            credential_id = %context.credential_id,
            required = ?required,
            "Request rejected: insufficient scopes"
        );
        return ApiError::Forbidden("credential lacks the required scopes".to_string())
            .into_response();
    }

    next.run(request).await
}

/// Scope requirements per route. Paths are matched on their literal
/// segments with `{id}`-style positions wildcarded.
#[must_use]
pub fn route_scopes(method: &str, path: &str) -> &'static [Scope] {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (method, segments.as_slice()) {
        ("POST", ["v1", "demographics"]) | ("POST", ["v1", "demographics", "batch"]) => {
            &[Scope::DemographicsWrite]
        }
        ("GET", ["v1", "demographics"]) | ("GET", ["v1", "demographics", _]) => {
            &[Scope::DemographicsRead]
        }
        ("PUT", ["v1", "demographics", _]) => &[Scope::DemographicsWrite],
        ("DELETE", ["v1", "demographics", _]) => &[Scope::DemographicsDelete],
        ("POST", ["v1", "documents", "upload-url"])
        | ("POST", ["v1", "documents", "batch-upload-urls"]) => &[Scope::FilesUpload],
        ("GET", ["v1", "documents", _, "status"]) => &[Scope::DemographicsRead],
        ("POST", ["v1", "admin", "api-keys"]) => &[Scope::DemographicsAdmin],
        ("GET", ["v1", "queues"]) => &[Scope::DemographicsRead],
        _ => &[],
    }
}

fn map_failure(failure: &AuthFailure) -> ApiError {
    match failure {
        AuthFailure::Malformed
        | AuthFailure::NotFound
        | AuthFailure::HashMismatch
        | AuthFailure::NotActive(_)
        | AuthFailure::Expired => {
            tracing::info!(target: "security", reason = %failure, "Credential rejected");
            ApiError::InvalidApiKey("credential rejected".to_string())
        }
        AuthFailure::IpNotAllowed => {
            ApiError::Forbidden("source address not allowed".to_string())
        }
        AuthFailure::InsufficientScope { .. } => {
            ApiError::Forbidden("credential lacks the required scopes".to_string())
        }
        AuthFailure::Internal(detail) => ApiError::Unavailable(detail.clone()),
    }
}

/// Direct connection address; `unknown` when the server was not set up
/// with connect info (router unit tests).
fn client_ip(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ci| ci.0.ip().to_string())
}
