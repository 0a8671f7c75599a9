//! Per-credential quota enforcement.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use lexflow_auth::TenantContext;
use lexflow_ratelimit::RateLimitDecision;

use crate::error::ApiError;
use crate::state::AppState;

/// Consult the limiter after authentication and authorization. Refusals
/// return 429 with `Retry-After`; allowed requests get the
/// `X-RateLimit-*` headers of the tightest window appended.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(context) = request.extensions().get::<TenantContext>().cloned() else {
        return next.run(request).await;
    };

    let decision = state
        .limiter
        .try_consume(context.credential_id, &context.rate_limits)
        .await;

    if !decision.allowed {
        tracing::warn!(
            target: "security",
            tenant = %context.tenant,
            credential_id = %context.credential_id,
            window = %decision.window,
            "Request rejected: rate limit exceeded"
        );
        return ApiError::RateLimited(decision).into_response();
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

/// Write the `X-RateLimit-{Limit,Remaining,Reset,Window}` headers.
pub fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let entries = [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_at.timestamp().to_string()),
        ("x-ratelimit-window", decision.window.label().to_string()),
    ];
    for (name, value) in entries {
        if let Ok(v) = HeaderValue::from_str(&value) {
            headers.insert(name, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lexflow_ratelimit::WindowKind;

    #[test]
    fn headers_carry_the_decision() {
        let decision = RateLimitDecision {
            allowed: true,
            limit: 100,
            remaining: 99,
            window: WindowKind::Burst,
            reset_at: Utc::now(),
        };
        let mut headers = HeaderMap::new();
        apply_headers(&mut headers, &decision);

        assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "100");
        assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "99");
        assert_eq!(headers.get("x-ratelimit-window").unwrap(), "burst");
        assert!(headers.contains_key("x-ratelimit-reset"));
    }
}
