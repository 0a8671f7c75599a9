//! HTTP-level idempotency for write routes.
//!
//! Runs after the validation middleware: only requests that already
//! passed body/path validation reach this layer, so a key is never
//! claimed by (and never replays) a validation failure.
//!
//! The fingerprint is SHA-256 over the *canonical* JSON of the request
//! body (sorted keys, compact separators), so clients that re-serialize
//! semantically identical bodies still replay instead of conflicting.
//! Non-JSON bodies hash their raw bytes.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Duration;
use lexflow_auth::TenantContext;
use lexflow_db::models::{IdempotentInsert, IdempotentRequest, NewIdempotentRequest};
use lexflow_webhooks::canonical_json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::validation::MAX_REQUEST_BODY;
use crate::state::AppState;

pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";
pub const IDEMPOTENCY_REPLAYED_HEADER: &str = "x-idempotency-replayed";

/// Bindings live for 24 hours.
const IDEMPOTENCY_TTL_HOURS: i64 = 24;

/// Responses past this size are returned but not cached for replay.
const MAX_RESPONSE_BODY: usize = 8_388_608;

/// Fingerprint a request body. Canonical JSON when the body parses,
/// raw bytes otherwise.
#[must_use]
pub fn fingerprint_body(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => hasher.update(canonical_json(&value).as_bytes()),
        Err(_) => hasher.update(body),
    }
    hex::encode(hasher.finalize())
}

pub async fn idempotency_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // Only write methods carry idempotency keys.
    if *request.method() != axum::http::Method::POST
        && *request.method() != axum::http::Method::PUT
    {
        return next.run(request).await;
    }

    let Some(context) = request.extensions().get::<TenantContext>().cloned() else {
        return next.run(request).await;
    };

    // No header: plain non-idempotent write.
    let key = match request
        .headers()
        .get(IDEMPOTENCY_HEADER)
        .map(|v| v.to_str().map(str::trim).map(ToString::to_string))
    {
        None => return next.run(request).await,
        Some(Ok(k)) if !k.is_empty() => k,
        _ => {
            return ApiError::Validation(vec![crate::validation::FieldError {
                field: IDEMPOTENCY_HEADER.to_string(),
                message: "idempotency key must be a UUID".to_string(),
            }])
            .into_response();
        }
    };

    // The key is client-supplied but must be UUID-shaped.
    if Uuid::parse_str(&key).is_err() {
        return ApiError::Validation(vec![crate::validation::FieldError {
            field: IDEMPOTENCY_HEADER.to_string(),
            message: "idempotency key must be a UUID".to_string(),
        }])
        .into_response();
    }

    let method = request.method().to_string();
    let endpoint = request.uri().path().to_string();

    let (parts, body) = request.into_parts();
    let body_bytes = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(target: "gateway", error = %e, "Failed to buffer request body");
            return ApiError::Validation(vec![crate::validation::FieldError {
                field: "body".to_string(),
                message: "request body unreadable or too large".to_string(),
            }])
            .into_response();
        }
    };
    let request_hash = fingerprint_body(&body_bytes);

    let insert = IdempotentRequest::try_insert(
        &state.db,
        NewIdempotentRequest {
            tenant: context.tenant.as_str().to_string(),
            idempotency_key: key.clone(),
            request_hash: request_hash.clone(),
            endpoint: endpoint.clone(),
            http_method: method.clone(),
            ttl: Duration::hours(IDEMPOTENCY_TTL_HOURS),
        },
    )
    .await;

    let insert = match insert {
        Ok(i) => i,
        Err(e) => return ApiError::from(e).into_response(),
    };

    match insert {
        IdempotentInsert::Inserted(row) => {
            let request =
                Request::from_parts(parts, Body::from(body_bytes.to_vec()));
            let response = next.run(request).await;
            capture_and_rebuild(&state, row.id, response).await
        }
        IdempotentInsert::Existing(existing) => {
            if !existing.matches(&method, &endpoint, &request_hash) {
                return ApiError::IdempotencyConflict(
                    "idempotency key was already used with a different request".to_string(),
                )
                .into_response();
            }

            match existing.response_status {
                Some(status) => replay(&existing, status),
                None if existing.is_processing_stale() => {
                    // The first holder died mid-request; free the key so
                    // the client's retry can claim it.
                    if let Ok(true) = IdempotentRequest::delete_stale(&state.db, existing.id).await
                    {
                        tracing::warn!(
                            target: "gateway",
                            idempotency_key = %key,
                            "Reclaimed stale idempotent request"
                        );
                    }
                    ApiError::IdempotencyConflict(
                        "a previous attempt with this key was abandoned; retry".to_string(),
                    )
                    .into_response()
                }
                None => ApiError::IdempotencyConflict(
                    "a request with this idempotency key is still being processed".to_string(),
                )
                .into_response(),
            }
        }
    }
}

/// Capture the handler's response for replay, then return it unchanged.
/// The store happens in a spawned task; its failure never affects the
/// user-visible result.
///
/// 5xx responses release the claim instead of capturing: a transient
/// dependency failure must not be replayed to the client's retry after
/// the dependency recovers.
async fn capture_and_rebuild(state: &AppState, row_id: Uuid, response: Response) -> Response {
    let status = response.status();

    if status.is_server_error() {
        let db = state.db.clone();
        tokio::spawn(async move {
            if let Err(e) = IdempotentRequest::delete_stale(&db, row_id).await {
                tracing::error!(
                    target: "gateway",
                    error = %e,
                    "Failed to release idempotency claim after server error"
                );
            }
        });
        return response;
    }

    let (parts, body) = response.into_parts();

    let bytes = match axum::body::to_bytes(body, MAX_RESPONSE_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(target: "gateway", error = %e, "Failed to buffer response body");
            return Response::from_parts(parts, Body::empty());
        }
    };

    let db = state.db.clone();
    let stored = bytes.to_vec();
    let status_code = status.as_u16() as i16;
    tokio::spawn(async move {
        if let Err(e) = IdempotentRequest::capture_response(&db, row_id, status_code, &stored).await
        {
            tracing::error!(
                target: "gateway",
                error = %e,
                "Failed to capture idempotent response"
            );
        }
    });

    Response::from_parts(parts, Body::from(bytes))
}

/// Rebuild the stored response byte-for-byte.
fn replay(existing: &IdempotentRequest, status: i16) -> Response {
    let status =
        StatusCode::from_u16(status as u16).unwrap_or(StatusCode::OK);
    let body = existing.response_body.clone().unwrap_or_default();

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response.headers_mut().insert(
        IDEMPOTENCY_REPLAYED_HEADER,
        HeaderValue::from_static("true"),
    );

    tracing::info!(
        target: "gateway",
        idempotency_key = %existing.idempotency_key,
        "Replaying cached idempotent response"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_key_order_insensitive() {
        let a = br#"{"x": 1, "y": 2}"#;
        let b = br#"{"y":2,"x":1}"#;
        assert_eq!(fingerprint_body(a), fingerprint_body(b));
    }

    #[test]
    fn fingerprint_differs_for_different_bodies() {
        assert_ne!(
            fingerprint_body(br#"{"x":1}"#),
            fingerprint_body(br#"{"x":2}"#)
        );
    }

    #[test]
    fn non_json_bodies_hash_raw_bytes() {
        let sig = fingerprint_body(b"not json");
        assert_eq!(sig.len(), 64);
        assert_ne!(sig, fingerprint_body(b"not json "));
    }
}
