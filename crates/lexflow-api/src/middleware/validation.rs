//! Request validation middleware (pipeline step 5).
//!
//! Write-route bodies are parsed and validated here, before the
//! idempotency layer runs: a rejected request must never claim its
//! idempotency key, otherwise the 400 gets captured under the key and
//! the client's corrected resubmission conflicts forever.
//!
//! Batch *items* are deliberately not validated here — a batch whose
//! items individually fail is still a valid batch request (the handler
//! reports per-item results); only the batch shape and size are
//! checked. Handlers keep their own checks for the paths shared with
//! batch items.

use axum::body::Body;
use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use lexflow_core::Scope;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::{parse_body, validate_request};
use crate::models::{
    BatchCreateRequest, BatchUploadUrlsRequest, CreateApiKeyRequest, CreateDemographicRequest,
    UploadUrlRequest, MAX_BATCH_DOCUMENTS, MAX_BATCH_RECORDS,
};
use crate::validation::{validate_money_precision, FieldError};

/// Write bodies past this size are rejected before buffering more.
pub(crate) const MAX_REQUEST_BODY: usize = 1_048_576;

/// Which request DTO a write route carries.
enum BodyShape {
    CreateDemographic,
    BatchDemographics,
    UpdateDemographic,
    UploadUrl,
    BatchUploadUrls,
    CreateApiKey,
}

pub async fn validation_middleware(request: Request<Body>, next: Next) -> Response {
    if *request.method() != Method::POST && *request.method() != Method::PUT {
        return next.run(request).await;
    }

    let shape = match body_gate(request.method(), request.uri().path()) {
        Ok(Some(shape)) => shape,
        Ok(None) => return next.run(request).await,
        Err(e) => return e.into_response(),
    };

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(target: "gateway", error = %e, "Failed to buffer request body");
            return ApiError::Validation(vec![FieldError {
                field: "body".to_string(),
                message: "request body unreadable or too large".to_string(),
            }])
            .into_response();
        }
    };

    if let Err(e) = check_body(&shape, &bytes) {
        return e.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes.to_vec())))
        .await
}

/// Path-level validation and DTO dispatch. `{id}`-style segments that
/// must be UUIDs are rejected here, for the same no-claim reason as
/// bodies.
fn body_gate(method: &Method, path: &str) -> Result<Option<BodyShape>, ApiError> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (method.as_str(), segments.as_slice()) {
        ("POST", ["v1", "demographics"]) => Ok(Some(BodyShape::CreateDemographic)),
        ("POST", ["v1", "demographics", "batch"]) => Ok(Some(BodyShape::BatchDemographics)),
        ("PUT", ["v1", "demographics", id]) => {
            Uuid::parse_str(id).map_err(|_| {
                ApiError::Validation(vec![FieldError {
                    field: "id".to_string(),
                    message: "id must be a UUID".to_string(),
                }])
            })?;
            Ok(Some(BodyShape::UpdateDemographic))
        }
        ("POST", ["v1", "documents", "upload-url"]) => Ok(Some(BodyShape::UploadUrl)),
        ("POST", ["v1", "documents", "batch-upload-urls"]) => {
            Ok(Some(BodyShape::BatchUploadUrls))
        }
        ("POST", ["v1", "admin", "api-keys"]) => Ok(Some(BodyShape::CreateApiKey)),
        _ => Ok(None),
    }
}

fn check_body(shape: &BodyShape, bytes: &[u8]) -> Result<(), ApiError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        ApiError::Validation(vec![FieldError {
            field: "body".to_string(),
            message: format!("invalid JSON: {e}"),
        }])
    })?;

    match shape {
        BodyShape::CreateDemographic => {
            let request: CreateDemographicRequest = parse_body(&value)?;
            validate_request(&request, &value)
        }
        BodyShape::BatchDemographics => {
            let request: BatchCreateRequest = parse_body(&value)?;
            if request.records.len() > MAX_BATCH_RECORDS {
                return Err(ApiError::BatchTooLarge {
                    got: request.records.len(),
                    limit: MAX_BATCH_RECORDS,
                });
            }
            if request.records.is_empty() {
                return Err(ApiError::Validation(vec![FieldError {
                    field: "records".to_string(),
                    message: "batch must contain at least one record".to_string(),
                }]));
            }
            Ok(())
        }
        BodyShape::UpdateDemographic => {
            if !value.is_object() {
                return Err(ApiError::Validation(vec![FieldError {
                    field: "body".to_string(),
                    message: "partial record must be a JSON object".to_string(),
                }]));
            }
            let errors = validate_money_precision(&value);
            if errors.is_empty() {
                Ok(())
            } else {
                Err(ApiError::Validation(errors))
            }
        }
        BodyShape::UploadUrl => {
            let request: UploadUrlRequest = parse_body(&value)?;
            validate_request(&request, &value)
        }
        BodyShape::BatchUploadUrls => {
            let request: BatchUploadUrlsRequest = parse_body(&value)?;
            if request.documents.len() > MAX_BATCH_DOCUMENTS {
                return Err(ApiError::BatchTooLarge {
                    got: request.documents.len(),
                    limit: MAX_BATCH_DOCUMENTS,
                });
            }
            if request.documents.is_empty() {
                return Err(ApiError::Validation(vec![FieldError {
                    field: "documents".to_string(),
                    message: "batch must contain at least one document".to_string(),
                }]));
            }
            Ok(())
        }
        BodyShape::CreateApiKey => {
            let request: CreateApiKeyRequest = parse_body(&value)?;
            validate_request(&request, &value)?;
            for raw in &request.scopes {
                if raw.parse::<Scope>().is_err() {
                    return Err(ApiError::Validation(vec![FieldError {
                        field: "scopes".to_string(),
                        message: format!("unknown scope: {raw}"),
                    }]));
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::{post, put};
    use axum::{middleware, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(reached: Arc<AtomicBool>) -> Router {
        let handler = move || {
            let reached = reached.clone();
            async move {
                reached.store(true, Ordering::SeqCst);
                "ok"
            }
        };
        Router::new()
            .route("/v1/demographics", post(handler.clone()))
            .route("/v1/demographics/batch", post(handler.clone()))
            .route("/v1/demographics/:id", put(handler))
            .layer(middleware::from_fn(validation_middleware))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Value) -> axum::response::Response {
        app.oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn invalid_body_is_rejected_before_the_handler() {
        let reached = Arc::new(AtomicBool::new(false));
        let response = send(
            app(reached.clone()),
            "POST",
            "/v1/demographics",
            json!({"law_firm": "x", "lastname": "Doe"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!reached.load(Ordering::SeqCst), "handler must not run");
    }

    #[tokio::test]
    async fn valid_body_passes_through_intact() {
        let reached = Arc::new(AtomicBool::new(false));
        let response = send(
            app(reached.clone()),
            "POST",
            "/v1/demographics",
            json!({"law_firm": "Smith & Associates", "firstname": "John", "lastname": "Doe"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn oversize_batch_is_rejected() {
        let reached = Arc::new(AtomicBool::new(false));
        let records: Vec<Value> = (0..101).map(|_| json!({})).collect();
        let response = send(
            app(reached.clone()),
            "POST",
            "/v1/demographics/batch",
            json!({ "records": records }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn batch_items_are_not_pre_validated() {
        // An invalid item is the handler's per-item concern.
        let reached = Arc::new(AtomicBool::new(false));
        let response = send(
            app(reached.clone()),
            "POST",
            "/v1/demographics/batch",
            json!({ "records": [{"not": "a record"}] }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn put_with_malformed_id_is_rejected() {
        let reached = Arc::new(AtomicBool::new(false));
        let response = send(
            app(reached.clone()),
            "PUT",
            "/v1/demographics/not-a-uuid",
            json!({"firstname": "Jane"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn money_precision_is_enforced_on_updates() {
        let reached = Arc::new(AtomicBool::new(false));
        let id = Uuid::new_v4();
        let response = send(
            app(reached.clone()),
            "PUT",
            &format!("/v1/demographics/{id}"),
            json!({"settlementamount": 10.123456}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn non_json_body_is_rejected() {
        let reached = Arc::new(AtomicBool::new(false));
        let response = app(reached.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/demographics")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!reached.load(Ordering::SeqCst));
    }
}
