//! The gateway error envelope.
//!
//! Every error response is `{error, code, details?, requestId}`. The
//! request id comes from a task-local scoped by the correlation
//! middleware, so error construction sites never have to thread it.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use lexflow_core::ErrorCode;
use lexflow_ratelimit::RateLimitDecision;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::validation::FieldError;

tokio::task_local! {
    /// Correlation id of the request currently being served.
    pub static CURRENT_CORRELATION: Uuid;
}

/// JSON error body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    #[schema(value_type = String)]
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    #[serde(rename = "requestId")]
    pub request_id: String,
}

/// Gateway failure modes, each mapping to a status and error code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing API key")]
    MissingApiKey,

    #[error("invalid API key: {0}")]
    InvalidApiKey(String),

    /// Credential is valid but not allowed here (scope or source address).
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limit exceeded")]
    RateLimited(RateLimitDecision),

    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("idempotency conflict: {0}")]
    IdempotencyConflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Batch exceeds the item limit.
    #[error("batch too large: {got} items, limit {limit}")]
    BatchTooLarge { got: usize, limit: usize },

    /// A dependency is temporarily unavailable on a synchronous path.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingApiKey | ApiError::InvalidApiKey(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::IdempotencyConflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BatchTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            ApiError::MissingApiKey => ErrorCode::MissingApiKey,
            ApiError::InvalidApiKey(_) | ApiError::Forbidden(_) => ErrorCode::InvalidApiKey,
            ApiError::RateLimited(_) => ErrorCode::RateLimitExceeded,
            ApiError::Validation(_) | ApiError::BatchTooLarge { .. } => ErrorCode::ValidationError,
            ApiError::IdempotencyConflict(_) => ErrorCode::IdempotencyConflict,
            ApiError::NotFound(_) => ErrorCode::NotFound,
            ApiError::Unavailable(_) | ApiError::Internal(_) => ErrorCode::InternalError,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Validation(fields) => serde_json::to_value(fields).ok(),
            ApiError::RateLimited(decision) => Some(serde_json::json!({
                "window": decision.window.label(),
                "limit": decision.limit,
                "reset_at": decision.reset_at,
            })),
            _ => None,
        }
    }

    fn message(&self) -> String {
        match self {
            // Internal details are logged, never surfaced.
            ApiError::Internal(_) => "An unexpected error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(target: "gateway", error = %detail, "Internal error");
        }

        let request_id = CURRENT_CORRELATION
            .try_with(|id| id.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let body = ErrorBody {
            error: self.message(),
            code: self.code(),
            details: self.details(),
            request_id,
        };

        let mut response = (self.status(), Json(body)).into_response();

        if let ApiError::RateLimited(decision) = &self {
            let headers = response.headers_mut();
            if let Ok(v) = HeaderValue::from_str(&decision.retry_after_secs().to_string()) {
                headers.insert(axum::http::header::RETRY_AFTER, v);
            }
            crate::middleware::rate_limit::apply_headers(headers, decision);
        }

        response
    }
}

impl From<lexflow_db::DbError> for ApiError {
    fn from(e: lexflow_db::DbError) -> Self {
        if e.is_connection_error() {
            ApiError::Unavailable("database unavailable".to_string())
        } else {
            ApiError::Internal(e.to_string())
        }
    }
}

impl From<lexflow_queue::QueueError> for ApiError {
    fn from(e: lexflow_queue::QueueError) -> Self {
        match e {
            lexflow_queue::QueueError::Unavailable(msg) => ApiError::Unavailable(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<lexflow_blob::BlobError> for ApiError {
    fn from(e: lexflow_blob::BlobError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_code_pairings() {
        assert_eq!(ApiError::MissingApiKey.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::MissingApiKey.code(), ErrorCode::MissingApiKey);
        assert_eq!(
            ApiError::NotFound("demographic record").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::IdempotencyConflict("x".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::BatchTooLarge { got: 150, limit: 100 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::BatchTooLarge { got: 150, limit: 100 }.code(),
            ErrorCode::ValidationError
        );
    }

    #[test]
    fn internal_message_is_opaque() {
        let e = ApiError::Internal("connection string leaked".to_string());
        assert_eq!(e.message(), "An unexpected error occurred");
    }
}
