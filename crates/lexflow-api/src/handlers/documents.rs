//! Document capability-URL handlers.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use lexflow_auth::TenantContext;
use lexflow_blob::UploadRequest;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::{parse_body, validate_request};
use crate::models::{
    BatchUploadItemResult, BatchUploadUrlsRequest, DocumentStatusResponse, UploadUrlRequest,
    UploadUrlResponse, MAX_BATCH_DOCUMENTS,
};
use crate::state::AppState;
use crate::validation::FieldError;

/// Issue one upload capability URL.
#[utoipa::path(
    post,
    path = "/v1/documents/upload-url",
    tag = "Documents",
    responses(
        (status = 200, description = "Capability URL issued", body = UploadUrlResponse),
        (status = 400, description = "Validation failed"),
    )
)]
pub async fn upload_url(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Json(body): Json<Value>,
) -> Result<Json<UploadUrlResponse>, ApiError> {
    let request: UploadUrlRequest = parse_body(&body)?;
    validate_request(&request, &body)?;

    let issued = issue_one(&state, &context, &request).await?;
    Ok(Json(issued))
}

/// Issue up to 50 upload URLs; per-item results.
#[utoipa::path(
    post,
    path = "/v1/documents/batch-upload-urls",
    tag = "Documents",
    responses((status = 200, description = "Per-item results"))
)]
pub async fn batch_upload_urls(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Json(body): Json<Value>,
) -> Result<Json<Vec<BatchUploadItemResult>>, ApiError> {
    let request: BatchUploadUrlsRequest = parse_body(&body)?;

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

    let mut results = Vec::with_capacity(request.documents.len());
    for (index, item) in request.documents.iter().enumerate() {
        let outcome = match validate_request(item, &Value::Null) {
            Ok(()) => issue_one(&state, &context, item).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(issued) => results.push(BatchUploadItemResult {
                index,
                result: Some(issued),
                error: None,
            }),
            Err(e) => results.push(BatchUploadItemResult {
                index,
                result: None,
                error: Some(match e {
                    ApiError::Validation(fields) => {
                        serde_json::to_value(fields).unwrap_or(Value::Null)
                    }
                    other => Value::String(other.to_string()),
                }),
            }),
        }
    }

    Ok(Json(results))
}

/// Upload lifecycle status by correlation id.
#[utoipa::path(
    get,
    path = "/v1/documents/{correlation_id}/status",
    tag = "Documents",
    responses(
        (status = 200, description = "Upload status", body = DocumentStatusResponse),
        (status = 404, description = "Unknown correlation id"),
    )
)]
pub async fn status(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Path(correlation_id): Path<String>,
) -> Result<Json<DocumentStatusResponse>, ApiError> {
    let correlation_id = Uuid::parse_str(&correlation_id).map_err(|_| {
        ApiError::Validation(vec![FieldError {
            field: "correlationId".to_string(),
            message: "correlation id must be a UUID".to_string(),
        }])
    })?;

    let descriptor = state
        .capabilities
        .get_status(&context.tenant, correlation_id)
        .await?
        .ok_or(ApiError::NotFound("document upload"))?;

    Ok(Json(DocumentStatusResponse {
        status: descriptor.status,
        file_size: descriptor.file_size_bytes.map(mb_two_decimals),
        error: descriptor.error,
    }))
}

async fn issue_one(
    state: &AppState,
    context: &TenantContext,
    request: &UploadUrlRequest,
) -> Result<UploadUrlResponse, ApiError> {
    let issued = state
        .capabilities
        .issue_upload(
            &context.tenant,
            UploadRequest {
                filename: request.file_name.clone(),
                content_type: request.content_type.clone(),
                demographic_id: request.demographic_id,
                max_size_mb: request.max_file_size_mb.unwrap_or(100),
            },
        )
        .await?;

    Ok(UploadUrlResponse {
        upload_url: issued.upload_url,
        blob_name: issued.blob_path,
        correlation_id: issued.correlation_id,
        expires_at: issued.expires_at,
    })
}

fn mb_two_decimals(size_bytes: i64) -> f64 {
    let mb = size_bytes as f64 / (1024.0 * 1024.0);
    (mb * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mb_conversion_rounds_to_two_decimals() {
        assert_eq!(mb_two_decimals(1_048_576), 1.0);
        assert_eq!(mb_two_decimals(1_100_000), 1.05);
    }
}
