//! Request and response DTOs for the `/v1` surface.

use chrono::{DateTime, Utc};
use lexflow_core::RateLimitProfile;
use lexflow_db::models::{DemographicRecord, DocumentStatus, RecordStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::validation::validate_phone;

/// Maximum records per batch create.
pub const MAX_BATCH_RECORDS: usize = 100;

/// Maximum documents per batch upload-URL request.
pub const MAX_BATCH_DOCUMENTS: usize = 50;

/// Maximum page size on listings.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Claimant classification. Anything else is rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ClaimantType {
    Adult,
    Minor,
    Estate,
    Deceased,
}

/// A single demographics submission. The declared fields are validated;
/// everything else rides along opaquely in `extra` and is stored as
/// submitted.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateDemographicRequest {
    #[validate(length(min = 1, max = 200, message = "law_firm must be 1-200 characters"))]
    pub law_firm: String,

    #[validate(length(min = 1, max = 100, message = "firstname must be 1-100 characters"))]
    pub firstname: String,

    #[validate(length(min = 1, max = 100, message = "lastname must be 1-100 characters"))]
    pub lastname: String,

    #[validate(email(message = "email must be a valid address"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[validate(custom(function = validate_phone))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[validate(length(min = 1, max = 200, message = "primarylawfirm must be 1-200 characters"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primarylawfirm: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimanttype: Option<ClaimantType>,

    /// Opaque domain fields (demographics/settlement schema).
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}

/// Per-batch options.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct BatchOptions {
    #[serde(default)]
    pub notify_on_completion: bool,
}

/// Batch create request. Items stay raw here; each is validated like a
/// single create so one bad item cannot fail the batch.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BatchCreateRequest {
    #[schema(value_type = Vec<Object>)]
    pub records: Vec<Value>,
    #[serde(default)]
    pub batch_options: Option<BatchOptions>,
    /// Optional per-batch completion webhook target.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Listing parameters.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[schema(value_type = Option<String>)]
    pub filter_status: Option<RecordStatus>,
    pub search: Option<String>,
}

/// Upload-URL request.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    #[validate(length(min = 1, max = 255, message = "fileName must be 1-255 characters"))]
    pub file_name: String,

    #[validate(length(min = 1, max = 127, message = "contentType must be 1-127 characters"))]
    pub content_type: String,

    /// Defaults to 100, the ceiling.
    #[serde(rename = "maxFileSizeMB")]
    #[validate(range(min = 1, max = 100, message = "maxFileSizeMB must be 1-100"))]
    pub max_file_size_mb: Option<i32>,

    #[serde(default)]
    pub demographic_id: Option<Uuid>,
}

/// Batch upload-URL request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BatchUploadUrlsRequest {
    pub documents: Vec<UploadUrlRequest>,
}

/// Admin key issuance request.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(min = 1, message = "at least one scope is required"))]
    pub scopes: Vec<String>,

    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub rate_limits: Option<RateLimitProfile>,

    #[validate(range(min = 1, max = 3650, message = "expires_in_days must be 1-3650"))]
    #[serde(default)]
    pub expires_in_days: Option<i64>,

    #[serde(default)]
    pub allowed_ips: Option<Vec<String>>,
}

// ── Responses ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateDemographicResponse {
    pub id: Uuid,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchItemResult {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub error: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchMetadata {
    pub total: usize,
    pub accepted: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchCreateResponse {
    pub results: Vec<BatchItemResult>,
    pub metadata: BatchMetadata,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
    pub total: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListDemographicsResponse {
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<Value>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GetDemographicResponse {
    #[schema(value_type = Object)]
    pub data: Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateDemographicResponse {
    pub id: Uuid,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteDemographicResponse {
    pub id: Uuid,
    pub deleted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    pub upload_url: String,
    pub blob_name: String,
    pub correlation_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchUploadItemResult {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<UploadUrlResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub error: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentStatusResponse {
    #[schema(value_type = String)]
    pub status: DocumentStatus,
    /// MB, two decimals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyResponse {
    #[schema(value_type = Object)]
    pub api_key: lexflow_db::models::ApiCredential,
    /// Plaintext key. Shown exactly once.
    pub key: String,
}

/// A record as the API returns it: the opaque payload with the envelope
/// fields layered on top.
#[must_use]
pub fn record_to_api(record: &DemographicRecord) -> Value {
    let mut out = match &record.payload {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = Map::new();
            map.insert("payload".to_string(), other.clone());
            map
        }
    };
    out.insert("id".to_string(), Value::String(record.id.to_string()));
    out.insert("tenant".to_string(), Value::String(record.tenant.clone()));
    out.insert(
        "status".to_string(),
        serde_json::to_value(record.status).unwrap_or(Value::Null),
    );
    out.insert(
        "processing".to_string(),
        serde_json::to_value(record.processing).unwrap_or(Value::Null),
    );
    out.insert(
        "created_at".to_string(),
        serde_json::to_value(record.created_at).unwrap_or(Value::Null),
    );
    out.insert(
        "updated_at".to_string(),
        serde_json::to_value(record.updated_at).unwrap_or(Value::Null),
    );
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_request_keeps_unknown_fields() {
        let body = json!({
            "law_firm": "Smith & Associates",
            "firstname": "John",
            "lastname": "Doe",
            "email": "j@d.com",
            "phone": "5551234567",
            "claimanttype": "Adult",
            "injurydate": "2023-04-01",
            "settlementamount": 1200.50
        });
        let req: CreateDemographicRequest = serde_json::from_value(body.clone()).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.extra["injurydate"], "2023-04-01");

        // Round trip reproduces the submitted payload.
        let back = serde_json::to_value(&req).unwrap();
        assert_eq!(back, body);
    }

    #[test]
    fn create_request_rejects_unknown_claimant_type() {
        let body = json!({
            "law_firm": "x", "firstname": "a", "lastname": "b",
            "claimanttype": "Corporation"
        });
        assert!(serde_json::from_value::<CreateDemographicRequest>(body).is_err());
    }

    #[test]
    fn create_request_validates_email_and_phone() {
        let body = json!({
            "law_firm": "x", "firstname": "a", "lastname": "b",
            "email": "not-an-email", "phone": "12"
        });
        let req: CreateDemographicRequest = serde_json::from_value(body).unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.errors().contains_key("email"));
        assert!(errors.errors().contains_key("phone"));
    }

    #[test]
    fn record_to_api_layers_envelope_over_payload() {
        let record = DemographicRecord {
            id: Uuid::new_v4(),
            tenant: "acme".to_string(),
            payload: json!({"firstname": "John"}),
            status: RecordStatus::Active,
            processing: lexflow_db::models::ProcessingState::Completed,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        let api = record_to_api(&record);
        assert_eq!(api["firstname"], "John");
        assert_eq!(api["tenant"], "acme");
        assert_eq!(api["status"], "active");
        assert_eq!(api["id"], record.id.to_string());
    }
}
