//! Capability-URL issuance and upload validation.

use chrono::{DateTime, Utc};
use lexflow_core::TenantId;
use lexflow_db::models::{DocumentStatus, DocumentUpload, NewDocumentUpload};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::BlobError;
use crate::path::blob_path;
use crate::store::{ObjectStore, UPLOAD_URL_TTL};

/// A minted upload capability.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedUpload {
    pub upload_url: String,
    pub blob_path: String,
    pub correlation_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Parameters for issuing one upload URL.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub content_type: String,
    pub demographic_id: Option<Uuid>,
    pub max_size_mb: i32,
}

/// Outcome of validating an uploaded blob against its limits.
#[derive(Debug, Clone, Serialize)]
pub struct UploadValidation {
    pub valid: bool,
    pub file_size_bytes: Option<i64>,
    /// Size in MB, rounded to two decimals.
    pub file_size_mb: Option<f64>,
    pub error: Option<String>,
}

impl UploadValidation {
    fn ok(size_bytes: i64) -> Self {
        Self {
            valid: true,
            file_size_bytes: Some(size_bytes),
            file_size_mb: Some(mb_two_decimals(size_bytes)),
            error: None,
        }
    }

    fn too_large(size_bytes: i64, limit_mb: i32) -> Self {
        Self {
            valid: false,
            file_size_bytes: Some(size_bytes),
            file_size_mb: Some(mb_two_decimals(size_bytes)),
            error: Some(format!(
                "too-large: {:.2} MB exceeds the {limit_mb} MB limit",
                mb_two_decimals(size_bytes)
            )),
        }
    }

    fn missing() -> Self {
        Self {
            valid: false,
            file_size_bytes: None,
            file_size_mb: None,
            error: Some("blob not found".to_string()),
        }
    }

    /// Whether the failure was the distinguished size-limit rejection.
    #[must_use]
    pub fn is_too_large(&self) -> bool {
        self.error.as_deref().is_some_and(|e| e.starts_with("too-large"))
    }
}

fn mb_two_decimals(size_bytes: i64) -> f64 {
    let mb = size_bytes as f64 / (1024.0 * 1024.0);
    (mb * 100.0).round() / 100.0
}

/// Issues capability URLs and tracks upload lifecycle state.
#[derive(Clone)]
pub struct CapabilityIssuer {
    store: Arc<dyn ObjectStore>,
    pool: PgPool,
}

impl CapabilityIssuer {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, pool: PgPool) -> Self {
        Self { store, pool }
    }

    /// Mint a 24-hour, write-and-create-only upload URL and record its
    /// descriptor in state `pending`.
    pub async fn issue_upload(
        &self,
        tenant: &TenantId,
        request: UploadRequest,
    ) -> Result<IssuedUpload, BlobError> {
        let correlation_id = Uuid::new_v4();
        let expires_at = Utc::now() + chrono::Duration::from_std(UPLOAD_URL_TTL).unwrap_or_default();
        let path = blob_path(
            tenant,
            Utc::now().date_naive(),
            correlation_id,
            &request.filename,
        );

        self.store.ensure_container().await?;
        let upload_url = self
            .store
            .issue_upload_url(&path, &request.content_type, expires_at)
            .await?;

        DocumentUpload::create(
            &self.pool,
            NewDocumentUpload {
                correlation_id,
                tenant: tenant.as_str().to_string(),
                demographic_id: request.demographic_id,
                blob_path: path.clone(),
                content_type: request.content_type,
                max_size_mb: request.max_size_mb,
                url_expires_at: expires_at,
            },
        )
        .await?;

        tracing::info!(
            tenant = %tenant,
            correlation_id = %correlation_id,
            blob_path = %path,
            "Issued upload capability URL"
        );

        Ok(IssuedUpload {
            upload_url,
            blob_path: path,
            correlation_id,
            expires_at,
        })
    }

    /// Mint a read-only download URL for an existing blob.
    pub async fn issue_download(
        &self,
        blob_path: &str,
        ttl: Duration,
    ) -> Result<String, BlobError> {
        self.store.issue_download_url(blob_path, ttl).await
    }

    /// Check an uploaded blob against its size limit.
    pub async fn validate_uploaded(
        &self,
        blob_path: &str,
        max_size_mb: i32,
    ) -> Result<UploadValidation, BlobError> {
        let Some(meta) = self.store.head(blob_path).await? else {
            return Ok(UploadValidation::missing());
        };

        let limit_bytes = i64::from(max_size_mb) * 1024 * 1024;
        if meta.size_bytes > limit_bytes {
            return Ok(UploadValidation::too_large(meta.size_bytes, max_size_mb));
        }

        Ok(UploadValidation::ok(meta.size_bytes))
    }

    /// Tenant-scoped descriptor lookup.
    pub async fn get_status(
        &self,
        tenant: &TenantId,
        correlation_id: Uuid,
    ) -> Result<Option<DocumentUpload>, BlobError> {
        Ok(DocumentUpload::find_by_correlation(&self.pool, tenant.as_str(), correlation_id).await?)
    }

    /// Resolve an object-store event path to its descriptor.
    pub async fn descriptor_for_path(
        &self,
        blob_path: &str,
    ) -> Result<Option<DocumentUpload>, BlobError> {
        Ok(DocumentUpload::find_by_blob_path(&self.pool, blob_path).await?)
    }

    /// Advance a descriptor's lifecycle.
    pub async fn update_status(
        &self,
        correlation_id: Uuid,
        status: DocumentStatus,
        file_size_bytes: Option<i64>,
        error: Option<&str>,
    ) -> Result<(), BlobError> {
        Ok(DocumentUpload::set_status(&self.pool, correlation_id, status, file_size_bytes, error)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mb_rounding_is_two_decimals() {
        assert_eq!(mb_two_decimals(1_048_576), 1.0);
        assert_eq!(mb_two_decimals(1_300_000), 1.24);
        assert_eq!(mb_two_decimals(0), 0.0);
    }

    #[test]
    fn too_large_is_distinguished() {
        let v = UploadValidation::too_large(12 * 1024 * 1024, 10);
        assert!(!v.valid);
        assert!(v.is_too_large());
        assert_eq!(v.file_size_mb, Some(12.0));

        let missing = UploadValidation::missing();
        assert!(!missing.valid);
        assert!(!missing.is_too_large());
    }

    #[test]
    fn ok_validation_carries_size() {
        let v = UploadValidation::ok(2_097_152);
        assert!(v.valid);
        assert_eq!(v.file_size_mb, Some(2.0));
        assert!(v.error.is_none());
    }
}
