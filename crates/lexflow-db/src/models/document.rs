//! Document upload descriptors.
//!
//! One row per issued capability URL, keyed by the correlation id the
//! client received. The blob path is unique so the blob-event reactor can
//! resolve an object-store event back to its descriptor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::DbError;

/// Upload lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "document_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Uploaded,
    Processing,
    Completed,
    Failed,
}

/// A capability-URL descriptor row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DocumentUpload {
    pub correlation_id: Uuid,
    pub tenant: String,
    /// Optional link to an existing demographic record.
    pub demographic_id: Option<Uuid>,
    pub blob_path: String,
    pub content_type: String,
    pub max_size_mb: i32,
    pub status: DocumentStatus,
    pub file_size_bytes: Option<i64>,
    pub error: Option<String>,
    /// When the issued upload URL stops working.
    pub url_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data for a freshly issued upload.
#[derive(Debug, Clone)]
pub struct NewDocumentUpload {
    pub correlation_id: Uuid,
    pub tenant: String,
    pub demographic_id: Option<Uuid>,
    pub blob_path: String,
    pub content_type: String,
    pub max_size_mb: i32,
    pub url_expires_at: DateTime<Utc>,
}

impl DocumentUpload {
    /// Record a newly issued capability URL in state `pending`.
    pub async fn create(pool: &PgPool, data: NewDocumentUpload) -> Result<Self, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            INSERT INTO document_uploads
                (correlation_id, tenant, demographic_id, blob_path, content_type,
                 max_size_mb, url_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            ",
        )
        .bind(data.correlation_id)
        .bind(&data.tenant)
        .bind(data.demographic_id)
        .bind(&data.blob_path)
        .bind(&data.content_type)
        .bind(data.max_size_mb)
        .bind(data.url_expires_at)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Tenant-scoped status lookup.
    pub async fn find_by_correlation(
        pool: &PgPool,
        tenant: &str,
        correlation_id: Uuid,
    ) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT * FROM document_uploads
            WHERE correlation_id = $1 AND tenant = $2
            ",
        )
        .bind(correlation_id)
        .bind(tenant)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Resolve an object-store event path back to its descriptor.
    pub async fn find_by_blob_path(pool: &PgPool, blob_path: &str) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT * FROM document_uploads WHERE blob_path = $1
            ",
        )
        .bind(blob_path)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Advance the lifecycle, optionally recording size or error.
    pub async fn set_status(
        pool: &PgPool,
        correlation_id: Uuid,
        status: DocumentStatus,
        file_size_bytes: Option<i64>,
        error: Option<&str>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r"
            UPDATE document_uploads
            SET status = $2,
                file_size_bytes = COALESCE($3, file_size_bytes),
                error = $4,
                updated_at = NOW()
            WHERE correlation_id = $1
            ",
        )
        .bind(correlation_id)
        .bind(status)
        .bind(file_size_bytes)
        .bind(error)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DocumentStatus::Uploaded).unwrap(),
            "\"uploaded\""
        );
    }
}
