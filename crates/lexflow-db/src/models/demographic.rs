//! Demographic submission records.
//!
//! The domain payload (claimant demographics and settlement fields) is
//! stored opaquely as JSONB; the envelope columns carry identity, tenant
//! ownership, lifecycle status, and the asynchronous processing state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::DbError;

/// Lifecycle status of a record. `deleted` rows stay in place (soft
/// delete) and are excluded from tenant reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "record_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Active,
    Inactive,
    Archived,
    Deleted,
}

/// Asynchronous processing state, advanced only by the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "processing_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    Accepted,
    Processing,
    Completed,
    Failed,
}

/// A demographic submission record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DemographicRecord {
    /// Unique identifier, minted by the gateway at creation.
    pub id: Uuid,

    /// Owning tenant. Fixed to the authenticated tenant at creation and
    /// immutable thereafter.
    pub tenant: String,

    /// Opaque domain payload.
    pub payload: serde_json::Value,

    /// Lifecycle status.
    pub status: RecordStatus,

    /// Worker-side processing state.
    pub processing: ProcessingState,

    /// Principal that created the record (credential name).
    pub created_by: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Data required to insert a new record.
#[derive(Debug, Clone)]
pub struct NewDemographicRecord {
    pub id: Uuid,
    pub tenant: String,
    pub payload: serde_json::Value,
    pub created_by: Option<String>,
}

/// Listing parameters for the tenant-scoped record index.
#[derive(Debug, Clone, Default)]
pub struct ListRecords {
    pub limit: i64,
    pub offset: i64,
    pub status: Option<RecordStatus>,
    /// Case-insensitive substring match over the JSON payload text.
    pub search: Option<String>,
}

impl DemographicRecord {
    /// Insert a freshly accepted record.
    pub async fn insert(pool: &PgPool, data: NewDemographicRecord) -> Result<Self, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            INSERT INTO demographic_records (id, tenant, payload, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            ",
        )
        .bind(data.id)
        .bind(&data.tenant)
        .bind(&data.payload)
        .bind(&data.created_by)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Worker-side upsert keyed on the record id.
    ///
    /// A redelivered queue message must not create a duplicate row; the
    /// second application updates the payload and refreshes `updated_at`.
    pub async fn upsert(
        pool: &PgPool,
        id: Uuid,
        tenant: &str,
        payload: &serde_json::Value,
    ) -> Result<Self, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            INSERT INTO demographic_records (id, tenant, payload)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET payload = EXCLUDED.payload,
                updated_at = NOW()
            WHERE demographic_records.tenant = EXCLUDED.tenant
            RETURNING *
            ",
        )
        .bind(id)
        .bind(tenant)
        .bind(payload)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Advance the processing state.
    pub async fn set_processing_state(
        pool: &PgPool,
        id: Uuid,
        state: ProcessingState,
    ) -> Result<(), DbError> {
        sqlx::query(
            r"
            UPDATE demographic_records
            SET processing = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(state)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(())
    }

    /// Fetch a record visible to the given tenant. Soft-deleted rows and
    /// other tenants' rows are both absent.
    pub async fn find_by_id(
        pool: &PgPool,
        tenant: &str,
        id: Uuid,
    ) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT * FROM demographic_records
            WHERE id = $1 AND tenant = $2 AND status <> 'deleted'
            ",
        )
        .bind(id)
        .bind(tenant)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Tenant-scoped listing with total count.
    pub async fn list(
        pool: &PgPool,
        tenant: &str,
        params: &ListRecords,
    ) -> Result<(Vec<Self>, i64), DbError> {
        let search_pattern = params.search.as_ref().map(|s| format!("%{s}%"));

        let rows = sqlx::query_as::<_, Self>(
            r"
            SELECT * FROM demographic_records
            WHERE tenant = $1
              AND status <> 'deleted'
              AND ($2::record_status IS NULL OR status = $2)
              AND ($3::text IS NULL OR payload::text ILIKE $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            ",
        )
        .bind(tenant)
        .bind(params.status)
        .bind(&search_pattern)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        let (total,): (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*) FROM demographic_records
            WHERE tenant = $1
              AND status <> 'deleted'
              AND ($2::record_status IS NULL OR status = $2)
              AND ($3::text IS NULL OR payload::text ILIKE $3)
            ",
        )
        .bind(tenant)
        .bind(params.status)
        .bind(&search_pattern)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok((rows, total))
    }

    /// Merge a partial payload into an existing record.
    ///
    /// Uses JSONB concatenation, so an empty patch leaves the payload
    /// unchanged apart from `updated_at`.
    pub async fn merge_payload(
        pool: &PgPool,
        tenant: &str,
        id: Uuid,
        patch: &serde_json::Value,
    ) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            UPDATE demographic_records
            SET payload = payload || $3,
                updated_at = NOW()
            WHERE id = $1 AND tenant = $2 AND status <> 'deleted'
            RETURNING *
            ",
        )
        .bind(id)
        .bind(tenant)
        .bind(patch)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Soft-delete a record. Returns the deletion timestamp if the record
    /// existed for this tenant.
    pub async fn soft_delete(
        pool: &PgPool,
        tenant: &str,
        id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, DbError> {
        let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r"
            UPDATE demographic_records
            SET status = 'deleted', deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND tenant = $2 AND status <> 'deleted'
            RETURNING deleted_at
            ",
        )
        .bind(id)
        .bind(tenant)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(row.map(|(ts,)| ts))
    }
}
