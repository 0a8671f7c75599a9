//! Idempotent request bindings.
//!
//! One row per `(tenant, idempotency_key)`. A row with a NULL
//! `response_status` is still being processed by its first request; a
//! populated row replays the captured response until `expires_at`.

use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::DbError;

/// How long a processing row may sit without a captured response before
/// it is considered abandoned (crashed mid-request) and reclaimable.
const PROCESSING_TIMEOUT_SECS: i64 = 300;

/// An idempotent request binding.
#[derive(Debug, Clone, FromRow)]
pub struct IdempotentRequest {
    pub id: Uuid,
    pub tenant: String,
    pub idempotency_key: String,
    pub request_hash: String,
    pub endpoint: String,
    pub http_method: String,
    /// NULL while the first request is still in flight.
    pub response_status: Option<i16>,
    pub response_body: Option<Vec<u8>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Data for a new binding.
#[derive(Debug, Clone)]
pub struct NewIdempotentRequest {
    pub tenant: String,
    pub idempotency_key: String,
    pub request_hash: String,
    pub endpoint: String,
    pub http_method: String,
    pub ttl: Duration,
}

/// Outcome of a `try_insert`.
#[derive(Debug)]
pub enum IdempotentInsert {
    /// This request is the first holder of the key.
    Inserted(IdempotentRequest),
    /// The key already exists; the existing row is returned.
    Existing(IdempotentRequest),
}

impl IdempotentRequest {
    /// Whether the row has expired and should be treated as absent.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Whether the first request holding this key appears to have died
    /// without capturing a response.
    #[must_use]
    pub fn is_processing_stale(&self) -> bool {
        self.response_status.is_none()
            && Utc::now() - self.created_at > Duration::seconds(PROCESSING_TIMEOUT_SECS)
    }

    /// Whether the presented request matches the stored binding.
    #[must_use]
    pub fn matches(&self, method: &str, endpoint: &str, request_hash: &str) -> bool {
        self.http_method == method && self.endpoint == endpoint && self.request_hash == request_hash
    }

    /// Atomically claim the key, or return the existing row.
    ///
    /// Expired rows are removed first so a stale key behaves as absent.
    pub async fn try_insert(
        pool: &PgPool,
        data: NewIdempotentRequest,
    ) -> Result<IdempotentInsert, DbError> {
        sqlx::query(
            r"
            DELETE FROM idempotent_requests
            WHERE tenant = $1 AND idempotency_key = $2 AND expires_at < NOW()
            ",
        )
        .bind(&data.tenant)
        .bind(&data.idempotency_key)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        let inserted = sqlx::query_as::<_, Self>(
            r"
            INSERT INTO idempotent_requests
                (tenant, idempotency_key, request_hash, endpoint, http_method, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant, idempotency_key) DO NOTHING
            RETURNING *
            ",
        )
        .bind(&data.tenant)
        .bind(&data.idempotency_key)
        .bind(&data.request_hash)
        .bind(&data.endpoint)
        .bind(&data.http_method)
        .bind(Utc::now() + data.ttl)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        if let Some(row) = inserted {
            return Ok(IdempotentInsert::Inserted(row));
        }

        let existing = sqlx::query_as::<_, Self>(
            r"
            SELECT * FROM idempotent_requests
            WHERE tenant = $1 AND idempotency_key = $2
            ",
        )
        .bind(&data.tenant)
        .bind(&data.idempotency_key)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)?
        .ok_or_else(|| DbError::NotFound("idempotent request vanished mid-insert".to_string()))?;

        Ok(IdempotentInsert::Existing(existing))
    }

    /// Capture the computed response. Idempotent; a failure here is
    /// logged by the caller but never rolls back the user-visible result.
    pub async fn capture_response(
        pool: &PgPool,
        id: Uuid,
        status: i16,
        body: &[u8],
    ) -> Result<(), DbError> {
        sqlx::query(
            r"
            UPDATE idempotent_requests
            SET response_status = $2, response_body = $3
            WHERE id = $1 AND response_status IS NULL
            ",
        )
        .bind(id)
        .bind(status)
        .bind(body)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(())
    }

    /// Remove a stale processing row so the key can be re-claimed.
    pub async fn delete_stale(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query(
            r"
            DELETE FROM idempotent_requests
            WHERE id = $1 AND response_status IS NULL
            ",
        )
        .bind(id)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(result.rows_affected() > 0)
    }

    /// Opportunistic reaping of expired rows.
    pub async fn purge_expired(pool: &PgPool) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM idempotent_requests WHERE expires_at < NOW()")
            .execute(pool)
            .await
            .map_err(DbError::QueryFailed)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(age_secs: i64, status: Option<i16>) -> IdempotentRequest {
        IdempotentRequest {
            id: Uuid::new_v4(),
            tenant: "acme".to_string(),
            idempotency_key: Uuid::new_v4().to_string(),
            request_hash: "aa".repeat(32),
            endpoint: "/v1/demographics".to_string(),
            http_method: "POST".to_string(),
            response_status: status,
            response_body: None,
            expires_at: Utc::now() + Duration::hours(24),
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn fresh_processing_row_is_not_stale() {
        assert!(!row(10, None).is_processing_stale());
    }

    #[test]
    fn old_processing_row_is_stale() {
        assert!(row(PROCESSING_TIMEOUT_SECS + 1, None).is_processing_stale());
    }

    #[test]
    fn completed_row_is_never_stale() {
        assert!(!row(9999, Some(201)).is_processing_stale());
    }

    #[test]
    fn matches_compares_method_endpoint_hash() {
        let r = row(0, Some(201));
        assert!(r.matches("POST", "/v1/demographics", &"aa".repeat(32)));
        assert!(!r.matches("PUT", "/v1/demographics", &"aa".repeat(32)));
        assert!(!r.matches("POST", "/v1/other", &"aa".repeat(32)));
        assert!(!r.matches("POST", "/v1/demographics", &"bb".repeat(32)));
    }
}
