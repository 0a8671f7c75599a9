//! Webhook delivery attempts — append-only audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::DbError;

/// Maximum number of response bytes kept in the audit row.
pub const RESPONSE_EXCERPT_LIMIT: usize = 500;

/// Terminal classification of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "delivery_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    RetryFailed,
    FailedPermanently,
}

/// One row per outbound POST, never updated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    pub tenant: String,
    /// The submission that produced the event, when applicable.
    pub submission_id: Option<Uuid>,
    pub correlation_id: Uuid,
    pub target_url: String,
    pub event: String,
    pub status: DeliveryStatus,
    pub http_status: Option<i16>,
    /// First bytes of the endpoint's response, capped at 500.
    pub response_excerpt: Option<String>,
    /// 0-based attempt counter for the originating message.
    pub attempt: i32,
    pub last_error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// Data for recording an attempt.
#[derive(Debug, Clone)]
pub struct NewDeliveryAttempt {
    pub tenant: String,
    pub submission_id: Option<Uuid>,
    pub correlation_id: Uuid,
    pub target_url: String,
    pub event: String,
    pub status: DeliveryStatus,
    pub http_status: Option<i16>,
    pub response_excerpt: Option<String>,
    pub attempt: i32,
    pub last_error: Option<String>,
}

impl DeliveryAttempt {
    /// Append an attempt to the audit.
    pub async fn record(pool: &PgPool, data: NewDeliveryAttempt) -> Result<Self, DbError> {
        let excerpt = data
            .response_excerpt
            .map(|e| truncate_excerpt(&e).to_string());

        sqlx::query_as::<_, Self>(
            r"
            INSERT INTO delivery_attempts
                (tenant, submission_id, correlation_id, target_url, event,
                 status, http_status, response_excerpt, attempt, last_error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            ",
        )
        .bind(&data.tenant)
        .bind(data.submission_id)
        .bind(data.correlation_id)
        .bind(&data.target_url)
        .bind(&data.event)
        .bind(data.status)
        .bind(data.http_status)
        .bind(&excerpt)
        .bind(data.attempt)
        .bind(&data.last_error)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Recent attempts for a tenant, newest first.
    pub async fn list_recent(
        pool: &PgPool,
        tenant: &str,
        limit: i64,
    ) -> Result<Vec<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT * FROM delivery_attempts
            WHERE tenant = $1
            ORDER BY attempted_at DESC
            LIMIT $2
            ",
        )
        .bind(tenant)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// All attempts for one originating message, oldest first.
    pub async fn list_for_correlation(
        pool: &PgPool,
        correlation_id: Uuid,
    ) -> Result<Vec<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT * FROM delivery_attempts
            WHERE correlation_id = $1
            ORDER BY attempted_at ASC
            ",
        )
        .bind(correlation_id)
        .fetch_all(pool)
        .await
        .map_err(DbError::QueryFailed)
    }
}

/// Cap an endpoint response at the audit excerpt limit without splitting
/// a UTF-8 character.
#[must_use]
pub fn truncate_excerpt(body: &str) -> &str {
    if body.len() <= RESPONSE_EXCERPT_LIMIT {
        return body;
    }
    let mut end = RESPONSE_EXCERPT_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
