//! API credentials.
//!
//! Credentials are stored as `(key_prefix, key_hash)`; the plaintext is
//! visible exactly once, at issuance. The `(prefix, hash)` pair is
//! globally unique.

use chrono::{DateTime, Utc};
use lexflow_core::RateLimitProfile;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::DbError;

/// Credential lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "credential_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Active,
    Suspended,
    Revoked,
}

/// An API credential row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiCredential {
    pub id: Uuid,

    /// Owning tenant.
    pub tenant: String,

    /// Human-readable name.
    pub name: String,

    /// Fixed public prefix (e.g. `ms_`), for log identification.
    pub key_prefix: String,

    /// SHA-256 hash of the full plaintext key.
    #[serde(skip_serializing)]
    pub key_hash: String,

    /// Granted scopes (wire form, e.g. `demographics:write`).
    pub scopes: Vec<String>,

    pub status: CredentialStatus,

    /// Optional source-address allow-list. `None` allows any address.
    pub allowed_ips: Option<Vec<String>>,

    pub burst_limit: i32,
    pub per_minute: i32,
    pub per_hour: i32,
    pub per_day: i32,

    /// Optional expiry (`None` = never).
    pub expires_at: Option<DateTime<Utc>>,

    pub use_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_used_ip: Option<String>,

    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Data required to create a credential.
#[derive(Debug, Clone)]
pub struct NewApiCredential {
    pub tenant: String,
    pub name: String,
    pub key_prefix: String,
    pub key_hash: String,
    pub scopes: Vec<String>,
    pub allowed_ips: Option<Vec<String>>,
    pub rate_limits: RateLimitProfile,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
}

impl ApiCredential {
    /// The rate-limit profile carried by this credential.
    #[must_use]
    pub fn rate_limits(&self) -> RateLimitProfile {
        RateLimitProfile {
            burst_limit: self.burst_limit,
            per_minute: self.per_minute,
            per_hour: self.per_hour,
            per_day: self.per_day,
        }
    }

    /// Whether the credential has passed its expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() > at)
    }

    /// Create a new credential.
    pub async fn create(pool: &PgPool, data: NewApiCredential) -> Result<Self, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            INSERT INTO api_credentials
                (tenant, name, key_prefix, key_hash, scopes, allowed_ips,
                 burst_limit, per_minute, per_hour, per_day, expires_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            ",
        )
        .bind(&data.tenant)
        .bind(&data.name)
        .bind(&data.key_prefix)
        .bind(&data.key_hash)
        .bind(&data.scopes)
        .bind(&data.allowed_ips)
        .bind(data.rate_limits.burst_limit)
        .bind(data.rate_limits.per_minute)
        .bind(data.rate_limits.per_hour)
        .bind(data.rate_limits.per_day)
        .bind(data.expires_at)
        .bind(&data.created_by)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Primary authentication lookup.
    pub async fn find_by_hash(pool: &PgPool, key_hash: &str) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT * FROM api_credentials WHERE key_hash = $1
            ",
        )
        .bind(key_hash)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Record a successful use. Fire-and-forget at the call site — a
    /// failure here must never fail authentication.
    pub async fn record_usage(pool: &PgPool, id: Uuid, client_ip: &str) -> Result<(), DbError> {
        sqlx::query(
            r"
            UPDATE api_credentials
            SET use_count = use_count + 1,
                last_used_at = NOW(),
                last_used_ip = $2
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(client_ip)
        .execute(pool)
        .await
        .map_err(DbError::QueryFailed)?;

        Ok(())
    }
}
