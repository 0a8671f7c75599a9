//! Credential resolution.

use lexflow_core::{RateLimitProfile, Scope, TenantId};
use lexflow_db::models::{ApiCredential, CredentialStatus};
use sqlx::PgPool;
use uuid::Uuid;

use crate::keys::hash_key;

/// Why a presented credential was rejected. Checks run in this order and
/// stop at the first failure, so each reason is distinct.
#[derive(Debug, thiserror::Error)]
pub enum AuthFailure {
    /// No prefix match or implausible shape.
    #[error("malformed credential")]
    Malformed,

    /// No credential with this hash.
    #[error("credential not found")]
    NotFound,

    /// Stored hash differs from the recomputed one. The lookup is by
    /// hash, so this only fires on a hash collision.
    #[error("credential hash mismatch")]
    HashMismatch,

    /// Credential exists but is suspended or revoked.
    #[error("credential is {0:?}")]
    NotActive(CredentialStatus),

    /// Credential passed its expiry.
    #[error("credential expired")]
    Expired,

    /// Source address not on the credential's allow-list.
    #[error("source address not allowed")]
    IpNotAllowed,

    /// Route scopes exceed the credential's grant.
    #[error("insufficient scopes, missing: {missing:?}")]
    InsufficientScope { missing: Vec<Scope> },

    /// Credential store failure; not an authentication verdict.
    #[error("credential store error: {0}")]
    Internal(String),
}

/// The value a successful resolution yields. No locks are held; this is
/// a plain snapshot of the credential's grants.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant: TenantId,
    pub credential_id: Uuid,
    /// Credential name, recorded as `created_by` on writes.
    pub principal: String,
    pub scopes: Vec<Scope>,
    pub rate_limits: RateLimitProfile,
}

impl TenantContext {
    /// Whether this context covers all the given scopes.
    #[must_use]
    pub fn has_scopes(&self, required: &[Scope]) -> bool {
        missing_scopes(&self.scopes, required).is_empty()
    }
}

/// Resolves presented keys against the credential table.
#[derive(Clone)]
pub struct CredentialResolver {
    pool: PgPool,
    prefix: String,
}

impl CredentialResolver {
    #[must_use]
    pub fn new(pool: PgPool, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
        }
    }

    /// The configured public prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Resolve a presented key to a tenant context.
    ///
    /// On success, usage counters are updated in a spawned task; a
    /// failure to record usage never fails authentication.
    pub async fn resolve(
        &self,
        presented: &str,
        client_ip: &str,
        required_scopes: &[Scope],
    ) -> Result<TenantContext, AuthFailure> {
        if !presented.starts_with(&self.prefix) || presented.len() <= self.prefix.len() {
            return Err(AuthFailure::Malformed);
        }

        let hash = hash_key(presented);
        let credential = ApiCredential::find_by_hash(&self.pool, &hash)
            .await
            .map_err(|e| AuthFailure::Internal(e.to_string()))?
            .ok_or(AuthFailure::NotFound)?;

        // Defense in depth: the row came back by hash equality, but the
        // comparison below is constant-time over the full digest.
        if !constant_time_eq(credential.key_hash.as_bytes(), hash.as_bytes()) {
            return Err(AuthFailure::HashMismatch);
        }

        if credential.status != CredentialStatus::Active {
            return Err(AuthFailure::NotActive(credential.status));
        }

        if credential.is_expired() {
            return Err(AuthFailure::Expired);
        }

        if !ip_allowed(credential.allowed_ips.as_deref(), client_ip) {
            tracing::warn!(
                target: "security",
                credential_id = %credential.id,
                client_ip = %client_ip,
                "Credential used from a non-allowed source address"
            );
            return Err(AuthFailure::IpNotAllowed);
        }

        let scopes = parse_scopes(&credential.scopes, credential.id);
        let missing = missing_scopes(&scopes, required_scopes);
        if !missing.is_empty() {
            return Err(AuthFailure::InsufficientScope { missing });
        }

        let tenant = TenantId::new(credential.tenant.clone())
            .map_err(|e| AuthFailure::Internal(format!("stored tenant invalid: {e}")))?;

        // Usage tracking is fire-and-forget.
        let pool = self.pool.clone();
        let credential_id = credential.id;
        let ip = client_ip.to_string();
        tokio::spawn(async move {
            if let Err(e) = ApiCredential::record_usage(&pool, credential_id, &ip).await {
                tracing::warn!(
                    credential_id = %credential_id,
                    error = %e,
                    "Failed to record credential usage"
                );
            }
        });

        let rate_limits = credential.rate_limits();
        Ok(TenantContext {
            tenant,
            credential_id: credential.id,
            principal: credential.name,
            scopes,
            rate_limits,
        })
    }
}

/// Constant-time byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// Parse stored scope strings, dropping (and logging) unknown ones so an
/// old credential row cannot brick authentication after a scope rename.
fn parse_scopes(stored: &[String], credential_id: Uuid) -> Vec<Scope> {
    stored
        .iter()
        .filter_map(|s| match s.parse::<Scope>() {
            Ok(scope) => Some(scope),
            Err(_) => {
                tracing::warn!(
                    credential_id = %credential_id,
                    scope = %s,
                    "Ignoring unknown stored scope"
                );
                None
            }
        })
        .collect()
}

/// Scopes in `required` that `granted` does not cover.
fn missing_scopes(granted: &[Scope], required: &[Scope]) -> Vec<Scope> {
    required
        .iter()
        .copied()
        .filter(|scope| !granted.contains(scope))
        .collect()
}

/// An empty or absent allow-list permits any source address.
fn ip_allowed(allow_list: Option<&[String]>, client_ip: &str) -> bool {
    match allow_list {
        None => true,
        Some(list) if list.is_empty() => true,
        Some(list) => list.iter().any(|ip| ip == client_ip),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_scopes_is_set_difference() {
        let granted = vec![Scope::DemographicsRead, Scope::DemographicsWrite];
        assert!(missing_scopes(&granted, &[Scope::DemographicsRead]).is_empty());
        assert_eq!(
            missing_scopes(&granted, &[Scope::FilesUpload, Scope::DemographicsRead]),
            vec![Scope::FilesUpload]
        );
        assert!(missing_scopes(&granted, &[]).is_empty());
    }

    #[test]
    fn ip_allow_list_semantics() {
        assert!(ip_allowed(None, "10.0.0.1"));
        assert!(ip_allowed(Some(&[]), "10.0.0.1"));
        let list = vec!["10.0.0.1".to_string(), "192.168.1.5".to_string()];
        assert!(ip_allowed(Some(&list), "192.168.1.5"));
        assert!(!ip_allowed(Some(&list), "172.16.0.9"));
    }

    #[test]
    fn unknown_stored_scopes_are_dropped() {
        let stored = vec![
            "demographics:read".to_string(),
            "demographics:execute".to_string(),
        ];
        let parsed = parse_scopes(&stored, Uuid::new_v4());
        assert_eq!(parsed, vec![Scope::DemographicsRead]);
    }

    #[test]
    fn constant_time_eq_matches_std_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
