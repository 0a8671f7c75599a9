//! Tenant identifiers and session-name derivation.
//!
//! A tenant identifier is the stable partition key for everything a law
//! firm owns: records, credentials, queue sessions, blob paths. It is an
//! opaque string of at most 75 characters, set out-of-band when the tenant
//! is provisioned.
//!
//! Session names are *derived* from tenant identifiers by a lossy
//! normalization (two tenants differing only in punctuation map to the
//! same session). The canonical tenant is always the value stored on the
//! record or message; session names must never be parsed back into tenant
//! identifiers except for log display.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Maximum length of a tenant identifier.
pub const MAX_TENANT_LEN: usize = 75;

/// Session-name prefix for the demographics FIFO topic.
pub const DEMOGRAPHICS_SESSION_PREFIX: &str = "demographics_";

/// Session-name prefix for the webhook FIFO topic.
pub const WEBHOOK_SESSION_PREFIX: &str = "webhook_";

/// Session used for system-originated webhooks that have no tenant of
/// their own (e.g. document validation failures).
pub const SYSTEM_WEBHOOK_SESSION: &str = "webhook_system";

/// Error returned when a tenant identifier fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTenantId {
    #[error("tenant identifier must not be empty")]
    Empty,
    #[error("tenant identifier exceeds {MAX_TENANT_LEN} characters (got {0})")]
    TooLong(usize),
}

/// A validated tenant identifier.
///
/// Serializes as a plain string. Construction validates the length bound;
/// the content itself is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Validate and wrap a tenant identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidTenantId> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(InvalidTenantId::Empty);
        }
        if raw.chars().count() > MAX_TENANT_LEN {
            return Err(InvalidTenantId::TooLong(raw.chars().count()));
        }
        Ok(Self(raw))
    }

    /// The raw identifier as stored on records and messages.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form with every non-alphanumeric character replaced by
    /// `_`. This is the session-name component and the blob-path prefix.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Environment-variable suffix for per-tenant webhook overrides
    /// (`WEBHOOK_URL_<TENANT_UPPER_SNAKE>`).
    #[must_use]
    pub fn env_suffix(&self) -> String {
        self.normalized().to_ascii_uppercase()
    }
}

impl Display for TenantId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = InvalidTenantId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = InvalidTenantId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

/// Session name for a tenant's demographics FIFO channel.
#[must_use]
pub fn demographics_session(tenant: &TenantId) -> String {
    format!("{DEMOGRAPHICS_SESSION_PREFIX}{}", tenant.normalized())
}

/// Session name for a tenant's webhook FIFO channel.
#[must_use]
pub fn webhook_session(tenant: &TenantId) -> String {
    format!("{WEBHOOK_SESSION_PREFIX}{}", tenant.normalized())
}

/// Best-effort display form of the tenant behind a session name.
///
/// Lossy (normalization is not reversible) — for log fields only, never
/// for authorization or storage.
#[must_use]
pub fn display_tenant_from_session(session: &str) -> &str {
    session
        .strip_prefix(DEMOGRAPHICS_SESSION_PREFIX)
        .or_else(|| session.strip_prefix(WEBHOOK_SESSION_PREFIX))
        .unwrap_or(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifier() {
        let t = TenantId::new("Smith & Associates").unwrap();
        assert_eq!(t.as_str(), "Smith & Associates");
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        assert_eq!(TenantId::new("").unwrap_err(), InvalidTenantId::Empty);
        assert_eq!(TenantId::new("   ").unwrap_err(), InvalidTenantId::Empty);
    }

    #[test]
    fn rejects_over_75_chars() {
        let long = "x".repeat(76);
        assert!(matches!(
            TenantId::new(long).unwrap_err(),
            InvalidTenantId::TooLong(76)
        ));
        assert!(TenantId::new("x".repeat(75)).is_ok());
    }

    #[test]
    fn normalization_lowercases_and_replaces_punctuation() {
        let t = TenantId::new("Smith & Associates").unwrap();
        assert_eq!(t.normalized(), "smith___associates");
    }

    #[test]
    fn normalization_is_lossy_across_punctuation() {
        let a = TenantId::new("Smith&Associates").unwrap();
        let b = TenantId::new("Smith-Associates").unwrap();
        assert_eq!(a.normalized(), b.normalized());
    }

    #[test]
    fn session_names_carry_topic_prefix() {
        let t = TenantId::new("Smith & Associates").unwrap();
        assert_eq!(demographics_session(&t), "demographics_smith___associates");
        assert_eq!(webhook_session(&t), "webhook_smith___associates");
    }

    #[test]
    fn display_form_strips_known_prefixes() {
        assert_eq!(
            display_tenant_from_session("demographics_smith___associates"),
            "smith___associates"
        );
        assert_eq!(display_tenant_from_session("webhook_acme"), "acme");
        assert_eq!(display_tenant_from_session("unrelated"), "unrelated");
    }

    #[test]
    fn env_suffix_is_upper_snake() {
        let t = TenantId::new("Smith & Associates").unwrap();
        assert_eq!(t.env_suffix(), "SMITH___ASSOCIATES");
    }

    #[test]
    fn serde_round_trips_as_plain_string() {
        let t = TenantId::new("acme-legal").unwrap();
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"acme-legal\"");
        let back: TenantId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn serde_rejects_invalid_identifier() {
        let long = format!("\"{}\"", "x".repeat(80));
        assert!(serde_json::from_str::<TenantId>(&long).is_err());
    }
}
