//! Per-tenant webhook target resolution.
//!
//! Targets come from configuration: `WEBHOOK_URL_<TENANT_UPPER_SNAKE>`
//! overrides, then `DEFAULT_WEBHOOK_URL`, then none (delivery is skipped
//! and logged).

use lexflow_core::TenantId;
use std::collections::HashMap;

/// Immutable target map built once at startup.
#[derive(Debug, Clone, Default)]
pub struct TargetResolver {
    default_url: Option<String>,
    overrides: HashMap<String, String>,
}

impl TargetResolver {
    /// `overrides` is keyed by the tenant's upper-snake env suffix.
    #[must_use]
    pub fn new(default_url: Option<String>, overrides: HashMap<String, String>) -> Self {
        Self {
            default_url,
            overrides,
        }
    }

    /// The endpoint for a tenant, if any is configured.
    #[must_use]
    pub fn resolve(&self, tenant: &TenantId) -> Option<&str> {
        self.overrides
            .get(&tenant.env_suffix())
            .or(self.default_url.as_ref())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_beats_default() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "SMITH___ASSOCIATES".to_string(),
            "https://smith.example/hook".to_string(),
        );
        let resolver = TargetResolver::new(Some("https://default.example/hook".to_string()), overrides);

        let smith = TenantId::new("Smith & Associates").unwrap();
        let other = TenantId::new("Acme Legal").unwrap();
        assert_eq!(resolver.resolve(&smith), Some("https://smith.example/hook"));
        assert_eq!(resolver.resolve(&other), Some("https://default.example/hook"));
    }

    #[test]
    fn no_configuration_resolves_none() {
        let resolver = TargetResolver::default();
        let tenant = TenantId::new("acme").unwrap();
        assert_eq!(resolver.resolve(&tenant), None);
    }
}
