//! Environment-driven configuration. Required values fail startup.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Deployment environment; gates dev affordances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(ConfigError::Invalid {
                name: "ENVIRONMENT",
                reason: format!("unknown environment: {other}"),
            }),
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// HMAC signing key for outbound webhooks.
    pub webhook_secret: String,
    /// Public prefix on every issued credential.
    pub credential_prefix: String,
    /// Fallback webhook target when a tenant has none configured.
    pub default_webhook_url: Option<String>,
    /// Per-tenant targets from `WEBHOOK_URL_<TENANT_UPPER_SNAKE>`.
    pub tenant_webhook_urls: HashMap<String, String>,
    pub worker_pool_size: usize,
    pub batch_size_limit_bytes: usize,
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    /// Read from the process environment, failing fast on anything
    /// required or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Testable inner constructor over an arbitrary variable set.
    pub fn from_vars(vars: impl Iterator<Item = (String, String)>) -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = vars.collect();

        let database_url = vars
            .get("DATABASE_URL")
            .cloned()
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let webhook_secret = vars
            .get("WEBHOOK_SECRET")
            .cloned()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("WEBHOOK_SECRET"))?;

        let tenant_webhook_urls = vars
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix("WEBHOOK_URL_")
                    .map(|suffix| (suffix.to_string(), value.clone()))
            })
            .collect();

        let worker_pool_size = parse_or(&vars, "WORKER_POOL_SIZE", 8)?;
        let batch_size_limit_bytes = parse_or(&vars, "BATCH_SIZE_LIMIT_BYTES", 250_000)?;
        let port = parse_or(&vars, "PORT", 8080)?;

        let environment = vars
            .get("ENVIRONMENT")
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or(Environment::Development);

        Ok(Self {
            database_url,
            webhook_secret,
            credential_prefix: vars
                .get("CREDENTIAL_PREFIX")
                .cloned()
                .unwrap_or_else(|| "ms_".to_string()),
            default_webhook_url: vars.get("DEFAULT_WEBHOOK_URL").cloned(),
            tenant_webhook_urls,
            worker_pool_size,
            batch_size_limit_bytes,
            environment,
            host: vars
                .get("HOST")
                .cloned()
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            rust_log: vars.get("RUST_LOG").cloned().unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> Vec<(String, String)> {
        vec![
            ("DATABASE_URL".into(), "postgres://localhost/lexflow".into()),
            ("WEBHOOK_SECRET".into(), "whsec_test".into()),
        ]
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_vars(base_vars().into_iter()).unwrap();
        assert_eq!(config.credential_prefix, "ms_");
        assert_eq!(config.worker_pool_size, 8);
        assert_eq!(config.batch_size_limit_bytes, 250_000);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn missing_secret_fails_startup() {
        let vars = vec![(
            "DATABASE_URL".to_string(),
            "postgres://localhost/lexflow".to_string(),
        )];
        assert!(matches!(
            Config::from_vars(vars.into_iter()),
            Err(ConfigError::Missing("WEBHOOK_SECRET"))
        ));
    }

    #[test]
    fn tenant_webhook_overrides_are_collected() {
        let mut vars = base_vars();
        vars.push((
            "WEBHOOK_URL_SMITH___ASSOCIATES".into(),
            "https://smith.example/hook".into(),
        ));
        vars.push(("DEFAULT_WEBHOOK_URL".into(), "https://fallback.example".into()));

        let config = Config::from_vars(vars.into_iter()).unwrap();
        assert_eq!(
            config.tenant_webhook_urls.get("SMITH___ASSOCIATES").unwrap(),
            "https://smith.example/hook"
        );
        assert_eq!(
            config.default_webhook_url.as_deref(),
            Some("https://fallback.example")
        );
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let mut vars = base_vars();
        vars.push(("WORKER_POOL_SIZE".into(), "lots".into()));
        assert!(matches!(
            Config::from_vars(vars.into_iter()),
            Err(ConfigError::Invalid { name: "WORKER_POOL_SIZE", .. })
        ));
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let mut vars = base_vars();
        vars.push(("ENVIRONMENT".into(), "qa".into()));
        assert!(Config::from_vars(vars.into_iter()).is_err());
    }
}
