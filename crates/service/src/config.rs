//! Merge service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `LISTS_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `LISTS_DB_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `LISTS_MERGE_TIMEOUT_SECS` - Upper bound on one merge transaction (default: 30)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name (e.g., production)

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MERGE_TIMEOUT_SECS: u64 = 30;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Merge service configuration.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Maximum number of pooled database connections
    pub max_connections: u32,
    /// How long one merge transaction may run before it is rolled back
    pub merge_timeout: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl MergeConfig {
    /// Configuration with defaults for everything but the database URL.
    #[must_use]
    pub fn new(database_url: SecretString) -> Self {
        Self {
            database_url,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            merge_timeout: Duration::from_secs(DEFAULT_MERGE_TIMEOUT_SECS),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("LISTS_DATABASE_URL")?;
        let max_connections = parse_max_connections(
            "LISTS_DB_MAX_CONNECTIONS",
            &get_env_or_default(
                "LISTS_DB_MAX_CONNECTIONS",
                &DEFAULT_MAX_CONNECTIONS.to_string(),
            ),
        )?;
        let merge_timeout = parse_timeout_secs(
            "LISTS_MERGE_TIMEOUT_SECS",
            &get_env_or_default(
                "LISTS_MERGE_TIMEOUT_SECS",
                &DEFAULT_MERGE_TIMEOUT_SECS.to_string(),
            ),
        )?;

        Ok(Self {
            database_url,
            max_connections,
            merge_timeout,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a pool size, which must be at least 1.
fn parse_max_connections(key: &str, value: &str) -> Result<u32, ConfigError> {
    let n = value
        .trim()
        .parse::<u32>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if n == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be at least 1".to_string(),
        ));
    }
    Ok(n)
}

/// Parse a timeout in whole seconds, which must be non-zero.
fn parse_timeout_secs(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let secs = value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_defaults() {
        let config = MergeConfig::new(SecretString::from("postgres://localhost/lists"));
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.merge_timeout, Duration::from_secs(30));
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_parse_timeout_valid() {
        let timeout = parse_timeout_secs("TEST_VAR", " 5 ").unwrap();
        assert_eq!(timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_timeout_zero() {
        let err = parse_timeout_secs("TEST_VAR", "0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_parse_timeout_garbage() {
        assert!(parse_timeout_secs("TEST_VAR", "soon").is_err());
    }

    #[test]
    fn test_parse_max_connections() {
        assert_eq!(parse_max_connections("TEST_VAR", "4").unwrap(), 4);
        assert!(parse_max_connections("TEST_VAR", "0").is_err());
        assert!(parse_max_connections("TEST_VAR", "-1").is_err());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingEnvVar("LISTS_DATABASE_URL".to_string());
        assert_eq!(
            err.to_string(),
            "Missing environment variable: LISTS_DATABASE_URL"
        );
    }

    #[test]
    fn test_debug_redacts_database_url() {
        let config = MergeConfig::new(SecretString::from("postgres://user:hunter2@db/lists"));
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
    }
}
