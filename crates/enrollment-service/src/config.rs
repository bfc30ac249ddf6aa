//! Enrollment service configuration.
//!
//! Configuration is loaded from environment variables. The database URL is
//! redacted in Debug output.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default maximum pool connections.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 20;

/// Default minimum pool connections.
pub const DEFAULT_DB_MIN_CONNECTIONS: u32 = 2;

/// Default pool acquire timeout in seconds.
pub const DEFAULT_DB_ACQUIRE_TIMEOUT_SECONDS: u64 = 5;

/// Default per-statement timeout in seconds.
pub const DEFAULT_DB_STATEMENT_TIMEOUT_SECONDS: u32 = 5;

/// Default number of allocate-and-persist attempts per enrollment.
pub const DEFAULT_ALLOCATION_MAX_ATTEMPTS: u32 = 3;

/// Upper bound for `ALLOCATION_MAX_ATTEMPTS`.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 10;

/// Default cap on waiting for a scope lock, in milliseconds.
pub const DEFAULT_ALLOCATION_LOCK_TIMEOUT_MS: u64 = 2000;

/// Default linear backoff step between allocation attempts, in milliseconds.
pub const DEFAULT_ALLOCATION_RETRY_BACKOFF_MS: u64 = 50;

/// Upper bound for `ALLOCATION_RETRY_BACKOFF_MS`.
pub const MAX_ALLOCATION_RETRY_BACKOFF_MS: u64 = 10_000;

/// Default largest accepted photo, in bytes (2 MiB).
pub const DEFAULT_MAX_PHOTO_BYTES: usize = 2 * 1024 * 1024;

/// Default timeout for a single store call in seconds.
pub const DEFAULT_STORE_CALL_TIMEOUT_SECONDS: u64 = 10;

/// Enrollment service configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum pool connections (default: 20).
    pub db_max_connections: u32,

    /// Minimum pool connections (default: 2).
    pub db_min_connections: u32,

    /// Pool acquire timeout (default: 5s).
    pub db_acquire_timeout: Duration,

    /// Server-side statement timeout in seconds (default: 5).
    pub db_statement_timeout_seconds: u32,

    /// Allocate-and-persist attempts before giving up on contention (default: 3).
    pub allocation_max_attempts: u32,

    /// How long an allocation waits for its scope lock (default: 2000ms).
    pub allocation_lock_timeout_ms: u64,

    /// Backoff step between attempts; attempt `n` waits `n * step` (default: 50ms).
    pub allocation_retry_backoff: Duration,

    /// Timeout wrapped around every store call (default: 10s).
    pub store_call_timeout: Duration,

    /// Largest decoded photo accepted on enroll or update (default: 2 MiB).
    pub max_photo_bytes: usize,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout", &self.db_acquire_timeout)
            .field(
                "db_statement_timeout_seconds",
                &self.db_statement_timeout_seconds,
            )
            .field("allocation_max_attempts", &self.allocation_max_attempts)
            .field(
                "allocation_lock_timeout_ms",
                &self.allocation_lock_timeout_ms,
            )
            .field("allocation_retry_backoff", &self.allocation_retry_backoff)
            .field("store_call_timeout", &self.store_call_timeout)
            .field("max_photo_bytes", &self.max_photo_bytes)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid database pool configuration: {0}")]
    InvalidPool(String),

    #[error("Invalid allocation configuration: {0}")]
    InvalidAllocation(String),

    #[error("Invalid timeout configuration: {0}")]
    InvalidTimeout(String),

    #[error("Invalid photo configuration: {0}")]
    InvalidPhoto(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let db_max_connections = parse_positive(
            vars,
            "DB_MAX_CONNECTIONS",
            DEFAULT_DB_MAX_CONNECTIONS,
            ConfigError::InvalidPool,
        )?;

        let db_min_connections: u32 = match vars.get("DB_MIN_CONNECTIONS") {
            Some(value_str) => value_str.parse().map_err(|e| {
                ConfigError::InvalidPool(format!(
                    "DB_MIN_CONNECTIONS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?,
            None => DEFAULT_DB_MIN_CONNECTIONS.min(db_max_connections),
        };

        if db_min_connections > db_max_connections {
            return Err(ConfigError::InvalidPool(format!(
                "DB_MIN_CONNECTIONS ({}) must not exceed DB_MAX_CONNECTIONS ({})",
                db_min_connections, db_max_connections
            )));
        }

        let db_acquire_timeout = Duration::from_secs(parse_positive(
            vars,
            "DB_ACQUIRE_TIMEOUT_SECONDS",
            DEFAULT_DB_ACQUIRE_TIMEOUT_SECONDS,
            ConfigError::InvalidTimeout,
        )?);

        let db_statement_timeout_seconds = parse_positive(
            vars,
            "DB_STATEMENT_TIMEOUT_SECONDS",
            DEFAULT_DB_STATEMENT_TIMEOUT_SECONDS,
            ConfigError::InvalidTimeout,
        )?;

        let allocation_max_attempts = parse_positive(
            vars,
            "ALLOCATION_MAX_ATTEMPTS",
            DEFAULT_ALLOCATION_MAX_ATTEMPTS,
            ConfigError::InvalidAllocation,
        )?;

        if allocation_max_attempts > MAX_ALLOCATION_ATTEMPTS {
            return Err(ConfigError::InvalidAllocation(format!(
                "ALLOCATION_MAX_ATTEMPTS must not exceed {}, got {}",
                MAX_ALLOCATION_ATTEMPTS, allocation_max_attempts
            )));
        }

        let allocation_lock_timeout_ms = parse_positive(
            vars,
            "ALLOCATION_LOCK_TIMEOUT_MS",
            DEFAULT_ALLOCATION_LOCK_TIMEOUT_MS,
            ConfigError::InvalidAllocation,
        )?;

        // Zero backoff is allowed: retries then happen back to back.
        let allocation_retry_backoff_ms: u64 = match vars.get("ALLOCATION_RETRY_BACKOFF_MS") {
            Some(value_str) => value_str.parse().map_err(|e| {
                ConfigError::InvalidAllocation(format!(
                    "ALLOCATION_RETRY_BACKOFF_MS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?,
            None => DEFAULT_ALLOCATION_RETRY_BACKOFF_MS,
        };

        if allocation_retry_backoff_ms > MAX_ALLOCATION_RETRY_BACKOFF_MS {
            return Err(ConfigError::InvalidAllocation(format!(
                "ALLOCATION_RETRY_BACKOFF_MS must not exceed {}, got {}",
                MAX_ALLOCATION_RETRY_BACKOFF_MS, allocation_retry_backoff_ms
            )));
        }
        let allocation_retry_backoff = Duration::from_millis(allocation_retry_backoff_ms);

        let store_call_timeout = Duration::from_secs(parse_positive(
            vars,
            "STORE_CALL_TIMEOUT_SECONDS",
            DEFAULT_STORE_CALL_TIMEOUT_SECONDS,
            ConfigError::InvalidTimeout,
        )?);

        let max_photo_bytes = parse_positive(
            vars,
            "MAX_PHOTO_BYTES",
            DEFAULT_MAX_PHOTO_BYTES,
            ConfigError::InvalidPhoto,
        )?;

        Ok(Config {
            database_url,
            db_max_connections,
            db_min_connections,
            db_acquire_timeout,
            db_statement_timeout_seconds,
            allocation_max_attempts,
            allocation_lock_timeout_ms,
            allocation_retry_backoff,
            store_call_timeout,
            max_photo_bytes,
        })
    }
}

/// Parse an optional strictly positive integer variable.
fn parse_positive<T>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
    make_error: fn(String) -> ConfigError,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default + fmt::Display,
    T::Err: fmt::Display,
{
    let Some(value_str) = vars.get(key) else {
        return Ok(default);
    };

    let value: T = value_str.parse().map_err(|e: T::Err| {
        make_error(format!(
            "{} must be a valid positive integer, got '{}': {}",
            key, value_str, e
        ))
    })?;

    if value <= T::default() {
        return Err(make_error(format!(
            "{} must be greater than 0, got {}",
            key, value
        )));
    }

    Ok(value)
}
