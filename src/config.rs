use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::SqlPoolError;
use crate::types::DatabaseType;

const DEFAULT_MAX_POOL_SIZE: usize = 20;

fn default_max_pool_size() -> usize {
    DEFAULT_MAX_POOL_SIZE
}

fn default_character_encoding() -> String {
    "utf8mb4".to_string()
}

/// Connection credentials and pool sizing, loaded once at startup.
///
/// The JSON shape matches a `creds/db.json` style file:
/// ```rust
/// use sql_pool::config::DbConfig;
///
/// let cfg = DbConfig::from_json_str(
///     r#"{"backend": "postgres", "host": "db", "user": "app", "pass": "secret",
///         "port": 5432, "db": "app", "max_pool_size": 4}"#,
/// )?;
/// assert_eq!(cfg.max_pool_size, 4);
/// assert_eq!(cfg.password.as_deref(), Some("secret"));
/// # Ok::<(), sql_pool::SqlPoolError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    #[serde(default)]
    pub backend: DatabaseType,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, alias = "pass")]
    pub password: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name, or the file path for `SQLite`
    #[serde(alias = "db")]
    pub database: String,
    #[serde(default = "default_character_encoding", alias = "charset")]
    pub character_encoding: String,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
    #[serde(default)]
    pub strict_repair: bool,
}

impl DbConfig {
    /// Minimal `SQLite` configuration for the database file (or URI) at `path`.
    #[must_use]
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            backend: DatabaseType::Sqlite,
            host: None,
            user: None,
            password: None,
            port: None,
            database: path.into(),
            character_encoding: default_character_encoding(),
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            acquire_timeout_ms: None,
            strict_repair: false,
        }
    }

    #[must_use]
    pub fn with_max_pool_size(mut self, max_pool_size: usize) -> Self {
        self.max_pool_size = max_pool_size;
        self
    }

    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    /// Returns `SqlPoolError::ConfigError` if the document is malformed or fails validation.
    pub fn from_json_str(json: &str) -> Result<Self, SqlPoolError> {
        let config: DbConfig = serde_json::from_str(json)
            .map_err(|e| SqlPoolError::ConfigError(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON configuration file.
    ///
    /// # Errors
    /// Returns `SqlPoolError::ConfigError` if the file cannot be read or fails validation.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SqlPoolError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SqlPoolError::ConfigError(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&content)
    }

    /// # Errors
    /// Returns `SqlPoolError::ConfigError` describing the first invalid field.
    pub fn validate(&self) -> Result<(), SqlPoolError> {
        self.pool_config().validate()?;
        if self.database.is_empty() {
            return Err(SqlPoolError::ConfigError("database is required".to_string()));
        }
        if self.backend == DatabaseType::Postgres {
            if self.host.is_none() {
                return Err(SqlPoolError::ConfigError("host is required".to_string()));
            }
            if self.user.is_none() {
                return Err(SqlPoolError::ConfigError("user is required".to_string()));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.max_pool_size,
            acquire_timeout: self.acquire_timeout_ms.map(Duration::from_millis),
            strict_repair: self.strict_repair,
        }
    }
}

/// Sizing and acquisition behaviour of a [`ConnectionPool`](crate::pool::ConnectionPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Connections opened eagerly at startup; never exceeded
    pub max_size: usize,
    /// `None` waits forever
    pub acquire_timeout: Option<Duration>,
    /// Raise `ConnectFailed` instead of handing out a connection that could not be repaired
    pub strict_repair: bool,
}

impl PoolConfig {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            acquire_timeout: None,
            strict_repair: false,
        }
    }

    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_strict_repair(mut self, strict: bool) -> Self {
        self.strict_repair = strict;
        self
    }

    /// # Errors
    /// Returns `SqlPoolError::ConfigError` if the size is zero or above the semaphore limit.
    pub fn validate(&self) -> Result<(), SqlPoolError> {
        if self.max_size == 0 {
            return Err(SqlPoolError::ConfigError(
                "max_pool_size must be greater than 0".to_string(),
            ));
        }
        if self.max_size > Semaphore::MAX_PERMITS || u32::try_from(self.max_size).is_err() {
            return Err(SqlPoolError::ConfigError(format!(
                "max_pool_size {} is too large",
                self.max_size
            )));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POOL_SIZE)
    }
}
