use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::DbConfig;
use crate::error::{DriverError, SqlPoolError};
use crate::pool::ConnectionFactory;
use crate::types::DatabaseType;

use super::connection::SqliteConnection;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// How every pooled `SQLite` session is opened.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    /// File path or URI filename (e.g. `file::memory:?cache=shared`)
    pub path: String,
    /// Value for `PRAGMA encoding`; only takes effect on a new database file
    pub encoding: Option<&'static str>,
    pub busy_timeout: Duration,
}

impl SqliteOptions {
    /// Open a session and apply the pool's pragmas. Blocking.
    ///
    /// # Errors
    /// Returns the rusqlite error if the file cannot be opened or a pragma fails.
    pub fn open(&self) -> rusqlite::Result<rusqlite::Connection> {
        let conn = rusqlite::Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        if let Some(encoding) = self.encoding {
            conn.execute_batch(&format!("PRAGMA encoding = '{encoding}';"))?;
        }
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Ok(conn)
    }
}

/// Map a configured character encoding to the name `SQLite` understands.
///
/// # Errors
/// Returns `SqlPoolError::ConfigError` for encodings `SQLite` cannot store.
pub fn sqlite_encoding(name: &str) -> Result<&'static str, SqlPoolError> {
    let normalized = name.to_ascii_lowercase().replace(['-', '_'], "");
    match normalized.as_str() {
        "utf8" | "utf8mb3" | "utf8mb4" => Ok("UTF-8"),
        "utf16" => Ok("UTF-16"),
        "utf16le" => Ok("UTF-16le"),
        "utf16be" => Ok("UTF-16be"),
        _ => Err(SqlPoolError::ConfigError(format!(
            "unsupported SQLite character encoding: {name}"
        ))),
    }
}

/// Connection factory for `SQLite` databases.
#[derive(Debug, Clone)]
pub struct SqliteFactory {
    options: Arc<SqliteOptions>,
}

impl SqliteFactory {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            options: Arc::new(SqliteOptions {
                path: path.into(),
                encoding: None,
                busy_timeout: DEFAULT_BUSY_TIMEOUT,
            }),
        }
    }

    /// Build a factory from the `database` path and `character_encoding` of `config`.
    ///
    /// # Errors
    /// Returns `SqlPoolError::ConfigError` if the config is not for `SQLite` or the
    /// encoding is unsupported.
    pub fn from_config(config: &DbConfig) -> Result<Self, SqlPoolError> {
        if config.backend != DatabaseType::Sqlite {
            return Err(SqlPoolError::ConfigError(format!(
                "expected a sqlite config, got {:?}",
                config.backend
            )));
        }
        Ok(Self {
            options: Arc::new(SqliteOptions {
                path: config.database.clone(),
                encoding: Some(sqlite_encoding(&config.character_encoding)?),
                busy_timeout: DEFAULT_BUSY_TIMEOUT,
            }),
        })
    }

    #[must_use]
    pub fn with_busy_timeout(self, busy_timeout: Duration) -> Self {
        let mut options = (*self.options).clone();
        options.busy_timeout = busy_timeout;
        Self {
            options: Arc::new(options),
        }
    }

    #[must_use]
    pub fn options(&self) -> &SqliteOptions {
        &self.options
    }
}

#[async_trait]
impl ConnectionFactory for SqliteFactory {
    type Connection = SqliteConnection;

    async fn connect(&self) -> Result<SqliteConnection, DriverError> {
        SqliteConnection::open(Arc::clone(&self.options)).await
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }
}
