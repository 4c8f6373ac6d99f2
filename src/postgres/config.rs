use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DbConfig;
use crate::error::{DriverError, SqlPoolError};
use crate::pool::ConnectionFactory;
use crate::types::DatabaseType;

use super::connection::PostgresConnection;

const DEFAULT_PORT: u16 = 5432;

/// Map a configured character encoding to a Postgres `client_encoding` name.
///
/// tokio-postgres always asks the server for `UTF8`, so that is the only
/// encoding a session can actually use.
///
/// # Errors
/// Returns `SqlPoolError::ConfigError` for anything but a UTF-8 alias.
pub fn postgres_encoding(name: &str) -> Result<&'static str, SqlPoolError> {
    let normalized = name.to_ascii_uppercase().replace(['-', '_'], "");
    match normalized.as_str() {
        "UTF8" | "UTF8MB3" | "UTF8MB4" => Ok("UTF8"),
        _ => Err(SqlPoolError::ConfigError(format!(
            "unsupported Postgres client encoding: {name:?} (only UTF8 is supported)"
        ))),
    }
}

/// Connection factory for Postgres servers.
#[derive(Debug, Clone)]
pub struct PostgresFactory {
    config: Arc<tokio_postgres::Config>,
}

impl PostgresFactory {
    #[must_use]
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Build a factory from the credentials in `config`.
    ///
    /// # Errors
    /// Returns `SqlPoolError::ConfigError` if the config is not for Postgres or a
    /// required field is missing.
    pub fn from_config(config: &DbConfig) -> Result<Self, SqlPoolError> {
        if config.backend != DatabaseType::Postgres {
            return Err(SqlPoolError::ConfigError(format!(
                "expected a postgres config, got {:?}",
                config.backend
            )));
        }
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| SqlPoolError::ConfigError("host is required".to_string()))?;
        let user = config
            .user
            .as_deref()
            .ok_or_else(|| SqlPoolError::ConfigError("user is required".to_string()))?;
        let encoding = postgres_encoding(&config.character_encoding)?;

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(host)
            .port(config.port.unwrap_or(DEFAULT_PORT))
            .user(user)
            .dbname(&config.database)
            .options(format!("-c client_encoding={encoding}"))
            .application_name("sql-pool");
        if let Some(password) = &config.password {
            pg_config.password(password);
        }
        Ok(Self::new(pg_config))
    }

    #[must_use]
    pub fn pg_config(&self) -> &tokio_postgres::Config {
        &self.config
    }
}

#[async_trait]
impl ConnectionFactory for PostgresFactory {
    type Connection = PostgresConnection;

    async fn connect(&self) -> Result<PostgresConnection, DriverError> {
        PostgresConnection::open(Arc::clone(&self.config)).await
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }
}
