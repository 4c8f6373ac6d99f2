//! Runtime backend selection.
//!
//! [`AnyFactory`] picks the driver from [`DbConfig::backend`], so a single
//! `ConnectionPool<AnyFactory>` type serves whichever database the configuration
//! names.

use async_trait::async_trait;

use crate::config::DbConfig;
use crate::error::{DriverError, SqlPoolError};
use crate::pool::{ConnectionFactory, DbConnection};
use crate::results::ResultSet;
use crate::types::{DatabaseType, RowValues};

#[cfg(feature = "postgres")]
use crate::postgres::{PostgresConnection, PostgresFactory};
#[cfg(feature = "sqlite")]
use crate::sqlite::{SqliteConnection, SqliteFactory};

#[derive(Debug, Clone)]
pub enum AnyFactory {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteFactory),
    #[cfg(feature = "postgres")]
    Postgres(PostgresFactory),
}

impl AnyFactory {
    /// Build the factory for the backend named in `config`.
    ///
    /// # Errors
    /// Returns `SqlPoolError::ConfigError` if the config is invalid or its backend
    /// was not compiled in.
    pub fn from_config(config: &DbConfig) -> Result<Self, SqlPoolError> {
        match config.backend {
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => Ok(Self::Sqlite(SqliteFactory::from_config(config)?)),
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => Ok(Self::Postgres(PostgresFactory::from_config(config)?)),
            #[allow(unreachable_patterns)]
            other => Err(SqlPoolError::ConfigError(format!(
                "backend {other:?} is not enabled in this build"
            ))),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<SqliteFactory> for AnyFactory {
    fn from(factory: SqliteFactory) -> Self {
        Self::Sqlite(factory)
    }
}

#[cfg(feature = "postgres")]
impl From<PostgresFactory> for AnyFactory {
    fn from(factory: PostgresFactory) -> Self {
        Self::Postgres(factory)
    }
}

#[derive(Debug)]
pub enum AnyConnection {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteConnection),
    #[cfg(feature = "postgres")]
    Postgres(PostgresConnection),
}

macro_rules! dispatch {
    ($value:expr, $conn:ident => $body:expr) => {
        match $value {
            #[cfg(feature = "sqlite")]
            AnyConnection::Sqlite($conn) => $body,
            #[cfg(feature = "postgres")]
            AnyConnection::Postgres($conn) => $body,
        }
    };
}

#[async_trait]
impl DbConnection for AnyConnection {
    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DriverError> {
        dispatch!(self, conn => conn.query(sql, params).await)
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<usize, DriverError> {
        dispatch!(self, conn => conn.execute(sql, params).await)
    }

    async fn ping(&mut self) -> Result<(), DriverError> {
        dispatch!(self, conn => conn.ping().await)
    }

    async fn reconnect(&mut self) -> Result<(), DriverError> {
        dispatch!(self, conn => conn.reconnect().await)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        dispatch!(self, conn => conn.close().await)
    }
}

#[async_trait]
impl ConnectionFactory for AnyFactory {
    type Connection = AnyConnection;

    async fn connect(&self) -> Result<AnyConnection, DriverError> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(factory) => factory.connect().await.map(AnyConnection::Sqlite),
            #[cfg(feature = "postgres")]
            Self::Postgres(factory) => factory.connect().await.map(AnyConnection::Postgres),
        }
    }

    fn database_type(&self) -> DatabaseType {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(factory) => factory.database_type(),
            #[cfg(feature = "postgres")]
            Self::Postgres(factory) => factory.database_type(),
        }
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;

    #[test]
    fn picks_factory_from_backend() {
        let factory = AnyFactory::from_config(&DbConfig::sqlite("picked.db")).expect("factory");
        assert_eq!(factory.database_type(), DatabaseType::Sqlite);
        assert!(matches!(factory, AnyFactory::Sqlite(_)));
    }

    #[tokio::test]
    async fn dispatches_to_sqlite_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("any.db");
        let factory = AnyFactory::from(SqliteFactory::new(path.to_string_lossy()));
        let mut conn = factory.connect().await.expect("connect");
        conn.execute("CREATE TABLE t (v INTEGER)", &[]).await.expect("create");
        conn.execute("INSERT INTO t (v) VALUES (?1)", &[RowValues::Int(7)])
            .await
            .expect("insert");
        let rs = conn.query("SELECT v FROM t", &[]).await.expect("select");
        assert_eq!(rs.rows[0].get("v"), Some(&RowValues::Int(7)));
        conn.close().await.expect("close");
    }
}
