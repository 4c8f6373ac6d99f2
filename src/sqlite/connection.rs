use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DriverError;
use crate::pool::DbConnection;
use crate::results::ResultSet;
use crate::types::RowValues;

use super::config::SqliteOptions;
use super::params::Params;
use super::query::build_result_set;

/// Pooled `SQLite` session.
///
/// The rusqlite handle is moved onto tokio's blocking pool for every call and
/// moved back afterwards. If a call is lost (the blocking task panicked) the
/// handle stays empty until the next health check reopens it.
pub struct SqliteConnection {
    options: Arc<SqliteOptions>,
    conn: Option<rusqlite::Connection>,
}

impl SqliteConnection {
    pub(crate) async fn open(options: Arc<SqliteOptions>) -> Result<Self, DriverError> {
        let conn = open_blocking(Arc::clone(&options)).await?;
        Ok(Self {
            options,
            conn: Some(conn),
        })
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Run synchronous rusqlite work against this session on a blocking thread.
    ///
    /// # Errors
    /// Returns `DriverError::Disconnected` if the session is closed, or whatever the
    /// closure fails with.
    pub async fn with_connection<F, R>(&mut self, func: F) -> Result<R, DriverError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let mut conn = self.conn.take().ok_or(DriverError::Disconnected)?;
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = func(&mut conn);
            (conn, result)
        })
        .await
        .map_err(|e| DriverError::Other(format!("sqlite spawn_blocking join error: {e}")))?;
        self.conn = Some(conn);
        result.map_err(DriverError::from)
    }

    /// Execute several `;`-separated statements with no parameters.
    ///
    /// # Errors
    /// Returns the first statement failure.
    pub async fn execute_batch(&mut self, sql: &str) -> Result<(), DriverError> {
        let sql = sql.to_owned();
        self.with_connection(move |conn| conn.execute_batch(&sql))
            .await
    }
}

async fn open_blocking(options: Arc<SqliteOptions>) -> Result<rusqlite::Connection, DriverError> {
    tokio::task::spawn_blocking(move || options.open())
        .await
        .map_err(|e| DriverError::Other(format!("sqlite spawn_blocking join error: {e}")))?
        .map_err(DriverError::from)
}

#[async_trait]
impl DbConnection for SqliteConnection {
    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DriverError> {
        let sql = sql.to_owned();
        let params = Params::convert(params);
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            build_result_set(&mut stmt, &params)
        })
        .await
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<usize, DriverError> {
        let sql = sql.to_owned();
        let params = Params::convert(params);
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            stmt.execute(&params.as_refs()[..])
        })
        .await
    }

    async fn ping(&mut self) -> Result<(), DriverError> {
        self.with_connection(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .map(|_| ())
    }

    async fn reconnect(&mut self) -> Result<(), DriverError> {
        // the old handle is dropped before opening so a file lock is never held twice
        self.conn = None;
        let conn = open_blocking(Arc::clone(&self.options)).await?;
        self.conn = Some(conn);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || conn.close().map_err(|(_, err)| err))
            .await
            .map_err(|e| DriverError::Other(format!("sqlite spawn_blocking join error: {e}")))?
            .map_err(DriverError::from)
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.options.path)
            .field("open", &self.is_open())
            .finish()
    }
}
