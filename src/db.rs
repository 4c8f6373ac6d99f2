//! Query façade.
//!
//! [`Database`] is the surface collaborators call. Every operation borrows a
//! connection from the pool, runs one auto-committed statement, and hands the
//! connection back on every exit path, errors included.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::SqlPoolError;
use crate::pool::{ConnectionFactory, ConnectionPool, DbConnection};
use crate::results::ReadResult;
use crate::types::RowValues;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
use crate::{backend::AnyFactory, config::DbConfig};

static SINGLE_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bLIMIT\s+1\b|\bFETCH\s+FIRST\s+1\s+ROWS?\s+ONLY\b")
        .expect("single-row pattern compiles")
});

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("identifier pattern compiles")
});

/// True when `sql` limits its result to one row (`LIMIT 1` or
/// `FETCH FIRST 1 ROW ONLY`).
#[must_use]
pub fn is_single_row_query(sql: &str) -> bool {
    SINGLE_ROW.is_match(sql)
}

fn check_identifier(kind: &str, name: &str) -> Result<(), SqlPoolError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(SqlPoolError::ParameterError(format!(
            "invalid {kind} name {name:?}"
        )))
    }
}

/// Pool-backed `read`/`write` operations.
///
/// Cloning shares the underlying pool.
#[derive(Debug)]
pub struct Database<F: ConnectionFactory> {
    pool: ConnectionPool<F>,
}

impl<F: ConnectionFactory> Clone for Database<F> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
impl Database<AnyFactory> {
    /// Build the backend named in `config` and open its pool.
    ///
    /// # Errors
    /// `ConfigError` for an invalid config, `PoolInitFailed` if a connection
    /// cannot be opened.
    pub async fn from_config(config: &DbConfig) -> Result<Self, SqlPoolError> {
        config.validate()?;
        let factory = AnyFactory::from_config(config)?;
        let pool = ConnectionPool::initialize(factory, config.pool_config()).await?;
        Ok(Self::new(pool))
    }
}

impl<F: ConnectionFactory> Database<F> {
    #[must_use]
    pub fn new(pool: ConnectionPool<F>) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &ConnectionPool<F> {
        &self.pool
    }

    /// Run a query.
    ///
    /// Row-limited statements (see [`is_single_row_query`]) yield
    /// [`ReadResult::One`], holding `None` when nothing matched. Everything else
    /// yields every row in the order the database returned them.
    ///
    /// # Errors
    /// Pool errors from acquiring a connection, or `QueryFailed` with the driver error.
    pub async fn read(&self, sql: &str, params: &[RowValues]) -> Result<ReadResult, SqlPoolError> {
        let mut conn = self.pool.acquire().await?;
        let result = conn.query(sql, params).await;
        self.pool.release(conn);

        let result_set = result.map_err(SqlPoolError::QueryFailed)?;
        tracing::debug!(sql, ?params, rows = result_set.len(), "DB: executed read");

        if is_single_row_query(sql) {
            Ok(ReadResult::One(result_set.rows.into_iter().next()))
        } else {
            Ok(ReadResult::Many(result_set.rows))
        }
    }

    /// Run a statement for its side effects and return the number of affected rows.
    ///
    /// # Errors
    /// Pool errors from acquiring a connection, or `QueryFailed` with the driver error.
    pub async fn write(&self, sql: &str, params: &[RowValues]) -> Result<usize, SqlPoolError> {
        let mut conn = self.pool.acquire().await?;
        let result = conn.execute(sql, params).await;
        self.pool.release(conn);

        let affected = result.map_err(SqlPoolError::QueryFailed)?;
        tracing::debug!(sql, ?params, affected, "DB: executed write");
        Ok(affected)
    }

    /// Insert one row built from `(column, value)` pairs.
    ///
    /// Values are bound as parameters. Table and column names are spliced into
    /// the statement, so they must come from the program, not from user input;
    /// names that are not plain identifiers (optionally schema-qualified) are
    /// rejected.
    ///
    /// # Errors
    /// `ParameterError` for an empty column list or an invalid name, otherwise
    /// whatever [`write`](Self::write) returns.
    pub async fn insert_one(
        &self,
        table: &str,
        columns: &[(&str, RowValues)],
    ) -> Result<usize, SqlPoolError> {
        let (sql, params) = self.build_insert(table, columns)?;
        self.write(&sql, &params).await
    }

    fn build_insert(
        &self,
        table: &str,
        columns: &[(&str, RowValues)],
    ) -> Result<(String, Vec<RowValues>), SqlPoolError> {
        if columns.is_empty() {
            return Err(SqlPoolError::ParameterError(format!(
                "insert into {table} needs at least one column"
            )));
        }
        check_identifier("table", table)?;

        let style = self.pool.database_type().placeholder_style();
        let mut names = Vec::with_capacity(columns.len());
        let mut placeholders = Vec::with_capacity(columns.len());
        let mut params = Vec::with_capacity(columns.len());
        for (idx, (name, value)) in columns.iter().enumerate() {
            check_identifier("column", name)?;
            names.push(*name);
            placeholders.push(style.placeholder(idx + 1));
            params.push(value.clone());
        }

        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            names.join(", "),
            placeholders.join(", ")
        );
        Ok((sql, params))
    }

    /// Drain and close the pool. See [`ConnectionPool::shutdown`].
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
