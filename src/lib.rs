//! Bounded, eagerly opened pool of database connections with a small
//! `read`/`write` façade on top.
//!
//! ```rust,no_run
//! use sql_pool::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlPoolError> {
//! let config = DbConfig::from_json_file("creds/db.json")?;
//! let db = Database::from_config(&config).await?;
//! db.write("CREATE TABLE IF NOT EXISTS users (name TEXT, age INTEGER)", &[]).await?;
//! db.insert_one("users", &[("name", "a".into()), ("age", RowValues::Int(3))]).await?;
//! let row = db
//!     .read("SELECT name, age FROM users LIMIT 1", &[])
//!     .await?
//!     .into_one();
//! # let _ = row;
//! db.shutdown().await;
//! # Ok(()) }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod prelude;
pub mod results;
pub mod types;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod backend;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{DbConfig, PoolConfig};
pub use db::Database;
pub use error::{DriverError, SqlPoolError};
pub use pool::{ConnectionFactory, ConnectionPool, DbConnection, PooledConnection};
pub use results::{DbRow, ReadResult, ResultSet};
pub use types::{DatabaseType, RowValues};

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use backend::{AnyConnection, AnyFactory};
