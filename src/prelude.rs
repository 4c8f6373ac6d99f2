//! Convenient imports for common functionality.

pub use crate::config::{DbConfig, PoolConfig};
pub use crate::db::Database;
pub use crate::error::{DriverError, SqlPoolError};
pub use crate::lifecycle::ShutdownHook;
pub use crate::pool::{
    ConnectionFactory, ConnectionPool, DbConnection, PoolStats, PooledConnection,
};
pub use crate::results::{DbRow, ReadResult, ResultSet};
pub use crate::types::{DatabaseType, PlaceholderStyle, RowValues};

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use crate::backend::{AnyConnection, AnyFactory};
#[cfg(feature = "postgres")]
pub use crate::postgres::{PostgresConnection, PostgresFactory};
#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteConnection, SqliteFactory};
