use async_trait::async_trait;

use crate::error::DriverError;
use crate::results::ResultSet;
use crate::types::{DatabaseType, RowValues};

/// One physical database session owned by a pool.
///
/// Implementations keep whatever they need to re-open themselves, so a broken
/// session can be repaired in place by [`reconnect`](DbConnection::reconnect)
/// without the pool allocating a new slot.
#[async_trait]
pub trait DbConnection: Send + 'static {
    /// Run a statement and collect every row it returns.
    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DriverError>;

    /// Run a statement for its side effects, returning the affected row count.
    /// Each call commits on its own (auto-commit).
    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<usize, DriverError>;

    /// Cheap round-trip used as the health probe. Must not touch application data.
    async fn ping(&mut self) -> Result<(), DriverError> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }

    /// Re-establish the session inside this same handle.
    async fn reconnect(&mut self) -> Result<(), DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Opens sessions with the credentials it was built from.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: DbConnection;

    async fn connect(&self) -> Result<Self::Connection, DriverError>;

    fn database_type(&self) -> DatabaseType;
}
