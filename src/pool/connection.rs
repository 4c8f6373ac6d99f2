use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

use super::manager::ConnectionFactory;
use super::{ConnId, PoolInner};

/// A connection checked out of a [`ConnectionPool`](super::ConnectionPool).
///
/// The caller has exclusive use of the connection until the guard is dropped or
/// passed to [`ConnectionPool::release`](super::ConnectionPool::release); either way it
/// goes back to the available set, whether or not the caller's work succeeded.
pub struct PooledConnection<F: ConnectionFactory> {
    pool: Arc<PoolInner<F>>,
    id: ConnId,
    conn: Option<F::Connection>,
    // Dropped after `Drop::drop` has checked the connection in, so a waiter woken by
    // this permit always finds a connection in the available set.
    _permit: OwnedSemaphorePermit,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    pub(super) fn new(
        pool: Arc<PoolInner<F>>,
        id: ConnId,
        conn: F::Connection,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            pool,
            id,
            conn: Some(conn),
            _permit: permit,
        }
    }

    /// Pool-unique identifier of the underlying connection.
    #[must_use]
    pub fn id(&self) -> ConnId {
        self.id
    }

    pub(super) fn belongs_to(&self, pool: &Arc<PoolInner<F>>) -> bool {
        Arc::ptr_eq(&self.pool, pool)
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection is present until drop")
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection is present until drop")
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.checkin(self.id, conn);
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("database_type", &self.pool.factory.database_type())
            .finish_non_exhaustive()
    }
}
