//! Fixed-capacity connection pool.
//!
//! Every connection is opened up front by [`ConnectionPool::initialize`]. Callers
//! borrow one with [`ConnectionPool::acquire`], which waits while all of them are
//! checked out and validates the one it hands back. Guards return their
//! connection on drop. [`ConnectionPool::shutdown`] waits for every borrowed
//! connection to come back and then closes them all.
//!
//! ```rust,no_run
//! use sql_pool::prelude::*;
//! use sql_pool::sqlite::SqliteFactory;
//!
//! # async fn demo() -> Result<(), SqlPoolError> {
//! let factory = SqliteFactory::new("app.db");
//! let pool = ConnectionPool::initialize(factory, PoolConfig::new(4)).await?;
//! let mut conn = pool.acquire().await?;
//! conn.execute("CREATE TABLE IF NOT EXISTS t (id INTEGER)", &[])
//!     .await
//!     .map_err(SqlPoolError::QueryFailed)?;
//! pool.release(conn);
//! pool.shutdown().await;
//! # Ok(()) }
//! ```

pub mod health;

mod connection;
mod manager;
mod stats;

#[cfg(test)]
mod tests;

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{OnceCell, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::error::SqlPoolError;
use crate::types::DatabaseType;

pub use connection::PooledConnection;
pub use health::RepairOutcome;
pub use manager::{ConnectionFactory, DbConnection};
pub use stats::PoolStats;

/// Identifier of a connection, unique within its pool.
pub type ConnId = u64;

struct IdleConnection<C> {
    id: ConnId,
    conn: C,
}

struct PoolState<C> {
    available: VecDeque<IdleConnection<C>>,
    checked_out: HashSet<ConnId>,
}

pub(crate) struct PoolInner<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    state: Mutex<PoolState<F::Connection>>,
    // One permit per connection sitting in `available`. Permits leave with a
    // checkout and come back after the connection has been checked in.
    permits: Arc<Semaphore>,
    closing: AtomicBool,
    drained: OnceCell<()>,
    waiting: AtomicUsize,
}

impl<F: ConnectionFactory> PoolInner<F> {
    fn lock_state(&self) -> MutexGuard<'_, PoolState<F::Connection>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_available(&self) -> Option<(ConnId, F::Connection)> {
        let mut state = self.lock_state();
        let entry = state.available.pop_front()?;
        state.checked_out.insert(entry.id);
        Some((entry.id, entry.conn))
    }

    pub(crate) fn checkin(&self, id: ConnId, conn: F::Connection) {
        let mut state = self.lock_state();
        if !state.checked_out.remove(&id) {
            tracing::error!(conn_id = id, "connection returned that is not checked out; discarding it");
            return;
        }
        state.available.push_back(IdleConnection { id, conn });
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    async fn drain(&self) {
        self.closing.store(true, Ordering::SeqCst);

        let outstanding = self.lock_state().checked_out.len();
        if outstanding > 0 {
            tracing::info!(outstanding, "shutdown waiting for checked-out connections");
        }

        // Every permit back in hand means every connection is back in `available`.
        // Waiters queued ahead of us get a permit, see `closing`, and hand it straight back.
        let slots = u32::try_from(self.config.max_size).unwrap_or(u32::MAX);
        match self.permits.acquire_many(slots).await {
            Ok(all) => all.forget(),
            Err(_) => tracing::debug!("pool semaphore already closed"),
        }
        self.permits.close();

        let drained: Vec<_> = self.lock_state().available.drain(..).collect();
        let closed = drained.len();
        for mut entry in drained {
            if let Err(err) = entry.conn.close().await {
                tracing::warn!(conn_id = entry.id, error = %err, "error while closing connection");
            }
        }
        tracing::info!(closed, "closed connection pool");
    }
}

/// Counts a caller as blocked on the semaphore for as long as the guard lives,
/// including when the acquire future is dropped mid-wait.
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded pool of connections produced by a [`ConnectionFactory`].
///
/// Cloning is cheap; clones share the same connections.
pub struct ConnectionPool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Clone for ConnectionPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

// Manual Debug implementation because factories are not required to implement `Debug`
impl<F: ConnectionFactory> fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("database_type", &self.inner.factory.database_type())
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Open `config.max_size` connections and make them all available.
    ///
    /// Startup is all-or-nothing: if any connection fails to open, the ones already
    /// opened are closed again and no pool is returned.
    ///
    /// # Errors
    /// Returns `SqlPoolError::ConfigError` for an invalid size, or
    /// `SqlPoolError::PoolInitFailed` wrapping the first connect failure.
    pub async fn initialize(factory: F, config: PoolConfig) -> Result<Self, SqlPoolError> {
        config.validate()?;

        let mut opened = Vec::with_capacity(config.max_size);
        while opened.len() < config.max_size {
            match factory.connect().await {
                Ok(conn) => opened.push(conn),
                Err(source) => {
                    let created = opened.len();
                    for mut conn in opened {
                        if let Err(err) = conn.close().await {
                            tracing::debug!(error = %err, "error closing connection after failed startup");
                        }
                    }
                    tracing::error!(
                        requested = config.max_size,
                        created,
                        error = %source,
                        "connection pool initialization failed"
                    );
                    return Err(SqlPoolError::PoolInitFailed {
                        requested: config.max_size,
                        created,
                        source,
                    });
                }
            }
        }

        let mut available = VecDeque::with_capacity(config.max_size);
        let mut next_id: ConnId = 0;
        for conn in opened {
            available.push_back(IdleConnection { id: next_id, conn });
            next_id += 1;
        }

        tracing::info!(
            size = config.max_size,
            backend = ?factory.database_type(),
            "connection pool initialized"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                factory,
                state: Mutex::new(PoolState {
                    available,
                    checked_out: HashSet::with_capacity(config.max_size),
                }),
                permits: Arc::new(Semaphore::new(config.max_size)),
                config,
                closing: AtomicBool::new(false),
                drained: OnceCell::new(),
                waiting: AtomicUsize::new(0),
            }),
        })
    }

    /// Borrow a connection, waiting until one is available.
    ///
    /// The connection is probed before it is returned and reconnected in place if
    /// the probe fails. A failed reconnect is logged and the connection is handed
    /// out anyway, so callers should expect that one more query may fail; set
    /// [`PoolConfig::strict_repair`] to get `ConnectFailed` instead.
    ///
    /// # Errors
    /// `PoolClosed` once shutdown has started, `AcquireTimeout` if a timeout is
    /// configured and elapses, `ConnectFailed` under strict repair.
    pub async fn acquire(&self) -> Result<PooledConnection<F>, SqlPoolError> {
        match self.inner.config.acquire_timeout {
            Some(limit) => tokio::time::timeout(limit, self.checkout())
                .await
                .map_err(|_| SqlPoolError::AcquireTimeout(limit))?,
            None => self.checkout().await,
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up with `AcquireCancelled` once
    /// `token` is cancelled.
    ///
    /// # Errors
    /// Everything `acquire` returns, plus `AcquireCancelled`.
    pub async fn acquire_with_cancel(
        &self,
        token: &CancellationToken,
    ) -> Result<PooledConnection<F>, SqlPoolError> {
        tokio::select! {
            biased;
            () = token.cancelled() => Err(SqlPoolError::AcquireCancelled),
            conn = self.acquire() => conn,
        }
    }

    async fn checkout(&self) -> Result<PooledConnection<F>, SqlPoolError> {
        if self.inner.is_closing() {
            return Err(SqlPoolError::PoolClosed);
        }

        let permit = match Arc::clone(&self.inner.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(SqlPoolError::PoolClosed),
            Err(TryAcquireError::NoPermits) => {
                let _waiting = WaitingGuard::new(&self.inner.waiting);
                Arc::clone(&self.inner.permits)
                    .acquire_owned()
                    .await
                    .map_err(|_| SqlPoolError::PoolClosed)?
            }
        };
        if self.inner.is_closing() {
            return Err(SqlPoolError::PoolClosed);
        }

        let (id, conn) = self.inner.take_available().ok_or_else(|| {
            SqlPoolError::Internal("permit granted with no available connection".into())
        })?;
        // From here on the guard owns the connection, so dropping this future returns it.
        let mut conn = PooledConnection::new(Arc::clone(&self.inner), id, conn, permit);

        match health::repair(&mut *conn).await {
            RepairOutcome::Healthy => {}
            RepairOutcome::Reconnected => {
                tracing::warn!(conn_id = id, "health probe failed; reconnected in place");
            }
            RepairOutcome::StillBroken(err) => {
                tracing::error!(conn_id = id, error = %err, "reconnect failed");
                if self.inner.config.strict_repair {
                    return Err(SqlPoolError::ConnectFailed(err));
                }
            }
        }

        Ok(conn)
    }

    /// Return a connection to the available set.
    ///
    /// Dropping the guard does the same; this form makes the hand-back explicit.
    /// A guard from a different pool is returned to the pool it came from.
    pub fn release(&self, conn: PooledConnection<F>) {
        if !conn.belongs_to(&self.inner) {
            tracing::warn!(
                conn_id = conn.id(),
                "released a connection owned by another pool; returning it to its owner"
            );
        }
        drop(conn);
    }

    /// Stop handing out connections, wait for every checked-out connection to be
    /// returned, then close them all.
    ///
    /// Waiting and later `acquire` calls fail with `PoolClosed`. Safe to call more
    /// than once and from several tasks; all callers wait for the same drain.
    pub async fn shutdown(&self) {
        self.inner.drained.get_or_init(|| self.inner.drain()).await;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closing()
    }

    /// Number of live connections, checked out or not.
    #[must_use]
    pub fn size(&self) -> usize {
        let state = self.inner.lock_state();
        state.available.len() + state.checked_out.len()
    }

    /// True when no connection is checked out.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.lock_state().checked_out.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock_state();
        let idle = state.available.len();
        let checked_out = state.checked_out.len();
        PoolStats {
            max_size: self.inner.config.max_size,
            total: idle + checked_out,
            idle,
            checked_out,
            waiting: self.inner.waiting.load(Ordering::SeqCst),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn database_type(&self) -> DatabaseType {
        self.inner.factory.database_type()
    }
}
