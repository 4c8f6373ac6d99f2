//! Process-exit hook that drains a pool exactly once.
//!
//! The simplest way to get a drain on every exit path is to run the body of
//! `main` through [`ShutdownHook::run`]:
//!
//! ```rust,no_run
//! use sql_pool::prelude::*;
//! use sql_pool::lifecycle::ShutdownHook;
//! use sql_pool::sqlite::SqliteFactory;
//!
//! # async fn demo() -> Result<(), SqlPoolError> {
//! let pool = ConnectionPool::initialize(SqliteFactory::new("app.db"), PoolConfig::new(4)).await?;
//! let db = Database::new(pool.clone());
//! ShutdownHook::run(pool, async {
//!     db.write("CREATE TABLE IF NOT EXISTS t (id INTEGER)", &[]).await
//! })
//! .await?;
//! # Ok(()) }
//! ```

use std::fmt;
use std::future::Future;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pool::{ConnectionFactory, ConnectionPool};

/// Runs [`ConnectionPool::shutdown`] on Ctrl-C, SIGTERM, an explicit
/// [`shutdown`](Self::shutdown), or when the hook is dropped, whichever comes first.
///
/// Dropping the hook on a multi-thread runtime blocks until the drain is done,
/// so every connection must be back in the pool by then; drop the hook after
/// the connections it guards. A current-thread runtime cannot block inside
/// `drop`, so there the drain finishes only if the runtime keeps running. Use
/// [`run`](Self::run) or [`shutdown`](Self::shutdown) to be independent of
/// the runtime flavor.
pub struct ShutdownHook<F: ConnectionFactory> {
    pool: ConnectionPool<F>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

async fn termination_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl-C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

impl<F: ConnectionFactory> ShutdownHook<F> {
    /// Start watching for termination signals. Must be called inside a tokio runtime.
    #[must_use]
    pub fn register(pool: ConnectionPool<F>) -> Self {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let drain = pool.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                () = trigger.cancelled() => {}
                () = termination_signal() => {}
            }
            tracing::info!("draining connection pool before exit");
            drain.shutdown().await;
        });
        Self {
            pool,
            token,
            handle: Some(handle),
        }
    }

    /// Run `body` with a hook registered, then drain the pool before returning
    /// its output. The drain happens whether `body` returned `Ok` or `Err`.
    pub async fn run<Fut>(pool: ConnectionPool<F>, body: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        let hook = Self::register(pool);
        let output = body.await;
        hook.shutdown().await;
        output
    }

    /// Trigger the drain and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "pool shutdown task failed");
            }
        }
        // covers a hook task that was cancelled before it could drain
        self.pool.shutdown().await;
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl<F: ConnectionFactory> Drop for ShutdownHook<F> {
    fn drop(&mut self) {
        self.token.cancel();
        if self.handle.take().is_none() {
            // already drained through `shutdown`
            return;
        }
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                let pool = self.pool.clone();
                tokio::task::block_in_place(|| handle.block_on(pool.shutdown()));
            }
            Ok(_) => {
                tracing::debug!("shutdown hook dropped on a current-thread runtime; drain left to the hook task");
            }
            Err(_) => {
                tracing::warn!("shutdown hook dropped outside a tokio runtime; pool was not drained");
            }
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for ShutdownHook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHook")
            .field("pool", &self.pool)
            .field("triggered", &self.is_triggered())
            .finish_non_exhaustive()
    }
}
