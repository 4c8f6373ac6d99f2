use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::test_utils::MockFactory;

async fn pool_of(size: usize) -> (ConnectionPool<MockFactory>, MockFactory) {
    let factory = MockFactory::new();
    let pool = ConnectionPool::initialize(factory.clone(), PoolConfig::new(size))
        .await
        .expect("pool");
    (pool, factory)
}

#[tokio::test]
async fn initialize_opens_every_connection_up_front() {
    let (pool, factory) = pool_of(3).await;
    assert_eq!(factory.opened(), 3);
    assert_eq!(pool.size(), 3);
    assert!(pool.is_idle());
    let stats = pool.stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.idle, 3);
    assert_eq!(stats.checked_out, 0);
    assert_eq!(stats.max_size, 3);
}

#[tokio::test]
async fn initialize_failure_closes_partial_pool() {
    let factory = MockFactory::failing_after(2);
    let err = ConnectionPool::initialize(factory.clone(), PoolConfig::new(4))
        .await
        .expect_err("third connect fails");
    match err {
        SqlPoolError::PoolInitFailed {
            requested, created, ..
        } => {
            assert_eq!(requested, 4);
            assert_eq!(created, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(factory.closed(), 2);
}

#[tokio::test]
async fn zero_sized_pool_is_rejected() {
    let err = ConnectionPool::initialize(MockFactory::new(), PoolConfig::new(0))
        .await
        .expect_err("invalid size");
    assert!(matches!(err, SqlPoolError::ConfigError(_)));
}

#[tokio::test]
async fn acquire_and_release_track_checked_out_set() {
    let (pool, _factory) = pool_of(2).await;
    let conn = pool.acquire().await.expect("conn");
    assert!(!pool.is_idle());
    assert_eq!(pool.stats().checked_out, 1);
    assert_eq!(pool.stats().idle, 1);
    pool.release(conn);
    assert!(pool.is_idle());
    assert_eq!(pool.size(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_holders_never_share_a_connection() {
    let (pool, _factory) = pool_of(3).await;
    let held = Arc::new(Mutex::new(HashSet::new()));
    let mut tasks = JoinSet::new();

    for _ in 0..12 {
        let pool = pool.clone();
        let held = Arc::clone(&held);
        tasks.spawn(async move {
            for _ in 0..25 {
                let conn = pool.acquire().await.expect("conn");
                let id = conn.id();
                assert!(
                    held.lock().unwrap().insert(id),
                    "connection {id} handed to two callers"
                );
                tokio::task::yield_now().await;
                let stats = pool.stats();
                assert_eq!(stats.idle + stats.checked_out, stats.total);
                assert!(stats.total <= stats.max_size);
                held.lock().unwrap().remove(&id);
                pool.release(conn);
            }
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.expect("task");
    }
    assert!(pool.is_idle());
    assert_eq!(pool.size(), 3);
}

#[tokio::test]
async fn third_caller_waits_for_a_release() {
    let (pool, _factory) = pool_of(2).await;
    let first = pool.acquire().await.expect("first");
    let second = pool.acquire().await.expect("second");
    assert_ne!(first.id(), second.id());

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|c| c.id()) })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());
    assert_eq!(pool.stats().waiting, 1);

    let released = first.id();
    pool.release(first);
    let got = timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter woke")
        .expect("join")
        .expect("conn");
    assert_eq!(got, released);
    drop(second);
    assert!(pool.is_idle());
}

#[tokio::test]
async fn broken_connection_is_reconnected_on_acquire() {
    let (pool, factory) = pool_of(1).await;
    let mut conn = pool.acquire().await.expect("conn");
    conn.sever();
    let id = conn.id();
    drop(conn);

    let conn = pool.acquire().await.expect("repaired");
    assert_eq!(conn.id(), id, "repair reuses the same handle");
    assert!(conn.is_alive());
    assert_eq!(factory.reconnects(), 1);
    assert_eq!(factory.opened(), 1, "no extra connection is opened");
}

#[tokio::test]
async fn failed_reconnect_still_hands_out_connection() {
    let (pool, factory) = pool_of(1).await;
    factory.set_fail_reconnect(true);
    let mut conn = pool.acquire().await.expect("conn");
    conn.sever();
    drop(conn);

    let mut conn = pool.acquire().await.expect("broken connection returned anyway");
    assert!(!conn.is_alive());
    assert_eq!(factory.reconnects(), 1);
    let err = conn.query("SELECT 1", &[]).await.expect_err("still broken");
    assert!(matches!(err, crate::error::DriverError::Disconnected));
    drop(conn);

    factory.set_fail_reconnect(false);
    let conn = pool.acquire().await.expect("conn");
    assert!(conn.is_alive());
}

#[tokio::test]
async fn strict_repair_raises_connect_failed() {
    let factory = MockFactory::new();
    let pool = ConnectionPool::initialize(
        factory.clone(),
        PoolConfig::new(1).with_strict_repair(true),
    )
    .await
    .expect("pool");
    factory.set_fail_reconnect(true);
    let mut conn = pool.acquire().await.expect("conn");
    conn.sever();
    drop(conn);

    let err = pool.acquire().await.expect_err("strict");
    assert!(matches!(err, SqlPoolError::ConnectFailed(_)));
    assert!(pool.is_idle(), "unrepaired connection goes back to the pool");
    assert_eq!(pool.size(), 1);
}

#[tokio::test]
async fn acquire_timeout_applies_when_configured() {
    let factory = MockFactory::new();
    let pool = ConnectionPool::initialize(
        factory,
        PoolConfig::new(1).with_acquire_timeout(Duration::from_millis(30)),
    )
    .await
    .expect("pool");
    let _held = pool.acquire().await.expect("conn");
    let err = pool.acquire().await.expect_err("timeout");
    assert!(matches!(err, SqlPoolError::AcquireTimeout(_)));
    assert_eq!(pool.stats().waiting, 0);
}

#[tokio::test]
async fn cancelled_acquire_gives_up() {
    let (pool, _factory) = pool_of(1).await;
    let held = pool.acquire().await.expect("conn");
    let token = CancellationToken::new();
    let waiter = {
        let pool = pool.clone();
        let token = token.clone();
        tokio::spawn(async move { pool.acquire_with_cancel(&token).await.map(|c| c.id()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();
    let res = waiter.await.expect("join");
    assert!(matches!(res, Err(SqlPoolError::AcquireCancelled)));
    drop(held);
    assert!(pool.is_idle());
    assert_eq!(pool.stats().waiting, 0);
}

#[tokio::test]
async fn release_to_wrong_pool_returns_to_owner() {
    let (a, _fa) = pool_of(1).await;
    let (b, _fb) = pool_of(1).await;
    let conn = a.acquire().await.expect("conn");
    b.release(conn);
    assert!(a.is_idle());
    assert!(b.is_idle());
    assert_eq!(a.size(), 1);
    assert_eq!(b.size(), 1);
}

#[tokio::test]
async fn shutdown_waits_for_outstanding_connections() {
    let (pool, factory) = pool_of(3).await;
    let c1 = pool.acquire().await.expect("c1");
    let c2 = pool.acquire().await.expect("c2");

    let shutdown = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.shutdown().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!shutdown.is_finished());
    assert!(pool.is_closed());
    assert!(matches!(pool.acquire().await, Err(SqlPoolError::PoolClosed)));

    drop(c1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!shutdown.is_finished());
    pool.release(c2);

    timeout(Duration::from_secs(1), shutdown)
        .await
        .expect("drain finished")
        .expect("join");
    assert_eq!(factory.closed(), 3);
    assert_eq!(pool.size(), 0);
    assert!(matches!(pool.acquire().await, Err(SqlPoolError::PoolClosed)));
}

#[tokio::test]
async fn shutdown_fails_pending_waiters() {
    let (pool, _factory) = pool_of(1).await;
    let held = pool.acquire().await.expect("conn");
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|c| c.id()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let shutdown = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.shutdown().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(held);

    let res = timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter finished")
        .expect("join");
    assert!(matches!(res, Err(SqlPoolError::PoolClosed)));
    timeout(Duration::from_secs(1), shutdown)
        .await
        .expect("drain finished")
        .expect("join");
}

#[tokio::test]
async fn shutdown_runs_once() {
    let (pool, factory) = pool_of(2).await;
    tokio::join!(pool.shutdown(), pool.shutdown());
    pool.shutdown().await;
    assert_eq!(factory.closed(), 2);
    assert!(pool.is_closed());
}

#[tokio::test]
async fn dropped_acquire_future_does_not_leak() {
    let (pool, _factory) = pool_of(1).await;
    let held = pool.acquire().await.expect("conn");
    let attempt = timeout(Duration::from_millis(10), pool.acquire()).await;
    assert!(attempt.is_err());
    drop(held);
    let again = pool.acquire().await.expect("conn");
    assert_eq!(pool.stats().checked_out, 1);
    drop(again);
    assert!(pool.is_idle());
}

#[tokio::test]
async fn health_probe_maps_errors_to_unhealthy() {
    let factory = MockFactory::new();
    let mut conn = factory.connect().await.expect("conn");
    assert!(health::probe(&mut conn).await);
    conn.sever();
    assert!(!health::probe(&mut conn).await);
    assert!(matches!(
        health::repair(&mut conn).await,
        RepairOutcome::Reconnected
    ));
    assert!(matches!(
        health::repair(&mut conn).await,
        RepairOutcome::Healthy
    ));
}

#[tokio::test]
async fn waiting_counts_only_blocked_callers() {
    let (pool, _factory) = pool_of(2).await;
    let first = pool.acquire().await.expect("first");
    let second = pool.acquire().await.expect("second");
    assert_eq!(pool.stats().waiting, 0);

    let blocked = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|c| c.id()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(pool.stats().waiting, 1);

    pool.release(first);
    timeout(Duration::from_secs(1), blocked)
        .await
        .expect("woke")
        .expect("join")
        .expect("conn");
    assert_eq!(pool.stats().waiting, 0);

    drop(second);
    let again = pool.acquire().await.expect("free slot");
    assert_eq!(pool.stats().waiting, 0);
    drop(again);
}
