use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sql_pool::prelude::*;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::args::SimConfig;
use crate::logging::EventLog;
use crate::model::{Op, TaskState};
use crate::oracle::Oracle;

type Db = Database<AnyFactory>;
type Conn = PooledConnection<AnyFactory>;

/// State shared by every simulated task.
struct Shared {
    db: Db,
    oracle: Mutex<Oracle>,
    events: Mutex<EventLog>,
    failed: AtomicBool,
    statement_errors: AtomicU64,
}

impl Shared {
    fn oracle(&self) -> MutexGuard<'_, Oracle> {
        self.oracle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: String) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(event);
    }

    fn check(&self) -> Result<(), String> {
        let oracle = self.oracle();
        oracle.check(&self.db.pool().stats(), true)
    }

    fn fail(&self, reason: &str) {
        if !self.failed.swap(true, Ordering::SeqCst) {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .dump_failure(reason);
        }
    }
}

pub(crate) async fn run(config: SimConfig, rng: &mut ChaCha8Rng) -> Result<(), String> {
    // kept alive until the run ends
    let scratch = tempfile::tempdir().map_err(|e| format!("tempdir: {e}"))?;
    let path = config
        .db
        .clone()
        .unwrap_or_else(|| scratch.path().join("simulator.db"));

    let db = open_database(&path, config.pool_size).await?;
    let shared = Arc::new(Shared {
        db,
        oracle: Mutex::new(Oracle::default()),
        events: Mutex::new(EventLog::new(config.first_steps, config.tail_steps)),
        failed: AtomicBool::new(false),
        statement_errors: AtomicU64::new(0),
    });

    let started = Instant::now();
    let deadline = config
        .duration_ms
        .map(|ms| started + Duration::from_millis(ms));

    let mut tasks = JoinSet::new();
    for id in 0..config.tasks {
        let shared = Arc::clone(&shared);
        let config = config.clone();
        let task_rng = ChaCha8Rng::seed_from_u64(rng.random());
        tasks.spawn(async move {
            if let Err(reason) = run_task(id, &shared, &config, task_rng, deadline).await {
                shared.fail(&reason);
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            shared.fail(&format!("task panicked: {err}"));
        }
    }
    if shared.failed.load(Ordering::SeqCst) {
        return Err("invariant violated; see the step dump above".to_string());
    }

    finish(&shared).await?;

    let recorded = shared
        .events
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .recorded();
    tracing::info!(
        "complete: steps={} elapsed={:?} tasks={} pool_size={} statement_errors={}",
        recorded,
        started.elapsed(),
        config.tasks,
        config.pool_size,
        shared.statement_errors.load(Ordering::SeqCst)
    );
    Ok(())
}

async fn open_database(path: &Path, pool_size: usize) -> Result<Db, String> {
    let config = DbConfig::sqlite(path.to_string_lossy()).with_max_pool_size(pool_size);
    let db = Database::from_config(&config)
        .await
        .map_err(|e| format!("open pool: {e}"))?;
    db.write(
        "CREATE TABLE IF NOT EXISTS sim_events (task INTEGER NOT NULL, step INTEGER NOT NULL, note TEXT)",
        &[],
    )
    .await
    .map_err(|e| format!("create table: {e}"))?;
    Ok(db)
}

/// Shut the pool down and confirm it refuses further work.
async fn finish(shared: &Shared) -> Result<(), String> {
    {
        let oracle = shared.oracle();
        if oracle.held() != 0 {
            return Err(format!("{} connections still recorded as held", oracle.held()));
        }
        oracle.check(&shared.db.pool().stats(), true)?;
    }

    shared.db.shutdown().await;

    match shared.db.pool().acquire().await {
        Err(SqlPoolError::PoolClosed) => {}
        Err(other) => return Err(format!("acquire after shutdown failed with {other}")),
        Ok(conn) => {
            return Err(format!(
                "acquire after shutdown returned conn {}",
                conn.id()
            ));
        }
    }
    let stats = shared.db.pool().stats();
    shared.oracle().check(&stats, false)?;
    if stats.total != 0 {
        return Err(format!("{} connections left open after shutdown", stats.total));
    }
    Ok(())
}

async fn run_task(
    id: usize,
    shared: &Shared,
    config: &SimConfig,
    mut rng: ChaCha8Rng,
    deadline: Option<Instant>,
) -> Result<(), String> {
    let mut state = TaskState::new(id);
    let mut held: Option<Conn> = None;

    for step in 0..config.steps_per_task() {
        if shared.failed.load(Ordering::SeqCst) || deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        let op = state.next_op(config, &mut rng);
        let result = apply(shared, &mut state, &mut held, op, step).await?;
        if result.is_err() {
            shared.statement_errors.fetch_add(1, Ordering::SeqCst);
        }

        let conn_label = held
            .as_ref()
            .map_or_else(|| "-".to_string(), |conn| conn.id().to_string());
        let result_label = match result {
            Ok(()) => "Ok".to_string(),
            Err(err) => format!("Err({err})"),
        };
        shared.record(format!(
            "task={id} step={step} op={op:?} conn={conn_label} result={result_label}"
        ));
        shared.check()?;
    }

    if let Some(conn) = held.take() {
        release(shared, &mut state, conn)?;
    }
    Ok(())
}

/// Apply one operation.
///
/// The outer error is an invariant violation that ends the run; the inner one is
/// an ordinary statement failure, expected after a `Break`.
async fn apply(
    shared: &Shared,
    state: &mut TaskState,
    held: &mut Option<Conn>,
    op: Op,
    step: u64,
) -> Result<Result<(), SqlPoolError>, String> {
    let task = i64::try_from(state.id).unwrap_or(i64::MAX);
    let step = i64::try_from(step).unwrap_or(i64::MAX);
    if held.is_some() {
        state.held_for += 1;
    }

    let outcome = match (op, held.as_mut()) {
        (Op::Acquire, None) => {
            let conn = shared
                .db
                .pool()
                .acquire()
                .await
                .map_err(|e| format!("task {} acquire failed: {e}", state.id))?;
            shared.oracle().acquired(conn.id(), state.id)?;
            *held = Some(conn);
            state.holding = true;
            state.held_for = 0;
            Ok(())
        }
        (Op::Read, Some(conn)) => conn
            .query(
                "SELECT COUNT(*) AS n FROM sim_events WHERE task = ?1",
                &[RowValues::Int(task)],
            )
            .await
            .map(|_| ())
            .map_err(SqlPoolError::QueryFailed),
        (Op::Read, None) => shared
            .db
            .read(
                "SELECT note FROM sim_events WHERE task = ?1 ORDER BY step DESC LIMIT 1",
                &[RowValues::Int(task)],
            )
            .await
            .map(|_| ()),
        (Op::Write, Some(conn)) => conn
            .execute(
                "INSERT INTO sim_events (task, step, note) VALUES (?1, ?2, ?3)",
                &[
                    RowValues::Int(task),
                    RowValues::Int(step),
                    RowValues::Text("held".into()),
                ],
            )
            .await
            .map(|_| ())
            .map_err(SqlPoolError::QueryFailed),
        (Op::Write, None) => shared
            .db
            .insert_one(
                "sim_events",
                &[
                    ("task", RowValues::Int(task)),
                    ("step", RowValues::Int(step)),
                    ("note", RowValues::Text("facade".into())),
                ],
            )
            .await
            .map(|_| ()),
        (Op::Hold(ms), Some(_)) => {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(())
        }
        (Op::Break, Some(conn)) => conn.close().await.map_err(SqlPoolError::QueryFailed),
        (Op::Release, Some(_)) => {
            if let Some(conn) = held.take() {
                release(shared, state, conn)?;
            }
            Ok(())
        }
        (Op::Sleep(ms), _) => {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(())
        }
        (op, conn) => {
            return Err(format!(
                "task {} picked {op:?} while holding={}",
                state.id,
                conn.is_some()
            ));
        }
    };
    Ok(outcome)
}

fn release(shared: &Shared, state: &mut TaskState, conn: Conn) -> Result<(), String> {
    let mut oracle = shared.oracle();
    oracle.released(conn.id(), state.id)?;
    shared.db.pool().release(conn);
    state.holding = false;
    state.held_for = 0;
    Ok(())
}
