use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::DriverError;
use crate::pool::{ConnectionFactory, DbConnection};
use crate::results::ResultSet;
use crate::types::{DatabaseType, RowValues};

#[derive(Debug, Default)]
struct MockState {
    opened: AtomicUsize,
    closed: AtomicUsize,
    reconnects: AtomicUsize,
    executed: AtomicUsize,
    fail_connect_after: Mutex<Option<usize>>,
    fail_reconnect: AtomicBool,
    last_statement: Mutex<Option<(String, Vec<RowValues>)>>,
}

impl MockState {
    fn record(&self, sql: &str, params: &[RowValues]) {
        self.executed.fetch_add(1, Ordering::SeqCst);
        *self
            .last_statement
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((sql.to_string(), params.to_vec()));
    }
}

/// Factory of in-memory connections whose failures are scripted by the test.
///
/// Clones share counters and switches, so a test can keep one clone while the
/// pool owns another.
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    state: Arc<MockState>,
}

impl MockFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the first `successes` connects succeed and refuse every later one.
    #[must_use]
    pub fn failing_after(successes: usize) -> Self {
        let factory = Self::default();
        *factory
            .state
            .fail_connect_after
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(successes);
        factory
    }

    pub fn set_fail_reconnect(&self, fail: bool) {
        self.state.fail_reconnect.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn reconnects(&self) -> usize {
        self.state.reconnects.load(Ordering::SeqCst)
    }

    /// Statements run through `query` or `execute`, probes excluded.
    #[must_use]
    pub fn executed(&self) -> usize {
        self.state.executed.load(Ordering::SeqCst)
    }

    /// SQL and parameters of the most recent statement.
    #[must_use]
    pub fn last_statement(&self) -> Option<(String, Vec<RowValues>)> {
        self.state
            .last_statement
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<MockConnection, DriverError> {
        let limit = *self
            .state
            .fail_connect_after
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if limit.is_some_and(|limit| self.opened() >= limit) {
            return Err(DriverError::Other("connection refused".into()));
        }
        let serial = self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            serial,
            alive: true,
            state: Arc::clone(&self.state),
        })
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }
}

/// Connection produced by [`MockFactory`].
///
/// `query` answers with a single `serial` column; any statement containing
/// `FAIL` errors out.
#[derive(Debug)]
pub struct MockConnection {
    serial: usize,
    alive: bool,
    state: Arc<MockState>,
}

impl MockConnection {
    /// Order in which the factory opened this connection.
    #[must_use]
    pub fn serial(&self) -> usize {
        self.serial
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Simulate the server dropping the session.
    pub fn sever(&mut self) {
        self.alive = false;
    }

    fn check(&self, sql: &str) -> Result<(), DriverError> {
        if !self.alive {
            return Err(DriverError::Disconnected);
        }
        if sql.contains("FAIL") {
            return Err(DriverError::Other(format!("statement failed: {sql}")));
        }
        Ok(())
    }
}

#[async_trait]
impl DbConnection for MockConnection {
    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DriverError> {
        self.check(sql)?;
        self.state.record(sql, params);
        let mut rs = ResultSet::with_columns(vec!["serial".to_string()], 1);
        rs.add_row_values(vec![RowValues::Int(
            i64::try_from(self.serial).unwrap_or(i64::MAX),
        )]);
        Ok(rs)
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<usize, DriverError> {
        self.check(sql)?;
        self.state.record(sql, params);
        Ok(1)
    }

    async fn ping(&mut self) -> Result<(), DriverError> {
        if self.alive {
            Ok(())
        } else {
            Err(DriverError::Disconnected)
        }
    }

    async fn reconnect(&mut self) -> Result<(), DriverError> {
        self.state.reconnects.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_reconnect.load(Ordering::SeqCst) {
            return Err(DriverError::Other("reconnect refused".into()));
        }
        self.alive = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.alive = false;
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
