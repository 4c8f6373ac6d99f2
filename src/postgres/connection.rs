use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};

use crate::error::DriverError;
use crate::pool::DbConnection;
use crate::results::ResultSet;
use crate::types::RowValues;

use super::params::as_refs;
use super::query::build_result_set;

/// Pooled Postgres session: a client plus the task driving its socket.
pub struct PostgresConnection {
    config: Arc<tokio_postgres::Config>,
    client: Option<Client>,
    driver: Option<JoinHandle<()>>,
}

async fn open_session(
    config: &tokio_postgres::Config,
) -> Result<(Client, JoinHandle<()>), DriverError> {
    let (client, connection) = config.connect(NoTls).await?;
    let driver = tokio::spawn(async move {
        if let Err(err) = connection.await {
            tracing::warn!(error = %err, "postgres connection ended with error");
        }
    });
    Ok((client, driver))
}

impl PostgresConnection {
    pub(crate) async fn open(config: Arc<tokio_postgres::Config>) -> Result<Self, DriverError> {
        let (client, driver) = open_session(&config).await?;
        Ok(Self {
            config,
            client: Some(client),
            driver: Some(driver),
        })
    }

    fn client(&self) -> Result<&Client, DriverError> {
        self.client
            .as_ref()
            .filter(|client| !client.is_closed())
            .ok_or(DriverError::Disconnected)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.client().is_ok()
    }

    /// Borrow the raw client for work the pooled API does not cover.
    ///
    /// # Errors
    /// Returns `DriverError::Disconnected` if the session has dropped.
    pub fn raw_client(&self) -> Result<&Client, DriverError> {
        self.client()
    }
}

#[async_trait]
impl DbConnection for PostgresConnection {
    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DriverError> {
        let client = self.client()?;
        let stmt = client.prepare(sql).await?;
        let rows = client.query(&stmt, &as_refs(params)).await?;
        Ok(build_result_set(&stmt, &rows)?)
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<usize, DriverError> {
        let client = self.client()?;
        let affected = client.execute(sql, &as_refs(params)).await?;
        usize::try_from(affected).map_err(|e| {
            DriverError::Other(format!("postgres affected rows conversion error: {e}"))
        })
    }

    async fn ping(&mut self) -> Result<(), DriverError> {
        self.client()?.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), DriverError> {
        self.client = None;
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        let (client, driver) = open_session(&self.config).await?;
        self.client = Some(client);
        self.driver = Some(driver);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        // dropping the client ends the driver task once the socket closes
        self.client = None;
        if let Some(driver) = self.driver.take() {
            driver
                .await
                .map_err(|e| DriverError::Other(format!("postgres driver task error: {e}")))?;
        }
        Ok(())
    }
}

impl fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("hosts", &self.config.get_hosts())
            .field("dbname", &self.config.get_dbname())
            .field("open", &self.is_open())
            .finish()
    }
}
