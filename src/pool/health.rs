//! Health probe and in-place repair run on every checkout.

use super::manager::DbConnection;
use crate::error::DriverError;

/// Result of validating a connection before it is handed out.
#[derive(Debug)]
pub enum RepairOutcome {
    Healthy,
    /// The probe failed and the in-place reconnect succeeded.
    Reconnected,
    /// The probe failed and so did the reconnect; the handle may still be broken.
    StillBroken(DriverError),
}

/// Transport errors raised by the probe count as "unhealthy", never as failures.
pub async fn probe<C: DbConnection + ?Sized>(conn: &mut C) -> bool {
    match conn.ping().await {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(error = %err, "health probe failed");
            false
        }
    }
}

pub async fn repair<C: DbConnection + ?Sized>(conn: &mut C) -> RepairOutcome {
    if probe(conn).await {
        return RepairOutcome::Healthy;
    }
    match conn.reconnect().await {
        Ok(()) => RepairOutcome::Reconnected,
        Err(err) => RepairOutcome::StillBroken(err),
    }
}
