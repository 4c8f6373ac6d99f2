use serde::{Deserialize, Serialize};

/// Point-in-time view of a pool's occupancy.
///
/// `idle + checked_out == total <= max_size` holds for every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub max_size: usize,
    /// Live connections (available plus checked out)
    pub total: usize,
    pub idle: usize,
    pub checked_out: usize,
    /// Callers currently suspended in `acquire`
    pub waiting: usize,
}

impl PoolStats {
    /// Fraction of live connections currently checked out, 0.0 for an empty pool.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.checked_out as f64 / self.total as f64
        }
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.idle == 0 && self.total > 0
    }
}
