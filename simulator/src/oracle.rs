use std::collections::HashMap;

use sql_pool::pool::{ConnId, PoolStats};

/// Independent record of which task holds which connection.
///
/// Callers record an acquisition after `acquire` returns and a release before
/// handing the connection back, and sample the pool's stats while holding the
/// oracle's lock, so every recorded holder is also checked out in the pool.
#[derive(Debug, Default)]
pub(crate) struct Oracle {
    owners: HashMap<ConnId, usize>,
}

impl Oracle {
    pub(crate) fn acquired(&mut self, conn: ConnId, task: usize) -> Result<(), String> {
        match self.owners.insert(conn, task) {
            Some(previous) => Err(format!(
                "conn {conn} handed to task {task} while task {previous} still holds it"
            )),
            None => Ok(()),
        }
    }

    pub(crate) fn released(&mut self, conn: ConnId, task: usize) -> Result<(), String> {
        match self.owners.remove(&conn) {
            Some(owner) if owner == task => Ok(()),
            Some(owner) => Err(format!(
                "task {task} released conn {conn} owned by task {owner}"
            )),
            None => Err(format!("task {task} released conn {conn} nobody held")),
        }
    }

    pub(crate) fn check(&self, stats: &PoolStats, open: bool) -> Result<(), String> {
        if stats.idle + stats.checked_out != stats.total {
            return Err(format!(
                "idle {} + checked out {} != total {}",
                stats.idle, stats.checked_out, stats.total
            ));
        }
        if stats.total > stats.max_size {
            return Err(format!(
                "total {} exceeds max size {}",
                stats.total, stats.max_size
            ));
        }
        if open && stats.total != stats.max_size {
            return Err(format!(
                "open pool has {} of {} connections",
                stats.total, stats.max_size
            ));
        }
        if self.owners.len() > stats.checked_out {
            return Err(format!(
                "{} holders recorded but only {} connections checked out",
                self.owners.len(),
                stats.checked_out
            ));
        }
        Ok(())
    }

    pub(crate) fn held(&self) -> usize {
        self.owners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(total: usize, idle: usize, checked_out: usize) -> PoolStats {
        PoolStats {
            max_size: 2,
            total,
            idle,
            checked_out,
            waiting: 0,
        }
    }

    #[test]
    fn double_handout_is_reported() {
        let mut oracle = Oracle::default();
        oracle.acquired(0, 1).expect("first");
        assert!(oracle.acquired(0, 2).is_err());
    }

    #[test]
    fn release_by_non_owner_is_reported() {
        let mut oracle = Oracle::default();
        oracle.acquired(3, 1).expect("first");
        assert!(oracle.released(3, 2).is_err());
    }

    #[test]
    fn stats_invariants() {
        let mut oracle = Oracle::default();
        assert!(oracle.check(&stats(2, 2, 0), true).is_ok());
        assert!(oracle.check(&stats(2, 1, 0), true).is_err());
        assert!(oracle.check(&stats(1, 1, 0), true).is_err());
        assert!(oracle.check(&stats(0, 0, 0), false).is_ok());
        oracle.acquired(0, 0).expect("acquire");
        assert!(oracle.check(&stats(2, 2, 0), true).is_err());
        assert_eq!(oracle.held(), 1);
    }
}
