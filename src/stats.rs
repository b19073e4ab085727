//! Aggregate run counters.
//!
//! A single [`RunStats`] is shared by every worker task; all mutation goes
//! through atomic increments, so the counters can be read at any time by the
//! progress reporter or a CLI progress bar without taking a lock.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters updated as items reach terminal states.
#[derive(Debug, Default)]
pub struct RunStats {
    succeeded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a terminal success (converted now, or artifact already stored).
    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a terminal failure (permanent or transient).
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an item interrupted by shutdown before reaching a terminal
    /// state. Not counted as attempted.
    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time snapshot of the counters.
    pub fn report(&self) -> RunReport {
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        RunReport {
            attempted: succeeded + failed,
            succeeded,
            failed,
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of a run's aggregate counts, returned by [`crate::run::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Items that reached a terminal state (success or failure).
    pub attempted: u64,
    /// Items whose artifact exists (converted this run or previously).
    pub succeeded: u64,
    /// Items that failed, permanently or transiently.
    pub failed: u64,
    /// Items interrupted by shutdown before a terminal state.
    pub cancelled: u64,
}
