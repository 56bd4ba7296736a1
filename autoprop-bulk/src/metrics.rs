//! Counters aggregated across bulk commands

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for bulk coordinator activity since startup.
#[derive(Debug, Default)]
pub struct BulkMetrics {
    pub commands_submitted: AtomicU64,
    pub commands_completed: AtomicU64,
    pub commands_failed: AtomicU64,
    pub items_processed: AtomicU64,
    pub items_errored: AtomicU64,
}

impl BulkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> BulkMetricsSnapshot {
        BulkMetricsSnapshot {
            commands_submitted: self.commands_submitted.load(Ordering::Relaxed),
            commands_completed: self.commands_completed.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            items_processed: self.items_processed.load(Ordering::Relaxed),
            items_errored: self.items_errored.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of bulk metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkMetricsSnapshot {
    pub commands_submitted: u64,
    pub commands_completed: u64,
    pub commands_failed: u64,
    pub items_processed: u64,
    pub items_errored: u64,
}

impl BulkMetricsSnapshot {
    /// Commands neither completed nor failed.
    pub fn commands_running(&self) -> u64 {
        self.commands_submitted
            .saturating_sub(self.commands_completed + self.commands_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reads_counters() {
        let metrics = BulkMetrics::new();
        BulkMetrics::incr(&metrics.commands_submitted);
        BulkMetrics::incr(&metrics.commands_submitted);
        BulkMetrics::incr(&metrics.commands_completed);
        BulkMetrics::incr(&metrics.items_processed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.commands_submitted, 2);
        assert_eq!(snapshot.items_processed, 1);
        assert_eq!(snapshot.commands_running(), 1);
    }
}
