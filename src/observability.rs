use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Transition outcome counters
#[derive(Debug, Default)]
pub struct TransitionMetrics {
    pub committed: AtomicU64,
    pub rejected: AtomicU64,
    pub conflicts: AtomicU64,
    pub replayed: AtomicU64,
    pub notification_failures: AtomicU64,
    pub audit_failures: AtomicU64,
    pub auto_applied: AtomicU64,
    pub auto_skipped: AtomicU64,
    pub auto_failed: AtomicU64,
}

impl TransitionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_committed(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replayed(&self) {
        self.replayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification_failure(&self) {
        self.notification_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audit_failure(&self) {
        self.audit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auto_applied(&self) {
        self.auto_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auto_skipped(&self) {
        self.auto_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auto_failed(&self) {
        self.auto_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransitionStats {
        TransitionStats {
            committed: self.committed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
            notification_failures: self.notification_failures.load(Ordering::Relaxed),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
            auto_applied: self.auto_applied.load(Ordering::Relaxed),
            auto_skipped: self.auto_skipped.load(Ordering::Relaxed),
            auto_failed: self.auto_failed.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.snapshot();
        info!(
            committed = stats.committed,
            rejected = stats.rejected,
            conflicts = stats.conflicts,
            replayed = stats.replayed,
            notification_failures = stats.notification_failures,
            audit_failures = stats.audit_failures,
            auto_applied = stats.auto_applied,
            auto_skipped = stats.auto_skipped,
            auto_failed = stats.auto_failed,
            "Transition metrics"
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionStats {
    pub committed: u64,
    pub rejected: u64,
    pub conflicts: u64,
    pub replayed: u64,
    pub notification_failures: u64,
    pub audit_failures: u64,
    pub auto_applied: u64,
    pub auto_skipped: u64,
    pub auto_failed: u64,
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
    }
}
