//! Lightweight global metrics.
//!
//! Потокобезопасные атомарные счётчики:
//! - Cleanup (runs, planned / deleted / failed deletions, skipped snapshots)
//! - Backup (outcomes, status polls)
//! - Release (failed unwind steps)

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::coordinator::CoordinationOutcome;

// ----- Cleanup -----
static CLEANUP_RUNS: AtomicU64 = AtomicU64::new(0);
static SNAPSHOTS_PLANNED: AtomicU64 = AtomicU64::new(0);
static SNAPSHOTS_DELETED: AtomicU64 = AtomicU64::new(0);
static DELETE_FAILURES: AtomicU64 = AtomicU64::new(0);
static SNAPSHOTS_SKIPPED: AtomicU64 = AtomicU64::new(0);

// ----- Backup -----
static BACKUPS_CAPTURED: AtomicU64 = AtomicU64::new(0);
static BACKUPS_TIMED_OUT: AtomicU64 = AtomicU64::new(0);
static BACKUPS_FAILED: AtomicU64 = AtomicU64::new(0);
static STATUS_POLLS: AtomicU64 = AtomicU64::new(0);

// ----- Release -----
static RELEASE_FAILURES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub cleanup_runs: u64,
    pub snapshots_planned: u64,
    pub snapshots_deleted: u64,
    pub delete_failures: u64,
    pub snapshots_skipped: u64,

    pub backups_captured: u64,
    pub backups_timed_out: u64,
    pub backups_failed: u64,
    pub status_polls: u64,

    pub release_failures: u64,
}

impl MetricsSnapshot {
    pub fn delete_success_ratio(&self) -> f64 {
        let total = self.snapshots_deleted + self.delete_failures;
        if total == 0 {
            0.0
        } else {
            self.snapshots_deleted as f64 / total as f64
        }
    }
}

// ----- Recorders (Cleanup) -----
pub fn record_cleanup_run(planned: usize, skipped: usize) {
    CLEANUP_RUNS.fetch_add(1, Ordering::Relaxed);
    SNAPSHOTS_PLANNED.fetch_add(planned as u64, Ordering::Relaxed);
    SNAPSHOTS_SKIPPED.fetch_add(skipped as u64, Ordering::Relaxed);
}

pub fn record_snapshot_deleted() {
    SNAPSHOTS_DELETED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_delete_failure() {
    DELETE_FAILURES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Backup) -----
pub fn record_poll() {
    STATUS_POLLS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_backup_outcome(outcome: &CoordinationOutcome) {
    let counter = match outcome {
        CoordinationOutcome::Captured { .. } => &BACKUPS_CAPTURED,
        CoordinationOutcome::TimedOut { .. } => &BACKUPS_TIMED_OUT,
        CoordinationOutcome::CreateFailed(_) | CoordinationOutcome::ValidationFailed(_) => {
            &BACKUPS_FAILED
        }
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Release) -----
pub fn record_release_failure() {
    RELEASE_FAILURES.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        cleanup_runs: CLEANUP_RUNS.load(Ordering::Relaxed),
        snapshots_planned: SNAPSHOTS_PLANNED.load(Ordering::Relaxed),
        snapshots_deleted: SNAPSHOTS_DELETED.load(Ordering::Relaxed),
        delete_failures: DELETE_FAILURES.load(Ordering::Relaxed),
        snapshots_skipped: SNAPSHOTS_SKIPPED.load(Ordering::Relaxed),

        backups_captured: BACKUPS_CAPTURED.load(Ordering::Relaxed),
        backups_timed_out: BACKUPS_TIMED_OUT.load(Ordering::Relaxed),
        backups_failed: BACKUPS_FAILED.load(Ordering::Relaxed),
        status_polls: STATUS_POLLS.load(Ordering::Relaxed),

        release_failures: RELEASE_FAILURES.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    CLEANUP_RUNS.store(0, Ordering::Relaxed);
    SNAPSHOTS_PLANNED.store(0, Ordering::Relaxed);
    SNAPSHOTS_DELETED.store(0, Ordering::Relaxed);
    DELETE_FAILURES.store(0, Ordering::Relaxed);
    SNAPSHOTS_SKIPPED.store(0, Ordering::Relaxed);

    BACKUPS_CAPTURED.store(0, Ordering::Relaxed);
    BACKUPS_TIMED_OUT.store(0, Ordering::Relaxed);
    BACKUPS_FAILED.store(0, Ordering::Relaxed);
    STATUS_POLLS.store(0, Ordering::Relaxed);

    RELEASE_FAILURES.store(0, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SnapshotError;

    #[test]
    fn counters_accumulate_and_reset() {
        reset();
        record_cleanup_run(3, 1);
        record_snapshot_deleted();
        record_snapshot_deleted();
        record_delete_failure();
        record_poll();
        record_backup_outcome(&CoordinationOutcome::CreateFailed(SnapshotError::Create {
            cause: anyhow::anyhow!("rejected"),
        }));

        let m = snapshot();
        assert_eq!(m.cleanup_runs, 1);
        assert_eq!(m.snapshots_planned, 3);
        assert_eq!(m.snapshots_skipped, 1);
        assert_eq!(m.backups_failed, 1);
        assert!((m.delete_success_ratio() - 2.0 / 3.0).abs() < 1e-9);

        reset();
        let m = snapshot();
        assert_eq!(m.snapshots_deleted, 0);
        assert_eq!(m.delete_success_ratio(), 0.0);
    }
}
