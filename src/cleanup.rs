//! Cleanup run: list -> classify -> delete.
//!
//! Every classification decision is logged at debug, snapshots that are not
//! stable+deletable at warn, each deletion at info and each failed deletion
//! at error. A failed deletion does not stop the run; it is counted in the
//! report and the remaining ids are still attempted.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::metrics::{record_cleanup_run, record_delete_failure, record_snapshot_deleted};
use crate::policy::RetentionPolicy;
use crate::retention::{Classification, RetentionClassifier};
use crate::store::SnapshotStore;

#[derive(Debug, Clone, Serialize)]
pub struct FailedDeletion {
    pub snapshot_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub volume_id: String,
    pub now: DateTime<Utc>,
    pub dry_run: bool,
    pub listed: usize,
    pub eligible: usize,
    pub skipped: usize,
    pub planned: Vec<String>,
    pub deleted: Vec<String>,
    pub failed: Vec<FailedDeletion>,
}

impl CleanupReport {
    pub fn attempted(&self) -> usize {
        self.deleted.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Emit the decision log of a classification.
pub fn log_classification(c: &Classification) {
    for s in &c.skipped {
        warn!(
            "Found snapshot {} id:{} that is not stable and deletable (state={}, deletable={})",
            s.name, s.snapshot_id, s.lifecycle_state, s.deletable
        );
    }
    for d in &c.decisions {
        debug!("{d}");
    }
}

/// Run one retention sweep for `volume_id` as of `now`.
///
/// Listing failure aborts the run (nothing has been deleted yet); deletion
/// failures are collected into the report.
pub fn run_cleanup(
    store: &dyn SnapshotStore,
    volume_id: &str,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
    dry_run: bool,
) -> Result<CleanupReport> {
    let snapshots = store
        .list_snapshots(volume_id)
        .with_context(|| format!("list snapshots of volume {volume_id}"))?;

    let classification = RetentionClassifier::new(policy).classify(&snapshots, now);
    log_classification(&classification);
    record_cleanup_run(classification.plan.len(), classification.skipped.len());

    info!(
        "cleanup: volume={} listed={} eligible={} skipped={} to_delete={} ({})",
        volume_id,
        snapshots.len(),
        classification.eligible,
        classification.skipped.len(),
        classification.plan.len(),
        policy
    );

    let mut report = CleanupReport {
        volume_id: volume_id.to_string(),
        now,
        dry_run,
        listed: snapshots.len(),
        eligible: classification.eligible,
        skipped: classification.skipped.len(),
        planned: classification.plan.ids().to_vec(),
        deleted: Vec::new(),
        failed: Vec::new(),
    };

    if dry_run {
        for id in classification.plan.iter() {
            info!("dry-run: would delete snapshot {id}");
        }
        return Ok(report);
    }

    for id in classification.plan {
        info!("Deleting snapshot {id}");
        match store.delete_snapshot(&id) {
            Ok(()) => {
                record_snapshot_deleted();
                report.deleted.push(id);
            }
            Err(e) => {
                error!("API call to delete snapshot {id} failed: {e:#}");
                record_delete_failure();
                report.failed.push(FailedDeletion {
                    snapshot_id: id,
                    error: format!("{e:#}"),
                });
            }
        }
    }

    info!(
        "cleanup: attempted={} deleted={} failed={}",
        report.attempted(),
        report.deleted.len(),
        report.failed.len()
    );
    Ok(report)
}
