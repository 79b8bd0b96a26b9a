//! Scoped write freeze.
//!
//! A `FreezeScope` exists from the moment the coordinator enters Freezing.
//! Releasing is keyed on the scope, not on the outcome: `release()` runs the
//! unwind on every normal path, and `Drop` runs the same unwind if the run
//! unwinds by panic. Steps are attempted in order, each exactly once, and a
//! failing step never prevents the next one. Replication is restarted only
//! if STOP SLAVE actually succeeded.

use log::{error, info, warn};
use std::path::{Path, PathBuf};

use crate::error::{ReleaseStep, SnapshotError};
use crate::freeze::WriteFreezeController;
use crate::metrics::record_release_failure;

/// What the freeze phase does, and therefore what release must undo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreezePlan {
    pub mount_point: PathBuf,
    pub stop_replication: bool,
}

pub(crate) struct FreezeScope<'f> {
    freezer: &'f mut dyn WriteFreezeController,
    plan: FreezePlan,
    replication_stopped: bool,
    released: bool,
}

impl<'f> FreezeScope<'f> {
    pub(crate) fn enter(freezer: &'f mut dyn WriteFreezeController, plan: FreezePlan) -> Self {
        Self {
            freezer,
            plan,
            replication_stopped: false,
            released: false,
        }
    }

    pub(crate) fn freezer(&mut self) -> &mut dyn WriteFreezeController {
        &mut *self.freezer
    }

    pub(crate) fn mark_replication_stopped(&mut self) {
        self.replication_stopped = true;
    }

    pub(crate) fn mount_point(&self) -> &Path {
        &self.plan.mount_point
    }

    /// Undo the freeze; returns every release failure, in step order.
    pub(crate) fn release(mut self) -> Vec<SnapshotError> {
        self.released = true;
        unwind(&mut *self.freezer, &self.plan.mount_point, self.replication_stopped)
    }
}

impl Drop for FreezeScope<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        error!("write freeze scope dropped without release; unwinding now");
        let _ = unwind(&mut *self.freezer, &self.plan.mount_point, self.replication_stopped);
    }
}

fn unwind(
    freezer: &mut dyn WriteFreezeController,
    mount_point: &Path,
    restart_replication: bool,
) -> Vec<SnapshotError> {
    let mut failures = Vec::new();
    let mut attempt = |step: ReleaseStep, res: anyhow::Result<()>| {
        if let Err(cause) = res {
            let err = SnapshotError::Release { step, cause };
            if failures.is_empty() {
                error!("release: {err}");
            } else {
                warn!("release: {err}");
            }
            record_release_failure();
            failures.push(err);
        }
    };

    attempt(
        ReleaseStep::UnfreezeFilesystem,
        freezer.unfreeze_filesystem(mount_point),
    );
    attempt(ReleaseStep::UnlockTables, freezer.unlock_tables());
    if restart_replication {
        attempt(ReleaseStep::StartReplication, freezer.start_replication());
    }

    if failures.is_empty() {
        info!("release: write activity restored on {}", mount_point.display());
    }
    failures
}
