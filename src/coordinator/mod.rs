//! Consistent-snapshot coordinator.
//!
//! Single-use state machine:
//!
//!   Idle -> Validating -> [Freezing] -> Creating -> Polling
//!        -> {Captured | TimedOut | CreateFailed} -> [Releasing] -> Done
//!
//! Freezing/Releasing only happen when a write freeze was attached with
//! `with_write_freeze`. Once Freezing is entered, Releasing always runs (see
//! release.rs). The outcome is decided before Releasing and is never changed
//! by it; release failures come back as `BackupReport::release_warnings`.
//!
//! Limitation: killing the process between Freezing and Releasing leaves the
//! tables locked (until the mysql session dies) and the filesystem frozen.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{FreezeStep, SnapshotError};
use crate::freeze::WriteFreezeController;
use crate::metrics::{record_backup_outcome, record_poll};
use crate::model::ReplicaStatus;
use crate::store::SnapshotStore;

mod release;

pub use release::FreezePlan;
use release::FreezeScope;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(300);

/// Timestamp appended to the base name. Second granularity: two runs would
/// have to start within the same second to collide.
pub const SNAPSHOT_NAME_TS_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    Validating,
    Freezing,
    Creating,
    Polling,
    Releasing,
    Done,
}

/// Terminal result of one run. Produced exactly once.
#[derive(Debug)]
pub enum CoordinationOutcome {
    Captured {
        snapshot_id: String,
        captured_at: DateTime<Utc>,
    },
    TimedOut {
        snapshot_id: String,
    },
    /// Freeze, create or status query failed.
    CreateFailed(SnapshotError),
    ValidationFailed(SnapshotError),
}

impl CoordinationOutcome {
    pub fn is_captured(&self) -> bool {
        matches!(self, CoordinationOutcome::Captured { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            CoordinationOutcome::Captured { .. } => "captured",
            CoordinationOutcome::TimedOut { .. } => "timed_out",
            CoordinationOutcome::CreateFailed(_) => "create_failed",
            CoordinationOutcome::ValidationFailed(_) => "validation_failed",
        }
    }

    pub fn snapshot_id(&self) -> Option<&str> {
        match self {
            CoordinationOutcome::Captured { snapshot_id, .. }
            | CoordinationOutcome::TimedOut { snapshot_id } => Some(snapshot_id),
            _ => None,
        }
    }
}

impl fmt::Display for CoordinationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinationOutcome::Captured {
                snapshot_id,
                captured_at,
            } => write!(f, "snapshot {snapshot_id} captured at {}", captured_at.to_rfc3339()),
            CoordinationOutcome::TimedOut { snapshot_id } => {
                write!(f, "snapshot {snapshot_id} not captured before timeout")
            }
            CoordinationOutcome::CreateFailed(e) => write!(f, "create failed: {e}"),
            CoordinationOutcome::ValidationFailed(e) => write!(f, "validation failed: {e}"),
        }
    }
}

/// Everything a backup run reports back to the caller.
#[derive(Debug)]
pub struct BackupReport {
    pub outcome: CoordinationOutcome,
    pub release_warnings: Vec<SnapshotError>,
    pub froze: bool,
    pub replica_status: Option<ReplicaStatus>,
    pub snapshot_name: Option<String>,
    pub polls: u32,
    pub transitions: Vec<CoordinatorState>,
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub volume_id: String,
    pub snapshot_name_base: String,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl CoordinatorSettings {
    pub fn new(volume_id: impl Into<String>, snapshot_name_base: impl Into<String>) -> Self {
        Self {
            volume_id: volume_id.into(),
            snapshot_name_base: snapshot_name_base.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }

    pub fn with_poll_timeout(mut self, d: Duration) -> Self {
        self.poll_timeout = d;
        self
    }
}

pub fn snapshot_name(base: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", base, at.format(SNAPSHOT_NAME_TS_FORMAT))
}

pub struct SnapshotLifecycleCoordinator<'a> {
    settings: CoordinatorSettings,
    store: &'a dyn SnapshotStore,
    clock: &'a dyn Clock,
    freeze: Option<(&'a mut dyn WriteFreezeController, FreezePlan)>,
    state: CoordinatorState,
    transitions: Vec<CoordinatorState>,
    polls: u32,
}

impl<'a> SnapshotLifecycleCoordinator<'a> {
    pub fn new(
        settings: CoordinatorSettings,
        store: &'a dyn SnapshotStore,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            settings,
            store,
            clock,
            freeze: None,
            state: CoordinatorState::Idle,
            transitions: vec![CoordinatorState::Idle],
            polls: 0,
        }
    }

    /// Lock tables / freeze the filesystem around the snapshot request.
    pub fn with_write_freeze(
        mut self,
        freezer: &'a mut dyn WriteFreezeController,
        plan: FreezePlan,
    ) -> Self {
        self.freeze = Some((freezer, plan));
        self
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    fn enter(&mut self, next: CoordinatorState) {
        debug!("coordinator: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.transitions.push(next);
    }

    /// Drive the run to completion.
    pub fn run(mut self) -> BackupReport {
        let volume_id = self.settings.volume_id.clone();

        self.enter(CoordinatorState::Validating);
        match self.store.get_volume(&volume_id) {
            Ok(vol) => debug!("volume {} ({}) found", vol.id, vol.name),
            Err(cause) => {
                let outcome = CoordinationOutcome::ValidationFailed(SnapshotError::Validation {
                    volume_id,
                    cause,
                });
                return self.finish(outcome, false, None, None, Vec::new());
            }
        }

        let mut replica_status = None;
        let mut scope = None;
        let mut freeze_failure = None;
        if let Some((freezer, plan)) = self.freeze.take() {
            self.enter(CoordinatorState::Freezing);
            let mut s = FreezeScope::enter(freezer, plan.clone());
            if let Err(e) = freeze_steps(&mut s, &plan, &mut replica_status) {
                error!("{e}");
                freeze_failure = Some(e);
            }
            scope = Some(s);
        }
        let froze = scope.is_some();

        let mut snapshot_name = None;
        let outcome = match freeze_failure {
            Some(e) => CoordinationOutcome::CreateFailed(e),
            None => self.create_and_poll(&mut snapshot_name),
        };

        let release_warnings = match scope {
            Some(s) => {
                self.enter(CoordinatorState::Releasing);
                s.release()
            }
            None => Vec::new(),
        };

        self.finish(outcome, froze, replica_status, snapshot_name, release_warnings)
    }

    fn finish(
        mut self,
        outcome: CoordinationOutcome,
        froze: bool,
        replica_status: Option<ReplicaStatus>,
        snapshot_name: Option<String>,
        release_warnings: Vec<SnapshotError>,
    ) -> BackupReport {
        self.enter(CoordinatorState::Done);
        record_backup_outcome(&outcome);
        match &outcome {
            CoordinationOutcome::Captured { .. } => info!("backup: {outcome}"),
            CoordinationOutcome::TimedOut { .. } => warn!("backup: {outcome}"),
            _ => error!("backup: {outcome}"),
        }
        if !release_warnings.is_empty() {
            warn!(
                "backup: {} release step(s) failed; check tables/filesystem on the host",
                release_warnings.len()
            );
        }
        BackupReport {
            outcome,
            release_warnings,
            froze,
            replica_status,
            snapshot_name,
            polls: self.polls,
            transitions: self.transitions,
        }
    }

    fn create_and_poll(&mut self, snapshot_name: &mut Option<String>) -> CoordinationOutcome {
        self.enter(CoordinatorState::Creating);
        let name = snapshot_name_for(&self.settings.snapshot_name_base, self.clock);
        *snapshot_name = Some(name.clone());

        let created = match self.store.create_snapshot(&self.settings.volume_id, &name) {
            Ok(rec) => rec,
            Err(cause) => {
                let e = SnapshotError::Create { cause };
                error!("{e}");
                return CoordinationOutcome::CreateFailed(e);
            }
        };
        info!("Created snapshot id {} ({})", created.id, created.name);

        self.enter(CoordinatorState::Polling);
        self.poll_until_captured(created.id)
    }

    fn poll_until_captured(&mut self, snapshot_id: String) -> CoordinationOutcome {
        let timeout = chrono::Duration::from_std(self.settings.poll_timeout)
            .unwrap_or(chrono::Duration::MAX);
        let deadline = self
            .clock
            .now()
            .checked_add_signed(timeout)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        loop {
            self.polls += 1;
            record_poll();
            match self.store.get_snapshot(&snapshot_id) {
                Ok(rec) => {
                    debug!("poll #{}: {} is {}", self.polls, rec.id, rec.lifecycle_state);
                    if let Some(captured_at) = rec.captured_at {
                        info!("Snapshot captured_at {}", captured_at.to_rfc3339());
                        return CoordinationOutcome::Captured {
                            snapshot_id,
                            captured_at,
                        };
                    }
                }
                Err(cause) => {
                    let e = SnapshotError::Poll {
                        snapshot_id,
                        cause,
                    };
                    error!("{e}");
                    return CoordinationOutcome::CreateFailed(e);
                }
            }

            // дедлайн проверяется перед каждым сном, и сон не выходит за него
            let now = self.clock.now();
            if now >= deadline {
                return CoordinationOutcome::TimedOut { snapshot_id };
            }
            let remaining = (deadline - now).to_std().unwrap_or_default();
            self.clock.sleep(self.settings.poll_interval.min(remaining));
        }
    }
}

fn snapshot_name_for(base: &str, clock: &dyn Clock) -> String {
    snapshot_name(base, clock.now())
}

fn freeze_steps(
    scope: &mut FreezeScope<'_>,
    plan: &FreezePlan,
    replica_status: &mut Option<ReplicaStatus>,
) -> Result<(), SnapshotError> {
    let freeze_err = |step: FreezeStep| move |cause: anyhow::Error| SnapshotError::Freeze { step, cause };

    if plan.stop_replication {
        let status = scope
            .freezer()
            .stop_replication()
            .map_err(freeze_err(FreezeStep::StopReplication))?;
        scope.mark_replication_stopped();
        info!("replica status at stop: {status:?}");
        *replica_status = Some(status);
    }
    scope
        .freezer()
        .lock_tables()
        .map_err(freeze_err(FreezeStep::LockTables))?;
    scope
        .freezer()
        .sync_filesystems()
        .map_err(freeze_err(FreezeStep::SyncFilesystems))?;
    let mount = scope.mount_point().to_path_buf();
    scope
        .freezer()
        .freeze_filesystem(&mount)
        .map_err(freeze_err(FreezeStep::FreezeFilesystem))?;
    Ok(())
}
