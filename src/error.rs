//! Error taxonomy for coordination runs and the layers around them.
//!
//! Collaborators report `anyhow::Error`; it is kept as the `cause` of the
//! matching variant so the whole chain is printed with `{:#}`.

use thiserror::Error;

/// Which write-freeze step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeStep {
    StopReplication,
    LockTables,
    SyncFilesystems,
    FreezeFilesystem,
}

/// Which release (unwind) step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStep {
    UnfreezeFilesystem,
    UnlockTables,
    StartReplication,
}

impl std::fmt::Display for FreezeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FreezeStep::StopReplication => "stop replication",
            FreezeStep::LockTables => "lock tables",
            FreezeStep::SyncFilesystems => "sync filesystems",
            FreezeStep::FreezeFilesystem => "freeze filesystem",
        })
    }
}

impl std::fmt::Display for ReleaseStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ReleaseStep::UnfreezeFilesystem => "unfreeze filesystem",
            ReleaseStep::UnlockTables => "unlock tables",
            ReleaseStep::StartReplication => "start replication",
        })
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Volume lookup failed; nothing was touched.
    #[error("volume {volume_id} validation failed: {cause:#}")]
    Validation {
        volume_id: String,
        cause: anyhow::Error,
    },

    #[error("write freeze failed at '{step}': {cause:#}")]
    Freeze {
        step: FreezeStep,
        cause: anyhow::Error,
    },

    #[error("snapshot create request rejected: {cause:#}")]
    Create { cause: anyhow::Error },

    #[error("snapshot {snapshot_id} status query failed: {cause:#}")]
    Poll {
        snapshot_id: String,
        cause: anyhow::Error,
    },

    #[error("release step '{step}' failed: {cause:#}")]
    Release {
        step: ReleaseStep,
        cause: anyhow::Error,
    },

    #[error("another run holds the lock for volume {volume_id} ({path})")]
    VolumeBusy { volume_id: String, path: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("recent window ({recent} days) must be shorter than daily window ({daily} days)")]
    WindowOrder { recent: u32, daily: u32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{var}: cannot parse '{value}'")]
    Invalid { var: &'static str, value: String },

    #[error("poll interval must be non-zero")]
    ZeroPollInterval,

    #[error(transparent)]
    Policy(#[from] PolicyError),
}
