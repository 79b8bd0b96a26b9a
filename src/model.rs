//! Data model shared by the classifier, the coordinator and the backends.
//!
//! Records are produced by the storage backend and are read-only here:
//! nothing in this crate mutates a `SnapshotRecord` after it was observed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Backend lifecycle state of a snapshot.
///
/// Only `Stable` snapshots are considered by retention. Unrecognised backend
/// strings deserialize to `Unknown` instead of failing the whole listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stable,
    Pending,
    Updating,
    Deleting,
    Failed,
    Suspended,
    Unusable,
    Waiting,
    #[serde(other)]
    Unknown,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Stable => "stable",
            LifecycleState::Pending => "pending",
            LifecycleState::Updating => "updating",
            LifecycleState::Deleting => "deleting",
            LifecycleState::Failed => "failed",
            LifecycleState::Suspended => "suspended",
            LifecycleState::Unusable => "unusable",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One snapshot as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub lifecycle_state: LifecycleState,
    pub deletable: bool,
    /// Set by the backend once the snapshot is durably consistent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_volume_id: String,
}

impl SnapshotRecord {
    /// Stable and deletable: the only snapshots retention may act on.
    pub fn is_eligible(&self) -> bool {
        self.lifecycle_state == LifecycleState::Stable && self.deletable
    }

    pub fn is_captured(&self) -> bool {
        self.captured_at.is_some()
    }
}

/// Minimal volume view returned by `SnapshotStore::get_volume`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Replica thread status captured right after replication was stopped.
/// Column name -> value, as reported by the database.
pub type ReplicaStatus = BTreeMap<String, String>;
