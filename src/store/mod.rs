//! Storage backend seam.
//!
//! - `SnapshotStore`: what the core needs from the block storage API.
//! - catalog.rs: `FileSnapshotStore`, a JSON catalog backend for dry runs,
//!   demos and tests (the cloud client itself lives outside this crate).

use anyhow::Result;

use crate::model::{SnapshotRecord, VolumeInfo};

mod catalog;

pub use catalog::{Catalog, FileSnapshotStore};

/// Block storage API as seen by cleanup and backup runs.
///
/// Every call reports success or failure independently; implementations
/// should attach enough context (status code, id) to the error for the
/// operator log.
pub trait SnapshotStore {
    /// Snapshots whose source is `volume_id`, in backend order.
    fn list_snapshots(&self, volume_id: &str) -> Result<Vec<SnapshotRecord>>;

    /// Request a new snapshot of `volume_id` named `name`.
    fn create_snapshot(&self, volume_id: &str, name: &str) -> Result<SnapshotRecord>;

    /// Current state of one snapshot; `captured_at` is set once captured.
    fn get_snapshot(&self, id: &str) -> Result<SnapshotRecord>;

    fn delete_snapshot(&self, id: &str) -> Result<()>;

    /// Fails if the volume does not exist or is not reachable.
    fn get_volume(&self, id: &str) -> Result<VolumeInfo>;
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for &T {
    fn list_snapshots(&self, volume_id: &str) -> Result<Vec<SnapshotRecord>> {
        (**self).list_snapshots(volume_id)
    }
    fn create_snapshot(&self, volume_id: &str, name: &str) -> Result<SnapshotRecord> {
        (**self).create_snapshot(volume_id, name)
    }
    fn get_snapshot(&self, id: &str) -> Result<SnapshotRecord> {
        (**self).get_snapshot(id)
    }
    fn delete_snapshot(&self, id: &str) -> Result<()> {
        (**self).delete_snapshot(id)
    }
    fn get_volume(&self, id: &str) -> Result<VolumeInfo> {
        (**self).get_volume(id)
    }
}
