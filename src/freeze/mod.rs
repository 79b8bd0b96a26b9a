//! Write-freeze seam.
//!
//! - `WriteFreezeController`: database lock / replication / filesystem freeze
//!   primitives used by the coordinator, each reporting success independently.
//! - mysql.rs: long-lived `mysql` client session that holds the table lock.
//! - host.rs: `HostFreezeController` (mysql session + `sync` + `xfs_freeze`).

use anyhow::Result;
use std::path::Path;

use crate::model::ReplicaStatus;

mod host;
mod mysql;

pub use host::{HostFreezeController, HostFreezeSettings, DEFAULT_XFS_FREEZE_BIN};
pub use mysql::{parse_status_rows, MysqlSession, MysqlSettings};

pub trait WriteFreezeController {
    /// Flush tables and take the global read lock. Held until `unlock_tables`.
    fn lock_tables(&mut self) -> Result<()>;
    fn unlock_tables(&mut self) -> Result<()>;

    /// Stop the replica threads and return their status for diagnostics.
    fn stop_replication(&mut self) -> Result<ReplicaStatus>;
    fn start_replication(&mut self) -> Result<()>;

    /// Flush dirty pages of all filesystems to disk.
    fn sync_filesystems(&mut self) -> Result<()>;

    fn freeze_filesystem(&mut self, mount_point: &Path) -> Result<()>;
    fn unfreeze_filesystem(&mut self, mount_point: &Path) -> Result<()>;
}
