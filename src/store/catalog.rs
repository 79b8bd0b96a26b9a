//! JSON catalog backend.
//!
//! Формат: <catalog>.json
//! {
//!   "capture_delay_secs": 0,
//!   "volumes":   [{"id":"r006-...","name":"db-data"}],
//!   "snapshots": [{"id":"...","name":"...","created_at":"2023-01-01T20:35:13Z",
//!                  "lifecycle_state":"stable","deletable":true,
//!                  "captured_at":"...","source_volume_id":"r006-..."}]
//! }
//!
//! Notes:
//! - Reads take a shared lock on <catalog>.lock, mutations an exclusive one.
//! - Writes are atomic via tmp+rename.
//! - A new snapshot is `pending` until `capture_delay_secs` have passed since
//!   its creation; the first `get_snapshot` after that promotes it to
//!   `stable`/deletable with `captured_at` set, like a real backend would.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::SnapshotStore;
use crate::lock::{acquire_lock, LockMode};
use crate::model::{LifecycleState, SnapshotRecord, VolumeInfo};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub capture_delay_secs: u64,
    #[serde(default)]
    pub volumes: Vec<VolumeInfo>,
    #[serde(default)]
    pub snapshots: Vec<SnapshotRecord>,
}

#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
    lock_path: PathBuf,
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".lock");
    PathBuf::from(s)
}

impl FileSnapshotStore {
    /// Open an existing catalog file.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow!("catalog {} does not exist", path.display()));
        }
        Ok(Self {
            path: path.to_path_buf(),
            lock_path: lock_path_for(path),
        })
    }

    /// Create (or overwrite) a catalog file with `catalog` as content.
    pub fn create(path: &Path, catalog: &Catalog) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
            }
        }
        let store = Self {
            path: path.to_path_buf(),
            lock_path: lock_path_for(path),
        };
        let _g = acquire_lock(&store.lock_path, LockMode::Exclusive)?;
        store.save(catalog)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole catalog under a shared lock.
    pub fn load(&self) -> Result<Catalog> {
        let _g = acquire_lock(&self.lock_path, LockMode::Shared)?;
        self.read()
    }

    fn read(&self) -> Result<Catalog> {
        let bytes = fs::read(&self.path).with_context(|| format!("read {}", self.path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parse catalog {}", self.path.display()))
    }

    fn save(&self, catalog: &Catalog) -> Result<()> {
        let mut tmp = self.path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .with_context(|| format!("open {}", tmp.display()))?;

        let data = serde_json::to_vec_pretty(catalog).context("serialize catalog")?;
        f.write_all(&data)?;
        let _ = f.sync_all();

        fs::rename(&tmp, &self.path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), self.path.display()))?;
        Ok(())
    }

    /// Load, apply `f`, save, all under the exclusive lock.
    fn update<R>(&self, f: impl FnOnce(&mut Catalog) -> Result<R>) -> Result<R> {
        let _g = acquire_lock(&self.lock_path, LockMode::Exclusive)?;
        let mut catalog = self.read()?;
        let out = f(&mut catalog)?;
        self.save(&catalog)?;
        Ok(out)
    }
}

/// Moment a snapshot created at `created_at` counts as captured.
/// A delay that does not fit the calendar is a catalog error, not a panic.
fn capture_time(created_at: DateTime<Utc>, delay_secs: u64) -> Result<DateTime<Utc>> {
    i64::try_from(delay_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|d| created_at.checked_add_signed(d))
        .ok_or_else(|| anyhow!("catalog: capture_delay_secs={delay_secs} is out of range"))
}

impl SnapshotStore for FileSnapshotStore {
    fn list_snapshots(&self, volume_id: &str) -> Result<Vec<SnapshotRecord>> {
        let catalog = self.load()?;
        Ok(catalog
            .snapshots
            .into_iter()
            .filter(|s| s.source_volume_id == volume_id)
            .collect())
    }

    fn create_snapshot(&self, volume_id: &str, name: &str) -> Result<SnapshotRecord> {
        self.update(|catalog| {
            if !catalog.volumes.iter().any(|v| v.id == volume_id) {
                return Err(anyhow!("create snapshot: volume {volume_id} not found"));
            }
            if catalog.snapshots.iter().any(|s| s.name == name) {
                return Err(anyhow!("create snapshot: name '{name}' is already in use"));
            }
            let rec = SnapshotRecord {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                created_at: Utc::now(),
                lifecycle_state: LifecycleState::Pending,
                deletable: false,
                captured_at: None,
                source_volume_id: volume_id.to_string(),
            };
            debug!("catalog: created {} ({}) for volume {}", rec.id, rec.name, volume_id);
            catalog.snapshots.push(rec.clone());
            Ok(rec)
        })
    }

    fn get_snapshot(&self, id: &str) -> Result<SnapshotRecord> {
        self.update(|catalog| {
            let delay_secs = catalog.capture_delay_secs;
            let snap = catalog
                .snapshots
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| anyhow!("get snapshot: {id} not found"))?;

            if snap.lifecycle_state == LifecycleState::Pending {
                let ready_at = capture_time(snap.created_at, delay_secs)?;
                if Utc::now() >= ready_at {
                    snap.lifecycle_state = LifecycleState::Stable;
                    snap.deletable = true;
                    snap.captured_at = Some(ready_at);
                    debug!("catalog: snapshot {} captured at {}", snap.id, ready_at);
                }
            }
            Ok(snap.clone())
        })
    }

    fn delete_snapshot(&self, id: &str) -> Result<()> {
        self.update(|catalog| {
            let idx = catalog
                .snapshots
                .iter()
                .position(|s| s.id == id)
                .ok_or_else(|| anyhow!("delete snapshot: {id} not found"))?;
            if !catalog.snapshots[idx].deletable {
                return Err(anyhow!("delete snapshot: {id} is not deletable"));
            }
            catalog.snapshots.remove(idx);
            Ok(())
        })
    }

    fn get_volume(&self, id: &str) -> Result<VolumeInfo> {
        let catalog = self.load()?;
        catalog
            .volumes
            .into_iter()
            .find(|v| v.id == id)
            .ok_or_else(|| anyhow!("get volume: {id} not found"))
    }
}
