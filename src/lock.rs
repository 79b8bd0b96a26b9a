//! File-based advisory locking (fs2).
//!
//! Two users:
//! - per-volume run lock: <lock_dir>/<volume_id>.lock, taken non-blocking by
//!   cleanup and backup runs so two runs never touch one volume at once;
//! - catalog lock: <catalog>.lock, shared for reads, exclusive for writes.
//!
//! Lock is released on Drop.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::SnapshotError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
    mode: LockMode,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // closing the file would release it anyway
        let _ = self.file.unlock();
    }
}

fn open_lock_file(path: &Path) -> Result<std::fs::File> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("open lock file {}", path.display()))
}

/// Acquire a lock on `path` in the requested mode. Blocks until acquired.
pub fn acquire_lock(path: &Path, mode: LockMode) -> Result<LockGuard> {
    let file = open_lock_file(path)?;
    match mode {
        LockMode::Shared => file
            .lock_shared()
            .with_context(|| format!("lock_shared {}", path.display()))?,
        LockMode::Exclusive => file
            .lock_exclusive()
            .with_context(|| format!("lock_exclusive {}", path.display()))?,
    }
    Ok(LockGuard {
        file,
        path: path.to_path_buf(),
        mode,
    })
}

pub fn volume_lock_path(lock_dir: &Path, volume_id: &str) -> PathBuf {
    // id приходит от оператора: не даём ему выйти за пределы lock_dir
    let safe: String = volume_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    lock_dir.join(format!("{safe}.lock"))
}

/// Take the run lock for `volume_id` without waiting.
///
/// Returns `SnapshotError::VolumeBusy` if another run holds it.
pub fn try_acquire_volume_lock(lock_dir: &Path, volume_id: &str) -> Result<LockGuard> {
    let path = volume_lock_path(lock_dir, volume_id);
    let file = open_lock_file(&path)?;
    if file.try_lock_exclusive().is_err() {
        return Err(SnapshotError::VolumeBusy {
            volume_id: volume_id.to_string(),
            path: path.display().to_string(),
        }
        .into());
    }
    Ok(LockGuard {
        file,
        path,
        mode: LockMode::Exclusive,
    })
}
