use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use snapwarden::lock::{try_acquire_volume_lock, LockGuard};
use snapwarden::{FileSnapshotStore, SnapConfig};

/// Open the catalog backend named by SNAP_CATALOG / --catalog.
pub fn open_store(cfg: &SnapConfig) -> Result<FileSnapshotStore> {
    let path = cfg.require_catalog_path()?;
    FileSnapshotStore::open(path).with_context(|| format!("open catalog {}", path.display()))
}

/// Take the per-volume run lock (fails fast if another run holds it).
pub fn lock_volume(cfg: &SnapConfig) -> Result<LockGuard> {
    let volume_id = cfg.require_volume_id()?;
    try_acquire_volume_lock(&cfg.lock_dir, volume_id)
}

pub fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    let t = DateTime::parse_from_rfc3339(s.trim())
        .with_context(|| format!("parse instant '{s}' (expected RFC 3339)"))?;
    Ok(t.with_timezone(&Utc))
}

pub fn print_json<T: serde::Serialize>(v: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(v).context("serialize JSON output")?;
    println!("{s}");
    Ok(())
}
