use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use snapwarden::lock::{try_acquire_volume_lock, LockMode};
use snapwarden::store::Catalog;
use snapwarden::{
    run_cleanup, FileSnapshotStore, LifecycleState, RetentionPolicy, SnapshotError,
    SnapshotRecord, SnapshotStore, VolumeInfo,
};

static SEQ: AtomicU64 = AtomicU64::new(0);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("snapw-{prefix}-{pid}-{t}-{n}"))
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 20, 12, 0, 0).unwrap()
}

fn snap(id: &str, age_days: i64, state: LifecycleState) -> SnapshotRecord {
    let created_at = now() - Duration::days(age_days) - Duration::hours(2);
    SnapshotRecord {
        id: id.into(),
        name: format!("my-snap-{id}"),
        created_at,
        lifecycle_state: state,
        deletable: true,
        captured_at: Some(created_at),
        source_volume_id: "vol-a".into(),
    }
}

/// 2 recent, 2 in one mid-tier bucket, 2 expired, 1 expired but still pending.
fn seeded_store(root: &Path) -> Result<FileSnapshotStore> {
    let mut same_bucket = snap("mid-late", 12, LifecycleState::Stable);
    same_bucket.created_at += Duration::minutes(30);
    let cat = Catalog {
        capture_delay_secs: 0,
        volumes: vec![VolumeInfo { id: "vol-a".into(), name: "db-data".into() }],
        snapshots: vec![
            snap("new-1", 1, LifecycleState::Stable),
            snap("new-2", 3, LifecycleState::Stable),
            snap("mid-early", 12, LifecycleState::Stable),
            same_bucket,
            snap("exp-1", 40, LifecycleState::Stable),
            snap("exp-2", 55, LifecycleState::Stable),
            snap("exp-pending", 60, LifecycleState::Pending),
        ],
    };
    FileSnapshotStore::create(&root.join("catalog.json"), &cat)
}

/// Delegates to the catalog but refuses to delete one id.
struct FlakyDeletes<'a> {
    inner: &'a FileSnapshotStore,
    refuse: &'static str,
    fail_listing: bool,
}

impl SnapshotStore for FlakyDeletes<'_> {
    fn list_snapshots(&self, volume_id: &str) -> Result<Vec<SnapshotRecord>> {
        if self.fail_listing {
            return Err(anyhow!("500 internal error"));
        }
        self.inner.list_snapshots(volume_id)
    }
    fn create_snapshot(&self, volume_id: &str, name: &str) -> Result<SnapshotRecord> {
        self.inner.create_snapshot(volume_id, name)
    }
    fn get_snapshot(&self, id: &str) -> Result<SnapshotRecord> {
        self.inner.get_snapshot(id)
    }
    fn delete_snapshot(&self, id: &str) -> Result<()> {
        if id == self.refuse {
            return Err(anyhow!("409 snapshot {id} is busy"));
        }
        self.inner.delete_snapshot(id)
    }
    fn get_volume(&self, id: &str) -> Result<VolumeInfo> {
        self.inner.get_volume(id)
    }
}

fn remaining(store: &FileSnapshotStore) -> Result<Vec<String>> {
    Ok(store.load()?.snapshots.into_iter().map(|s| s.id).collect())
}

#[test]
fn cleanup_deletes_planned_and_keeps_the_rest() -> Result<()> {
    let root = unique_root("cleanup");
    let store = seeded_store(&root)?;

    let report = run_cleanup(&store, "vol-a", RetentionPolicy::default(), now(), false)?;
    assert_eq!(report.listed, 7);
    assert_eq!(report.eligible, 6);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.planned, ["mid-late", "exp-1", "exp-2"]);
    assert_eq!(report.deleted, report.planned);
    assert!(report.is_clean());

    assert_eq!(remaining(&store)?, ["new-1", "new-2", "mid-early", "exp-pending"]);

    // второй проход ничего не удаляет
    let again = run_cleanup(&store, "vol-a", RetentionPolicy::default(), now(), false)?;
    assert!(again.planned.is_empty());

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn dry_run_deletes_nothing() -> Result<()> {
    let root = unique_root("dry");
    let store = seeded_store(&root)?;

    let report = run_cleanup(&store, "vol-a", RetentionPolicy::default(), now(), true)?;
    assert!(report.dry_run);
    assert_eq!(report.planned.len(), 3);
    assert_eq!(report.attempted(), 0);
    assert_eq!(remaining(&store)?.len(), 7);

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn failed_deletion_is_reported_and_run_continues() -> Result<()> {
    let root = unique_root("flaky");
    let store = seeded_store(&root)?;
    let flaky = FlakyDeletes {
        inner: &store,
        refuse: "exp-1",
        fail_listing: false,
    };

    let report = run_cleanup(&flaky, "vol-a", RetentionPolicy::default(), now(), false)?;
    assert_eq!(report.deleted, ["mid-late", "exp-2"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].snapshot_id, "exp-1");
    assert!(report.failed[0].error.contains("409"), "{}", report.failed[0].error);
    assert!(!report.is_clean());
    assert_eq!(report.attempted(), 3);

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn listing_failure_aborts_before_any_delete() -> Result<()> {
    let root = unique_root("listfail");
    let store = seeded_store(&root)?;
    let flaky = FlakyDeletes {
        inner: &store,
        refuse: "",
        fail_listing: true,
    };

    let err = run_cleanup(&flaky, "vol-a", RetentionPolicy::default(), now(), false).unwrap_err();
    assert!(format!("{err:#}").contains("500"), "{err:#}");
    assert_eq!(remaining(&store)?.len(), 7);

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn second_run_on_same_volume_is_refused() -> Result<()> {
    let root = unique_root("lock");

    let held = try_acquire_volume_lock(&root, "vol-a")?;
    assert_eq!(held.mode(), LockMode::Exclusive);
    assert_eq!(held.path(), root.join("vol-a.lock"));
    let err = try_acquire_volume_lock(&root, "vol-a").unwrap_err();
    match err.downcast_ref::<SnapshotError>() {
        Some(SnapshotError::VolumeBusy { volume_id, .. }) => assert_eq!(volume_id, "vol-a"),
        other => panic!("expected VolumeBusy, got {other:?}"),
    }

    // другой том не блокируется
    let _other = try_acquire_volume_lock(&root, "vol-b")?;

    drop(held);
    let _again = try_acquire_volume_lock(&root, "vol-a")?;

    fs::remove_dir_all(&root).ok();
    Ok(())
}
