use anyhow::Result;
use chrono::{TimeZone, Utc};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use snapwarden::store::Catalog;
use snapwarden::{
    CoordinationOutcome, CoordinatorSettings, FileSnapshotStore, LifecycleState, SnapshotError,
    SnapshotLifecycleCoordinator, SnapshotRecord, SnapshotStore, SystemClock, VolumeInfo,
};

static SEQ: AtomicU64 = AtomicU64::new(0);

/// Уникальный корневой путь для теста.
fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("snapw-{prefix}-{pid}-{t}-{n}"))
}

fn catalog(delay: u64) -> Catalog {
    let t = Utc.with_ymd_and_hms(2023, 1, 1, 20, 35, 13).unwrap();
    Catalog {
        capture_delay_secs: delay,
        volumes: vec![
            VolumeInfo { id: "vol-a".into(), name: "db-data".into() },
            VolumeInfo { id: "vol-b".into(), name: "logs".into() },
        ],
        snapshots: vec![
            SnapshotRecord {
                id: "old-a".into(),
                name: "my-snap-20230101203513".into(),
                created_at: t,
                lifecycle_state: LifecycleState::Stable,
                deletable: true,
                captured_at: Some(t),
                source_volume_id: "vol-a".into(),
            },
            SnapshotRecord {
                id: "locked-a".into(),
                name: "golden".into(),
                created_at: t,
                lifecycle_state: LifecycleState::Stable,
                deletable: false,
                captured_at: Some(t),
                source_volume_id: "vol-a".into(),
            },
            SnapshotRecord {
                id: "old-b".into(),
                name: "logs-20230101".into(),
                created_at: t,
                lifecycle_state: LifecycleState::Stable,
                deletable: true,
                captured_at: Some(t),
                source_volume_id: "vol-b".into(),
            },
        ],
    }
}

#[test]
fn list_filters_by_source_volume() -> Result<()> {
    let root = unique_root("list");
    let store = FileSnapshotStore::create(&root.join("catalog.json"), &catalog(0))?;

    let ids: Vec<_> = store.list_snapshots("vol-a")?.into_iter().map(|s| s.id).collect();
    assert_eq!(ids, ["old-a", "locked-a"]);
    assert!(store.list_snapshots("vol-x")?.is_empty());

    assert_eq!(store.get_volume("vol-b")?.name, "logs");
    assert!(store.get_volume("vol-x").is_err(), "unknown volume must fail");

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn created_snapshot_is_pending_until_captured() -> Result<()> {
    let root = unique_root("capture");
    let path = root.join("catalog.json");

    // без задержки: первый же опрос переводит снимок в stable
    let store = FileSnapshotStore::create(&path, &catalog(0))?;
    let rec = store.create_snapshot("vol-a", "my-snap-new")?;
    assert_eq!(rec.lifecycle_state, LifecycleState::Pending);
    assert!(!rec.deletable);
    assert!(rec.captured_at.is_none());

    let polled = store.get_snapshot(&rec.id)?;
    assert_eq!(polled.lifecycle_state, LifecycleState::Stable);
    assert!(polled.deletable);
    assert_eq!(polled.captured_at, Some(rec.created_at));

    // the promotion is persisted, a fresh handle sees it
    let reopened = FileSnapshotStore::open(&path)?;
    assert_eq!(reopened.path(), path.as_path());
    assert!(reopened.get_snapshot(&rec.id)?.is_captured());

    // с часовой задержкой снимок остаётся pending
    let slow = FileSnapshotStore::create(&root.join("slow.json"), &catalog(3600))?;
    let rec = slow.create_snapshot("vol-a", "my-snap-slow")?;
    let polled = slow.get_snapshot(&rec.id)?;
    assert_eq!(polled.lifecycle_state, LifecycleState::Pending);
    assert!(polled.captured_at.is_none());

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn create_rejects_unknown_volume_and_duplicate_name() -> Result<()> {
    let root = unique_root("create");
    let store = FileSnapshotStore::create(&root.join("catalog.json"), &catalog(0))?;

    assert!(store.create_snapshot("vol-x", "anything").is_err());
    let err = store.create_snapshot("vol-a", "golden").unwrap_err();
    assert!(format!("{err:#}").contains("already in use"), "{err:#}");

    // отказ не должен менять каталог
    assert_eq!(store.load()?.snapshots.len(), 3);

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn delete_respects_deletable_flag() -> Result<()> {
    let root = unique_root("delete");
    let store = FileSnapshotStore::create(&root.join("catalog.json"), &catalog(0))?;

    store.delete_snapshot("old-a")?;
    assert!(store.delete_snapshot("old-a").is_err(), "second delete must fail");
    assert!(store.delete_snapshot("locked-a").is_err(), "non-deletable must stay");

    let left: Vec<_> = store.load()?.snapshots.into_iter().map(|s| s.id).collect();
    assert_eq!(left, ["locked-a", "old-b"]);

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn open_missing_catalog_fails() {
    let root = unique_root("missing");
    assert!(FileSnapshotStore::open(&root.join("nope.json")).is_err());
}

#[test]
fn out_of_range_capture_delay_is_an_error() -> Result<()> {
    let root = unique_root("delay");

    for (i, delay) in [u64::MAX, 1_000_000_000_000_000, i64::MAX as u64].into_iter().enumerate() {
        let store = FileSnapshotStore::create(&root.join(format!("c{i}.json")), &catalog(delay))?;
        let rec = store.create_snapshot("vol-a", "my-snap-far")?;

        let err = store.get_snapshot(&rec.id).unwrap_err();
        assert!(format!("{err:#}").contains("capture_delay_secs"), "{err:#}");

        // снимок не должен считаться захваченным раньше, чем создан
        let stored = store.load()?.snapshots.into_iter().find(|s| s.id == rec.id).unwrap();
        assert_eq!(stored.lifecycle_state, LifecycleState::Pending);
        assert!(stored.captured_at.is_none());
    }

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn backup_against_broken_delay_ends_with_poll_failure() -> Result<()> {
    let root = unique_root("delay-backup");
    let store = FileSnapshotStore::create(&root.join("catalog.json"), &catalog(u64::MAX))?;
    let clock = SystemClock;

    let report =
        SnapshotLifecycleCoordinator::new(CoordinatorSettings::new("vol-a", "db"), &store, &clock)
            .run();

    assert!(matches!(
        report.outcome,
        CoordinationOutcome::CreateFailed(SnapshotError::Poll { .. })
    ));
    assert_eq!(report.polls, 1);

    fs::remove_dir_all(&root).ok();
    Ok(())
}
