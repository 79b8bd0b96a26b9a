use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{BTreeMap, HashSet};

use snapwarden::retention::{age_in_days, classify, Action, Tier};
use snapwarden::{LifecycleState, RetentionPolicy, SnapshotRecord};

fn rec(id: &str, created_at: DateTime<Utc>) -> SnapshotRecord {
    SnapshotRecord {
        id: id.to_string(),
        name: format!("snap-{id}"),
        created_at,
        lifecycle_state: LifecycleState::Stable,
        deletable: true,
        captured_at: Some(created_at),
        source_volume_id: "r006-vol".to_string(),
    }
}

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn policy() -> RetentionPolicy {
    RetentionPolicy::new(7, 30).unwrap()
}

#[test]
fn empty_input_gives_empty_plan() {
    let c = classify(&[], &policy(), Utc::now());
    assert!(c.plan.is_empty());
    assert!(c.decisions.is_empty());
    assert!(c.retained_buckets.is_empty());
}

#[test]
fn one_per_day_for_forty_days_drops_only_expired() {
    // Scenario: daily snapshots aged 1..=40 days, policy {recent=7, daily=30}
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
    let snaps: Vec<_> = (1..=40)
        .map(|age| rec(&format!("d{age}"), now - Duration::days(age) - Duration::hours(1)))
        .collect();

    let c = classify(&snaps, &policy(), now);

    let expected: Vec<String> = (31..=40).map(|age| format!("d{age}")).collect();
    assert_eq!(c.plan.ids(), expected.as_slice(), "exactly ages 31..40 must go");
    assert_eq!(c.retained_buckets.len(), 23, "ages 8..30 each keep their single snapshot");
    for age in 8..=30 {
        assert_eq!(c.retained_buckets.get(&age), Some(&format!("d{age}")));
    }
}

#[test]
fn same_day_bucket_keeps_earliest() {
    // two snapshots aged 15 days, 00:10 and 12:35 of the same day
    let now = ts("2023-01-20T23:00:00Z");
    let late = rec("late", ts("2023-01-05T12:35:13Z"));
    let early = rec("early", ts("2023-01-05T00:10:13Z"));
    assert_eq!(age_in_days(late.created_at, now), 15);
    assert_eq!(age_in_days(early.created_at, now), 15);

    for order in [vec![late.clone(), early.clone()], vec![early.clone(), late.clone()]] {
        let c = classify(&order, &policy(), now);
        assert_eq!(c.plan.ids(), ["late".to_string()], "arrival order must not matter");
        assert_eq!(c.retained_buckets.get(&15).map(String::as_str), Some("early"));
    }
}

#[test]
fn identical_timestamps_delete_the_later_one() {
    let now = ts("2023-01-10T23:00:00Z");
    let t = ts("2022-12-29T20:35:13Z");
    let c = classify(&[rec("a", t), rec("b", t), rec("c", t)], &policy(), now);
    assert_eq!(c.plan.ids(), ["b".to_string(), "c".to_string()]);
    assert_eq!(c.retained_buckets.values().collect::<Vec<_>>(), vec!["a"]);
}

#[test]
fn boundary_ages_fall_in_lower_tier() {
    let now = ts("2023-06-01T12:00:00Z");
    let at_recent = rec("r7", now - Duration::days(7) - Duration::hours(3));
    let at_daily = rec("d30", now - Duration::days(30) - Duration::hours(3));
    let past_daily = rec("d31", now - Duration::days(31));

    let c = classify(&[at_recent, at_daily, past_daily], &policy(), now);
    let tier = |id: &str| c.decisions.iter().find(|d| d.snapshot_id == id).map(|d| d.tier);
    assert_eq!(tier("r7"), Some(Tier::Recent));
    assert_eq!(tier("d30"), Some(Tier::Daily));
    assert_eq!(tier("d31"), Some(Tier::Expired));
    assert_eq!(c.plan.ids(), ["d31".to_string()]);
}

#[test]
fn unstable_or_undeletable_are_reported_never_deleted() {
    let now = ts("2023-06-01T12:00:00Z");
    let old = now - Duration::days(90);
    let mut pending = rec("pending", old);
    pending.lifecycle_state = LifecycleState::Pending;
    let mut locked = rec("locked", old);
    locked.deletable = false;
    let mut deleting = rec("deleting", old);
    deleting.lifecycle_state = LifecycleState::Deleting;

    let c = classify(&[pending, locked, deleting, rec("stale", old)], &policy(), now);
    assert_eq!(c.plan.ids(), ["stale".to_string()]);
    let skipped: Vec<_> = c.skipped.iter().map(|s| s.snapshot_id.as_str()).collect();
    assert_eq!(skipped, ["pending", "locked", "deleting"]);
    assert_eq!(c.eligible, 1);
}

#[test]
fn legacy_fixture_set() {
    // the fixture set the old cron script shipped with, evaluated on a fixed day
    let now = ts("2023-01-10T23:00:00Z");
    let data = [
        ("asdf-asdf-1", "2022-11-25T20:35:13Z"),
        ("asdf-asdf-2", "2022-12-25T00:35:13Z"),
        ("asdf-asdf-3", "2022-12-25T06:35:13Z"),
        ("asdf-asdf-3a", "2022-12-25T12:35:13Z"),
        ("asdf-asdf-3b", "2022-12-25T00:10:13Z"),
        ("asdf-asdf-4", "2022-12-26T20:35:13Z"),
        ("asdf-asdf-5", "2022-12-27T20:35:13Z"),
        ("asdf-asdf-6", "2022-12-28T20:35:13Z"),
        ("asdf-asdf-7", "2022-12-29T20:35:13Z"),
        ("asdf-asdf-8", "2022-12-29T20:35:13Z"),
        ("asdf-asdf-9", "2022-12-30T20:35:13Z"),
        ("asdf-asdf-10", "2023-01-01T20:35:13Z"),
        ("asdf-asdf-11", "2023-01-01T20:35:13Z"),
        ("asdf-asdf-12", "2023-01-02T20:35:13Z"),
        ("asdf-asdf-13", "2023-01-03T20:35:13Z"),
    ];
    let snaps: Vec<_> = data.iter().map(|(id, t)| rec(id, ts(t))).collect();

    let c = classify(&snaps, &policy(), now);
    assert_eq!(
        c.plan.ids(),
        [
            "asdf-asdf-1",
            "asdf-asdf-3",
            "asdf-asdf-3a",
            "asdf-asdf-2",
            "asdf-asdf-8",
            "asdf-asdf-11"
        ]
        .map(String::from)
    );
    assert_eq!(c.retained_buckets.get(&16).map(String::as_str), Some("asdf-asdf-3b"));
    assert!(c.plan.contains("asdf-asdf-2") && !c.plan.contains("asdf-asdf-3b"));
    // 7 days 2 hours old: still in the recent tier
    let d13 = c.decisions.iter().find(|d| d.snapshot_id == "asdf-asdf-13").unwrap();
    assert_eq!((d13.tier, d13.action), (Tier::Recent, Action::Keep));
}

// ---------- randomized properties ----------

fn random_set(rng: &mut oorandom::Rand64, now: DateTime<Utc>, n: usize) -> Vec<SnapshotRecord> {
    (0..n)
        .map(|i| {
            // up to 45 days back, second resolution; a few land on equal timestamps
            let secs = rng.rand_range(0..45 * 86_400) as i64;
            let secs = if rng.rand_range(0..8) == 0 { secs - secs % 3600 } else { secs };
            let mut r = rec(&format!("s{i}"), now - Duration::seconds(secs));
            match rng.rand_range(0..10) {
                0 => r.lifecycle_state = LifecycleState::Pending,
                1 => r.deletable = false,
                _ => {}
            }
            r
        })
        .collect()
}

#[test]
fn randomized_properties_hold() {
    let mut rng = oorandom::Rand64::new(0x5eed_cafe);
    let now = ts("2024-07-15T08:30:00Z");
    let p = policy();

    for round in 0..200 {
        let n = rng.rand_range(0..60) as usize;
        let snaps = random_set(&mut rng, now, n);
        let c = classify(&snaps, &p, now);
        let deleted: HashSet<&str> = c.plan.iter().collect();
        assert_eq!(deleted.len(), c.plan.len(), "round {round}: duplicate id in plan");

        let mut mid: BTreeMap<i64, Vec<&SnapshotRecord>> = BTreeMap::new();
        for s in &snaps {
            let age = age_in_days(s.created_at, now);
            if !s.is_eligible() {
                assert!(!deleted.contains(s.id.as_str()), "round {round}: ineligible {} deleted", s.id);
                continue;
            }
            if age <= 7 {
                assert!(!deleted.contains(s.id.as_str()), "round {round}: recent {} deleted", s.id);
                assert!(!c.retained_buckets.values().any(|v| v == &s.id));
            } else if age > 30 {
                assert!(deleted.contains(s.id.as_str()), "round {round}: expired {} kept", s.id);
            } else {
                mid.entry(age).or_default().push(s);
            }
        }

        for (age, members) in &mid {
            let survivors: Vec<_> = members.iter().filter(|s| !deleted.contains(s.id.as_str())).collect();
            assert_eq!(survivors.len(), 1, "round {round}: bucket {age} must keep exactly one");
            let min = members.iter().map(|s| s.created_at).min().unwrap();
            assert_eq!(survivors[0].created_at, min, "round {round}: bucket {age} kept a newer one");
            assert_eq!(c.retained_buckets.get(age), Some(&survivors[0].id));
        }

        // idempotence: sweeping the survivors again deletes nothing
        let rest: Vec<_> = snaps.iter().filter(|s| !deleted.contains(s.id.as_str())).cloned().collect();
        let again = classify(&rest, &p, now);
        assert!(again.plan.is_empty(), "round {round}: second pass wants {:?}", again.plan);
    }
}
