//! Retention classifier.
//!
//! Pure function of (snapshots, policy, now): no I/O, no logging of its own.
//! The caller gets the delete plan plus a decision log that explains every
//! verdict (tier, bucket, which snapshot won the comparison), and logs it.
//!
//! Mid-tier buckets are keyed by age in whole days (not by calendar day) and
//! keep the chronologically oldest member. Buckets are resolved in input
//! order with a strict `<` on `created_at`, so for equal timestamps the
//! snapshot seen later is the one deleted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::model::SnapshotRecord;
use crate::policy::RetentionPolicy;

const SECS_PER_DAY: i64 = 86_400;

/// Retention tier a snapshot falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Recent,
    Daily,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Keep,
    Delete,
}

/// Why a decision was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reason {
    /// Younger than (or exactly) the recent window.
    WithinRecentWindow,
    /// Older than the daily window.
    PastDailyWindow,
    /// First snapshot seen for this bucket.
    BucketCandidate,
    /// Same bucket as `kept`, which is at least as old.
    NewerThanCandidate { kept: String },
    /// Was the bucket candidate until an older snapshot `by` arrived.
    ReplacedByOlder { by: String },
}

/// One entry of the decision log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub snapshot_id: String,
    pub age_days: i64,
    pub tier: Tier,
    pub action: Action,
    pub reason: Reason,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.action {
            Action::Keep => "keep",
            Action::Delete => "delete",
        };
        write!(f, "{verb} {} (age {}d): ", self.snapshot_id, self.age_days)?;
        match &self.reason {
            Reason::WithinRecentWindow => write!(f, "within recent window"),
            Reason::PastDailyWindow => write!(f, "older than daily window"),
            Reason::BucketCandidate => write!(f, "oldest so far in day bucket {}", self.age_days),
            Reason::NewerThanCandidate { kept } => {
                write!(f, "newer than {kept} in day bucket {}", self.age_days)
            }
            Reason::ReplacedByOlder { by } => {
                write!(f, "superseded by older {by} in day bucket {}", self.age_days)
            }
        }
    }
}

/// Snapshot that retention refused to act on (not stable or not deletable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub snapshot_id: String,
    pub name: String,
    pub lifecycle_state: String,
    pub deletable: bool,
}

/// Ids to delete, in the order they were marked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionPlan {
    ids: Vec<String>,
}

impl DeletionPlan {
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|x| x == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(|s| s.as_str())
    }
}

impl IntoIterator for DeletionPlan {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}

/// Full classifier output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Classification {
    pub plan: DeletionPlan,
    pub decisions: Vec<Decision>,
    /// Mid tier keep map: age in days -> id of the surviving snapshot.
    pub retained_buckets: BTreeMap<i64, String>,
    pub skipped: Vec<Skipped>,
    pub eligible: usize,
}

/// Whole days elapsed between `created_at` and `now`, floored.
/// A timestamp in the future yields a negative age.
pub fn age_in_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_seconds().div_euclid(SECS_PER_DAY)
}

pub fn tier_for_age(age_days: i64, policy: &RetentionPolicy) -> Tier {
    if age_days > i64::from(policy.daily_window_days()) {
        Tier::Expired
    } else if age_days > i64::from(policy.recent_window_days()) {
        Tier::Daily
    } else {
        Tier::Recent
    }
}

/// Stateless classifier bound to one policy.
#[derive(Debug, Clone, Copy)]
pub struct RetentionClassifier {
    policy: RetentionPolicy,
}

impl RetentionClassifier {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    pub fn classify(&self, snapshots: &[SnapshotRecord], now: DateTime<Utc>) -> Classification {
        classify(snapshots, &self.policy, now)
    }
}

// Accumulator of the fold. Candidates borrow from the input slice.
#[derive(Default)]
struct Acc<'a> {
    delete: Vec<String>,
    decisions: Vec<Decision>,
    buckets: BTreeMap<i64, &'a SnapshotRecord>,
    skipped: Vec<Skipped>,
    eligible: usize,
}

impl<'a> Acc<'a> {
    fn mark(&mut self, snap: &SnapshotRecord, age_days: i64, tier: Tier, action: Action, reason: Reason) {
        if action == Action::Delete {
            self.delete.push(snap.id.clone());
        }
        self.decisions.push(Decision {
            snapshot_id: snap.id.clone(),
            age_days,
            tier,
            action,
            reason,
        });
    }

    fn step(mut self, snap: &'a SnapshotRecord, policy: &RetentionPolicy, now: DateTime<Utc>) -> Self {
        if !snap.is_eligible() {
            self.skipped.push(Skipped {
                snapshot_id: snap.id.clone(),
                name: snap.name.clone(),
                lifecycle_state: snap.lifecycle_state.to_string(),
                deletable: snap.deletable,
            });
            return self;
        }
        self.eligible += 1;

        let age = age_in_days(snap.created_at, now);
        match tier_for_age(age, policy) {
            Tier::Expired => {
                self.mark(snap, age, Tier::Expired, Action::Delete, Reason::PastDailyWindow)
            }
            Tier::Recent => {
                self.mark(snap, age, Tier::Recent, Action::Keep, Reason::WithinRecentWindow)
            }
            Tier::Daily => match self.buckets.get(&age).copied() {
                None => {
                    self.buckets.insert(age, snap);
                    self.mark(snap, age, Tier::Daily, Action::Keep, Reason::BucketCandidate);
                }
                Some(kept) if snap.created_at < kept.created_at => {
                    // новый старше текущего кандидата: кандидат уходит в удаление
                    self.buckets.insert(age, snap);
                    self.mark(
                        kept,
                        age,
                        Tier::Daily,
                        Action::Delete,
                        Reason::ReplacedByOlder { by: snap.id.clone() },
                    );
                    self.mark(snap, age, Tier::Daily, Action::Keep, Reason::BucketCandidate);
                }
                Some(kept) => self.mark(
                    snap,
                    age,
                    Tier::Daily,
                    Action::Delete,
                    Reason::NewerThanCandidate { kept: kept.id.clone() },
                ),
            },
        }
        self
    }
}

/// Classify `snapshots` against `policy` as of `now`.
///
/// Total over any input; an empty slice yields an empty plan.
pub fn classify(
    snapshots: &[SnapshotRecord],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Classification {
    let acc = snapshots
        .iter()
        .fold(Acc::default(), |acc, snap| acc.step(snap, policy, now));

    Classification {
        plan: DeletionPlan { ids: acc.delete },
        decisions: acc.decisions,
        retained_buckets: acc
            .buckets
            .into_iter()
            .map(|(age, snap)| (age, snap.id.clone()))
            .collect(),
        skipped: acc.skipped,
        eligible: acc.eligible,
    }
}
