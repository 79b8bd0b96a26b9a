use anyhow::{Context, Result};
use chrono::Utc;

use snapwarden::cleanup::log_classification;
use snapwarden::retention::{age_in_days, Action};
use snapwarden::{RetentionClassifier, SnapConfig, SnapshotStore};

use crate::util::{open_store, parse_instant, print_json};

/// Dry classification with the full decision log; never deletes.
pub fn exec(cfg: &SnapConfig, now: Option<String>, json: bool) -> Result<bool> {
    cfg.validate()?;
    let volume_id = cfg.require_volume_id()?;
    let policy = cfg.retention_policy()?;
    let now = match now {
        Some(s) => parse_instant(&s)?,
        None => Utc::now(),
    };

    let store = open_store(cfg)?;
    let snapshots = store
        .list_snapshots(volume_id)
        .with_context(|| format!("list snapshots of volume {volume_id}"))?;
    let c = RetentionClassifier::new(policy).classify(&snapshots, now);
    log_classification(&c);

    if json {
        print_json(&c)?;
        return Ok(true);
    }

    println!("Retention plan for {} as of {} ({})", volume_id, now.to_rfc3339(), policy);
    for d in &c.decisions {
        let mark = match d.action {
            Action::Keep => ' ',
            Action::Delete => 'x',
        };
        println!("  [{mark}] {d}");
    }
    for s in &c.skipped {
        println!(
            "  [?] skip {} ({}): state={} deletable={}",
            s.snapshot_id, s.name, s.lifecycle_state, s.deletable
        );
    }
    println!("Day buckets kept: {}", c.retained_buckets.len());
    for (age, id) in &c.retained_buckets {
        let created = snapshots
            .iter()
            .find(|s| &s.id == id)
            .map(|s| s.created_at.to_rfc3339())
            .unwrap_or_default();
        println!("  - {:3}d -> {} ({})", age, id, created);
    }
    println!("To delete: {}", c.plan.len());
    let oldest = snapshots.iter().map(|s| age_in_days(s.created_at, now)).max();
    if let Some(age) = oldest {
        println!("Oldest snapshot: {age} day(s)");
    }
    Ok(true)
}
