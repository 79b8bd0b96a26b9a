use anyhow::Result;
use chrono::Utc;

use snapwarden::{metrics, run_cleanup, SnapConfig};

use crate::util::{lock_volume, open_store, print_json};

/// Retention sweep. Returns false if any deletion failed.
pub fn exec(cfg: &SnapConfig, dry_run: bool, json: bool) -> Result<bool> {
    cfg.validate()?;
    let volume_id = cfg.require_volume_id()?;
    let policy = cfg.retention_policy()?;

    let _lock = lock_volume(cfg)?;
    let store = open_store(cfg)?;

    let report = run_cleanup(&store, volume_id, policy, Utc::now(), dry_run)?;

    if json {
        print_json(&serde_json::json!({
            "report": report,
            "metrics": metrics::snapshot(),
        }))?;
        return Ok(report.is_clean());
    }

    println!("Cleanup {}{}", volume_id, if dry_run { " (dry run)" } else { "" });
    println!("  listed    = {}", report.listed);
    println!("  eligible  = {}", report.eligible);
    println!("  skipped   = {}", report.skipped);
    println!("  planned   = {}", report.planned.len());
    if dry_run {
        for id in &report.planned {
            println!("  - would delete {id}");
        }
    } else {
        println!("  attempted = {}", report.attempted());
        println!("  deleted   = {}", report.deleted.len());
        println!("  failed    = {}", report.failed.len());
        if report.attempted() > 0 {
            println!("  success   = {:.0}%", metrics::snapshot().delete_success_ratio() * 100.0);
        }
        for f in &report.failed {
            println!("  ! {}: {}", f.snapshot_id, f.error);
        }
    }
    Ok(report.is_clean())
}
