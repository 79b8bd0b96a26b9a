use anyhow::Result;

use snapwarden::{
    metrics, CoordinationOutcome, HostFreezeController, SnapConfig, SnapshotLifecycleCoordinator,
    SystemClock,
};

use crate::util::{lock_volume, open_store, print_json};

/// One backup run. Returns true only when the snapshot was captured.
pub fn exec(cfg: &SnapConfig, no_freeze: bool, json: bool) -> Result<bool> {
    let settings = cfg.coordinator_settings()?;
    let plan = if no_freeze { None } else { cfg.freeze_plan()? };

    let _lock = lock_volume(cfg)?;
    let store = open_store(cfg)?;
    let clock = SystemClock;

    let mut host = HostFreezeController::new(cfg.host_freeze_settings());
    let mut coordinator = SnapshotLifecycleCoordinator::new(settings, &store, &clock);
    if let Some(plan) = plan {
        coordinator = coordinator.with_write_freeze(&mut host, plan);
    }
    let report = coordinator.run();

    let warnings: Vec<String> = report.release_warnings.iter().map(|w| w.to_string()).collect();
    let cause = match &report.outcome {
        CoordinationOutcome::CreateFailed(e) | CoordinationOutcome::ValidationFailed(e) => {
            Some(e.to_string())
        }
        _ => None,
    };
    let captured_at = match &report.outcome {
        CoordinationOutcome::Captured { captured_at, .. } => Some(captured_at.to_rfc3339()),
        _ => None,
    };

    if json {
        print_json(&serde_json::json!({
            "outcome": report.outcome.label(),
            "snapshot_id": report.outcome.snapshot_id(),
            "snapshot_name": report.snapshot_name,
            "captured_at": captured_at,
            "cause": cause,
            "froze": report.froze,
            "replica_status": report.replica_status,
            "release_warnings": warnings,
            "polls": report.polls,
            "transitions": report.transitions,
            "metrics": metrics::snapshot(),
        }))?;
        return Ok(report.outcome.is_captured());
    }

    println!("Backup {}", cfg.volume_id.as_deref().unwrap_or("(unset)"));
    println!("  outcome   = {}", report.outcome.label());
    println!("  detail    = {}", report.outcome);
    if let Some(name) = &report.snapshot_name {
        println!("  name      = {name}");
    }
    println!("  froze     = {}", report.froze);
    println!("  polls     = {}", report.polls);
    if !warnings.is_empty() {
        println!("Release warnings:");
        for w in &warnings {
            println!("  ! {w}");
        }
    }
    Ok(report.outcome.is_captured())
}
