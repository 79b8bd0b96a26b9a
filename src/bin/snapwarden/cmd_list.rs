use anyhow::{Context, Result};
use chrono::Utc;

use snapwarden::retention::age_in_days;
use snapwarden::{SnapConfig, SnapshotStore};

use crate::util::{open_store, print_json};

pub fn exec(cfg: &SnapConfig, json: bool) -> Result<bool> {
    let volume_id = cfg.require_volume_id()?;
    let store = open_store(cfg)?;
    let snapshots = store
        .list_snapshots(volume_id)
        .with_context(|| format!("list snapshots of volume {volume_id}"))?;

    if json {
        print_json(&snapshots)?;
        return Ok(true);
    }
    if snapshots.is_empty() {
        println!("(no snapshots)");
        return Ok(true);
    }

    let now = Utc::now();
    for s in &snapshots {
        println!(
            "{:38} {:28} {:9} {:5} {:4}d {}",
            s.id,
            s.name,
            s.lifecycle_state,
            if s.deletable { "del" } else { "-" },
            age_in_days(s.created_at, now),
            s.created_at.to_rfc3339()
        );
    }
    Ok(true)
}
