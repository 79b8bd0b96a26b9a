use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Snapshot retention and consistent backups for one database volume.
///
/// Configuration comes from the environment (and ./.env): BLOCK_VOLUME_ID,
/// SNAP_NAME, INC_DAYS, DAILY_DAYS, FREEZE_FS, STOP_REPLICA, MOUNT_POINT,
/// SNAPSHOT_TIMEOUT, MYSQL_HOST/USER/PWD, SNAP_CATALOG, ...
/// Run `snapwarden config` to see the effective values.
#[derive(Parser, Debug)]
#[command(name = "snapwarden", version, about, arg_required_else_help = true)]
pub struct Cli {
    /// Catalog file of the local JSON backend (overrides SNAP_CATALOG)
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Volume id (overrides BLOCK_VOLUME_ID)
    #[arg(long, global = true)]
    pub volume: Option<String>,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Apply the retention policy: delete expired and duplicate-day snapshots.
    ///
    /// Пример:
    ///   snapwarden cleanup --dry-run
    ///   snapwarden cleanup --json
    Cleanup {
        /// Classify and report, delete nothing
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// JSON output (single object)
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print every retention decision without touching the backend.
    ///
    /// --now lets you preview a future sweep, e.g. --now 2024-02-01T00:00:00Z
    Plan {
        /// Evaluate as of this RFC 3339 instant instead of the current time
        #[arg(long)]
        now: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Take a snapshot: validate volume, optional write freeze, create, poll, release.
    ///
    /// Exit code 0 when captured, 2 when timed out or failed.
    Backup {
        /// Skip table lock / filesystem freeze even if FREEZE_FS is set
        #[arg(long, default_value_t = false)]
        no_freeze: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List snapshots of the volume with their age and state.
    List {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the effective configuration (secrets redacted).
    Config,
}

impl Cli {
    pub fn parse() -> Self {
        <Cli as Parser>::parse()
    }
}
