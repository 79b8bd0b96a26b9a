use anyhow::Result;
use env_logger::{Builder, Env};
use log::error;

use snapwarden::SnapConfig;

mod cli;
mod util;
mod cmd_backup;
mod cmd_cleanup;
mod cmd_config;
mod cmd_list;
mod cmd_plan;

fn init_logger(default_level: &str) {
    // Уровень берём из RUST_LOG, иначе LOG_LEVEL, иначе info.
    // Пример: RUST_LOG=debug snapwarden plan
    Builder::from_env(Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn main() {
    let cli = cli::Cli::parse();

    let cfg = match SnapConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            init_logger("info");
            error!("configuration: {e}");
            std::process::exit(1);
        }
    };
    init_logger(&cfg.log_level);

    match run(cli, cfg) {
        Ok(true) => {}
        // run finished but did not reach its goal (not captured / failed deletions)
        Ok(false) => std::process::exit(2),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: cli::Cli, cfg: SnapConfig) -> Result<bool> {
    let cfg = cfg
        .with_volume_id(cli.volume)
        .with_catalog_path(cli.catalog);

    match cli.cmd {
        cli::Cmd::Cleanup { dry_run, json } => cmd_cleanup::exec(&cfg, dry_run, json),

        cli::Cmd::Plan { now, json } => cmd_plan::exec(&cfg, now, json),

        cli::Cmd::Backup { no_freeze, json } => cmd_backup::exec(&cfg, no_freeze, json),

        cli::Cmd::List { json } => cmd_list::exec(&cfg, json),

        cli::Cmd::Config => cmd_config::exec(&cfg),
    }
}
