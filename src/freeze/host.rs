use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::process::Command;

use super::mysql::{MysqlSession, MysqlSettings};
use super::WriteFreezeController;
use crate::model::ReplicaStatus;

pub const DEFAULT_XFS_FREEZE_BIN: &str = "/usr/sbin/xfs_freeze";

/// How many times `sync` is issued before the freeze.
const SYNC_PASSES: usize = 3;

#[derive(Debug, Clone)]
pub struct HostFreezeSettings {
    pub mysql: MysqlSettings,
    pub xfs_freeze_bin: PathBuf,
    pub sync_bin: PathBuf,
}

/// Freeze controller for a MySQL host with an XFS data volume.
///
/// The mysql session is opened on first use (lock or replica stop) and kept
/// until unlock; dropping the controller closes it, which also drops the lock.
pub struct HostFreezeController {
    settings: HostFreezeSettings,
    session: Option<MysqlSession>,
}

impl HostFreezeController {
    pub fn new(settings: HostFreezeSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    fn session(&mut self) -> Result<&mut MysqlSession> {
        if self.session.is_none() {
            self.session = Some(MysqlSession::connect(&self.settings.mysql)?);
        }
        self.session
            .as_mut()
            .ok_or_else(|| anyhow!("mysql session unavailable"))
    }

    fn run_tool(bin: &Path, args: &[&str]) -> Result<()> {
        debug!("exec: {} {}", bin.display(), args.join(" "));
        let out = Command::new(bin)
            .args(args)
            .output()
            .with_context(|| format!("spawn {}", bin.display()))?;
        if !out.status.success() {
            return Err(anyhow!(
                "{} {} exited with {}: {}",
                bin.display(),
                args.join(" "),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        Ok(())
    }

    fn mount_arg(mount_point: &Path) -> Result<&str> {
        mount_point
            .to_str()
            .ok_or_else(|| anyhow!("mount point {} is not valid UTF-8", mount_point.display()))
    }
}

impl WriteFreezeController for HostFreezeController {
    fn lock_tables(&mut self) -> Result<()> {
        info!("Flushing MySQL tables with READ LOCK");
        self.session()?.execute("FLUSH TABLES WITH READ LOCK")?;
        Ok(())
    }

    fn unlock_tables(&mut self) -> Result<()> {
        info!("Unlocking MySQL tables");
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| anyhow!("no mysql session holds a lock"))?;
        session.execute("UNLOCK TABLES")?;
        Ok(())
    }

    fn stop_replication(&mut self) -> Result<ReplicaStatus> {
        let session = self.session()?;
        session.execute("STOP SLAVE")?;
        let status = session.query_row("SHOW SLAVE STATUS")?;
        info!("Stopped MySQL slave thread");
        Ok(status)
    }

    fn start_replication(&mut self) -> Result<()> {
        info!("Starting MySQL slave thread");
        // the session may have died with a failed unlock; a fresh one is fine here
        if !self.session.as_ref().is_some_and(|s| s.is_open()) {
            self.session = Some(MysqlSession::connect(&self.settings.mysql)?);
        }
        self.session()?.execute("START SLAVE")?;
        Ok(())
    }

    fn sync_filesystems(&mut self) -> Result<()> {
        for _ in 0..SYNC_PASSES {
            Self::run_tool(&self.settings.sync_bin, &[])?;
        }
        Ok(())
    }

    fn freeze_filesystem(&mut self, mount_point: &Path) -> Result<()> {
        info!("Freezing XFS filesystem {}", mount_point.display());
        Self::run_tool(&self.settings.xfs_freeze_bin, &["-f", Self::mount_arg(mount_point)?])
    }

    fn unfreeze_filesystem(&mut self, mount_point: &Path) -> Result<()> {
        info!("Unfreezing XFS filesystem {}", mount_point.display());
        Self::run_tool(&self.settings.xfs_freeze_bin, &["-u", Self::mount_arg(mount_point)?])
    }
}

impl Drop for HostFreezeController {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close() {
                debug!("mysql session close: {e:#}");
            }
        }
    }
}
