//! Centralized configuration for snapwarden.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - Same variable names as the cron scripts this tool replaces
//!   (BLOCK_VOLUME_ID, SNAP_NAME, FREEZE_FS, STOP_REPLICA, MOUNT_POINT, ...).
//! - `.env` in the working directory is honoured (real env wins).
//! - `from_lookup` takes any key -> value function, so tests never touch the
//!   process environment.
//!
//! Booleans accept "1|true|yes|on" (case-insensitive); anything else is false.
//! Numbers that do not parse are an error, not a silent default.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coordinator::{CoordinatorSettings, FreezePlan, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};
use crate::error::ConfigError;
use crate::freeze::{HostFreezeSettings, MysqlSettings};
use crate::policy::{RetentionPolicy, DEFAULT_DAILY_WINDOW_DAYS, DEFAULT_RECENT_WINDOW_DAYS};

pub const DEFAULT_SNAP_NAME: &str = "my-snap";

#[derive(Clone, Debug)]
pub struct SnapConfig {
    /// Env: BLOCK_VOLUME_ID (required for every run)
    pub volume_id: Option<String>,
    /// Env: SNAP_NAME (default "my-snap"); a UTC timestamp is appended.
    pub snapshot_name_base: String,

    /// Env: INC_DAYS (default 7)
    pub recent_window_days: u32,
    /// Env: DAILY_DAYS (default 30)
    pub daily_window_days: u32,

    /// Env: FREEZE_FS (default false) — lock tables + freeze filesystem.
    pub freeze_fs: bool,
    /// Env: STOP_REPLICA (default false) — only honoured together with FREEZE_FS.
    pub stop_replica: bool,
    /// Env: MOUNT_POINT (required when FREEZE_FS is on)
    pub mount_point: Option<PathBuf>,

    /// Env: SNAPSHOT_TIMEOUT, seconds (default 300)
    pub poll_timeout: Duration,
    /// Env: SNAPSHOT_POLL_INTERVAL, seconds (default 2)
    pub poll_interval: Duration,

    /// Env: MYSQL_HOST (default "localhost")
    pub mysql_host: String,
    /// Env: MYSQL_USER (default: $USER)
    pub mysql_user: String,
    /// Env: MYSQL_PWD (optional; the client may also use ~/.my.cnf)
    pub mysql_password: Option<String>,
    /// Env: MYSQL_BIN (default "mysql")
    pub mysql_bin: PathBuf,
    /// Env: XFS_FREEZE_BIN (default "/usr/sbin/xfs_freeze")
    pub xfs_freeze_bin: PathBuf,
    /// Env: SYNC_BIN (default "sync")
    pub sync_bin: PathBuf,

    /// Env: SNAP_CATALOG — JSON catalog backend file.
    pub catalog_path: Option<PathBuf>,
    /// Env: SNAP_LOCK_DIR (default: <tmp>/snapwarden)
    pub lock_dir: PathBuf,
    /// Env: LOG_LEVEL (default "info"); RUST_LOG takes precedence.
    pub log_level: String,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            volume_id: None,
            snapshot_name_base: DEFAULT_SNAP_NAME.to_string(),
            recent_window_days: DEFAULT_RECENT_WINDOW_DAYS,
            daily_window_days: DEFAULT_DAILY_WINDOW_DAYS,
            freeze_fs: false,
            stop_replica: false,
            mount_point: None,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            mysql_host: "localhost".to_string(),
            mysql_user: "root".to_string(),
            mysql_password: None,
            mysql_bin: PathBuf::from("mysql"),
            xfs_freeze_bin: PathBuf::from(crate::freeze::DEFAULT_XFS_FREEZE_BIN),
            sync_bin: PathBuf::from("sync"),
            catalog_path: None,
            lock_dir: std::env::temp_dir().join("snapwarden"),
            log_level: "info".to_string(),
        }
    }
}

fn parse_bool(v: &str) -> bool {
    let s = v.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "yes" || s == "on"
}

fn parse_num<T: std::str::FromStr>(var: &'static str, v: &str) -> Result<T, ConfigError> {
    v.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        var,
        value: v.to_string(),
    })
}

fn non_empty(v: String) -> Option<String> {
    let s = v.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl SnapConfig {
    /// Load from the process environment (after `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |k: &str| get(k).and_then(non_empty);

        cfg.volume_id = get("BLOCK_VOLUME_ID");
        if let Some(v) = get("SNAP_NAME") {
            cfg.snapshot_name_base = v;
        }

        if let Some(v) = get("INC_DAYS") {
            cfg.recent_window_days = parse_num("INC_DAYS", &v)?;
        }
        if let Some(v) = get("DAILY_DAYS") {
            cfg.daily_window_days = parse_num("DAILY_DAYS", &v)?;
        }

        if let Some(v) = get("FREEZE_FS") {
            cfg.freeze_fs = parse_bool(&v);
        }
        if let Some(v) = get("STOP_REPLICA") {
            cfg.stop_replica = parse_bool(&v);
        }
        cfg.mount_point = get("MOUNT_POINT").map(PathBuf::from);

        if let Some(v) = get("SNAPSHOT_TIMEOUT") {
            cfg.poll_timeout = Duration::from_secs(parse_num("SNAPSHOT_TIMEOUT", &v)?);
        }
        if let Some(v) = get("SNAPSHOT_POLL_INTERVAL") {
            cfg.poll_interval = Duration::from_secs(parse_num("SNAPSHOT_POLL_INTERVAL", &v)?);
        }

        if let Some(v) = get("MYSQL_HOST") {
            cfg.mysql_host = v;
        }
        if let Some(v) = get("MYSQL_USER").or_else(|| get("USER")) {
            cfg.mysql_user = v;
        }
        cfg.mysql_password = get("MYSQL_PWD");
        if let Some(v) = get("MYSQL_BIN") {
            cfg.mysql_bin = PathBuf::from(v);
        }
        if let Some(v) = get("XFS_FREEZE_BIN") {
            cfg.xfs_freeze_bin = PathBuf::from(v);
        }
        if let Some(v) = get("SYNC_BIN") {
            cfg.sync_bin = PathBuf::from(v);
        }

        cfg.catalog_path = get("SNAP_CATALOG").map(PathBuf::from);
        if let Some(v) = get("SNAP_LOCK_DIR") {
            cfg.lock_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            cfg.log_level = v.to_ascii_lowercase();
        }

        Ok(cfg)
    }

    // Fluent setters (builder-style) to override specific fields.

    pub fn with_volume_id<S: Into<String>>(mut self, id: Option<S>) -> Self {
        if let Some(id) = id {
            self.volume_id = Some(id.into());
        }
        self
    }

    pub fn with_catalog_path<P: Into<PathBuf>>(mut self, path: Option<P>) -> Self {
        if let Some(p) = path {
            self.catalog_path = Some(p.into());
        }
        self
    }

    pub fn with_windows(mut self, recent_days: u32, daily_days: u32) -> Self {
        self.recent_window_days = recent_days;
        self.daily_window_days = daily_days;
        self
    }

    pub fn with_freeze(mut self, mount_point: Option<PathBuf>, stop_replica: bool) -> Self {
        self.freeze_fs = mount_point.is_some();
        self.mount_point = mount_point;
        self.stop_replica = stop_replica;
        self
    }

    pub fn with_poll(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    pub fn with_lock_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.lock_dir = dir.into();
        self
    }

    // ----- typed views -----

    pub fn require_volume_id(&self) -> Result<&str, ConfigError> {
        self.volume_id
            .as_deref()
            .ok_or(ConfigError::Missing("BLOCK_VOLUME_ID"))
    }

    pub fn require_catalog_path(&self) -> Result<&Path, ConfigError> {
        self.catalog_path
            .as_deref()
            .ok_or(ConfigError::Missing("SNAP_CATALOG"))
    }

    pub fn retention_policy(&self) -> Result<RetentionPolicy, ConfigError> {
        Ok(RetentionPolicy::new(
            self.recent_window_days,
            self.daily_window_days,
        )?)
    }

    /// Freeze plan if FREEZE_FS is on; errors if the mount point is missing.
    pub fn freeze_plan(&self) -> Result<Option<FreezePlan>, ConfigError> {
        if !self.freeze_fs {
            return Ok(None);
        }
        let mount_point = self
            .mount_point
            .clone()
            .ok_or(ConfigError::Missing("MOUNT_POINT"))?;
        Ok(Some(FreezePlan {
            mount_point,
            stop_replication: self.stop_replica,
        }))
    }

    pub fn coordinator_settings(&self) -> Result<CoordinatorSettings, ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(
            CoordinatorSettings::new(self.require_volume_id()?, self.snapshot_name_base.clone())
                .with_poll_interval(self.poll_interval)
                .with_poll_timeout(self.poll_timeout),
        )
    }

    pub fn host_freeze_settings(&self) -> HostFreezeSettings {
        HostFreezeSettings {
            mysql: MysqlSettings {
                bin: self.mysql_bin.clone(),
                host: self.mysql_host.clone(),
                user: self.mysql_user.clone(),
                password: self.mysql_password.clone(),
                database: "mysql".to_string(),
            },
            xfs_freeze_bin: self.xfs_freeze_bin.clone(),
            sync_bin: self.sync_bin.clone(),
        }
    }

    /// Checks shared by every command: volume present, policy well-formed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.require_volume_id()?;
        self.retention_policy()?;
        Ok(())
    }
}

impl fmt::Display for SnapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt_path = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(unset)".to_string())
        };
        writeln!(f, "SnapConfig {{")?;
        writeln!(f, "  volume_id          = {}", self.volume_id.as_deref().unwrap_or("(unset)"))?;
        writeln!(f, "  snapshot_name_base = {}", self.snapshot_name_base)?;
        writeln!(f, "  recent_window_days = {}", self.recent_window_days)?;
        writeln!(f, "  daily_window_days  = {}", self.daily_window_days)?;
        writeln!(f, "  freeze_fs          = {}", self.freeze_fs)?;
        writeln!(f, "  stop_replica       = {}", self.stop_replica)?;
        writeln!(f, "  mount_point        = {}", opt_path(&self.mount_point))?;
        writeln!(f, "  poll_interval      = {}s", self.poll_interval.as_secs())?;
        writeln!(f, "  poll_timeout       = {}s", self.poll_timeout.as_secs())?;
        writeln!(f, "  mysql              = {}@{} via {}", self.mysql_user, self.mysql_host, self.mysql_bin.display())?;
        writeln!(
            f,
            "  mysql_password     = {}",
            if self.mysql_password.is_some() { "***" } else { "(unset)" }
        )?;
        writeln!(f, "  xfs_freeze_bin     = {}", self.xfs_freeze_bin.display())?;
        writeln!(f, "  catalog            = {}", opt_path(&self.catalog_path))?;
        writeln!(f, "  lock_dir           = {}", self.lock_dir.display())?;
        write!(f, "}}")
    }
}
