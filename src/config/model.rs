// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Configuration as read from `<home>/config.toml`.
///
/// ```toml
/// [paths]
/// store = "warden_db.json"
/// lock = "warden_db.lock"
/// log_dir = "log"
///
/// [registry]
/// lock_timeout = "10s"
///
/// [process]
/// kill_timeout = "5s"
/// default_max_restart = 1000
///
/// [tracker]
/// reap_interval = "500ms"
///
/// [reconciler]
/// interval = "5s"
/// ```
///
/// Every section is optional. Relative paths are resolved against the home
/// directory, durations use the `"250ms" | "3s" | "1m" | "2h"` format.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    /// Not part of the file; filled in by the loader.
    #[serde(skip)]
    pub home_dir: PathBuf,

    #[serde(default)]
    pub paths: RawPathsSection,

    #[serde(default)]
    pub registry: RawRegistrySection,

    #[serde(default)]
    pub process: RawProcessSection,

    #[serde(default)]
    pub tracker: RawTrackerSection,

    #[serde(default)]
    pub reconciler: RawReconcilerSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPathsSection {
    #[serde(default)]
    pub store: Option<PathBuf>,
    #[serde(default)]
    pub lock: Option<PathBuf>,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRegistrySection {
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout: String,
    #[serde(default = "default_lock_poll")]
    pub lock_poll: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawProcessSection {
    #[serde(default = "default_kill_timeout")]
    pub kill_timeout: String,
    #[serde(default = "default_kill_poll")]
    pub kill_poll: String,
    #[serde(default = "default_max_restart")]
    pub default_max_restart: u32,
    /// Interpreter prepended to every command unless a record sets its own.
    #[serde(default)]
    pub interpreter: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTrackerSection {
    #[serde(default = "default_reap_interval")]
    pub reap_interval: String,
    #[serde(default = "default_kill_retries")]
    pub kill_retries: u32,
    #[serde(default = "default_kill_retry_delay")]
    pub kill_retry_delay: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawReconcilerSection {
    #[serde(default = "default_reconcile_interval")]
    pub interval: String,
}

fn default_lock_timeout() -> String {
    "10s".to_string()
}

fn default_lock_poll() -> String {
    "50ms".to_string()
}

fn default_kill_timeout() -> String {
    "5s".to_string()
}

fn default_kill_poll() -> String {
    "100ms".to_string()
}

fn default_max_restart() -> u32 {
    1000
}

fn default_reap_interval() -> String {
    "500ms".to_string()
}

fn default_kill_retries() -> u32 {
    100
}

fn default_kill_retry_delay() -> String {
    "50ms".to_string()
}

fn default_reconcile_interval() -> String {
    "5s".to_string()
}

impl Default for RawRegistrySection {
    fn default() -> Self {
        Self {
            lock_timeout: default_lock_timeout(),
            lock_poll: default_lock_poll(),
        }
    }
}

impl Default for RawProcessSection {
    fn default() -> Self {
        Self {
            kill_timeout: default_kill_timeout(),
            kill_poll: default_kill_poll(),
            default_max_restart: default_max_restart(),
            interpreter: None,
        }
    }
}

impl Default for RawTrackerSection {
    fn default() -> Self {
        Self {
            reap_interval: default_reap_interval(),
            kill_retries: default_kill_retries(),
            kill_retry_delay: default_kill_retry_delay(),
        }
    }
}

impl Default for RawReconcilerSection {
    fn default() -> Self {
        Self {
            interval: default_reconcile_interval(),
        }
    }
}

/// Validated configuration with resolved paths and parsed durations.
///
/// Construct through `ConfigFile::try_from(raw)` or [`ConfigFile::for_home`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub home_dir: PathBuf,
    pub paths: StorePaths,
    pub registry: RegistrySettings,
    pub process: ProcessSettings,
    pub tracker: TrackerSettings,
    pub reconciler: ReconcilerSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub store: PathBuf,
    pub lock: PathBuf,
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Upper bound on waiting for the store lock.
    pub lock_timeout: Duration,
    pub lock_poll: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSettings {
    /// How long a tree-kill waits for members to exit.
    pub kill_timeout: Duration,
    pub kill_poll: Duration,
    pub default_max_restart: u32,
    pub interpreter: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    pub reap_interval: Duration,
    pub kill_retries: u32,
    pub kill_retry_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerSettings {
    pub interval: Duration,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        home_dir: PathBuf,
        paths: StorePaths,
        registry: RegistrySettings,
        process: ProcessSettings,
        tracker: TrackerSettings,
        reconciler: ReconcilerSettings,
    ) -> Self {
        Self {
            home_dir,
            paths,
            registry,
            process,
            tracker,
            reconciler,
        }
    }

    /// Default configuration rooted at `home_dir`.
    pub fn for_home(home_dir: impl Into<PathBuf>) -> crate::errors::Result<Self> {
        let raw = RawConfigFile {
            home_dir: home_dir.into(),
            ..RawConfigFile::default()
        };
        ConfigFile::try_from(raw)
    }
}
