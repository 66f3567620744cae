// src/config/validate.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::model::{
    ConfigFile, ProcessSettings, RawConfigFile, ReconcilerSettings, RegistrySettings, StorePaths,
    TrackerSettings,
};
use crate::errors::{Result, WardenError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::WardenError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let home = validate_home(&raw.home_dir)?;
        let paths = resolve_paths(&raw, &home);

        let registry = RegistrySettings {
            lock_timeout: nonzero_duration("registry.lock_timeout", &raw.registry.lock_timeout)?,
            lock_poll: nonzero_duration("registry.lock_poll", &raw.registry.lock_poll)?,
        };

        let process = ProcessSettings {
            kill_timeout: nonzero_duration("process.kill_timeout", &raw.process.kill_timeout)?,
            kill_poll: nonzero_duration("process.kill_poll", &raw.process.kill_poll)?,
            default_max_restart: raw.process.default_max_restart,
            interpreter: raw.process.interpreter.clone(),
        };

        if raw.tracker.kill_retries == 0 {
            return Err(WardenError::Config(
                "[tracker].kill_retries must be >= 1 (got 0)".to_string(),
            ));
        }
        let tracker = TrackerSettings {
            reap_interval: nonzero_duration("tracker.reap_interval", &raw.tracker.reap_interval)?,
            kill_retries: raw.tracker.kill_retries,
            kill_retry_delay: nonzero_duration(
                "tracker.kill_retry_delay",
                &raw.tracker.kill_retry_delay,
            )?,
        };

        let reconciler = ReconcilerSettings {
            interval: nonzero_duration("reconciler.interval", &raw.reconciler.interval)?,
        };

        Ok(ConfigFile::new_unchecked(
            home, paths, registry, process, tracker, reconciler,
        ))
    }
}

fn validate_home(home: &Path) -> Result<PathBuf> {
    if home.as_os_str().is_empty() {
        return Err(WardenError::Config("home directory is empty".to_string()));
    }
    if home.is_absolute() {
        return Ok(home.to_path_buf());
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(home))
}

fn resolve_paths(raw: &RawConfigFile, home: &Path) -> StorePaths {
    let resolve = |configured: &Option<PathBuf>, default: &str| match configured {
        Some(p) if p.is_absolute() => p.clone(),
        Some(p) => home.join(p),
        None => home.join(default),
    };

    StorePaths {
        store: resolve(&raw.paths.store, "warden_db.json"),
        lock: resolve(&raw.paths.lock, "warden_db.lock"),
        log_dir: resolve(&raw.paths.log_dir, "log"),
    }
}

fn nonzero_duration(field: &str, value: &str) -> Result<Duration> {
    let dur = parse_duration(value)
        .map_err(|e| WardenError::Config(format!("[{field}] {e}")))?;
    if dur.is_zero() {
        return Err(WardenError::Config(format!(
            "[{field}] must be greater than zero (got '{value}')"
        )));
    }
    Ok(dur)
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
