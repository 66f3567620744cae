// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Environment variable overriding the home directory.
pub const HOME_ENV: &str = "WARDEN_HOME";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "WARDEN_CONFIG";

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; durations and paths are checked
/// by [`load_and_validate`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file and validate it against `home_dir`.
pub fn load_and_validate(path: impl AsRef<Path>, home_dir: impl Into<PathBuf>) -> Result<ConfigFile> {
    let mut raw = load_from_path(&path)?;
    raw.home_dir = home_dir.into();
    ConfigFile::try_from(raw)
}

/// Like [`load_and_validate`], but a missing file yields the defaults.
pub fn load_or_default(path: impl AsRef<Path>, home_dir: impl Into<PathBuf>) -> Result<ConfigFile> {
    let path = path.as_ref();
    if path.is_file() {
        debug!(path = ?path, "loading config file");
        return load_and_validate(path, home_dir);
    }

    debug!(path = ?path, "no config file; using defaults");
    ConfigFile::for_home(home_dir)
}

/// Resolve the home directory.
///
/// Priority: explicit value, then `WARDEN_HOME`, then `~/.warden`.
pub fn resolve_home_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(home) = explicit {
        return home.to_path_buf();
    }
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .map(|h| h.join(".warden"))
        .unwrap_or_else(|| PathBuf::from(".warden"))
}

/// Resolve the config file path.
///
/// Priority: explicit value, then `WARDEN_CONFIG`, then `<home>/config.toml`.
pub fn resolve_config_path(explicit: Option<&Path>, home_dir: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(path);
    }
    home_dir.join("config.toml")
}
