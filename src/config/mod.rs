// src/config/mod.rs

//! Configuration loading and validation for warden.
//!
//! - `model.rs`: TOML-backed raw model plus the validated settings.
//! - `loader.rs`: home/config path resolution and file loading.
//! - `validate.rs`: duration parsing, path resolution, sanity checks.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_or_default};
pub use model::{
    ConfigFile, ProcessSettings, RawConfigFile, ReconcilerSettings, RegistrySettings, StorePaths,
    TrackerSettings,
};
pub use validate::parse_duration;
