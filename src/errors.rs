// src/errors.rs

//! Crate-wide error type and helpers.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid record: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store decoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("process id {0} already exists")]
    IdExists(u32),

    #[error("process name '{0}' already exists")]
    NameExists(String),

    #[error(
        "process '{name}' reached its restart limit ({restart}/{max_restart}); reset it before starting again"
    )]
    RestartLimit {
        name: String,
        restart: u32,
        max_restart: u32,
    },

    #[error("cannot start '{name}': {detail}")]
    ExecutableNotFound { name: String, detail: String },

    #[error("timed out after {waited:?} waiting for store lock {path:?} (held by {owner})")]
    LockTimeout {
        path: PathBuf,
        waited: Duration,
        owner: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification used when turning errors into control outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Target matched nothing.
    NotFound,
    /// Id or name collision on create.
    Conflict,
    /// Restart ceiling reached.
    Policy,
    /// Lock, IO or encoding failure around the store.
    Storage,
    /// Bad input or configuration.
    Invalid,
}

impl WardenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WardenError::NotFound(_) | WardenError::ExecutableNotFound { .. } => {
                ErrorKind::NotFound
            }
            WardenError::IdExists(_) | WardenError::NameExists(_) => ErrorKind::Conflict,
            WardenError::RestartLimit { .. } => ErrorKind::Policy,
            WardenError::Io(_)
            | WardenError::Json(_)
            | WardenError::LockTimeout { .. }
            | WardenError::Other(_) => ErrorKind::Storage,
            WardenError::Config(_) | WardenError::Validation(_) | WardenError::Toml(_) => {
                ErrorKind::Invalid
            }
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WardenError>;
