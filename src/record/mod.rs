// src/record/mod.rs

//! Supervised command records.
//!
//! - [`RecordSpec`] is what a caller asks for; derived fields are optional.
//! - [`Record`] is the normalized, persisted shape. The only way to build one
//!   from a spec is [`Record::normalize`].
//! - [`lifecycle`] holds the state machine: liveness probe, spawn,
//!   terminate and reset.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ConfigFile;
use crate::errors::{Result, WardenError};

pub mod lifecycle;

pub use lifecycle::{Spawned, Termination};

/// Name of the daemon's own record.
pub const SUPERVISOR_NAME: &str = "__supervisor__";

/// Name of the reconciler's record.
pub const RECONCILER_NAME: &str = "__reconciler__";

/// Internal records are dunder-wrapped, e.g. `__supervisor__`.
pub fn is_reserved_name(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

/// The command a record runs.
///
/// A list is passed through as the argument vector. A single string is split
/// on whitespace, so quoting inside it is not honoured: use the list form (or
/// `shell = true`) for arguments containing spaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    Argv(Vec<String>),
    Line(String),
}

impl Command {
    pub fn argv(&self) -> Vec<String> {
        match self {
            Command::Argv(args) => args.clone(),
            Command::Line(line) => line.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.argv().is_empty()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Argv(args) => f.write_str(&args.join(" ")),
            Command::Line(line) => f.write_str(line),
        }
    }
}

impl From<&str> for Command {
    fn from(line: &str) -> Self {
        Command::Line(line.to_string())
    }
}

impl From<String> for Command {
    fn from(line: String) -> Self {
        Command::Line(line)
    }
}

impl From<Vec<String>> for Command {
    fn from(args: Vec<String>) -> Self {
        Command::Argv(args)
    }
}

/// Caller-provided description of a record to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSpec {
    /// `None` (or `0`) means "allocate the next id".
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    pub command: Command,
    /// Defaults to the caller's working directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub interpreter: Option<PathBuf>,
    #[serde(default)]
    pub shell: bool,
    #[serde(default)]
    pub nohup: bool,
    #[serde(default)]
    pub autorun: bool,
    #[serde(default)]
    pub stdout_path: Option<PathBuf>,
    #[serde(default)]
    pub stderr_path: Option<PathBuf>,
    #[serde(default)]
    pub max_restart: Option<u32>,
}

impl RecordSpec {
    pub fn new(command: impl Into<Command>) -> Self {
        Self {
            id: None,
            name: None,
            command: command.into(),
            cwd: None,
            interpreter: None,
            shell: false,
            nohup: false,
            autorun: false,
            stdout_path: None,
            stderr_path: None,
            max_restart: None,
        }
    }

    /// Requested id, with `0` treated as unset.
    pub fn requested_id(&self) -> Option<u32> {
        self.id.filter(|id| *id > 0)
    }
}

/// Values a spec falls back to when it leaves a field unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDefaults {
    pub home_dir: PathBuf,
    pub log_dir: PathBuf,
    pub max_restart: u32,
}

impl From<&ConfigFile> for RecordDefaults {
    fn from(cfg: &ConfigFile) -> Self {
        Self {
            home_dir: cfg.home_dir.clone(),
            log_dir: cfg.paths.log_dir.clone(),
            max_restart: cfg.process.default_max_restart,
        }
    }
}

/// One supervised command plus its persisted runtime and policy state.
///
/// The identity fields (`id`, `name`, `command`, `cwd`, output paths) are
/// fixed by [`Record::normalize`]. `pid`, `restart` and `autorun_exclude`
/// move through the lifecycle operations. A record held in memory is a
/// snapshot; it only becomes durable through `Registry::update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u32,
    pub name: String,
    pub command: Command,
    pub cwd: PathBuf,
    #[serde(default)]
    pub interpreter: Option<PathBuf>,
    #[serde(default)]
    pub shell: bool,
    #[serde(default)]
    pub nohup: bool,
    #[serde(default)]
    pub autorun: bool,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    /// `None` is the not-running sentinel.
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub restart: u32,
    pub max_restart: u32,
    /// Set by an explicit stop; keeps the reconciler away until the next start.
    #[serde(default)]
    pub autorun_exclude: bool,
    pub home_dir: PathBuf,
}

impl Record {
    /// Validate `spec` and build the record stored under `id`.
    pub fn normalize(spec: RecordSpec, id: u32, defaults: &RecordDefaults) -> Result<Record> {
        if id == 0 {
            return Err(WardenError::Validation("id must be >= 1".to_string()));
        }

        let argv = spec.command.argv();
        let Some(first) = argv.first() else {
            return Err(WardenError::Validation("command is empty".to_string()));
        };

        let name = match spec.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => sanitize_name(name),
            _ => derive_name(first),
        };
        if name.is_empty() {
            return Err(WardenError::Validation(format!(
                "cannot derive a name from command '{}'",
                spec.command
            )));
        }

        let cwd = match spec.cwd {
            Some(cwd) => cwd,
            None => std::env::current_dir()?,
        };
        if !cwd.is_absolute() {
            return Err(WardenError::Validation(format!(
                "working directory {:?} must be absolute",
                cwd
            )));
        }

        let home_dir = defaults.home_dir.clone();
        let stdout_path = spec
            .stdout_path
            .unwrap_or_else(|| default_stdout_path(&defaults.log_dir, &name, id));
        let stderr_path = spec
            .stderr_path
            .unwrap_or_else(|| default_stderr_path(&defaults.log_dir, &name, id));

        Ok(Record {
            id,
            name,
            command: spec.command,
            cwd,
            interpreter: spec.interpreter,
            shell: spec.shell,
            nohup: spec.nohup,
            autorun: spec.autorun,
            stdout_path,
            stderr_path,
            pid: None,
            restart: 0,
            max_restart: spec.max_restart.unwrap_or(defaults.max_restart),
            autorun_exclude: false,
            home_dir,
        })
    }

    /// Internal records stay out of `all` and autorun selectors.
    pub fn is_hidden(&self) -> bool {
        is_reserved_name(&self.name)
    }

    /// Eligible for reconciler restarts right now.
    pub fn autorun_enabled(&self) -> bool {
        self.autorun && !self.autorun_exclude
    }

    /// `disabled`, `suspended` or `enabled`.
    pub fn autorun_status(&self) -> &'static str {
        match (self.autorun, self.autorun_exclude) {
            (false, _) => "disabled",
            (true, true) => "suspended",
            (true, false) => "enabled",
        }
    }

    /// Give the record a new name, re-deriving output paths that were
    /// derived from the old one.
    pub fn rename(&mut self, new_name: &str) -> Result<()> {
        let new_name = sanitize_name(new_name.trim());
        if new_name.is_empty() {
            return Err(WardenError::Validation("name is empty".to_string()));
        }

        for (path, ext) in [(&mut self.stdout_path, "log"), (&mut self.stderr_path, "err")] {
            let derived = format!("{}_{}.{ext}", self.name, self.id);
            if path.file_name().is_some_and(|f| f == derived.as_str()) {
                path.set_file_name(format!("{new_name}_{}.{ext}", self.id));
            }
        }
        self.name = new_name;
        Ok(())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(id={})", self.name, self.id)
    }
}

fn sanitize_name(name: &str) -> String {
    name.replace(' ', "_").replace("./", "").replace('/', "")
}

/// Name from the first command token: its file name, sanitized.
fn derive_name(first_token: &str) -> String {
    let base = Path::new(first_token)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(first_token);
    sanitize_name(base)
}

pub fn default_stdout_path(log_dir: &Path, name: &str, id: u32) -> PathBuf {
    log_dir.join(format!("{name}_{id}.log"))
}

pub fn default_stderr_path(log_dir: &Path, name: &str, id: u32) -> PathBuf {
    log_dir.join(format!("{name}_{id}.err"))
}
