// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Targets accept an id, a name, or one of the selectors `all`, `ALL`,
//! `hidden_only`, `autorun_only`, `autorun_enabled`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::record::{Command, RecordSpec};
use crate::types::Target;

/// Command-line arguments for `warden`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "warden",
    version,
    about = "Launch, track and restart long-running commands on this host.",
    long_about = None
)]
pub struct CliArgs {
    /// Home directory holding the store, lock file and logs.
    ///
    /// Default: `WARDEN_HOME`, then `~/.warden`.
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Path to the config file (TOML).
    ///
    /// Default: `WARDEN_CONFIG`, then `<home>/config.toml`.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WARDEN_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print outcomes as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Action {
    /// Register a new command.
    New(NewArgs),

    /// List records.
    Ls {
        #[arg(default_value = "all")]
        target: Target,
    },

    /// Start records.
    Start { target: Target },

    /// Stop records (and suspend their autorun).
    Stop { target: Target },

    /// Stop then start records.
    Restart { target: Target },

    /// Stop and delete records.
    Rm { target: Target },

    /// Zero restart counters.
    Reset { target: Target },

    /// Show whether records are running.
    Status {
        #[arg(default_value = "all")]
        target: Target,
    },

    /// Give a record a new name.
    Rename {
        target: Target,
        #[arg(long)]
        name: String,
    },

    /// Write every record, hidden ones included, as JSON.
    Dump {
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
    },

    /// Run the long-lived supervisor (reconciler host + reaper).
    Daemon,

    /// Run the autorun reconciler.
    Reconcile {
        /// Run a single pass and exit.
        #[arg(long)]
        once: bool,
    },
}

#[derive(Debug, Clone, Args)]
pub struct NewArgs {
    /// Command to run. A single argument is split on whitespace.
    #[arg(
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "CMD"
    )]
    pub cmd: Vec<String>,

    /// Record name. Default: derived from the command.
    #[arg(long)]
    pub name: Option<String>,

    /// Record id. Default: highest id + 1.
    #[arg(long)]
    pub id: Option<u32>,

    /// Working directory. Default: the current directory.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Interpreter prepended to the command when it exists on disk.
    #[arg(long, value_name = "PATH")]
    pub interpreter: Option<PathBuf>,

    /// Run through `sh -c`.
    #[arg(long)]
    pub shell: bool,

    /// Detach into its own process group.
    #[arg(long)]
    pub nohup: bool,

    /// Let the reconciler restart it when it dies.
    #[arg(long)]
    pub autorun: bool,

    #[arg(long, value_name = "PATH")]
    pub stdout: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub stderr: Option<PathBuf>,

    #[arg(long)]
    pub max_restart: Option<u32>,

    /// Replace an existing record with the same id.
    #[arg(long)]
    pub overwrite: bool,
}

impl NewArgs {
    pub fn to_spec(&self) -> RecordSpec {
        let command = match self.cmd.as_slice() {
            [line] => Command::Line(line.clone()),
            args => Command::Argv(args.to_vec()),
        };

        let mut spec = RecordSpec::new(command);
        spec.id = self.id;
        spec.name = self.name.clone();
        spec.cwd = self.cwd.clone().map(absolute);
        spec.interpreter = self.interpreter.clone();
        spec.shell = self.shell;
        spec.nohup = self.nohup;
        spec.autorun = self.autorun;
        spec.stdout_path = self.stdout.clone().map(absolute);
        spec.stderr_path = self.stderr.clone().map(absolute);
        spec.max_restart = self.max_restart;
        spec
    }
}

/// Resolve a path given on the command line against the current directory.
fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&path))
        .unwrap_or(path)
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
