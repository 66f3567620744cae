// src/daemon.rs

//! Long-lived supervisor process.
//!
//! On startup the daemon records itself under the hidden `__supervisor__`
//! name, (re)creates the hidden `__reconciler__` record pointing at
//! `warden reconcile`, starts it, and keeps its handle reaped. Ctrl-C stops
//! the reconciler through its handle and clears the daemon's own pid; SIGTERM
//! does the same.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::control::{Outcome, Supervisor};
use crate::record::{Command, Record, RecordSpec, RECONCILER_NAME, SUPERVISOR_NAME};
use crate::types::{Key, Target};

/// Everything the daemon needs to re-launch itself as a reconciler.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub home_dir: PathBuf,
    pub config_path: PathBuf,
    pub executable: PathBuf,
}

impl DaemonOptions {
    pub fn new(home_dir: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Result<Self> {
        let executable = std::env::current_exe().context("cannot locate the warden executable")?;
        Ok(Self {
            home_dir: home_dir.into(),
            config_path: config_path.into(),
            executable,
        })
    }

    /// `<exe> --home <home> --config <config> reconcile`
    pub fn reconciler_command(&self) -> Command {
        Command::Argv(vec![
            path_arg(&self.executable),
            "--home".to_string(),
            path_arg(&self.home_dir),
            "--config".to_string(),
            path_arg(&self.config_path),
            "reconcile".to_string(),
        ])
    }
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

pub async fn run(supervisor: Supervisor, options: DaemonOptions) -> Result<()> {
    let signalled = tokio::spawn(shutdown_signal());

    let me = {
        let sup = supervisor.clone();
        let exe = options.executable.clone();
        tokio::task::spawn_blocking(move || register_self(&sup, &exe)).await??
    };
    info!(id = me.id, pid = ?me.pid, "supervisor registered");

    let reaper = Arc::clone(supervisor.tracker()).spawn_reaper();

    let started = {
        let sup = supervisor.clone();
        let opts = options.clone();
        tokio::task::spawn_blocking(move || start_reconciler(&sup, &opts)).await??
    };
    if started.hard_failure {
        warn!(message = %started.message, "reconciler did not start");
    } else {
        info!(message = %started.message, "reconciler running");
    }

    signalled.await??;

    let sup = supervisor.clone();
    let stopped = tokio::task::spawn_blocking(move || shutdown(&sup)).await??;
    info!(message = %stopped.message, "reconciler stopped");

    reaper.abort();
    info!("supervisor exiting");
    Ok(())
}

/// Resolve on the first SIGINT or SIGTERM.
pub async fn shutdown_signal() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl+C")?;
            info!("interrupt received");
        }
        _ = terminate.recv() => info!("termination requested"),
    }
    Ok(())
}

/// Stop `__reconciler__` and clear this process's pid from `__supervisor__`.
///
/// Only the reconciler process itself is signalled; the records it started
/// keep running.
pub fn shutdown(supervisor: &Supervisor) -> Result<Outcome> {
    let stopped = supervisor.stop(&Target::Key(Key::from(RECONCILER_NAME)));
    clear_self(supervisor)?;
    Ok(stopped)
}

/// Create or refresh `__supervisor__` with this process's pid and cwd.
pub fn register_self(supervisor: &Supervisor, executable: &Path) -> Result<Record> {
    let registry = supervisor.registry();
    let cwd = std::env::current_dir()?;

    let mut record = match registry.get(&Key::from(SUPERVISOR_NAME))? {
        Some(record) => record,
        None => {
            let mut spec = RecordSpec::new(Command::Argv(vec![
                path_arg(executable),
                "daemon".to_string(),
            ]));
            spec.name = Some(SUPERVISOR_NAME.to_string());
            spec.cwd = Some(cwd.clone());
            let created = supervisor.create_internal(spec, false);
            created
                .record()
                .cloned()
                .ok_or_else(|| anyhow!("cannot register supervisor: {}", created.message))?
        }
    };

    record.cwd = cwd;
    record.pid = Some(std::process::id());
    record.autorun_exclude = false;
    registry.update(&record)?;
    Ok(record)
}

fn clear_self(supervisor: &Supervisor) -> crate::errors::Result<()> {
    let registry = supervisor.registry();
    if let Some(mut record) = registry.get(&Key::from(SUPERVISOR_NAME))? {
        if record.pid == Some(std::process::id()) {
            record.pid = None;
            registry.update(&record)?;
        }
    }
    Ok(())
}

/// Ensure `__reconciler__` exists with the current command, then start it.
///
/// A reconciler left behind by a previous daemon is stopped first so the
/// new one is spawned (and tracked) by this process.
pub fn start_reconciler(supervisor: &Supervisor, options: &DaemonOptions) -> Result<Outcome> {
    let registry = supervisor.registry();
    let command = options.reconciler_command();

    let record = match registry.get(&Key::from(RECONCILER_NAME))? {
        Some(existing) => {
            let stopped = supervisor.stop_record(existing);
            if stopped.hard_failure {
                return Ok(stopped);
            }
            let mut record = stopped
                .record()
                .cloned()
                .ok_or_else(|| anyhow!("reconciler record vanished: {}", stopped.message))?;
            record.command = command;
            record.cwd = options.home_dir.clone();
            record.reset();
            registry.update(&record)?;
            record
        }
        None => {
            let mut spec = RecordSpec::new(command);
            spec.name = Some(RECONCILER_NAME.to_string());
            spec.cwd = Some(options.home_dir.clone());
            let created = supervisor.create_internal(spec, false);
            match created.record().cloned() {
                Some(record) => record,
                None => return Ok(created),
            }
        }
    };

    Ok(supervisor.start_record(record))
}
