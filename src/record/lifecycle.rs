// src/record/lifecycle.rs

//! Record state machine: liveness probe, spawn, terminate, reset.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tracing::{debug, info, warn};

use crate::config::ProcessSettings;
use crate::errors::{Result, WardenError};
use crate::os::{kill_tree, KillReport, Probe, ProcessTable};

use super::Record;

/// Result of [`Record::spawn`].
#[derive(Debug)]
pub enum Spawned {
    /// A new child; hand it to the `HandleTracker`.
    Started(Child),
    /// Nothing was done; the record already runs under this pid.
    AlreadyRunning(u32),
}

/// Result of [`Record::terminate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The pid was already the sentinel; no signal was sent.
    NotRunning,
    /// Every member exited and the pid was cleared.
    Stopped(KillReport),
    /// Some members survived the wait; the pid is kept so a retry can
    /// target the same tree.
    Partial(KillReport),
}

impl Record {
    /// Is the recorded pid still this record's process?
    ///
    /// A pid that vanished, cannot be inspected, or now belongs to a process
    /// with a different working directory (the pid was recycled) is reset to
    /// the sentinel. Zombies count as running because they still occupy the
    /// pid.
    pub fn is_running(&mut self, os: &dyn ProcessTable) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };

        match os.probe(pid) {
            Probe::Gone => {
                self.clear_stale_pid(pid, "process no longer exists");
                false
            }
            Probe::Denied => {
                self.clear_stale_pid(pid, "process cannot be inspected");
                false
            }
            Probe::Zombie => true,
            Probe::Live { cwd, running } => {
                if same_dir(&cwd, &self.cwd) {
                    running
                } else {
                    self.clear_stale_pid(pid, "pid reused by a process in another directory");
                    false
                }
            }
        }
    }

    fn clear_stale_pid(&mut self, pid: u32, reason: &str) {
        debug!(id = self.id, name = %self.name, pid, reason, "clearing stale pid");
        self.pid = None;
    }

    /// Argument vector with the interpreter prepended when one applies.
    ///
    /// The record's own interpreter wins over `fallback`; either is only
    /// used when it names an existing file.
    pub fn argv(&self, fallback_interpreter: Option<&Path>) -> Vec<String> {
        let mut argv = self.command.argv();
        let interpreter = self.interpreter.as_deref().or(fallback_interpreter);
        if let Some(interpreter) = interpreter.filter(|p| p.is_file()) {
            argv.insert(0, interpreter.to_string_lossy().into_owned());
        }
        argv
    }

    /// Start the command.
    ///
    /// Refuses (with no state change) once `restart` has reached
    /// `max_restart`. On success the new pid is stored, `restart` is
    /// incremented and `autorun_exclude` cleared; the caller persists the
    /// record and keeps the returned child handle.
    pub fn spawn(
        &mut self,
        os: &dyn ProcessTable,
        fallback_interpreter: Option<&Path>,
    ) -> Result<Spawned> {
        if self.is_running(os) {
            if let Some(pid) = self.pid {
                return Ok(Spawned::AlreadyRunning(pid));
            }
        }

        if self.restart >= self.max_restart {
            return Err(WardenError::RestartLimit {
                name: self.name.clone(),
                restart: self.restart,
                max_restart: self.max_restart,
            });
        }

        if !self.cwd.is_dir() {
            return Err(WardenError::ExecutableNotFound {
                name: self.name.clone(),
                detail: format!("working directory {:?} does not exist", self.cwd),
            });
        }

        let argv = self.argv(fallback_interpreter);
        let Some((program, args)) = argv.split_first() else {
            return Err(WardenError::Validation(format!("{self} has an empty command")));
        };

        let stdout = open_append(&self.stdout_path)?;
        let stderr = open_append(&self.stderr_path)?;

        let mut cmd = if self.shell {
            let mut c = Command::new("sh");
            c.arg("-c").arg(argv.join(" "));
            c
        } else {
            let mut c = Command::new(program);
            c.args(args);
            c
        };

        cmd.current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        if self.nohup {
            // Own process group: terminal hangups aimed at the spawner's group
            // do not reach the child.
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => WardenError::ExecutableNotFound {
                name: self.name.clone(),
                detail: format!("{program}: {e}"),
            },
            _ => WardenError::Io(e),
        })?;

        let pid = child.id();
        self.pid = Some(pid);
        self.restart += 1;
        self.autorun_exclude = false;

        info!(
            id = self.id,
            name = %self.name,
            pid,
            restart = self.restart,
            max_restart = self.max_restart,
            cmd = %self.command,
            "process started"
        );

        Ok(Spawned::Started(child))
    }

    /// Terminate the whole process tree rooted at the recorded pid.
    pub fn terminate(&mut self, os: &dyn ProcessTable, settings: &ProcessSettings) -> Termination {
        self.terminate_with(|pid| kill_tree(os, pid, settings.kill_timeout, settings.kill_poll))
    }

    /// Terminate using a caller-supplied kill strategy.
    ///
    /// Used when the caller holds the child handle and can signal it
    /// directly instead of walking the OS tree.
    pub fn terminate_with(&mut self, kill: impl FnOnce(u32) -> KillReport) -> Termination {
        let Some(pid) = self.pid else {
            return Termination::NotRunning;
        };

        let report = kill(pid);
        if report.is_complete() {
            info!(id = self.id, name = %self.name, pid, gone = ?report.gone, "process stopped");
            self.pid = None;
            Termination::Stopped(report)
        } else {
            warn!(
                id = self.id,
                name = %self.name,
                pid,
                alive = ?report.alive,
                "processes survived termination"
            );
            Termination::Partial(report)
        }
    }

    /// Zero the restart counter. Running state is untouched.
    pub fn reset(&mut self) {
        self.restart = 0;
    }

    /// Keep the reconciler from restarting this record until the next start.
    pub fn suspend_autorun(&mut self) {
        self.autorun_exclude = true;
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(file)
}

fn same_dir(a: &Path, b: &Path) -> bool {
    canonical(a) == canonical(b)
}

fn canonical(p: &Path) -> PathBuf {
    fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf())
}
