// src/tracker/mod.rs

//! Live child handles owned by this process.
//!
//! Only the process that spawned a child holds its handle. The map is private
//! to that process and separate from the durable `pid` in the registry: the
//! reaper loop only collects exit statuses so exited children do not linger
//! as zombies, and never touches the registry.

use std::collections::HashMap;
use std::process::{Child, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::TrackerSettings;
use crate::os::KillReport;

#[derive(Debug)]
pub struct HandleTracker {
    handles: Mutex<HashMap<u32, Child>>,
    settings: TrackerSettings,
}

impl HandleTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<u32, Child>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keep `child` until it exits. Returns its pid.
    pub fn register(&self, child: Child) -> u32 {
        let pid = child.id();
        self.handles().insert(pid, child);
        debug!(pid, "tracking child handle");
        pid
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.handles().contains_key(&pid)
    }

    /// Tracked pids, sorted.
    pub fn tracked(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.handles().keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Collect every exited child and drop its handle.
    pub fn reap(&self) -> Vec<(u32, ExitStatus)> {
        let mut handles = self.handles();
        let mut reaped = Vec::new();

        handles.retain(|&pid, child| match child.try_wait() {
            Ok(Some(status)) => {
                reaped.push((pid, status));
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(pid, error = %e, "cannot poll child; dropping handle");
                false
            }
        });

        for (pid, status) in &reaped {
            info!(pid, exit_code = ?status.code(), "child exited");
        }
        reaped
    }

    /// Terminate a tracked child through its handle.
    ///
    /// Sends SIGTERM and polls the handle `kill_retries` times,
    /// `kill_retry_delay` apart. `None` when `pid` is not tracked here; the
    /// caller then falls back to a tree-kill. A survivor stays tracked.
    pub fn terminate(&self, pid: u32) -> Option<KillReport> {
        let mut child = self.handles().remove(&pid)?;

        if let Ok(Some(status)) = child.try_wait() {
            debug!(pid, exit_code = ?status.code(), "child had already exited");
            return Some(KillReport::gone([pid]));
        }

        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!(pid, error = %e, "failed to signal child"),
        }

        for _ in 0..self.settings.kill_retries {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(pid, exit_code = ?status.code(), "child terminated");
                    return Some(KillReport::gone([pid]));
                }
                Ok(None) => thread::sleep(self.settings.kill_retry_delay),
                Err(e) => {
                    warn!(pid, error = %e, "cannot poll child; assuming it is gone");
                    return Some(KillReport::gone([pid]));
                }
            }
        }

        warn!(pid, "child survived termination; keeping handle");
        self.handles().insert(pid, child);
        Some(KillReport::alive([pid]))
    }

    /// Spawn the background reaper on the current Tokio runtime.
    ///
    /// Runs until the returned handle is aborted or the runtime shuts down.
    pub fn spawn_reaper(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(every = ?self.settings.reap_interval, "reaper loop started");

            let mut ticker = interval(self.settings.reap_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let reaped = self.reap();
                if !reaped.is_empty() {
                    debug!(count = reaped.len(), "reaped exited children");
                }
            }
        })
    }
}
