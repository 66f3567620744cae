// src/os/system.rs

use std::io;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid as NixPid;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};
use tracing::trace;

use super::{Probe, ProcEntry, ProcessTable};

/// [`ProcessTable`] backed by the live OS process table.
///
/// Every call builds a new `System`, so each answer reflects the table at the
/// time of the call and nothing is cached between calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

impl SystemProcesses {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessTable for SystemProcesses {
    fn probe(&self, pid: u32) -> Probe {
        let target = Pid::from_u32(pid);
        let refresh = ProcessRefreshKind::nothing().with_cwd(UpdateKind::Always);

        let mut system = System::new();
        system.refresh_processes_specifics(ProcessesToUpdate::Some(&[target]), true, refresh);

        let Some(process) = system.process(target) else {
            trace!(pid, "probe: no such process");
            return Probe::Gone;
        };

        let status = process.status();
        if status == ProcessStatus::Zombie {
            return Probe::Zombie;
        }

        match process.cwd() {
            Some(cwd) => Probe::Live {
                cwd: cwd.to_path_buf(),
                running: status != ProcessStatus::Dead,
            },
            None if status == ProcessStatus::Dead => Probe::Gone,
            None => Probe::Denied,
        }
    }

    fn snapshot(&self) -> Vec<ProcEntry> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );

        system
            .processes()
            .iter()
            .filter(|(_, process)| process.thread_kind().is_none())
            .map(|(pid, process)| ProcEntry {
                pid: pid.as_u32(),
                ppid: process.parent().map(|p| p.as_u32()),
            })
            .collect()
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        kill(NixPid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from)
    }
}

/// Signal-0 existence check.
///
/// `EPERM` still means the pid is taken, just by someone we may not signal.
pub fn pid_exists(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    match kill(NixPid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
