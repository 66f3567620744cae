use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use warden::os::{ProcEntry, Probe, ProcessTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Zombie,
    Denied,
    /// Ignores SIGTERM.
    Stubborn,
}

#[derive(Debug, Clone)]
struct FakeProc {
    ppid: Option<u32>,
    cwd: PathBuf,
    state: State,
}

/// A scripted process table.
///
/// - records which pids were signalled
/// - removes a process on SIGTERM unless it was marked stubborn
/// - signalling a missing pid fails with `ESRCH`, like `kill(2)`
#[derive(Debug, Clone, Default)]
pub struct FakeProcesses {
    procs: Arc<Mutex<BTreeMap<u32, FakeProc>>>,
    signalled: Arc<Mutex<Vec<u32>>>,
}

impl FakeProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, pid: u32, ppid: Option<u32>, cwd: &Path, state: State) {
        self.procs.lock().unwrap().insert(
            pid,
            FakeProc {
                ppid,
                cwd: cwd.to_path_buf(),
                state,
            },
        );
    }

    /// A running process with no parent in the table.
    pub fn spawn(&self, pid: u32, cwd: impl AsRef<Path>) -> &Self {
        self.insert(pid, None, cwd.as_ref(), State::Running);
        self
    }

    pub fn child(&self, pid: u32, ppid: u32, cwd: impl AsRef<Path>) -> &Self {
        self.insert(pid, Some(ppid), cwd.as_ref(), State::Running);
        self
    }

    pub fn zombie(&self, pid: u32) -> &Self {
        self.set_state(pid, State::Zombie);
        self
    }

    pub fn deny(&self, pid: u32) -> &Self {
        self.set_state(pid, State::Denied);
        self
    }

    pub fn stubborn(&self, pid: u32) -> &Self {
        self.set_state(pid, State::Stubborn);
        self
    }

    fn set_state(&self, pid: u32, state: State) {
        if let Some(p) = self.procs.lock().unwrap().get_mut(&pid) {
            p.state = state;
        }
    }

    /// Simulate a crash or external kill.
    pub fn exit(&self, pid: u32) {
        self.procs.lock().unwrap().remove(&pid);
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.procs.lock().unwrap().contains_key(&pid)
    }

    pub fn signalled(&self) -> Vec<u32> {
        self.signalled.lock().unwrap().clone()
    }
}

impl ProcessTable for FakeProcesses {
    fn probe(&self, pid: u32) -> Probe {
        match self.procs.lock().unwrap().get(&pid) {
            None => Probe::Gone,
            Some(p) => match p.state {
                State::Zombie => Probe::Zombie,
                State::Denied => Probe::Denied,
                State::Running | State::Stubborn => Probe::Live {
                    cwd: p.cwd.clone(),
                    running: true,
                },
            },
        }
    }

    fn snapshot(&self) -> Vec<ProcEntry> {
        self.procs
            .lock()
            .unwrap()
            .iter()
            .map(|(&pid, p)| ProcEntry { pid, ppid: p.ppid })
            .collect()
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        let mut procs = self.procs.lock().unwrap();
        let Some(p) = procs.get(&pid) else {
            return Err(io::Error::from_raw_os_error(3)); // ESRCH
        };
        self.signalled.lock().unwrap().push(pid);
        if p.state != State::Stubborn {
            procs.remove(&pid);
        }
        Ok(())
    }
}
