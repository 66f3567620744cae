// src/os/tree.rs

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ProcEntry, ProcessTable};

/// Which members of a signalled group exited and which did not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillReport {
    pub gone: Vec<u32>,
    pub alive: Vec<u32>,
}

impl KillReport {
    pub fn gone(pids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            gone: pids.into_iter().collect(),
            alive: Vec::new(),
        }
    }

    pub fn alive(pids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            gone: Vec::new(),
            alive: pids.into_iter().collect(),
        }
    }

    /// True when nothing survived.
    pub fn is_complete(&self) -> bool {
        self.alive.is_empty()
    }

    pub fn merge(&mut self, other: KillReport) {
        self.gone.extend(other.gone);
        self.alive.extend(other.alive);
        self.gone.sort_unstable();
        self.alive.sort_unstable();
    }
}

/// Every descendant of `root` in `snapshot`, breadth-first, `root` excluded.
pub fn descendants(snapshot: &[ProcEntry], root: u32) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for entry in snapshot {
        if let Some(ppid) = entry.ppid {
            if ppid != entry.pid {
                children.entry(ppid).or_default().push(entry.pid);
            }
        }
    }

    let mut seen: HashSet<u32> = HashSet::from([root]);
    let mut queue: VecDeque<u32> = VecDeque::from([root]);
    let mut out = Vec::new();

    while let Some(pid) = queue.pop_front() {
        let Some(kids) = children.get(&pid) else {
            continue;
        };
        for &kid in kids {
            if seen.insert(kid) {
                out.push(kid);
                queue.push_back(kid);
            }
        }
    }

    out
}

/// Terminate `root` and all of its descendants.
///
/// Signals every member of the tree (root last), then polls until every
/// member has exited or `timeout` elapses. No escalation to SIGKILL happens
/// here; a non-empty `alive` set is the caller's cue to retry.
pub fn kill_tree(
    table: &dyn ProcessTable,
    root: u32,
    timeout: Duration,
    poll: Duration,
) -> KillReport {
    let mut members = descendants(&table.snapshot(), root);
    members.push(root);

    debug!(root, members = ?members, "terminating process tree");

    for &pid in &members {
        match table.terminate(pid) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(nix::libc::ESRCH) => {
                debug!(pid, "process vanished before it could be signalled");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(pid, "process vanished before it could be signalled");
            }
            Err(e) => {
                warn!(pid, error = %e, "failed to signal process");
            }
        }
    }

    wait_for_exit(table, members, timeout, poll)
}

/// Poll `pids` until all of them exited or `timeout` elapsed.
pub fn wait_for_exit(
    table: &dyn ProcessTable,
    pids: Vec<u32>,
    timeout: Duration,
    poll: Duration,
) -> KillReport {
    let deadline = Instant::now() + timeout;
    let mut gone = Vec::new();
    let mut pending = pids;

    loop {
        pending.retain(|&pid| {
            if table.probe(pid).has_exited() {
                gone.push(pid);
                false
            } else {
                true
            }
        });

        if pending.is_empty() || Instant::now() >= deadline {
            break;
        }
        thread::sleep(poll.min(deadline.saturating_duration_since(Instant::now())));
    }

    gone.sort_unstable();
    pending.sort_unstable();
    KillReport {
        gone,
        alive: pending,
    }
}
