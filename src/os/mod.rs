// src/os/mod.rs

//! Operating-system process table abstraction.
//!
//! Records never talk to the OS directly; they go through a [`ProcessTable`]
//! so that liveness checks and tree-kills can be exercised against a scripted
//! table in tests while production uses [`SystemProcesses`].
//!
//! - [`system`] is the real implementation (sysinfo for inspection, nix for
//!   signals).
//! - [`tree`] holds the tree-kill helpers, written as plain functions over a
//!   freshly taken snapshot of parent/child relationships.

use std::fmt::Debug;
use std::io;
use std::path::PathBuf;

pub mod system;
pub mod tree;

pub use system::{pid_exists, SystemProcesses};
pub use tree::{descendants, kill_tree, wait_for_exit, KillReport};

/// Result of looking up a pid in the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// No such process.
    Gone,
    /// The process exists but cannot be inspected.
    Denied,
    /// Exited but not yet reaped by its parent.
    Zombie,
    /// Alive, with its current working directory.
    Live { cwd: PathBuf, running: bool },
}

impl Probe {
    /// Whether the process has exited, as far as a waiter is concerned.
    ///
    /// Zombies count as exited: only their exit status remains.
    pub fn has_exited(&self) -> bool {
        matches!(self, Probe::Gone | Probe::Zombie)
    }
}

/// One row of a process table snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcEntry {
    pub pid: u32,
    pub ppid: Option<u32>,
}

/// Abstract process table interface.
pub trait ProcessTable: Send + Sync + Debug {
    /// Inspect a single pid.
    fn probe(&self, pid: u32) -> Probe;

    /// Take a fresh snapshot of every process and its parent.
    fn snapshot(&self) -> Vec<ProcEntry>;

    /// Send the termination signal (SIGTERM) to `pid`.
    fn terminate(&self, pid: u32) -> io::Result<()>;
}
