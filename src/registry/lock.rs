// src/registry/lock.rs

//! Whole-store advisory lock.
//!
//! Every registry call holds this lock for its full duration. The lock is an
//! `flock` on a companion file next to the store; the file carries nothing
//! but the holder's pid. The pid is written right after locking and erased
//! before unlocking, so a file that names a pid after a clean release only
//! exists when the holder died with the lock.
//!
//! Acquisition is bounded by `lock_timeout`. When it expires and the pid in
//! the lock file is dead or a zombie (for example an orphan inherited the
//! descriptor of a crashed holder), the owner is read once more after one
//! poll interval and, if unchanged, the file is unlinked and acquisition is
//! retried once on a fresh inode. A live holder yields
//! `WardenError::LockTimeout`.
//!
//! One window remains: a process that takes over the lock from a crashed
//! holder and stalls for longer than a poll interval before writing its own
//! pid still shows the dead pid and can have the file unlinked under it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, trace, warn};

use crate::config::RegistrySettings;
use crate::errors::{Result, WardenError};
use crate::os::{ProcessTable, SystemProcesses};

#[derive(Debug, Clone)]
pub struct StoreLock {
    path: PathBuf,
    timeout: Duration,
    poll: Duration,
}

/// Held lock; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.set_len(0) {
            debug!(path = ?self.path, error = %e, "could not clear lock owner");
        }
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(path = ?self.path, error = %e, "explicit unlock failed; closing releases it");
        }
    }
}

impl StoreLock {
    pub fn new(path: impl Into<PathBuf>, settings: &RegistrySettings) -> Self {
        Self {
            path: path.into(),
            timeout: settings.lock_timeout,
            poll: settings.lock_poll,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the lock is held or the timeout expires.
    pub fn acquire(&self) -> Result<LockGuard> {
        if let Some(guard) = self.acquire_within()? {
            return Ok(guard);
        }

        let mut owner = read_owner(&self.path);
        if let Some(pid) = owner.filter(|&pid| owner_is_dead(pid)) {
            // A new holder may have just taken over and not written its pid.
            thread::sleep(self.poll);
            owner = read_owner(&self.path);
            if owner == Some(pid) {
                warn!(path = ?self.path, pid, "store lock held past its owner's death; recreating");
                match fs::remove_file(&self.path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                if let Some(guard) = self.acquire_within()? {
                    return Ok(guard);
                }
                owner = read_owner(&self.path);
            }
        }

        Err(WardenError::LockTimeout {
            path: self.path.clone(),
            waited: self.timeout,
            owner: owner.map_or_else(|| "unknown".to_string(), |pid| format!("pid {pid}")),
        })
    }

    fn acquire_within(&self) -> Result<Option<LockGuard>> {
        let deadline = Instant::now() + self.timeout;

        loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    // The path may have been unlinked and recreated by stale
                    // recovery while we waited; a lock on the old inode
                    // excludes nobody.
                    if still_linked(&file, &self.path)? {
                        let guard = LockGuard {
                            file,
                            path: self.path.clone(),
                        };
                        write_owner(&guard.file)?;
                        trace!(path = ?self.path, "store lock acquired");
                        return Ok(Some(guard));
                    }
                    debug!(path = ?self.path, "lock file replaced while waiting; retrying");
                    continue;
                }
                Err(e) if is_contended(&e) => {}
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(self.poll);
        }
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn still_linked(file: &File, path: &Path) -> Result<bool> {
    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(current.dev() == held.dev() && current.ino() == held.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn write_owner(mut file: &File) -> Result<()> {
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(())
}

/// Gone or a zombie. Our own pid never counts as dead.
fn owner_is_dead(pid: u32) -> bool {
    pid != std::process::id() && SystemProcesses::new().probe(pid).has_exited()
}

fn read_owner(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}
