// tests/registry_lock.rs

mod common;

use std::process::Command;
use std::time::Duration;

use warden::errors::WardenError;
use warden::os::{Probe, ProcessTable, SystemProcesses};
use warden::registry::StoreLock;
use warden_test_utils::TestHome;

fn short_timeout_home() -> TestHome {
    TestHome::with_raw(|raw| {
        raw.registry.lock_timeout = "150ms".to_string();
        raw.registry.lock_poll = "5ms".to_string();
    })
}

/// Pid of a process that has exited and been reaped.
fn dead_pid() -> u32 {
    let mut child = Command::new("true").spawn().unwrap();
    let pid = child.id();
    child.wait().unwrap();
    pid
}

#[test]
fn test_guard_records_owner_pid() {
    let home = short_timeout_home();
    let lock = StoreLock::new(&home.config.paths.lock, &home.config.registry);

    let _guard = lock.acquire().unwrap();
    let owner = std::fs::read_to_string(&home.config.paths.lock).unwrap();
    assert_eq!(owner.trim(), std::process::id().to_string());
}

#[test]
fn test_live_holder_times_out() {
    common::init_tracing();
    let home = short_timeout_home();
    let registry = home.registry();
    let lock = StoreLock::new(&home.config.paths.lock, &home.config.registry);

    let guard = lock.acquire().unwrap();
    match registry.next_id() {
        Err(WardenError::LockTimeout { owner, .. }) => {
            assert!(owner.contains(&std::process::id().to_string()), "{owner}");
        }
        other => panic!("Expected LockTimeout, got: {other:?}"),
    }

    drop(guard);
    assert_eq!(registry.next_id().unwrap(), 1);
}

#[test]
fn test_lock_released_on_error_path() {
    let home = short_timeout_home();
    let registry = home.registry();
    let defaults = home.defaults();

    let spec = warden::record::RecordSpec::new("   ");
    assert!(registry.insert(spec, &defaults, false).is_err());

    // A failed write must not leave the lock held.
    assert_eq!(registry.next_id().unwrap(), 1);
}

#[test]
fn test_stale_lock_with_dead_owner_is_recovered() {
    common::init_tracing();
    let home = short_timeout_home();
    let registry = home.registry();
    let lock = StoreLock::new(&home.config.paths.lock, &home.config.registry);

    // Hold the lock, then make the file claim a dead owner: this is what an
    // orphan that inherited a crashed holder's descriptor looks like.
    let _stale = lock.acquire().unwrap();
    let dead = dead_pid();
    std::fs::write(&home.config.paths.lock, format!("{dead}\n")).unwrap();

    assert_eq!(registry.next_id().unwrap(), 1);

    let owner = std::fs::read_to_string(&home.config.paths.lock).unwrap();
    assert_eq!(owner.trim(), std::process::id().to_string());
}

#[test]
fn test_release_erases_owner_pid() {
    let home = short_timeout_home();
    let lock = StoreLock::new(&home.config.paths.lock, &home.config.registry);

    drop(lock.acquire().unwrap());
    let owner = std::fs::read_to_string(&home.config.paths.lock).unwrap();
    assert_eq!(owner, "");
}

#[test]
fn test_zombie_owner_counts_as_dead() {
    common::init_tracing();
    let home = short_timeout_home();
    let registry = home.registry();
    let lock = StoreLock::new(&home.config.paths.lock, &home.config.registry);

    // Exited but never waited on, so it stays a zombie until the end.
    let mut zombie = Command::new("true").spawn().unwrap();
    let pid = zombie.id();
    assert!(common::wait_until(Duration::from_secs(5), || {
        SystemProcesses::new().probe(pid) == Probe::Zombie
    }));

    let _stale = lock.acquire().unwrap();
    std::fs::write(&home.config.paths.lock, format!("{pid}\n")).unwrap();

    assert_eq!(registry.next_id().unwrap(), 1);
    zombie.wait().unwrap();
}

#[test]
fn test_held_lock_without_owner_is_not_recovered() {
    let home = short_timeout_home();
    let registry = home.registry();
    let lock = StoreLock::new(&home.config.paths.lock, &home.config.registry);

    // A holder that has locked but not yet written its pid.
    let guard = lock.acquire().unwrap();
    std::fs::write(&home.config.paths.lock, "").unwrap();

    match registry.next_id() {
        Err(WardenError::LockTimeout { owner, .. }) => assert_eq!(owner, "unknown"),
        other => panic!("Expected LockTimeout, got: {other:?}"),
    }
    drop(guard);
    assert_eq!(registry.next_id().unwrap(), 1);
}
