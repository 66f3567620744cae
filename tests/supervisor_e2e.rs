// tests/supervisor_e2e.rs

mod common;

use std::str::FromStr;
use std::sync::Arc;

use warden::control::{Outcome, Payload};
use warden::errors::ErrorKind;
use warden::os::{pid_exists, ProcessTable};
use warden::record::RECONCILER_NAME;
use warden::types::{Key, Target};
use warden_test_utils::builders::RecordSpecBuilder;
use warden_test_utils::{FakeProcesses, TestHome};

fn target(s: &str) -> Target {
    Target::from_str(s).unwrap()
}

fn pid_of(outcome: &Outcome) -> Option<u32> {
    outcome.record().and_then(|r| r.pid)
}

#[test]
fn test_sleep_end_to_end() {
    common::init_tracing();
    let home = TestHome::new();
    let sup = home.supervisor();

    let created = sup.create(
        RecordSpecBuilder::new("sleep 100").name("t1").cwd(home.path()).build(),
        false,
    );
    assert!(created.is_success(), "{created:?}");

    let started = sup.start(&target("t1"));
    assert!(started.is_success(), "{started:?}");
    let pid = pid_of(&started).expect("pid set after start");
    assert!(pid_exists(pid));

    let again = sup.start(&target("t1"));
    assert!(again.warning && !again.hard_failure, "{again:?}");
    assert!(again.message.contains("already running"), "{}", again.message);
    assert_eq!(pid_of(&again), Some(pid));

    let stopped = sup.stop(&target("t1"));
    assert!(stopped.is_success(), "{stopped:?}");
    assert_eq!(pid_of(&stopped), None);
    assert!(!pid_exists(pid));

    let stored = home.registry().get(&Key::from("t1")).unwrap().unwrap();
    assert_eq!(stored.pid, None);
    assert!(stored.autorun_exclude);
    let (_, running) = sup.probe(&stored).unwrap();
    assert!(!running);

    let removed = sup.remove(&target("t1"));
    assert!(removed.is_success(), "{removed:?}");
    assert!(home.registry().get(&Key::from("t1")).unwrap().is_none());

    let removed_again = sup.remove(&target("t1"));
    assert!(removed_again.hard_failure, "{removed_again:?}");
}

#[test]
fn test_stop_twice_warns_both_times() {
    let home = TestHome::new();
    let sup = home.supervisor();
    sup.create(
        RecordSpecBuilder::new("sleep 100").name("idle").cwd(home.path()).build(),
        false,
    );

    for _ in 0..2 {
        let stopped = sup.stop(&target("idle"));
        assert!(stopped.warning, "{stopped:?}");
        assert!(!stopped.hard_failure, "{stopped:?}");
    }
}

#[test]
fn test_restart_spawns_new_process_and_counts() {
    common::init_tracing();
    let home = TestHome::new();
    let sup = home.supervisor();
    sup.create(
        RecordSpecBuilder::new("sleep 100").name("svc").cwd(home.path()).build(),
        false,
    );

    let first = pid_of(&sup.start(&target("svc"))).unwrap();
    let restarted = sup.restart(&target("svc"));
    assert!(restarted.is_success(), "{restarted:?}");
    let second = pid_of(&restarted).unwrap();

    assert_ne!(first, second);
    assert!(!pid_exists(first));
    let stored = home.registry().get(&Key::from("svc")).unwrap().unwrap();
    assert_eq!(stored.restart, 2);
    assert_eq!(stored.pid, Some(second));
    assert!(!stored.autorun_exclude);

    sup.stop(&target("svc"));
}

#[test]
fn test_selector_batches_report_per_record() {
    let home = TestHome::new();
    let sup = home.supervisor();
    for name in ["a", "b"] {
        sup.create(
            RecordSpecBuilder::new("sleep 100").name(name).cwd(home.path()).build(),
            false,
        );
    }

    let started = sup.start(&target("all"));
    assert!(started.is_success(), "{started:?}");
    assert_eq!(started.items().len(), 2);
    assert!(started.items().iter().all(Outcome::is_success));

    let stopped = sup.stop(&target("all"));
    assert!(stopped.is_success(), "{stopped:?}");

    let stopped_again = sup.stop(&target("all"));
    assert!(stopped_again.warning && !stopped_again.hard_failure);
    assert!(stopped_again.items().iter().all(|o| o.warning));
}

#[test]
fn test_missing_targets() {
    let home = TestHome::new();
    let sup = home.supervisor();

    let literal = sup.start(&target("ghost"));
    assert!(literal.hard_failure, "{literal:?}");

    let selector = sup.start(&target("autorun_enabled"));
    assert!(selector.warning && !selector.hard_failure, "{selector:?}");
    assert!(selector.items().is_empty());
}

#[test]
fn test_reserved_names_are_refused() {
    let home = TestHome::new();
    let sup = home.supervisor();

    let created = sup.create(
        RecordSpecBuilder::new("sleep 1").name("__supervisor__").cwd(home.path()).build(),
        false,
    );
    assert!(created.hard_failure);
    assert!(home.registry().all().unwrap().is_empty());

    sup.create(RecordSpecBuilder::new("sleep 1").name("x").cwd(home.path()).build(), false);
    assert!(sup.rename(&target("x"), "__x__").hard_failure);
    assert!(sup.rename(&target("all"), "y").hard_failure);
    assert!(sup.rename(&target("x"), "y").is_success());
}

#[test]
fn test_list_heals_and_persists_stale_pid() {
    let home = TestHome::new();
    let os = Arc::new(FakeProcesses::new());
    let sup = home.supervisor_with(os.clone() as Arc<dyn ProcessTable>);
    let created = sup.create(
        RecordSpecBuilder::new("sleep 100").name("stale").cwd(home.path()).build(),
        false,
    );

    let mut record = created.record().cloned().unwrap();
    record.pid = Some(4242);
    home.registry().update(&record).unwrap();

    let listed = sup.list(&target("all"));
    match &listed.payload {
        Payload::Records(records) => assert_eq!(records[0].pid, None),
        other => panic!("Expected Records, got: {other:?}"),
    }
    let stored = home.registry().get(&Key::from("stale")).unwrap().unwrap();
    assert_eq!(stored.pid, None);
}

#[test]
fn test_partial_stop_keeps_pid_and_blocks_remove() {
    common::init_tracing();
    let home = TestHome::with_raw(|raw| {
        raw.process.kill_timeout = "100ms".to_string();
        raw.process.kill_poll = "5ms".to_string();
    });
    let os = Arc::new(FakeProcesses::new());
    os.spawn(100, home.path())
        .child(101, 100, home.path())
        .stubborn(100);
    let sup = home.supervisor_with(os.clone() as Arc<dyn ProcessTable>);

    let created = sup.create(
        RecordSpecBuilder::new("sleep 100").name("tough").cwd(home.path()).autorun().build(),
        false,
    );
    let mut record = created.record().cloned().unwrap();
    record.pid = Some(100);
    home.registry().update(&record).unwrap();

    let stopped = sup.stop(&target("tough"));
    assert!(stopped.warning && !stopped.hard_failure, "{stopped:?}");
    match &stopped.payload {
        Payload::Termination { record, report } => {
            assert_eq!(record.pid, Some(100));
            assert_eq!(report.gone, [101]);
            assert_eq!(report.alive, [100]);
        }
        other => panic!("Expected Termination, got: {other:?}"),
    }

    let stored = home.registry().get(&Key::from("tough")).unwrap().unwrap();
    assert_eq!(stored.pid, Some(100));
    assert!(stored.autorun_exclude);

    let removed = sup.remove(&target("tough"));
    assert!(removed.warning && !removed.hard_failure, "{removed:?}");
    assert!(removed.message.starts_with("not removed"), "{}", removed.message);
    assert!(home.registry().exists(&Key::from("tough")).unwrap());
}

#[test]
fn test_reset_and_dump() {
    let home = TestHome::new();
    let sup = home.supervisor_with(Arc::new(FakeProcesses::new()));
    let created = sup.create(
        RecordSpecBuilder::new("sleep 1").name("counter").cwd(home.path()).build(),
        false,
    );
    let mut record = created.record().cloned().unwrap();
    record.restart = 5;
    home.registry().update(&record).unwrap();

    assert!(sup.reset(&target("counter")).is_success());
    assert_eq!(
        home.registry().get(&Key::from("counter")).unwrap().unwrap().restart,
        0
    );

    let dumped = sup.dump();
    assert_eq!(dumped.records().len(), 1);
}

#[test]
fn test_stopping_internal_record_leaves_its_children_running() {
    let home = TestHome::new();
    let os = Arc::new(FakeProcesses::new());
    os.spawn(100, home.path())
        .child(101, 100, home.path())
        .child(102, 101, home.path());
    let sup = home.supervisor_with(os.clone() as Arc<dyn ProcessTable>);

    let created = sup.create_internal(
        RecordSpecBuilder::new("warden reconcile").name(RECONCILER_NAME).cwd(home.path()).build(),
        false,
    );
    let mut record = created.record().cloned().unwrap();
    record.pid = Some(100);
    home.registry().update(&record).unwrap();

    let stopped = sup.stop(&target(RECONCILER_NAME));
    assert!(stopped.is_success(), "{stopped:?}");
    assert_eq!(os.signalled(), [100]);
    assert!(!os.is_alive(100));
    assert!(os.is_alive(101) && os.is_alive(102));
    let stored = home.registry().get(&Key::from(RECONCILER_NAME)).unwrap().unwrap();
    assert_eq!(stored.pid, None);
}

#[test]
fn test_stopping_user_record_signals_its_whole_tree() {
    let home = TestHome::new();
    let os = Arc::new(FakeProcesses::new());
    os.spawn(100, home.path()).child(101, 100, home.path());
    let sup = home.supervisor_with(os.clone() as Arc<dyn ProcessTable>);

    let created = sup.create(
        RecordSpecBuilder::new("sleep 100").name("parent").cwd(home.path()).build(),
        false,
    );
    let mut record = created.record().cloned().unwrap();
    record.pid = Some(100);
    home.registry().update(&record).unwrap();

    assert!(sup.stop(&target("parent")).is_success());
    assert!(!os.is_alive(100) && !os.is_alive(101));
}

#[test]
fn test_failures_carry_their_error_kind() {
    let home = TestHome::new();
    let sup = home.supervisor_with(Arc::new(FakeProcesses::new()));

    let created = sup.create(
        RecordSpecBuilder::new("true").name("twice").id(3).cwd(home.path()).max_restart(2).build(),
        false,
    );
    assert_eq!(created.kind, None);

    for _ in 0..2 {
        let started = sup.start(&target("twice"));
        assert!(started.is_success(), "{started:?}");
        assert_eq!(started.kind, None);
    }
    let refused = sup.start(&target("twice"));
    assert!(refused.hard_failure, "{refused:?}");
    assert_eq!(refused.kind, Some(ErrorKind::Policy));
    assert_eq!(home.registry().get(&Key::from("twice")).unwrap().unwrap().restart, 2);

    let same_id = sup.create(
        RecordSpecBuilder::new("true").name("other").id(3).cwd(home.path()).build(),
        false,
    );
    assert_eq!(same_id.kind, Some(ErrorKind::Conflict));

    sup.create(RecordSpecBuilder::new("true").name("dup").id(5).cwd(home.path()).build(), false);
    sup.create(RecordSpecBuilder::new("true").name("dup_6").id(7).cwd(home.path()).build(), false);
    let same_name = sup.create(
        RecordSpecBuilder::new("true").name("dup").id(6).cwd(home.path()).build(),
        false,
    );
    assert!(same_name.hard_failure, "{same_name:?}");
    assert_eq!(same_name.kind, Some(ErrorKind::Conflict));

    let missing = sup.start(&target("ghost"));
    assert_eq!(missing.kind, Some(ErrorKind::NotFound));

    let reserved = sup.create(
        RecordSpecBuilder::new("true").name("__x__").cwd(home.path()).build(),
        false,
    );
    assert_eq!(reserved.kind, Some(ErrorKind::Invalid));
}
