// tests/reconciler.rs

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use warden::control::Supervisor;
use warden::os::ProcessTable;
use warden::reconcile::Reconciler;
use warden::record::{Record, RECONCILER_NAME};
use warden::types::Key;
use warden_test_utils::builders::RecordSpecBuilder;
use warden_test_utils::{with_timeout, FakeProcesses, TestHome};

fn setup(home: &TestHome) -> (Arc<FakeProcesses>, Supervisor, Reconciler) {
    let os = Arc::new(FakeProcesses::new());
    let sup = home.supervisor_with(os.clone() as Arc<dyn ProcessTable>);
    let reconciler = Reconciler::new(sup.clone(), home.config.reconciler.interval);
    (os, sup, reconciler)
}

fn create(sup: &Supervisor, builder: RecordSpecBuilder) -> Record {
    let outcome = sup.create_internal(builder.build(), false);
    outcome.record().cloned().unwrap_or_else(|| panic!("{outcome:?}"))
}

fn stored(home: &TestHome, name: &str) -> Record {
    home.registry().get(&Key::from(name)).unwrap().unwrap()
}

#[test]
fn test_crashed_autorun_record_is_restarted_once() {
    common::init_tracing();
    let home = TestHome::new();
    let (_os, sup, reconciler) = setup(&home);
    create(&sup, RecordSpecBuilder::new("true").name("crashy").cwd(home.path()).autorun());

    let outcomes = reconciler.pass();

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_success(), "{:?}", outcomes[0]);
    let record = stored(&home, "crashy");
    assert_eq!(record.restart, 1);
    assert!(record.pid.is_some());
}

#[test]
fn test_running_record_is_left_alone() {
    let home = TestHome::new();
    let (os, sup, reconciler) = setup(&home);
    let mut record = create(&sup, RecordSpecBuilder::new("sleep 100").name("up").cwd(home.path()).autorun());
    os.spawn(4242, home.path());
    record.pid = Some(4242);
    home.registry().update(&record).unwrap();

    assert!(reconciler.pass().is_empty());
    assert_eq!(stored(&home, "up").restart, 0);
}

#[test]
fn test_suspended_hidden_and_plain_records_are_skipped() {
    let home = TestHome::new();
    let (_os, sup, reconciler) = setup(&home);

    let mut paused = create(&sup, RecordSpecBuilder::new("true").name("paused").cwd(home.path()).autorun());
    paused.suspend_autorun();
    home.registry().update(&paused).unwrap();
    create(&sup, RecordSpecBuilder::new("true").name(RECONCILER_NAME).cwd(home.path()).autorun());
    create(&sup, RecordSpecBuilder::new("true").name("manual").cwd(home.path()));

    assert!(reconciler.pass().is_empty());
    for name in ["paused", RECONCILER_NAME, "manual"] {
        assert_eq!(stored(&home, name).restart, 0, "{name}");
    }
}

#[test]
fn test_failure_does_not_halt_the_pass() {
    common::init_tracing();
    let home = TestHome::new();
    let (_os, sup, reconciler) = setup(&home);
    create(
        &sup,
        RecordSpecBuilder::new("/nonexistent/warden-test-binary")
            .name("broken")
            .cwd(home.path())
            .autorun(),
    );
    create(&sup, RecordSpecBuilder::new("true").name("fine").cwd(home.path()).autorun());

    let outcomes = reconciler.pass();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].hard_failure, "{:?}", outcomes[0]);
    assert!(outcomes[1].is_success(), "{:?}", outcomes[1]);
    assert_eq!(stored(&home, "broken").restart, 0);
    assert_eq!(stored(&home, "fine").restart, 1);
}

#[test]
fn test_restart_ceiling_stops_crash_loop() {
    let home = TestHome::new();
    let (_os, sup, reconciler) = setup(&home);
    create(
        &sup,
        RecordSpecBuilder::new("true")
            .name("loop")
            .cwd(home.path())
            .autorun()
            .max_restart(2),
    );

    assert!(reconciler.pass()[0].is_success());
    assert!(reconciler.pass()[0].is_success());

    for _ in 0..2 {
        let held = reconciler.pass();
        assert_eq!(held.len(), 1);
        assert!(held[0].warning && !held[0].hard_failure, "{:?}", held[0]);
        assert!(held[0].message.contains("restart limit (2/2)"), "{}", held[0].message);
    }
    assert_eq!(stored(&home, "loop").restart, 2);

    sup.reset(&"loop".parse().unwrap());
    assert!(reconciler.pass()[0].is_success());
    assert_eq!(stored(&home, "loop").restart, 1);
}

#[tokio::test]
async fn test_run_loop_restarts_and_shuts_down() {
    let home = TestHome::new();
    let (_os, sup, reconciler) = setup(&home);
    create(&sup, RecordSpecBuilder::new("true").name("svc").cwd(home.path()).autorun());

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::new(reconciler).run(rx));

    with_timeout(async {
        while stored(&home, "svc").restart == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    tx.send(true).unwrap();
    with_timeout(handle).await.unwrap();
}
