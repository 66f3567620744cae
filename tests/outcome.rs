// tests/outcome.rs

use warden::control::{Outcome, Payload};
use warden::errors::{ErrorKind, WardenError};

#[test]
fn test_batch_all_ok_is_success() {
    let batch = Outcome::batch("start", "all", vec![Outcome::ok("a"), Outcome::ok("b")]);
    assert!(batch.is_success());
    assert_eq!(batch.items().len(), 2);
}

#[test]
fn test_batch_mixed_is_warning() {
    let batch = Outcome::batch(
        "stop",
        "all",
        vec![Outcome::ok("a"), Outcome::failure("b"), Outcome::warning("c")],
    );
    assert!(batch.warning);
    assert!(!batch.hard_failure);
    assert!(batch.message.contains("1 ok"), "{}", batch.message);
    assert!(batch.message.contains("1 failed"), "{}", batch.message);
}

#[test]
fn test_batch_all_failed_is_hard_failure() {
    let batch = Outcome::batch("start", "all", vec![Outcome::failure("a"), Outcome::failure("b")]);
    assert!(batch.hard_failure);
}

#[test]
fn test_empty_batch_is_warning() {
    let batch = Outcome::batch("start", "autorun_enabled", Vec::new());
    assert!(batch.warning && !batch.hard_failure);
    assert!(batch.message.contains("no records matched"));
}

#[test]
fn test_errors_become_hard_failures() {
    let outcome = Outcome::from_error(&WardenError::IdExists(7));
    assert!(outcome.hard_failure);
    assert!(outcome.message.contains('7'));
    assert_eq!(outcome.kind, Some(ErrorKind::Conflict));
    assert_eq!(outcome.payload, Payload::None);
}

#[test]
fn test_error_kind_is_serialized_only_when_set() {
    let refused = Outcome::from_error(&WardenError::RestartLimit {
        name: "svc".to_string(),
        restart: 3,
        max_restart: 3,
    });
    let value = serde_json::to_value(&refused).unwrap();
    assert_eq!(value["kind"], "policy");

    let fine = serde_json::to_value(Outcome::ok("started")).unwrap();
    assert!(fine.get("kind").is_none(), "{fine}");
}

#[test]
fn test_json_shape() {
    let batch = Outcome::batch("stop", "all", vec![Outcome::warning("x is not running")]);
    let value = serde_json::to_value(&batch).unwrap();

    assert_eq!(value["hard_failure"], false);
    assert_eq!(value["warning"], true);
    assert_eq!(value["payload"]["kind"], "batch");
    assert_eq!(value["payload"]["data"][0]["message"], "x is not running");

    let back: Outcome = serde_json::from_value(value).unwrap();
    assert_eq!(back, batch);
}
