//! Contract Tests for the Operation Result Envelope
//!
//! Contract: every driven command yields an `OperationResult`; console
//! errors, timeouts and oversized output are statuses, never faults, and
//! the JSON shape is stable for callers of the stdio front end.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use consolepilot::error::Error;
use consolepilot::models::{EntityKind, EntityRef, ErrorKind, StructuredData};
use consolepilot::{Command, OperationResult, OperationStatus};
use test_utils::{emit, reply, start_driver, test_config, MockLauncher, Step};

#[test]
fn test_status_constructors_uphold_invariants() {
    let elapsed = Duration::from_millis(42);

    let success = OperationResult::success("ok".into(), None, elapsed);
    assert_eq!(success.status(), OperationStatus::Success);
    assert!(success.error().is_none());

    let partial = OperationResult::partial("cut".into(), None, elapsed);
    assert_eq!(partial.status(), OperationStatus::Partial);
    assert!(partial.error().is_none());

    let failure = OperationResult::failure("[-] nope".into(), None, "nope", elapsed);
    assert_eq!(failure.error().unwrap().kind, ErrorKind::CommandFailure);

    let timeout = OperationResult::timeout("so far".into(), Duration::from_secs(3), elapsed);
    assert_eq!(timeout.raw_output(), "so far");
    assert!(timeout.structured_data().is_none());
    assert_eq!(timeout.error().unwrap().kind, ErrorKind::Timeout);
}

#[test]
fn test_json_envelope() {
    let result = OperationResult::success(
        "4 sessions active".into(),
        Some(StructuredData::Count {
            count: 4,
            subject: "sessions active".into(),
        }),
        Duration::from_millis(250),
    )
    .with_entities(vec![EntityRef::new(EntityKind::Job, 2, 7)]);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], "SUCCESS");
    assert_eq!(json["raw_output"], "4 sessions active");
    assert_eq!(json["structured_data"]["type"], "count");
    assert_eq!(json["structured_data"]["count"], 4);
    assert!(json["error"].is_null());
    assert_eq!(json["elapsed_ms"], 250);
    assert_eq!(json["correlated_entities"][0]["kind"], "job");
    assert_eq!(json["correlated_entities"][0]["generation"], 2);

    let back: OperationResult = serde_json::from_value(json).unwrap();
    assert_eq!(back.elapsed(), Duration::from_millis(250));
    assert_eq!(back.correlated_entities(), result.correlated_entities());
}

#[test]
fn test_timeout_json_carries_recoverable_error() {
    let result = OperationResult::timeout(String::new(), Duration::from_secs(30), Duration::from_secs(30));
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], "TIMEOUT");
    assert_eq!(json["error"]["kind"], "timeout");
    assert_eq!(json["error"]["recoverable"], true);
}

#[test]
fn test_error_taxonomy() {
    let crashed = Error::ConsoleCrashed {
        command: "run".into(),
        partial_output: String::new(),
    };
    assert_eq!(crashed.kind(), Some(ErrorKind::ConsoleCrashed));
    assert!(crashed.is_recoverable());
    assert!(!crashed.is_fatal());

    let limit = Error::RestartLimitExceeded { restarts: 3, limit: 3 };
    assert_eq!(limit.kind(), Some(ErrorKind::RestartLimitExceeded));
    assert!(limit.is_fatal());
    assert!(!limit.is_recoverable());

    let startup = Error::StartupTimeout {
        timeout: Duration::from_secs(60),
        captured: "banner".into(),
    };
    assert_eq!(startup.kind(), Some(ErrorKind::StartupTimeout));
    assert!(startup.is_fatal());

    assert_eq!(Error::EmptyCommand.kind(), None);
    assert!(!Error::EmptyCommand.is_fatal());
}

#[test]
fn test_fatal_errors_clone_faithfully() {
    let original = Error::StartupTimeout {
        timeout: Duration::from_secs(5),
        captured: "loading".into(),
    };
    match original.clone() {
        Error::StartupTimeout { timeout, captured } => {
            assert_eq!(timeout, Duration::from_secs(5));
            assert_eq!(captured, "loading");
        }
        other => panic!("clone changed the variant: {:?}", other),
    }
}

#[tokio::test]
async fn test_unstructured_output_still_succeeds() {
    let launcher = Arc::new(MockLauncher::new(|_, _| {
        reply("[*] Reloading modules from all module paths...\nsome free text, nothing tabular\n  ---- not a table")
    }));
    let mut driver = start_driver(launcher, &test_config()).await;

    let result = driver.execute(&Command::administrative("reload_all")).await.unwrap();

    assert_eq!(result.status(), OperationStatus::Success);
    assert!(result.structured_data().is_none());
    assert!(result.raw_output().contains("nothing tabular"));
}

#[tokio::test(start_paused = true)]
async fn test_every_outcome_is_a_result() {
    let launcher = Arc::new(MockLauncher::new(|line, _| match line {
        "ok" => reply("fine"),
        "bad" => reply("[-] Error: something broke"),
        "big" => reply(&"x".repeat(64)),
        _ => vec![emit("hanging"), Step::Sleep(Duration::from_secs(3600))],
    }));
    let mut config = test_config();
    config.output.max_output_bytes = 32;
    let mut driver = start_driver(launcher, &config).await;

    let mut statuses = Vec::new();
    for (text, budget) in [("ok", 5), ("bad", 5), ("big", 5), ("hang", 1)] {
        let command = Command::query(text).with_timeout(Duration::from_secs(budget));
        statuses.push(driver.execute(&command).await.unwrap().status());
    }

    assert_eq!(
        statuses,
        vec![
            OperationStatus::Success,
            OperationStatus::Failure,
            OperationStatus::Partial,
            OperationStatus::Timeout,
        ]
    );
}
