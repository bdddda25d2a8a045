//! Integration Tests for the Request Serializer
//!
//! Concurrent callers share one console: commands must never interleave on
//! the wire, and administrative commands jump the queue without preempting
//! the command in flight.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use consolepilot::error::Error;
use consolepilot::Command;
use futures::future::join_all;
use test_utils::{emit, reply, start_serializer, test_config, MockLauncher, Step, PROMPT};

/// Answers `probe <n>` slowly and in pieces
fn chunked_prober() -> MockLauncher {
    MockLauncher::new(|line, _| match line.strip_prefix("probe ") {
        Some(n) => vec![
            emit(format!("begin {}\r\n", n)),
            Step::Sleep(Duration::from_millis(5)),
            emit(format!("middle {}\r\n", n)),
            Step::Sleep(Duration::from_millis(5)),
            emit(format!("end {}\r\n", n)),
            emit(PROMPT),
        ],
        None => reply(line),
    })
}

#[tokio::test]
async fn test_concurrent_commands_do_not_interleave() {
    let launcher = Arc::new(chunked_prober());
    let serializer = Arc::new(start_serializer(Arc::clone(&launcher), &test_config()).await);

    let calls = (0..12).map(|i| {
        let serializer = Arc::clone(&serializer);
        async move {
            let result = serializer
                .submit(Command::query(format!("probe {}", i)))
                .await
                .unwrap();
            (i, result)
        }
    });
    let results = join_all(calls).await;

    for (i, result) in results {
        assert!(result.is_success());
        assert_eq!(
            result.raw_output(),
            format!("begin {i}\nmiddle {i}\nend {i}"),
            "output of probe {} mixed with another command",
            i
        );
    }
    assert_eq!(launcher.written().len(), 12);

    serializer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_fifo_within_a_lane() {
    let launcher = Arc::new(chunked_prober());
    let serializer = Arc::new(start_serializer(Arc::clone(&launcher), &test_config()).await);

    let mut handles = Vec::new();
    for i in 0..5 {
        let serializer = Arc::clone(&serializer);
        handles.push(tokio::spawn(async move {
            serializer.submit(Command::query(format!("probe {}", i))).await
        }));
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let expected: Vec<String> = (0..5).map(|i| format!("probe {}", i)).collect();
    assert_eq!(launcher.written(), expected);

    serializer.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_administrative_command_jumps_the_queue() {
    let launcher = Arc::new(MockLauncher::new(|line, _| match line {
        "blocker" => vec![Step::Sleep(Duration::from_secs(1)), emit(PROMPT)],
        other => reply(other),
    }));
    let serializer = Arc::new(start_serializer(Arc::clone(&launcher), &test_config()).await);

    let submit = |command: Command| {
        let serializer = Arc::clone(&serializer);
        tokio::spawn(async move { serializer.submit(command).await })
    };

    let mut handles = vec![submit(Command::long_running("blocker"))];
    tokio::time::sleep(Duration::from_millis(10)).await;
    for name in ["hosts", "services", "vulns"] {
        handles.push(submit(Command::query(name)));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(serializer.queue_depth(), 3);
    handles.push(submit(Command::administrative("version")));

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_success());
    }

    assert_eq!(
        launcher.written(),
        vec!["blocker", "version", "hosts", "services", "vulns"]
    );

    serializer.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_withdrawn_request_is_never_sent() {
    let launcher = Arc::new(MockLauncher::new(|line, _| match line {
        "blocker" => vec![Step::Sleep(Duration::from_secs(1)), emit(PROMPT)],
        other => reply(other),
    }));
    let serializer = Arc::new(start_serializer(Arc::clone(&launcher), &test_config()).await);

    let blocker = {
        let serializer = Arc::clone(&serializer);
        tokio::spawn(async move { serializer.submit(Command::long_running("blocker")).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        serializer.submit(Command::query("hosts")),
    )
    .await;
    assert!(abandoned.is_err());

    blocker.await.unwrap().unwrap();
    serializer.submit(Command::query("services")).await.unwrap();

    assert_eq!(launcher.written(), vec!["blocker", "services"]);

    serializer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_submit_after_shutdown_is_rejected() {
    let launcher = Arc::new(chunked_prober());
    let serializer = start_serializer(launcher, &test_config()).await;

    serializer.shutdown().await.unwrap();
    let error = serializer.submit(Command::query("hosts")).await.unwrap_err();
    assert!(matches!(error, Error::ConsoleUnavailable { .. }));
}

#[tokio::test]
async fn test_status_updates_are_published() {
    let launcher = Arc::new(chunked_prober());
    let serializer = start_serializer(launcher, &test_config()).await;
    let mut updates = serializer.subscribe();

    serializer.submit(Command::query("probe 1")).await.unwrap();
    updates.changed().await.unwrap();
    let status = updates.borrow_and_update().clone();
    assert_eq!(status.stats.successes, 1);
    assert_eq!(status.stability_rating, 10);
    assert!(status.console.is_alive);

    serializer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_startup_timeout_surfaces_immediately() {
    let launcher = Arc::new(
        MockLauncher::new(|line, _| reply(line))
            .with_banner(vec![emit("[-] Failed to connect to the database\r\n"), Step::Exit]),
    );

    let error = consolepilot::RequestSerializer::from_config(&test_config(), launcher)
        .await
        .err()
        .expect("console without a prompt cannot start");
    match error {
        Error::StartupTimeout { captured, .. } => {
            assert!(captured.contains("Failed to connect to the database"));
        }
        other => panic!("expected StartupTimeout, got {:?}", other),
    }
}
