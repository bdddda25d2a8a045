//! Contract Tests for Console Process Lifecycle
//!
//! Contract: the supervisor starts a console only once its prompt is seen,
//! reports a console that never gets there as `StartupTimeout`, restarts a
//! bounded number of times and always sends the quit command on shutdown.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use consolepilot::config::SupervisorConfig;
use consolepilot::error::Error;
use consolepilot::terminal::PromptDetector;
use consolepilot::ProcessSupervisor;
use test_utils::{emit, reply, MockLauncher, Step, PROMPT};
use tokio_test::{assert_err, assert_ok};

fn supervisor_config() -> SupervisorConfig {
    SupervisorConfig {
        startup_timeout_secs: 10,
        max_restarts: 2,
        shutdown_grace_ms: 200,
        quit_command: "exit -y".to_string(),
    }
}

fn supervisor(launcher: Arc<MockLauncher>) -> ProcessSupervisor {
    ProcessSupervisor::new(launcher, PromptDetector::new(), supervisor_config())
}

#[tokio::test]
async fn test_start_waits_for_prompt() {
    let launcher = Arc::new(MockLauncher::new(|line, _| reply(line)).with_banner(vec![
        emit("\x1b[4m       =[ metasploit v6.3.4-dev ]\x1b[0m\r\n"),
        emit("+ -- --=[ 2376 exploits - 1232 auxiliary - 416 post ]\r\n\r\n"),
        emit("msf"),
        emit("6 > "),
    ]));
    let mut supervisor = supervisor(Arc::clone(&launcher));

    assert!(!supervisor.is_healthy());
    let generation = assert_ok!(supervisor.start().await);

    assert_eq!(generation, 1);
    let state = supervisor.state();
    assert!(state.is_alive);
    assert_eq!(state.pid, Some(40_001));
    assert_eq!(state.last_prompt_seen, PROMPT);
    assert_eq!(state.restart_count, 0);
    assert!(state.started_at.is_some());
    assert!(supervisor.is_healthy());
}

#[tokio::test(start_paused = true)]
async fn test_silent_console_times_out() {
    let launcher = Arc::new(
        MockLauncher::new(|line, _| reply(line))
            .with_banner(vec![emit("[*] Starting the Metasploit Framework console...\r\n"), emit("|")]),
    );
    let mut supervisor = supervisor(launcher);

    let started = tokio::time::Instant::now();
    let error = supervisor.start().await.unwrap_err();

    assert!(started.elapsed() >= Duration::from_secs(10));
    match error {
        Error::StartupTimeout { timeout, captured } => {
            assert_eq!(timeout, Duration::from_secs(10));
            assert!(captured.contains("Starting the Metasploit Framework console"));
            assert!(captured.ends_with('|'));
        }
        other => panic!("expected StartupTimeout, got {:?}", other),
    }
    assert!(!supervisor.state().has_started());
}

#[tokio::test]
async fn test_console_exiting_at_startup() {
    let launcher = Arc::new(
        MockLauncher::new(|line, _| reply(line))
            .with_banner(vec![emit("/usr/bin/msfconsole: not found\r\n"), Step::Exit]),
    );
    let mut supervisor = supervisor(launcher);

    let error = assert_err!(supervisor.start().await);
    assert!(error.is_fatal());
    assert!(matches!(error, Error::StartupTimeout { .. }));
}

#[tokio::test]
async fn test_restart_is_bounded() {
    let launcher = Arc::new(MockLauncher::new(|line, _| reply(line)));
    let mut supervisor = supervisor(Arc::clone(&launcher));
    supervisor.start().await.unwrap();

    assert_eq!(supervisor.restart().await.unwrap(), 2);
    assert_eq!(supervisor.restart().await.unwrap(), 3);
    assert_eq!(supervisor.state().restart_count, 2);

    let error = assert_err!(supervisor.restart().await);
    assert!(matches!(
        error,
        Error::RestartLimitExceeded {
            restarts: 2,
            limit: 2
        }
    ));
    assert_eq!(launcher.launches(), 3);
    assert!(supervisor.is_healthy());
}

#[tokio::test]
async fn test_shutdown_sends_quit_command() {
    let launcher = Arc::new(MockLauncher::new(|line, _| reply(line)));
    let mut supervisor = supervisor(Arc::clone(&launcher));
    supervisor.start().await.unwrap();

    supervisor.shutdown().await.unwrap();

    assert_eq!(launcher.written(), vec!["exit -y"]);
    assert!(!supervisor.state().is_alive);
    assert!(supervisor.state().terminated_at.is_some());
    assert!(!supervisor.is_healthy());

    // A second shutdown has nothing left to stop
    supervisor.shutdown().await.unwrap();
    assert_eq!(launcher.written().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_kills_console_ignoring_quit() {
    // Quit is answered but the process never exits on its own
    let launcher = Arc::new(MockLauncher::new(|_, _| vec![emit("[*] still here\r\n")]));
    let mut supervisor = ProcessSupervisor::new(
        Arc::clone(&launcher) as Arc<dyn consolepilot::ConsoleLauncher>,
        PromptDetector::new(),
        SupervisorConfig {
            quit_command: "quit".to_string(),
            ..supervisor_config()
        },
    );
    supervisor.start().await.unwrap();

    let started = tokio::time::Instant::now();
    supervisor.shutdown().await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(launcher.written(), vec!["quit"]);
    assert!(!supervisor.state().is_alive);
}

#[tokio::test]
async fn test_send_before_start() {
    let launcher = Arc::new(MockLauncher::new(|line, _| reply(line)));
    let mut supervisor = supervisor(launcher);

    assert!(matches!(
        supervisor.send(b"version\n").await,
        Err(Error::ConsoleNotStarted)
    ));
}
