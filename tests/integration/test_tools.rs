//! Integration Tests for the Tool Layer
//!
//! Each tool is exercised end to end through the serializer against the
//! scripted console.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use std::collections::BTreeMap;
use std::sync::Arc;

use consolepilot::config::Config;
use consolepilot::error::Error;
use consolepilot::models::{JobState, SessionState, StructuredData};
use consolepilot::tools::{self, RunModuleRequest, SearchRequest, SessionCommandRequest, ToolContext};
use consolepilot::OperationStatus;
use test_utils::fixtures::{JOBS_TABLE, SEARCH_TABLE, SESSIONS_TABLE, SESSION_OPENED};
use test_utils::{emit, reply, start_serializer, test_config, MockLauncher, Step};

const MODULE_PROMPT: &str = "msf6 exploit(multi/handler) > ";

fn module_reply(text: &str) -> Vec<Step> {
    let mut steps: Vec<Step> = text.lines().map(|l| emit(format!("{}\r\n", l))).collect();
    steps.push(emit(MODULE_PROMPT));
    steps
}

fn console() -> MockLauncher {
    MockLauncher::new(|line, _| match line {
        "use exploit/multi/handler" => {
            module_reply("[*] Using configured payload generic/shell_reverse_tcp")
        }
        "use exploit/does/not_exist" => reply("[-] Failed to load module: exploit/does/not_exist"),
        "set PAYLOAD windows/meterpreter/reverse_tcp" => {
            module_reply("PAYLOAD => windows/meterpreter/reverse_tcp")
        }
        "set LHOST 10.0.0.1" => module_reply("LHOST => 10.0.0.1"),
        "set LPORT 4444" => module_reply("LPORT => 4444"),
        "run -j" => module_reply(&format!(
            "[*] Exploit running as background job 0.\n[*] Started reverse TCP handler on 10.0.0.1:4444\n{}",
            SESSION_OPENED
        )),
        "sessions -l" => reply(SESSIONS_TABLE),
        "sessions -k 1" => reply(
            "[*] Killing the following session(s): 1\n[*] 10.0.0.2 - Meterpreter session 1 closed.  Reason: User exit",
        ),
        "jobs -l" => reply(JOBS_TABLE),
        "version" => reply("Framework: 6.3.4-dev\nConsole  : 6.3.4-dev"),
        "search type:exploit smb" => reply(SEARCH_TABLE),
        other if other.starts_with("sessions -C") => {
            reply("Computer        : WIN-TARGET\nOS              : Windows 10 (10.0 Build 19045)")
        }
        _ => reply("[-] Unknown command"),
    })
}

async fn context(config: Config) -> (ToolContext, Arc<MockLauncher>) {
    let launcher = Arc::new(console());
    let serializer = Arc::new(start_serializer(Arc::clone(&launcher), &config).await);
    (ToolContext::new(serializer, &config), launcher)
}

fn handler_request() -> RunModuleRequest {
    let mut options = BTreeMap::new();
    options.insert("LPORT".to_string(), "4444".to_string());
    options.insert("LHOST".to_string(), "10.0.0.1".to_string());
    RunModuleRequest {
        module: "exploit/multi/handler".to_string(),
        options,
        payload: Some("windows/meterpreter/reverse_tcp".to_string()),
        timeout_secs: None,
    }
}

#[tokio::test]
async fn test_run_module_reports_job_and_session() {
    let (ctx, launcher) = context(test_config()).await;

    let output = tools::run_module(&ctx, handler_request()).await.unwrap();

    assert!(output.is_success());
    let summary = output.data.expect("summary of the run");
    assert_eq!(summary.module, "exploit/multi/handler");
    assert_eq!(summary.job_ids, vec![0]);
    assert_eq!(summary.session_ids, vec![1]);

    assert_eq!(
        launcher.written(),
        vec![
            "use exploit/multi/handler",
            "set PAYLOAD windows/meterpreter/reverse_tcp",
            "set LHOST 10.0.0.1",
            "set LPORT 4444",
            "run -j",
        ]
    );

    let jobs = ctx.registry().jobs().await;
    assert_eq!(jobs[0].module_reference, "exploit/multi/handler");
}

#[tokio::test]
async fn test_run_module_stops_at_failed_step() {
    let (ctx, launcher) = context(test_config()).await;

    let request = RunModuleRequest {
        module: "exploit/does/not_exist".to_string(),
        ..handler_request()
    };
    let output = tools::run_module(&ctx, request).await.unwrap();

    assert_eq!(output.status, OperationStatus::Failure);
    assert!(output.data.is_none());
    assert_eq!(launcher.written(), vec!["use exploit/does/not_exist"]);
}

#[tokio::test]
async fn test_run_module_validates_input() {
    let (ctx, launcher) = context(test_config()).await;

    let bad_module = RunModuleRequest {
        module: "exploit/multi/handler; irb".to_string(),
        ..handler_request()
    };
    assert!(matches!(
        tools::run_module(&ctx, bad_module).await,
        Err(Error::InvalidParameter { .. })
    ));

    let mut bad_option = handler_request();
    bad_option.options.insert("LHOST; id".to_string(), "x".to_string());
    assert!(matches!(
        tools::run_module(&ctx, bad_option).await,
        Err(Error::InvalidParameter { .. })
    ));

    assert!(launcher.written().is_empty());
}

#[tokio::test]
async fn test_session_lifecycle_through_tools() {
    let (ctx, launcher) = context(test_config()).await;
    tools::run_module(&ctx, handler_request()).await.unwrap();

    let listing = tools::list_sessions(&ctx).await.unwrap();
    let listing = listing.data.unwrap();
    assert_eq!(listing.tracked.len(), 1);
    assert_eq!(listing.console.len(), 2);
    assert_eq!(listing.console[0]["Type"], "meterpreter x86/windows");

    let output = tools::session_command(
        &ctx,
        SessionCommandRequest {
            session_id: 1,
            command: "sysinfo".to_string(),
            timeout_secs: Some(30),
        },
    )
    .await
    .unwrap();
    assert!(output.is_success());
    assert!(output.output.output.contains("WIN-TARGET"));
    assert_eq!(output.data.unwrap().state, SessionState::Active);
    assert!(launcher
        .written()
        .contains(&"sessions -C \"sysinfo\" -i 1".to_string()));

    let killed = tools::kill_session(&ctx, 1).await.unwrap();
    assert!(killed.is_success());
    let session = killed.data.unwrap();
    assert_eq!(session.state, SessionState::Closed);
    assert_eq!(session.close_reason.as_deref(), Some("User exit"));

    assert!(matches!(
        tools::kill_session(&ctx, 1).await,
        Err(Error::InvalidParameter { .. })
    ));
}

#[tokio::test]
async fn test_session_command_requires_known_session() {
    let (ctx, launcher) = context(test_config()).await;

    let result = tools::session_command(
        &ctx,
        SessionCommandRequest {
            session_id: 9,
            command: "getuid".to_string(),
            timeout_secs: None,
        },
    )
    .await;

    assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    assert!(launcher.written().is_empty());
}

#[tokio::test]
async fn test_search_pagination() {
    let (ctx, _launcher) = context(test_config()).await;

    let first = tools::search_modules(
        &ctx,
        SearchRequest {
            query: "type:exploit smb".to_string(),
            page: 1,
            page_size: 2,
        },
    )
    .await
    .unwrap();
    let page = first.data.unwrap();
    assert_eq!(page.total_count, 3);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.modules.len(), 2);
    assert!(page.has_next);
    assert!(!page.has_previous);
    assert_eq!(page.modules[0].name, "exploit/windows/smb/ms17_010_eternalblue");

    let second = tools::search_modules(
        &ctx,
        SearchRequest {
            query: "type:exploit smb".to_string(),
            page: 2,
            page_size: 2,
        },
    )
    .await
    .unwrap();
    let page = second.data.unwrap();
    assert_eq!(page.modules.len(), 1);
    assert_eq!(page.modules[0].index, Some(2));
    assert!(!page.has_next);
    assert!(page.has_previous);
}

#[tokio::test]
async fn test_jobs_and_status() {
    let (ctx, _launcher) = context(test_config()).await;
    tools::run_module(&ctx, handler_request()).await.unwrap();

    let jobs = tools::list_jobs(&ctx).await.unwrap().data.unwrap();
    assert_eq!(jobs.tracked.len(), 1);
    assert_eq!(jobs.tracked[0].state, JobState::Running);
    assert_eq!(jobs.console[0]["Name"], "Exploit: multi/handler");

    let report = tools::console_status(&ctx).await.unwrap();
    assert_eq!(report.open_sessions, 1);
    assert_eq!(report.running_jobs, 1);
    assert_eq!(report.queue_depth, 0);
    assert!(report.status.console.is_alive);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["open_sessions"], 1);
    assert!(json["stability_rating"].is_number());
}

#[tokio::test]
async fn test_admin_command_output() {
    let (ctx, _launcher) = context(test_config()).await;

    let output = tools::admin_command(&ctx, "version").await.unwrap();
    assert!(output.is_success());
    match output.data {
        Some(StructuredData::KeyValue { ref entries }) => assert_eq!(entries.len(), 2),
        ref other => panic!("expected key/value data, got {:?}", other),
    }

    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["status"], "SUCCESS");
    assert_eq!(json["output"]["truncated"], false);
    assert!(json["elapsed_ms"].is_number());
}

#[tokio::test]
async fn test_policy_rejects_before_the_console() {
    let (ctx, launcher) = context(test_config()).await;

    assert!(matches!(
        tools::admin_command(&ctx, "rm -rf /").await,
        Err(Error::CommandRejected { .. })
    ));
    assert!(matches!(
        tools::admin_command(&ctx, "version\nirb").await,
        Err(Error::CommandRejected { .. })
    ));
    assert!(matches!(
        tools::admin_command(&ctx, "   ").await,
        Err(Error::EmptyCommand)
    ));
    assert!(launcher.written().is_empty());
}

#[tokio::test]
async fn test_admin_lane_refuses_ordinary_commands() {
    let (ctx, launcher) = context(test_config()).await;

    for command in ["run", "exploit -j", "sessions -k 1", "use exploit/multi/handler"] {
        assert!(matches!(
            tools::admin_command(&ctx, command).await,
            Err(Error::CommandRejected { ref reason, .. }) if reason == "not an administrative command"
        ));
    }
    assert!(launcher.written().is_empty());

    assert!(tools::admin_command(&ctx, "version").await.unwrap().is_success());
}

#[tokio::test]
async fn test_rate_limit() {
    let mut config = test_config();
    config.policy.rate_limit_max_calls = 2;
    let (ctx, _launcher) = context(config).await;

    tools::admin_command(&ctx, "version").await.unwrap();
    tools::admin_command(&ctx, "version").await.unwrap();
    assert!(matches!(
        tools::admin_command(&ctx, "version").await,
        Err(Error::RateLimited { max_calls: 2, .. })
    ));

    // Status never touches the console and is not rate limited
    assert!(tools::console_status(&ctx).await.is_ok());
}

#[tokio::test]
async fn test_long_output_is_paginated() {
    let mut config = test_config();
    config.output.page_size = 120;
    let (ctx, _launcher) = context(config).await;

    let output = tools::list_sessions(&ctx).await.unwrap();
    assert!(output.output.truncated);
    assert!(output.output.showing_length <= 120);
    assert_eq!(output.output.total_length, SESSIONS_TABLE.trim_end().len());
    // Structured rows are unaffected by pagination
    assert_eq!(output.data.unwrap().console.len(), 2);
}
