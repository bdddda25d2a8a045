//! Administration
//!
//! Commands addressed to the console itself. They are submitted with the
//! administrative category and so are admitted ahead of queued work.

use serde::Serialize;
use std::collections::BTreeMap;

use super::{ToolContext, ToolOutput};
use crate::error::{Error, Result};
use crate::execution::ConsoleStatus;
use crate::models::{Command, Job, JobState, StructuredData};

/// Commands that may take the priority lane
const ADMIN_COMMANDS: &[&str] = &[
    "version",
    "help",
    "workspace",
    "db_status",
    "db_connect",
    "db_disconnect",
    "db_rebuild_cache",
    "jobs",
    "reload_all",
];

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub status: ConsoleStatus,
    pub queue_depth: usize,
    pub open_sessions: usize,
    pub running_jobs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobListing {
    /// Jobs known to the registry, finished ones included
    pub tracked: Vec<Job>,
    /// Rows of the console's `jobs -l` table
    pub console: Vec<BTreeMap<String, String>>,
}

/// Run an administrative console command
pub async fn admin_command(ctx: &ToolContext, command: &str) -> Result<ToolOutput<StructuredData>> {
    ctx.admit()?;
    let text = ctx.command_text(command)?;
    if !is_admin_command(&text) {
        warn!(command = %text, "Refusing non-administrative command on the priority lane");
        return Err(Error::CommandRejected {
            command: text,
            reason: "not an administrative command".to_string(),
        });
    }
    let result = ctx.submit(Command::administrative(text)).await?;
    let data = result.structured_data().cloned();
    Ok(ToolOutput::from_result(&result, data, ctx.page_size()))
}

fn is_admin_command(text: &str) -> bool {
    let verb = text.split_whitespace().next().unwrap_or_default().to_lowercase();
    ADMIN_COMMANDS.contains(&verb.as_str())
}

/// Console health and statistics; does not touch the console
pub async fn console_status(ctx: &ToolContext) -> Result<StatusReport> {
    let registry = ctx.registry();
    let open_sessions = registry.sessions().await.iter().filter(|s| s.is_open()).count();
    let running_jobs = registry
        .jobs()
        .await
        .iter()
        .filter(|j| j.state == JobState::Running)
        .count();

    Ok(StatusReport {
        status: ctx.serializer().status(),
        queue_depth: ctx.serializer().queue_depth(),
        open_sessions,
        running_jobs,
    })
}

pub async fn list_jobs(ctx: &ToolContext) -> Result<ToolOutput<JobListing>> {
    ctx.admit()?;
    let text = ctx.command_text("jobs -l")?;
    let result = ctx.submit(Command::administrative(text)).await?;

    let console: Vec<BTreeMap<String, String>> = result
        .structured_data()
        .map(|data| {
            data.table_records()
                .into_iter()
                .map(|record| {
                    record
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect()
                })
                .collect()
        })
        .unwrap_or_default();

    let listing = JobListing {
        tracked: ctx.registry().jobs().await,
        console,
    };
    Ok(ToolOutput::from_result(&result, Some(listing), ctx.page_size()))
}
