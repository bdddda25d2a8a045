//! Session interaction
//!
//! Listing, running commands inside, and killing sessions. The registry is
//! the source of truth for which sessions exist; the console's own table is
//! returned alongside it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::{ToolContext, ToolOutput};
use crate::error::{Error, Result};
use crate::models::{Command, Session};

#[derive(Debug, Clone, Serialize)]
pub struct SessionListing {
    /// Sessions known to the registry, including closed ones
    pub tracked: Vec<Session>,
    /// Rows of the console's `sessions -l` table
    pub console: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionCommandRequest {
    pub session_id: u32,
    pub command: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

pub async fn list_sessions(ctx: &ToolContext) -> Result<ToolOutput<SessionListing>> {
    ctx.admit()?;
    let text = ctx.command_text("sessions -l")?;
    let result = ctx.submit(Command::query(text)).await?;

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

    let listing = SessionListing {
        tracked: ctx.registry().sessions().await,
        console,
    };
    Ok(ToolOutput::from_result(&result, Some(listing), ctx.page_size()))
}

/// Run a command inside an open session
pub async fn session_command(
    ctx: &ToolContext,
    request: SessionCommandRequest,
) -> Result<ToolOutput<Session>> {
    ctx.admit()?;
    let inner = request.command.trim();
    if inner.is_empty() {
        return Err(Error::InvalidParameter {
            name: "command".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    require_open_session(ctx, request.session_id).await?;

    let escaped = inner.replace('\\', "\\\\").replace('"', "\\\"");
    let text = ctx.command_text(&format!(
        "sessions -C \"{}\" -i {}",
        escaped, request.session_id
    ))?;
    let mut command = Command::mutating(text).touching_session(request.session_id);
    if let Some(secs) = request.timeout_secs {
        command = command.with_timeout(Duration::from_secs(secs));
    }

    let result = ctx.submit(command).await?;
    let session = ctx.registry().session(request.session_id).await;
    Ok(ToolOutput::from_result(&result, session, ctx.page_size()))
}

pub async fn kill_session(ctx: &ToolContext, session_id: u32) -> Result<ToolOutput<Session>> {
    ctx.admit()?;
    require_open_session(ctx, session_id).await?;

    let text = ctx.command_text(&format!("sessions -k {}", session_id))?;
    let result = ctx
        .submit(Command::mutating(text).closing_session(session_id))
        .await?;
    let session = ctx.registry().session(session_id).await;
    Ok(ToolOutput::from_result(&result, session, ctx.page_size()))
}

async fn require_open_session(ctx: &ToolContext, session_id: u32) -> Result<Session> {
    match ctx.registry().session(session_id).await {
        Some(session) if session.is_open() => Ok(session),
        Some(_) => Err(Error::InvalidParameter {
            name: "session_id".to_string(),
            reason: format!("session {} is closed", session_id),
        }),
        None => Err(Error::InvalidParameter {
            name: "session_id".to_string(),
            reason: format!("no session {} on the current console", session_id),
        }),
    }
}
