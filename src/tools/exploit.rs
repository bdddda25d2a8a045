//! Module execution
//!
//! Selects a module, sets its options and runs it as a background job.
//! Sessions and jobs it creates are reported through the correlated
//! entities of the run.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::{ToolContext, ToolOutput};
use crate::error::{Error, Result};
use crate::models::{Command, EntityKind, OperationResult};

static MODULE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:exploit|auxiliary|post|payload|encoder|nop|evasion)(?:/[\w.\-]+)+$")
        .expect("valid module name regex")
});
static OPTION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid option name regex"));

/// Lines that end a module run before the prompt returns
const RUN_TERMINATORS: [&str; 3] = [
    r"(?i)exploit completed",
    r"(?i)exploit aborted",
    r"(?i)auxiliary module execution completed",
];

#[derive(Debug, Clone, Deserialize)]
pub struct RunModuleRequest {
    pub module: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunModuleSummary {
    pub module: String,
    pub job_ids: Vec<u32>,
    pub session_ids: Vec<u32>,
}

pub async fn run_module(
    ctx: &ToolContext,
    request: RunModuleRequest,
) -> Result<ToolOutput<RunModuleSummary>> {
    ctx.admit()?;
    let module = request.module.trim();
    if !MODULE_NAME.is_match(module) {
        return Err(Error::InvalidParameter {
            name: "module".to_string(),
            reason: format!("'{}' is not a module path", module),
        });
    }

    let mut settings: Vec<(String, String)> = Vec::with_capacity(request.options.len() + 1);
    if let Some(payload) = &request.payload {
        settings.push(("PAYLOAD".to_string(), payload.trim().to_string()));
    }
    for (name, value) in &request.options {
        if !OPTION_NAME.is_match(name) {
            return Err(Error::InvalidParameter {
                name: "options".to_string(),
                reason: format!("invalid option name '{}'", name),
            });
        }
        settings.push((name.clone(), value.trim().to_string()));
    }

    let selected = ctx
        .submit(Command::mutating(ctx.command_text(&format!("use {}", module))?))
        .await?;
    if !selected.is_success() {
        return Ok(ToolOutput::from_result(&selected, None, ctx.page_size()));
    }

    for (name, value) in &settings {
        let text = ctx.command_text(&format!("set {} {}", name, value))?;
        let result = ctx.submit(Command::mutating(text)).await?;
        if !result.is_success() {
            return Ok(ToolOutput::from_result(&result, None, ctx.page_size()));
        }
    }

    let mut command = Command::long_running(ctx.command_text("run -j")?);
    for pattern in RUN_TERMINATORS {
        command = command.with_terminator(pattern)?;
    }
    if let Some(secs) = request.timeout_secs {
        command = command.with_timeout(Duration::from_secs(secs));
    }

    info!(module = %module, options = settings.len(), "Running module");
    let result = ctx.submit(command).await?;
    let summary = summarize(module, &result);
    Ok(ToolOutput::from_result(&result, Some(summary), ctx.page_size()))
}

fn summarize(module: &str, result: &OperationResult) -> RunModuleSummary {
    let ids = |kind: EntityKind| {
        result
            .correlated_entities()
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.id)
            .collect()
    };
    RunModuleSummary {
        module: module.to_string(),
        job_ids: ids(EntityKind::Job),
        session_ids: ids(EntityKind::Session),
    }
}
