//! Console Tools
//!
//! Thin translators from a domain action to console commands. Each tool
//! builds category-appropriate [`Command`] values, submits them through the
//! serializer and shapes the [`OperationResult`] into its own output.

pub mod admin;
pub mod exploit;
pub mod search;
pub mod sessions;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::models::{Command, EntityRef, OperationError, OperationResult, OperationStatus};
use crate::policy::{CommandPolicy, RateLimiter};
use crate::registry::Registry;
use crate::serializer::RequestSerializer;
use crate::terminal::{paginate, Page};

pub use admin::{admin_command, console_status, list_jobs};
pub use exploit::{run_module, RunModuleRequest, RunModuleSummary};
pub use search::{search_modules, ModuleSummary, SearchPage, SearchRequest};
pub use sessions::{kill_session, list_sessions, session_command, SessionCommandRequest};

/// Shared handles every tool needs
pub struct ToolContext {
    serializer: Arc<RequestSerializer>,
    policy: CommandPolicy,
    limiter: RateLimiter,
    page_size: usize,
    query_base: Duration,
}

impl ToolContext {
    pub fn new(serializer: Arc<RequestSerializer>, config: &Config) -> Self {
        Self {
            serializer,
            policy: CommandPolicy::new(&config.policy),
            limiter: RateLimiter::from_config(&config.policy),
            page_size: config.output.page_size,
            query_base: config.timeouts.query.base(),
        }
    }

    /// Count one tool call against the rate limit
    pub fn admit(&self) -> Result<()> {
        self.limiter.check()
    }

    /// Policy-checked command text
    pub fn command_text(&self, text: &str) -> Result<String> {
        self.policy.check(text)
    }

    pub async fn submit(&self, command: Command) -> Result<OperationResult> {
        self.serializer.submit(command).await
    }

    pub fn serializer(&self) -> &Arc<RequestSerializer> {
        &self.serializer
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.serializer.registry()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn query_base(&self) -> Duration {
        self.query_base
    }
}

/// Tool result: the command outcome plus the tool's own view of it
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput<T> {
    pub status: OperationStatus,
    pub data: Option<T>,
    /// Console output, cut to the configured page size
    pub output: Page,
    pub error: Option<OperationError>,
    #[serde(rename = "elapsed_ms", with = "crate::models::duration_ms")]
    pub elapsed: Duration,
    pub correlated_entities: Vec<EntityRef>,
}

impl<T> ToolOutput<T> {
    pub fn from_result(result: &OperationResult, data: Option<T>, page_size: usize) -> Self {
        Self {
            status: result.status(),
            data,
            output: paginate(result.raw_output(), page_size),
            error: result.error().cloned(),
            elapsed: result.elapsed(),
            correlated_entities: result.correlated_entities().to_vec(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }
}
