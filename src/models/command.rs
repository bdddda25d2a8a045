//! Command Model
//!
//! A command is one line of console input together with everything the
//! driver needs to know to decide when the console has finished with it.
//! Commands are immutable once built; the builder methods consume `self`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Latency class of a command, used for timeout budgeting and admission priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
    /// Read-only status queries
    Query,
    /// Commands that change console state (`use`, `set`, ...)
    Mutating,
    /// Scans, exploits and anything else that may run for minutes
    LongRunning,
    /// Commands addressed to the console itself; admitted ahead of the queue
    Administrative,
}

impl CommandCategory {
    pub const ALL: [CommandCategory; 4] = [
        CommandCategory::Query,
        CommandCategory::Mutating,
        CommandCategory::LongRunning,
        CommandCategory::Administrative,
    ];

    /// Whether commands of this category bypass the normal FIFO queue
    pub fn is_priority(&self) -> bool {
        matches!(self, CommandCategory::Administrative)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandCategory::Query => "query",
            CommandCategory::Mutating => "mutating",
            CommandCategory::LongRunning => "long_running",
            CommandCategory::Administrative => "administrative",
        }
    }
}

impl fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a successful command affects a tracked session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBinding {
    /// The command interacted with the session
    Touch(u32),
    /// The command closed the session
    Close(u32),
}

/// A single console command
#[derive(Debug, Clone)]
pub struct Command {
    text: String,
    category: CommandCategory,
    expected_terminators: Vec<Regex>,
    timeout_budget: Option<Duration>,
    retries_allowed: u32,
    session: Option<SessionBinding>,
}

impl Command {
    /// Create a command in the given category
    pub fn new(text: impl Into<String>, category: CommandCategory) -> Self {
        Self {
            text: text.into(),
            category,
            expected_terminators: Vec::new(),
            timeout_budget: None,
            retries_allowed: 0,
            session: None,
        }
    }

    pub fn query(text: impl Into<String>) -> Self {
        Self::new(text, CommandCategory::Query)
    }

    pub fn mutating(text: impl Into<String>) -> Self {
        Self::new(text, CommandCategory::Mutating)
    }

    pub fn long_running(text: impl Into<String>) -> Self {
        Self::new(text, CommandCategory::LongRunning)
    }

    pub fn administrative(text: impl Into<String>) -> Self {
        Self::new(text, CommandCategory::Administrative)
    }

    /// Add a completion pattern in addition to the console prompt
    pub fn with_terminator(mut self, pattern: &str) -> Result<Self> {
        self.expected_terminators.push(Regex::new(pattern)?);
        Ok(self)
    }

    /// Add an already compiled completion pattern
    pub fn with_terminator_regex(mut self, regex: Regex) -> Self {
        self.expected_terminators.push(regex);
        self
    }

    /// Pin the timeout budget instead of using the adaptive one
    pub fn with_timeout(mut self, budget: Duration) -> Self {
        self.timeout_budget = Some(budget);
        self
    }

    /// Allow the command to be re-run after a console crash
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries_allowed = retries;
        self
    }

    /// Mark the command as interacting with a tracked session
    pub fn touching_session(mut self, id: u32) -> Self {
        self.session = Some(SessionBinding::Touch(id));
        self
    }

    /// Mark the command as closing a tracked session
    pub fn closing_session(mut self, id: u32) -> Self {
        self.session = Some(SessionBinding::Close(id));
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn category(&self) -> CommandCategory {
        self.category
    }

    pub fn expected_terminators(&self) -> &[Regex] {
        &self.expected_terminators
    }

    pub fn timeout_budget(&self) -> Option<Duration> {
        self.timeout_budget
    }

    pub fn retries_allowed(&self) -> u32 {
        self.retries_allowed
    }

    pub fn session(&self) -> Option<SessionBinding> {
        self.session
    }

    /// Check whether `text` satisfies one of the command's own terminators
    pub fn matches_terminator(&self, text: &str) -> bool {
        self.expected_terminators.iter().any(|re| re.is_match(text))
    }

    /// Bytes written to the console for this command
    pub fn wire_bytes(&self) -> Result<Vec<u8>> {
        if self.text.trim().is_empty() {
            return Err(Error::EmptyCommand);
        }
        let line = self.text.trim_end_matches(['\r', '\n']);
        // One submit must be exactly one console command
        if line.contains(['\r', '\n']) {
            return Err(Error::InvalidCommand {
                command: line.to_string(),
                reason: "embedded line break".to_string(),
            });
        }
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        Ok(bytes)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.text)
    }
}
