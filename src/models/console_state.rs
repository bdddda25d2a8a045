//! Console Process State
//!
//! Process-wide state owned by the supervisor. A new generation begins
//! every time a console process reaches its first prompt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsoleState {
    /// OS process identifier of the current console
    pub pid: Option<u32>,
    pub is_alive: bool,
    /// Automatic restarts performed so far
    pub restart_count: u32,
    pub last_prompt_seen: String,
    /// Incremented on every successful start; 0 before the first one
    pub generation: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub terminated_at: Option<DateTime<Utc>>,
}

impl ConsoleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a console that reached its ready prompt
    pub fn mark_started(&mut self, pid: Option<u32>, prompt: &str) -> u64 {
        self.pid = pid;
        self.is_alive = true;
        self.generation += 1;
        self.last_prompt_seen = prompt.to_string();
        self.started_at = Some(Utc::now());
        self.terminated_at = None;
        self.generation
    }

    pub fn mark_terminated(&mut self) {
        self.is_alive = false;
        self.terminated_at = Some(Utc::now());
    }

    pub fn has_started(&self) -> bool {
        self.generation > 0
    }

    /// Time since the current console started
    pub fn uptime(&self) -> Option<std::time::Duration> {
        match (self.started_at, self.is_alive) {
            (Some(start), true) => Utc::now().signed_duration_since(start).to_std().ok(),
            _ => None,
        }
    }
}
