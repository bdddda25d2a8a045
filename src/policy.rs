//! Command Policy
//!
//! Guards what callers may send to the console: a prefix allowlist, a
//! substring denylist, a length limit and a sliding-window rate limiter.
//! Tools enforce these before submitting; the core itself drives whatever
//! it is given.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::PolicyConfig;
use crate::error::{Error, Result};

/// Allow/deny rules for console commands
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    allowlist: Vec<String>,
    denylist: Vec<String>,
    max_length: usize,
}

impl CommandPolicy {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            allowlist: config.allowlist.iter().map(|p| p.to_lowercase()).collect(),
            denylist: config.denylist.iter().map(|p| p.to_lowercase()).collect(),
            max_length: config.max_command_length,
        }
    }

    /// Validate a command line, returning it with control characters removed
    pub fn check(&self, command: &str) -> Result<String> {
        let cleaned: String = command.chars().filter(|c| *c != '\0' && *c != '\r').collect();
        let trimmed = cleaned.trim();

        if trimmed.is_empty() {
            return Err(Error::EmptyCommand);
        }
        if trimmed.chars().count() > self.max_length {
            return Err(self.reject(trimmed, format!("longer than {} characters", self.max_length)));
        }
        if trimmed.contains('\n') {
            return Err(self.reject(trimmed, "contains a line break".to_string()));
        }

        let lower = trimmed.to_lowercase();
        if !self.allowlist.iter().any(|prefix| lower.starts_with(prefix.as_str())) {
            return Err(self.reject(trimmed, "not in allowlist".to_string()));
        }
        if let Some(bad) = self.denylist.iter().find(|bad| lower.contains(bad.as_str())) {
            return Err(self.reject(trimmed, format!("contains denied pattern '{}'", bad.trim())));
        }

        Ok(trimmed.to_string())
    }

    fn reject(&self, command: &str, reason: String) -> Error {
        warn!(command = %command, reason = %reason, "Command rejected by policy");
        Error::CommandRejected {
            command: command.to_string(),
            reason,
        }
    }
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}

/// Sliding-window call limiter
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self::new(
            config.rate_limit_max_calls,
            Duration::from_secs(config.rate_limit_window_secs),
        )
    }

    /// Record a call if the window has room for it
    pub fn allow(&self) -> bool {
        let now = Instant::now();
        let mut calls = self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while calls
            .front()
            .is_some_and(|&first| now.duration_since(first) > self.window)
        {
            calls.pop_front();
        }
        if calls.len() >= self.max_calls {
            return false;
        }
        calls.push_back(now);
        true
    }

    /// Like [`allow`](Self::allow), as an error
    pub fn check(&self) -> Result<()> {
        if self.allow() {
            Ok(())
        } else {
            warn!(max_calls = self.max_calls, "Rate limit exceeded");
            Err(Error::RateLimited {
                max_calls: self.max_calls,
                window: self.window,
            })
        }
    }
}
