//! Configuration management for consolepilot
//!
//! Every section carries `#[serde(default)]`, so a configuration file only
//! needs to name the values it changes.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::models::CommandCategory;

/// Main configuration structure for consolepilot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How to launch the console
    pub console: ConsoleConfig,

    /// Process lifecycle limits
    pub supervisor: SupervisorConfig,

    /// Adaptive timeout policy
    pub timeouts: TimeoutConfig,

    /// Session/job tracking
    pub registry: RegistryConfig,

    /// Command policy applied by the tool layer
    pub policy: PolicyConfig,

    /// Output capture limits
    pub output: OutputConfig,
}

impl Config {
    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        loader::ConfigLoader::validate_config(self)
    }
}

/// Console launch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Console executable
    pub program: String,

    /// Arguments passed to the console
    pub args: Vec<String>,

    /// Extra environment variables
    pub environment: HashMap<String, String>,

    /// Whether to inherit the parent environment
    pub inherit_env: bool,

    /// Working directory for the console
    pub working_directory: Option<PathBuf>,

    /// Terminal dimensions (cols, rows)
    pub dimensions: (u16, u16),

    /// Additional prompt regexes, checked before the built-in ones
    pub prompt_patterns: Vec<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        let mut environment = HashMap::new();
        environment.insert("TERM".to_string(), "dumb".to_string());
        Self {
            program: "msfconsole".to_string(),
            args: vec!["-q".to_string()],
            environment,
            inherit_env: true,
            working_directory: None,
            dimensions: (200, 50),
            prompt_patterns: Vec::new(),
        }
    }
}

/// Process supervisor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Time allowed for the first prompt after launch
    pub startup_timeout_secs: u64,

    /// Automatic restarts before the console is declared dead
    pub max_restarts: u32,

    /// Grace period between the quit command and a forced kill
    pub shutdown_grace_ms: u64,

    /// Command sent to ask the console to exit
    pub quit_command: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: 60,
            max_restarts: 3,
            shutdown_grace_ms: 5000,
            quit_command: "exit -y".to_string(),
        }
    }
}

impl SupervisorConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Budget bounds for one command category, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryTimeouts {
    pub base_secs: u64,
    pub min_secs: u64,
    pub max_secs: u64,
}

impl CategoryTimeouts {
    pub const fn new(base_secs: u64, min_secs: u64, max_secs: u64) -> Self {
        Self {
            base_secs,
            min_secs,
            max_secs,
        }
    }

    pub fn base(&self) -> Duration {
        Duration::from_secs(self.base_secs)
    }

    pub fn min(&self) -> Duration {
        Duration::from_secs(self.min_secs)
    }

    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_secs)
    }
}

/// Adaptive timeout configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub query: CategoryTimeouts,
    pub mutating: CategoryTimeouts,
    pub long_running: CategoryTimeouts,
    pub administrative: CategoryTimeouts,

    /// Completions remembered per category
    pub history_window: usize,

    /// Budget multiplier after slow completions or a timeout
    pub grow_factor: f64,

    /// Budget multiplier after a full window of fast completions
    pub shrink_factor: f64,

    /// A completion under `fast_ratio * budget` counts as fast
    pub fast_ratio: f64,

    /// A completion over `slow_ratio * budget` counts as slow
    pub slow_ratio: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            query: CategoryTimeouts::new(30, 5, 120),
            mutating: CategoryTimeouts::new(60, 10, 300),
            long_running: CategoryTimeouts::new(300, 60, 1800),
            administrative: CategoryTimeouts::new(30, 5, 120),
            history_window: 5,
            grow_factor: 1.5,
            shrink_factor: 0.8,
            fast_ratio: 0.25,
            slow_ratio: 0.75,
        }
    }
}

impl TimeoutConfig {
    pub fn for_category(&self, category: CommandCategory) -> &CategoryTimeouts {
        match category {
            CommandCategory::Query => &self.query,
            CommandCategory::Mutating => &self.mutating,
            CommandCategory::LongRunning => &self.long_running,
            CommandCategory::Administrative => &self.administrative,
        }
    }
}

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Sessions without activity for this long become stale
    pub liveness_window_secs: u64,

    /// How often the serializer sweeps for stale sessions
    pub reap_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            liveness_window_secs: 900,
            reap_interval_secs: 60,
        }
    }
}

impl RegistryConfig {
    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

/// Command policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Accepted command prefixes (lowercase)
    pub allowlist: Vec<String>,

    /// Rejected substrings (lowercase)
    pub denylist: Vec<String>,

    pub max_command_length: usize,

    /// Calls allowed per rate window
    pub rate_limit_max_calls: usize,

    pub rate_limit_window_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let allowlist = [
            "help", "version", "workspace", "search", "show", "info", "use", "set", "unset",
            "check", "run", "exploit", "back", "reload_all", "sessions", "jobs", "route",
            "portfwd", "load", "unload", "creds", "loot", "notes", "hosts", "services", "vulns",
            "db_",
        ];
        let denylist = ["rm ", "mkfs", "dd if=", ":(){ :|:& };:"];
        Self {
            allowlist: allowlist.iter().map(|s| s.to_string()).collect(),
            denylist: denylist.iter().map(|s| s.to_string()).collect(),
            max_command_length: 1000,
            rate_limit_max_calls: 30,
            rate_limit_window_secs: 60,
        }
    }
}

/// Output capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Captured bytes per command before the result is marked partial
    pub max_output_bytes: usize,

    /// Characters per page returned by the tools
    pub page_size: usize,

    /// After a custom terminator, how long to wait for the prompt
    pub prompt_settle_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: 10 * 1024 * 1024,
            page_size: 15000,
            prompt_settle_ms: 500,
        }
    }
}

impl OutputConfig {
    pub fn prompt_settle(&self) -> Duration {
        Duration::from_millis(self.prompt_settle_ms)
    }
}
