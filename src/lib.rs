//! consolepilot - Automation core for a long-lived interactive security console
//!
//! This library drives a single interactive console process that has no
//! machine-friendly protocol, only free text and a prompt, and exposes it
//! to any number of concurrent callers through a serialized
//! request/response interface.
//!
//! ## Module Organization
//!
//! ### Console Automation Core
//!
//! - [`pty`] - Console process spawning, I/O bridging and the process supervisor
//! - [`terminal`] - Output parsing: ANSI stripping, prompts, lifecycle banners, tables
//! - [`execution`] - Command/response driver and its adaptive timeout policy
//! - [`registry`] - Sessions and background jobs reported out of band
//! - [`serializer`] - Single-writer admission gate in front of the driver
//!
//! ### Supporting Modules
//!
//! - [`config`] - Configuration loading, defaults and validation
//! - [`models`] - Commands, operation results, entities, console state
//! - [`policy`] - Command allow/deny rules and rate limiting
//! - [`tools`] - Thin domain tools built on the serializer
//! - [`mod@error`] - Error types and Result aliases
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use consolepilot::{Command, Config, PtyLauncher, RequestSerializer};
//!
//! # async fn run() -> consolepilot::Result<()> {
//! let config = Config::default();
//! let launcher = Arc::new(PtyLauncher::new(config.console.clone()));
//! let console = RequestSerializer::from_config(&config, launcher).await?;
//!
//! let result = console.submit(Command::query("sessions -l")).await?;
//! println!("{:?}: {}", result.status(), result.raw_output());
//!
//! console.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Worker Task:** Owns the console and executes one command at a time
//! - **PTY Reader/Writer Threads:** Bridge blocking PTY I/O onto channels
//! - **Reaper Task:** Periodically marks idle sessions stale
//!
//! Callers talk to the worker through a queue and get their result back on
//! a oneshot channel.

#[macro_use]
extern crate tracing;

pub mod config;
pub mod error;
pub mod models;

// Core modules
pub mod execution;
pub mod pty;
pub mod registry;
pub mod serializer;
pub mod terminal;

// Tool layer
pub mod policy;
pub mod tools;

// Re-exports for core functionality
pub use config::loader::ConfigLoader;
pub use config::Config;
pub use error::{Error, Result};
pub use execution::{CommandDriver, ConsoleStatus};
pub use models::{Command, CommandCategory, OperationResult, OperationStatus};
pub use pty::{ConsoleLauncher, ConsoleTransport, ProcessSupervisor, PtyLauncher};
pub use registry::Registry;
pub use serializer::RequestSerializer;

// Version information
/// The current version of consolepilot from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The crate name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Load configuration from the default locations, falling back to defaults
pub fn load_config() -> Config {
    match ConfigLoader::load() {
        Ok(config) => {
            info!("Configuration loaded");
            config
        }
        Err(e) => {
            warn!("Failed to load configuration: {}. Using defaults", e);
            Config::default()
        }
    }
}
