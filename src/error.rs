//! Error types and Result aliases for consolepilot

use std::path::PathBuf;
use std::time::Duration;

use crate::models::ErrorKind;

/// Result type alias for consolepilot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for consolepilot
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // === PTY-related errors ===
    /// Failed to create PTY
    #[error("Failed to create PTY for '{command}': {reason}")]
    PtyCreationFailed { command: String, reason: String },

    /// Failed to spawn the console in the PTY
    #[error("Failed to spawn '{command}': {reason}")]
    CommandSpawnFailed { command: String, reason: String },

    /// Failed to clone PTY reader
    #[error("Failed to clone PTY reader: {reason}")]
    PtyReaderCloneFailed { reason: String },

    /// Failed to take PTY writer
    #[error("Failed to take PTY writer: {reason}")]
    PtyWriterTakeFailed { reason: String },

    /// Failed to send input to PTY
    #[error("Failed to send input to PTY: {reason}")]
    PtyInputSendFailed { reason: String },

    /// Failed to send signal to process
    #[error("Failed to send signal '{signal}': {reason}")]
    SignalSendFailed { signal: String, reason: String },

    // === Console errors ===
    /// The console never showed its ready prompt
    #[error("Console did not reach its prompt within {timeout:?}")]
    StartupTimeout { timeout: Duration, captured: String },

    /// Automatic recovery has been exhausted
    #[error("Console restart limit exceeded ({restarts}/{limit})")]
    RestartLimitExceeded { restarts: u32, limit: u32 },

    /// The console died while a command was in flight
    #[error("Console crashed while executing '{command}'")]
    ConsoleCrashed {
        command: String,
        partial_output: String,
    },

    /// No console process is attached
    #[error("Console is not running")]
    ConsoleNotStarted,

    /// The request serializer is no longer accepting work
    #[error("Console unavailable: {reason}")]
    ConsoleUnavailable { reason: String },

    // === Command errors ===
    /// Empty command
    #[error("Command cannot be empty")]
    EmptyCommand,

    /// Command text that cannot be sent as a single console line
    #[error("Invalid command '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },

    /// Command refused by the command policy
    #[error("Command '{command}' rejected: {reason}")]
    CommandRejected { command: String, reason: String },

    /// Too many requests inside the rate window
    #[error("Rate limit exceeded ({max_calls} calls per {window:?})")]
    RateLimited { max_calls: usize, window: Duration },

    /// Invalid tool parameters
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    // === Configuration errors ===
    /// Failed to load configuration file
    #[error("Failed to load config from '{}': {reason}", path.display())]
    ConfigLoadFailed { path: PathBuf, reason: String },

    /// Configuration file not found
    #[error("Configuration file not found")]
    ConfigNotFound,

    /// Configuration validation failed
    #[error("Configuration validation failed for '{field}': {reason}")]
    ConfigValidationFailed { field: String, reason: String },

    /// Failed to serialize configuration
    #[error("Failed to serialize config as {format}: {reason}")]
    ConfigSerializationFailed { format: String, reason: String },

    /// Failed to parse configuration
    #[error("Failed to parse {format} config: {reason}")]
    ConfigParseFailed { format: String, reason: String },

    // === I/O and serialization errors ===
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Regex compilation errors
    #[error("Regex compilation error: {0}")]
    Regex(#[from] regex::Error),

    // === Generic fallback (use sparingly) ===
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Map onto the console fault taxonomy, if the error belongs to it
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::StartupTimeout { .. } => Some(ErrorKind::StartupTimeout),
            Error::RestartLimitExceeded { .. } => Some(ErrorKind::RestartLimitExceeded),
            Error::ConsoleCrashed { .. } => Some(ErrorKind::ConsoleCrashed),
            _ => None,
        }
    }

    /// Process-level faults abort all pending and queued work
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::StartupTimeout { .. } | Error::RestartLimitExceeded { .. }
        )
    }

    /// Whether the caller may retry the same request
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ConsoleCrashed { .. } | Error::RateLimited { .. } | Error::PtyInputSendFailed { .. }
        )
    }
}

impl Clone for Error {
    /// Fatal errors are fanned out to every queued caller, so the error needs
    /// to be reproducible. Non-cloneable sources collapse to `Other`.
    fn clone(&self) -> Self {
        match self {
            Error::StartupTimeout { timeout, captured } => Error::StartupTimeout {
                timeout: *timeout,
                captured: captured.clone(),
            },
            Error::RestartLimitExceeded { restarts, limit } => Error::RestartLimitExceeded {
                restarts: *restarts,
                limit: *limit,
            },
            Error::ConsoleCrashed {
                command,
                partial_output,
            } => Error::ConsoleCrashed {
                command: command.clone(),
                partial_output: partial_output.clone(),
            },
            Error::ConsoleNotStarted => Error::ConsoleNotStarted,
            Error::ConsoleUnavailable { reason } => Error::ConsoleUnavailable {
                reason: reason.clone(),
            },
            Error::EmptyCommand => Error::EmptyCommand,
            Error::InvalidCommand { command, reason } => Error::InvalidCommand {
                command: command.clone(),
                reason: reason.clone(),
            },
            Error::CommandRejected { command, reason } => Error::CommandRejected {
                command: command.clone(),
                reason: reason.clone(),
            },
            Error::RateLimited { max_calls, window } => Error::RateLimited {
                max_calls: *max_calls,
                window: *window,
            },
            other => Error::Other(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Other(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Other(err.to_string())
    }
}
