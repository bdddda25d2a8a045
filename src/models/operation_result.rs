//! Operation Result Model
//!
//! The envelope returned for every driven command. Results are only built
//! through the status-specific constructors so that a `Success` never
//! carries an error and a `Timeout` always keeps the output captured before
//! the deadline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::entity::EntityRef;
use super::structured::StructuredData;

/// Final status of a driven command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    /// Terminator seen, no error banner
    Success,
    /// Terminator seen, the console reported an error
    Failure,
    /// No terminator within the budget
    Timeout,
    /// Terminator seen, but output exceeded the capture limit
    Partial,
}

/// Console fault taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    StartupTimeout,
    RestartLimitExceeded,
    ConsoleCrashed,
    Timeout,
    CommandFailure,
    ParseAmbiguous,
}

/// Error attached to a non-successful result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    pub kind: ErrorKind,
    pub message: String,
    pub recoverable: bool,
}

/// Result of one command against the console
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    status: OperationStatus,
    raw_output: String,
    structured_data: Option<StructuredData>,
    error: Option<OperationError>,
    #[serde(rename = "elapsed_ms", with = "super::duration_ms")]
    elapsed: Duration,
    correlated_entities: Vec<EntityRef>,
}

impl OperationResult {
    /// Terminator seen and no error banner in the output
    pub fn success(
        raw_output: String,
        structured_data: Option<StructuredData>,
        elapsed: Duration,
    ) -> Self {
        Self {
            status: OperationStatus::Success,
            raw_output,
            structured_data,
            error: None,
            elapsed,
            correlated_entities: Vec::new(),
        }
    }

    /// The console answered with an error banner
    pub fn failure(
        raw_output: String,
        structured_data: Option<StructuredData>,
        message: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            status: OperationStatus::Failure,
            raw_output,
            structured_data,
            error: Some(OperationError {
                kind: ErrorKind::CommandFailure,
                message: message.into(),
                recoverable: false,
            }),
            elapsed,
            correlated_entities: Vec::new(),
        }
    }

    /// Budget elapsed; `raw_output` is everything read before the deadline
    pub fn timeout(raw_output: String, budget: Duration, elapsed: Duration) -> Self {
        Self {
            status: OperationStatus::Timeout,
            raw_output,
            structured_data: None,
            error: Some(OperationError {
                kind: ErrorKind::Timeout,
                message: format!("no completion marker within {:.1}s", budget.as_secs_f64()),
                recoverable: true,
            }),
            elapsed,
            correlated_entities: Vec::new(),
        }
    }

    /// Terminator seen but the capture limit cut the output short
    pub fn partial(
        raw_output: String,
        structured_data: Option<StructuredData>,
        elapsed: Duration,
    ) -> Self {
        Self {
            status: OperationStatus::Partial,
            raw_output,
            structured_data,
            error: None,
            elapsed,
            correlated_entities: Vec::new(),
        }
    }

    /// Note in the error that output past `limit` bytes was dropped
    pub fn with_truncation(mut self, limit: usize) -> Self {
        if let Some(error) = self.error.as_mut() {
            error
                .message
                .push_str(&format!(" (output truncated at {} bytes)", limit));
        }
        self
    }

    /// Attach the entities observed while the command was running
    pub fn with_entities(mut self, entities: Vec<EntityRef>) -> Self {
        self.correlated_entities = entities;
        self
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }

    pub fn raw_output(&self) -> &str {
        &self.raw_output
    }

    pub fn structured_data(&self) -> Option<&StructuredData> {
        self.structured_data.as_ref()
    }

    pub fn error(&self) -> Option<&OperationError> {
        self.error.as_ref()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn correlated_entities(&self) -> &[EntityRef] {
        &self.correlated_entities
    }
}
