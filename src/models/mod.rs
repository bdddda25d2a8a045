//! Core data models for consolepilot
//!
//! This module contains the data structures shared by every layer of the
//! console automation core: the commands callers submit, the operation
//! results they get back, the asynchronous entities (sessions and jobs)
//! tracked by the registry, and the supervisor's view of the console process.

pub mod command;
pub mod console_state;
pub mod entity;
pub mod operation_result;
pub mod structured;

// Re-exports for convenience
pub use command::{Command, CommandCategory, SessionBinding};
pub use console_state::ConsoleState;
pub use entity::{Entity, EntityKind, EntityRef, Job, JobState, Session, SessionState};
pub use operation_result::{ErrorKind, OperationError, OperationResult, OperationStatus};
pub use structured::StructuredData;

/// Serialize `Duration` values as whole milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
