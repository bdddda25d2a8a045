//! Asynchronous console entities
//!
//! Sessions and jobs are created by banners the console prints out of band.
//! Console ids are only unique within one console process, so every entity
//! is keyed by the console generation it was observed in as well.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Session,
    Job,
}

/// Reference to a registry entity; never carries the entity itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub generation: u64,
    pub id: u32,
}

impl EntityRef {
    pub fn new(kind: EntityKind, generation: u64, id: u32) -> Self {
        Self {
            kind,
            generation,
            id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Stale,
    Closed,
}

/// An interactive session opened on a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: u32,
    pub generation: u64,
    /// e.g. `meterpreter`, `shell`
    pub transport_kind: String,
    /// Remote end of the session as reported by the console
    pub target_identity: String,
    pub local_endpoint: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub state: SessionState,
    pub close_reason: Option<String>,
}

impl Session {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityKind::Session, self.generation, self.id)
    }

    pub fn is_open(&self) -> bool {
        self.state != SessionState::Closed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Failed,
}

/// A background job started by a module run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: u32,
    pub generation: u64,
    pub module_reference: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: JobState,
}

impl Job {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityKind::Job, self.generation, self.id)
    }
}

/// Either kind of registry entity, for enumeration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Session(Session),
    Job(Job),
}

impl Entity {
    pub fn entity_ref(&self) -> EntityRef {
        match self {
            Entity::Session(s) => s.entity_ref(),
            Entity::Job(j) => j.entity_ref(),
        }
    }
}
