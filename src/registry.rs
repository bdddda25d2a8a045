//! Session/Job Registry
//!
//! Tracks sessions and background jobs the console reports out of band.
//! Updates are serialized by the registry's own lock, independent of which
//! command happens to be in flight when a banner shows up.
//!
//! Entities are never removed. Closing a session or finishing a job only
//! changes its state, so the full history stays inspectable for the
//! lifetime of the process.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::models::{Entity, EntityKind, EntityRef, Job, JobState, Session, SessionState};
use crate::terminal::ConsoleEvent;

/// Placeholder for fields a banner did not carry
const UNKNOWN: &str = "unknown";

type Key = (u64, u32);

#[derive(Debug, Default)]
struct RegistryInner {
    generation: u64,
    sessions: BTreeMap<Key, Session>,
    jobs: BTreeMap<Key, Job>,
}

/// Registry of asynchronous console entities
#[derive(Debug)]
pub struct Registry {
    inner: RwLock<RegistryInner>,
    liveness_window: Duration,
}

impl Registry {
    pub fn new(liveness_window: Duration) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            liveness_window,
        }
    }

    /// Apply one lifecycle event and return the entities it touched
    ///
    /// `origin` names what the console was doing when the event was seen;
    /// it becomes the module reference of newly started jobs.
    pub async fn observe(&self, event: &ConsoleEvent, origin: &str) -> Vec<EntityRef> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let generation = inner.generation;

        let affected = match event {
            ConsoleEvent::SessionOpened {
                id,
                transport_kind,
                local,
                peer,
            } => {
                let session = inner
                    .sessions
                    .entry((generation, *id))
                    .or_insert_with(|| Session {
                        id: *id,
                        generation,
                        transport_kind: transport_kind.clone(),
                        target_identity: peer.clone(),
                        local_endpoint: local.clone(),
                        opened_at: now,
                        last_activity: now,
                        state: SessionState::Active,
                        close_reason: None,
                    });
                session.transport_kind = transport_kind.clone();
                session.target_identity = peer.clone();
                session.local_endpoint = local.clone();
                session.last_activity = now;
                session.state = SessionState::Active;
                session.close_reason = None;
                info!(session_id = id, generation, peer = %peer, "Session opened");
                session.entity_ref()
            }
            ConsoleEvent::SessionClosed { id, reason } => {
                let session = inner
                    .sessions
                    .entry((generation, *id))
                    .or_insert_with(|| Session {
                        id: *id,
                        generation,
                        transport_kind: UNKNOWN.to_string(),
                        target_identity: UNKNOWN.to_string(),
                        local_endpoint: None,
                        opened_at: now,
                        last_activity: now,
                        state: SessionState::Active,
                        close_reason: None,
                    });
                session.state = SessionState::Closed;
                session.last_activity = now;
                session.close_reason = reason.clone();
                info!(session_id = id, generation, reason = ?reason, "Session closed");
                session.entity_ref()
            }
            ConsoleEvent::JobStarted { id } => {
                let job = Job {
                    id: *id,
                    generation,
                    module_reference: origin.to_string(),
                    started_at: now,
                    finished_at: None,
                    state: JobState::Running,
                };
                let entity = job.entity_ref();
                inner.jobs.insert((generation, *id), job);
                info!(job_id = id, generation, module = %origin, "Job started");
                entity
            }
            ConsoleEvent::JobCompleted { id } => {
                let job = finish_job(&mut inner, generation, *id, JobState::Completed, now);
                debug!(job_id = id, generation, "Job completed");
                job
            }
            ConsoleEvent::JobFailed { id, reason } => {
                let job = finish_job(&mut inner, generation, *id, JobState::Failed, now);
                warn!(job_id = id, generation, reason = ?reason, "Job failed");
                job
            }
        };

        vec![affected]
    }

    /// Record activity on an open session of the current console
    ///
    /// A stale session becomes active again. Closed sessions are left alone.
    pub async fn touch(&self, id: u32) -> Option<EntityRef> {
        let mut inner = self.inner.write().await;
        let generation = inner.generation;
        let session = inner.sessions.get_mut(&(generation, id))?;
        if !session.is_open() {
            return None;
        }
        session.last_activity = Utc::now();
        session.state = SessionState::Active;
        Some(session.entity_ref())
    }

    /// Close a session of the current console after an explicit close
    pub async fn close_session(&self, id: u32, reason: &str) -> Option<EntityRef> {
        let mut inner = self.inner.write().await;
        let generation = inner.generation;
        let session = inner.sessions.get_mut(&(generation, id))?;
        if session.state != SessionState::Closed {
            session.state = SessionState::Closed;
            session.close_reason = Some(reason.to_string());
            session.last_activity = Utc::now();
            info!(session_id = id, generation, reason, "Session closed by request");
        }
        Some(session.entity_ref())
    }

    /// All entities of one kind, ordered by generation then id
    pub async fn list(&self, kind: EntityKind) -> Vec<Entity> {
        let inner = self.inner.read().await;
        match kind {
            EntityKind::Session => inner.sessions.values().cloned().map(Entity::Session).collect(),
            EntityKind::Job => inner.jobs.values().cloned().map(Entity::Job).collect(),
        }
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.inner.read().await.sessions.values().cloned().collect()
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.inner.read().await.jobs.values().cloned().collect()
    }

    /// Look up a session of the current console
    pub async fn session(&self, id: u32) -> Option<Session> {
        let inner = self.inner.read().await;
        inner.sessions.get(&(inner.generation, id)).cloned()
    }

    /// Look up any entity by reference
    pub async fn get(&self, entity: EntityRef) -> Option<Entity> {
        let inner = self.inner.read().await;
        let key = (entity.generation, entity.id);
        match entity.kind {
            EntityKind::Session => inner.sessions.get(&key).cloned().map(Entity::Session),
            EntityKind::Job => inner.jobs.get(&key).cloned().map(Entity::Job),
        }
    }

    /// Mark sessions idle past the liveness window as stale
    pub async fn reap(&self) -> Vec<EntityRef> {
        self.reap_at(Utc::now()).await
    }

    pub async fn reap_at(&self, now: DateTime<Utc>) -> Vec<EntityRef> {
        let window = match chrono::Duration::from_std(self.liveness_window) {
            Ok(window) => window,
            Err(_) => return Vec::new(),
        };

        let mut inner = self.inner.write().await;
        let mut reaped = Vec::new();
        for session in inner.sessions.values_mut() {
            if session.state == SessionState::Active && now - session.last_activity > window {
                session.state = SessionState::Stale;
                reaped.push(session.entity_ref());
            }
        }

        if !reaped.is_empty() {
            debug!(count = reaped.len(), "Sessions marked stale");
        }
        reaped
    }

    /// Switch to a new console generation
    ///
    /// Everything still open from earlier consoles is gone with them:
    /// sessions are closed and running jobs are failed.
    pub async fn begin_generation(&self, generation: u64) -> Vec<EntityRef> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        inner.generation = generation;

        let mut affected = Vec::new();
        for session in inner.sessions.values_mut() {
            if session.generation < generation && session.is_open() {
                session.state = SessionState::Closed;
                session.close_reason = Some("console restarted".to_string());
                affected.push(session.entity_ref());
            }
        }
        for job in inner.jobs.values_mut() {
            if job.generation < generation && job.state == JobState::Running {
                job.state = JobState::Failed;
                job.finished_at = Some(now);
                affected.push(job.entity_ref());
            }
        }

        if !affected.is_empty() {
            warn!(
                generation,
                count = affected.len(),
                "Entities from a previous console invalidated"
            );
        }
        affected
    }

    pub async fn current_generation(&self) -> u64 {
        self.inner.read().await.generation
    }

    pub fn liveness_window(&self) -> Duration {
        self.liveness_window
    }
}

fn finish_job(
    inner: &mut RegistryInner,
    generation: u64,
    id: u32,
    state: JobState,
    now: DateTime<Utc>,
) -> EntityRef {
    let job = inner.jobs.entry((generation, id)).or_insert_with(|| Job {
        id,
        generation,
        module_reference: UNKNOWN.to_string(),
        started_at: now,
        finished_at: None,
        state: JobState::Running,
    });
    job.state = state;
    job.finished_at = Some(now);
    job.entity_ref()
}
