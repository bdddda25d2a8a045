//! Request Serializer
//!
//! Single entry point for every caller. Requests are queued and handed one
//! at a time to a worker task that owns the [`CommandDriver`], so no two
//! commands ever share the wire. Administrative commands wait in their own
//! lane, which the worker drains first; order inside each lane is FIFO.
//!
//! A caller that stops waiting for a queued request withdraws it: the
//! worker skips requests whose caller is gone. A request already on the
//! wire runs to completion and its result is dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::execution::{CommandDriver, ConsoleStatus};
use crate::models::{Command, OperationResult};
use crate::pty::ConsoleLauncher;
use crate::registry::Registry;

struct Request {
    id: Uuid,
    command: Command,
    reply: oneshot::Sender<Result<OperationResult>>,
}

#[derive(Default)]
struct QueueState {
    priority: VecDeque<Request>,
    normal: VecDeque<Request>,
    /// Set once a fatal console error stopped the worker
    failed: Option<Error>,
    shutting_down: bool,
}

/// Two-lane FIFO with a single consumer
#[derive(Default)]
struct AdmissionQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl AdmissionQueue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, request: Request) -> Result<()> {
        let mut state = self.lock();
        if let Some(error) = &state.failed {
            return Err(error.clone());
        }
        if state.shutting_down {
            return Err(Error::ConsoleUnavailable {
                reason: "shutting down".to_string(),
            });
        }
        if request.command.category().is_priority() {
            state.priority.push_back(request);
        } else {
            state.normal.push_back(request);
        }
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    /// Next request to admit; `None` once shut down and empty
    async fn pop(&self) -> Option<Request> {
        loop {
            {
                let mut state = self.lock();
                if let Some(request) = state.priority.pop_front() {
                    return Some(request);
                }
                if let Some(request) = state.normal.pop_front() {
                    return Some(request);
                }
                if state.shutting_down {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_one();
    }

    /// Refuse all further work and hand back what is still queued
    fn fail(&self, error: &Error) -> Vec<Request> {
        let mut state = self.lock();
        state.failed = Some(error.clone());
        state.shutting_down = true;
        let mut drained: Vec<Request> = state.priority.drain(..).collect();
        drained.extend(state.normal.drain(..));
        drained
    }

    fn depth(&self) -> usize {
        let state = self.lock();
        state.priority.len() + state.normal.len()
    }
}

/// Serialized access to one console
pub struct RequestSerializer {
    queue: Arc<AdmissionQueue>,
    registry: Arc<Registry>,
    status: watch::Receiver<ConsoleStatus>,
    worker: tokio::sync::Mutex<Option<JoinHandle<Result<()>>>>,
    reaper: JoinHandle<()>,
}

impl RequestSerializer {
    /// Start the console and begin admitting requests
    ///
    /// A console that never reaches its prompt fails here with
    /// `StartupTimeout`.
    pub async fn start(mut driver: CommandDriver, reap_interval: Duration) -> Result<Self> {
        driver.start().await?;

        let queue = Arc::new(AdmissionQueue::default());
        let registry = driver.registry();
        let status = driver.status();

        let worker = tokio::spawn(run_worker(driver, Arc::clone(&queue)));
        let reaper = tokio::spawn(run_reaper(Arc::clone(&registry), reap_interval));

        info!("Request serializer started");
        Ok(Self {
            queue,
            registry,
            status,
            worker: tokio::sync::Mutex::new(Some(worker)),
            reaper,
        })
    }

    /// Build the whole stack from configuration and start it
    pub async fn from_config(config: &Config, launcher: Arc<dyn ConsoleLauncher>) -> Result<Self> {
        let driver = CommandDriver::from_config(config, launcher)?;
        Self::start(driver, config.registry.reap_interval()).await
    }

    /// Queue a command and wait for its result
    pub async fn submit(&self, command: Command) -> Result<OperationResult> {
        let (reply, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        debug!(request = %id, command = %command.text(), "Request queued");
        self.queue.push(Request { id, command, reply })?;
        rx.await.map_err(|_| Error::ConsoleUnavailable {
            reason: "request dropped by worker".to_string(),
        })?
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Latest console status snapshot
    pub fn status(&self) -> ConsoleStatus {
        self.status.borrow().clone()
    }

    /// Receiver for status updates
    pub fn subscribe(&self) -> watch::Receiver<ConsoleStatus> {
        self.status.clone()
    }

    /// Requests waiting for admission
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// Stop admitting, finish queued work and quit the console
    pub async fn shutdown(&self) -> Result<()> {
        self.queue.shut_down();
        self.reaper.abort();

        let Some(worker) = self.worker.lock().await.take() else {
            return Ok(());
        };
        match worker.await {
            Ok(result) => result,
            Err(e) => Err(Error::Other(format!("serializer worker failed: {}", e))),
        }
    }
}

impl Drop for RequestSerializer {
    fn drop(&mut self) {
        // Lets the worker finish and quit the console on its own
        self.queue.shut_down();
        self.reaper.abort();
    }
}

async fn run_worker(mut driver: CommandDriver, queue: Arc<AdmissionQueue>) -> Result<()> {
    while let Some(request) = queue.pop().await {
        if request.reply.is_closed() {
            debug!(request = %request.id, "Skipping withdrawn request");
            continue;
        }
        debug!(request = %request.id, "Request admitted");

        let result = execute_with_retries(&mut driver, &request.command).await;

        if let Err(error) = &result {
            if error.is_fatal() {
                error!("Console unusable, failing queued requests: {}", error);
                let queued = queue.fail(error);
                for pending in queued {
                    let _ = pending.reply.send(Err(error.clone()));
                }
                let _ = request.reply.send(result);
                return driver.shutdown().await;
            }
        }

        if request.reply.send(result).is_err() {
            debug!(request = %request.id, "Caller abandoned request before completion");
        }
    }

    info!("Request serializer stopping");
    driver.shutdown().await
}

/// Run a command, retrying against a restarted console
async fn execute_with_retries(
    driver: &mut CommandDriver,
    command: &Command,
) -> Result<OperationResult> {
    let mut attempt = 0;
    loop {
        match driver.execute(command).await {
            Err(Error::ConsoleCrashed { .. }) if attempt < command.retries_allowed() => {
                attempt += 1;
                warn!(
                    command = %command.text(),
                    attempt,
                    "Retrying command on restarted console"
                );
            }
            result => return result,
        }
    }
}

async fn run_reaper(registry: Arc<Registry>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        registry.reap().await;
    }
}
