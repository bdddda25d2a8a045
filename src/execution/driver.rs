//! Command/Response Driver
//!
//! Sends one command at a time to the console and decides when it is done.
//! Every chunk read from the console is fed through a single
//! [`OutputProcessor`]; lifecycle events go to the registry no matter which
//! command is current, everything else is captured for the result.
//!
//! A command completes when the prompt comes back. A command with custom
//! terminators also completes when one of them matches, after a short wait
//! for the prompt that normally follows so it does not end the next
//! command early.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};

use super::stats::{ConsoleStatus, ExecutionStats};
use super::timeout::AdaptiveTimeoutPolicy;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Command, EntityRef, OperationResult, OperationStatus, SessionBinding};
use crate::pty::{ConsoleLauncher, ProcessSupervisor};
use crate::registry::Registry;
use crate::terminal::{
    collect_errors, module_context, structure, Fragment, OutputProcessor, PromptDetector,
};

/// Origin recorded for events seen while no command was running
const IDLE_ORIGIN: &str = "console";

/// Output captured for the command in flight
#[derive(Debug)]
struct Capture {
    lines: Vec<String>,
    errors: Vec<String>,
    bytes: usize,
    limit: usize,
    truncated: bool,
    /// Command text expected as the first output line, if echoed
    echo: Option<String>,
}

impl Capture {
    fn new(command: &Command, limit: usize) -> Self {
        let text = command.text().trim();
        Self {
            lines: Vec::new(),
            errors: Vec::new(),
            bytes: 0,
            limit,
            truncated: false,
            echo: (!text.is_empty()).then(|| text.to_string()),
        }
    }

    /// Returns false when the line was the command's own echo
    fn push(&mut self, line: String, is_error: bool) -> bool {
        if !line.trim().is_empty() {
            if let Some(echo) = self.echo.take() {
                if !is_error && line.trim_end().ends_with(echo.as_str()) {
                    return false;
                }
            }
        }
        if self.bytes + line.len() > self.limit {
            self.truncated = true;
            return true;
        }
        self.bytes += line.len() + 1;
        if is_error {
            self.errors.push(line.clone());
        }
        self.lines.push(line);
        true
    }

    fn text(&self) -> String {
        self.lines.join("\n")
    }
}

enum Outcome {
    Completed,
    /// A terminator matched and no prompt followed within the settle window
    Settled,
    TimedOut,
    Crashed,
}

pub struct CommandDriver {
    supervisor: ProcessSupervisor,
    processor: OutputProcessor,
    policy: AdaptiveTimeoutPolicy,
    registry: Arc<Registry>,
    stats: ExecutionStats,
    status_tx: watch::Sender<ConsoleStatus>,
    max_output_bytes: usize,
    prompt_settle: Duration,
    /// The last command ended before its prompt came back
    resync_pending: bool,
}

impl CommandDriver {
    pub fn new(
        supervisor: ProcessSupervisor,
        policy: AdaptiveTimeoutPolicy,
        registry: Arc<Registry>,
        max_output_bytes: usize,
        prompt_settle: Duration,
    ) -> Self {
        let processor = OutputProcessor::new(supervisor.prompts().clone());
        let (status_tx, _) = watch::channel(ConsoleStatus::default());
        Self {
            supervisor,
            processor,
            policy,
            registry,
            stats: ExecutionStats::default(),
            status_tx,
            max_output_bytes,
            prompt_settle,
            resync_pending: false,
        }
    }

    /// Assemble a driver and its collaborators from configuration
    pub fn from_config(config: &Config, launcher: Arc<dyn ConsoleLauncher>) -> Result<Self> {
        config.validate()?;
        let prompts = PromptDetector::with_patterns(&config.console.prompt_patterns)?;
        let supervisor = ProcessSupervisor::new(launcher, prompts, config.supervisor.clone());
        let registry = Arc::new(Registry::new(config.registry.liveness_window()));
        Ok(Self::new(
            supervisor,
            AdaptiveTimeoutPolicy::new(config.timeouts.clone()),
            registry,
            config.output.max_output_bytes,
            config.output.prompt_settle(),
        ))
    }

    /// Start the console; returns its generation
    pub async fn start(&mut self) -> Result<u64> {
        let generation = self.supervisor.start().await?;
        self.processor.reset();
        self.registry.begin_generation(generation).await;
        self.publish_status();
        Ok(generation)
    }

    /// Drive one command to completion, timeout or crash
    ///
    /// Console-reported errors, timeouts and oversized output all come back
    /// as an [`OperationResult`]. `Err` is reserved for text that cannot be
    /// sent and for faults of the console process itself.
    pub async fn execute(&mut self, command: &Command) -> Result<OperationResult> {
        let wire = command.wire_bytes()?;
        self.ensure_running().await?;
        self.drain_idle_output().await;

        let origin = module_context(&self.supervisor.state().last_prompt_seen)
            .unwrap_or_else(|| command.text().to_string());
        let budget = command
            .timeout_budget()
            .unwrap_or_else(|| self.policy.budget_for(command.category()));

        debug!(
            command = %command.text(),
            category = %command.category(),
            budget_ms = budget.as_millis() as u64,
            "Dispatching command"
        );

        let started = Instant::now();
        let deadline = started + budget;
        let mut capture = Capture::new(command, self.max_output_bytes);
        let mut entities: Vec<EntityRef> = Vec::new();

        if let Err(e) = self.supervisor.send(&wire).await {
            warn!(command = %command.text(), "Failed to write command: {}", e);
            return self.handle_crash(command, &capture).await;
        }

        let has_terminators = !command.expected_terminators().is_empty();
        let mut settle_until: Option<Instant> = None;

        let outcome = loop {
            let wait_until = settle_until.map_or(deadline, |t| t.min(deadline));
            match timeout_at(wait_until, self.supervisor.next_chunk()).await {
                Ok(Some(bytes)) => {
                    let mut prompt_seen = false;
                    for fragment in self.processor.process_chunk(&bytes) {
                        match fragment {
                            Fragment::Event(event) => {
                                entities.extend(self.registry.observe(&event, &origin).await);
                            }
                            Fragment::Prompt(prompt) => {
                                self.supervisor.note_prompt(&prompt);
                                prompt_seen = true;
                            }
                            Fragment::Line(line) => {
                                let terminates = has_terminators
                                    && settle_until.is_none()
                                    && command.matches_terminator(&line);
                                if capture.push(line, false) && terminates {
                                    settle_until = Some(Instant::now() + self.prompt_settle);
                                }
                            }
                            Fragment::ErrorBanner(line) => {
                                let terminates = has_terminators
                                    && settle_until.is_none()
                                    && command.matches_terminator(&line);
                                if capture.push(line, true) && terminates {
                                    settle_until = Some(Instant::now() + self.prompt_settle);
                                }
                            }
                        }
                    }

                    if prompt_seen {
                        break Outcome::Completed;
                    }
                    if has_terminators
                        && settle_until.is_none()
                        && command.matches_terminator(self.processor.pending())
                    {
                        settle_until = Some(Instant::now() + self.prompt_settle);
                    }
                }
                Ok(None) => break Outcome::Crashed,
                Err(_) if settle_until.is_some() => break Outcome::Settled,
                Err(_) => break Outcome::TimedOut,
            }
        };

        let result = match outcome {
            Outcome::Crashed => return self.handle_crash(command, &capture).await,
            Outcome::TimedOut => {
                let elapsed = started.elapsed();
                let tail = self.processor.take_pending();
                let mut raw = capture.text();
                if !tail.is_empty() {
                    if !raw.is_empty() {
                        raw.push('\n');
                    }
                    raw.push_str(&tail);
                }
                warn!(
                    command = %command.text(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Command timed out"
                );
                self.policy.record_timeout(command.category());
                self.resync_pending = true;
                let result = OperationResult::timeout(raw, budget, elapsed);
                if capture.truncated {
                    result.with_truncation(self.max_output_bytes)
                } else {
                    result
                }
            }
            Outcome::Completed | Outcome::Settled => {
                if matches!(outcome, Outcome::Settled) {
                    // The prompt is still on its way
                    self.resync_pending = true;
                }
                let elapsed = started.elapsed();
                // Whatever is left belongs to the prompt line, not the output
                self.processor.take_pending();
                self.policy.record_completion(command.category(), elapsed);
                self.complete(command, &capture, elapsed)
            }
        };

        entities.extend(apply_session_binding(&self.registry, command, result.status()).await);
        dedup_in_order(&mut entities);

        self.stats.record(result.status(), result.elapsed());
        self.publish_status();

        debug!(
            command = %command.text(),
            status = ?result.status(),
            elapsed_ms = result.elapsed().as_millis() as u64,
            entities = entities.len(),
            "Command finished"
        );
        Ok(result.with_entities(entities))
    }

    fn complete(&self, command: &Command, capture: &Capture, elapsed: Duration) -> OperationResult {
        let raw = capture.text();
        let structured = structure(&raw);

        if capture.truncated {
            warn!(
                command = %command.text(),
                limit = self.max_output_bytes,
                "Output exceeded capture limit"
            );
            return OperationResult::partial(raw, structured, elapsed);
        }

        if capture.errors.is_empty() {
            OperationResult::success(raw, structured, elapsed)
        } else {
            let message = collect_errors(&capture.errors.join("\n")).join("; ");
            OperationResult::failure(raw, structured, message, elapsed)
        }
    }

    /// Restart after a crash and report the lost command
    async fn handle_crash(&mut self, command: &Command, capture: &Capture) -> Result<OperationResult> {
        let partial_output = capture.text();
        warn!(command = %command.text(), "Console died while executing command");
        self.stats.record_crash();
        self.recover().await?;
        Err(Error::ConsoleCrashed {
            command: command.text().to_string(),
            partial_output,
        })
    }

    /// Make sure a live console is attached before writing to it
    async fn ensure_running(&mut self) -> Result<()> {
        if self.supervisor.is_healthy() {
            return Ok(());
        }
        if !self.supervisor.state().has_started() {
            return Err(Error::ConsoleNotStarted);
        }
        warn!("Console found dead between commands");
        self.recover().await.map(|_| ())
    }

    async fn recover(&mut self) -> Result<u64> {
        let result = self.supervisor.restart().await;
        self.processor.reset();
        self.resync_pending = false;
        let generation = match result {
            Ok(generation) => generation,
            Err(e) => {
                self.publish_status();
                return Err(e);
            }
        };
        self.registry.begin_generation(generation).await;
        self.publish_status();
        Ok(generation)
    }

    /// Consume output that arrived between commands
    async fn drain_idle_output(&mut self) {
        let settle_deadline = Instant::now() + self.prompt_settle;

        loop {
            let chunk = match self.supervisor.try_next_chunk() {
                Some(chunk) => chunk,
                None if self.resync_pending => {
                    match timeout_at(settle_deadline, self.supervisor.next_chunk()).await {
                        Ok(Some(chunk)) => chunk,
                        _ => break,
                    }
                }
                None => break,
            };

            for fragment in self.processor.process_chunk(&chunk) {
                match fragment {
                    Fragment::Event(event) => {
                        self.registry.observe(&event, IDLE_ORIGIN).await;
                    }
                    Fragment::Prompt(prompt) => {
                        self.supervisor.note_prompt(&prompt);
                        self.resync_pending = false;
                    }
                    Fragment::Line(line) | Fragment::ErrorBanner(line) => {
                        debug!(line = %line, "Discarding idle console output");
                    }
                }
            }
        }

        if self.resync_pending {
            debug!("No prompt after an unfinished command, continuing anyway");
            self.resync_pending = false;
        }
        self.processor.take_pending();
    }

    /// Quit the console
    pub async fn shutdown(&mut self) -> Result<()> {
        let result = self.supervisor.shutdown().await;
        self.publish_status();
        result
    }

    pub fn is_healthy(&mut self) -> bool {
        self.supervisor.is_healthy()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Receiver that sees every published status snapshot
    pub fn status(&self) -> watch::Receiver<ConsoleStatus> {
        self.status_tx.subscribe()
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn policy(&self) -> &AdaptiveTimeoutPolicy {
        &self.policy
    }

    pub fn console_state(&self) -> &crate::models::ConsoleState {
        self.supervisor.state()
    }

    fn publish_status(&self) {
        let status = ConsoleStatus::snapshot(self.supervisor.state(), &self.stats);
        self.status_tx.send_replace(status);
    }
}

/// Apply the session bookkeeping a command implies once its status is known
async fn apply_session_binding(
    registry: &Registry,
    command: &Command,
    status: OperationStatus,
) -> Option<EntityRef> {
    match (command.session()?, status) {
        (SessionBinding::Touch(id), OperationStatus::Success | OperationStatus::Partial) => {
            registry.touch(id).await
        }
        (SessionBinding::Close(id), OperationStatus::Success) => {
            registry.close_session(id, "closed by request").await
        }
        _ => None,
    }
}

fn dedup_in_order(entities: &mut Vec<EntityRef>) {
    let mut seen = std::collections::HashSet::new();
    entities.retain(|e| seen.insert(*e));
}
