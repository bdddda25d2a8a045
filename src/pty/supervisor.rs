//! Process Supervisor
//!
//! Owns the console process: launching it and waiting for the first prompt,
//! liveness checks, bounded restarts and orderly shutdown. The transport is
//! held in an `Option` and taken out on teardown, so it is dropped (and the
//! process killed) on every exit path.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use super::transport::{ConsoleLauncher, ConsoleTransport};
use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::models::ConsoleState;
use crate::terminal::{Fragment, OutputProcessor, PromptDetector};

/// Longest startup transcript kept for error reporting
const MAX_CAPTURED_STARTUP: usize = 64 * 1024;

pub struct ProcessSupervisor {
    launcher: Arc<dyn ConsoleLauncher>,
    transport: Option<Box<dyn ConsoleTransport>>,
    prompts: PromptDetector,
    config: SupervisorConfig,
    state: ConsoleState,
}

impl ProcessSupervisor {
    pub fn new(
        launcher: Arc<dyn ConsoleLauncher>,
        prompts: PromptDetector,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            launcher,
            transport: None,
            prompts,
            config,
            state: ConsoleState::new(),
        }
    }

    /// Launch the console and wait for its first prompt
    ///
    /// Returns the new console generation.
    pub async fn start(&mut self) -> Result<u64> {
        let startup_timeout = self.config.startup_timeout();
        info!(timeout_secs = startup_timeout.as_secs(), "Starting console");

        let mut transport = self.launcher.launch().await?;
        let deadline = Instant::now() + startup_timeout;
        let mut processor = OutputProcessor::new(self.prompts.clone());
        let mut captured = String::new();

        let prompt = loop {
            match timeout_at(deadline, transport.read()).await {
                Ok(Some(bytes)) => {
                    let mut found = None;
                    for fragment in processor.process_chunk(&bytes) {
                        match fragment {
                            Fragment::Prompt(p) => found = Some(p),
                            Fragment::Line(l) | Fragment::ErrorBanner(l) => {
                                if captured.len() < MAX_CAPTURED_STARTUP {
                                    captured.push_str(&l);
                                    captured.push('\n');
                                }
                            }
                            Fragment::Event(_) => {}
                        }
                    }
                    if let Some(p) = found {
                        break p;
                    }
                }
                Ok(None) => {
                    error!("Console exited before showing a prompt");
                    return Err(Error::StartupTimeout {
                        timeout: startup_timeout,
                        captured,
                    });
                }
                Err(_) => {
                    error!(
                        timeout_secs = startup_timeout.as_secs(),
                        "Console did not show a prompt in time"
                    );
                    if let Err(e) = transport.terminate(Duration::ZERO).await {
                        warn!("Failed to kill unresponsive console: {}", e);
                    }
                    captured.push_str(processor.pending());
                    return Err(Error::StartupTimeout {
                        timeout: startup_timeout,
                        captured,
                    });
                }
            }
        };

        let generation = self.state.mark_started(transport.pid(), &prompt);
        self.transport = Some(transport);
        info!(pid = ?self.state.pid, generation, "Console ready");
        Ok(generation)
    }

    /// Liveness without blocking
    pub fn is_healthy(&mut self) -> bool {
        let alive = match self.transport.as_mut() {
            Some(transport) => transport.is_alive(),
            None => false,
        };
        if !alive && self.state.is_alive {
            self.state.mark_terminated();
        }
        alive
    }

    /// Replace the console with a fresh one
    ///
    /// Fails with `RestartLimitExceeded` once the configured number of
    /// restarts has been used up.
    pub async fn restart(&mut self) -> Result<u64> {
        if self.state.restart_count >= self.config.max_restarts {
            error!(
                restart_count = self.state.restart_count,
                limit = self.config.max_restarts,
                "Console restart limit exceeded"
            );
            return Err(Error::RestartLimitExceeded {
                restarts: self.state.restart_count,
                limit: self.config.max_restarts,
            });
        }

        self.state.restart_count += 1;
        warn!(restart_count = self.state.restart_count, "Restarting console");

        if let Some(mut old) = self.transport.take() {
            if let Err(e) = old.terminate(Duration::ZERO).await {
                warn!("Failed to kill previous console: {}", e);
            }
        }
        self.state.mark_terminated();

        self.start().await
    }

    /// Quit the console gracefully, force-killing it after the grace period
    pub async fn shutdown(&mut self) -> Result<()> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };
        let grace = self.config.shutdown_grace();
        info!(pid = ?transport.pid(), "Shutting down console");

        let mut quit = self.config.quit_command.clone().into_bytes();
        quit.push(b'\n');
        if let Err(e) = transport.write(&quit).await {
            debug!("Failed to send quit command: {}", e);
        }

        // Drain output until the console closes its end
        let deadline = Instant::now() + grace;
        while let Ok(Some(_)) = timeout_at(deadline, transport.read()).await {}

        let result = transport.terminate(Duration::ZERO).await;
        self.state.mark_terminated();
        result
    }

    /// Write raw bytes to the running console
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self.transport.as_mut() {
            Some(transport) => transport.write(data).await,
            None => Err(Error::ConsoleNotStarted),
        }
    }

    /// Next output chunk; `None` when the console is gone
    pub async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        let chunk = match self.transport.as_mut() {
            Some(transport) => transport.read().await,
            None => None,
        };
        if chunk.is_none() && self.state.is_alive {
            self.state.mark_terminated();
        }
        chunk
    }

    /// Output already waiting, without blocking
    pub fn try_next_chunk(&mut self) -> Option<Vec<u8>> {
        self.transport.as_mut().and_then(|t| t.try_read())
    }

    pub fn note_prompt(&mut self, prompt: &str) {
        self.state.last_prompt_seen = prompt.to_string();
    }

    pub fn state(&self) -> &ConsoleState {
        &self.state
    }

    pub fn prompts(&self) -> &PromptDetector {
        &self.prompts
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if self.transport.is_some() {
            debug!("Supervisor dropped with a live console");
        }
    }
}
