//! Console Transport
//!
//! The seam between the supervisor and the actual console process. The
//! real implementation drives a PTY; tests plug in scripted consoles.

use async_trait::async_trait;
use std::time::Duration;

use super::process::{spawn_console, SpawnedConsole};
use super::signals::{is_process_running, send_signal, Signal};
use crate::config::ConsoleConfig;
use crate::error::Result;

/// Byte-level connection to one running console process
#[async_trait]
pub trait ConsoleTransport: Send {
    /// OS process identifier, if there is one
    fn pid(&self) -> Option<u32>;

    /// Non-blocking liveness check
    fn is_alive(&mut self) -> bool;

    /// Write raw bytes to the console's input
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Next chunk of output; `None` means the console is gone
    async fn read(&mut self) -> Option<Vec<u8>>;

    /// Output that is already waiting, without blocking
    fn try_read(&mut self) -> Option<Vec<u8>>;

    /// Ask the process to exit, force-killing it after `grace`
    async fn terminate(&mut self, grace: Duration) -> Result<()>;
}

/// Starts new console processes
#[async_trait]
pub trait ConsoleLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn ConsoleTransport>>;
}

/// Console running in a pseudoterminal
pub struct PtyConsole {
    spawned: SpawnedConsole,
    exited: bool,
}

impl PtyConsole {
    pub fn new(spawned: SpawnedConsole) -> Self {
        Self {
            spawned,
            exited: false,
        }
    }
}

#[async_trait]
impl ConsoleTransport for PtyConsole {
    fn pid(&self) -> Option<u32> {
        self.spawned.pid
    }

    fn is_alive(&mut self) -> bool {
        if self.exited {
            return false;
        }
        match self.spawned.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(pid = ?self.spawned.pid, ?status, "Console exited");
                self.exited = true;
                false
            }
            Err(e) => {
                warn!("Failed to poll console status: {}", e);
                self.spawned.pid.map(is_process_running).unwrap_or(false)
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.spawned.streams.write(data)
    }

    async fn read(&mut self) -> Option<Vec<u8>> {
        self.spawned.streams.read().await
    }

    fn try_read(&mut self) -> Option<Vec<u8>> {
        self.spawned.streams.try_read_now()
    }

    async fn terminate(&mut self, grace: Duration) -> Result<()> {
        let stats = self.spawned.streams.stats();
        debug!(
            pid = ?self.spawned.pid,
            bytes_read = stats.bytes_read,
            bytes_written = stats.bytes_written,
            "Terminating console"
        );
        if !self.is_alive() {
            return Ok(());
        }

        if let Some(pid) = self.spawned.pid {
            if let Err(e) = send_signal(pid, Signal::Terminate) {
                debug!("SIGTERM to console failed: {}", e);
            }
            let deadline = tokio::time::Instant::now() + grace;
            while tokio::time::Instant::now() < deadline {
                if !self.is_alive() {
                    debug!(pid, "Console exited after SIGTERM");
                    return Ok(());
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }

        if self.is_alive() {
            warn!(pid = ?self.spawned.pid, "Console still running after grace period, killing");
            self.spawned.child.kill()?;
            // Reap the child so no zombie is left behind
            let _ = self.spawned.child.try_wait();
        }
        self.exited = true;
        Ok(())
    }
}

impl Drop for PtyConsole {
    fn drop(&mut self) {
        if !self.exited {
            if let Ok(None) = self.spawned.child.try_wait() {
                debug!(pid = ?self.spawned.pid, "Killing console on drop");
                let _ = self.spawned.child.kill();
            }
        }
    }
}

/// Launches the configured console program in a PTY
pub struct PtyLauncher {
    config: ConsoleConfig,
}

impl PtyLauncher {
    pub fn new(config: ConsoleConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConsoleLauncher for PtyLauncher {
    async fn launch(&self) -> Result<Box<dyn ConsoleTransport>> {
        let config = self.config.clone();
        // Forking can block; keep it off the async workers
        let spawned = tokio::task::spawn_blocking(move || spawn_console(&config))
            .await
            .map_err(|e| crate::error::Error::Other(format!("spawn task failed: {}", e)))??;
        Ok(Box::new(PtyConsole::new(spawned)))
    }
}
