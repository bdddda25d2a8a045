//! PTY Process Spawning
//!
//! Launches the console inside a pseudoterminal using the portable-pty
//! crate and bridges its blocking master I/O onto channels.

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtyPair, PtySize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::mpsc::channel;
use std::thread;
use tokio::sync::mpsc::unbounded_channel;

use super::streams::PtyStreams;
use crate::config::ConsoleConfig;
use crate::error::{Error, Result};

/// A freshly spawned console and the handles that keep its PTY open
pub struct SpawnedConsole {
    pub child: Box<dyn Child + Send + Sync>,
    /// Dropping the master closes the PTY
    pub master: Box<dyn MasterPty + Send>,
    pub pid: Option<u32>,
    pub streams: PtyStreams,
}

/// Spawn the configured console in a new PTY
pub fn spawn_console(config: &ConsoleConfig) -> Result<SpawnedConsole> {
    let command = config.program.as_str();
    let (cols, rows) = config.dimensions;

    // Get the native PTY system
    let pty_system = native_pty_system();

    let pair = pty_system
        .openpty(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| Error::PtyCreationFailed {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

    let mut cmd_builder = CommandBuilder::new(command);
    cmd_builder.args(&config.args);

    cmd_builder.env_clear();
    for (key, value) in get_effective_environment(&config.environment, config.inherit_env) {
        cmd_builder.env(key, value);
    }

    if let Some(dir) = &config.working_directory {
        cmd_builder.cwd(dir);
    }

    let PtyPair { master, slave } = pair;
    let child = slave
        .spawn_command(cmd_builder)
        .map_err(|e| Error::CommandSpawnFailed {
            command: command.to_string(),
            reason: e.to_string(),
        })?;
    // Only the child holds the slave from here on, so its exit reaches the reader as EOF
    drop(slave);

    let pid = child.process_id();
    let streams = create_pty_streams(master.as_ref())?;

    info!(command = %command, pid = ?pid, "Console spawned");

    Ok(SpawnedConsole {
        child,
        master,
        pid,
        streams,
    })
}

/// Create PTY streams from the master side
fn create_pty_streams(master: &dyn MasterPty) -> Result<PtyStreams> {
    let mut master_reader = master
        .try_clone_reader()
        .map_err(|e| Error::PtyReaderCloneFailed {
            reason: e.to_string(),
        })?;
    let mut master_writer = master
        .take_writer()
        .map_err(|e| Error::PtyWriterTakeFailed {
            reason: e.to_string(),
        })?;

    // Channel: PTY output -> async consumer
    let (tx_async_out, rx_async_out) = unbounded_channel::<Vec<u8>>();
    // Channel: async producer -> PTY writer thread
    let (tx_stdin, rx_stdin) = channel::<Vec<u8>>();

    // Reader thread: read from PTY master and forward to async channel
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        let mut consecutive_errors = 0;
        const MAX_CONSECUTIVE_ERRORS: u32 = 5;

        loop {
            match master_reader.read(&mut buf) {
                Ok(0) => {
                    debug!("PTY read EOF - console terminated");
                    break;
                }
                Ok(n) => {
                    consecutive_errors = 0;
                    if tx_async_out.send(buf[..n].to_vec()).is_err() {
                        debug!("PTY read: receiver dropped, stopping reader thread");
                        break;
                    }
                }
                Err(e) => {
                    if e.kind() == std::io::ErrorKind::Interrupted {
                        continue;
                    }

                    if e.kind() == std::io::ErrorKind::WouldBlock {
                        std::thread::sleep(std::time::Duration::from_millis(10));
                        continue;
                    }

                    // Linux reports a closed slave as EIO rather than EOF
                    if is_slave_closed(&e) {
                        debug!("PTY slave closed - console terminated");
                        break;
                    }

                    consecutive_errors += 1;
                    warn!(
                        "PTY read error ({}): {} (attempt {}/{})",
                        e.kind(),
                        e,
                        consecutive_errors,
                        MAX_CONSECUTIVE_ERRORS
                    );

                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        error!("PTY read: too many consecutive errors, stopping reader thread");
                        break;
                    }

                    std::thread::sleep(std::time::Duration::from_millis(50));
                }
            }
        }
        debug!("PTY reader thread exiting");
    });

    // Writer thread: receive input and write it to the PTY master
    thread::spawn(move || {
        while let Ok(data) = rx_stdin.recv() {
            let mut attempts = 0;
            const MAX_ATTEMPTS: u32 = 3;

            loop {
                match master_writer.write_all(&data) {
                    Ok(()) => {
                        if let Err(e) = master_writer.flush() {
                            debug!("PTY flush error: {}", e);
                        }
                        break;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e)
                        if e.kind() == std::io::ErrorKind::WouldBlock && attempts < MAX_ATTEMPTS =>
                    {
                        attempts += 1;
                        std::thread::sleep(std::time::Duration::from_millis(10));
                    }
                    Err(e) => {
                        // The console is gone; the reader side reports it
                        warn!("PTY write error ({}): {}, stopping writer thread", e.kind(), e);
                        return;
                    }
                }
            }
        }
        debug!("PTY writer thread exiting");
    });

    Ok(PtyStreams::from_channels(rx_async_out, tx_stdin))
}

#[cfg(unix)]
fn is_slave_closed(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(nix::errno::Errno::EIO as i32)
}

#[cfg(not(unix))]
fn is_slave_closed(_e: &std::io::Error) -> bool {
    false
}

/// Get effective environment for the console
pub fn get_effective_environment(
    custom_env: &HashMap<String, String>,
    inherit: bool,
) -> HashMap<String, String> {
    let mut env = if inherit {
        std::env::vars().collect()
    } else {
        HashMap::new()
    };

    // Override with custom environment variables
    for (key, value) in custom_env {
        env.insert(key.clone(), value.clone());
    }

    env
}
