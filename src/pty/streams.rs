//! PTY Streams
//!
//! Provides async-friendly interfaces for PTY I/O by bridging blocking
//! PTY master reads/writes to async code using channels.

use crate::error::{Error, Result};
use std::sync::mpsc::Sender as StdSender;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;

/// PTY I/O streams wrapper
pub struct PtyStreams {
    /// Receiver for output bytes from the PTY
    output_rx: UnboundedReceiver<Vec<u8>>,
    /// Sender for input bytes to the PTY
    input_tx: StdSender<Vec<u8>>,
    stats: StreamStats,
}

impl PtyStreams {
    /// Create new PTY streams from channels
    pub fn from_channels(
        output_rx: UnboundedReceiver<Vec<u8>>,
        input_tx: StdSender<Vec<u8>>,
    ) -> Self {
        Self {
            output_rx,
            input_tx,
            stats: StreamStats::default(),
        }
    }

    /// Write data to the PTY stdin
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.input_tx
            .send(data.to_vec())
            .map_err(|e| Error::PtyInputSendFailed {
                reason: e.to_string(),
            })?;
        self.stats.bytes_written += data.len() as u64;
        self.stats.write_operations += 1;
        Ok(())
    }

    /// Wait for the next output chunk; `None` once the reader thread has
    /// stopped, i.e. the console closed its side of the PTY
    pub async fn read(&mut self) -> Option<Vec<u8>> {
        let bytes = self.output_rx.recv().await?;
        self.stats.bytes_read += bytes.len() as u64;
        self.stats.read_operations += 1;
        Some(bytes)
    }

    /// Take a chunk that is already waiting, if any
    pub fn try_read_now(&mut self) -> Option<Vec<u8>> {
        match self.output_rx.try_recv() {
            Ok(bytes) => {
                self.stats.bytes_read += bytes.len() as u64;
                self.stats.read_operations += 1;
                Some(bytes)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }
}

/// Stream statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Total bytes read
    pub bytes_read: u64,
    /// Total bytes written
    pub bytes_written: u64,
    /// Number of read operations
    pub read_operations: u64,
    /// Number of write operations
    pub write_operations: u64,
}

impl StreamStats {
    /// Get read throughput (bytes per operation)
    pub fn read_throughput(&self) -> f64 {
        if self.read_operations == 0 {
            0.0
        } else {
            self.bytes_read as f64 / self.read_operations as f64
        }
    }
}
