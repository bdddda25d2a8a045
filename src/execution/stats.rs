//! Execution statistics and console status snapshots

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::{ConsoleState, OperationStatus};

/// Counters over every command the driver has executed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub operations: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub partials: u64,
    pub crashes: u64,
    /// Elapsed time summed over successful operations
    #[serde(with = "crate::models::duration_ms", rename = "total_elapsed_ms")]
    pub total_elapsed: Duration,
}

impl ExecutionStats {
    pub fn record(&mut self, status: OperationStatus, elapsed: Duration) {
        self.operations += 1;
        match status {
            OperationStatus::Success => {
                self.successes += 1;
                self.total_elapsed += elapsed;
            }
            OperationStatus::Failure => self.failures += 1,
            OperationStatus::Timeout => self.timeouts += 1,
            OperationStatus::Partial => self.partials += 1,
        }
    }

    /// A command that was lost to a console crash
    pub fn record_crash(&mut self) {
        self.operations += 1;
        self.crashes += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.operations == 0 {
            0.0
        } else {
            self.successes as f64 / self.operations as f64
        }
    }

    /// Mean elapsed time of successful operations
    pub fn average_elapsed(&self) -> Duration {
        if self.successes == 0 {
            Duration::ZERO
        } else {
            self.total_elapsed / self.successes as u32
        }
    }

    /// 1-10 rating of how reliably commands have been going through
    pub fn stability_rating(&self, console_alive: bool) -> u8 {
        if self.operations == 0 {
            return if console_alive { 10 } else { 5 };
        }

        let rate = self.success_rate();
        match rate {
            r if r >= 0.95 => 10,
            r if r >= 0.90 => 9,
            r if r >= 0.80 => 8,
            r if r >= 0.70 => 7,
            r if r >= 0.60 => 6,
            r if r >= 0.50 => 5,
            r => ((r * 10.0) as u8).max(1),
        }
    }
}

/// Point-in-time view of the console and its statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsoleStatus {
    pub console: ConsoleState,
    pub stats: ExecutionStats,
    pub success_rate: f64,
    #[serde(with = "crate::models::duration_ms", rename = "average_elapsed_ms")]
    pub average_elapsed: Duration,
    pub stability_rating: u8,
}

impl ConsoleStatus {
    pub fn snapshot(console: &ConsoleState, stats: &ExecutionStats) -> Self {
        Self {
            console: console.clone(),
            stats: stats.clone(),
            success_rate: stats.success_rate(),
            average_elapsed: stats.average_elapsed(),
            stability_rating: stats.stability_rating(console.is_alive),
        }
    }
}
