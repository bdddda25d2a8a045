//! Asynchronous Lifecycle Banners
//!
//! The console announces sessions and background jobs with free-text
//! banners that can show up in the middle of any other command's output.
//! Every complete line is scanned for them unconditionally.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A lifecycle event extracted from console output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConsoleEvent {
    SessionOpened {
        id: u32,
        transport_kind: String,
        local: Option<String>,
        peer: String,
    },
    SessionClosed {
        id: u32,
        reason: Option<String>,
    },
    JobStarted {
        id: u32,
    },
    JobCompleted {
        id: u32,
    },
    JobFailed {
        id: u32,
        reason: Option<String>,
    },
}

static SESSION_OPENED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(meterpreter|command shell|shell|powershell|vnc|ssh|sql)\s+session\s+(\d+)\s+opened\s+\(([^)]*?)\)",
    )
    .expect("valid session opened regex")
});

static SESSION_CLOSED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)session\s+(\d+)\s+closed\.?(?:\s+Reason:\s*(.+?))?\s*$")
        .expect("valid session closed regex")
});

static JOB_STARTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)running as background job\s+(\d+)").expect("valid job started regex")
});

static JOB_COMPLETED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bjob\s+(\d+)\s+(?:completed|finished)").expect("valid job completed regex")
});

static JOB_STOPPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)stopping the following job\(s\):\s*([\d,\s]+)$")
        .expect("valid job stopped regex")
});

static JOB_FAILED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bjob\s+(\d+)\s+failed(?::\s*(.+?))?\s*$").expect("valid job failed regex")
});

/// Scan a complete line for lifecycle banners
pub fn scan_line(line: &str) -> Vec<ConsoleEvent> {
    if let Some(caps) = SESSION_OPENED.captures(line) {
        if let Ok(id) = caps[2].parse() {
            let (local, peer) = split_endpoints(&caps[3]);
            return vec![ConsoleEvent::SessionOpened {
                id,
                transport_kind: normalize_transport(&caps[1]),
                local,
                peer,
            }];
        }
    }

    if let Some(caps) = SESSION_CLOSED.captures(line) {
        if let Ok(id) = caps[1].parse() {
            return vec![ConsoleEvent::SessionClosed {
                id,
                reason: caps.get(2).map(|m| m.as_str().to_string()),
            }];
        }
    }

    if let Some(caps) = JOB_STARTED.captures(line) {
        if let Ok(id) = caps[1].parse() {
            return vec![ConsoleEvent::JobStarted { id }];
        }
    }

    if let Some(caps) = JOB_FAILED.captures(line) {
        if let Ok(id) = caps[1].parse() {
            return vec![ConsoleEvent::JobFailed {
                id,
                reason: caps.get(2).map(|m| m.as_str().to_string()),
            }];
        }
    }

    if let Some(caps) = JOB_COMPLETED.captures(line) {
        if let Ok(id) = caps[1].parse() {
            return vec![ConsoleEvent::JobCompleted { id }];
        }
    }

    if let Some(caps) = JOB_STOPPED.captures(line) {
        return caps[1]
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter_map(|id| id.parse().ok())
            .map(|id| ConsoleEvent::JobCompleted { id })
            .collect();
    }

    Vec::new()
}

fn normalize_transport(kind: &str) -> String {
    match kind.to_ascii_lowercase().as_str() {
        "command shell" => "shell".to_string(),
        other => other.to_string(),
    }
}

/// `10.0.0.1:4444 -> 10.0.0.2:49152` into local and peer endpoints
fn split_endpoints(endpoints: &str) -> (Option<String>, String) {
    match endpoints.split_once("->") {
        Some((local, peer)) => (Some(local.trim().to_string()), peer.trim().to_string()),
        None => (None, endpoints.trim().to_string()),
    }
}
