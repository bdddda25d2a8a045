//! Structured values extracted from console output

use serde::{Deserialize, Serialize};

/// Best-effort structured view of a command's output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructuredData {
    /// Column-aligned table with a dash underline under the header row
    Table {
        title: Option<String>,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    /// `Key: value` block, in output order
    KeyValue { entries: Vec<(String, String)> },
    /// Plain list; `current` is the entry marked with `*`
    List {
        items: Vec<String>,
        current: Option<String>,
    },
    /// Single `<n> <subject>` line
    Count { count: u64, subject: String },
}

impl StructuredData {
    /// Rows of a table as header/value pairs
    pub fn table_records(&self) -> Vec<Vec<(&str, &str)>> {
        match self {
            StructuredData::Table { headers, rows, .. } => rows
                .iter()
                .map(|row| {
                    headers
                        .iter()
                        .zip(row.iter())
                        .map(|(h, v)| (h.as_str(), v.as_str()))
                        .collect()
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Look up a key in a key/value block
    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            StructuredData::KeyValue { entries } => entries
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn count(&self) -> Option<u64> {
        match self {
            StructuredData::Count { count, .. } => Some(*count),
            _ => None,
        }
    }
}
