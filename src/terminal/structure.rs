//! Best-effort structuring of command output
//!
//! Nothing here ever fails: output that does not fit one of the known
//! shapes yields `None` and callers fall back to the raw text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::StructuredData;

static DASH_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*-+(?:\s+-+)*\s*$").expect("valid dash row regex"));
static TITLE_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*=+\s*$").expect("valid title rule regex"));
static KEY_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z][\w .\-/]*?)\s*:\s+(\S.*?)\s*$").expect("valid key/value regex")
});
static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\*|\s)\s*(\S+)\s*$").expect("valid list item regex"));
static COUNT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s+([A-Za-z].*?)\s*$").expect("valid count regex"));
static ERROR_BANNER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:\[-\]|Error:|\[!\] Error|Unknown command:)").expect("valid error banner regex")
});

/// Whether a line is an error banner printed by the console
pub fn is_error_banner(line: &str) -> bool {
    ERROR_BANNER.is_match(line)
}

/// All error banners in `text`, without the banner marker
pub fn collect_errors(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| is_error_banner(line))
        .map(|line| {
            line.trim()
                .trim_start_matches("[-]")
                .trim_start_matches("Error:")
                .trim()
                .to_string()
        })
        .collect()
}

/// Status lines (`[*]`, `[+]`, `[!]`) carry no structure of their own
fn is_status_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("[*]") || trimmed.starts_with("[+]") || trimmed.starts_with("[!]")
}

/// Parse the first recognisable structure in `text`
pub fn structure(text: &str) -> Option<StructuredData> {
    let lines: Vec<&str> = text.lines().collect();

    if let Some(table) = parse_table(&lines) {
        return Some(table);
    }

    let meaningful: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|l| !l.trim().is_empty() && !is_status_line(l) && !is_error_banner(l))
        .collect();
    if meaningful.is_empty() {
        return None;
    }

    if let [line] = meaningful.as_slice() {
        if let Some(caps) = COUNT_LINE.captures(line) {
            if let Ok(count) = caps[1].parse() {
                return Some(StructuredData::Count {
                    count,
                    subject: caps[2].to_string(),
                });
            }
        }
    }

    parse_key_value(&meaningful).or_else(|| parse_list(&meaningful))
}

fn parse_table(lines: &[&str]) -> Option<StructuredData> {
    let dash_idx = (1..lines.len()).find(|&i| {
        DASH_ROW.is_match(lines[i]) && !lines[i - 1].trim().is_empty() && !DASH_ROW.is_match(lines[i - 1])
    })?;

    let offsets = column_offsets(lines[dash_idx]);
    if offsets.is_empty() {
        return None;
    }

    let headers = slice_columns(lines[dash_idx - 1], &offsets);
    if headers.iter().all(|h| h.is_empty()) {
        return None;
    }

    let rows = lines[dash_idx + 1..]
        .iter()
        .take_while(|l| !l.trim().is_empty())
        .map(|l| slice_columns(l, &offsets))
        .collect();

    let title = dash_idx
        .checked_sub(3)
        .filter(|&t| TITLE_RULE.is_match(lines[t + 1]))
        .map(|t| lines[t].trim().to_string())
        .or_else(|| {
            // Title separated from the header by a blank line
            dash_idx
                .checked_sub(4)
                .filter(|&t| TITLE_RULE.is_match(lines[t + 1]) && lines[t + 2].trim().is_empty())
                .map(|t| lines[t].trim().to_string())
        });

    Some(StructuredData::Table {
        title,
        headers,
        rows,
    })
}

/// Start column of every dash run in an underline row
fn column_offsets(dash_row: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut prev = ' ';
    for (i, c) in dash_row.chars().enumerate() {
        if c == '-' && prev != '-' {
            offsets.push(i);
        }
        prev = c;
    }
    offsets
}

fn slice_columns(line: &str, offsets: &[usize]) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    offsets
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = offsets.get(i + 1).copied().unwrap_or(chars.len()).min(chars.len());
            if start >= end {
                return String::new();
            }
            chars[start..end].iter().collect::<String>().trim().to_string()
        })
        .collect()
}

fn parse_key_value(lines: &[&str]) -> Option<StructuredData> {
    let entries: Option<Vec<(String, String)>> = lines
        .iter()
        .map(|l| {
            KEY_VALUE
                .captures(l)
                .map(|caps| (caps[1].trim().to_string(), caps[2].to_string()))
        })
        .collect();
    entries
        .filter(|e| !e.is_empty())
        .map(|entries| StructuredData::KeyValue { entries })
}

fn parse_list(lines: &[&str]) -> Option<StructuredData> {
    let mut items = Vec::with_capacity(lines.len());
    let mut current = None;
    for line in lines {
        let caps = LIST_ITEM.captures(line)?;
        let item = caps[2].to_string();
        if &caps[1] == "*" {
            current = Some(item.clone());
        }
        items.push(item);
    }
    // A bare column of words is only a list when one entry is marked
    current.as_ref()?;
    Some(StructuredData::List { items, current })
}
