//! Output Processing and Segmentation
//!
//! Turns raw console bytes into fragments. The processor keeps the state a
//! byte stream needs (half-read escape sequences, the unterminated last
//! line, a trailing carriage return) and emits a fragment only once a line
//! is complete. The one exception is the prompt, which the console prints
//! without a newline: an unterminated tail that matches the prompt pattern
//! is emitted as a [`Fragment::Prompt`].

use serde::Serialize;

use super::ansi::AnsiStripper;
use super::events::{scan_line, ConsoleEvent};
use super::prompt::PromptDetector;
use super::structure::{collect_errors, is_error_banner, structure};
use crate::models::StructuredData;

/// Upper bound on an unterminated line before it is force-flushed
const MAX_PENDING_LINE: usize = 1024 * 1024;

/// A parsed unit of console output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Fragment {
    /// Ordinary output line
    Line(String),
    /// The console's ready prompt
    Prompt(String),
    /// Line reporting an error
    ErrorBanner(String),
    /// Lifecycle banner for a session or job
    Event(ConsoleEvent),
}

/// Stateful line assembler for one console stream
#[derive(Debug)]
pub struct OutputProcessor {
    stripper: AnsiStripper,
    prompts: PromptDetector,
    /// Current line being built
    pending: String,
    /// A `\r` ended the previous chunk
    pending_cr: bool,
}

impl OutputProcessor {
    pub fn new(prompts: PromptDetector) -> Self {
        Self {
            stripper: AnsiStripper::new(),
            prompts,
            pending: String::new(),
            pending_cr: false,
        }
    }

    /// Feed a chunk of raw bytes
    pub fn process_chunk(&mut self, bytes: &[u8]) -> Vec<Fragment> {
        let text = self.stripper.strip(bytes);
        let mut fragments = Vec::new();

        for c in text.chars() {
            if self.pending_cr {
                self.pending_cr = false;
                if c != '\n' {
                    // Lone carriage return redraws the line
                    self.pending.clear();
                }
            }
            match c {
                '\n' => {
                    let line = std::mem::take(&mut self.pending);
                    self.classify_line(line, &mut fragments);
                }
                '\r' => self.pending_cr = true,
                _ => self.pending.push(c),
            }
            if self.pending.len() >= MAX_PENDING_LINE {
                let line = std::mem::take(&mut self.pending);
                self.classify_line(line, &mut fragments);
            }
        }

        if !self.pending.is_empty() && self.prompts.is_prompt(&self.pending) {
            fragments.push(Fragment::Prompt(std::mem::take(&mut self.pending)));
            self.pending_cr = false;
        }

        fragments
    }

    fn classify_line(&self, line: String, fragments: &mut Vec<Fragment>) {
        let events = scan_line(&line);
        if !events.is_empty() {
            fragments.extend(events.into_iter().map(Fragment::Event));
        } else if self.prompts.is_prompt(&line) {
            fragments.push(Fragment::Prompt(line));
        } else if is_error_banner(&line) {
            fragments.push(Fragment::ErrorBanner(line));
        } else {
            fragments.push(Fragment::Line(line));
        }
    }

    /// Unconsumed text of the current line
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Take the unterminated tail, e.g. when a deadline expires
    pub fn take_pending(&mut self) -> String {
        self.pending_cr = false;
        std::mem::take(&mut self.pending)
    }

    pub fn prompts(&self) -> &PromptDetector {
        &self.prompts
    }

    /// Forget all buffered state
    pub fn reset(&mut self) {
        self.stripper.reset();
        self.pending.clear();
        self.pending_cr = false;
    }
}

/// Result of parsing a complete buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub fragments: Vec<Fragment>,
    /// Text after the last line terminator that was not a prompt
    pub remainder: String,
    /// Output lines and error banners, newline-joined
    pub text: String,
    pub structured: Option<StructuredData>,
    pub errors: Vec<String>,
}

/// Stateless parser over complete buffers
///
/// Every call starts from a fresh [`OutputProcessor`], so the same input
/// always yields the same fragments.
#[derive(Debug, Clone, Default)]
pub struct OutputParser {
    prompts: PromptDetector,
}

impl OutputParser {
    pub fn new(prompts: PromptDetector) -> Self {
        Self { prompts }
    }

    pub fn parse(&self, raw: &[u8]) -> ParsedOutput {
        let mut processor = OutputProcessor::new(self.prompts.clone());
        let fragments = processor.process_chunk(raw);
        let remainder = processor.take_pending();

        let text = fragments
            .iter()
            .filter_map(|f| match f {
                Fragment::Line(l) | Fragment::ErrorBanner(l) => Some(l.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        let structured = structure(&text);
        let errors = collect_errors(&text);

        ParsedOutput {
            fragments,
            remainder,
            text,
            structured,
            errors,
        }
    }
}

/// A page of output cut to a size limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub output: String,
    pub truncated: bool,
    pub total_length: usize,
    pub showing_length: usize,
}

/// Truncate `text` to at most `max_len` bytes, preferring a line boundary
/// when one lies in the last fifth of the page
pub fn paginate(text: &str, max_len: usize) -> Page {
    if text.len() <= max_len {
        return Page {
            output: text.to_string(),
            truncated: false,
            total_length: text.len(),
            showing_length: text.len(),
        };
    }

    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut page = &text[..cut];
    if let Some(last_newline) = page.rfind('\n') {
        if last_newline * 5 > max_len * 4 {
            page = &page[..last_newline];
        }
    }

    Page {
        output: page.to_string(),
        truncated: true,
        total_length: text.len(),
        showing_length: page.len(),
    }
}
