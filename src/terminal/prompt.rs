//! Prompt Detection Logic
//!
//! Detects the console's ready prompt. The prompt is the only completion
//! signal the console offers, and it is printed without a trailing newline,
//! so detection runs on both complete lines and the unterminated tail.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;

/// Built-in prompt patterns, most specific first
const DEFAULT_PROMPT_PATTERNS: &[&str] = &[
    // msf6 > / msf6 exploit(multi/handler) > / msf >
    r"^msf\d*(?: [a-z_]+\([^)]*\))? ?>\s*$",
    r"^meterpreter\s*>\s*$",
];

static MODULE_CONTEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^msf\d* ([a-z_]+)\(([^)]+)\)").expect("valid module context regex"));

/// Prompt detector for the console
#[derive(Debug, Clone)]
pub struct PromptDetector {
    patterns: Vec<Regex>,
    /// Custom prompt patterns, checked first
    custom_patterns: Vec<Regex>,
}

impl PromptDetector {
    /// Create a detector with the built-in patterns
    pub fn new() -> Self {
        let patterns = DEFAULT_PROMPT_PATTERNS
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Failed to compile prompt pattern '{}': {}", p, e);
                    None
                }
            })
            .collect();

        Self {
            patterns,
            custom_patterns: Vec::new(),
        }
    }

    /// Create a detector with extra patterns from configuration
    pub fn with_patterns<S: AsRef<str>>(extra: &[S]) -> Result<Self> {
        let mut detector = Self::new();
        for pattern in extra {
            detector.add_custom_pattern(pattern.as_ref())?;
        }
        Ok(detector)
    }

    /// Add custom prompt pattern
    pub fn add_custom_pattern(&mut self, pattern: &str) -> Result<()> {
        let regex = Regex::new(pattern)?;
        self.custom_patterns.push(regex);
        Ok(())
    }

    /// Check whether `text` is a complete prompt
    pub fn is_prompt(&self, text: &str) -> bool {
        self.custom_patterns
            .iter()
            .chain(self.patterns.iter())
            .any(|re| re.is_match(text))
    }

    pub fn custom_pattern_count(&self) -> usize {
        self.custom_patterns.len()
    }
}

impl Default for PromptDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Module path selected in a prompt, e.g. `exploit/multi/handler`
pub fn module_context(prompt: &str) -> Option<String> {
    MODULE_CONTEXT
        .captures(prompt.trim_start())
        .map(|caps| format!("{}/{}", &caps[1], &caps[2]))
}
