//! Console Output Handling
//!
//! Everything that turns the console's byte stream into something the
//! driver can reason about: control-sequence stripping, line assembly,
//! prompt detection, lifecycle banner extraction and best-effort
//! structuring of tables and key/value blocks.

pub mod ansi;
pub mod events;
pub mod output;
pub mod prompt;
pub mod structure;

// Re-exports for convenience
pub use ansi::{strip_ansi, AnsiStripper};
pub use events::{scan_line, ConsoleEvent};
pub use output::{paginate, Fragment, OutputParser, OutputProcessor, Page, ParsedOutput};
pub use prompt::{module_context, PromptDetector};
pub use structure::{collect_errors, is_error_banner, structure};
