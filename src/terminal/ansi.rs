//! Control Sequence Stripping
//!
//! Console output arrives as raw PTY bytes full of colour codes, cursor
//! movement and readline redraws. The stripper runs the bytes through a
//! `vte` state machine and keeps only printable text plus the line control
//! characters the line assembler cares about. Escape sequences and UTF-8
//! sequences split across reads are carried over in the parser state.

use vte::{Params, Parser, Perform};

/// Streaming control-sequence stripper
pub struct AnsiStripper {
    parser: Parser,
    sink: TextSink,
}

#[derive(Default)]
struct TextSink {
    out: String,
}

impl Perform for TextSink {
    fn print(&mut self, c: char) {
        self.out.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.out.push('\n'),
            b'\r' => self.out.push('\r'),
            b'\t' => self.out.push('\t'),
            // Backspace erases within the current line only
            0x08 => {
                if matches!(self.out.chars().last(), Some(c) if c != '\n' && c != '\r') {
                    self.out.pop();
                }
            }
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, action: char) {
        // Cursor-forward is used by some readline builds in place of spaces
        if action == 'C' {
            self.out.push(' ');
        }
    }
}

impl AnsiStripper {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            sink: TextSink::default(),
        }
    }

    /// Feed raw bytes, returning the text they contribute
    pub fn strip(&mut self, bytes: &[u8]) -> String {
        self.parser.advance(&mut self.sink, bytes);
        std::mem::take(&mut self.sink.out)
    }

    /// Drop any half-read escape sequence
    pub fn reset(&mut self) {
        self.parser = Parser::new();
        self.sink.out.clear();
    }
}

impl Default for AnsiStripper {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AnsiStripper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnsiStripper").finish_non_exhaustive()
    }
}

/// One-shot stripping of a complete buffer
pub fn strip_ansi(bytes: &[u8]) -> String {
    AnsiStripper::new().strip(bytes)
}
