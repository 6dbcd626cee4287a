//! Output buffer with ANSI stripping and incremental marker search.
//!
//! Device shells colourise prompts and redraw lines; escape sequences are
//! removed as bytes arrive so that markers (command echo, prompt) can be
//! found as plain substrings. The parser keeps its state between chunks,
//! so a sequence split across two reads is still removed.

use std::fmt;

use memchr::memmem;
use vte::{Parser, Perform};

/// Accumulates device output and splits it at marker boundaries.
pub struct OutputBuffer {
    buffer: Vec<u8>,
    parser: Parser,
}

/// Collects printable output, dropping control and escape sequences.
struct Stripper<'a> {
    out: &'a mut Vec<u8>,
}

impl Perform for Stripper<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.out.push(byte);
        }
    }
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            parser: Parser::new(),
        }
    }

    /// Append raw device bytes, stripping ANSI escape codes.
    pub fn extend(&mut self, data: &[u8]) {
        let mut stripper = Stripper {
            out: &mut self.buffer,
        };
        self.parser.advance(&mut stripper, data);
    }

    /// Byte offset of the first `marker` occurrence at or after `from`.
    pub fn find_from(&self, marker: &[u8], from: usize) -> Option<usize> {
        let from = from.min(self.buffer.len());
        memmem::find(&self.buffer[from..], marker).map(|pos| pos + from)
    }

    /// If `marker` occurs at or after `from`, remove everything up to and
    /// including it and return the part before the marker.
    pub fn split_at_marker(&mut self, marker: &[u8], from: usize) -> Option<Vec<u8>> {
        let pos = self.find_from(marker, from)?;
        let mut head: Vec<u8> = self.buffer.drain(..pos + marker.len()).collect();
        head.truncate(pos);
        Some(head)
    }

    /// Offset from which a later search for `marker` must resume so that a
    /// marker straddling the current end is still found.
    pub fn resume_offset(&self, marker: &[u8]) -> usize {
        self.buffer
            .len()
            .saturating_sub(marker.len().saturating_sub(1))
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop buffered output and any half-parsed escape sequence.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.parser = Parser::new();
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("len", &self.buffer.len())
            .finish()
    }
}
