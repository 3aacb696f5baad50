//! Pattern buffer with tail-search optimization.
//!
//! Only the last `search_depth` bytes are searched for prompt patterns, so
//! matching stays cheap while a full configuration dump accumulates.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use regex::bytes::Regex;
use vte::{Parser, Perform};

/// Buffer for accumulating device output and searching its tail for prompts.
///
/// Terminal escape sequences are stripped as data arrives. The parser state
/// persists between calls so a sequence split across two reads is still removed.
pub struct PatternBuffer {
    buffer: BytesMut,
    search_depth: usize,
    parser: Parser,
}

impl PatternBuffer {
    /// Create a new pattern buffer searching the last `search_depth` bytes.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            search_depth,
            parser: Parser::new(),
        }
    }

    /// Extend the buffer with new data, stripping ANSI escape codes.
    pub fn extend(&mut self, data: &[u8]) {
        let mut sink = PlainText {
            out: &mut self.buffer,
        };
        self.parser.advance(&mut sink, data);
    }

    /// Search only the tail of the buffer for the pattern.
    pub fn search_tail(&self, pattern: &Regex) -> Option<regex::bytes::Match<'_>> {
        let start = self.buffer.len().saturating_sub(self.search_depth);
        pattern.find(&self.buffer[start..])
    }

    /// Check if the tail contains a pattern match.
    pub fn tail_contains(&self, pattern: &Regex) -> bool {
        self.search_tail(pattern).is_some()
    }

    /// Split off the buffered contents, leaving the buffer empty.
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl fmt::Debug for PatternBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternBuffer")
            .field("len", &self.buffer.len())
            .field("search_depth", &self.search_depth)
            .finish()
    }
}

/// vte performer keeping printable text and line control characters.
struct PlainText<'a> {
    out: &'a mut BytesMut,
}

impl Perform for PlainText<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.out.put_u8(byte);
        }
    }
}
