//! Accumulated device output, cleaned of terminal escapes.
//!
//! Prompt searches only look at the last `search_depth` bytes, so detecting
//! the prompt stays cheap while a long running configuration streams in.

use std::fmt;

use regex::bytes::Regex;
use vte::{Parser, Perform};

/// Keeps printable characters plus CR, LF and tab; drops everything else
/// the terminal parser recognizes (colors, cursor moves, bells).
struct Printable<'a> {
    out: &'a mut Vec<u8>,
}

impl Perform for Printable<'_> {
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

pub struct PatternBuffer {
    data: Vec<u8>,
    search_depth: usize,
    /// Survives across chunks so an escape split over two reads is still
    /// removed.
    parser: Parser,
}

impl PatternBuffer {
    pub fn new(search_depth: usize) -> Self {
        Self {
            data: Vec::with_capacity(4096),
            search_depth,
            parser: Parser::new(),
        }
    }

    /// Append a chunk read from the link.
    pub fn extend(&mut self, chunk: &[u8]) {
        let mut sink = Printable {
            out: &mut self.data,
        };
        self.parser.advance(&mut sink, chunk);
    }

    /// The searched region and its offset into the whole buffer.
    pub fn tail(&self) -> (usize, &[u8]) {
        let offset = self.data.len().saturating_sub(self.search_depth);
        (offset, &self.data[offset..])
    }

    /// Whether `pattern` occurs anywhere in the buffer.
    pub fn contains(&self, pattern: &Regex) -> bool {
        pattern.is_match(&self.data)
    }

    /// Remove and return the first `at` bytes, keeping the rest.
    pub fn split_to(&mut self, at: usize) -> Vec<u8> {
        let at = at.min(self.data.len());
        let rest = self.data.split_off(at);
        std::mem::replace(&mut self.data, rest)
    }

    /// Remove and return everything.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.clear();
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
            .field("len", &self.data.len())
            .field("search_depth", &self.search_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_output_kept() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"R1>show clock\r\n*10:00:00 UTC\r\n");
        assert_eq!(buffer.as_slice(), b"R1>show clock\r\n*10:00:00 UTC\r\n");
    }

    #[test]
    fn test_colors_removed() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"\x1b[1;32mR1\x1b[0m#");
        assert_eq!(buffer.as_slice(), b"R1#");
    }

    #[test]
    fn test_escape_split_across_chunks() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"R1\x1b[");
        buffer.extend(b"0m#");
        assert_eq!(buffer.as_slice(), b"R1#");
    }

    #[test]
    fn test_bell_dropped() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"R1>\x07");
        assert_eq!(buffer.as_slice(), b"R1>");
    }

    #[test]
    fn test_tail_limited_to_depth() {
        let mut buffer = PatternBuffer::new(8);
        buffer.extend(b"hostname R1\r\nR1#");
        let (offset, tail) = buffer.tail();
        assert_eq!(offset, 8);
        assert_eq!(tail, b" R1\r\nR1#");
    }

    #[test]
    fn test_contains_searches_everything() {
        let mut buffer = PatternBuffer::new(4);
        buffer.extend(b"Proceed with reload? [confirm]");
        assert!(buffer.contains(&Regex::new("Proceed").unwrap()));
    }

    #[test]
    fn test_split_keeps_remainder() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"R1#extra");
        assert_eq!(buffer.split_to(3), b"R1#");
        assert_eq!(buffer.as_slice(), b"extra");
        assert_eq!(buffer.take(), b"extra");
        assert!(buffer.as_slice().is_empty());
    }
}
