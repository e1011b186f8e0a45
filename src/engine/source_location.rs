//! Source location utilities
//!
//! Trees store byte offsets only. This module turns offsets into 1-based
//! line/column positions on demand.

use memchr::{memchr_iter, memrchr};
use std::fmt;

/// A position in source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    /// Byte offset from start of input
    pub offset: usize,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based, counted in characters)
    pub column: usize,
}

impl SourcePosition {
    /// Create a new source position
    #[inline]
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    /// Create a position at the start of input
    #[inline]
    pub fn start() -> Self {
        Self::new(0, 1, 1)
    }

    /// Calculate position from an offset in the input
    pub fn from_offset(input: &str, offset: usize) -> Self {
        let mut offset = offset.min(input.len());
        while !input.is_char_boundary(offset) {
            offset -= 1;
        }
        let prefix = &input.as_bytes()[..offset];
        let line = 1 + memchr_iter(b'\n', prefix).count();
        let line_start = memrchr(b'\n', prefix).map(|n| n + 1).unwrap_or(0);
        let column = 1 + input[line_start..offset].chars().count();
        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

impl Default for SourcePosition {
    fn default() -> Self {
        Self::start()
    }
}

/// A range in source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceSpan {
    /// Start position
    pub start: SourcePosition,
    /// End position
    pub end: SourcePosition,
}

impl SourceSpan {
    /// Create a new span
    #[inline]
    pub fn new(start: SourcePosition, end: SourcePosition) -> Self {
        Self { start, end }
    }

    /// Create a span from byte offsets
    pub fn from_offsets(input: &str, start_offset: usize, end_offset: usize) -> Self {
        Self {
            start: SourcePosition::from_offset(input, start_offset),
            end: SourcePosition::from_offset(input, end_offset),
        }
    }

    /// Byte range covered by the span
    #[inline]
    pub fn byte_range(&self) -> std::ops::Range<usize> {
        self.start.offset..self.end.offset
    }

    /// Check if this span contains an offset
    #[inline]
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start.offset && offset < self.end.offset
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            write!(
                f,
                "line {}, columns {}-{}",
                self.start.line, self.start.column, self.end.column
            )
        } else {
            write!(f, "{} to {}", self.start, self.end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_offset_counts_lines_and_chars() {
        let input = "ab\ncé d\nx";
        assert_eq!(SourcePosition::from_offset(input, 0), SourcePosition::new(0, 1, 1));
        assert_eq!(SourcePosition::from_offset(input, 3), SourcePosition::new(3, 2, 1));
        // 'é' is two bytes but one column
        assert_eq!(SourcePosition::from_offset(input, 6), SourcePosition::new(6, 2, 3));
        assert_eq!(SourcePosition::from_offset(input, 100).line, 3);
    }

    #[test]
    fn test_from_offset_inside_char_snaps_back() {
        let input = "é";
        assert_eq!(SourcePosition::from_offset(input, 1).offset, 0);
    }

    #[test]
    fn test_span_display() {
        let span = SourceSpan::from_offsets("hello world", 6, 11);
        assert_eq!(span.to_string(), "line 1, columns 7-12");
        assert!(span.contains(6));
        assert!(!span.contains(11));
        assert_eq!(span.byte_range(), 6..11);
    }
}
