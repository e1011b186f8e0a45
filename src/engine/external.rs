//! External scanner hooks
//!
//! Some tokens cannot be described by regular expressions: indentation,
//! heredocs, nested comments. A grammar lists such tokens in `externals`
//! and the language carries an [`ExternalScanner`] that produces them.
//!
//! The scanner is stateless itself; everything it needs to remember between
//! tokens lives in a small [`ScannerState`] vector that the engine snapshots
//! into the tree, so incremental re-parses can resume scanning anywhere.
//!
//! # Example
//!
//! ```rust
//! use tessera::engine::external::{ExternalScanner, ScanCursor, ScannerState};
//!
//! /// Emits token 0 for a run of `%` characters
//! struct Percent;
//!
//! impl ExternalScanner for Percent {
//!     fn scan(&self, cursor: &mut ScanCursor<'_>, _state: &mut ScannerState, valid: &[bool]) -> Option<usize> {
//!         if !valid[0] || cursor.lookahead() != Some(b'%') {
//!             return None;
//!         }
//!         while cursor.lookahead() == Some(b'%') {
//!             cursor.advance();
//!         }
//!         cursor.mark_end();
//!         Some(0)
//!     }
//! }
//! ```

use std::cell::Cell;

/// Maximum number of values a scanner may keep
pub const MAX_SCANNER_STATE_LEN: usize = 64;

/// Integer state vector owned by the engine on behalf of a scanner
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ScannerState {
    values: Vec<i32>,
}

impl ScannerState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a value; returns false when the state is full
    pub fn push(&mut self, value: i32) -> bool {
        if self.values.len() >= MAX_SCANNER_STATE_LEN {
            return false;
        }
        self.values.push(value);
        true
    }

    /// Pop the last value
    pub fn pop(&mut self) -> Option<i32> {
        self.values.pop()
    }

    /// Last value
    pub fn last(&self) -> Option<i32> {
        self.values.last().copied()
    }

    /// Value at an index
    pub fn get(&self, index: usize) -> Option<i32> {
        self.values.get(index).copied()
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no values are stored
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All values
    pub fn as_slice(&self) -> &[i32] {
        &self.values
    }

    /// Remove every value
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Read cursor over the raw input handed to a scanner
///
/// The token starts at the cursor's initial position and ends at the last
/// [`mark_end`](Self::mark_end), or at the current position if `mark_end`
/// was never called.
pub struct ScanCursor<'a> {
    text: &'a [u8],
    start: usize,
    position: usize,
    token_end: Option<usize>,
    furthest: Cell<usize>,
    /// Bytes before `start` the scanner depended on (start of input counts as one)
    lookbehind: Cell<usize>,
}

impl<'a> ScanCursor<'a> {
    pub(crate) fn new(text: &'a [u8], start: usize) -> Self {
        Self {
            text,
            start,
            position: start,
            token_end: None,
            furthest: Cell::new(start),
            lookbehind: Cell::new(0),
        }
    }

    /// Byte at the current position, `None` at end of input
    pub fn lookahead(&self) -> Option<u8> {
        self.touch(self.position);
        self.text.get(self.position).copied()
    }

    /// Character at the current position
    pub fn lookahead_char(&self) -> Option<char> {
        let rest = self.text.get(self.position..)?;
        let len = rest.len().min(4);
        self.touch(self.position + len.saturating_sub(1));
        let prefix = &rest[..len];
        let valid = match std::str::from_utf8(prefix) {
            Ok(s) => s,
            Err(err) => std::str::from_utf8(&prefix[..err.valid_up_to()]).unwrap_or(""),
        };
        valid.chars().next()
    }

    /// Move past the current byte
    pub fn advance(&mut self) {
        if self.position < self.text.len() {
            self.position += 1;
        }
    }

    /// Mark the current position as the end of the token
    pub fn mark_end(&mut self) {
        self.token_end = Some(self.position);
    }

    /// True at end of input
    pub fn at_eof(&self) -> bool {
        self.touch(self.position);
        self.position >= self.text.len()
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.position
    }

    /// Byte offset where the token starts
    pub fn token_start(&self) -> usize {
        self.start
    }

    /// Bytes between the preceding newline and the current position
    ///
    /// The bytes back to that newline become part of what the token
    /// depends on, so an edit earlier on the line invalidates it.
    pub fn column(&self) -> usize {
        let newline = memchr::memrchr(b'\n', &self.text[..self.position]);
        let behind = match newline {
            Some(n) => self.start.saturating_sub(n),
            None => self.start + 1,
        };
        if behind > self.lookbehind.get() {
            self.lookbehind.set(behind);
        }
        self.position - newline.map(|n| n + 1).unwrap_or(0)
    }

    fn touch(&self, index: usize) {
        if index + 1 > self.furthest.get() {
            self.furthest.set(index + 1);
        }
    }

    pub(crate) fn token_end(&self) -> usize {
        self.token_end.unwrap_or(self.position)
    }

    /// One past the furthest byte inspected (end of input counts as a byte)
    pub(crate) fn examined_end(&self) -> usize {
        self.furthest.get().max(self.token_end())
    }

    /// Bytes before the token start inspected by [`column`](Self::column)
    pub(crate) fn lookbehind(&self) -> usize {
        self.lookbehind.get()
    }
}

/// A pluggable lexer for context-sensitive tokens
pub trait ExternalScanner: Send + Sync {
    /// Try to recognize one of the valid external tokens at the cursor.
    ///
    /// `valid[i]` is true when external token `i` (in grammar `externals`
    /// order) is acceptable in the current parse state. Return the index of
    /// the recognized token, or `None` to fall back to the table lexer. State
    /// changes are discarded when `None` is returned.
    fn scan(&self, cursor: &mut ScanCursor<'_>, state: &mut ScannerState, valid: &[bool]) -> Option<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanner_state_is_bounded() {
        let mut state = ScannerState::new();
        for i in 0..MAX_SCANNER_STATE_LEN {
            assert!(state.push(i as i32));
        }
        assert!(!state.push(0));
        assert_eq!(state.len(), MAX_SCANNER_STATE_LEN);
        assert_eq!(state.pop(), Some(MAX_SCANNER_STATE_LEN as i32 - 1));
    }

    #[test]
    fn test_cursor_tracks_examined_bytes() {
        let text = b"abc";
        let mut cursor = ScanCursor::new(text, 0);
        assert_eq!(cursor.lookahead(), Some(b'a'));
        cursor.advance();
        cursor.mark_end();
        assert_eq!(cursor.lookahead(), Some(b'b'));
        assert_eq!(cursor.token_end(), 1);
        assert_eq!(cursor.examined_end(), 2);

        cursor.advance();
        cursor.advance();
        assert!(cursor.at_eof());
        assert_eq!(cursor.examined_end(), 4);
    }

    #[test]
    fn test_cursor_column() {
        let text = b"x\n   y";
        let mut cursor = ScanCursor::new(text, 2);
        for _ in 0..3 {
            cursor.advance();
        }
        assert_eq!(cursor.column(), 3);
        assert_eq!(cursor.lookahead_char(), Some('y'));
        // back to and including the newline at 1
        assert_eq!(cursor.lookbehind(), 1);
    }

    #[test]
    fn test_column_on_first_line_depends_on_start_of_input() {
        let text = b"  ab";
        let mut cursor = ScanCursor::new(text, 2);
        assert_eq!(cursor.lookbehind(), 0);
        cursor.advance();
        assert_eq!(cursor.column(), 3);
        assert_eq!(cursor.lookbehind(), 3);
    }
}
