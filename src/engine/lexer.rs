//! Table-driven lexer
//!
//! All lexical terminals are compiled into one anchored multi-pattern DFA
//! that reports every pattern matching at a position. The DFA is stepped
//! by hand, one byte at a time, which gives us two things a plain regex
//! search does not:
//!
//! - the longest match among the terminals the current parse state admits,
//!   with the longest match over *all* terminals as a fallback
//! - the exact number of bytes the lexer examined, which bounds the
//!   lookahead dependency recorded on each leaf for incremental reuse
//!
//! External scanners run first when the lex mode admits an external token.

use super::error::GrammarError;
use super::external::{ExternalScanner, ScanCursor, ScannerState};
use super::symbol::{SymbolId, SymbolTable, TokenSet};
use super::table::{LexMode, LexModeId};
use regex_automata::dfa::{dense, Automaton, StartKind};
use regex_automata::util::primitives::StateID;
use regex_automata::{Anchored, Input, MatchKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A lexical terminal and its regular expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalPattern {
    /// Terminal symbol
    pub symbol: SymbolId,
    /// Regular expression, without anchors
    pub pattern: String,
}

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Terminal kind
    pub symbol: SymbolId,
    /// Start byte
    pub start: usize,
    /// End byte (exclusive)
    pub end: usize,
    /// One past the last byte inspected to produce this token
    pub examined_end: usize,
    /// Bytes before `start` inspected to produce this token
    pub lookbehind: usize,
    /// Lex mode the token was produced in
    pub lex_mode: LexModeId,
    /// Scanner state after the token
    pub scanner_after: Arc<ScannerState>,
}

impl Token {
    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True for zero-width tokens
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Result of a lexing step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexOutcome {
    /// A token was recognized
    Token(Token),
    /// No terminal matches at `start`; `end` is where some terminal matches again
    NoMatch {
        /// First unrecognized byte
        start: usize,
        /// End of the unrecognized run
        end: usize,
        /// One past the last byte inspected
        examined_end: usize,
    },
}

#[derive(Debug, Default, Clone, Copy)]
struct Scan {
    /// (end, pattern index) of the best admissible match
    admissible: Option<(usize, usize)>,
    /// (end, pattern index) of the best match over all terminals
    any: Option<(usize, usize)>,
    examined_end: usize,
}

fn prefer(best: &mut Option<(usize, usize)>, end: usize, pattern: usize) {
    match best {
        Some((e, p)) if *e > end || (*e == end && *p <= pattern) => {}
        _ => *best = Some((end, pattern)),
    }
}

/// The compiled lexical DFA
#[derive(Clone)]
pub struct LexTable {
    patterns: Vec<TerminalPattern>,
    dfa: Option<dense::DFA<Vec<u32>>>,
}

impl fmt::Debug for LexTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexTable")
            .field("patterns", &self.patterns.len())
            .field(
                "dfa_bytes",
                &self.dfa.as_ref().map(|dfa| dfa.memory_usage()).unwrap_or(0),
            )
            .finish()
    }
}

fn build_dfa(patterns: &[&str]) -> Result<dense::DFA<Vec<u32>>, dense::BuildError> {
    dense::Builder::new()
        .configure(
            dense::Config::new()
                .match_kind(MatchKind::All)
                .start_kind(StartKind::Anchored)
                .unicode_word_boundary(true),
        )
        .build_many(patterns)
}

impl LexTable {
    /// Compile the terminals, in priority order
    pub fn new(patterns: Vec<TerminalPattern>) -> Result<Self, GrammarError> {
        if patterns.is_empty() {
            return Ok(Self { patterns, dfa: None });
        }
        let sources: Vec<&str> = patterns.iter().map(|p| p.pattern.as_str()).collect();
        let dfa = build_dfa(&sources).map_err(|err| {
            // blame the first pattern that fails on its own
            let culprit = sources
                .iter()
                .find(|p| build_dfa(&[**p]).is_err())
                .map(|p| p.to_string())
                .unwrap_or_else(|| "<lexer>".to_string());
            GrammarError::InvalidPattern {
                pattern: culprit,
                message: err.to_string(),
            }
        })?;
        Ok(Self {
            patterns,
            dfa: Some(dfa),
        })
    }

    /// Terminal patterns in priority order
    pub fn patterns(&self) -> &[TerminalPattern] {
        &self.patterns
    }

    /// Longest non-empty match at `pos` among the terminals in `admissible`
    ///
    /// Returns the terminal and the match end. `None` for `admissible`
    /// considers every terminal.
    pub fn longest_match(
        &self,
        text: &str,
        pos: usize,
        admissible: Option<&TokenSet>,
    ) -> Option<(SymbolId, usize)> {
        let scan = self.scan(text, pos, admissible);
        let best = if admissible.is_some() {
            scan.admissible
        } else {
            scan.any
        };
        best.map(|(end, pattern)| (self.patterns[pattern].symbol, end))
    }

    fn scan(&self, text: &str, pos: usize, admissible: Option<&TokenSet>) -> Scan {
        let mut scan = Scan {
            examined_end: pos + 1,
            ..Scan::default()
        };
        let Some(dfa) = &self.dfa else {
            return scan;
        };
        let input = Input::new(text).range(pos..).anchored(Anchored::Yes);
        let Ok(mut state) = dfa.start_state_forward(&input) else {
            return scan;
        };

        let bytes = text.as_bytes();
        let mut at = pos;
        let record = |state: StateID, end: usize, scan: &mut Scan| {
            if end == pos {
                return;
            }
            for i in 0..dfa.match_len(state) {
                let pattern = dfa.match_pattern(state, i).as_usize();
                let symbol = self.patterns[pattern].symbol;
                prefer(&mut scan.any, end, pattern);
                if admissible.map_or(true, |set| set.contains(symbol)) {
                    prefer(&mut scan.admissible, end, pattern);
                }
            }
        };

        loop {
            if at == bytes.len() {
                let exhausted = exhausted(dfa, state);
                state = dfa.next_eoi_state(state);
                if dfa.is_match_state(state) {
                    record(state, at, &mut scan);
                }
                scan.examined_end = if exhausted { at } else { at + 1 };
                break;
            }
            let previous = state;
            state = dfa.next_state(previous, bytes[at]);
            if dfa.is_special_state(state) {
                // matches are reported one byte late
                if dfa.is_match_state(state) {
                    record(state, at, &mut scan);
                } else if dfa.is_dead_state(state) || dfa.is_quit_state(state) {
                    // a state that only carries a delayed match dies on any
                    // input, so the byte at `at` did not decide anything
                    scan.examined_end = if exhausted(dfa, previous) {
                        at
                    } else {
                        at + 1
                    };
                    break;
                }
            }
            at += 1;
        }
        scan
    }
}

/// True for a match state that can neither extend nor produce another match
fn exhausted(dfa: &dense::DFA<Vec<u32>>, state: StateID) -> bool {
    dfa.is_match_state(state)
        && (0..=u8::MAX).all(|byte| dfa.is_dead_state(dfa.next_state(state, byte)))
        && dfa.is_dead_state(dfa.next_eoi_state(state))
}

fn char_len_at(text: &str, pos: usize) -> usize {
    text[pos..].chars().next().map(char::len_utf8).unwrap_or(1)
}

/// Produces tokens for the parsing engine
pub struct Lexer<'a> {
    table: &'a LexTable,
    symbols: &'a SymbolTable,
    scanner: Option<&'a dyn ExternalScanner>,
    text: &'a str,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over `text`
    pub fn new(
        table: &'a LexTable,
        symbols: &'a SymbolTable,
        scanner: Option<&'a dyn ExternalScanner>,
        text: &'a str,
    ) -> Self {
        Self {
            table,
            symbols,
            scanner,
            text,
        }
    }

    /// The input text
    #[inline]
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Lex the next token at `pos` in the given mode
    pub fn next_token(
        &self,
        pos: usize,
        mode_id: LexModeId,
        mode: &LexMode,
        scanner_state: &Arc<ScannerState>,
    ) -> LexOutcome {
        let mut examined_end = pos;
        let mut lookbehind = 0;

        if let Some(scanner) = self.scanner.filter(|_| !mode.externals.is_empty()) {
            let valid: Vec<bool> = (0..self.symbols.external_count())
                .map(|i| {
                    self.symbols
                        .external_symbol(i)
                        .is_some_and(|symbol| mode.externals.contains(symbol))
                })
                .collect();
            let mut cursor = ScanCursor::new(self.text.as_bytes(), pos);
            let mut state = ScannerState::clone(scanner_state);
            let result = scanner.scan(&mut cursor, &mut state, &valid);
            examined_end = cursor.examined_end();
            lookbehind = cursor.lookbehind();
            if let Some(kind) = result.filter(|&k| valid.get(k).copied().unwrap_or(false)) {
                if let Some(symbol) = self.symbols.external_symbol(kind) {
                    let end = cursor.token_end();
                    if self.text.is_char_boundary(end) {
                        return LexOutcome::Token(Token {
                            symbol,
                            start: pos,
                            end,
                            examined_end: examined_end.max(end),
                            lookbehind,
                            lex_mode: mode_id,
                            scanner_after: Arc::new(state),
                        });
                    }
                }
            }
        }

        if pos >= self.text.len() {
            return LexOutcome::Token(Token {
                symbol: SymbolId::END,
                start: pos,
                end: pos,
                examined_end: examined_end.max(pos + 1),
                lookbehind,
                lex_mode: mode_id,
                scanner_after: Arc::clone(scanner_state),
            });
        }

        let scan = self.table.scan(self.text, pos, Some(&mode.admissible));
        examined_end = examined_end.max(scan.examined_end);
        if let Some((end, pattern)) = scan.admissible.or(scan.any) {
            return LexOutcome::Token(Token {
                symbol: self.table.patterns[pattern].symbol,
                start: pos,
                end,
                examined_end,
                lookbehind,
                lex_mode: mode_id,
                scanner_after: Arc::clone(scanner_state),
            });
        }

        // skip characters until some terminal matches again
        let mut end = pos + char_len_at(self.text, pos);
        while end < self.text.len() {
            let scan = self.table.scan(self.text, end, None);
            examined_end = examined_end.max(scan.examined_end);
            if scan.any.is_some() {
                break;
            }
            end += char_len_at(self.text, end);
        }
        LexOutcome::NoMatch {
            start: pos,
            end,
            examined_end: examined_end.max(end + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LexTable {
        LexTable::new(vec![
            TerminalPattern {
                symbol: SymbolId(1),
                pattern: regex::escape("fn"),
            },
            TerminalPattern {
                symbol: SymbolId(2),
                pattern: regex::escape("+"),
            },
            TerminalPattern {
                symbol: SymbolId(3),
                pattern: "(?:[a-z]+)".into(),
            },
            TerminalPattern {
                symbol: SymbolId(4),
                pattern: "(?:[0-9]+)".into(),
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_longest_match_wins() {
        let table = table();
        assert_eq!(table.longest_match("fnord", 0, None), Some((SymbolId(3), 5)));
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let table = table();
        assert_eq!(table.longest_match("fn x", 0, None), Some((SymbolId(1), 2)));
    }

    #[test]
    fn test_only_admissible_terminals_compete() {
        let table = table();
        let admissible: TokenSet = [SymbolId(3)].into_iter().collect();
        assert_eq!(
            table.longest_match("fn x", 0, Some(&admissible)),
            Some((SymbolId(3), 2))
        );
        let digits: TokenSet = [SymbolId(4)].into_iter().collect();
        assert_eq!(table.longest_match("fn", 0, Some(&digits)), None);
    }

    #[test]
    fn test_examined_extent() {
        let table = table();
        // "abc" stops at the space: examined through index 3
        let scan = table.scan("abc def", 0, None);
        assert_eq!(scan.any, Some((3, 2)));
        assert_eq!(scan.examined_end, 4);
        // a failed literal examines the byte that broke it
        let scan = table.scan("fx", 0, None);
        assert_eq!(scan.any, Some((2, 2)));
        // "+" is complete after one byte; "x" was read to find that out
        let scan = table.scan("+x", 0, None);
        assert_eq!(scan.any, Some((1, 1)));
        assert_eq!(scan.examined_end, 2);
        let scan = table.scan("12+", 0, None);
        assert_eq!(scan.any, Some((2, 3)));
        assert_eq!(scan.examined_end, 3);
        // end of input counts as one examined byte
        let scan = table.scan("abc", 0, None);
        assert_eq!(scan.examined_end, 4);
    }

    #[test]
    fn test_match_in_middle_of_text() {
        let table = table();
        assert_eq!(table.longest_match("1 + 22", 4, None), Some((SymbolId(4), 6)));
        assert_eq!(table.longest_match("1 + 22", 2, None), Some((SymbolId(2), 3)));
    }
}
