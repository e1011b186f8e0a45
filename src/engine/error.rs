//! Error types
//!
//! Three failure families are surfaced to callers:
//!
//! - [`GrammarError`]: the grammar cannot be compiled (build time)
//! - [`LanguageError`]: a serialized language cannot be loaded (load time)
//! - [`ParseError`]: a parse could not run or was aborted (run time)
//!
//! Syntax errors in the input are never failures. They are represented in
//! the tree as `ERROR` and `MISSING` nodes and can be listed as
//! [`SyntaxError`] diagnostics.

use super::source_location::SourceSpan;
use std::fmt;

/// Errors raised while compiling a grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// The grammar has no rules
    NoRules,

    /// Two rules share a name
    DuplicateRule {
        /// The duplicated name
        name: String,
    },

    /// A rule references a name that is neither a rule nor an external token
    UndefinedSymbol {
        /// The undefined name
        name: String,
        /// The rule containing the reference
        rule: String,
    },

    /// A rule cannot be reached from the start rule, the extras or the externals
    UnreachableRule {
        /// The unreachable rule
        name: String,
    },

    /// Two rules conflict at equal precedence with contradictory associativity
    AmbiguousPrecedence {
        /// The rule that would be reduced
        reduce_rule: String,
        /// The rule that would shift
        shift_rule: String,
        /// The shared precedence value
        precedence: i32,
        /// The lookahead token of the conflict
        lookahead: String,
    },

    /// A rule derives itself without consuming input (`A =>+ A`)
    LeftRecursionUnsupportedByStrategy {
        /// The rule that derives itself
        rule: String,
        /// The derivation chain, starting and ending at `rule`
        cycle: Vec<String>,
    },

    /// A lexical rule is malformed (contains a symbol reference or matches empty input)
    InvalidToken {
        /// The rule containing the token
        rule: String,
        /// Why the token is rejected
        reason: String,
    },

    /// A terminal's regular expression was rejected by the DFA builder
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Builder message
        message: String,
    },

    /// The start rule is a single token
    LexicalStartRule {
        /// Name of the start rule
        name: String,
    },

    /// An extra is neither a token nor a reference to one
    InvalidExtra {
        /// Description of the extra
        description: String,
    },

    /// A conflict declaration names an unknown rule
    UnknownConflictRule {
        /// The unknown name
        name: String,
    },
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::NoRules => write!(f, "grammar defines no rules"),
            GrammarError::DuplicateRule { name } => {
                write!(f, "rule '{}' is defined more than once", name)
            }
            GrammarError::UndefinedSymbol { name, rule } => {
                write!(f, "undefined symbol '{}' referenced in rule '{}'", name, rule)
            }
            GrammarError::UnreachableRule { name } => {
                write!(f, "rule '{}' is unreachable from the start rule", name)
            }
            GrammarError::AmbiguousPrecedence {
                reduce_rule,
                shift_rule,
                precedence,
                lookahead,
            } => write!(
                f,
                "rules '{}' and '{}' share precedence {} with conflicting associativity on '{}'",
                reduce_rule, shift_rule, precedence, lookahead
            ),
            GrammarError::LeftRecursionUnsupportedByStrategy { rule, cycle } => write!(
                f,
                "rule '{}' derives itself without consuming input: {}",
                rule,
                cycle.join(" -> ")
            ),
            GrammarError::InvalidToken { rule, reason } => {
                write!(f, "invalid token in rule '{}': {}", rule, reason)
            }
            GrammarError::InvalidPattern { pattern, message } => {
                write!(f, "invalid pattern /{}/: {}", pattern, message)
            }
            GrammarError::LexicalStartRule { name } => {
                write!(f, "start rule '{}' must not be a single token", name)
            }
            GrammarError::InvalidExtra { description } => {
                write!(f, "extra {} is not a token", description)
            }
            GrammarError::UnknownConflictRule { name } => {
                write!(f, "conflict declaration names unknown rule '{}'", name)
            }
        }
    }
}

impl std::error::Error for GrammarError {}

/// Errors raised while loading a serialized language
#[derive(Debug)]
pub enum LanguageError {
    /// The artifact was produced by an incompatible builder version
    IncompatibleGrammarVersion {
        /// Version recorded in the artifact
        found: u32,
        /// Oldest version this runtime accepts
        min_supported: u32,
        /// Newest version this runtime accepts
        max_supported: u32,
    },

    /// The artifact could not be decoded
    Serialization {
        /// Decoder message
        message: String,
    },

    /// The artifact's lexical patterns could not be compiled
    Lexer {
        /// Builder message
        message: String,
    },
}

impl fmt::Display for LanguageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageError::IncompatibleGrammarVersion {
                found,
                min_supported,
                max_supported,
            } => write!(
                f,
                "incompatible language version {} (supported {}..={})",
                found, min_supported, max_supported
            ),
            LanguageError::Serialization { message } => {
                write!(f, "invalid language artifact: {}", message)
            }
            LanguageError::Lexer { message } => {
                write!(f, "cannot rebuild lexer: {}", message)
            }
        }
    }
}

impl std::error::Error for LanguageError {}

impl From<serde_json::Error> for LanguageError {
    fn from(err: serde_json::Error) -> Self {
        LanguageError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Why a parse was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The operation budget was exhausted
    OperationLimit {
        /// Configured limit
        limit: u64,
    },
    /// Too many nodes were created
    NodeLimit {
        /// Configured limit
        limit: usize,
    },
    /// The wall-clock budget was exceeded
    Timeout {
        /// Time elapsed in milliseconds
        elapsed_ms: u64,
        /// Timeout limit in milliseconds
        timeout_ms: u64,
    },
    /// The caller raised the cancellation flag
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::OperationLimit { limit } => {
                write!(f, "operation limit of {} exceeded", limit)
            }
            AbortReason::NodeLimit { limit } => write!(f, "node limit of {} exceeded", limit),
            AbortReason::Timeout {
                elapsed_ms,
                timeout_ms,
            } => write!(
                f,
                "timeout after {}ms (limit: {}ms)",
                elapsed_ms, timeout_ms
            ),
            AbortReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Errors raised by a parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No language was set on the parser
    NoLanguage,

    /// Input exceeds maximum allowed size
    InputTooLarge {
        /// Size of the input in bytes
        input_size: usize,
        /// Maximum allowed size
        max_size: usize,
    },

    /// The parse budget was exhausted; no tree is produced
    ParseAborted {
        /// What ran out
        reason: AbortReason,
        /// Byte offset reached when the parse stopped
        position: usize,
    },

    /// An edit does not fit the text it applies to
    InvalidEdit {
        /// Index of the edit in the batch
        index: usize,
        /// What is wrong with it
        reason: String,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::NoLanguage => write!(f, "no language set"),
            ParseError::InputTooLarge {
                input_size,
                max_size,
            } => write!(
                f,
                "Input too large: {} bytes (maximum: {} bytes)",
                input_size, max_size
            ),
            ParseError::ParseAborted { reason, position } => {
                write!(f, "parse aborted at byte {}: {}", position, reason)
            }
            ParseError::InvalidEdit { index, reason } => {
                write!(f, "invalid edit #{}: {}", index, reason)
            }
        }
    }
}

impl std::error::Error for ParseError {}

// ============================================================================
// In-tree syntax errors
// ============================================================================

/// What kind of recovery produced a syntax error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    /// Input that could not be parsed was wrapped in an `ERROR` node
    Unexpected,
    /// A token was missing and a zero-width node was inserted
    Missing {
        /// Kind name of the inserted node
        expected: String,
    },
}

/// A located syntax error found in a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Error kind
    pub kind: SyntaxErrorKind,
    /// Location in the source
    pub span: SourceSpan,
}

impl SyntaxError {
    /// Human readable message
    pub fn message(&self) -> String {
        match &self.kind {
            SyntaxErrorKind::Unexpected => "unexpected input".to_string(),
            SyntaxErrorKind::Missing { expected } => format!("missing {}", expected),
        }
    }

    /// Format with the offending source line and a pointer
    pub fn format_with_source(&self, source: &str) -> String {
        let mut output = String::new();
        output.push_str(&format!("Error at {}: {}\n", self.span.start, self.message()));

        let offset = self.span.start.offset.min(source.len());
        let line_start = source[..offset].rfind('\n').map(|n| n + 1).unwrap_or(0);
        let line_end = source[offset..]
            .find('\n')
            .map(|n| offset + n)
            .unwrap_or(source.len());

        output.push_str(&source[line_start..line_end]);
        output.push('\n');
        for _ in 0..self.span.start.column.saturating_sub(1) {
            output.push(' ');
        }
        let width = if self.span.end.line == self.span.start.line {
            (self.span.end.column.saturating_sub(self.span.start.column)).max(1)
        } else {
            1
        };
        output.push_str(&"^".repeat(width));
        output.push('\n');
        output
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error at line {}, column {}: {}",
            self.span.start.line,
            self.span.start.column,
            self.message()
        )
    }
}
