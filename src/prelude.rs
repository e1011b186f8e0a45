//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and functions from
//! tessera. Importing this module with a wildcard import brings the core
//! types into scope:
//!
//! ```
//! use tessera::prelude::*;
//! ```
//!
//! # Re-exported Items
//!
//! ## Core Types
//! - [`Language`] - A compiled grammar, ready to parse
//! - [`Parser`] - The GLR parser
//! - [`ParserConfig`] - Version, size and budget limits
//! - [`Tree`], [`SyntaxNode`], [`TreeCursor`] - Parse results
//!
//! ## Grammar DSL
//! - [`GrammarBuilder`] - Builder for constructing grammars
//! - [`str()`], [`re()`], [`sym()`], [`seq()`], [`choice()`] - Rule constructors
//! - [`prec_left()`], [`prec_right()`], [`prec_dynamic()`], [`field()`] - Rule modifiers
//! - [`RuleExt`] - Extension trait for rule combinators
//!
//! ## Incremental Parsing
//! - [`Edit`] - A text change
//! - [`ReuseStats`] - Reuse counters of an incremental parse
//!
//! ## Error Handling
//! - [`GrammarError`] - Grammar build failure
//! - [`ParseError`] - Parse failure
//! - [`SyntaxError`] - Diagnostic extracted from a tree

// Core types
pub use crate::engine::{Language, Parser, ParserConfig, SyntaxNode, Tree, TreeCursor};

// Grammar definition
pub use crate::engine::grammar::{Assoc, Grammar, Rule};
pub use crate::engine::grammar_dsl::{
    blank, choice, comma_sep, field, optional, prec, prec_dynamic, prec_left, prec_right, re,
    repeat, repeat1, sep_by, sep_by1, seq, str, sym, token, GrammarBuilder, RuleExt,
};

// External scanners
pub use crate::engine::external::{ExternalScanner, ScanCursor, ScannerState};

// Incremental parsing
pub use crate::engine::incremental::{DirtyRegion, Edit, ReuseStats};

// Error handling
pub use crate::engine::error::{
    AbortReason, GrammarError, LanguageError, ParseError, SyntaxError, SyntaxErrorKind,
};

// Debug tools
pub use crate::engine::debug::{TablePrinter, TreePrinter};
