//! Tessera - Incremental, Error-Tolerant GLR Parsing Engine
//!
//! Tessera compiles a declarative grammar into LR(1) parse tables and a DFA
//! lexer, then parses text with a generalized LR engine. It provides:
//! - A grammar DSL and JSON grammar format
//! - A table builder with precedence, associativity and declared conflicts
//! - A context-aware DFA lexer with an external scanner hook
//! - GLR parsing that keeps every viable interpretation of a conflict
//! - Error recovery that always produces a tree covering the whole input
//! - Incremental re-parsing that reuses unchanged subtrees after edits
//! - Budgets, timeouts and cancellation for long parses
//! - A bundled grammar for the Tessera language
//! - Developer tools (tree and table printers)
//!
//! ## Quick Start
//!
//! ```rust
//! use tessera::prelude::*;
//!
//! let language = GrammarBuilder::new("sum")
//!     .rule(
//!         "expr",
//!         choice([sym("number"), prec_left(1, seq([sym("expr"), str("+"), sym("expr")]))]),
//!     )
//!     .rule("number", re("[0-9]+"))
//!     .extra(re(r"\s+"))
//!     .build()
//!     .build()
//!     .unwrap();
//!
//! let tree = language.parse("1 + 2").unwrap();
//! assert_eq!(tree.root_node().to_sexp(), "(expr (expr (number)) (expr (number)))");
//! ```
//!
//! ## Incremental Parsing
//!
//! ```rust
//! use tessera::prelude::*;
//!
//! let mut parser = Parser::new();
//! parser.set_language(tessera::languages::tessera::language().unwrap());
//!
//! let old = parser.parse("i32 x := 1;").unwrap();
//! let tree = parser
//!     .parse_incremental(&old, &[Edit::replace(9, 1, 2)], "i32 x := 42;")
//!     .unwrap();
//! assert!(!tree.root_node().has_error());
//! ```
//!
//! ## Feature Flags
//!
//! - `parallel` - Parse batches of documents on a rayon thread pool
//! - `logging` - Enable debug logging using the `log` crate

// Lint configuration for production quality
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all)]
// Allow some pedantic lints that are too noisy
#![allow(clippy::module_inception)]
#![allow(clippy::too_many_arguments)]

// Logging macros that compile to nothing unless the `logging` feature is on
#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if false {
            let _ = format!($($arg)*);
        }
    };
}

#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        if false {
            let _ = format!($($arg)*);
        }
    };
}

#[cfg(feature = "logging")]
macro_rules! log_trace {
    ($($arg:tt)*) => { log::trace!($($arg)*) };
}

// Prelude module for convenient imports
pub mod prelude;

// Parsing engine: grammars, tables, lexer, GLR runtime, incremental reuse
pub mod engine;

// Bundled languages
pub mod languages;

/// Re-export commonly used types for convenience
pub use engine::{
    // Debug tools
    debug::{TablePrinter, TreePrinter},
    // Grammar DSL
    grammar_dsl::{
        blank, choice, comma_sep, field, optional, prec, prec_dynamic, prec_left, prec_right, re,
        repeat, repeat1, sep_by, sep_by1, seq, str, sym, token, GrammarBuilder,
    },
    // Incremental parsing
    incremental::{DirtyRegion, Edit, ReuseStats},
    // Versioning
    language::{language_version, LANGUAGE_VERSION},
    // Errors
    AbortReason,
    ExternalScanner,
    Grammar,
    GrammarError,
    Language,
    ParseError,
    Parser,
    ParserConfig,
    SyntaxError,
    SyntaxNode,
    Tree,
    TreeCursor,
};
