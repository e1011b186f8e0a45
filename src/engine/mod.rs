//! The Tessera parsing engine
//!
//! Grammars are compiled once into an immutable [`Language`] (symbol table,
//! LR(1) parse table, DFA lex table) and then parsed any number of times by
//! a generalized LR [`Parser`] that forks on conflicts, recovers from
//! syntax errors, and reuses unchanged subtrees after edits.
//!
//! # Module Organization
//!
//! ## Grammar Definition
//! - [`grammar`] - Rule language and grammar type
//! - [`grammar_dsl`] - Builder DSL for writing grammars in Rust
//! - [`grammar_analysis`] - Warnings found while building tables
//!
//! ## Table Construction
//! - [`symbol`] - Symbol ids, symbol table, terminal sets
//! - [`table`] - Parse table with multi-action conflict entries
//! - [`lexer`] - DFA lex table and context-aware lexer
//! - [`external`] - External scanner hook
//! - [`language`] - The compiled, versioned language
//!
//! ## Parsing
//! - [`parser`] - GLR engine and parser configuration
//! - [`tree`] - Persistent syntax trees, nodes and cursors
//! - [`incremental`] - Edits, edit maps and reuse statistics
//! - [`parallel`] - Batch parsing on a thread pool
//!
//! ## Diagnostics
//! - [`error`] - Grammar, language and parse errors
//! - [`source_location`] - Line/column tracking
//! - [`debug`] - Tree and table printers

// ============================================================================
// Module Declarations
// ============================================================================

pub mod debug;
pub mod error;
pub mod external;
pub mod grammar;
pub mod grammar_analysis;
pub mod grammar_dsl;
pub mod incremental;
pub mod language;
pub mod lexer;
pub mod parser;
pub mod source_location;
pub mod symbol;
pub mod table;
pub mod tree;

mod item_sets;
mod prepare_grammar;
mod recovery;
mod stack;
mod table_builder;

// Parallel parsing (always available, uses rayon when feature is enabled)
pub mod parallel;

// ============================================================================
// Core Types
// ============================================================================

pub use language::{language_version, Language, LANGUAGE_VERSION, MIN_COMPATIBLE_LANGUAGE_VERSION};
pub use parser::{Parser, ParserConfig};
pub use tree::{SyntaxNode, Tree, TreeCursor};

// ============================================================================
// Grammar Definition
// ============================================================================

pub use grammar::{Assoc, Grammar, Rule, RuleDef};
pub use grammar_analysis::{GrammarAnalyzer, GrammarWarning, WarningKind};
pub use grammar_dsl::GrammarBuilder;

// ============================================================================
// Tables
// ============================================================================

pub use symbol::{FieldId, SymbolId, SymbolInfo, SymbolKind, SymbolTable, TokenSet};
pub use table::{Action, ConflictReport, LexMode, ParseTable, ProductionInfo};

// ============================================================================
// Lexing
// ============================================================================

pub use external::{ExternalScanner, ScanCursor, ScannerState};
pub use lexer::{LexOutcome, LexTable, Lexer, TerminalPattern, Token};

// ============================================================================
// Error Handling
// ============================================================================

pub use error::{AbortReason, GrammarError, LanguageError, ParseError, SyntaxError, SyntaxErrorKind};

// ============================================================================
// Incremental Parsing
// ============================================================================

pub use incremental::{DirtyRegion, DirtyRegionTracker, Edit, EditMap, ReuseStats};

// ============================================================================
// Source Location
// ============================================================================

pub use source_location::{SourcePosition, SourceSpan};

// ============================================================================
// Debug Tools
// ============================================================================

pub use debug::{TablePrinter, TreePrinter};

// ============================================================================
// Parallel Parsing
// ============================================================================

pub use parallel::{parse_batch_parallel, parse_batch_with_config, ParallelConfig};
