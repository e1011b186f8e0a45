//! Compiled languages
//!
//! A [`Language`] bundles everything the runtime needs: the symbol table,
//! the parse table, the lexical DFA and an optional external scanner. It is
//! immutable and cheap to clone (one `Arc`), so a single language can be
//! shared by any number of parsers on any number of threads.
//!
//! Languages can be stored as JSON artifacts. Every artifact records the
//! [`LANGUAGE_VERSION`] it was built with; loading an artifact outside the
//! supported range fails before the tables are decoded.

use super::error::{LanguageError, ParseError};
use super::external::ExternalScanner;
use super::grammar_analysis::GrammarWarning;
use super::lexer::{LexTable, TerminalPattern};
use super::parser::Parser;
use super::symbol::{FieldId, SymbolId, SymbolTable};
use super::table::{ConflictReport, ParseTable};
use super::tree::Tree;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Version of the table format produced by this builder
pub const LANGUAGE_VERSION: u32 = 1;

/// Oldest table format this runtime can load
pub const MIN_COMPATIBLE_LANGUAGE_VERSION: u32 = 1;

/// The table format version produced by this crate
#[inline]
pub fn language_version() -> u32 {
    LANGUAGE_VERSION
}

pub(crate) struct LanguageData {
    pub name: String,
    pub version: u32,
    pub symbols: SymbolTable,
    pub table: ParseTable,
    pub lex: LexTable,
    pub scanner: Option<Arc<dyn ExternalScanner>>,
    pub warnings: Vec<GrammarWarning>,
}

/// A compiled grammar, ready to parse
#[derive(Clone)]
pub struct Language(Arc<LanguageData>);

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Language")
            .field("name", &self.0.name)
            .field("version", &self.0.version)
            .field("symbols", &self.0.symbols.len())
            .field("states", &self.0.table.state_count())
            .field("external_scanner", &self.0.scanner.is_some())
            .finish()
    }
}

#[derive(Serialize)]
struct ArtifactRef<'a> {
    version: u32,
    name: &'a str,
    symbols: &'a SymbolTable,
    table: &'a ParseTable,
    terminals: &'a [TerminalPattern],
}

#[derive(Deserialize)]
struct Artifact {
    version: u32,
    name: String,
    symbols: SymbolTable,
    table: ParseTable,
    terminals: Vec<TerminalPattern>,
}

#[derive(Deserialize)]
struct ArtifactHeader {
    version: u32,
}

impl Language {
    pub(crate) fn from_data(data: LanguageData) -> Self {
        Self(Arc::new(data))
    }

    /// Grammar name
    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Table format version
    #[inline]
    pub fn version(&self) -> u32 {
        self.0.version
    }

    /// Symbol table
    #[inline]
    pub fn symbols(&self) -> &SymbolTable {
        &self.0.symbols
    }

    /// Parse table
    #[inline]
    pub fn table(&self) -> &ParseTable {
        &self.0.table
    }

    /// Lexical table
    #[inline]
    pub fn lex_table(&self) -> &LexTable {
        &self.0.lex
    }

    /// External scanner, if attached
    #[inline]
    pub fn external_scanner(&self) -> Option<&dyn ExternalScanner> {
        self.0.scanner.as_deref()
    }

    /// Warnings reported while building
    #[inline]
    pub fn warnings(&self) -> &[GrammarWarning] {
        &self.0.warnings
    }

    /// Conflicts kept as multi-action entries
    #[inline]
    pub fn conflicts(&self) -> &[ConflictReport] {
        self.0.table.conflicts()
    }

    /// Number of symbols
    #[inline]
    pub fn symbol_count(&self) -> usize {
        self.0.symbols.len()
    }

    /// Name of a symbol
    #[inline]
    pub fn symbol_name(&self, symbol: SymbolId) -> &str {
        self.0.symbols.name(symbol)
    }

    /// Look up a symbol by name
    #[inline]
    pub fn symbol_for_name(&self, name: &str, named: bool) -> Option<SymbolId> {
        self.0.symbols.lookup(name, named)
    }

    /// Name of a field
    #[inline]
    pub fn field_name(&self, field: FieldId) -> Option<&str> {
        self.0.table.field_name(field)
    }

    /// Look up a field by name
    #[inline]
    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.0.table.field_id(name)
    }

    /// True if both handles refer to the same compiled language
    #[inline]
    pub fn same_as(&self, other: &Language) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A copy of this language with an external scanner attached
    ///
    /// The copy is a distinct language: trees produced with one are not
    /// reused by incremental parses with the other.
    pub fn with_external_scanner(&self, scanner: Arc<dyn ExternalScanner>) -> Language {
        Language::from_data(LanguageData {
            name: self.0.name.clone(),
            version: self.0.version,
            symbols: self.0.symbols.clone(),
            table: self.0.table.clone(),
            lex: self.0.lex.clone(),
            scanner: Some(scanner),
            warnings: self.0.warnings.clone(),
        })
    }

    /// Parse text with a default-configured parser
    pub fn parse(&self, text: &str) -> Result<Tree, ParseError> {
        let mut parser = Parser::new();
        parser.set_language(self.clone());
        parser.parse(text)
    }

    /// Serialize to a JSON artifact
    pub fn to_json(&self) -> Result<String, LanguageError> {
        let artifact = ArtifactRef {
            version: self.0.version,
            name: &self.0.name,
            symbols: &self.0.symbols,
            table: &self.0.table,
            terminals: self.0.lex.patterns(),
        };
        Ok(serde_json::to_string(&artifact)?)
    }

    /// Load a JSON artifact
    ///
    /// The version is checked before the rest of the artifact is decoded.
    /// External scanners are not serialized; attach one with
    /// [`with_external_scanner`](Self::with_external_scanner).
    pub fn from_json(json: &str) -> Result<Language, LanguageError> {
        let header: ArtifactHeader = serde_json::from_str(json)?;
        if !(MIN_COMPATIBLE_LANGUAGE_VERSION..=LANGUAGE_VERSION).contains(&header.version) {
            return Err(LanguageError::IncompatibleGrammarVersion {
                found: header.version,
                min_supported: MIN_COMPATIBLE_LANGUAGE_VERSION,
                max_supported: LANGUAGE_VERSION,
            });
        }
        let artifact: Artifact = serde_json::from_str(json)?;
        let lex = LexTable::new(artifact.terminals).map_err(|err| LanguageError::Lexer {
            message: err.to_string(),
        })?;
        Ok(Language::from_data(LanguageData {
            name: artifact.name,
            version: artifact.version,
            symbols: artifact.symbols,
            table: artifact.table,
            lex,
            scanner: None,
            warnings: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::grammar_dsl::*;

    fn language() -> Language {
        GrammarBuilder::new("list")
            .rule("list", repeat1(sym("item")))
            .rule("item", re("[a-z]+"))
            .extra(re(r"\s+"))
            .build()
            .build()
            .unwrap()
    }

    #[test]
    fn test_language_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Language>();
    }

    #[test]
    fn test_json_round_trip_preserves_tables() {
        let language = language();
        let json = language.to_json().unwrap();
        let loaded = Language::from_json(&json).unwrap();
        assert_eq!(loaded.name(), "list");
        assert_eq!(loaded.version(), LANGUAGE_VERSION);
        assert_eq!(loaded.table(), language.table());
        assert_eq!(loaded.symbols(), language.symbols());
        assert!(!loaded.same_as(&language));
    }

    #[test]
    fn test_future_version_is_rejected() {
        let json = r#"{"version": 99, "name": "x"}"#;
        match Language::from_json(json) {
            Err(LanguageError::IncompatibleGrammarVersion {
                found,
                min_supported,
                max_supported,
            }) => {
                assert_eq!(found, 99);
                assert_eq!(min_supported, MIN_COMPATIBLE_LANGUAGE_VERSION);
                assert_eq!(max_supported, LANGUAGE_VERSION);
            }
            other => panic!("unexpected result: {:?}", other.map(|l| l.name().to_string())),
        }
    }

    #[test]
    fn test_lookup_helpers() {
        let language = language();
        let item = language.symbol_for_name("item", true).unwrap();
        assert_eq!(language.symbol_name(item), "item");
        assert_eq!(language_version(), LANGUAGE_VERSION);
    }
}
