//! Symbol identifiers, the symbol table, and terminal bit sets
//!
//! Every grammar symbol gets a dense [`SymbolId`]. The layout is fixed:
//!
//! ```text
//! 0                 end of input
//! 1 ..= L           lexical terminals, in lexer declaration order
//! L+1 ..= L+E       external terminals
//! L+E+1 ..          nonterminals (augmented start first, then rules, then auxiliaries)
//! u16::MAX          ERROR (never stored in the table)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense identifier of a grammar symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u16);

impl SymbolId {
    /// End of input
    pub const END: SymbolId = SymbolId(0);
    /// Error nodes synthesized during recovery
    pub const ERROR: SymbolId = SymbolId(u16::MAX);

    /// Index into symbol-indexed tables
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a named field
pub type FieldId = u16;

/// Classification of a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    /// The end-of-input marker
    End,
    /// A terminal recognized by the lexical DFA
    Terminal,
    /// A terminal produced by an external scanner
    External,
    /// A rule defined in the grammar
    Nonterminal,
    /// A rule synthesized while lowering repetitions, or the augmented start
    Auxiliary,
}

/// Metadata attached to a symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Display name (rule name, or literal text for anonymous literals)
    pub name: String,
    /// Kind of symbol
    pub kind: SymbolKind,
    /// Named symbols come from named rules; anonymous ones from literals
    pub named: bool,
    /// Visible symbols appear in the public tree view
    pub visible: bool,
    /// Extras may appear between any two tokens
    pub extra: bool,
}

/// Table of all symbols of a language
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: Vec<SymbolInfo>,
    lexical_count: usize,
    external_count: usize,
}

impl SymbolTable {
    pub(crate) fn new(symbols: Vec<SymbolInfo>, lexical_count: usize, external_count: usize) -> Self {
        Self {
            symbols,
            lexical_count,
            external_count,
        }
    }

    /// Number of symbols, excluding ERROR
    #[inline]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// True if the table holds no symbols
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Number of terminals including END and externals
    #[inline]
    pub fn terminal_count(&self) -> usize {
        1 + self.lexical_count + self.external_count
    }

    /// Number of DFA-lexed terminals, excluding END
    #[inline]
    pub fn lexical_count(&self) -> usize {
        self.lexical_count
    }

    /// Number of externally scanned terminals
    #[inline]
    pub fn external_count(&self) -> usize {
        self.external_count
    }

    /// True if the symbol is END, a lexical or an external terminal
    #[inline]
    pub fn is_terminal(&self, symbol: SymbolId) -> bool {
        symbol != SymbolId::ERROR && symbol.index() < self.terminal_count()
    }

    /// True if the symbol is produced by the external scanner
    #[inline]
    pub fn is_external(&self, symbol: SymbolId) -> bool {
        let i = symbol.index();
        symbol != SymbolId::ERROR && i > self.lexical_count && i < self.terminal_count()
    }

    /// Index of an external symbol in the scanner's valid-token array
    #[inline]
    pub fn external_index(&self, symbol: SymbolId) -> Option<usize> {
        self.is_external(symbol)
            .then(|| symbol.index() - 1 - self.lexical_count)
    }

    /// Symbol of the external token with the given scanner index
    #[inline]
    pub fn external_symbol(&self, index: usize) -> Option<SymbolId> {
        (index < self.external_count).then(|| SymbolId((1 + self.lexical_count + index) as u16))
    }

    /// Metadata of a symbol
    #[inline]
    pub fn info(&self, symbol: SymbolId) -> Option<&SymbolInfo> {
        self.symbols.get(symbol.index())
    }

    /// Display name of a symbol
    pub fn name(&self, symbol: SymbolId) -> &str {
        if symbol == SymbolId::ERROR {
            return "ERROR";
        }
        self.symbols
            .get(symbol.index())
            .map(|info| info.name.as_str())
            .unwrap_or("?")
    }

    /// True if nodes of this symbol are named
    pub fn is_named(&self, symbol: SymbolId) -> bool {
        symbol == SymbolId::ERROR || self.info(symbol).is_some_and(|info| info.named)
    }

    /// True if nodes of this symbol appear in the public tree view
    pub fn is_visible(&self, symbol: SymbolId) -> bool {
        symbol == SymbolId::ERROR || self.info(symbol).is_some_and(|info| info.visible)
    }

    /// True if the symbol is declared as an extra
    pub fn is_extra(&self, symbol: SymbolId) -> bool {
        self.info(symbol).is_some_and(|info| info.extra)
    }

    /// Look up a symbol by name. `named` distinguishes a rule from a literal of the same text.
    pub fn lookup(&self, name: &str, named: bool) -> Option<SymbolId> {
        if named && name == "ERROR" {
            return Some(SymbolId::ERROR);
        }
        self.symbols
            .iter()
            .position(|info| info.name == name && info.named == named && info.visible)
            .or_else(|| {
                self.symbols
                    .iter()
                    .position(|info| info.name == name && info.named == named)
            })
            .map(|i| SymbolId(i as u16))
    }

    /// Iterate over all symbol ids
    pub fn ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        (0..self.symbols.len()).map(|i| SymbolId(i as u16))
    }
}

// ============================================================================
// Terminal sets
// ============================================================================

/// Bit set over terminal symbols
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenSet {
    words: Vec<u64>,
}

impl TokenSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set containing a single terminal
    pub fn singleton(symbol: SymbolId) -> Self {
        let mut set = Self::new();
        set.insert(symbol);
        set
    }

    /// Insert a terminal; returns true if it was not present
    pub fn insert(&mut self, symbol: SymbolId) -> bool {
        let (word, bit) = (symbol.index() / 64, symbol.index() % 64);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let mask = 1u64 << bit;
        let added = self.words[word] & mask == 0;
        self.words[word] |= mask;
        added
    }

    /// Test membership
    #[inline]
    pub fn contains(&self, symbol: SymbolId) -> bool {
        let (word, bit) = (symbol.index() / 64, symbol.index() % 64);
        self.words.get(word).is_some_and(|w| w & (1u64 << bit) != 0)
    }

    /// Add every member of `other`; returns true if the set grew
    pub fn union_with(&mut self, other: &TokenSet) -> bool {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        let mut changed = false;
        for (mine, theirs) in self.words.iter_mut().zip(&other.words) {
            let merged = *mine | *theirs;
            changed |= merged != *mine;
            *mine = merged;
        }
        changed
    }

    /// True if no terminal is present
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of terminals present
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate members in ascending order
    pub fn iter(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..64)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| SymbolId((i * 64 + bit) as u16))
        })
    }
}

impl FromIterator<SymbolId> for TokenSet {
    fn from_iter<I: IntoIterator<Item = SymbolId>>(iter: I) -> Self {
        let mut set = TokenSet::new();
        for symbol in iter {
            set.insert(symbol);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, kind: SymbolKind, named: bool) -> SymbolInfo {
        SymbolInfo {
            name: name.to_string(),
            kind,
            named,
            visible: true,
            extra: false,
        }
    }

    #[test]
    fn test_token_set_insert_and_union() {
        let mut a = TokenSet::new();
        assert!(a.insert(SymbolId(3)));
        assert!(!a.insert(SymbolId(3)));
        assert!(a.insert(SymbolId(70)));

        let b: TokenSet = [SymbolId(1), SymbolId(3)].into_iter().collect();
        assert!(a.union_with(&b));
        assert!(!a.union_with(&b));
        assert_eq!(
            a.iter().collect::<Vec<_>>(),
            vec![SymbolId(1), SymbolId(3), SymbolId(70)]
        );
        assert_eq!(a.len(), 3);
        assert!(!a.contains(SymbolId(2)));
    }

    #[test]
    fn test_symbol_table_layout() {
        let table = SymbolTable::new(
            vec![
                info("end", SymbolKind::End, false),
                info("+", SymbolKind::Terminal, false),
                info("number", SymbolKind::Terminal, true),
                info("indent", SymbolKind::External, true),
                info("expr", SymbolKind::Nonterminal, true),
            ],
            2,
            1,
        );
        assert_eq!(table.terminal_count(), 4);
        assert!(table.is_terminal(SymbolId(3)));
        assert!(!table.is_terminal(SymbolId(4)));
        assert!(table.is_external(SymbolId(3)));
        assert_eq!(table.external_index(SymbolId(3)), Some(0));
        assert_eq!(table.external_symbol(0), Some(SymbolId(3)));
        assert_eq!(table.lookup("+", false), Some(SymbolId(1)));
        assert_eq!(table.lookup("expr", true), Some(SymbolId(4)));
        assert_eq!(table.name(SymbolId::ERROR), "ERROR");
    }
}
