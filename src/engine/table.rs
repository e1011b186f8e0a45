//! Parse table
//!
//! The immutable output of the table builder. Rows are sparse and sorted
//! by symbol so lookups are binary searches and serialization is
//! deterministic.

use super::grammar::Assoc;
use super::symbol::{FieldId, SymbolId, TokenSet};
use serde::{Deserialize, Serialize};

/// Index of a parse state
pub type StateId = u32;

/// Index of a production
pub type ProductionId = u32;

/// Index of a lex mode
pub type LexModeId = u32;

/// A parse action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Consume the lookahead and enter `state`
    Shift {
        /// Target state
        state: StateId,
    },
    /// Replace the production's right-hand side by its left-hand side
    Reduce {
        /// Production to reduce
        production: ProductionId,
    },
    /// The start symbol is complete and the input is exhausted
    Accept,
}

/// The tokens the lexer may return in a state
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LexMode {
    /// DFA terminals accepted by the state, plus extras
    pub admissible: TokenSet,
    /// External tokens accepted by the state, plus external extras
    pub externals: TokenSet,
}

/// Per-production data needed at runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionInfo {
    /// Left-hand side
    pub lhs: SymbolId,
    /// Number of right-hand side symbols
    pub child_count: u16,
    /// Static precedence of the production
    pub precedence: i32,
    /// Associativity of the production
    pub associativity: Option<Assoc>,
    /// Dynamic precedence added to nodes built by this production
    pub dynamic_precedence: i32,
    /// Field of each right-hand side position
    pub fields: Vec<Option<FieldId>>,
}

/// A conflict kept as a multi-action entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    /// State holding the entry
    pub state: StateId,
    /// Lookahead terminal
    pub lookahead: SymbolId,
    /// Actions in preference order
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StateRow {
    pub actions: Vec<(SymbolId, Vec<Action>)>,
    pub gotos: Vec<(SymbolId, StateId)>,
    pub lex_mode: LexModeId,
}

/// The complete parse table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseTable {
    pub(crate) states: Vec<StateRow>,
    pub(crate) lex_modes: Vec<LexMode>,
    pub(crate) productions: Vec<ProductionInfo>,
    pub(crate) field_names: Vec<String>,
    pub(crate) conflicts: Vec<ConflictReport>,
}

impl ParseTable {
    /// Number of parse states
    #[inline]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Actions for a (state, lookahead) pair; empty means a syntax error
    pub fn actions(&self, state: StateId, symbol: SymbolId) -> &[Action] {
        let Some(row) = self.states.get(state as usize) else {
            return &[];
        };
        match row.actions.binary_search_by_key(&symbol, |(s, _)| *s) {
            Ok(i) => &row.actions[i].1,
            Err(_) => &[],
        }
    }

    /// Goto target for a nonterminal
    pub fn goto(&self, state: StateId, symbol: SymbolId) -> Option<StateId> {
        let row = self.states.get(state as usize)?;
        row.gotos
            .binary_search_by_key(&symbol, |(s, _)| *s)
            .ok()
            .map(|i| row.gotos[i].1)
    }

    /// Terminals with at least one action in a state, ascending
    pub fn expected_symbols(&self, state: StateId) -> impl Iterator<Item = SymbolId> + '_ {
        self.states
            .get(state as usize)
            .into_iter()
            .flat_map(|row| row.actions.iter().map(|(symbol, _)| *symbol))
    }

    /// Lex mode used when lexing in a state
    #[inline]
    pub fn lex_mode_id(&self, state: StateId) -> LexModeId {
        self.states
            .get(state as usize)
            .map(|row| row.lex_mode)
            .unwrap_or(0)
    }

    /// Lex mode by id
    #[inline]
    pub fn lex_mode(&self, id: LexModeId) -> Option<&LexMode> {
        self.lex_modes.get(id as usize)
    }

    /// Number of distinct lex modes
    #[inline]
    pub fn lex_mode_count(&self) -> usize {
        self.lex_modes.len()
    }

    /// Production metadata
    #[inline]
    pub fn production(&self, id: ProductionId) -> Option<&ProductionInfo> {
        self.productions.get(id as usize)
    }

    /// Number of productions, including the augmented start production
    #[inline]
    pub fn production_count(&self) -> usize {
        self.productions.len()
    }

    /// Conflicts kept for GLR exploration
    #[inline]
    pub fn conflicts(&self) -> &[ConflictReport] {
        &self.conflicts
    }

    /// Field name by id
    #[inline]
    pub fn field_name(&self, id: FieldId) -> Option<&str> {
        self.field_names.get(id as usize).map(String::as_str)
    }

    /// Field id by name
    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.field_names
            .iter()
            .position(|f| f == name)
            .map(|i| i as FieldId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ParseTable {
        ParseTable {
            states: vec![StateRow {
                actions: vec![
                    (SymbolId(1), vec![Action::Shift { state: 1 }]),
                    (
                        SymbolId(3),
                        vec![
                            Action::Shift { state: 2 },
                            Action::Reduce { production: 1 },
                        ],
                    ),
                ],
                gotos: vec![(SymbolId(5), 4)],
                lex_mode: 0,
            }],
            lex_modes: vec![LexMode::default()],
            productions: Vec::new(),
            field_names: vec!["left".into()],
            conflicts: Vec::new(),
        }
    }

    #[test]
    fn test_sparse_lookups() {
        let table = table();
        assert_eq!(table.actions(0, SymbolId(1)), &[Action::Shift { state: 1 }]);
        assert_eq!(table.actions(0, SymbolId(3)).len(), 2);
        assert!(table.actions(0, SymbolId(2)).is_empty());
        assert!(table.actions(9, SymbolId(1)).is_empty());
        assert_eq!(table.goto(0, SymbolId(5)), Some(4));
        assert_eq!(table.goto(0, SymbolId(6)), None);
        assert_eq!(
            table.expected_symbols(0).collect::<Vec<_>>(),
            vec![SymbolId(1), SymbolId(3)]
        );
        assert_eq!(table.field_id("left"), Some(0));
        assert_eq!(table.field_name(0), Some("left"));
    }
}
