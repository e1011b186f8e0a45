//! Parse table construction
//!
//! Runs the whole build pipeline for a grammar:
//!
//! ```text
//! Grammar ──validate──> lower ──FIRST/nullable──> LALR(1) automaton
//!        ──actions + conflict resolution──> ParseTable ──> Language
//! ```
//!
//! Conflict resolution follows the usual precedence rules. The precedence
//! of a reduction is the precedence of the production's last step; the
//! precedence of a shift is the precedence of the step after the dot. The
//! higher one wins. On a tie, left associativity reduces, right
//! associativity shifts, and no associativity keeps both actions for the
//! GLR engine to explore.

use super::error::GrammarError;
use super::external::ExternalScanner;
use super::grammar::{Assoc, Grammar};
use super::grammar_analysis::{
    check_cycles, declared_conflict_index, FirstSets, GrammarAnalyzer, GrammarWarning, WarningKind,
};
use super::item_sets::{Automaton, AutomatonBuilder, Item};
use super::language::{Language, LanguageData, LANGUAGE_VERSION};
use super::lexer::{LexTable, TerminalPattern};
use super::prepare_grammar::{prepare, PreparedGrammar};
use super::symbol::{SymbolId, TokenSet};
use super::table::{
    Action, ConflictReport, LexMode, LexModeId, ParseTable, ProductionInfo, StateId, StateRow,
};
use hashbrown::HashMap;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

type FastMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// Compile a grammar into a [`Language`]
pub(crate) fn build_language(
    grammar: &Grammar,
    scanner: Option<Arc<dyn ExternalScanner>>,
) -> Result<Language, GrammarError> {
    GrammarAnalyzer::new(grammar).validate()?;
    let prepared = prepare(grammar)?;
    let first = FirstSets::compute(&prepared);
    check_cycles(&prepared, &first)?;

    let automaton = AutomatonBuilder::new(&prepared, &first).build();
    log_debug!(
        "grammar '{}': {} symbols, {} productions, {} states",
        prepared.name,
        prepared.symbols.len(),
        prepared.productions.len(),
        automaton.states.len()
    );

    let (table, warnings) = TableBuilder::new(&prepared, &automaton).build()?;
    for warning in &warnings {
        log_debug!("grammar '{}': {}", prepared.name, warning);
    }

    let lex = LexTable::new(
        prepared
            .terminals
            .iter()
            .map(|t| TerminalPattern {
                symbol: t.symbol,
                pattern: t.pattern.clone(),
            })
            .collect(),
    )?;

    Ok(Language::from_data(LanguageData {
        name: prepared.name.clone(),
        version: LANGUAGE_VERSION,
        symbols: prepared.symbols.clone(),
        table,
        lex,
        scanner,
        warnings,
    }))
}

/// Precedence and associativity of the items that would shift a terminal
#[derive(Debug, Clone, Copy)]
struct ShiftCandidate {
    target: StateId,
    precedence: i32,
    associativity: Option<Assoc>,
    production: usize,
}

struct TableBuilder<'a> {
    grammar: &'a PreparedGrammar,
    automaton: &'a Automaton,
    declared: HashMap<SymbolId, Vec<usize>>,
}

impl<'a> TableBuilder<'a> {
    fn new(grammar: &'a PreparedGrammar, automaton: &'a Automaton) -> Self {
        Self {
            grammar,
            automaton,
            declared: declared_conflict_index(grammar),
        }
    }

    fn build(&self) -> Result<(ParseTable, Vec<GrammarWarning>), GrammarError> {
        let mut states = Vec::with_capacity(self.automaton.states.len());
        let mut lex_modes: Vec<LexMode> = Vec::new();
        let mut lex_mode_ids: FastMap<LexMode, LexModeId> = FastMap::default();
        let mut conflicts = Vec::new();
        let mut warnings = Vec::new();

        for (index, item_set) in self.automaton.states.iter().enumerate() {
            let state = index as StateId;
            let mut shifts: BTreeMap<SymbolId, ShiftCandidate> = BTreeMap::new();
            let mut reduces: BTreeMap<SymbolId, Vec<usize>> = BTreeMap::new();
            let mut accept = false;
            let mut gotos = Vec::new();

            for (item, lookahead) in &item_set.closure {
                let production = &self.grammar.productions[item.production as usize];
                match production.steps.get(item.dot as usize) {
                    Some(step) => {
                        if !self.grammar.symbols.is_terminal(step.symbol) {
                            continue;
                        }
                        let Some(&target) = item_set.transitions.get(&step.symbol) else {
                            continue;
                        };
                        let candidate = ShiftCandidate {
                            target: target as StateId,
                            precedence: step.precedence,
                            associativity: step.associativity,
                            production: item.production as usize,
                        };
                        shifts
                            .entry(step.symbol)
                            .and_modify(|existing| {
                                if candidate.precedence > existing.precedence
                                    || (candidate.precedence == existing.precedence
                                        && existing.associativity.is_none())
                                {
                                    *existing = candidate;
                                }
                            })
                            .or_insert(candidate);
                    }
                    None if item.production == 0 => accept = true,
                    None => {
                        for symbol in lookahead.iter() {
                            let entry = reduces.entry(symbol).or_default();
                            if !entry.contains(&(item.production as usize)) {
                                entry.push(item.production as usize);
                            }
                        }
                    }
                }
            }

            for (&symbol, &target) in &item_set.transitions {
                if !self.grammar.symbols.is_terminal(symbol) {
                    gotos.push((symbol, target as StateId));
                }
            }

            let mut lookaheads: Vec<SymbolId> = shifts.keys().chain(reduces.keys()).copied().collect();
            if accept {
                lookaheads.push(SymbolId::END);
            }
            lookaheads.sort();
            lookaheads.dedup();

            let mut actions = Vec::with_capacity(lookaheads.len());
            for lookahead in lookaheads {
                let shift = shifts.get(&lookahead).copied();
                let candidates = reduces.get(&lookahead).cloned().unwrap_or_default();
                let is_accept = accept && lookahead == SymbolId::END;
                let entry = self.resolve(lookahead, shift, candidates, is_accept)?;
                if entry.len() > 1 {
                    warnings.push(self.conflict_warning(state, lookahead, &entry, item_set_items(&item_set.closure)));
                    conflicts.push(ConflictReport {
                        state,
                        lookahead,
                        actions: entry.clone(),
                    });
                }
                if !entry.is_empty() {
                    actions.push((lookahead, entry));
                }
            }

            let mode = self.lex_mode_for(&actions);
            let lex_mode = match lex_mode_ids.get(&mode) {
                Some(&id) => id,
                None => {
                    let id = lex_modes.len() as LexModeId;
                    lex_mode_ids.insert(mode.clone(), id);
                    lex_modes.push(mode);
                    id
                }
            };

            states.push(StateRow {
                actions,
                gotos,
                lex_mode,
            });
        }

        let productions = self
            .grammar
            .productions
            .iter()
            .map(|p| ProductionInfo {
                lhs: p.lhs,
                child_count: p.steps.len() as u16,
                precedence: p.precedence,
                associativity: p.associativity,
                dynamic_precedence: p.dynamic_precedence,
                fields: p.steps.iter().map(|s| s.field).collect(),
            })
            .collect();

        Ok((
            ParseTable {
                states,
                lex_modes,
                productions,
                field_names: self.grammar.field_names.clone(),
                conflicts,
            },
            warnings,
        ))
    }

    /// Resolve the candidate actions of one (state, lookahead) entry
    fn resolve(
        &self,
        lookahead: SymbolId,
        shift: Option<ShiftCandidate>,
        mut reduces: Vec<usize>,
        accept: bool,
    ) -> Result<Vec<Action>, GrammarError> {
        // reduce/reduce: only the highest precedence survives
        if reduces.len() > 1 {
            let best = reduces
                .iter()
                .map(|&p| self.grammar.productions[p].precedence)
                .max()
                .unwrap_or(0);
            reduces.retain(|&p| self.grammar.productions[p].precedence == best);
        }

        let mut keep_shift = shift.is_some();
        if let Some(shift) = shift {
            let mut kept = Vec::with_capacity(reduces.len());
            for &p in &reduces {
                let production = &self.grammar.productions[p];
                match production.precedence.cmp(&shift.precedence) {
                    Ordering::Greater => {
                        keep_shift = false;
                        kept.push(p);
                    }
                    Ordering::Less => {}
                    Ordering::Equal => {
                        let associativity = match (production.associativity, shift.associativity) {
                            (Some(a), Some(b)) if a != b => {
                                return Err(GrammarError::AmbiguousPrecedence {
                                    reduce_rule: self.rule_name(production.lhs),
                                    shift_rule: self
                                        .rule_name(self.grammar.productions[shift.production].lhs),
                                    precedence: production.precedence,
                                    lookahead: self.grammar.symbols.name(lookahead).to_string(),
                                })
                            }
                            (a, b) => a.or(b),
                        };
                        match associativity {
                            Some(Assoc::Left) => {
                                keep_shift = false;
                                kept.push(p);
                            }
                            Some(Assoc::Right) => {}
                            None => kept.push(p),
                        }
                    }
                }
            }
            reduces = kept;
        }

        let mut entry = Vec::with_capacity(reduces.len() + 1);
        if accept {
            entry.push(Action::Accept);
        }
        if keep_shift {
            if let Some(shift) = shift {
                entry.push(Action::Shift {
                    state: shift.target,
                });
            }
        }
        reduces.sort_unstable();
        entry.extend(reduces.into_iter().map(|p| Action::Reduce {
            production: p as u32,
        }));
        Ok(entry)
    }

    fn lex_mode_for(&self, actions: &[(SymbolId, Vec<Action>)]) -> LexMode {
        let symbols = &self.grammar.symbols;
        let mut admissible = TokenSet::new();
        let mut externals = TokenSet::new();
        for (symbol, _) in actions {
            if symbols.is_external(*symbol) {
                externals.insert(*symbol);
            } else if *symbol != SymbolId::END {
                admissible.insert(*symbol);
            }
        }
        for symbol in symbols.ids() {
            if symbols.is_extra(symbol) {
                if symbols.is_external(symbol) {
                    externals.insert(symbol);
                } else if symbols.is_terminal(symbol) {
                    admissible.insert(symbol);
                }
            }
        }
        LexMode {
            admissible,
            externals,
        }
    }

    /// The user-facing rule owning a symbol (auxiliary rules map to their owner)
    fn owner(&self, symbol: SymbolId) -> SymbolId {
        let name = self.grammar.symbols.name(symbol);
        match name.rsplit_once("_repeat") {
            Some((owner, suffix)) if suffix.chars().all(|c| c.is_ascii_digit()) => self
                .grammar
                .symbols
                .lookup(owner, true)
                .or_else(|| self.grammar.symbols.lookup(owner, false))
                .unwrap_or(symbol),
            _ => symbol,
        }
    }

    fn rule_name(&self, symbol: SymbolId) -> String {
        self.grammar.symbols.name(self.owner(symbol)).to_string()
    }

    fn conflict_warning(
        &self,
        state: StateId,
        lookahead: SymbolId,
        entry: &[Action],
        shift_items: Vec<Item>,
    ) -> GrammarWarning {
        let mut involved: Vec<SymbolId> = Vec::new();
        for action in entry {
            match action {
                Action::Reduce { production } => {
                    involved.push(self.owner(self.grammar.productions[*production as usize].lhs))
                }
                Action::Shift { .. } => {
                    for item in &shift_items {
                        let production = &self.grammar.productions[item.production as usize];
                        if production.steps.get(item.dot as usize).map(|s| s.symbol) == Some(lookahead) {
                            involved.push(self.owner(production.lhs));
                        }
                    }
                }
                Action::Accept => {}
            }
        }
        involved.sort();
        involved.dedup();

        let declared = self.grammar.expected_conflicts.iter().enumerate().any(|(i, _)| {
            involved
                .iter()
                .all(|s| self.declared.get(s).is_some_and(|sets| sets.contains(&i)))
        });
        let names: Vec<String> = involved
            .iter()
            .map(|s| self.grammar.symbols.name(*s).to_string())
            .collect();
        let (kind, message) = if declared {
            (
                WarningKind::UnresolvedConflict,
                format!(
                    "expected conflict on '{}' kept for runtime exploration",
                    self.grammar.symbols.name(lookahead)
                ),
            )
        } else {
            (
                WarningKind::UndeclaredConflict,
                format!(
                    "conflict on '{}' is not listed in the grammar's conflicts",
                    self.grammar.symbols.name(lookahead)
                ),
            )
        };
        GrammarWarning::new(kind, state, message).with_related(names)
    }
}

fn item_set_items(closure: &[(Item, TokenSet)]) -> Vec<Item> {
    closure.iter().map(|(item, _)| *item).collect()
}
