//! Grammar analysis
//!
//! Validation passes run before and after lowering:
//!
//! - undefined references, duplicate names, malformed tokens
//! - rules unreachable from the start rule, extras and externals
//! - cyclic derivations (`A =>+ A` without consuming input)
//!
//! Also computes the nullable and FIRST sets used by the automaton builder,
//! and defines the non-fatal [`GrammarWarning`]s reported with a language.

use super::error::GrammarError;
use super::grammar::{Grammar, Rule};
use super::prepare_grammar::PreparedGrammar;
use super::symbol::{SymbolId, TokenSet};
use hashbrown::{HashMap, HashSet};

/// Kind of grammar warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// A conflict survived precedence resolution and will be explored by GLR
    UnresolvedConflict,

    /// An unresolved conflict involves rules not listed in any conflict declaration
    UndeclaredConflict,
}

impl std::fmt::Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnresolvedConflict => write!(f, "unresolved conflict"),
            Self::UndeclaredConflict => write!(f, "undeclared conflict"),
        }
    }
}

/// A non-fatal grammar diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarWarning {
    /// The kind of warning
    pub kind: WarningKind,
    /// Parse state where the warning was detected
    pub state: u32,
    /// Human-readable message
    pub message: String,
    /// Rules involved
    pub related_rules: Vec<String>,
}

impl GrammarWarning {
    /// Create a new warning
    pub fn new(kind: WarningKind, state: u32, message: impl Into<String>) -> Self {
        Self {
            kind,
            state,
            message: message.into(),
            related_rules: Vec::new(),
        }
    }

    /// Add related rules to the warning
    pub fn with_related(mut self, rules: Vec<String>) -> Self {
        self.related_rules = rules;
        self
    }
}

impl std::fmt::Display for GrammarWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[state {}] {}: {}", self.state, self.kind, self.message)?;
        if !self.related_rules.is_empty() {
            write!(f, " (rules: {})", self.related_rules.join(", "))?;
        }
        Ok(())
    }
}

/// Validator for the declarative grammar, run before lowering
pub struct GrammarAnalyzer<'a> {
    grammar: &'a Grammar,
}

impl<'a> GrammarAnalyzer<'a> {
    /// Create a new analyzer for the given grammar
    pub fn new(grammar: &'a Grammar) -> Self {
        Self { grammar }
    }

    /// Run every structural check, returning the first error found
    pub fn validate(&self) -> Result<(), GrammarError> {
        if self.grammar.rules.is_empty() {
            return Err(GrammarError::NoRules);
        }
        self.check_duplicates()?;
        self.check_references()?;
        self.check_conflict_declarations()?;
        self.check_reachability()
    }

    fn check_duplicates(&self) -> Result<(), GrammarError> {
        let mut seen = HashSet::new();
        let names = self
            .grammar
            .rules
            .iter()
            .map(|def| def.name.as_str())
            .chain(self.grammar.externals.iter().map(String::as_str));
        for name in names {
            if !seen.insert(name) {
                return Err(GrammarError::DuplicateRule {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn is_defined(&self, name: &str) -> bool {
        self.grammar.rule(name).is_some() || self.grammar.externals.iter().any(|e| e == name)
    }

    fn check_references(&self) -> Result<(), GrammarError> {
        for def in &self.grammar.rules {
            let mut undefined = None;
            def.rule.for_each_symbol(&mut |name| {
                if undefined.is_none() && !self.is_defined(name) {
                    undefined = Some(name.to_string());
                }
            });
            if let Some(name) = undefined {
                return Err(GrammarError::UndefinedSymbol {
                    name,
                    rule: def.name.clone(),
                });
            }
        }
        for extra in &self.grammar.extras {
            if let Rule::Symbol { name } = extra {
                if !self.is_defined(name) {
                    return Err(GrammarError::UndefinedSymbol {
                        name: name.clone(),
                        rule: "extras".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_conflict_declarations(&self) -> Result<(), GrammarError> {
        for name in self.grammar.conflicts.iter().flatten() {
            if !self.is_defined(name) {
                return Err(GrammarError::UnknownConflictRule { name: name.clone() });
            }
        }
        Ok(())
    }

    /// Every rule must be reachable from the start rule, an extra, or an external
    fn check_reachability(&self) -> Result<(), GrammarError> {
        let mut reached: HashSet<&str> = HashSet::new();
        let mut worklist: Vec<&str> = Vec::new();

        if let Some(start) = self.grammar.start_rule() {
            worklist.push(&start.name);
        }
        for extra in &self.grammar.extras {
            extra.for_each_symbol(&mut |name| worklist.push(name));
        }
        worklist.extend(self.grammar.externals.iter().map(String::as_str));

        while let Some(name) = worklist.pop() {
            if !reached.insert(name) {
                continue;
            }
            if let Some(rule) = self.grammar.rule(name) {
                rule.for_each_symbol(&mut |next| {
                    if !reached.contains(next) {
                        worklist.push(next);
                    }
                });
            }
        }

        match self
            .grammar
            .rules
            .iter()
            .find(|def| !reached.contains(def.name.as_str()))
        {
            Some(def) => Err(GrammarError::UnreachableRule {
                name: def.name.clone(),
            }),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Nullable and FIRST sets
// ============================================================================

/// Nullable flags and FIRST sets for every symbol of a lowered grammar
#[derive(Debug, Clone)]
pub(crate) struct FirstSets {
    nullable: Vec<bool>,
    first: Vec<TokenSet>,
}

impl FirstSets {
    pub fn compute(grammar: &PreparedGrammar) -> Self {
        let count = grammar.symbols.len();
        let mut nullable = vec![false; count];
        let mut first = vec![TokenSet::new(); count];
        for symbol in grammar.symbols.ids() {
            if grammar.symbols.is_terminal(symbol) {
                first[symbol.index()].insert(symbol);
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for production in &grammar.productions {
                let lhs = production.lhs.index();
                let mut all_nullable = true;
                for step in &production.steps {
                    let rhs = step.symbol.index();
                    if rhs != lhs {
                        let rhs_first = first[rhs].clone();
                        changed |= first[lhs].union_with(&rhs_first);
                    }
                    if !nullable[rhs] {
                        all_nullable = false;
                        break;
                    }
                }
                if all_nullable && !nullable[lhs] {
                    nullable[lhs] = true;
                    changed = true;
                }
            }
        }

        Self { nullable, first }
    }

    #[inline]
    pub fn is_nullable(&self, symbol: SymbolId) -> bool {
        self.nullable.get(symbol.index()).copied().unwrap_or(false)
    }

    /// FIRST of `symbols` followed by any terminal of `follow`
    pub fn first_of_sequence(
        &self,
        symbols: impl IntoIterator<Item = SymbolId>,
        follow: &TokenSet,
    ) -> TokenSet {
        let mut result = TokenSet::new();
        for symbol in symbols {
            result.union_with(&self.first[symbol.index()]);
            if !self.is_nullable(symbol) {
                return result;
            }
        }
        result.union_with(follow);
        result
    }
}

/// Reject derivations `A =>+ A` that consume no input
pub(crate) fn check_cycles(grammar: &PreparedGrammar, first: &FirstSets) -> Result<(), GrammarError> {
    // edge A -> B when A -> alpha B beta with alpha and beta nullable
    let count = grammar.symbols.len();
    let mut edges: Vec<Vec<SymbolId>> = vec![Vec::new(); count];
    for production in &grammar.productions {
        for (i, step) in production.steps.iter().enumerate() {
            if !grammar.is_nonterminal(step.symbol) {
                continue;
            }
            let others_nullable = production
                .steps
                .iter()
                .enumerate()
                .all(|(j, other)| j == i || first.is_nullable(other.symbol));
            if others_nullable && !edges[production.lhs.index()].contains(&step.symbol) {
                edges[production.lhs.index()].push(step.symbol);
            }
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }
    let mut marks = vec![Mark::New; count];
    for root in grammar.symbols.ids() {
        if marks[root.index()] != Mark::New || edges[root.index()].is_empty() {
            continue;
        }
        // iterative depth-first search keeping the active path
        let mut path: Vec<(SymbolId, usize)> = vec![(root, 0)];
        marks[root.index()] = Mark::Active;
        while let Some((node, next)) = path.last().copied() {
            match edges[node.index()].get(next) {
                Some(&child) => {
                    if let Some(top) = path.last_mut() {
                        top.1 += 1;
                    }
                    match marks[child.index()] {
                        Mark::New => {
                            marks[child.index()] = Mark::Active;
                            path.push((child, 0));
                        }
                        Mark::Active => {
                            let begin = path.iter().position(|(s, _)| *s == child).unwrap_or(0);
                            let mut cycle: Vec<String> = path[begin..]
                                .iter()
                                .map(|(s, _)| grammar.symbols.name(*s).to_string())
                                .collect();
                            cycle.push(grammar.symbols.name(child).to_string());
                            return Err(GrammarError::LeftRecursionUnsupportedByStrategy {
                                rule: grammar.symbols.name(child).to_string(),
                                cycle,
                            });
                        }
                        Mark::Done => {}
                    }
                }
                None => {
                    marks[node.index()] = Mark::Done;
                    path.pop();
                }
            }
        }
    }
    Ok(())
}

/// Rules mentioned together in one of the grammar's conflict declarations
pub(crate) fn declared_conflict_index(grammar: &PreparedGrammar) -> HashMap<SymbolId, Vec<usize>> {
    let mut index: HashMap<SymbolId, Vec<usize>> = HashMap::new();
    for (i, set) in grammar.expected_conflicts.iter().enumerate() {
        for symbol in set {
            index.entry(*symbol).or_default().push(i);
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::grammar_dsl::*;
    use crate::engine::prepare_grammar::prepare;

    #[test]
    fn test_undefined_symbol() {
        let grammar = GrammarBuilder::new("g")
            .rule("expr", seq([sym("term"), str("+")]))
            .build();
        assert_eq!(
            GrammarAnalyzer::new(&grammar).validate(),
            Err(GrammarError::UndefinedSymbol {
                name: "term".into(),
                rule: "expr".into()
            })
        );
    }

    #[test]
    fn test_unreachable_rule() {
        let grammar = GrammarBuilder::new("g")
            .rule("start", str("a"))
            .rule("orphan", str("b"))
            .build();
        assert_eq!(
            GrammarAnalyzer::new(&grammar).validate(),
            Err(GrammarError::UnreachableRule {
                name: "orphan".into()
            })
        );
    }

    #[test]
    fn test_rules_reached_through_extras_are_reachable() {
        let grammar = GrammarBuilder::new("g")
            .rule("start", repeat1(str("a")))
            .rule("comment", re("#[^\n]*"))
            .extra(sym("comment"))
            .build();
        assert_eq!(GrammarAnalyzer::new(&grammar).validate(), Ok(()));
    }

    #[test]
    fn test_duplicate_rule() {
        let grammar = GrammarBuilder::new("g")
            .rule("start", str("a"))
            .rule("start", str("b"))
            .build();
        assert!(matches!(
            GrammarAnalyzer::new(&grammar).validate(),
            Err(GrammarError::DuplicateRule { .. })
        ));
    }

    #[test]
    fn test_first_sets_and_nullable() {
        let grammar = GrammarBuilder::new("g")
            .rule("start", seq([sym("opt"), str("b")]))
            .rule("opt", optional(str("a")))
            .build();
        let prepared = prepare(&grammar).unwrap();
        let first = FirstSets::compute(&prepared);
        let opt = prepared.symbols.lookup("opt", true).unwrap();
        let start = prepared.symbols.lookup("start", true).unwrap();
        let a = prepared.symbols.lookup("a", false).unwrap();
        let b = prepared.symbols.lookup("b", false).unwrap();
        assert!(first.is_nullable(opt));
        assert!(!first.is_nullable(start));
        let start_first = first.first_of_sequence([start], &TokenSet::new());
        assert!(start_first.contains(a));
        assert!(start_first.contains(b));
    }

    #[test]
    fn test_unit_cycle_is_rejected() {
        let grammar = GrammarBuilder::new("g")
            .rule("a", choice([sym("b"), str("x")]))
            .rule("b", choice([sym("a"), str("y")]))
            .build();
        let prepared = prepare(&grammar).unwrap();
        let first = FirstSets::compute(&prepared);
        match check_cycles(&prepared, &first) {
            Err(GrammarError::LeftRecursionUnsupportedByStrategy { cycle, .. }) => {
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.len() >= 3);
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_ordinary_left_recursion_is_accepted() {
        let grammar = GrammarBuilder::new("g")
            .rule("list", choice([seq([sym("list"), str(",")]), str("x")]))
            .build();
        let prepared = prepare(&grammar).unwrap();
        let first = FirstSets::compute(&prepared);
        assert_eq!(check_cycles(&prepared, &first), Ok(()));
    }
}
