//! Grammar lowering
//!
//! Turns the nested [`Rule`] trees of a [`Grammar`] into the flat form the
//! table builder works on:
//!
//! - literals, patterns and `token(...)` bodies become lexical terminals
//! - choices are expanded into separate productions
//! - repetitions become hidden left-recursive auxiliary rules
//! - precedence, associativity and field names are recorded per step

use super::error::GrammarError;
use super::grammar::{Assoc, Grammar, Rule};
use super::symbol::{FieldId, SymbolId, SymbolInfo, SymbolKind, SymbolTable};
use hashbrown::HashMap;

/// One symbol of a production's right-hand side
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ProductionStep {
    pub symbol: SymbolId,
    pub precedence: i32,
    pub associativity: Option<Assoc>,
    pub field: Option<FieldId>,
}

/// A flat production `lhs -> steps`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Production {
    pub lhs: SymbolId,
    pub steps: Vec<ProductionStep>,
    pub precedence: i32,
    pub associativity: Option<Assoc>,
    pub dynamic_precedence: i32,
}

/// A terminal recognized by the lexical DFA
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TerminalDef {
    pub symbol: SymbolId,
    pub pattern: String,
    pub is_literal: bool,
}

/// The lowered grammar
#[derive(Debug, Clone)]
pub(crate) struct PreparedGrammar {
    pub name: String,
    pub symbols: SymbolTable,
    /// Production 0 is `augmented_start -> start`
    pub productions: Vec<Production>,
    /// Production ids indexed by lhs symbol
    pub productions_by_lhs: Vec<Vec<usize>>,
    /// Lexical terminals; entry `i` is `SymbolId(i + 1)`
    pub terminals: Vec<TerminalDef>,
    pub field_names: Vec<String>,
    pub expected_conflicts: Vec<Vec<SymbolId>>,
}

impl PreparedGrammar {
    pub fn is_nonterminal(&self, symbol: SymbolId) -> bool {
        !self.symbols.is_terminal(symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TerminalKey {
    Literal(String),
    Pattern(String),
    Named(String),
}

struct PendingTerminal {
    key: TerminalKey,
    info: SymbolInfo,
    pattern: String,
    is_literal: bool,
}

#[derive(Clone)]
struct Alternative {
    steps: Vec<ProductionStep>,
    precedence: i32,
    associativity: Option<Assoc>,
    dynamic: i32,
}

#[derive(Clone, Copy)]
struct Context {
    precedence: i32,
    associativity: Option<Assoc>,
    field: Option<FieldId>,
}

impl Context {
    const ROOT: Context = Context {
        precedence: 0,
        associativity: None,
        field: None,
    };

    fn empty(&self) -> Alternative {
        Alternative {
            steps: Vec::new(),
            precedence: self.precedence,
            associativity: self.associativity,
            dynamic: 0,
        }
    }

    fn single(&self, symbol: SymbolId) -> Alternative {
        Alternative {
            steps: vec![ProductionStep {
                symbol,
                precedence: self.precedence,
                associativity: self.associativity,
                field: self.field,
            }],
            precedence: self.precedence,
            associativity: self.associativity,
            dynamic: 0,
        }
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('_')
}

/// Render a lexical rule as a regular expression
fn token_regex(rule: &Rule, owner: &str) -> Result<String, GrammarError> {
    Ok(match rule {
        Rule::Blank => String::new(),
        Rule::String { value } => regex::escape(value),
        Rule::Pattern { value } => format!("(?:{})", value),
        Rule::Seq { members } => members
            .iter()
            .map(|m| token_regex(m, owner))
            .collect::<Result<Vec<_>, _>>()?
            .concat(),
        Rule::Choice { members } => format!(
            "(?:{})",
            members
                .iter()
                .map(|m| token_regex(m, owner))
                .collect::<Result<Vec<_>, _>>()?
                .join("|")
        ),
        Rule::Repeat { content } => format!("(?:{})*", token_regex(content, owner)?),
        Rule::Repeat1 { content } => format!("(?:{})+", token_regex(content, owner)?),
        Rule::Prec { content, .. }
        | Rule::PrecDynamic { content, .. }
        | Rule::Field { content, .. }
        | Rule::Token { content } => token_regex(content, owner)?,
        Rule::Symbol { name } => {
            return Err(GrammarError::InvalidToken {
                rule: owner.to_string(),
                reason: format!("token contains a reference to '{}'", name),
            })
        }
    })
}

/// Reject patterns the regex engine cannot compile or that match empty input
fn check_token_pattern(pattern: &str, owner: &str) -> Result<(), GrammarError> {
    let anchored = format!("^(?:{})$", pattern);
    let regex = regex::Regex::new(&anchored).map_err(|err| GrammarError::InvalidPattern {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })?;
    if regex.is_match("") {
        return Err(GrammarError::InvalidToken {
            rule: owner.to_string(),
            reason: format!("pattern /{}/ matches the empty string", pattern),
        });
    }
    Ok(())
}

struct Lowering<'g> {
    grammar: &'g Grammar,
    rule_index: HashMap<&'g str, usize>,
    external_index: HashMap<&'g str, usize>,
    pending: Vec<PendingTerminal>,
    pending_index: HashMap<TerminalKey, usize>,
    anonymous_counter: HashMap<String, usize>,
}

impl<'g> Lowering<'g> {
    fn new(grammar: &'g Grammar) -> Self {
        Self {
            grammar,
            rule_index: grammar
                .rules
                .iter()
                .enumerate()
                .map(|(i, def)| (def.name.as_str(), i))
                .collect(),
            external_index: grammar
                .externals
                .iter()
                .enumerate()
                .map(|(i, name)| (name.as_str(), i))
                .collect(),
            pending: Vec::new(),
            pending_index: HashMap::new(),
            anonymous_counter: HashMap::new(),
        }
    }

    fn is_lexical_rule(&self, name: &str) -> bool {
        self.rule_index
            .get(name)
            .is_some_and(|&i| self.grammar.rules[i].rule.is_lexical())
    }

    fn register(&mut self, key: TerminalKey, info: SymbolInfo, pattern: String, is_literal: bool) {
        if self.pending_index.contains_key(&key) {
            return;
        }
        self.pending_index.insert(key.clone(), self.pending.len());
        self.pending.push(PendingTerminal {
            key,
            info,
            pattern,
            is_literal,
        });
    }

    fn anonymous_name(&mut self, owner: &str) -> String {
        let counter = self.anonymous_counter.entry(owner.to_string()).or_insert(0);
        *counter += 1;
        format!("{}_token{}", owner, counter)
    }

    fn register_literal(&mut self, value: &str, owner: &str) -> Result<(), GrammarError> {
        let key = TerminalKey::Literal(value.to_string());
        if self.pending_index.contains_key(&key) {
            return Ok(());
        }
        let pattern = regex::escape(value);
        check_token_pattern(&pattern, owner)?;
        let info = SymbolInfo {
            name: value.to_string(),
            kind: SymbolKind::Terminal,
            named: false,
            visible: true,
            extra: false,
        };
        self.register(key, info, pattern, true);
        Ok(())
    }

    fn register_pattern(&mut self, pattern: String, owner: &str) -> Result<(), GrammarError> {
        let key = TerminalKey::Pattern(pattern.clone());
        if self.pending_index.contains_key(&key) {
            return Ok(());
        }
        check_token_pattern(&pattern, owner)?;
        let info = SymbolInfo {
            name: self.anonymous_name(owner),
            kind: SymbolKind::Terminal,
            named: false,
            visible: false,
            extra: false,
        };
        self.register(key, info, pattern, false);
        Ok(())
    }

    /// Collect the anonymous terminals of a syntactic rule, in order of appearance
    fn collect_terminals(&mut self, rule: &Rule, owner: &str) -> Result<(), GrammarError> {
        match rule {
            Rule::String { value } => self.register_literal(value, owner)?,
            Rule::Pattern { value } => self.register_pattern(format!("(?:{})", value), owner)?,
            Rule::Token { content } => {
                let pattern = token_regex(content, owner)?;
                self.register_pattern(pattern, owner)?
            }
            Rule::Seq { members } | Rule::Choice { members } => {
                for member in members {
                    self.collect_terminals(member, owner)?;
                }
            }
            Rule::Repeat { content }
            | Rule::Repeat1 { content }
            | Rule::Prec { content, .. }
            | Rule::PrecDynamic { content, .. }
            | Rule::Field { content, .. } => self.collect_terminals(content, owner)?,
            Rule::Blank | Rule::Symbol { .. } => {}
        }
        Ok(())
    }

    fn register_named_token(&mut self, name: &str, body: &Rule) -> Result<(), GrammarError> {
        let pattern = token_regex(body, name)?;
        check_token_pattern(&pattern, name)?;
        let info = SymbolInfo {
            name: name.to_string(),
            kind: SymbolKind::Terminal,
            named: !is_hidden(name),
            visible: !is_hidden(name),
            extra: false,
        };
        let is_literal = matches!(body, Rule::String { .. });
        self.register(TerminalKey::Named(name.to_string()), info, pattern, is_literal);
        Ok(())
    }
}

struct Flattener<'a, 'g> {
    lowering: &'a Lowering<'g>,
    terminal_ids: &'a HashMap<TerminalKey, SymbolId>,
    rule_symbols: &'a [Option<SymbolId>],
    external_base: usize,
    symbols: &'a mut Vec<SymbolInfo>,
    productions: &'a mut Vec<Production>,
    field_names: &'a mut Vec<String>,
    owner: &'a str,
    repeat_counter: usize,
}

impl Flattener<'_, '_> {
    fn terminal(&self, key: &TerminalKey) -> SymbolId {
        // every key reaching here was registered by `collect_terminals`
        self.terminal_ids.get(key).copied().unwrap_or(SymbolId::END)
    }

    fn resolve(&self, name: &str) -> Result<SymbolId, GrammarError> {
        if let Some(&i) = self.lowering.external_index.get(name) {
            return Ok(SymbolId((self.external_base + i) as u16));
        }
        if self.lowering.is_lexical_rule(name) {
            return Ok(self.terminal(&TerminalKey::Named(name.to_string())));
        }
        self.lowering
            .rule_index
            .get(name)
            .and_then(|&i| self.rule_symbols[i])
            .ok_or_else(|| GrammarError::UndefinedSymbol {
                name: name.to_string(),
                rule: self.owner.to_string(),
            })
    }

    fn field_id(&mut self, name: &str) -> FieldId {
        match self.field_names.iter().position(|f| f == name) {
            Some(i) => i as FieldId,
            None => {
                self.field_names.push(name.to_string());
                (self.field_names.len() - 1) as FieldId
            }
        }
    }

    fn flatten(&mut self, rule: &Rule, ctx: Context) -> Result<Vec<Alternative>, GrammarError> {
        Ok(match rule {
            Rule::Blank => vec![ctx.empty()],
            Rule::String { value } => {
                vec![ctx.single(self.terminal(&TerminalKey::Literal(value.clone())))]
            }
            Rule::Pattern { value } => {
                let key = TerminalKey::Pattern(format!("(?:{})", value));
                vec![ctx.single(self.terminal(&key))]
            }
            Rule::Token { content } => {
                let key = TerminalKey::Pattern(token_regex(content, self.owner)?);
                vec![ctx.single(self.terminal(&key))]
            }
            Rule::Symbol { name } => vec![ctx.single(self.resolve(name)?)],
            Rule::Seq { members } => {
                let mut acc = vec![ctx.empty()];
                for member in members {
                    let tails = self.flatten(member, ctx)?;
                    let mut next = Vec::with_capacity(acc.len() * tails.len());
                    for head in &acc {
                        for tail in &tails {
                            let mut steps = head.steps.clone();
                            steps.extend(tail.steps.iter().cloned());
                            let dynamic = if tail.dynamic.abs() > head.dynamic.abs() {
                                tail.dynamic
                            } else {
                                head.dynamic
                            };
                            next.push(Alternative {
                                steps,
                                precedence: ctx.precedence,
                                associativity: ctx.associativity,
                                dynamic,
                            });
                        }
                    }
                    acc = next;
                }
                acc
            }
            Rule::Choice { members } => {
                let mut alternatives = Vec::new();
                for member in members {
                    alternatives.extend(self.flatten(member, ctx)?);
                }
                alternatives
            }
            Rule::Repeat { content } => {
                let aux = self.repeat_aux(content, ctx)?;
                vec![ctx.single(aux), ctx.empty()]
            }
            Rule::Repeat1 { content } => {
                let aux = self.repeat_aux(content, ctx)?;
                vec![ctx.single(aux)]
            }
            Rule::Prec {
                value,
                assoc,
                content,
            } => self.flatten(
                content,
                Context {
                    precedence: *value,
                    associativity: *assoc,
                    field: ctx.field,
                },
            )?,
            Rule::PrecDynamic { value, content } => {
                let mut alternatives = self.flatten(content, ctx)?;
                for alternative in &mut alternatives {
                    alternative.dynamic = *value;
                }
                alternatives
            }
            Rule::Field { name, content } => {
                let field = Some(self.field_id(name));
                self.flatten(content, Context { field, ..ctx })?
            }
        })
    }

    /// Create `aux -> aux content | content` and return `aux`
    fn repeat_aux(&mut self, content: &Rule, ctx: Context) -> Result<SymbolId, GrammarError> {
        self.repeat_counter += 1;
        let aux = SymbolId(self.symbols.len() as u16);
        self.symbols.push(SymbolInfo {
            name: format!("{}_repeat{}", self.owner, self.repeat_counter),
            kind: SymbolKind::Auxiliary,
            named: false,
            visible: false,
            extra: false,
        });
        let alternatives = self.flatten(content, ctx)?;
        let recursive = ProductionStep {
            symbol: aux,
            precedence: ctx.precedence,
            associativity: ctx.associativity,
            field: None,
        };
        for alternative in alternatives {
            let mut steps = vec![recursive.clone()];
            steps.extend(alternative.steps.iter().cloned());
            push_production(self.productions, aux, steps, &alternative);
            push_production(self.productions, aux, alternative.steps.clone(), &alternative);
        }
        Ok(aux)
    }
}

fn push_production(
    productions: &mut Vec<Production>,
    lhs: SymbolId,
    steps: Vec<ProductionStep>,
    alternative: &Alternative,
) {
    let (precedence, associativity) = steps
        .last()
        .map(|step| (step.precedence, step.associativity))
        .unwrap_or((alternative.precedence, alternative.associativity));
    let duplicate = productions
        .iter()
        .any(|p| p.lhs == lhs && p.steps == steps);
    if !duplicate {
        productions.push(Production {
            lhs,
            steps,
            precedence,
            associativity,
            dynamic_precedence: alternative.dynamic,
        });
    }
}

/// Lower a validated grammar
pub(crate) fn prepare(grammar: &Grammar) -> Result<PreparedGrammar, GrammarError> {
    let mut lowering = Lowering::new(grammar);

    for def in &grammar.rules {
        if def.rule.is_lexical() {
            lowering.register_named_token(&def.name, &def.rule)?;
        } else {
            lowering.collect_terminals(&def.rule, &def.name)?;
        }
    }
    for extra in &grammar.extras {
        match extra {
            Rule::Symbol { .. } => {}
            other => lowering.collect_terminals(other, "extra")?,
        }
    }

    // literals first so an equal-length keyword beats a pattern, then declaration order
    let mut pending = std::mem::take(&mut lowering.pending);
    pending.sort_by_key(|t| !t.is_literal);

    let mut symbols = vec![SymbolInfo {
        name: "end".to_string(),
        kind: SymbolKind::End,
        named: false,
        visible: false,
        extra: false,
    }];
    let mut terminals = Vec::with_capacity(pending.len());
    let mut terminal_ids = HashMap::new();
    for terminal in pending {
        let symbol = SymbolId(symbols.len() as u16);
        terminal_ids.insert(terminal.key, symbol);
        terminals.push(TerminalDef {
            symbol,
            pattern: terminal.pattern,
            is_literal: terminal.is_literal,
        });
        symbols.push(terminal.info);
    }
    let lexical_count = terminals.len();

    let external_base = symbols.len();
    for name in &grammar.externals {
        symbols.push(SymbolInfo {
            name: name.clone(),
            kind: SymbolKind::External,
            named: !is_hidden(name),
            visible: !is_hidden(name),
            extra: false,
        });
    }

    let augmented_start = SymbolId(symbols.len() as u16);
    symbols.push(SymbolInfo {
        name: "_start".to_string(),
        kind: SymbolKind::Auxiliary,
        named: false,
        visible: false,
        extra: false,
    });
    let rule_symbols: Vec<Option<SymbolId>> = grammar
        .rules
        .iter()
        .map(|def| {
            if def.rule.is_lexical() {
                None
            } else {
                let symbol = SymbolId(symbols.len() as u16);
                symbols.push(SymbolInfo {
                    name: def.name.clone(),
                    kind: SymbolKind::Nonterminal,
                    named: !is_hidden(&def.name),
                    visible: !is_hidden(&def.name),
                    extra: false,
                });
                Some(symbol)
            }
        })
        .collect();

    let start = match (grammar.rules.first(), rule_symbols.first()) {
        (Some(_), Some(Some(start))) => *start,
        (Some(def), _) => {
            return Err(GrammarError::LexicalStartRule {
                name: def.name.clone(),
            })
        }
        (None, _) => return Err(GrammarError::NoRules),
    };

    let mut productions = vec![Production {
        lhs: augmented_start,
        steps: vec![ProductionStep {
            symbol: start,
            precedence: 0,
            associativity: None,
            field: None,
        }],
        precedence: 0,
        associativity: None,
        dynamic_precedence: 0,
    }];
    let mut field_names = Vec::new();

    for (def, symbol) in grammar.rules.iter().zip(&rule_symbols) {
        let Some(lhs) = *symbol else { continue };
        let mut flattener = Flattener {
            lowering: &lowering,
            terminal_ids: &terminal_ids,
            rule_symbols: &rule_symbols,
            external_base,
            symbols: &mut symbols,
            productions: &mut productions,
            field_names: &mut field_names,
            owner: &def.name,
            repeat_counter: 0,
        };
        let alternatives = flattener.flatten(&def.rule, Context::ROOT)?;
        for alternative in alternatives {
            push_production(&mut productions, lhs, alternative.steps.clone(), &alternative);
        }
    }

    let resolve_terminal_or_rule = |name: &str| -> Option<SymbolId> {
        if let Some(&i) = lowering.external_index.get(name) {
            return Some(SymbolId((external_base + i) as u16));
        }
        if lowering.is_lexical_rule(name) {
            return terminal_ids.get(&TerminalKey::Named(name.to_string())).copied();
        }
        lowering
            .rule_index
            .get(name)
            .and_then(|&i| rule_symbols[i])
    };

    for extra in &grammar.extras {
        let symbol = match extra {
            Rule::Symbol { name } => resolve_terminal_or_rule(name).filter(|s| {
                s.index() < external_base + grammar.externals.len()
            }),
            Rule::String { value } => terminal_ids.get(&TerminalKey::Literal(value.clone())).copied(),
            Rule::Pattern { value } => terminal_ids
                .get(&TerminalKey::Pattern(format!("(?:{})", value)))
                .copied(),
            Rule::Token { content } => terminal_ids
                .get(&TerminalKey::Pattern(token_regex(content, "extra")?))
                .copied(),
            _ => None,
        };
        match symbol {
            Some(symbol) => symbols[symbol.index()].extra = true,
            None => {
                return Err(GrammarError::InvalidExtra {
                    description: format!("{:?}", extra),
                })
            }
        }
    }

    let mut expected_conflicts = Vec::with_capacity(grammar.conflicts.len());
    for set in &grammar.conflicts {
        let mut resolved = Vec::with_capacity(set.len());
        for name in set {
            match resolve_terminal_or_rule(name) {
                Some(symbol) => resolved.push(symbol),
                None => {
                    return Err(GrammarError::UnknownConflictRule { name: name.clone() })
                }
            }
        }
        expected_conflicts.push(resolved);
    }

    let mut productions_by_lhs = vec![Vec::new(); symbols.len()];
    for (id, production) in productions.iter().enumerate() {
        productions_by_lhs[production.lhs.index()].push(id);
    }

    Ok(PreparedGrammar {
        name: grammar.name.clone(),
        symbols: SymbolTable::new(symbols, lexical_count, grammar.externals.len()),
        productions,
        productions_by_lhs,
        terminals,
        field_names,
        expected_conflicts,
    })
}
