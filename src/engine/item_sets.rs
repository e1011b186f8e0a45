//! LR(1) item sets with LALR state merging
//!
//! States are identified by their kernel core (the items without
//! lookaheads). When a transition reaches a core that already exists, the
//! lookaheads are merged into the existing state and the state is queued
//! again so the new lookaheads propagate. The fixpoint is the LALR(1)
//! automaton.

use super::grammar_analysis::FirstSets;
use super::prepare_grammar::PreparedGrammar;
use super::symbol::{SymbolId, TokenSet};
use std::collections::{BTreeMap, VecDeque};

type FastMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// A production with a dot position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Item {
    pub production: u32,
    pub dot: u32,
}

impl Item {
    fn advanced(self) -> Item {
        Item {
            production: self.production,
            dot: self.dot + 1,
        }
    }
}

/// A state of the automaton
#[derive(Debug, Clone)]
pub(crate) struct ItemSet {
    /// Kernel items, sorted by item
    pub kernel: Vec<(Item, TokenSet)>,
    /// Closure of the kernel, computed once the automaton is complete
    pub closure: Vec<(Item, TokenSet)>,
    /// Successor state per symbol
    pub transitions: BTreeMap<SymbolId, usize>,
}

/// The LALR(1) automaton of a lowered grammar
pub(crate) struct Automaton {
    pub states: Vec<ItemSet>,
}

pub(crate) struct AutomatonBuilder<'a> {
    grammar: &'a PreparedGrammar,
    first: &'a FirstSets,
}

impl<'a> AutomatonBuilder<'a> {
    pub fn new(grammar: &'a PreparedGrammar, first: &'a FirstSets) -> Self {
        Self { grammar, first }
    }

    /// Next symbol after the dot, if any
    pub fn next_symbol(&self, item: Item) -> Option<SymbolId> {
        self.grammar.productions[item.production as usize]
            .steps
            .get(item.dot as usize)
            .map(|step| step.symbol)
    }

    pub fn closure(&self, kernel: &[(Item, TokenSet)]) -> Vec<(Item, TokenSet)> {
        let mut items: Vec<(Item, TokenSet)> = kernel.to_vec();
        let mut index: FastMap<Item, usize> = FastMap::default();
        for (i, (item, _)) in items.iter().enumerate() {
            index.insert(*item, i);
        }
        let mut queued = vec![true; items.len()];
        let mut queue: VecDeque<usize> = (0..items.len()).collect();

        while let Some(i) = queue.pop_front() {
            queued[i] = false;
            let (item, lookahead) = items[i].clone();
            let Some(symbol) = self.next_symbol(item) else {
                continue;
            };
            if !self.grammar.is_nonterminal(symbol) {
                continue;
            }
            let production = &self.grammar.productions[item.production as usize];
            let rest = production.steps[item.dot as usize + 1..]
                .iter()
                .map(|step| step.symbol);
            let follow = self.first.first_of_sequence(rest, &lookahead);

            for &p in &self.grammar.productions_by_lhs[symbol.index()] {
                let new_item = Item {
                    production: p as u32,
                    dot: 0,
                };
                match index.get(&new_item) {
                    Some(&j) => {
                        if items[j].1.union_with(&follow) && !queued[j] {
                            queued[j] = true;
                            queue.push_back(j);
                        }
                    }
                    None => {
                        index.insert(new_item, items.len());
                        items.push((new_item, follow.clone()));
                        queued.push(true);
                        queue.push_back(items.len() - 1);
                    }
                }
            }
        }
        items
    }

    /// Group closure items by the symbol after the dot into successor kernels
    fn successors(&self, closure: &[(Item, TokenSet)]) -> BTreeMap<SymbolId, Vec<(Item, TokenSet)>> {
        let mut groups: BTreeMap<SymbolId, Vec<(Item, TokenSet)>> = BTreeMap::new();
        for (item, lookahead) in closure {
            if let Some(symbol) = self.next_symbol(*item) {
                groups
                    .entry(symbol)
                    .or_default()
                    .push((item.advanced(), lookahead.clone()));
            }
        }
        for kernel in groups.values_mut() {
            kernel.sort_by_key(|(item, _)| *item);
        }
        groups
    }

    pub fn build(&self) -> Automaton {
        let start_kernel = vec![(
            Item {
                production: 0,
                dot: 0,
            },
            TokenSet::singleton(SymbolId::END),
        )];
        let mut states = vec![ItemSet {
            kernel: start_kernel,
            closure: Vec::new(),
            transitions: BTreeMap::new(),
        }];
        let mut cores: FastMap<Vec<Item>, usize> = FastMap::default();
        cores.insert(vec![Item { production: 0, dot: 0 }], 0);
        let mut queue: VecDeque<usize> = VecDeque::from([0]);
        let mut queued = vec![true];

        while let Some(s) = queue.pop_front() {
            queued[s] = false;
            let kernel = states[s].kernel.clone();
            let closure = self.closure(&kernel);
            let mut transitions = BTreeMap::new();

            for (symbol, successor) in self.successors(&closure) {
                let core: Vec<Item> = successor.iter().map(|(item, _)| *item).collect();
                let target = match cores.get(&core) {
                    Some(&t) => {
                        let mut changed = false;
                        for (slot, (_, lookahead)) in states[t].kernel.iter_mut().zip(&successor) {
                            changed |= slot.1.union_with(lookahead);
                        }
                        if changed && !queued[t] {
                            queued[t] = true;
                            queue.push_back(t);
                        }
                        t
                    }
                    None => {
                        let t = states.len();
                        states.push(ItemSet {
                            kernel: successor,
                            closure: Vec::new(),
                            transitions: BTreeMap::new(),
                        });
                        cores.insert(core, t);
                        queued.push(true);
                        queue.push_back(t);
                        t
                    }
                };
                transitions.insert(symbol, target);
            }
            states[s].transitions = transitions;
        }

        for state in &mut states {
            state.closure = self.closure(&state.kernel);
        }
        Automaton { states }
    }
}
