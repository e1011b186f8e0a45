//! Error recovery
//!
//! When every stack version fails on its lookahead, the best failed
//! version is repaired with the cheapest strategy that works:
//!
//! 1. **Insertion**: pretend one expected terminal was present. The
//!    terminal becomes a zero-width `MISSING` leaf.
//! 2. **Deletion**: wrap the offending token in an `ERROR` node and carry
//!    on with the next one.
//! 3. **Panic**: pop stack entries until a state can handle the token,
//!    wrapping everything popped in an `ERROR` node. If no state can, the
//!    token itself is skipped.
//!
//! Insertions and deletions are only taken when the parser can consume a
//! short window of the following tokens afterwards. The window is checked
//! on a lightweight copy of the stack states ([`SimStack`]) without
//! building any nodes.

use super::external::ScannerState;
use super::lexer::{LexOutcome, Lexer, Token};
use super::stack::StackNode;
use super::symbol::{SymbolId, SymbolTable};
use super::table::{Action, ParseTable, StateId};
use super::tree::{Node, NodeFlags, ParentSpec};
use std::collections::VecDeque;
use std::sync::Arc;

/// Cost of each subtree wrapped in an error node
pub const SKIPPED_TREE_COST: u32 = 100;

/// Cost of each byte wrapped in an error node
pub const SKIPPED_BYTE_COST: u32 = 1;

/// Cost of a missing leaf
pub const MISSING_TREE_COST: u32 = 110;

/// Extra cost of a panic-mode recovery
pub const RECOVERY_COST: u32 = 500;

/// Reductions simulated for a single token before giving up
const MAX_SIMULATED_REDUCTIONS: usize = 256;

/// How a failed version is repaired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Repair {
    /// Shift a missing leaf of this terminal, then retry the token
    Insert(SymbolId),
    /// Wrap the token in an error node
    Delete,
    /// Pop this many links into an error node, then retry the token
    Panic { depth: usize },
    /// Wrap the token in an error node without validation
    Skip,
    /// End of input with no way to finish: wrap the whole stack
    WrapAll,
}

/// The states of a stack version, materialized lazily from the bottom
pub(crate) struct SimStack {
    lower: Arc<StackNode>,
    states: VecDeque<StateId>,
}

impl SimStack {
    pub fn new(head: &Arc<StackNode>) -> Self {
        let mut states = VecDeque::new();
        states.push_back(head.state);
        Self {
            lower: Arc::clone(head),
            states,
        }
    }

    #[inline]
    pub fn top(&self) -> StateId {
        self.states.back().copied().unwrap_or(0)
    }

    #[inline]
    pub fn push(&mut self, state: StateId) {
        self.states.push_back(state);
    }

    /// Pop `count` structural entries; false if the stack is too shallow
    pub fn pop(&mut self, count: usize) -> bool {
        while self.states.len() <= count {
            if !self.expand() {
                return false;
            }
        }
        for _ in 0..count {
            self.states.pop_back();
        }
        true
    }

    /// Materialize the next structural state below the lowest one
    fn expand(&mut self) -> bool {
        let mut node = Arc::clone(&self.lower);
        loop {
            let Some(link) = node.links.first() else {
                return false;
            };
            let structural = !link.subtree.is_extra_like();
            let prev = Arc::clone(&link.prev);
            node = prev;
            if structural {
                break;
            }
        }
        self.states.push_front(node.state);
        self.lower = node;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Consumed,
    Extra,
    Accepted,
    Failed,
}

/// Chooses repairs for failed versions
pub(crate) struct Recovery<'r, 'a> {
    table: &'a ParseTable,
    symbols: &'a SymbolTable,
    lexer: &'r Lexer<'a>,
    window: usize,
}

impl<'r, 'a> Recovery<'r, 'a> {
    pub fn new(
        table: &'a ParseTable,
        symbols: &'a SymbolTable,
        lexer: &'r Lexer<'a>,
        window: usize,
    ) -> Self {
        Self {
            table,
            symbols,
            lexer,
            window: window.max(1),
        }
    }

    /// Pick a repair for `head` failing on `token`
    ///
    /// `skip_insertion` filters out insertions already tried at this
    /// offset; `panicked` is set when a panic repair already happened here.
    pub fn plan(
        &self,
        head: &Arc<StackNode>,
        token: &Token,
        allow_insertion: bool,
        skip_insertion: &dyn Fn(SymbolId) -> bool,
        panicked: bool,
    ) -> Repair {
        if allow_insertion {
            if let Some(symbol) = self.find_insertion(head, token, skip_insertion) {
                return Repair::Insert(symbol);
            }
        }
        if self.deletion_fits(head, token) {
            return Repair::Delete;
        }
        if !panicked {
            if let Some(depth) = self.panic_depth(head, token.symbol) {
                return Repair::Panic { depth };
            }
        }
        if token.symbol == SymbolId::END {
            Repair::WrapAll
        } else {
            Repair::Skip
        }
    }

    /// Lowest expected terminal whose insertion lets the window parse
    fn find_insertion(
        &self,
        head: &Arc<StackNode>,
        token: &Token,
        skip: &dyn Fn(SymbolId) -> bool,
    ) -> Option<SymbolId> {
        self.table
            .expected_symbols(head.state)
            .filter(|&symbol| symbol != SymbolId::END && !skip(symbol))
            .find(|&symbol| {
                let mut sim = SimStack::new(head);
                self.feed(&mut sim, symbol) == Step::Consumed
                    && self.window_fits(sim, Some(token), token.start, &head.scanner)
            })
    }

    /// True if dropping `token` lets the window parse
    fn deletion_fits(&self, head: &Arc<StackNode>, token: &Token) -> bool {
        if token.symbol == SymbolId::END || token.is_empty() {
            return false;
        }
        self.window_fits(SimStack::new(head), None, token.end, &token.scanner_after)
    }

    /// Number of preferred links to pop before a state has an action for `symbol`
    fn panic_depth(&self, head: &Arc<StackNode>, symbol: SymbolId) -> Option<usize> {
        let mut node = head;
        let mut depth = 0;
        while let Some(link) = node.links.first() {
            node = &link.prev;
            depth += 1;
            if !self.table.actions(node.state, symbol).is_empty() {
                return Some(depth);
            }
        }
        None
    }

    /// Run the first action chain for `symbol` on the simulated stack
    fn feed(&self, sim: &mut SimStack, symbol: SymbolId) -> Step {
        for _ in 0..MAX_SIMULATED_REDUCTIONS {
            let Some(&action) = self.table.actions(sim.top(), symbol).first() else {
                return if self.symbols.is_extra(symbol) {
                    Step::Extra
                } else {
                    Step::Failed
                };
            };
            match action {
                Action::Shift { state } => {
                    sim.push(state);
                    return Step::Consumed;
                }
                Action::Accept => return Step::Accepted,
                Action::Reduce { production } => {
                    let Some(info) = self.table.production(production) else {
                        return Step::Failed;
                    };
                    if !sim.pop(info.child_count as usize) {
                        return Step::Failed;
                    }
                    let Some(next) = self.table.goto(sim.top(), info.lhs) else {
                        return Step::Failed;
                    };
                    sim.push(next);
                }
            }
        }
        Step::Failed
    }

    /// True if the simulated stack consumes the next `window` tokens or accepts
    fn window_fits(
        &self,
        mut sim: SimStack,
        first: Option<&Token>,
        mut position: usize,
        scanner: &Arc<ScannerState>,
    ) -> bool {
        let mut scanner = Arc::clone(scanner);
        let mut next = first.cloned();
        let mut consumed = 0;
        let mut steps = 0;
        while consumed < self.window {
            steps += 1;
            if steps > self.window * 8 {
                return false;
            }
            let token = match next.take() {
                Some(token) => token,
                None => {
                    let mode_id = self.table.lex_mode_id(sim.top());
                    let Some(mode) = self.table.lex_mode(mode_id) else {
                        return false;
                    };
                    match self.lexer.next_token(position, mode_id, mode, &scanner) {
                        LexOutcome::Token(token) => token,
                        LexOutcome::NoMatch { .. } => return false,
                    }
                }
            };
            match self.feed(&mut sim, token.symbol) {
                Step::Accepted => return true,
                Step::Failed => return false,
                Step::Extra => {}
                Step::Consumed => consumed += 1,
            }
            if token.symbol == SymbolId::END {
                return false;
            }
            position = token.end;
            scanner = token.scanner_after;
        }
        true
    }
}

/// Cost of wrapping `nodes` in an error node
pub(crate) fn skipped_cost(nodes: &[Node]) -> u32 {
    nodes.iter().fold(0u32, |cost, node| {
        cost.saturating_add(SKIPPED_TREE_COST)
            .saturating_add((node.len() as u32).saturating_mul(SKIPPED_BYTE_COST))
    })
}

/// An `ERROR` node around `children`
pub(crate) fn error_node(children: Vec<Node>, cost: u32, scanner: Arc<ScannerState>) -> Node {
    Node::parent(
        ParentSpec {
            symbol: SymbolId::ERROR,
            production: None,
            parse_state: 0,
            flags: NodeFlags::ERROR,
            error_cost: cost,
            dynamic_precedence: 0,
            lookahead_bytes: 0,
            scanner,
        },
        children,
    )
}
