//! GLR parsing engine
//!
//! The engine drives a graph-structured stack over the token stream:
//!
//! - every version of the stack is advanced until it shifts a token, so
//!   versions move through the input in lockstep by byte offset
//! - a table entry with several actions forks one version per action
//! - versions that reach the same state at the same offset are merged
//! - when every version fails, the cheapest one is repaired (see
//!   [`recovery`](super::recovery)) so a tree is always produced
//!
//! Incremental parses additionally consult the previous tree: while a
//! single version is alive, a whole old subtree is pushed in one step when
//! the bytes it depended on are unchanged and the parser is in the state
//! that built it. Leaves that fail the subtree test can still be reused as
//! tokens, saving a trip through the lexer. A re-parse that ends up with
//! syntax errors is repeated without reuse, because error recovery is
//! sensitive to how much of the stack a reused subtree collapsed.
//!
//! # Example
//!
//! ```
//! use tessera::engine::grammar_dsl::*;
//! use tessera::engine::parser::Parser;
//!
//! let language = GrammarBuilder::new("sum")
//!     .rule("expr", choice([sym("number"), prec_left(1, seq([sym("expr"), str("+"), sym("expr")]))]))
//!     .rule("number", re("[0-9]+"))
//!     .build()
//!     .build()
//!     .unwrap();
//!
//! let mut parser = Parser::new();
//! parser.set_language(language);
//! let tree = parser.parse("1+2+3").unwrap();
//! assert_eq!(tree.root_node().to_sexp(), "(expr (expr (expr (number)) (expr (number))) (expr (number)))");
//! ```

use super::error::{AbortReason, ParseError};
use super::external::ScannerState;
use super::incremental::{Edit, EditMap, ReuseCursor, ReuseStats};
use super::language::Language;
use super::lexer::{LexOutcome, Lexer, Token};
use super::recovery::{self, Recovery, Repair};
use super::stack::{link_score, StackLink, StackNode};
use super::symbol::{SymbolId, SymbolTable, TokenSet};
use super::table::{Action, LexMode, LexModeId, ParseTable, ProductionId, StateId};
use super::tree::{LeafSpec, Node, NodeFlags, ParentSpec, Tree};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

/// Default maximum input size (100 MB)
pub const DEFAULT_MAX_INPUT_SIZE: usize = 100 * 1024 * 1024;

/// Default maximum number of simultaneous stack versions
pub const DEFAULT_MAX_VERSIONS: usize = 6;

/// Default operation limit (0 = no limit)
pub const DEFAULT_MAX_OPERATIONS: u64 = 0;

/// Default node limit (0 = no limit)
pub const DEFAULT_MAX_NODES: usize = 0;

/// Default timeout in milliseconds (0 = no timeout)
pub const DEFAULT_TIMEOUT_MS: u64 = 0;

/// Default number of tokens an insertion or deletion must let the parser consume
pub const DEFAULT_RECOVERY_WINDOW: usize = 3;

/// Number of parse operations between timeout and cancellation checks
pub const TIMEOUT_CHECK_INTERVAL: u64 = 1000;

/// Zero-width shifts allowed at one offset before the token is treated as an error
const MAX_EMPTY_SHIFTS: usize = 32;

/// Configuration for parser resource limits
///
/// # Example
///
/// ```
/// use tessera::engine::parser::ParserConfig;
///
/// let config = ParserConfig::default()
///     .with_max_versions(4)
///     .with_timeout_ms(5000)
///     .with_max_operations(10_000_000);
/// assert_eq!(config.max_versions, 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    /// Maximum allowed input size in bytes
    pub max_input_size: usize,

    /// Maximum number of stack versions kept after each step
    pub max_versions: usize,

    /// Maximum number of parse operations (0 = no limit)
    pub max_operations: u64,

    /// Maximum number of nodes created (0 = no limit)
    pub max_nodes: usize,

    /// Timeout in milliseconds (0 = no timeout)
    pub timeout_ms: u64,

    /// Tokens an insertion or deletion must let the parser consume
    pub recovery_window: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
            max_versions: DEFAULT_MAX_VERSIONS,
            max_operations: DEFAULT_MAX_OPERATIONS,
            max_nodes: DEFAULT_MAX_NODES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            recovery_window: DEFAULT_RECOVERY_WINDOW,
        }
    }
}

impl ParserConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum input size
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// Set maximum number of stack versions
    pub fn with_max_versions(mut self, versions: usize) -> Self {
        self.max_versions = versions;
        self
    }

    /// Set the operation limit
    pub fn with_max_operations(mut self, operations: u64) -> Self {
        self.max_operations = operations;
        self
    }

    /// Set the node limit
    pub fn with_max_nodes(mut self, nodes: usize) -> Self {
        self.max_nodes = nodes;
        self
    }

    /// Set timeout in milliseconds
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Set the recovery window
    pub fn with_recovery_window(mut self, tokens: usize) -> Self {
        self.recovery_window = tokens;
        self
    }
}

/// Parses text with a [`Language`]
#[derive(Debug, Default)]
pub struct Parser {
    language: Option<Language>,
    config: ParserConfig,
    cancellation: Option<Arc<AtomicBool>>,
}

impl Parser {
    /// Create a parser without a language
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser with a configuration
    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Set the language used by subsequent parses
    pub fn set_language(&mut self, language: Language) {
        self.language = Some(language);
    }

    /// The current language
    #[inline]
    pub fn language(&self) -> Option<&Language> {
        self.language.as_ref()
    }

    /// Replace the configuration
    pub fn set_config(&mut self, config: ParserConfig) {
        self.config = config;
    }

    /// The current configuration
    #[inline]
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Install a flag that aborts running parses when set
    pub fn set_cancellation_flag(&mut self, flag: Option<Arc<AtomicBool>>) {
        self.cancellation = flag;
    }

    /// The installed cancellation flag
    #[inline]
    pub fn cancellation_flag(&self) -> Option<&Arc<AtomicBool>> {
        self.cancellation.as_ref()
    }

    /// Parse `text` from scratch
    pub fn parse(&self, text: &str) -> Result<Tree, ParseError> {
        let language = self.language.as_ref().ok_or(ParseError::NoLanguage)?;
        let (root, stats) = self.run(language, text, None)?;
        Ok(Tree::new(root, language.clone(), text.len()).with_incremental_info(stats, Vec::new()))
    }

    /// Re-parse after `edits` turned the text of `old_tree` into `new_text`
    ///
    /// The result is structurally identical to `parse(new_text)`. Edits are
    /// applied in order, each against the text produced by the previous one.
    pub fn parse_incremental(
        &self,
        old_tree: &Tree,
        edits: &[Edit],
        new_text: &str,
    ) -> Result<Tree, ParseError> {
        let language = self.language.as_ref().ok_or(ParseError::NoLanguage)?;
        let map = EditMap::new(old_tree.source_len(), edits)?;
        if map.new_len() != new_text.len() {
            return Err(ParseError::InvalidEdit {
                index: edits.len().saturating_sub(1),
                reason: format!(
                    "edits produce {} bytes but the new text has {}",
                    map.new_len(),
                    new_text.len()
                ),
            });
        }
        let changed = map.changed_ranges();
        let reuse = if old_tree.language().same_as(language) {
            Some(ReuseState {
                cursor: ReuseCursor::new(old_tree.root().clone()),
                map,
            })
        } else {
            None
        };
        let (mut root, mut stats) = self.run(language, new_text, reuse)?;
        if root.has_error() && stats.reused_nodes + stats.reused_tokens > 0 {
            // recovery depends on how the stack is split into entries, which
            // reused subtrees change; only a fresh parse recovers the same way
            log_debug!("incremental parse hit an error, parsing from scratch");
            (root, stats) = self.run(language, new_text, None)?;
        }
        log_debug!(
            "incremental parse: {} nodes / {} bytes reused, {} tokens lexed",
            stats.reused_nodes,
            stats.reused_bytes,
            stats.lexed_tokens
        );
        Ok(Tree::new(root, language.clone(), new_text.len()).with_incremental_info(stats, changed))
    }

    fn run(
        &self,
        language: &Language,
        text: &str,
        reuse: Option<ReuseState>,
    ) -> Result<(Node, ReuseStats), ParseError> {
        if text.len() > self.config.max_input_size {
            return Err(ParseError::InputTooLarge {
                input_size: text.len(),
                max_size: self.config.max_input_size,
            });
        }
        Engine::new(language, text, self.config, self.cancellation.as_deref(), reuse).run()
    }
}

// ============================================================================
// Engine state
// ============================================================================

struct ReuseState {
    map: EditMap,
    cursor: ReuseCursor,
}

/// The token a version acts on
#[derive(Debug, Clone)]
enum Lookahead {
    Token(Token),
    /// A terminal inserted by error recovery
    Missing(Token),
    /// Characters no terminal matches
    Invalid {
        start: usize,
        end: usize,
        examined_end: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    Errored,
    Halted,
}

/// What a version already tried at its current offset
#[derive(Debug, Clone, Default)]
struct ProgressGuard {
    position: usize,
    empty_reductions: Vec<(StateId, ProductionId)>,
    insertions: Vec<(StateId, SymbolId)>,
    empty_shifts: usize,
    panicked: bool,
    stalled: bool,
    suppress_externals: bool,
}

impl ProgressGuard {
    fn at(&mut self, position: usize) {
        if position != self.position {
            *self = ProgressGuard {
                position,
                ..ProgressGuard::default()
            };
        }
    }
}

#[derive(Debug, Clone)]
struct Version {
    head: Arc<StackNode>,
    status: Status,
    /// Lookaheads to use before lexing again, last first
    queued: Vec<Lookahead>,
    /// Action picked at a conflict, applied before consulting the table
    pending: Option<Action>,
    guard: ProgressGuard,
}

impl Version {
    fn new(head: Arc<StackNode>) -> Self {
        Self {
            head,
            status: Status::Active,
            queued: Vec::new(),
            pending: None,
            guard: ProgressGuard::default(),
        }
    }
}

struct CachedToken {
    position: usize,
    mode: LexModeId,
    externals: bool,
    scanner: Arc<ScannerState>,
    lookahead: Lookahead,
}

/// Preference between two trees for the same span; `Less` means `a` wins
pub(crate) fn compare_trees(a: &Node, b: &Node) -> Ordering {
    a.error_cost()
        .cmp(&b.error_cost())
        .then_with(|| b.dynamic_precedence().cmp(&a.dynamic_precedence()))
        .then_with(|| a.compare_productions(b))
}

struct Engine<'a> {
    table: &'a ParseTable,
    symbols: &'a SymbolTable,
    lexer: Lexer<'a>,
    config: ParserConfig,
    cancellation: Option<&'a AtomicBool>,
    versions: Vec<Version>,
    accepted: Vec<Node>,
    cache: Vec<CachedToken>,
    reuse: Option<ReuseState>,
    stats: ReuseStats,
    operations: u64,
    nodes: usize,
    started: Instant,
}

impl<'a> Engine<'a> {
    fn new(
        language: &'a Language,
        text: &'a str,
        config: ParserConfig,
        cancellation: Option<&'a AtomicBool>,
        reuse: Option<ReuseState>,
    ) -> Self {
        Self {
            table: language.table(),
            symbols: language.symbols(),
            lexer: Lexer::new(
                language.lex_table(),
                language.symbols(),
                language.external_scanner(),
                text,
            ),
            config,
            cancellation,
            versions: vec![Version::new(StackNode::base(0))],
            accepted: Vec::new(),
            cache: Vec::new(),
            reuse,
            stats: ReuseStats::default(),
            operations: 0,
            nodes: 0,
            started: Instant::now(),
        }
    }

    fn run(mut self) -> Result<(Node, ReuseStats), ParseError> {
        while !self.versions.is_empty() {
            let position = self
                .versions
                .iter()
                .map(|v| v.head.position)
                .min()
                .unwrap_or(0);
            let mut index = 0;
            while index < self.versions.len() {
                let version = &self.versions[index];
                if version.status == Status::Active && version.head.position == position {
                    self.advance(index)?;
                }
                index += 1;
            }
            self.condense();
            if !self.versions.is_empty()
                && self.versions.iter().all(|v| v.status == Status::Errored)
            {
                self.recover()?;
            }
        }

        let text_len = self.lexer.text().len();
        let root = self
            .accepted
            .iter()
            .min_by(|a, b| compare_trees(a, b))
            .cloned()
            .unwrap_or_else(|| {
                Node::leaf(LeafSpec {
                    symbol: SymbolId::ERROR,
                    len: text_len,
                    lookahead_bytes: 1,
                    lookbehind_bytes: 0,
                    parse_state: 0,
                    lex_mode: 0,
                    flags: NodeFlags::ERROR,
                    error_cost: recovery::RECOVERY_COST,
                    scanner_before: Arc::default(),
                    scanner_after: Arc::default(),
                })
            });
        Ok((root, self.stats))
    }

    // ------------------------------------------------------------------------
    // Budget
    // ------------------------------------------------------------------------

    fn tick(&mut self, position: usize) -> Result<(), ParseError> {
        self.operations += 1;
        let abort = |reason| ParseError::ParseAborted { reason, position };
        if self.config.max_operations > 0 && self.operations > self.config.max_operations {
            return Err(abort(AbortReason::OperationLimit {
                limit: self.config.max_operations,
            }));
        }
        if self.config.max_nodes > 0 && self.nodes > self.config.max_nodes {
            return Err(abort(AbortReason::NodeLimit {
                limit: self.config.max_nodes,
            }));
        }
        if self.operations == 1 || self.operations % TIMEOUT_CHECK_INTERVAL == 0 {
            if self
                .cancellation
                .is_some_and(|flag| flag.load(AtomicOrdering::Relaxed))
            {
                return Err(abort(AbortReason::Cancelled));
            }
            if self.config.timeout_ms > 0 {
                let elapsed_ms = self.started.elapsed().as_millis() as u64;
                if elapsed_ms > self.config.timeout_ms {
                    return Err(abort(AbortReason::Timeout {
                        elapsed_ms,
                        timeout_ms: self.config.timeout_ms,
                    }));
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Stepping one version
    // ------------------------------------------------------------------------

    /// Run one version until it shifts, accepts, fails or reuses a subtree
    fn advance(&mut self, index: usize) -> Result<(), ParseError> {
        let table = self.table;
        let mut current: Option<Lookahead> = None;
        loop {
            let position = self.versions[index].head.position;
            self.tick(position)?;
            self.versions[index].guard.at(position);

            let pending = self.versions[index].pending.take();
            if pending.is_none()
                && current.is_none()
                && self.versions[index].queued.is_empty()
                && self.reuse_subtree(index)
            {
                return Ok(());
            }

            let lookahead = match current.take() {
                Some(lookahead) => lookahead,
                None => self.next_lookahead(index),
            };
            let (token, missing) = match &lookahead {
                Lookahead::Token(token) => (token.clone(), false),
                Lookahead::Missing(token) => (token.clone(), true),
                Lookahead::Invalid {
                    start,
                    end,
                    examined_end,
                } => {
                    self.push_invalid(index, *start, *end, *examined_end);
                    return Ok(());
                }
            };

            let (action, fragile) = match pending {
                Some(action) => (action, true),
                None => {
                    let state = self.versions[index].head.state;
                    let actions = table.actions(state, token.symbol);
                    if actions.is_empty() {
                        if self.symbols.is_extra(token.symbol) && !missing {
                            self.shift_extra(index, &token);
                        } else {
                            log_trace!(
                                "version {} failed on '{}' at {}",
                                index,
                                self.symbols.name(token.symbol),
                                token.start
                            );
                            self.fail(index, lookahead);
                        }
                        return Ok(());
                    }
                    for &action in &actions[1..] {
                        let mut fork = self.versions[index].clone();
                        fork.pending = Some(action);
                        fork.queued.push(lookahead.clone());
                        self.versions.push(fork);
                    }
                    (actions[0], actions.len() > 1)
                }
            };

            match action {
                Action::Shift { state } => {
                    if token.is_empty() && token.symbol != SymbolId::END && !missing {
                        if self.versions[index].guard.empty_shifts >= MAX_EMPTY_SHIFTS {
                            self.fail(index, lookahead);
                            return Ok(());
                        }
                        self.versions[index].guard.empty_shifts += 1;
                    }
                    self.shift(index, state, &token, missing, fragile);
                    return Ok(());
                }
                Action::Accept => {
                    self.accept(index);
                    return Ok(());
                }
                Action::Reduce { production } => {
                    if !self.reduce(index, production, &lookahead, fragile || missing) {
                        return Ok(());
                    }
                    current = Some(lookahead);
                }
            }
        }
    }

    fn fail(&mut self, index: usize, lookahead: Lookahead) {
        let version = &mut self.versions[index];
        version.status = Status::Errored;
        version.queued.push(lookahead);
    }

    /// The next lookahead of a version: queued, reused from the old tree, cached or lexed
    fn next_lookahead(&mut self, index: usize) -> Lookahead {
        if let Some(lookahead) = self.versions[index].queued.pop() {
            return lookahead;
        }
        let head = Arc::clone(&self.versions[index].head);
        let externals = !self.versions[index].guard.suppress_externals;
        let mode_id = self.table.lex_mode_id(head.state);

        if let Some(cached) = self.cache.iter().find(|c| {
            c.position == head.position
                && c.mode == mode_id
                && c.externals == externals
                && *c.scanner == *head.scanner
        }) {
            return cached.lookahead.clone();
        }

        let lookahead = match self.reuse_token(&head, mode_id, externals) {
            Some(token) => Lookahead::Token(token),
            None => self.lex(head.position, mode_id, &head.scanner, externals),
        };
        self.cache.push(CachedToken {
            position: head.position,
            mode: mode_id,
            externals,
            scanner: Arc::clone(&head.scanner),
            lookahead: lookahead.clone(),
        });
        lookahead
    }

    fn lex(
        &mut self,
        position: usize,
        mode_id: LexModeId,
        scanner: &Arc<ScannerState>,
        externals: bool,
    ) -> Lookahead {
        let default_mode = LexMode::default();
        let mode = self.table.lex_mode(mode_id).unwrap_or(&default_mode);
        let restricted;
        let mode = if externals {
            mode
        } else {
            restricted = LexMode {
                admissible: mode.admissible.clone(),
                externals: TokenSet::new(),
            };
            &restricted
        };
        self.stats.lexed_tokens += 1;
        match self.lexer.next_token(position, mode_id, mode, scanner) {
            LexOutcome::Token(token) => Lookahead::Token(token),
            LexOutcome::NoMatch {
                start,
                end,
                examined_end,
            } => Lookahead::Invalid {
                start,
                end,
                examined_end,
            },
        }
    }

    // ------------------------------------------------------------------------
    // Reuse
    // ------------------------------------------------------------------------

    /// Turn an unchanged old leaf back into a token
    fn reuse_token(
        &mut self,
        head: &StackNode,
        mode_id: LexModeId,
        externals: bool,
    ) -> Option<Token> {
        if self.versions.len() != 1 || !externals {
            return None;
        }
        let reuse = self.reuse.as_mut()?;
        let old = reuse.map.new_to_old(head.position)?;
        let chain = reuse.cursor.nodes_at(old);
        let (leaf, start) = chain.last().filter(|(node, _)| node.is_leaf())?;
        let data = leaf.data();
        if leaf.len() == 0
            || leaf.is_error()
            || leaf.is_missing()
            || data.lex_mode != mode_id
            || *data.scanner_before != *head.scanner
            || !reuse
                .map
                .is_intact_around(*start, start + leaf.len(), data.lookbehind_bytes, data.lookahead_bytes)
        {
            return None;
        }
        self.stats.reused_tokens += 1;
        let end = head.position + leaf.len();
        Some(Token {
            symbol: leaf.symbol(),
            start: head.position,
            end,
            examined_end: end + data.lookahead_bytes,
            lookbehind: data.lookbehind_bytes,
            lex_mode: mode_id,
            scanner_after: Arc::clone(&data.scanner_after),
        })
    }

    /// Push the largest reusable old subtree starting at the version's offset
    fn reuse_subtree(&mut self, index: usize) -> bool {
        if self.versions.len() != 1 {
            return false;
        }
        let table = self.table;
        let Some(reuse) = self.reuse.as_mut() else {
            return false;
        };
        let head = Arc::clone(&self.versions[index].head);
        let Some(old) = reuse.map.new_to_old(head.position) else {
            return false;
        };
        let mode_id = table.lex_mode_id(head.state);
        let chain = reuse.cursor.nodes_at(old);
        let found = chain.into_iter().find_map(|(node, start)| {
            let data = node.data();
            let first = node.first_leaf();
            let reusable = !node.is_leaf()
                && node.len() > 0
                && !node.has_error()
                && !node.is_fragile()
                && !node.is_extra()
                && data.parse_state == head.state
                && data.lex_mode == mode_id
                && *data.scanner_before == *head.scanner
                && first.is_leaf()
                && first.len() > 0
                && reuse
                    .map
                    .is_intact_around(start, start + node.len(), data.lookbehind_bytes, data.lookahead_bytes);
            if !reusable {
                return None;
            }
            let next = table.goto(head.state, node.symbol())?;
            Some((node, next))
        });
        let Some((node, next)) = found else {
            return false;
        };
        log_trace!(
            "reusing '{}' ({} bytes) at {}",
            self.symbols.name(node.symbol()),
            node.len(),
            head.position
        );
        self.stats.reused_nodes += 1;
        self.stats.reused_bytes += node.len();
        self.nodes += 1;
        self.versions[index].head = StackNode::push(&head, next, node);
        true
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    fn leaf_flags(&self, fragile: bool) -> NodeFlags {
        if fragile || self.versions.len() > 1 {
            NodeFlags::FRAGILE
        } else {
            NodeFlags::NONE
        }
    }

    fn shift(&mut self, index: usize, state: StateId, token: &Token, missing: bool, fragile: bool) {
        let mut flags = self.leaf_flags(fragile);
        if missing {
            flags.insert(NodeFlags::MISSING);
        }
        let head = Arc::clone(&self.versions[index].head);
        let leaf = Node::leaf(LeafSpec {
            symbol: token.symbol,
            len: token.len(),
            lookahead_bytes: token.examined_end.saturating_sub(token.end),
            lookbehind_bytes: token.lookbehind,
            parse_state: head.state,
            lex_mode: token.lex_mode,
            flags,
            error_cost: if missing {
                recovery::MISSING_TREE_COST
            } else {
                0
            },
            scanner_before: Arc::clone(&head.scanner),
            scanner_after: Arc::clone(&token.scanner_after),
        });
        self.nodes += 1;
        let version = &mut self.versions[index];
        version.head = StackNode::push(&head, state, leaf);
        version.guard.empty_reductions.clear();
    }

    fn shift_extra(&mut self, index: usize, token: &Token) {
        let flags = self.leaf_flags(false) | NodeFlags::EXTRA;
        let head = Arc::clone(&self.versions[index].head);
        let leaf = Node::leaf(LeafSpec {
            symbol: token.symbol,
            len: token.len(),
            lookahead_bytes: token.examined_end.saturating_sub(token.end),
            lookbehind_bytes: token.lookbehind,
            parse_state: head.state,
            lex_mode: token.lex_mode,
            flags,
            error_cost: 0,
            scanner_before: Arc::clone(&head.scanner),
            scanner_after: Arc::clone(&token.scanner_after),
        });
        self.nodes += 1;
        self.versions[index].head = StackNode::push(&head, head.state, leaf);
    }

    fn push_invalid(&mut self, index: usize, start: usize, end: usize, examined_end: usize) {
        let head = Arc::clone(&self.versions[index].head);
        let len = end - start;
        let leaf = Node::leaf(LeafSpec {
            symbol: SymbolId::ERROR,
            len,
            lookahead_bytes: examined_end.saturating_sub(end),
            lookbehind_bytes: 0,
            parse_state: head.state,
            lex_mode: self.table.lex_mode_id(head.state),
            flags: self.leaf_flags(false) | NodeFlags::ERROR,
            error_cost: recovery::SKIPPED_TREE_COST
                .saturating_add((len as u32).saturating_mul(recovery::SKIPPED_BYTE_COST)),
            scanner_before: Arc::clone(&head.scanner),
            scanner_after: Arc::clone(&head.scanner),
        });
        self.nodes += 1;
        self.versions[index].head = StackNode::push(&head, head.state, leaf);
    }

    /// Reduce along every path; false if the version had to stop
    fn reduce(
        &mut self,
        index: usize,
        production: ProductionId,
        lookahead: &Lookahead,
        fragile: bool,
    ) -> bool {
        let table = self.table;
        let Some(info) = table.production(production) else {
            self.versions[index].status = Status::Halted;
            return false;
        };
        let examined_end = match lookahead {
            Lookahead::Token(token) | Lookahead::Missing(token) => token.examined_end,
            Lookahead::Invalid { examined_end, .. } => *examined_end,
        };
        let head = Arc::clone(&self.versions[index].head);
        let paths = StackNode::pop_count(&head, info.child_count as usize);
        let Some(first) = paths.first() else {
            self.versions[index].status = Status::Halted;
            return false;
        };

        if first.base.position == head.position {
            let key = (head.state, production);
            let guard = &mut self.versions[index].guard;
            if guard.empty_reductions.contains(&key) {
                guard.stalled = true;
                self.fail(index, lookahead.clone());
                return false;
            }
            guard.empty_reductions.push(key);
        }

        let template = self.versions[index].clone();
        let flags = if fragile || paths.len() > 1 {
            NodeFlags::FRAGILE
        } else {
            NodeFlags::NONE
        };
        let dynamic_precedence = if fragile {
            info.dynamic_precedence.saturating_add(info.precedence)
        } else {
            info.dynamic_precedence
        };

        let mut applied = false;
        for path in paths {
            let Some(next) = table.goto(path.base.state, info.lhs) else {
                continue;
            };
            let len: usize = path.children.iter().map(Node::len).sum();
            let node = Node::parent(
                ParentSpec {
                    symbol: info.lhs,
                    production: Some(production),
                    parse_state: path.base.state,
                    flags,
                    error_cost: 0,
                    dynamic_precedence,
                    lookahead_bytes: examined_end.saturating_sub(path.base.position + len),
                    scanner: Arc::clone(&path.base.scanner),
                },
                path.children,
            );
            self.nodes += 1;
            let mut new_head = StackNode::push(&path.base, next, node);
            for extra in path.trailing {
                new_head = StackNode::push(&new_head, next, extra);
            }
            if applied {
                let mut fork = template.clone();
                fork.head = new_head;
                fork.queued.push(lookahead.clone());
                self.versions.push(fork);
            } else {
                self.versions[index].head = new_head;
                applied = true;
            }
        }
        if !applied {
            self.versions[index].status = Status::Halted;
        }
        applied
    }

    /// Finish a version: splice the extras around the start node into the root
    fn accept(&mut self, index: usize) {
        let head = Arc::clone(&self.versions[index].head);
        self.versions[index].status = Status::Halted;
        let subtrees = StackNode::preferred_path(&head);
        let root = match subtrees.iter().position(|node| !node.is_extra_like()) {
            Some(k) => {
                let start = &subtrees[k];
                let mut children = Vec::with_capacity(subtrees.len() + start.children().len());
                children.extend(subtrees[..k].iter().cloned());
                children.extend(start.children().iter().cloned());
                children.extend(subtrees[k + 1..].iter().cloned());
                start.with_children(children)
            }
            None => recovery::error_node(subtrees, recovery::RECOVERY_COST, Arc::clone(&head.scanner)),
        };
        self.nodes += 1;
        self.accepted.push(root);
    }

    // ------------------------------------------------------------------------
    // Version management
    // ------------------------------------------------------------------------

    /// Drop finished and hopeless versions, merge equivalent ones, cap the rest
    fn condense(&mut self) {
        self.versions.retain(|v| v.status != Status::Halted);
        if let Some(best) = self.accepted.iter().map(Node::error_cost).min() {
            self.versions.retain(|v| v.head.error_cost <= best);
        }
        if self.versions.iter().any(|v| v.status == Status::Active) {
            self.versions.retain(|v| v.status == Status::Active);
        }

        let mut merged: Vec<Version> = Vec::with_capacity(self.versions.len());
        for version in std::mem::take(&mut self.versions) {
            match merged.iter_mut().find(|existing| can_merge(existing, &version)) {
                Some(existing) => {
                    if !Arc::ptr_eq(&existing.head, &version.head) {
                        existing.head = merge_heads(&existing.head, &version.head);
                    }
                }
                None => merged.push(version),
            }
        }

        let mut ranked: Vec<(usize, Version)> = merged.into_iter().enumerate().collect();
        ranked.sort_by(|(ia, a), (ib, b)| {
            a.head
                .error_cost
                .cmp(&b.head.error_cost)
                .then_with(|| b.head.dynamic_precedence.cmp(&a.head.dynamic_precedence))
                .then_with(|| ia.cmp(ib))
        });
        ranked.truncate(self.config.max_versions.max(1));
        self.versions = ranked.into_iter().map(|(_, v)| v).collect();

        match self.versions.iter().map(|v| v.head.position).min() {
            Some(min) => self.cache.retain(|c| c.position >= min),
            None => self.cache.clear(),
        }
    }

    /// Repair the best failed version; every other version is dropped
    fn recover(&mut self) -> Result<(), ParseError> {
        let mut version = self.versions.remove(0);
        self.versions.clear();
        self.cache.clear();
        version.status = Status::Active;

        let head = Arc::clone(&version.head);
        self.tick(head.position)?;
        version.guard.at(head.position);
        let token = match version.queued.pop() {
            Some(Lookahead::Token(token)) | Some(Lookahead::Missing(token)) => token,
            Some(invalid @ Lookahead::Invalid { .. }) => {
                version.queued.push(invalid);
                self.versions.push(version);
                return Ok(());
            }
            None => {
                self.versions.push(version);
                return Ok(());
            }
        };

        let recovery = Recovery::new(
            self.table,
            self.symbols,
            &self.lexer,
            self.config.recovery_window,
        );
        let state = head.state;
        let tried = version.guard.insertions.clone();
        let repair = recovery.plan(
            &head,
            &token,
            !version.guard.stalled,
            &|symbol| tried.contains(&(state, symbol)),
            version.guard.panicked,
        );
        log_debug!(
            "recovering at {} in state {} on '{}': {:?}",
            head.position,
            state,
            self.symbols.name(token.symbol),
            repair
        );

        match repair {
            Repair::Insert(symbol) => {
                version.guard.insertions.push((state, symbol));
                let missing = Token {
                    symbol,
                    start: token.start,
                    end: token.start,
                    examined_end: token.examined_end,
                    lookbehind: token.lookbehind,
                    lex_mode: token.lex_mode,
                    scanner_after: Arc::clone(&head.scanner),
                };
                version.queued.push(Lookahead::Token(token));
                version.queued.push(Lookahead::Missing(missing));
            }
            Repair::Delete | Repair::Skip => {
                if token.is_empty() {
                    version.guard.suppress_externals = true;
                }
                let skipped = self.token_leaf(&head, &token);
                let cost = if repair == Repair::Delete {
                    recovery::skipped_cost(std::slice::from_ref(&skipped))
                } else {
                    recovery::RECOVERY_COST
                        .saturating_add(recovery::skipped_cost(std::slice::from_ref(&skipped)))
                };
                let error = recovery::error_node(vec![skipped], cost, Arc::clone(&token.scanner_after));
                self.nodes += 2;
                version.head = StackNode::push(&head, head.state, error);
            }
            Repair::Panic { depth } => {
                let mut node = Arc::clone(&head);
                let mut popped = Vec::with_capacity(depth);
                for _ in 0..depth {
                    let Some(link) = node.links.first() else {
                        break;
                    };
                    popped.push(link.subtree.clone());
                    let prev = Arc::clone(&link.prev);
                    node = prev;
                }
                popped.reverse();
                let cost = recovery::RECOVERY_COST.saturating_add(recovery::skipped_cost(&popped));
                let error = recovery::error_node(popped, cost, Arc::clone(&node.scanner));
                self.nodes += 1;
                version.head = StackNode::push(&node, node.state, error);
                version.guard.panicked = true;
                version.queued.push(Lookahead::Token(token));
            }
            Repair::WrapAll => {
                let subtrees = StackNode::preferred_path(&head);
                let cost = recovery::RECOVERY_COST.saturating_add(recovery::skipped_cost(&subtrees));
                let root = recovery::error_node(subtrees, cost, Arc::clone(&head.scanner));
                self.nodes += 1;
                self.accepted.push(root);
                return Ok(());
            }
        }
        self.versions.push(version);
        Ok(())
    }

    fn token_leaf(&self, head: &StackNode, token: &Token) -> Node {
        Node::leaf(LeafSpec {
            symbol: token.symbol,
            len: token.len(),
            lookahead_bytes: token.examined_end.saturating_sub(token.end),
            lookbehind_bytes: token.lookbehind,
            parse_state: head.state,
            lex_mode: token.lex_mode,
            flags: NodeFlags::NONE,
            error_cost: 0,
            scanner_before: Arc::clone(&head.scanner),
            scanner_after: Arc::clone(&token.scanner_after),
        })
    }
}

fn can_merge(a: &Version, b: &Version) -> bool {
    a.status == Status::Active
        && b.status == Status::Active
        && a.pending.is_none()
        && b.pending.is_none()
        && a.queued.is_empty()
        && b.queued.is_empty()
        && a.head.position == b.head.position
        && a.head.state == b.head.state
        && *a.head.scanner == *b.head.scanner
}

fn merge_heads(a: &Arc<StackNode>, b: &Arc<StackNode>) -> Arc<StackNode> {
    let mut links: Vec<StackLink> = a.links.clone();
    for link in &b.links {
        match links
            .iter_mut()
            .find(|existing| Arc::ptr_eq(&existing.prev, &link.prev))
        {
            Some(existing) => {
                if compare_trees(&link.subtree, &existing.subtree) == Ordering::Less {
                    existing.subtree = link.subtree.clone();
                }
            }
            None => links.push(link.clone()),
        }
    }
    links.sort_by(|x, y| {
        let (cost_x, prec_x) = link_score(x);
        let (cost_y, prec_y) = link_score(y);
        cost_x
            .cmp(&cost_y)
            .then_with(|| prec_y.cmp(&prec_x))
            .then_with(|| x.subtree.compare_productions(&y.subtree))
    });
    StackNode::merged(a.state, a.position, Arc::clone(&a.scanner), links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::grammar_dsl::*;

    fn sum_language() -> Language {
        GrammarBuilder::new("sum")
            .rule(
                "expr",
                choice([
                    sym("number"),
                    prec_left(1, seq([field("left", sym("expr")), str("+"), field("right", sym("expr"))])),
                ]),
            )
            .rule("number", re("[0-9]+"))
            .extra(re(r"\s+"))
            .build()
            .build()
            .unwrap()
    }

    fn parser() -> Parser {
        let mut parser = Parser::new();
        parser.set_language(sum_language());
        parser
    }

    #[test]
    fn test_parser_config_default() {
        let config = ParserConfig::default();
        assert_eq!(config.max_input_size, DEFAULT_MAX_INPUT_SIZE);
        assert_eq!(config.max_versions, DEFAULT_MAX_VERSIONS);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.recovery_window, DEFAULT_RECOVERY_WINDOW);
    }

    #[test]
    fn test_parser_config_builder() {
        let config = ParserConfig::new()
            .with_max_input_size(1024)
            .with_max_versions(2)
            .with_max_operations(50)
            .with_max_nodes(10)
            .with_timeout_ms(5)
            .with_recovery_window(5);
        assert_eq!(config.max_input_size, 1024);
        assert_eq!(config.max_versions, 2);
        assert_eq!(config.max_operations, 50);
        assert_eq!(config.max_nodes, 10);
        assert_eq!(config.timeout_ms, 5);
        assert_eq!(config.recovery_window, 5);
    }

    #[test]
    fn test_no_language() {
        assert_eq!(Parser::new().parse("1").unwrap_err(), ParseError::NoLanguage);
    }

    #[test]
    fn test_input_too_large() {
        let mut parser = parser();
        parser.set_config(ParserConfig::default().with_max_input_size(3));
        assert_eq!(
            parser.parse("1+2+3").unwrap_err(),
            ParseError::InputTooLarge {
                input_size: 5,
                max_size: 3
            }
        );
    }

    #[test]
    fn test_left_associative_sum() {
        let tree = parser().parse("1+2+3").unwrap();
        let root = tree.root_node();
        assert_eq!(root.kind(), "expr");
        assert_eq!(root.byte_range(), 0..5);
        let left = root.child_by_field_name("left").unwrap();
        assert_eq!(left.byte_range(), 0..3);
        assert_eq!(left.child_count(), 3);
        let right = root.child_by_field_name("right").unwrap();
        assert_eq!(right.utf8_text("1+2+3"), "3");
        assert!(!root.has_error());
    }

    #[test]
    fn test_extras_are_spliced_into_root() {
        let text = "  1 + 2  ";
        let tree = parser().parse(text).unwrap();
        let root = tree.root_node();
        assert_eq!(root.byte_range(), 0..text.len());
        let covered: usize = tree.leaves().iter().map(|leaf| leaf.end_byte() - leaf.start_byte()).sum();
        assert_eq!(covered, text.len());
    }

    #[test]
    fn test_missing_operand_is_recovered() {
        let tree = parser().parse("1+").unwrap();
        let root = tree.root_node();
        assert_eq!(root.byte_range(), 0..2);
        assert!(root.has_error());
        let errors = tree.syntax_errors("1+");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_operation_limit_aborts() {
        let mut parser = parser();
        parser.set_config(ParserConfig::default().with_max_operations(3));
        match parser.parse("1+2+3+4") {
            Err(ParseError::ParseAborted {
                reason: AbortReason::OperationLimit { limit },
                ..
            }) => assert_eq!(limit, 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_cancellation_aborts() {
        let mut parser = parser();
        let flag = Arc::new(AtomicBool::new(true));
        parser.set_cancellation_flag(Some(Arc::clone(&flag)));
        match parser.parse("1+2") {
            Err(ParseError::ParseAborted {
                reason: AbortReason::Cancelled,
                position,
            }) => assert_eq!(position, 0),
            other => panic!("unexpected result: {:?}", other),
        }
        flag.store(false, AtomicOrdering::Relaxed);
        assert!(parser.parse("1+2").is_ok());
    }

    #[test]
    fn test_incremental_reuses_unchanged_prefix() {
        let parser = parser();
        let old_text = "1+2+3+4+5";
        let old = parser.parse(old_text).unwrap();
        let new_text = "1+2+3+4+6";
        let tree = parser
            .parse_incremental(&old, &[Edit::replace(8, 1, 1)], new_text)
            .unwrap();
        assert!(tree.structurally_eq(&parser.parse(new_text).unwrap()));
        assert!(tree.reuse_stats().reused_nodes > 0);
        assert_eq!(tree.changed_ranges().len(), 1);
    }

    #[test]
    fn test_incremental_rejects_inconsistent_edit() {
        let parser = parser();
        let old = parser.parse("1+2").unwrap();
        let result = parser.parse_incremental(&old, &[Edit::insert(1, 1)], "1+2");
        assert!(matches!(result, Err(ParseError::InvalidEdit { index: 0, .. })));
    }
}
