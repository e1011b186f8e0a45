//! Syntax trees
//!
//! Internally a tree is made of [`Node`]s: reference-counted, immutable,
//! position-independent records. A node stores its length but not its
//! offset, so the same node can be shared by successive trees even when
//! text before it was edited.
//!
//! The public view is [`SyntaxNode`], a node paired with its absolute start
//! offset. Hidden rules (names starting with `_`), auxiliary repetition
//! nodes and anonymous patterns are transparent in that view: their
//! visible descendants are reported as children of the nearest visible
//! ancestor.
//!
//! Trees can be arbitrarily deep (a left-recursive list of ten thousand
//! items is ten thousand levels deep), so every traversal here, including
//! `Drop`, uses an explicit stack.

use super::error::{SyntaxError, SyntaxErrorKind};
use super::external::ScannerState;
use super::incremental::{DirtyRegion, ReuseStats};
use super::language::Language;
use super::source_location::SourceSpan;
use super::symbol::{FieldId, SymbolId};
use super::table::{LexModeId, ProductionId, StateId};
use std::fmt;
use std::ops::{BitOr, Range};
use std::sync::Arc;

// ============================================================================
// Nodes
// ============================================================================

/// Node flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub(crate) struct NodeFlags(u8);

impl NodeFlags {
    pub const NONE: NodeFlags = NodeFlags(0);
    /// Synthesized by error recovery to wrap unparseable input
    pub const ERROR: NodeFlags = NodeFlags(1);
    /// Zero-width token inserted by error recovery
    pub const MISSING: NodeFlags = NodeFlags(1 << 1);
    /// Token allowed anywhere (whitespace, comments)
    pub const EXTRA: NodeFlags = NodeFlags(1 << 2);
    /// Some descendant is an error or missing node
    pub const HAS_ERROR: NodeFlags = NodeFlags(1 << 3);
    /// Built from an ambiguous table entry or while several stack versions were alive
    pub const FRAGILE: NodeFlags = NodeFlags(1 << 4);

    #[inline]
    pub fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: NodeFlags) {
        self.0 |= other.0;
    }
}

impl BitOr for NodeFlags {
    type Output = NodeFlags;

    fn bitor(self, rhs: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 | rhs.0)
    }
}

#[derive(Debug)]
pub(crate) struct NodeData {
    pub symbol: SymbolId,
    pub len: usize,
    pub children: Vec<Node>,
    /// Production that built the node; `None` for leaves and error nodes
    pub production: Option<ProductionId>,
    /// Stack state when the node's first token was shifted
    pub parse_state: StateId,
    /// Lex mode of the node's first token
    pub lex_mode: LexModeId,
    /// Bytes past the end the node's construction depended on
    pub lookahead_bytes: usize,
    /// Bytes before the start the node's construction depended on
    pub lookbehind_bytes: usize,
    pub flags: NodeFlags,
    pub error_cost: u32,
    pub dynamic_precedence: i32,
    pub scanner_before: Arc<ScannerState>,
    pub scanner_after: Arc<ScannerState>,
}

impl Drop for NodeData {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(node) = pending.pop() {
            if let Ok(mut data) = Arc::try_unwrap(node.0) {
                pending.append(&mut data.children);
            }
        }
    }
}

/// A shared, immutable tree node
#[derive(Debug, Clone)]
pub(crate) struct Node(Arc<NodeData>);

/// Everything needed to create a leaf
pub(crate) struct LeafSpec {
    pub symbol: SymbolId,
    pub len: usize,
    pub lookahead_bytes: usize,
    pub lookbehind_bytes: usize,
    pub parse_state: StateId,
    pub lex_mode: LexModeId,
    pub flags: NodeFlags,
    pub error_cost: u32,
    pub scanner_before: Arc<ScannerState>,
    pub scanner_after: Arc<ScannerState>,
}

/// Everything needed to create an internal node; the rest is summarized from the children
pub(crate) struct ParentSpec {
    pub symbol: SymbolId,
    pub production: Option<ProductionId>,
    pub parse_state: StateId,
    pub flags: NodeFlags,
    pub error_cost: u32,
    pub dynamic_precedence: i32,
    /// Bytes past the node's end examined by the token that triggered its reduction
    pub lookahead_bytes: usize,
    /// Scanner state used when the node has no children
    pub scanner: Arc<ScannerState>,
}

impl Node {
    pub fn leaf(spec: LeafSpec) -> Node {
        Node(Arc::new(NodeData {
            symbol: spec.symbol,
            len: spec.len,
            children: Vec::new(),
            production: None,
            parse_state: spec.parse_state,
            lex_mode: spec.lex_mode,
            lookahead_bytes: spec.lookahead_bytes,
            lookbehind_bytes: spec.lookbehind_bytes,
            flags: spec.flags,
            error_cost: spec.error_cost,
            dynamic_precedence: 0,
            scanner_before: spec.scanner_before,
            scanner_after: spec.scanner_after,
        }))
    }

    pub fn parent(spec: ParentSpec, children: Vec<Node>) -> Node {
        let mut len = 0;
        let mut extent = 0;
        let mut behind = 0;
        let mut flags = spec.flags;
        let mut error_cost = spec.error_cost;
        let mut dynamic_precedence = spec.dynamic_precedence;
        for child in &children {
            extent = extent.max(len + child.len() + child.0.lookahead_bytes);
            behind = behind.max(child.0.lookbehind_bytes.saturating_sub(len));
            len += child.len();
            if child.has_error() {
                flags.insert(NodeFlags::HAS_ERROR);
            }
            if child.is_fragile() {
                flags.insert(NodeFlags::FRAGILE);
            }
            error_cost = error_cost.saturating_add(child.0.error_cost);
            dynamic_precedence = dynamic_precedence.saturating_add(child.0.dynamic_precedence);
        }
        let lookahead_bytes = extent.saturating_sub(len).max(spec.lookahead_bytes);
        let (scanner_before, lex_mode) = match children.first() {
            Some(first) => (Arc::clone(&first.0.scanner_before), first.0.lex_mode),
            None => (Arc::clone(&spec.scanner), 0),
        };
        let scanner_after = match children.last() {
            Some(last) => Arc::clone(&last.0.scanner_after),
            None => spec.scanner,
        };
        Node(Arc::new(NodeData {
            symbol: spec.symbol,
            len,
            children,
            production: spec.production,
            parse_state: spec.parse_state,
            lex_mode,
            lookahead_bytes,
            lookbehind_bytes: behind,
            flags,
            error_cost,
            dynamic_precedence,
            scanner_before,
            scanner_after,
        }))
    }

    /// Copy of this node with extra children around it, keeping its production
    pub fn with_children(&self, children: Vec<Node>) -> Node {
        let (child_cost, child_precedence) = self.0.children.iter().fold((0u32, 0i32), |(c, d), n| {
            (c.saturating_add(n.0.error_cost), d.saturating_add(n.0.dynamic_precedence))
        });
        Node::parent(
            ParentSpec {
                symbol: self.0.symbol,
                production: self.0.production,
                parse_state: self.0.parse_state,
                flags: NodeFlags(
                    self.0.flags.0 & (NodeFlags::ERROR.0 | NodeFlags::EXTRA.0 | NodeFlags::FRAGILE.0),
                ),
                error_cost: self.0.error_cost.saturating_sub(child_cost),
                dynamic_precedence: self.0.dynamic_precedence.saturating_sub(child_precedence),
                lookahead_bytes: 0,
                scanner: Arc::clone(&self.0.scanner_before),
            },
            children,
        )
    }

    #[inline]
    pub fn data(&self) -> &NodeData {
        &self.0
    }

    #[inline]
    pub fn symbol(&self) -> SymbolId {
        self.0.symbol
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len
    }

    #[inline]
    pub fn children(&self) -> &[Node] {
        &self.0.children
    }

    #[inline]
    pub fn production(&self) -> Option<ProductionId> {
        self.0.production
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.0.children.is_empty() && self.0.production.is_none()
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.0.flags.contains(NodeFlags::ERROR)
    }

    #[inline]
    pub fn is_missing(&self) -> bool {
        self.0.flags.contains(NodeFlags::MISSING)
    }

    #[inline]
    pub fn is_extra(&self) -> bool {
        self.0.flags.contains(NodeFlags::EXTRA)
    }

    /// Extras and error nodes do not count as production children
    #[inline]
    pub fn is_extra_like(&self) -> bool {
        self.is_extra() || self.is_error()
    }

    #[inline]
    pub fn has_error(&self) -> bool {
        self.0.flags.contains(NodeFlags::HAS_ERROR) || self.is_error() || self.is_missing()
    }

    #[inline]
    pub fn is_fragile(&self) -> bool {
        self.0.flags.contains(NodeFlags::FRAGILE)
    }

    #[inline]
    pub fn error_cost(&self) -> u32 {
        self.0.error_cost
    }

    #[inline]
    pub fn dynamic_precedence(&self) -> i32 {
        self.0.dynamic_precedence
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The first leaf in preorder, or the first childless node
    pub fn first_leaf(&self) -> &Node {
        let mut node = self;
        while let Some(first) = node.0.children.first() {
            node = first;
        }
        node
    }

    /// Same shape, kinds, lengths and error flags
    pub fn structural_eq(&self, other: &Node) -> bool {
        let mut pending: Vec<(&Node, &Node)> = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            if a.ptr_eq(b) {
                continue;
            }
            let mask = NodeFlags::ERROR.0 | NodeFlags::MISSING.0 | NodeFlags::EXTRA.0;
            if a.0.symbol != b.0.symbol
                || a.0.len != b.0.len
                || a.0.production != b.0.production
                || (a.0.flags.0 & mask) != (b.0.flags.0 & mask)
                || a.0.children.len() != b.0.children.len()
            {
                return false;
            }
            pending.extend(a.0.children.iter().zip(&b.0.children));
        }
        true
    }

    /// Preorder comparison of production ids; lower ids win
    pub fn compare_productions(&self, other: &Node) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        let key = |node: &Node| match node.0.production {
            Some(p) => (0u8, p),
            None => (1u8, node.0.symbol.0 as u32),
        };
        let mut pending: Vec<(&Node, &Node)> = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            if a.ptr_eq(b) {
                continue;
            }
            match key(a).cmp(&key(b)) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
            match a.0.children.len().cmp(&b.0.children.len()) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
            pending.extend(a.0.children.iter().zip(&b.0.children).rev());
        }
        Ordering::Equal
    }
}

// ============================================================================
// Trees
// ============================================================================

/// A parsed syntax tree
///
/// Trees are immutable. Each parse, incremental or not, returns a new tree
/// and the previous one stays valid until dropped.
#[derive(Clone)]
pub struct Tree {
    root: Node,
    language: Language,
    source_len: usize,
    reuse: ReuseStats,
    changed: Vec<DirtyRegion>,
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{Tree {}}}", self.root_node().to_sexp())
    }
}

impl Tree {
    pub(crate) fn new(root: Node, language: Language, source_len: usize) -> Self {
        Self {
            root,
            language,
            source_len,
            reuse: ReuseStats::default(),
            changed: Vec::new(),
        }
    }

    pub(crate) fn with_incremental_info(mut self, reuse: ReuseStats, changed: Vec<DirtyRegion>) -> Self {
        self.reuse = reuse;
        self.changed = changed;
        self
    }

    pub(crate) fn root(&self) -> &Node {
        &self.root
    }

    /// The root node
    #[inline]
    pub fn root_node(&self) -> SyntaxNode<'_> {
        SyntaxNode {
            tree: self,
            node: &self.root,
            start: 0,
        }
    }

    /// Language the tree was parsed with
    #[inline]
    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Table format version of the language
    #[inline]
    pub fn language_version(&self) -> u32 {
        self.language.version()
    }

    /// Length of the parsed text
    #[inline]
    pub fn source_len(&self) -> usize {
        self.source_len
    }

    /// Subtree reuse statistics of the parse that produced this tree
    #[inline]
    pub fn reuse_stats(&self) -> &ReuseStats {
        &self.reuse
    }

    /// Ranges of the new text that were edited since the previous tree
    #[inline]
    pub fn changed_ranges(&self) -> &[DirtyRegion] {
        &self.changed
    }

    /// A cursor positioned at the root
    #[inline]
    pub fn walk(&self) -> TreeCursor<'_> {
        TreeCursor::new(self.root_node())
    }

    /// Structural equality: same kinds, lengths, productions and error flags
    pub fn structurally_eq(&self, other: &Tree) -> bool {
        self.source_len == other.source_len && self.root.structural_eq(&other.root)
    }

    /// Every token leaf, hidden ones included, in source order
    pub fn leaves(&self) -> Vec<SyntaxNode<'_>> {
        let mut leaves = Vec::new();
        let mut pending: Vec<(&Node, usize)> = vec![(&self.root, 0)];
        while let Some((node, start)) = pending.pop() {
            if node.is_leaf() {
                leaves.push(SyntaxNode {
                    tree: self,
                    node,
                    start,
                });
                continue;
            }
            let mut offset = start + node.len();
            for child in node.children().iter().rev() {
                offset -= child.len();
                pending.push((child, offset));
            }
        }
        leaves
    }

    /// Errors recorded in the tree, in source order
    pub fn syntax_errors(&self, source: &str) -> Vec<SyntaxError> {
        let mut errors = Vec::new();
        let mut pending: Vec<(&Node, usize)> = vec![(&self.root, 0)];
        while let Some((node, start)) = pending.pop() {
            if node.is_error() {
                errors.push(SyntaxError {
                    kind: SyntaxErrorKind::Unexpected,
                    span: SourceSpan::from_offsets(source, start, start + node.len()),
                });
                continue;
            }
            if node.is_missing() {
                errors.push(SyntaxError {
                    kind: SyntaxErrorKind::Missing {
                        expected: self.language.symbol_name(node.symbol()).to_string(),
                    },
                    span: SourceSpan::from_offsets(source, start, start),
                });
                continue;
            }
            if !node.has_error() {
                continue;
            }
            let mut offset = start + node.len();
            for child in node.children().iter().rev() {
                offset -= child.len();
                pending.push((child, offset));
            }
        }
        errors
    }
}

// ============================================================================
// Public node view
// ============================================================================

/// A node of a [`Tree`] together with its position
#[derive(Clone, Copy)]
pub struct SyntaxNode<'t> {
    tree: &'t Tree,
    node: &'t Node,
    start: usize,
}

impl PartialEq for SyntaxNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.node.ptr_eq(other.node) && self.start == other.start
    }
}

impl Eq for SyntaxNode<'_> {}

impl fmt::Debug for SyntaxNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{Node {} {}..{}}}", self.kind(), self.start_byte(), self.end_byte())
    }
}

impl<'t> SyntaxNode<'t> {
    /// Kind name (`ERROR` for error nodes)
    pub fn kind(&self) -> &'t str {
        if self.node.is_error() {
            "ERROR"
        } else {
            self.tree.language.symbols().name(self.node.symbol())
        }
    }

    /// Kind id
    #[inline]
    pub fn kind_id(&self) -> SymbolId {
        self.node.symbol()
    }

    /// Start byte
    #[inline]
    pub fn start_byte(&self) -> usize {
        self.start
    }

    /// End byte (exclusive)
    #[inline]
    pub fn end_byte(&self) -> usize {
        self.start + self.node.len()
    }

    /// Byte range
    #[inline]
    pub fn byte_range(&self) -> Range<usize> {
        self.start..self.end_byte()
    }

    /// Line/column span, computed from the source
    pub fn span(&self, source: &str) -> SourceSpan {
        SourceSpan::from_offsets(source, self.start, self.end_byte())
    }

    /// True for nodes of named rules and for error nodes
    pub fn is_named(&self) -> bool {
        self.node.is_error() || self.tree.language.symbols().is_named(self.node.symbol())
    }

    /// True if the node appears in the public view
    pub fn is_visible(&self) -> bool {
        self.node.is_error()
            || self.node.is_missing()
            || self.tree.language.symbols().is_visible(self.node.symbol())
    }

    /// True for `ERROR` nodes
    #[inline]
    pub fn is_error(&self) -> bool {
        self.node.is_error()
    }

    /// True for zero-width nodes inserted by error recovery
    #[inline]
    pub fn is_missing(&self) -> bool {
        self.node.is_missing()
    }

    /// True for extras (whitespace, comments)
    #[inline]
    pub fn is_extra(&self) -> bool {
        self.node.is_extra()
    }

    /// True if the node is, or contains, an error or missing node
    #[inline]
    pub fn has_error(&self) -> bool {
        self.node.has_error()
    }

    /// Source text of the node
    pub fn utf8_text<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.byte_range()).unwrap_or("")
    }

    /// Visible children paired with the field they fill
    fn visible_children_with_fields(&self) -> Vec<(Option<FieldId>, SyntaxNode<'t>)> {
        let symbols = self.tree.language.symbols();
        let table = self.tree.language.table();
        let mut result = Vec::new();
        // (node, start, inherited field), explored depth first in source order
        let mut pending: Vec<(&'t Node, usize, Option<FieldId>)> = Vec::new();
        push_children(self.node, self.start, None, table, &mut pending);
        while let Some((node, start, field)) = pending.pop() {
            let view = SyntaxNode {
                tree: self.tree,
                node,
                start,
            };
            if view.is_visible() {
                result.push((field, view));
            } else if !node.children().is_empty() && !symbols.is_terminal(node.symbol()) {
                push_children(node, start, field, table, &mut pending);
            }
        }
        result
    }

    /// Visible children
    pub fn children(&self) -> Vec<SyntaxNode<'t>> {
        self.visible_children_with_fields()
            .into_iter()
            .map(|(_, child)| child)
            .collect()
    }

    /// Number of visible children
    pub fn child_count(&self) -> usize {
        self.visible_children_with_fields().len()
    }

    /// Visible child by index
    pub fn child(&self, index: usize) -> Option<SyntaxNode<'t>> {
        self.visible_children_with_fields()
            .into_iter()
            .nth(index)
            .map(|(_, child)| child)
    }

    /// Named visible children
    pub fn named_children(&self) -> Vec<SyntaxNode<'t>> {
        self.children().into_iter().filter(|c| c.is_named()).collect()
    }

    /// Number of named visible children
    pub fn named_child_count(&self) -> usize {
        self.named_children().len()
    }

    /// Named visible child by index
    pub fn named_child(&self, index: usize) -> Option<SyntaxNode<'t>> {
        self.named_children().into_iter().nth(index)
    }

    /// First child filling a field
    pub fn child_by_field_name(&self, name: &str) -> Option<SyntaxNode<'t>> {
        let id = self.tree.language.field_id(name)?;
        self.visible_children_with_fields()
            .into_iter()
            .find(|(field, _)| *field == Some(id))
            .map(|(_, child)| child)
    }

    /// Every child filling a field
    pub fn children_by_field_name(&self, name: &str) -> Vec<SyntaxNode<'t>> {
        let Some(id) = self.tree.language.field_id(name) else {
            return Vec::new();
        };
        self.visible_children_with_fields()
            .into_iter()
            .filter(|(field, _)| *field == Some(id))
            .map(|(_, child)| child)
            .collect()
    }

    /// A cursor starting at this node
    pub fn walk(&self) -> TreeCursor<'t> {
        TreeCursor::new(*self)
    }

    /// S-expression of the named structure, e.g. `(sum left: (number) right: (number))`
    pub fn to_sexp(&self) -> String {
        enum Step<'t> {
            Open(Option<FieldId>, SyntaxNode<'t>),
            Close,
        }
        let language = &self.tree.language;
        let mut output = String::new();
        let mut pending = vec![Step::Open(None, *self)];
        while let Some(step) = pending.pop() {
            match step {
                Step::Close => output.push(')'),
                Step::Open(field, node) => {
                    if !output.is_empty() && !output.ends_with('(') {
                        output.push(' ');
                    }
                    if let Some(name) = field.and_then(|f| language.field_name(f)) {
                        output.push_str(name);
                        output.push_str(": ");
                    }
                    if node.is_missing() {
                        if node.is_named() {
                            output.push_str(&format!("(MISSING {})", node.kind()));
                        } else {
                            output.push_str(&format!("(MISSING {:?})", node.kind()));
                        }
                        continue;
                    }
                    output.push('(');
                    output.push_str(node.kind());
                    pending.push(Step::Close);
                    let children: Vec<_> = node
                        .visible_children_with_fields()
                        .into_iter()
                        .filter(|(_, c)| c.is_named() || c.is_missing())
                        .collect();
                    for (field, child) in children.into_iter().rev() {
                        pending.push(Step::Open(field, child));
                    }
                }
            }
        }
        output
    }
}

/// Push the children of `node` so that they pop in source order
fn push_children<'t>(
    node: &'t Node,
    start: usize,
    inherited: Option<FieldId>,
    table: &super::table::ParseTable,
    pending: &mut Vec<(&'t Node, usize, Option<FieldId>)>,
) {
    let fields = node
        .production()
        .and_then(|p| table.production(p))
        .map(|info| info.fields.as_slice())
        .unwrap_or(&[]);
    let mut entries = Vec::with_capacity(node.children().len());
    let mut offset = start;
    let mut structural = 0;
    for child in node.children() {
        let field = if child.is_extra_like() {
            None
        } else {
            let field = fields.get(structural).copied().flatten();
            structural += 1;
            field.or(inherited)
        };
        entries.push((child, offset, field));
        offset += child.len();
    }
    pending.extend(entries.into_iter().rev());
}

// ============================================================================
// Cursor
// ============================================================================

struct CursorFrame<'t> {
    siblings: Vec<(Option<FieldId>, SyntaxNode<'t>)>,
    index: usize,
}

/// Stateful walker over the visible tree with parent navigation
pub struct TreeCursor<'t> {
    root: SyntaxNode<'t>,
    frames: Vec<CursorFrame<'t>>,
}

impl<'t> TreeCursor<'t> {
    fn new(root: SyntaxNode<'t>) -> Self {
        Self {
            root,
            frames: Vec::new(),
        }
    }

    /// Current node
    pub fn node(&self) -> SyntaxNode<'t> {
        match self.frames.last() {
            Some(frame) => frame.siblings[frame.index].1,
            None => self.root,
        }
    }

    /// Field of the current node within its parent
    pub fn field_name(&self) -> Option<&'t str> {
        let frame = self.frames.last()?;
        let field = frame.siblings[frame.index].0?;
        self.root.tree.language.field_name(field)
    }

    /// Depth below the starting node
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Move to the first visible child
    pub fn goto_first_child(&mut self) -> bool {
        let siblings = self.node().visible_children_with_fields();
        if siblings.is_empty() {
            return false;
        }
        self.frames.push(CursorFrame { siblings, index: 0 });
        true
    }

    /// Move to the next visible sibling
    pub fn goto_next_sibling(&mut self) -> bool {
        match self.frames.last_mut() {
            Some(frame) if frame.index + 1 < frame.siblings.len() => {
                frame.index += 1;
                true
            }
            _ => false,
        }
    }

    /// Move to the parent
    pub fn goto_parent(&mut self) -> bool {
        self.frames.pop().is_some()
    }

    /// Move to the first child containing `offset`; returns its index
    pub fn goto_first_child_for_byte(&mut self, offset: usize) -> Option<usize> {
        let siblings = self.node().visible_children_with_fields();
        let index = siblings
            .iter()
            .position(|(_, child)| child.end_byte() > offset)?;
        self.frames.push(CursorFrame { siblings, index });
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(symbol: u16, len: usize) -> Node {
        Node::leaf(LeafSpec {
            symbol: SymbolId(symbol),
            len,
            lookahead_bytes: 1,
            lookbehind_bytes: 0,
            parse_state: 0,
            lex_mode: 0,
            flags: NodeFlags::NONE,
            error_cost: 0,
            scanner_before: Arc::default(),
            scanner_after: Arc::default(),
        })
    }

    fn parent(symbol: u16, production: u32, children: Vec<Node>) -> Node {
        Node::parent(
            ParentSpec {
                symbol: SymbolId(symbol),
                production: Some(production),
                parse_state: 0,
                flags: NodeFlags::NONE,
                error_cost: 0,
                dynamic_precedence: 0,
                lookahead_bytes: 0,
                scanner: Arc::default(),
            },
            children,
        )
    }

    #[test]
    fn test_parent_summarizes_children() {
        let missing = Node::leaf(LeafSpec {
            symbol: SymbolId(2),
            len: 0,
            lookahead_bytes: 0,
            lookbehind_bytes: 0,
            parse_state: 0,
            lex_mode: 0,
            flags: NodeFlags::MISSING,
            error_cost: 110,
            scanner_before: Arc::default(),
            scanner_after: Arc::default(),
        });
        let node = parent(5, 1, vec![leaf(1, 3), leaf(3, 2), missing]);
        assert_eq!(node.len(), 5);
        assert!(node.has_error());
        assert!(!node.is_error());
        assert_eq!(node.error_cost(), 110);
        // the second leaf examined one byte past the end of the node
        assert_eq!(node.data().lookahead_bytes, 1);
    }

    #[test]
    fn test_parent_keeps_lookbehind_reaching_past_its_start() {
        let looking_back = |behind: usize| {
            Node::leaf(LeafSpec {
                symbol: SymbolId(1),
                len: 2,
                lookahead_bytes: 0,
                lookbehind_bytes: behind,
                parse_state: 0,
                lex_mode: 0,
                flags: NodeFlags::NONE,
                error_cost: 0,
                scanner_before: Arc::default(),
                scanner_after: Arc::default(),
            })
        };
        // a column read 5 bytes back from the second leaf reaches 3 bytes before the parent
        let node = parent(5, 1, vec![leaf(1, 2), looking_back(5)]);
        assert_eq!(node.data().lookbehind_bytes, 3);
        let node = parent(5, 1, vec![leaf(1, 2), looking_back(2)]);
        assert_eq!(node.data().lookbehind_bytes, 0);
    }

    #[test]
    fn test_deep_chain_drops_without_overflow() {
        let mut node = leaf(1, 1);
        for _ in 0..200_000 {
            node = parent(5, 1, vec![node, leaf(1, 1)]);
        }
        assert_eq!(node.len(), 200_001);
        drop(node);
    }

    #[test]
    fn test_structural_eq_and_production_order() {
        let a = parent(5, 1, vec![leaf(1, 1), leaf(2, 1)]);
        let b = parent(5, 1, vec![leaf(1, 1), leaf(2, 1)]);
        let c = parent(5, 2, vec![leaf(1, 1), leaf(2, 1)]);
        assert!(a.structural_eq(&b));
        assert!(!a.structural_eq(&c));
        assert_eq!(a.compare_productions(&c), std::cmp::Ordering::Less);
        assert_eq!(a.compare_productions(&b), std::cmp::Ordering::Equal);
    }

    #[test]
    fn test_first_leaf() {
        let inner = parent(6, 2, vec![leaf(3, 2), leaf(4, 1)]);
        let outer = parent(5, 1, vec![inner, leaf(1, 1)]);
        assert_eq!(outer.first_leaf().symbol(), SymbolId(3));
    }
}
