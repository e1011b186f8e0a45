//! Graph-structured parse stack
//!
//! Each stack version is a pointer to a head [`StackNode`]. Nodes link back
//! to their predecessors, so versions forked at a conflict share everything
//! below the fork point. When two versions reach the same state at the
//! same offset they are merged into one node with several links, and a
//! later reduction explores every path through those links.
//!
//! ```text
//!            ┌── [7] ◄── (expr) ── [12]     version A
//!  [0] ◄── [3]
//!            └── [9] ◄── (call) ── [12]     version B
//!
//!  after merging A and B:  [12] has two links, one per path
//! ```
//!
//! Extras and error nodes are pushed without changing the state. They do
//! not count as production children when popping.

use super::external::ScannerState;
use super::table::StateId;
use super::tree::Node;
use std::sync::Arc;

/// Upper bound on the paths explored by one pop
pub(crate) const MAX_POP_PATHS: usize = 16;

/// A link to the node below, labelled with the subtree between them
#[derive(Debug, Clone)]
pub(crate) struct StackLink {
    pub prev: Arc<StackNode>,
    pub subtree: Node,
}

/// One node of the stack graph
#[derive(Debug)]
pub(crate) struct StackNode {
    pub state: StateId,
    /// Byte offset reached at this node
    pub position: usize,
    /// Links to the node(s) below; the first link is the preferred path
    pub links: Vec<StackLink>,
    /// Error cost of the preferred path
    pub error_cost: u32,
    /// Dynamic precedence of the preferred path
    pub dynamic_precedence: i32,
    /// External scanner state after the top subtree
    pub scanner: Arc<ScannerState>,
}

impl Drop for StackNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.links);
        while let Some(link) = pending.pop() {
            if let Ok(mut node) = Arc::try_unwrap(link.prev) {
                pending.append(&mut node.links);
            }
        }
    }
}

/// The subtrees popped along one path
#[derive(Debug)]
pub(crate) struct PopPath {
    /// Node the path ends at
    pub base: Arc<StackNode>,
    /// Popped subtrees in source order, without the trailing extras
    pub children: Vec<Node>,
    /// Extras that sat on top of the last structural child
    pub trailing: Vec<Node>,
}

impl StackNode {
    /// The bottom of a new stack
    pub fn base(state: StateId) -> Arc<StackNode> {
        Arc::new(StackNode {
            state,
            position: 0,
            links: Vec::new(),
            error_cost: 0,
            dynamic_precedence: 0,
            scanner: Arc::default(),
        })
    }

    /// Push `subtree` on `prev`, entering `state`
    pub fn push(prev: &Arc<StackNode>, state: StateId, subtree: Node) -> Arc<StackNode> {
        let data = subtree.data();
        Arc::new(StackNode {
            state,
            position: prev.position + subtree.len(),
            error_cost: prev.error_cost.saturating_add(subtree.error_cost()),
            dynamic_precedence: prev
                .dynamic_precedence
                .saturating_add(subtree.dynamic_precedence()),
            scanner: Arc::clone(&data.scanner_after),
            links: vec![StackLink {
                prev: Arc::clone(prev),
                subtree,
            }],
        })
    }

    /// A node with the links of several heads in the same state at the same offset
    ///
    /// Links are ordered best first; `error_cost` and `dynamic_precedence`
    /// are taken from the first one.
    pub fn merged(
        state: StateId,
        position: usize,
        scanner: Arc<ScannerState>,
        links: Vec<StackLink>,
    ) -> Arc<StackNode> {
        let (error_cost, dynamic_precedence) = links.first().map(link_score).unwrap_or((0, 0));
        Arc::new(StackNode {
            state,
            position,
            links,
            error_cost,
            dynamic_precedence,
            scanner,
        })
    }

    /// Pop `count` structural subtrees along every path, up to [`MAX_POP_PATHS`]
    pub fn pop_count(head: &Arc<StackNode>, count: usize) -> Vec<PopPath> {
        struct Walk {
            node: Arc<StackNode>,
            popped: Vec<Node>,
            remaining: usize,
        }

        let mut paths = Vec::new();
        let mut pending = vec![Walk {
            node: Arc::clone(head),
            popped: Vec::new(),
            remaining: count,
        }];
        while let Some(walk) = pending.pop() {
            if walk.remaining == 0 {
                paths.push(finish_path(walk.node, walk.popped));
                continue;
            }
            let links = &walk.node.links;
            // push in reverse so the first link is explored first
            for (index, link) in links.iter().enumerate().rev() {
                if index > 0 && paths.len() + pending.len() >= MAX_POP_PATHS {
                    continue;
                }
                let mut popped = walk.popped.clone();
                popped.push(link.subtree.clone());
                let remaining = if link.subtree.is_extra_like() {
                    walk.remaining
                } else {
                    walk.remaining - 1
                };
                pending.push(Walk {
                    node: Arc::clone(&link.prev),
                    popped,
                    remaining,
                });
            }
        }
        paths
    }

    /// Every subtree along the preferred path, in source order
    pub fn preferred_path(head: &Arc<StackNode>) -> Vec<Node> {
        let mut subtrees = Vec::new();
        let mut node = head;
        while let Some(link) = node.links.first() {
            subtrees.push(link.subtree.clone());
            node = &link.prev;
        }
        subtrees.reverse();
        subtrees
    }
}

/// Cost and precedence of the path through a link
pub(crate) fn link_score(link: &StackLink) -> (u32, i32) {
    (
        link.prev.error_cost.saturating_add(link.subtree.error_cost()),
        link.prev
            .dynamic_precedence
            .saturating_add(link.subtree.dynamic_precedence()),
    )
}

fn finish_path(base: Arc<StackNode>, mut popped: Vec<Node>) -> PopPath {
    // `popped` runs from the top of the stack downwards
    let trailing_count = popped
        .iter()
        .take_while(|node| node.is_extra_like())
        .count();
    let mut trailing: Vec<Node> = popped.drain(..trailing_count).collect();
    trailing.reverse();
    popped.reverse();
    PopPath {
        base,
        children: popped,
        trailing,
    }
}
