//! Developer tools for inspecting trees and parse tables
//!
//! - [`TreePrinter`] renders a syntax tree as an indented outline
//! - [`TablePrinter`] dumps the states of a language's parse table

use super::language::Language;
use super::table::{Action, StateId};
use super::tree::{SyntaxNode, Tree};
use std::fmt::Write;

/// Depth below which [`TreePrinter`] elides subtrees unless told otherwise
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Syntax tree pretty printer
///
/// Subtrees deeper than [`DEFAULT_MAX_DEPTH`] are elided by default, which
/// keeps the indentation of pathological inputs bounded.
///
/// ```rust
/// use tessera::engine::debug::TreePrinter;
/// use tessera::engine::grammar_dsl::*;
///
/// let language = GrammarBuilder::new("pair")
///     .rule("pair", seq([sym("word"), str("="), sym("word")]))
///     .rule("word", re("[a-z]+"))
///     .build()
///     .build()
///     .unwrap();
/// let tree = language.parse("a=b").unwrap();
/// let outline = TreePrinter::new().print(&tree, "a=b");
/// assert!(outline.starts_with("pair [0..3]"));
/// ```
pub struct TreePrinter {
    /// Indentation string
    indent: String,
    /// Maximum depth to print
    max_depth: Option<usize>,
    /// Show leaf text
    show_text: bool,
}

impl TreePrinter {
    /// Create a new tree printer
    pub fn new() -> Self {
        Self {
            indent: "  ".to_string(),
            max_depth: Some(DEFAULT_MAX_DEPTH),
            show_text: true,
        }
    }

    /// Set the indentation string
    pub fn indent(mut self, indent: &str) -> Self {
        self.indent = indent.to_string();
        self
    }

    /// Set the maximum depth to print
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Print every level, however deep
    pub fn unlimited_depth(mut self) -> Self {
        self.max_depth = None;
        self
    }

    /// Show or hide the source text of leaves
    pub fn show_text(mut self, show: bool) -> Self {
        self.show_text = show;
        self
    }

    /// Print a whole tree
    pub fn print(&self, tree: &Tree, source: &str) -> String {
        self.print_node(tree.root_node(), source)
    }

    /// Print the subtree below `node`
    pub fn print_node(&self, node: SyntaxNode<'_>, source: &str) -> String {
        let mut output = String::new();
        let mut cursor = node.walk();
        loop {
            let depth = cursor.depth();
            self.write_line(&mut output, &cursor.node(), cursor.field_name(), depth, source);

            let at_limit = self.max_depth.is_some_and(|max| depth >= max);
            if at_limit {
                if cursor.node().child_count() > 0 {
                    self.write_indent(&mut output, depth + 1);
                    output.push_str("...\n");
                }
            } else if cursor.goto_first_child() {
                continue;
            }

            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return output;
                }
            }
        }
    }

    fn write_line(
        &self,
        output: &mut String,
        node: &SyntaxNode<'_>,
        field: Option<&str>,
        depth: usize,
        source: &str,
    ) {
        self.write_indent(output, depth);
        if let Some(field) = field {
            let _ = write!(output, "{}: ", field);
        }
        if node.is_named() || node.is_error() {
            let _ = write!(output, "{}", node.kind());
        } else {
            let _ = write!(output, "{:?}", node.kind());
        }
        let _ = write!(output, " [{}..{}]", node.start_byte(), node.end_byte());
        if node.is_missing() {
            output.push_str(" MISSING");
        }
        if node.is_extra() {
            output.push_str(" extra");
        }
        if self.show_text && node.child_count() == 0 && node.is_named() && !node.is_missing() {
            let _ = write!(output, " {:?}", node.utf8_text(source));
        }
        output.push('\n');
    }

    fn write_indent(&self, output: &mut String, depth: usize) {
        for _ in 0..depth {
            output.push_str(&self.indent);
        }
    }
}

impl Default for TreePrinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse table dump
///
/// One block per state: the lex mode, every action row and every goto.
/// Conflict entries list all of their actions in preference order.
pub struct TablePrinter<'a> {
    language: &'a Language,
}

impl<'a> TablePrinter<'a> {
    /// Create a printer for a language
    pub fn new(language: &'a Language) -> Self {
        Self { language }
    }

    /// Dump every state followed by the conflict summary
    pub fn print(&self) -> String {
        let table = self.language.table();
        let mut output = String::new();
        let _ = writeln!(
            output,
            "{}: {} states, {} productions, {} lex modes",
            self.language.name(),
            table.state_count(),
            table.production_count(),
            table.lex_mode_count()
        );
        for state in 0..table.state_count() as StateId {
            output.push('\n');
            output.push_str(&self.print_state(state));
        }
        if !table.conflicts().is_empty() {
            output.push('\n');
            output.push_str(&self.print_conflicts());
        }
        output
    }

    /// Dump one state
    pub fn print_state(&self, state: StateId) -> String {
        let table = self.language.table();
        let mut output = String::new();
        let Some(row) = table.states.get(state as usize) else {
            return output;
        };
        let _ = writeln!(output, "state {} (lex mode {})", state, row.lex_mode);
        for (symbol, actions) in &row.actions {
            let rendered: Vec<String> = actions.iter().map(|a| self.action(a)).collect();
            let _ = writeln!(
                output,
                "  {:<16} => {}",
                self.symbol(*symbol),
                rendered.join(" | ")
            );
        }
        for (symbol, target) in &row.gotos {
            let _ = writeln!(output, "  {:<16} -> goto {}", self.symbol(*symbol), target);
        }
        output
    }

    /// Conflicts kept in the table
    pub fn print_conflicts(&self) -> String {
        let mut output = String::new();
        let conflicts = self.language.conflicts();
        let _ = writeln!(output, "conflicts ({}):", conflicts.len());
        for conflict in conflicts {
            let rendered: Vec<String> = conflict.actions.iter().map(|a| self.action(a)).collect();
            let _ = writeln!(
                output,
                "  state {} on {}: {}",
                conflict.state,
                self.symbol(conflict.lookahead),
                rendered.join(" | ")
            );
        }
        output
    }

    fn symbol(&self, symbol: super::symbol::SymbolId) -> String {
        let symbols = self.language.symbols();
        let name = self.language.symbol_name(symbol);
        if symbols.is_named(symbol) {
            name.to_string()
        } else {
            format!("{:?}", name)
        }
    }

    fn action(&self, action: &Action) -> String {
        match action {
            Action::Shift { state } => format!("shift {}", state),
            Action::Accept => "accept".to_string(),
            Action::Reduce { production } => match self.language.table().production(*production) {
                Some(info) => format!(
                    "reduce {}/{} ({})",
                    self.symbol(info.lhs),
                    info.child_count,
                    production
                ),
                None => format!("reduce ({})", production),
            },
        }
    }
}
