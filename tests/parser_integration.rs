//! Integration tests for the GLR parser
//!
//! These tests cover:
//! - Precedence and associativity in the built tables
//! - Fields, extras and hidden rules in the resulting tree
//! - Cursor navigation
//! - Declared conflicts and dynamic precedence
//! - Determinism of table construction and parsing

use std::sync::Arc;
use tessera::prelude::*;

fn arithmetic() -> Language {
    GrammarBuilder::new("arith")
        .rule("expr", choice([sym("number"), sym("sum"), sym("product"), sym("group")]))
        .rule(
            "sum",
            prec_left(1, seq([field("left", sym("expr")), str("+"), field("right", sym("expr"))])),
        )
        .rule(
            "product",
            prec_left(2, seq([field("left", sym("expr")), str("*"), field("right", sym("expr"))])),
        )
        .rule("group", seq([str("("), sym("expr"), str(")")]))
        .rule("number", re("[0-9]+"))
        .rule("comment", re("#[^\n]*"))
        .extra(re(r"\s+"))
        .extra(sym("comment"))
        .build()
        .build()
        .unwrap()
}

fn covered_bytes(tree: &Tree) -> usize {
    tree.leaves()
        .iter()
        .map(|leaf| leaf.end_byte() - leaf.start_byte())
        .sum()
}

// ============================================================================
// Precedence Tests
// ============================================================================

#[test]
fn test_left_associativity_builds_left_deep_tree() {
    let text = "1+2+3";
    let tree = arithmetic().parse(text).unwrap();
    let root = tree.root_node();
    assert_eq!(root.kind(), "expr");
    let sum = root.named_child(0).unwrap();
    assert_eq!(sum.kind(), "sum");

    let left = sum.child_by_field_name("left").unwrap();
    assert_eq!(left.byte_range(), 0..3);
    assert_eq!(left.named_child(0).unwrap().kind(), "sum");
    let right = sum.child_by_field_name("right").unwrap();
    assert_eq!(right.utf8_text(text), "3");
}

#[test]
fn test_higher_precedence_binds_tighter() {
    let text = "1+2*3";
    let tree = arithmetic().parse(text).unwrap();
    let sum = tree.root_node().named_child(0).unwrap();
    assert_eq!(sum.kind(), "sum");
    let right = sum.child_by_field_name("right").unwrap();
    assert_eq!(right.utf8_text(text), "2*3");
    assert_eq!(right.named_child(0).unwrap().kind(), "product");
}

#[test]
fn test_parentheses_override_precedence() {
    let text = "(1+2)*3";
    let tree = arithmetic().parse(text).unwrap();
    let product = tree.root_node().named_child(0).unwrap();
    assert_eq!(product.kind(), "product");
    let left = product.child_by_field_name("left").unwrap();
    assert_eq!(left.utf8_text(text), "(1+2)");
    assert!(!tree.root_node().has_error());
}

#[test]
fn test_sexp_output() {
    let tree = arithmetic().parse("1*2").unwrap();
    assert_eq!(
        tree.root_node().to_sexp(),
        "(expr (product left: (expr (number)) right: (expr (number))))"
    );
}

// ============================================================================
// Tree Shape Tests
// ============================================================================

#[test]
fn test_extras_are_covered_by_leaves() {
    let text = "  1 + # one\n 2  ";
    let tree = arithmetic().parse(text).unwrap();
    let root = tree.root_node();
    assert_eq!(root.byte_range(), 0..text.len());
    assert_eq!(covered_bytes(&tree), text.len());
    assert!(!root.has_error());

    let comment = tree
        .leaves()
        .into_iter()
        .find(|leaf| leaf.kind() == "comment")
        .unwrap();
    assert!(comment.is_extra());
    assert_eq!(comment.utf8_text(text), "# one");
}

#[test]
fn test_anonymous_tokens_are_visible_but_unnamed() {
    let text = "1+2";
    let tree = arithmetic().parse(text).unwrap();
    let sum = tree.root_node().named_child(0).unwrap();
    assert_eq!(sum.child_count(), 3);
    let plus = sum.child(1).unwrap();
    assert_eq!(plus.kind(), "+");
    assert!(!plus.is_named());
    assert_eq!(sum.named_child_count(), 2);
}

#[test]
fn test_hidden_rules_are_spliced() {
    let language = GrammarBuilder::new("list")
        .rule("list", seq([str("["), optional(sym("_items")), str("]")]))
        .rule("_items", sep_by1(str(","), sym("word")))
        .rule("word", re("[a-z]+"))
        .extra(re(r"\s+"))
        .build()
        .build()
        .unwrap();
    let tree = language.parse("[a, b, c]").unwrap();
    let root = tree.root_node();
    assert_eq!(root.named_child_count(), 3);
    assert!(root.named_children().iter().all(|child| child.kind() == "word"));
    assert_eq!(root.to_sexp(), "(list (word) (word) (word))");
}

#[test]
fn test_cursor_walk_visits_all_visible_nodes() {
    let text = "1+2";
    let tree = arithmetic().parse(text).unwrap();
    let mut cursor = tree.walk();
    let mut kinds = Vec::new();
    loop {
        kinds.push(cursor.node().kind().to_string());
        if cursor.goto_first_child() || cursor.goto_next_sibling() {
            continue;
        }
        let mut done = true;
        while cursor.goto_parent() {
            if cursor.goto_next_sibling() {
                done = false;
                break;
            }
        }
        if done {
            break;
        }
    }
    assert_eq!(
        kinds,
        ["expr", "sum", "expr", "number", "+", "expr", "number"]
    );
}

#[test]
fn test_cursor_field_names() {
    let tree = arithmetic().parse("4*5").unwrap();
    let mut cursor = tree.walk();
    assert!(cursor.goto_first_child());
    assert!(cursor.goto_first_child());
    assert_eq!(cursor.field_name(), Some("left"));
    assert_eq!(cursor.depth(), 2);
    assert!(cursor.goto_next_sibling());
    assert_eq!(cursor.field_name(), None);
    assert!(cursor.goto_next_sibling());
    assert_eq!(cursor.field_name(), Some("right"));
}

// ============================================================================
// Conflict Tests
// ============================================================================

fn ambiguous_pairs(dynamic: i32) -> Language {
    let right = if dynamic == 0 {
        seq([sym("word"), sym("word")])
    } else {
        prec_dynamic(dynamic, seq([sym("word"), sym("word")]))
    };
    GrammarBuilder::new("pairs")
        .rule("doc", choice([sym("left_form"), sym("right_form")]))
        .rule("left_form", seq([sym("word"), sym("word")]))
        .rule("right_form", right)
        .rule("word", re("[a-z]+"))
        .extra(re(r"\s+"))
        .conflict(["left_form", "right_form"])
        .build()
        .build()
        .unwrap()
}

#[test]
fn test_declared_conflict_is_kept_in_table() {
    let language = ambiguous_pairs(0);
    assert!(!language.conflicts().is_empty());
    assert!(language
        .conflicts()
        .iter()
        .all(|conflict| conflict.actions.len() > 1));
}

#[test]
fn test_earliest_production_wins_without_dynamic_precedence() {
    let tree = ambiguous_pairs(0).parse("ab cd").unwrap();
    assert_eq!(tree.root_node().to_sexp(), "(doc (left_form (word) (word)))");
}

#[test]
fn test_dynamic_precedence_selects_interpretation() {
    let tree = ambiguous_pairs(2).parse("ab cd").unwrap();
    assert_eq!(tree.root_node().to_sexp(), "(doc (right_form (word) (word)))");
    assert!(!tree.root_node().has_error());
}

#[test]
fn test_unprecedenced_ambiguity_still_parses() {
    let language = GrammarBuilder::new("amb")
        .rule("expr", choice([sym("number"), seq([sym("expr"), str("-"), sym("expr")])]))
        .rule("number", re("[0-9]+"))
        .conflict(["expr"])
        .build()
        .build()
        .unwrap();
    let text = "1-2-3-4";
    let first = language.parse(text).unwrap();
    assert!(!first.root_node().has_error());
    assert_eq!(first.root_node().byte_range(), 0..text.len());
    for _ in 0..5 {
        assert_eq!(language.parse(text).unwrap().root_node().to_sexp(), first.root_node().to_sexp());
    }
}

// ============================================================================
// Determinism Tests
// ============================================================================

#[test]
fn test_table_construction_is_deterministic() {
    let a = arithmetic();
    let b = arithmetic();
    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    assert_eq!(
        TablePrinter::new(&a).print(),
        TablePrinter::new(&b).print()
    );
}

#[test]
fn test_parsing_is_idempotent() {
    let language = arithmetic();
    let text = "(1 + 2) * 3 + 4 # done";
    let first = language.parse(text).unwrap();
    let second = language.parse(text).unwrap();
    assert!(first.structurally_eq(&second));
    assert_eq!(first.root_node().to_sexp(), second.root_node().to_sexp());
}

#[test]
fn test_language_and_tree_are_shareable_across_threads() {
    let language = Arc::new(arithmetic());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let language = Arc::clone(&language);
            std::thread::spawn(move || {
                let text = format!("{} + {} * {}", i, i + 1, i + 2);
                let tree = language.parse(&text).unwrap();
                tree.root_node().to_sexp()
            })
        })
        .collect();
    let results: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn test_empty_input_for_nullable_start() {
    let language = GrammarBuilder::new("words")
        .rule("doc", repeat(sym("word")))
        .rule("word", re("[a-z]+"))
        .extra(re(r"\s+"))
        .build()
        .build()
        .unwrap();
    let tree = language.parse("").unwrap();
    assert_eq!(tree.root_node().kind(), "doc");
    assert_eq!(tree.root_node().byte_range(), 0..0);
    assert!(!tree.root_node().has_error());

    let tree = language.parse("   ").unwrap();
    assert_eq!(tree.root_node().byte_range(), 0..3);
    assert!(!tree.root_node().has_error());
}
