//! Integration tests for incremental parsing
//!
//! These tests cover the incremental parsing functionality including:
//! - Edit construction and position translation
//! - Edit batches and the edit map
//! - Dirty region tracking and changed ranges
//! - Subtree reuse and equivalence with a full parse

use tessera::engine::{DirtyRegionTracker, EditMap};
use tessera::prelude::*;

fn sum_parser() -> Parser {
    let language = GrammarBuilder::new("sum")
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
        .unwrap();
    let mut parser = Parser::new();
    parser.set_language(language);
    parser
}

fn arithmetic_parser() -> Parser {
    let language = GrammarBuilder::new("arith")
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
        .extra(re(r"\s+"))
        .build()
        .build()
        .unwrap();
    let mut parser = Parser::new();
    parser.set_language(language);
    parser
}

fn long_sum(terms: usize) -> String {
    (1..=terms)
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(" + ")
}

/// Apply an edit to a string the way an editor would
fn apply(text: &str, offset: usize, old_len: usize, replacement: &str) -> (String, Edit) {
    let mut result = String::with_capacity(text.len() + replacement.len());
    result.push_str(&text[..offset]);
    result.push_str(replacement);
    result.push_str(&text[offset + old_len..]);
    (result, Edit::new(offset, old_len, replacement.len()))
}

// ============================================================================
// Edit Tests
// ============================================================================

#[test]
fn test_edit_constructors() {
    assert_eq!(Edit::insert(5, 10), Edit::new(5, 0, 10));
    assert_eq!(Edit::delete(3, 8), Edit::new(3, 8, 0));
    assert_eq!(Edit::replace(2, 3, 4), Edit::new(2, 3, 4));
    assert_eq!(Edit::replace(2, 3, 4).delta(), 1);
    assert_eq!(Edit::delete(3, 8).delta(), -8);
}

#[test]
fn test_edit_ranges_and_translation() {
    let edit = Edit::replace(10, 5, 2);
    assert_eq!(edit.old_range(), 10..15);
    assert_eq!(edit.new_range(), 10..12);
    assert_eq!(edit.translate_position(4), 4);
    assert_eq!(edit.translate_position(20), 17);
}

// ============================================================================
// Edit Map Tests
// ============================================================================

#[test]
fn test_edit_map_composes_batches() {
    // "abcdef" -> "aXcdef" -> "aXcd"
    let map = EditMap::new(6, &[Edit::replace(1, 1, 1), Edit::delete(4, 2)]).unwrap();
    assert_eq!(map.old_len(), 6);
    assert_eq!(map.new_len(), 4);
    assert_eq!(map.new_to_old(0), Some(0));
    assert_eq!(map.new_to_old(1), None);
    assert_eq!(map.new_to_old(3), Some(3));
    // "d" survives together with its left neighbour "c"
    assert!(map.is_intact(3, 4, 0));
    // but not with one byte of lookahead, "e" was deleted
    assert!(!map.is_intact(3, 4, 1));
    // "b" was replaced
    assert!(!map.is_intact(2, 4, 0));
    assert!(!map.is_intact(0, 2, 0));
}

#[test]
fn test_edit_map_rejects_out_of_range_edit() {
    let result = EditMap::new(4, &[Edit::insert(1, 2), Edit::delete(5, 3)]);
    assert!(matches!(result, Err(ParseError::InvalidEdit { index: 1, .. })));
}

#[test]
fn test_changed_ranges_of_insert_and_delete() {
    let map = EditMap::new(10, &[Edit::insert(2, 3)]).unwrap();
    assert_eq!(map.changed_ranges(), vec![DirtyRegion::new(2, 5)]);

    let map = EditMap::new(10, &[Edit::delete(4, 2)]).unwrap();
    assert_eq!(map.changed_ranges(), vec![DirtyRegion::new(4, 4)]);
}

// ============================================================================
// Dirty Region Tests
// ============================================================================

#[test]
fn test_dirty_region_tracker_merges_overlaps() {
    let mut tracker = DirtyRegionTracker::new();
    assert!(tracker.is_empty());
    tracker.mark_dirty(DirtyRegion::new(10, 20));
    tracker.mark_dirty(DirtyRegion::new(30, 40));
    tracker.mark_dirty(DirtyRegion::new(15, 32));
    assert_eq!(tracker.regions(), &[DirtyRegion::new(10, 40)]);
    assert!(tracker.is_dirty(25));
    assert!(!tracker.is_dirty(40));
    assert!(tracker.is_range_dirty(0, 11));
    assert!(!tracker.is_range_dirty(0, 10));
}

// ============================================================================
// Reuse Tests
// ============================================================================

#[test]
fn test_replacing_last_term_reuses_prefix() {
    let parser = sum_parser();
    let old_text = long_sum(40);
    let old = parser.parse(&old_text).unwrap();

    let (new_text, edit) = apply(&old_text, old_text.len() - 2, 2, "99");
    let tree = parser.parse_incremental(&old, &[edit], &new_text).unwrap();
    let fresh = parser.parse(&new_text).unwrap();

    assert!(tree.structurally_eq(&fresh));
    let stats = tree.reuse_stats();
    assert!(stats.reused_nodes > 0);
    assert!(stats.reused_bytes > new_text.len() / 2);
    assert!(stats.lexed_tokens < fresh.reuse_stats().lexed_tokens);
    assert!(stats.efficiency(new_text.len()) > 0.5);
}

#[test]
fn test_edit_at_start_matches_full_parse() {
    let parser = sum_parser();
    let old_text = long_sum(10);
    let old = parser.parse(&old_text).unwrap();
    let (new_text, edit) = apply(&old_text, 0, 1, "100");
    let tree = parser.parse_incremental(&old, &[edit], &new_text).unwrap();
    assert!(tree.structurally_eq(&parser.parse(&new_text).unwrap()));
    assert_eq!(tree.changed_ranges(), &[DirtyRegion::new(0, 3)]);
}

#[test]
fn test_append_and_truncate_match_full_parse() {
    let parser = sum_parser();
    let old_text = long_sum(10);
    let old = parser.parse(&old_text).unwrap();

    let (appended, edit) = apply(&old_text, old_text.len(), 0, " + 11");
    let tree = parser.parse_incremental(&old, &[edit], &appended).unwrap();
    assert!(tree.structurally_eq(&parser.parse(&appended).unwrap()));

    let (truncated, edit) = apply(&old_text, old_text.len() - 5, 5, "");
    let tree = parser.parse_incremental(&old, &[edit], &truncated).unwrap();
    assert!(tree.structurally_eq(&parser.parse(&truncated).unwrap()));
}

#[test]
fn test_batch_of_edits_matches_full_parse() {
    let parser = sum_parser();
    let old_text = "1 + 2 + 3 + 4";
    let old = parser.parse(old_text).unwrap();

    let (step1, e1) = apply(old_text, 0, 1, "10");
    let (step2, e2) = apply(&step1, step1.len() - 1, 1, "40");
    let tree = parser.parse_incremental(&old, &[e1, e2], &step2).unwrap();
    assert_eq!(step2, "10 + 2 + 3 + 40");
    assert!(tree.structurally_eq(&parser.parse(&step2).unwrap()));
    assert_eq!(tree.changed_ranges().len(), 2);
}

#[test]
fn test_introducing_and_fixing_an_error() {
    let parser = sum_parser();
    let text = "1 + 2 + 3";
    let old = parser.parse(text).unwrap();

    let (broken, edit) = apply(text, 4, 1, "");
    let tree = parser.parse_incremental(&old, &[edit], &broken).unwrap();
    assert!(tree.root_node().has_error());
    assert!(tree.structurally_eq(&parser.parse(&broken).unwrap()));

    let (fixed, edit) = apply(&broken, 4, 0, "7");
    let repaired = parser.parse_incremental(&tree, &[edit], &fixed).unwrap();
    assert!(!repaired.root_node().has_error());
    assert!(repaired.structurally_eq(&parser.parse(&fixed).unwrap()));
}

#[test]
fn test_empty_edit_batch_reuses_tree() {
    let parser = sum_parser();
    let text = long_sum(5);
    let old = parser.parse(&text).unwrap();
    let tree = parser.parse_incremental(&old, &[], &text).unwrap();
    assert!(tree.structurally_eq(&old));
    assert!(tree.changed_ranges().is_empty());
    assert!(tree.reuse_stats().reused_nodes > 0);
}

#[test]
fn test_edit_inconsistent_with_new_text_is_rejected() {
    let parser = sum_parser();
    let old = parser.parse("1 + 2").unwrap();
    assert!(matches!(
        parser.parse_incremental(&old, &[Edit::delete(2, 10)], "1"),
        Err(ParseError::InvalidEdit { index: 0, .. })
    ));
    assert!(matches!(
        parser.parse_incremental(&old, &[Edit::insert(0, 1)], "1 + 2"),
        Err(ParseError::InvalidEdit { .. })
    ));
}

#[test]
fn test_tessera_program_edit_matches_full_parse() {
    let mut parser = Parser::new();
    parser.set_language(tessera::languages::tessera::language().unwrap());

    let old_text = "fn i32 add(i32 a, i32 b) {\n    |> a + b;\n}\n\nfn void main() {\n    i32 x := add(1, 2);\n}\n";
    let old = parser.parse(old_text).unwrap();
    assert!(!old.root_node().has_error());

    let offset = old_text.find("add(1").unwrap() + 4;
    let (new_text, edit) = apply(old_text, offset, 1, "100");
    let tree = parser.parse_incremental(&old, &[edit], &new_text).unwrap();
    assert!(!tree.root_node().has_error());
    assert!(tree.structurally_eq(&parser.parse(&new_text).unwrap()));
    assert!(tree.reuse_stats().reused_nodes > 0);
}

#[test]
fn test_recovery_after_edits_matches_full_parse() {
    let parser = arithmetic_parser();
    let old_text = "((2(*2 +(";
    let old = parser.parse(old_text).unwrap();
    assert!(old.root_node().has_error());

    for inserted in ["1", ")", "*", "(", " "] {
        let (step1, e1) = apply(old_text, 7, 1, "");
        let (step2, e2) = apply(&step1, 8.min(step1.len()), 0, inserted);
        let tree = parser.parse_incremental(&old, &[e1, e2], &step2).unwrap();
        let fresh = parser.parse(&step2).unwrap();
        assert!(tree.structurally_eq(&fresh), "{:?}", step2);
        assert_eq!(tree.root_node().to_sexp(), fresh.root_node().to_sexp());
    }
}

#[test]
fn test_reparsing_broken_tessera_source_is_stable() {
    let mut parser = Parser::new();
    parser.set_language(tessera::languages::tessera::language().unwrap());

    let text = "|> \u{e9}\n()x;fn  }x + 1";
    let old = parser.parse(text).unwrap();
    assert!(old.root_node().has_error());
    let tree = parser.parse_incremental(&old, &[], text).unwrap();
    assert!(tree.structurally_eq(&old));
    assert_eq!(tree.root_node().to_sexp(), old.root_node().to_sexp());
    assert_eq!(tree.root_node().byte_range(), 0..text.len());
}
