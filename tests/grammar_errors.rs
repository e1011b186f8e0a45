//! Integration tests for grammar validation
//!
//! Every grammar defect is reported as a [`GrammarError`] when the grammar is
//! built; no table is produced. These tests cover each error kind and the
//! warnings that accompany a successful build.

use tessera::engine::WarningKind;
use tessera::prelude::*;

fn build_error(grammar: Grammar) -> GrammarError {
    match grammar.build() {
        Ok(language) => panic!("expected an error, built {:?}", language),
        Err(err) => err,
    }
}

// ============================================================================
// Structural Errors
// ============================================================================

#[test]
fn test_no_rules() {
    let err = build_error(GrammarBuilder::new("empty").build());
    assert_eq!(err, GrammarError::NoRules);
}

#[test]
fn test_duplicate_rule() {
    let err = build_error(
        GrammarBuilder::new("dup")
            .rule("start", str("a"))
            .rule("start", str("b"))
            .build(),
    );
    assert_eq!(
        err,
        GrammarError::DuplicateRule {
            name: "start".into()
        }
    );
}

#[test]
fn test_rule_and_external_share_name() {
    let err = build_error(
        GrammarBuilder::new("dup")
            .external("indent")
            .rule("start", seq([sym("indent"), str("x")]))
            .rule("indent", str("  "))
            .build(),
    );
    assert!(matches!(err, GrammarError::DuplicateRule { name } if name == "indent"));
}

#[test]
fn test_undefined_symbol() {
    let err = build_error(
        GrammarBuilder::new("undef")
            .rule("expr", seq([sym("term"), str("+"), sym("term")]))
            .build(),
    );
    assert_eq!(
        err,
        GrammarError::UndefinedSymbol {
            name: "term".into(),
            rule: "expr".into()
        }
    );
}

#[test]
fn test_unreachable_rule() {
    let err = build_error(
        GrammarBuilder::new("orphan")
            .rule("start", repeat1(sym("word")))
            .rule("word", re("[a-z]+"))
            .rule("orphan", seq([sym("word"), str(";")]))
            .build(),
    );
    assert_eq!(
        err,
        GrammarError::UnreachableRule {
            name: "orphan".into()
        }
    );
}

#[test]
fn test_rules_reachable_through_extras_are_accepted() {
    let language = GrammarBuilder::new("commented")
        .rule("start", repeat1(sym("word")))
        .rule("word", re("[a-z]+"))
        .rule("comment", re("#[^\n]*"))
        .extra(re(r"\s+"))
        .extra(sym("comment"))
        .build()
        .build();
    assert!(language.is_ok());
}

#[test]
fn test_unit_cycle_is_rejected() {
    let err = build_error(
        GrammarBuilder::new("cycle")
            .rule("a", choice([sym("b"), str("x")]))
            .rule("b", choice([sym("a"), str("y")]))
            .build(),
    );
    match err {
        GrammarError::LeftRecursionUnsupportedByStrategy { rule, cycle } => {
            assert_eq!(cycle.first(), Some(&rule));
            assert_eq!(cycle.first(), cycle.last());
        }
        other => panic!("expected cycle error, got {:?}", other),
    }
}

#[test]
fn test_left_recursion_that_consumes_input_is_accepted() {
    let language = GrammarBuilder::new("list")
        .rule("list", choice([seq([sym("list"), str(","), sym("item")]), sym("item")]))
        .rule("item", re("[a-z]+"))
        .build()
        .build()
        .unwrap();
    assert!(!language.parse("a,b,c").unwrap().root_node().has_error());
}

#[test]
fn test_unknown_conflict_rule() {
    let err = build_error(
        GrammarBuilder::new("conflicts")
            .rule("start", repeat1(str("a")))
            .conflict(["start", "nowhere"])
            .build(),
    );
    assert_eq!(
        err,
        GrammarError::UnknownConflictRule {
            name: "nowhere".into()
        }
    );
}

// ============================================================================
// Lexical Errors
// ============================================================================

#[test]
fn test_invalid_pattern() {
    let err = build_error(
        GrammarBuilder::new("bad_regex")
            .rule("start", repeat1(sym("word")))
            .rule("word", re("[a-z"))
            .build(),
    );
    assert!(matches!(err, GrammarError::InvalidPattern { pattern, .. } if pattern.contains("[a-z")));
}

#[test]
fn test_pattern_matching_empty_input_is_invalid_token() {
    let err = build_error(
        GrammarBuilder::new("empty_token")
            .rule("start", seq([sym("spaces"), str("x")]))
            .rule("spaces", re(" *"))
            .build(),
    );
    assert!(matches!(err, GrammarError::InvalidToken { rule, .. } if rule == "spaces"));
}

#[test]
fn test_token_referencing_rule_is_invalid_token() {
    let err = build_error(
        GrammarBuilder::new("token_ref")
            .rule("start", seq([sym("word"), str(";")]))
            .rule("word", token(seq([str("a"), sym("letter")])))
            .rule("letter", re("[a-z]"))
            .build(),
    );
    assert!(matches!(err, GrammarError::InvalidToken { rule, reason } if rule == "word" && reason.contains("letter")));
}

#[test]
fn test_lexical_start_rule() {
    let err = build_error(
        GrammarBuilder::new("single")
            .rule("word", re("[a-z]+"))
            .build(),
    );
    assert_eq!(
        err,
        GrammarError::LexicalStartRule {
            name: "word".into()
        }
    );
}

#[test]
fn test_nonterminal_extra_is_invalid() {
    let err = build_error(
        GrammarBuilder::new("extras")
            .rule("start", repeat1(sym("word")))
            .rule("word", re("[a-z]+"))
            .rule("pair", seq([sym("word"), str(":"), sym("word")]))
            .extra(sym("pair"))
            .build(),
    );
    assert!(matches!(err, GrammarError::InvalidExtra { .. }));
}

// ============================================================================
// Precedence Errors and Warnings
// ============================================================================

#[test]
fn test_contradictory_associativity_at_equal_precedence() {
    let err = build_error(
        GrammarBuilder::new("arith")
            .rule(
                "expr",
                choice([
                    sym("number"),
                    prec_left(3, seq([sym("expr"), str("+"), sym("expr")])),
                    prec_right(3, seq([sym("expr"), str("^"), sym("expr")])),
                ]),
            )
            .rule("number", re("[0-9]+"))
            .build(),
    );
    match err {
        GrammarError::AmbiguousPrecedence { precedence, .. } => assert_eq!(precedence, 3),
        other => panic!("expected precedence error, got {:?}", other),
    }
}

#[test]
fn test_undeclared_conflict_is_a_warning() {
    let language = GrammarBuilder::new("amb")
        .rule("expr", choice([sym("number"), seq([sym("expr"), str("+"), sym("expr")])]))
        .rule("number", re("[0-9]+"))
        .build()
        .build()
        .unwrap();
    assert!(!language.conflicts().is_empty());
    assert!(language
        .warnings()
        .iter()
        .any(|warning| warning.kind == WarningKind::UndeclaredConflict));
}

#[test]
fn test_error_messages_name_the_rule() {
    let err = build_error(
        GrammarBuilder::new("undef")
            .rule("expr", sym("term"))
            .build(),
    );
    assert_eq!(err.to_string(), "undefined symbol 'term' referenced in rule 'expr'");
}
