//! Grammar DSL - idiomatic Rust grammar definition
//!
//! A fluent, composable API for writing grammars in Rust, in the spirit of
//! `grammar.js` files.
//!
//! # Example
//!
//! ```rust
//! use tessera::engine::grammar_dsl::*;
//!
//! let grammar = GrammarBuilder::new("calc")
//!     .rule("expr", choice([
//!         sym("number"),
//!         prec_left(1, seq([sym("expr"), str("+"), sym("expr")])),
//!     ]))
//!     .rule("number", re(r"\d+"))
//!     .extra(re(r"\s+"))
//!     .build();
//!
//! let language = grammar.build().unwrap();
//! assert!(!language.parse("1 + 2").unwrap().root_node().has_error());
//! ```

use super::grammar::{Assoc, Grammar, Rule, RuleDef};

/// Grammar builder for constructing grammars
pub struct GrammarBuilder {
    grammar: Grammar,
}

impl GrammarBuilder {
    /// Create a new grammar builder
    pub fn new(name: &str) -> Self {
        Self {
            grammar: Grammar::new(name),
        }
    }

    /// Add a rule; the first rule added is the start rule
    pub fn rule(mut self, name: &str, rule: impl Into<Rule>) -> Self {
        self.grammar.rules.push(RuleDef {
            name: name.to_string(),
            rule: rule.into(),
        });
        self
    }

    /// Declare a token allowed between any two tokens
    pub fn extra(mut self, rule: impl Into<Rule>) -> Self {
        self.grammar.extras.push(rule.into());
        self
    }

    /// Declare a token produced by the external scanner
    pub fn external(mut self, name: &str) -> Self {
        self.grammar.externals.push(name.to_string());
        self
    }

    /// Declare rules whose conflicts are expected
    pub fn conflict<'a>(mut self, rules: impl IntoIterator<Item = &'a str>) -> Self {
        self.grammar
            .conflicts
            .push(rules.into_iter().map(str::to_string).collect());
        self
    }

    /// Build the final grammar
    pub fn build(self) -> Grammar {
        self.grammar
    }
}

impl From<&str> for Rule {
    fn from(value: &str) -> Self {
        str(value)
    }
}

// ============================================================================
// Combinators
// ============================================================================

/// Match nothing
pub fn blank() -> Rule {
    Rule::Blank
}

/// Match a literal string
pub fn str(value: &str) -> Rule {
    Rule::String {
        value: value.to_string(),
    }
}

/// Match a regular expression
pub fn re(pattern: &str) -> Rule {
    Rule::Pattern {
        value: pattern.to_string(),
    }
}

/// Reference a rule by name
pub fn sym(name: &str) -> Rule {
    Rule::Symbol {
        name: name.to_string(),
    }
}

/// Match rules in sequence
pub fn seq<R: Into<Rule>>(members: impl IntoIterator<Item = R>) -> Rule {
    Rule::Seq {
        members: members.into_iter().map(Into::into).collect(),
    }
}

/// Match any one of the rules
pub fn choice<R: Into<Rule>>(members: impl IntoIterator<Item = R>) -> Rule {
    Rule::Choice {
        members: members.into_iter().map(Into::into).collect(),
    }
}

/// Match the rule or nothing
pub fn optional(rule: impl Into<Rule>) -> Rule {
    choice([rule.into(), blank()])
}

/// Zero or more repetitions
pub fn repeat(rule: impl Into<Rule>) -> Rule {
    Rule::Repeat {
        content: Box::new(rule.into()),
    }
}

/// One or more repetitions
pub fn repeat1(rule: impl Into<Rule>) -> Rule {
    Rule::Repeat1 {
        content: Box::new(rule.into()),
    }
}

/// Static precedence without associativity
pub fn prec(value: i32, rule: impl Into<Rule>) -> Rule {
    Rule::Prec {
        value,
        assoc: None,
        content: Box::new(rule.into()),
    }
}

/// Left-associative precedence
pub fn prec_left(value: i32, rule: impl Into<Rule>) -> Rule {
    Rule::Prec {
        value,
        assoc: Some(Assoc::Left),
        content: Box::new(rule.into()),
    }
}

/// Right-associative precedence
pub fn prec_right(value: i32, rule: impl Into<Rule>) -> Rule {
    Rule::Prec {
        value,
        assoc: Some(Assoc::Right),
        content: Box::new(rule.into()),
    }
}

/// Runtime precedence for choosing among ambiguous parses
pub fn prec_dynamic(value: i32, rule: impl Into<Rule>) -> Rule {
    Rule::PrecDynamic {
        value,
        content: Box::new(rule.into()),
    }
}

/// Name the children produced by `rule`
pub fn field(name: &str, rule: impl Into<Rule>) -> Rule {
    Rule::Field {
        name: name.to_string(),
        content: Box::new(rule.into()),
    }
}

/// Collapse a lexical rule into a single token
pub fn token(rule: impl Into<Rule>) -> Rule {
    Rule::Token {
        content: Box::new(rule.into()),
    }
}

/// One or more `rule`s separated by `separator`
pub fn sep_by1(separator: impl Into<Rule>, rule: impl Into<Rule>) -> Rule {
    let rule = rule.into();
    seq([rule.clone(), repeat(seq([separator.into(), rule]))])
}

/// Zero or more `rule`s separated by `separator`
pub fn sep_by(separator: impl Into<Rule>, rule: impl Into<Rule>) -> Rule {
    optional(sep_by1(separator, rule))
}

/// Comma separated list with an optional trailing comma
pub fn comma_sep(rule: impl Into<Rule>) -> Rule {
    optional(seq([sep_by1(",", rule), optional(",")]))
}

/// Extension methods for fluent chaining
pub trait RuleExt: Into<Rule> + Sized {
    /// Sequence this rule with another
    fn then(self, next: impl Into<Rule>) -> Rule {
        match self.into() {
            Rule::Seq { mut members } => {
                members.push(next.into());
                Rule::Seq { members }
            }
            first => seq([first, next.into()]),
        }
    }

    /// Alternative to this rule
    fn or(self, other: impl Into<Rule>) -> Rule {
        match self.into() {
            Rule::Choice { mut members } => {
                members.push(other.into());
                Rule::Choice { members }
            }
            first => choice([first, other.into()]),
        }
    }

    /// Zero or more repetitions
    fn many(self) -> Rule {
        repeat(self)
    }

    /// One or more repetitions
    fn many1(self) -> Rule {
        repeat1(self)
    }

    /// Match optionally
    fn opt(self) -> Rule {
        optional(self)
    }

    /// Name the result
    fn field(self, name: &str) -> Rule {
        field(name, self)
    }
}

impl RuleExt for Rule {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_rule_order() {
        let grammar = GrammarBuilder::new("g")
            .rule("start", sym("item").many())
            .rule("item", re("[a-z]+"))
            .extra(re(r"\s+"))
            .external("indent")
            .conflict(["start", "item"])
            .build();
        assert_eq!(grammar.start_rule().unwrap().name, "start");
        assert_eq!(grammar.extras.len(), 1);
        assert_eq!(grammar.externals, vec!["indent".to_string()]);
        assert_eq!(grammar.conflicts[0], vec!["start", "item"]);
    }

    #[test]
    fn test_then_flattens_sequences() {
        let rule = sym("a").then("b").then(sym("c"));
        match rule {
            Rule::Seq { members } => assert_eq!(members.len(), 3),
            other => panic!("expected seq, got {:?}", other),
        }
    }

    #[test]
    fn test_or_flattens_choices() {
        let rule = str("a").or("b").or("c");
        match rule {
            Rule::Choice { members } => assert_eq!(members.len(), 3),
            other => panic!("expected choice, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_is_choice_with_blank() {
        assert_eq!(
            optional("x"),
            Rule::Choice {
                members: vec![str("x"), Rule::Blank]
            }
        );
    }

    #[test]
    fn test_prec_helpers() {
        match prec_right(3, sym("e")) {
            Rule::Prec { value, assoc, .. } => {
                assert_eq!(value, 3);
                assert_eq!(assoc, Some(Assoc::Right));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
