//! Grammar types
//!
//! This module defines the in-memory grammar description consumed by the
//! table builder. Grammars are plain serde data so they can be authored in
//! Rust (see [`grammar_dsl`](super::grammar_dsl)) or loaded from JSON.

use super::error::GrammarError;
use super::external::ExternalScanner;
use super::language::Language;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Operator associativity for precedence declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Assoc {
    /// Left-associative: `a + b + c` = `(a + b) + c`
    Left,
    /// Right-associative: `a = b = c` = `a = (b = c)`
    Right,
}

/// Rule combinators that make up a grammar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rule {
    /// Match nothing
    Blank,

    /// Match a literal string (an anonymous terminal)
    String {
        /// The literal text
        value: String,
    },

    /// Match a regular expression (a hidden anonymous terminal)
    Pattern {
        /// The regex source
        value: String,
    },

    /// Reference another rule or external token by name
    Symbol {
        /// Name of the referenced rule
        name: String,
    },

    /// Match members in order
    Seq {
        /// Sequence members
        members: Vec<Rule>,
    },

    /// Match any one member
    Choice {
        /// Alternatives
        members: Vec<Rule>,
    },

    /// Zero or more repetitions
    Repeat {
        /// Repeated content
        content: Box<Rule>,
    },

    /// One or more repetitions
    Repeat1 {
        /// Repeated content
        content: Box<Rule>,
    },

    /// Static precedence used to resolve table conflicts
    Prec {
        /// Numeric precedence, higher binds tighter
        value: i32,
        /// Optional associativity
        assoc: Option<Assoc>,
        /// Wrapped rule
        content: Box<Rule>,
    },

    /// Precedence applied at runtime when choosing between ambiguous parses
    PrecDynamic {
        /// Dynamic precedence value
        value: i32,
        /// Wrapped rule
        content: Box<Rule>,
    },

    /// Name the children produced by the content
    Field {
        /// Field name
        name: String,
        /// Wrapped rule
        content: Box<Rule>,
    },

    /// Collapse the content into a single terminal
    Token {
        /// Lexical content (no symbol references)
        content: Box<Rule>,
    },
}

impl Rule {
    /// True if the rule is lexical on its own: a literal, pattern, or token
    pub fn is_lexical(&self) -> bool {
        matches!(
            self,
            Rule::String { .. } | Rule::Pattern { .. } | Rule::Token { .. }
        )
    }

    /// Visit every symbol reference in the rule
    pub fn for_each_symbol<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Rule::Symbol { name } => f(name),
            Rule::Seq { members } | Rule::Choice { members } => {
                for member in members {
                    member.for_each_symbol(f);
                }
            }
            Rule::Repeat { content }
            | Rule::Repeat1 { content }
            | Rule::Prec { content, .. }
            | Rule::PrecDynamic { content, .. }
            | Rule::Field { content, .. }
            | Rule::Token { content } => content.for_each_symbol(f),
            Rule::Blank | Rule::String { .. } | Rule::Pattern { .. } => {}
        }
    }
}

/// A named rule definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDef {
    /// Rule name; a leading `_` hides the rule's nodes
    pub name: String,
    /// Rule body
    pub rule: Rule,
}

/// A complete grammar
///
/// The first rule is the start symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grammar {
    /// Language name
    pub name: String,
    /// Rule definitions in declaration order
    pub rules: Vec<RuleDef>,
    /// Tokens permitted between any two tokens (whitespace, comments)
    #[serde(default)]
    pub extras: Vec<Rule>,
    /// Token names produced by an external scanner, in scanner index order
    #[serde(default)]
    pub externals: Vec<String>,
    /// Sets of rules whose mutual conflicts are expected
    #[serde(default)]
    pub conflicts: Vec<Vec<String>>,
}

impl Grammar {
    /// Create an empty grammar
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Look up a rule by name
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|def| def.name == name).map(|def| &def.rule)
    }

    /// The start rule
    pub fn start_rule(&self) -> Option<&RuleDef> {
        self.rules.first()
    }

    /// Number of rule definitions
    #[inline]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Serialize to JSON
    #[inline]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON
    #[inline]
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Validate the grammar and build its parse and lex tables
    pub fn build(&self) -> Result<Language, GrammarError> {
        super::table_builder::build_language(self, None)
    }

    /// Build the language with an external scanner attached
    pub fn build_with_scanner(
        &self,
        scanner: Arc<dyn ExternalScanner>,
    ) -> Result<Language, GrammarError> {
        super::table_builder::build_language(self, Some(scanner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Grammar {
        let mut grammar = Grammar::new("sample");
        grammar.rules.push(RuleDef {
            name: "list".into(),
            rule: Rule::Repeat {
                content: Box::new(Rule::Symbol {
                    name: "item".into(),
                }),
            },
        });
        grammar.rules.push(RuleDef {
            name: "item".into(),
            rule: Rule::Pattern {
                value: "[a-z]+".into(),
            },
        });
        grammar
    }

    #[test]
    fn test_grammar_json_roundtrip() {
        let grammar = sample();
        let json = grammar.to_json().unwrap();
        let back = Grammar::from_json(&json).unwrap();
        assert_eq!(grammar, back);
    }

    #[test]
    fn test_missing_optional_sections_default() {
        let json = r#"{"name":"g","rules":[{"name":"a","rule":{"String":{"value":"x"}}}]}"#;
        let grammar = Grammar::from_json(json).unwrap();
        assert!(grammar.extras.is_empty());
        assert!(grammar.externals.is_empty());
        assert_eq!(grammar.start_rule().map(|r| r.name.as_str()), Some("a"));
    }

    #[test]
    fn test_for_each_symbol_and_lexical() {
        let grammar = sample();
        let mut seen = Vec::new();
        grammar.rules[0].rule.for_each_symbol(&mut |name| seen.push(name));
        assert_eq!(seen, vec!["item"]);
        assert!(grammar.rules[1].rule.is_lexical());
        assert!(!grammar.rules[0].rule.is_lexical());
    }
}
