//! The Tessera language
//!
//! The Tessera grammar: modules, `using` imports, constants, functions,
//! typed variable declarations with patterns, scoped paths, structured
//! control flow and the full binary operator table. Whitespace and comments
//! are extras.
//!
//! ```rust
//! let language = tessera::languages::tessera::language().unwrap();
//! let source = "fn void main() { mut i32 x := 1 + 2 * 3; }";
//! let tree = language.parse(source).unwrap();
//! assert_eq!(tree.root_node().kind(), "source_file");
//! assert!(!tree.root_node().has_error());
//! ```
//!
//! Operator precedence, highest first:
//!
//! | level | operators |
//! |-------|-----------|
//! | 16 | call `f(..)` |
//! | 15 | field `a.b` |
//! | 12 | unary `- * !`, reference `&` |
//! | 11 | cast `as` |
//! | 10 | `* / %` |
//! | 9 | `+ -` |
//! | 8 | `<< >> <>` |
//! | 7 | `&` |
//! | 6 | `^` |
//! | 5 | `\|` |
//! | 4 | `= != < <= > >=` |
//! | 3 | `&&` |
//! | 2 | `\|\|` |
//! | 1 | range `.. ..=` |
//! | 0 | assignment `:=`, compound assignment, return `\|>` |

use crate::engine::error::GrammarError;
use crate::engine::grammar::{Grammar, Rule};
use crate::engine::grammar_dsl::*;
use crate::engine::language::Language;
use std::sync::OnceLock;

/// Operator precedence levels
pub mod precedence {
    /// Call expressions
    pub const CALL: i32 = 16;
    /// Field access
    pub const FIELD: i32 = 15;
    /// Prefix operators
    pub const UNARY: i32 = 12;
    /// `as` casts
    pub const CAST: i32 = 11;
    /// `* / %`
    pub const MULTIPLICATIVE: i32 = 10;
    /// `+ -`
    pub const ADDITIVE: i32 = 9;
    /// `<> << >>`
    pub const SHIFT: i32 = 8;
    /// `&`
    pub const BITAND: i32 = 7;
    /// `^`
    pub const BITXOR: i32 = 6;
    /// `|`
    pub const BITOR: i32 = 5;
    /// Comparisons
    pub const COMPARATIVE: i32 = 4;
    /// `&&`
    pub const AND: i32 = 3;
    /// `||`
    pub const OR: i32 = 2;
    /// Ranges
    pub const RANGE: i32 = 1;
    /// Assignments and returns
    pub const ASSIGN: i32 = 0;
}

/// Numeric type keywords, also accepted as integer literal suffixes
pub const NUMERIC_TYPES: &[&str] = &[
    "u8", "i8", "u16", "i16", "u32", "i32", "u64", "i64", "i128", "u128", "isz", "usz", "float",
    "double",
];

/// Non-numeric primitive type keywords
pub const OTHER_PRIMITIVE_TYPES: &[&str] = &["bool", "str", "char", "void", "infer"];

fn keywords(words: &[&str]) -> Vec<Rule> {
    words.iter().map(|w| str(w)).collect()
}

fn labelled(rule: Rule) -> Rule {
    seq([optional(seq([sym("label"), str(":")])), rule])
}

fn binary_expression() -> Rule {
    let table: [(i32, &[&str]); 9] = [
        (precedence::AND, &["&&"]),
        (precedence::OR, &["||"]),
        (precedence::BITAND, &["&"]),
        (precedence::BITOR, &["|"]),
        (precedence::BITXOR, &["^"]),
        (precedence::COMPARATIVE, &["=", "!=", "<", "<=", ">", ">="]),
        (precedence::SHIFT, &["<<", ">>", "<>"]),
        (precedence::ADDITIVE, &["+", "-"]),
        (precedence::MULTIPLICATIVE, &["*", "/", "%"]),
    ];
    choice(table.iter().map(|&(level, operators)| {
        prec_left(
            level,
            seq([
                field("left", sym("_expression")),
                field("operator", choice(keywords(operators))),
                field("right", sym("_expression")),
            ]),
        )
    }))
}

/// The Tessera grammar
pub fn grammar() -> Grammar {
    let primitive_types: Vec<&str> = NUMERIC_TYPES
        .iter()
        .chain(OTHER_PRIMITIVE_TYPES)
        .copied()
        .collect();

    GrammarBuilder::new("tessera")
        // ROOT
        .rule(
            "source_file",
            repeat(choice([sym("_statement"), sym("module_item"), sym("using_item")])),
        )
        .rule(
            "module_item",
            seq([
                str("module"),
                field("name", sym("identifier")),
                field("body", sym("block")),
            ]),
        )
        .rule(
            "using_item",
            seq([
                str("using"),
                field("path", sym("use_path")),
                optional(sym("use_suffix")),
                str(";"),
            ]),
        )
        .rule(
            "use_path",
            choice([
                sym("identifier"),
                seq([sym("use_path"), str(":"), sym("identifier")]),
            ]),
        )
        .rule(
            "use_suffix",
            seq([
                str(":"),
                choice([
                    str("*"),
                    seq([str("{"), sep_by1(str(","), sym("use_list_item")), str("}")]),
                ]),
            ]),
        )
        .rule(
            "use_list_item",
            seq([sym("use_path"), optional(sym("use_suffix"))]),
        )
        // STATEMENTS
        .rule(
            "_statement",
            choice([sym("_declaration_statement"), sym("expression_statement")]),
        )
        .rule("empty_statement", seq([str(";")]))
        .rule(
            "expression_statement",
            choice([
                seq([sym("_expression"), str(";")]),
                prec(1, sym("_expression_ending_with_block")),
            ]),
        )
        .rule(
            "_expression_ending_with_block",
            choice([
                sym("block"),
                sym("if_expression"),
                sym("match_expression"),
                sym("while_expression"),
                sym("for_expression"),
                sym("for_in_expression"),
            ]),
        )
        .rule(
            "_declaration_statement",
            choice([
                sym("const_item"),
                sym("empty_statement"),
                sym("extern_function_item"),
                sym("function_item"),
                seq([sym("variable_declaration"), str(";")]),
            ]),
        )
        // ITEMS
        .rule(
            "const_item",
            seq([
                optional(sym("visibility_modifier")),
                str("const"),
                field("type", sym("_type")),
                field("name", sym("identifier")),
                optional(seq([str(":="), field("value", sym("_expression"))])),
                str(";"),
            ]),
        )
        .rule(
            "extern_function_item",
            seq([
                str("extern"),
                str("fn"),
                field("return_type", sym("_type")),
                field("name", sym("identifier")),
                field("parameters", sym("parameters")),
                str(";"),
            ]),
        )
        .rule(
            "function_item",
            seq([
                optional(sym("visibility_modifier")),
                optional(str("const")),
                str("fn"),
                field("return_type", sym("_type")),
                field("name", sym("identifier")),
                field("parameters", sym("parameters")),
                field("body", sym("block")),
            ]),
        )
        .rule(
            "block",
            seq([
                str("{"),
                repeat(sym("_statement")),
                optional(sym("_expression")),
                str("}"),
            ]),
        )
        // EXPRESSIONS
        .rule(
            "_expression",
            choice([
                sym("unary_expression"),
                sym("reference_expression"),
                sym("binary_expression"),
                sym("assignment_expression"),
                sym("compound_assignment_expr"),
                sym("type_cast_expression"),
                sym("call_expression"),
                sym("name_expr"),
                sym("range_expression"),
                sym("return_expression"),
                sym("_literal"),
                sym("identifier"),
                sym("scoped_identifier"),
                sym("self"),
                sym("break_expression"),
                sym("continue_expression"),
                sym("parenthesized_expression"),
                sym("_expression_ending_with_block"),
            ]),
        )
        .rule(
            "name_expr",
            prec_left(
                precedence::FIELD,
                seq([
                    field("object", sym("_expression")),
                    str("."),
                    field("property", sym("identifier")),
                ]),
            ),
        )
        .rule(
            "range_expression",
            prec_left(
                precedence::RANGE,
                seq([
                    field("start", sym("_expression")),
                    choice([str(".."), str("..=")]),
                    field("end", sym("_expression")),
                ]),
            ),
        )
        .rule(
            "unary_expression",
            prec(
                precedence::UNARY,
                seq([
                    field("operator", choice([str("-"), str("*"), str("!")])),
                    field("operand", sym("_expression")),
                ]),
            ),
        )
        .rule(
            "reference_expression",
            prec(
                precedence::UNARY,
                seq([
                    str("&"),
                    optional(sym("mutable_specifier")),
                    field("value", sym("_expression")),
                ]),
            ),
        )
        .rule("binary_expression", binary_expression())
        .rule(
            "assignment_expression",
            prec_left(
                precedence::ASSIGN,
                seq([
                    field("left", sym("_expression")),
                    str(":="),
                    field("right", sym("_expression")),
                ]),
            ),
        )
        .rule(
            "compound_assignment_expr",
            prec_left(
                precedence::ASSIGN,
                seq([
                    field("left", sym("_expression")),
                    field(
                        "operator",
                        choice(keywords(&[
                            "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>=", "<>=",
                        ])),
                    ),
                    field("right", sym("_expression")),
                ]),
            ),
        )
        .rule(
            "type_cast_expression",
            prec_left(
                precedence::CAST,
                seq([
                    field("value", sym("_expression")),
                    str("as"),
                    field("type", sym("_type")),
                ]),
            ),
        )
        .rule(
            "return_expression",
            choice([
                prec_left(precedence::ASSIGN, seq([str("|>"), sym("_expression")])),
                prec(-1, str("|>")),
            ]),
        )
        .rule(
            "call_expression",
            prec(
                precedence::CALL,
                seq([
                    field("function", sym("_expression")),
                    field("arguments", sym("arguments")),
                ]),
            ),
        )
        .rule(
            "arguments",
            prec(
                precedence::CALL,
                seq([
                    str("("),
                    sep_by(str(","), sym("_expression")),
                    optional(str(",")),
                    str(")"),
                ]),
            ),
        )
        .rule(
            "parenthesized_expression",
            seq([str("("), sym("_expression"), str(")")]),
        )
        .rule(
            "break_expression",
            prec_left(precedence::ASSIGN, seq([str("break"), optional(sym("label"))])),
        )
        .rule(
            "continue_expression",
            prec_left(precedence::ASSIGN, seq([str("continue"), optional(sym("label"))])),
        )
        .rule(
            "if_expression",
            prec_right(
                0,
                seq([
                    str("if"),
                    field("condition", sym("_expression")),
                    field("consequence", sym("block")),
                    optional(field("alternative", sym("else_clause"))),
                ]),
            ),
        )
        .rule(
            "else_clause",
            seq([str("else"), choice([sym("block"), sym("if_expression")])]),
        )
        .rule(
            "match_expression",
            seq([
                str("match"),
                field("value", sym("_expression")),
                field("body", sym("match_block")),
            ]),
        )
        .rule(
            "match_block",
            seq([
                str("{"),
                optional(seq([repeat(sym("match_arm")), sym("last_match_arm")])),
                str("}"),
            ]),
        )
        // arms end with a comma unless their value ends with a block
        .rule(
            "match_arm",
            seq([
                field("pattern", sym("match_pattern")),
                str("->"),
                choice([
                    seq([field("value", sym("_expression")), str(",")]),
                    field("value", prec(1, sym("_expression_ending_with_block"))),
                ]),
            ]),
        )
        .rule(
            "last_match_arm",
            seq([
                field("pattern", sym("match_pattern")),
                str("->"),
                field("value", sym("_expression")),
                optional(str(",")),
            ]),
        )
        .rule(
            "match_pattern",
            seq([
                sym("_pattern"),
                optional(seq([str("if"), field("condition", sym("_expression"))])),
            ]),
        )
        .rule(
            "while_expression",
            labelled(seq([
                str("while"),
                field("condition", sym("_expression")),
                field("body", sym("block")),
            ])),
        )
        .rule(
            "for_in_expression",
            labelled(seq([
                str("for"),
                field("type", sym("_type")),
                field("name", sym("identifier")),
                str("in"),
                field("iterable", sym("_expression")),
                field("body", sym("block")),
            ])),
        )
        .rule(
            "for_expression",
            labelled(seq([
                str("for"),
                field("initializer", sym("variable_declaration")),
                str(","),
                field("condition", sym("_expression")),
                str(","),
                field("updater", sym("_expression")),
                field("body", sym("block")),
            ])),
        )
        .rule("label", seq([str("$"), sym("identifier")]))
        // PATHS
        .rule(
            "_path",
            choice([
                sym("self"),
                sym("super"),
                sym("crate"),
                sym("identifier"),
                sym("scoped_identifier"),
            ]),
        )
        // a statement like `a :b;` reads as a path, not a declaration
        .rule(
            "scoped_identifier",
            choice([
                seq([
                    field("path", sym("_path")),
                    str(":"),
                    field("name", choice([sym("identifier"), sym("super")])),
                ]),
                prec_dynamic(
                    -1,
                    seq([str(":"), field("name", choice([sym("identifier"), sym("super")]))]),
                ),
            ]),
        )
        .rule(
            "scoped_type_identifier",
            seq([
                optional(field("path", sym("_path"))),
                str(":"),
                field("name", sym("type_identifier")),
            ]),
        )
        // PATTERNS
        .rule(
            "_pattern",
            choice([
                sym("_literal_pattern"),
                sym("identifier"),
                sym("scoped_identifier"),
                sym("ref_pattern"),
                sym("reference_pattern"),
                sym("remaining_field_pattern"),
                sym("mut_pattern"),
                sym("range_pattern"),
                sym("or_pattern"),
                str("_"),
            ]),
        )
        .rule(
            "_literal_pattern",
            choice([
                sym("string_literal"),
                sym("char_literal"),
                sym("boolean_literal"),
                sym("integer_literal"),
                sym("float_literal"),
                sym("negative_literal"),
            ]),
        )
        // `a - 1;`, `a & b;` and `a | b;` are expressions before declarations
        .rule(
            "negative_literal",
            prec_dynamic(
                -1,
                seq([str("-"), choice([sym("integer_literal"), sym("float_literal")])]),
            ),
        )
        .rule(
            "reference_pattern",
            prec_dynamic(
                -1,
                seq([str("&"), optional(sym("mutable_specifier")), sym("_pattern")]),
            ),
        )
        .rule("remaining_field_pattern", seq([str("..")]))
        .rule("mut_pattern", prec(-1, seq([sym("mutable_specifier"), sym("_pattern")])))
        .rule(
            "range_pattern",
            seq([
                sym("_literal_pattern"),
                choice([
                    seq([choice(keywords(&["...", "..=", ".."])), sym("_literal_pattern")]),
                    str(".."),
                ]),
            ]),
        )
        .rule("ref_pattern", seq([str("ref"), sym("_pattern")]))
        .rule(
            "or_pattern",
            prec_left(
                -2,
                choice([
                    seq([sym("_pattern"), str("|"), sym("_pattern")]),
                    prec_dynamic(-1, seq([str("|"), sym("_pattern")])),
                ]),
            ),
        )
        // DECLARATIONS
        .rule(
            "variable_declaration",
            seq([
                optional(sym("mutable_specifier")),
                field("type", sym("_type")),
                field("pattern", sym("_pattern")),
                optional(sym("variable_initializer")),
            ]),
        )
        .rule(
            "variable_initializer",
            seq([str(":="), field("value", sym("_expression"))]),
        )
        .rule(
            "parameters",
            seq([
                str("("),
                sep_by(
                    str(","),
                    choice([
                        sym("parameter"),
                        sym("self_parameter"),
                        sym("variadic_parameter"),
                    ]),
                ),
                optional(str(",")),
                str(")"),
            ]),
        )
        .rule(
            "parameter",
            seq([
                field("type", sym("_type")),
                optional(sym("mutable_specifier")),
                field("name", choice([sym("identifier"), sym("self")])),
            ]),
        )
        .rule(
            "self_parameter",
            seq([
                optional(str("&")),
                optional(sym("mutable_specifier")),
                sym("self"),
            ]),
        )
        .rule(
            "variadic_parameter",
            seq([
                optional(sym("mutable_specifier")),
                field("type", sym("_type")),
                str("..."),
                field("name", sym("identifier")),
            ]),
        )
        .rule(
            "visibility_modifier",
            seq([
                str("pub"),
                optional(seq([
                    str("("),
                    choice([sym("self"), sym("super"), sym("crate")]),
                    str(")"),
                ])),
            ]),
        )
        // TYPES
        .rule("self", str("self"))
        .rule("super", str("super"))
        .rule("crate", str("crate"))
        .rule(
            "_type",
            choice([
                sym("reference_type"),
                sym("scoped_type_identifier"),
                sym("primitive_type"),
                sym("type_identifier"),
            ]),
        )
        .rule(
            "reference_type",
            seq([
                str("&"),
                optional(sym("mutable_specifier")),
                field("type", sym("_type")),
            ]),
        )
        .rule("primitive_type", choice(keywords(&primitive_types)))
        .rule("type_identifier", sym("identifier"))
        .rule("mutable_specifier", str("mut"))
        // LITERALS & IDENTIFIERS
        .rule("identifier", token(re("[a-zA-Z_][a-zA-Z0-9_]*")))
        .rule(
            "_literal",
            choice([
                sym("string_literal"),
                sym("char_literal"),
                sym("boolean_literal"),
                sym("integer_literal"),
                sym("float_literal"),
            ]),
        )
        .rule("boolean_literal", choice([str("true"), str("false")]))
        .rule(
            "string_literal",
            token(seq([str("\""), re(r#"[^"\n]*"#), str("\"")])),
        )
        .rule(
            "integer_literal",
            token(seq([
                choice([
                    re("[0-9][0-9_]*"),
                    re("0x[0-9a-fA-F_]+"),
                    re("0b[01_]+"),
                    re("0o[0-7_]+"),
                ]),
                optional(choice(keywords(NUMERIC_TYPES))),
            ])),
        )
        .rule(
            "float_literal",
            token(seq([
                re(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?|[0-9]+[eE][+-]?[0-9]+"),
                optional(choice(keywords(NUMERIC_TYPES))),
            ])),
        )
        .rule(
            "char_literal",
            token(seq([
                optional(str("b")),
                str("'"),
                optional(choice([
                    seq([
                        str("\\"),
                        choice([
                            re("[^xu]"),
                            re("u[0-9a-fA-F]{4}"),
                            re(r"u\{[0-9a-fA-F]+\}"),
                            re("x[0-9a-fA-F]{2}"),
                        ]),
                    ]),
                    re(r"[^\\']"),
                ])),
                str("'"),
            ])),
        )
        // COMMENTS
        .rule(
            "comment",
            token(choice([
                seq([str("//"), re(".*")]),
                seq([str("/*"), re(r"[^*]*\*+([^/*][^*]*\*+)*"), str("/")]),
            ])),
        )
        .extra(re(r"\s+"))
        .extra(sym("comment"))
        .build()
}

static LANGUAGE: OnceLock<Result<Language, GrammarError>> = OnceLock::new();

/// The compiled Tessera language
///
/// The tables are built on the first call; later calls return a cheap
/// clone of the same language.
pub fn language() -> Result<Language, GrammarError> {
    LANGUAGE.get_or_init(|| grammar().build()).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grammar_builds() {
        let language = language().unwrap();
        assert_eq!(language.name(), "tessera");
        assert!(language.symbol_for_name("function_item", true).is_some());
        assert!(language.symbol_for_name("comment", true).is_some());
    }

    #[test]
    fn test_language_is_shared() {
        let a = language().unwrap();
        let b = language().unwrap();
        assert!(a.same_as(&b));
    }

    #[test]
    fn test_grammar_json_round_trip() {
        let grammar = grammar();
        let json = grammar.to_json().unwrap();
        assert_eq!(Grammar::from_json(&json).unwrap(), grammar);
    }

    #[test]
    fn test_keyword_beats_identifier() {
        let language = language().unwrap();
        let source = "i32 count := 1;";
        let tree = language.parse(source).unwrap();
        let declaration = tree.root_node().named_child(0).unwrap();
        assert_eq!(declaration.kind(), "variable_declaration");
        let ty = declaration.child_by_field_name("type").unwrap();
        assert_eq!(ty.kind(), "primitive_type");
        let pattern = declaration.child_by_field_name("pattern").unwrap();
        assert_eq!(pattern.kind(), "identifier");
        assert_eq!(pattern.utf8_text(source), "count");
    }
}
