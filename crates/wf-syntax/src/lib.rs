//! The parser adapter (§4.1): a pluggable frontend over TypeScript source
//! text that exposes a uniform syntax tree with named-child access, source
//! spans, and raw text extraction, plus an optional semantic-checker handle.
//!
//! Grounded on `yamlpath::Document`'s ownership shape: unlike a borrowed
//! AST, `tree_sitter::Tree` owns its node data independently of the source
//! buffer, so a `Document` can hold both a `String` and a `Tree` directly
//! without a self-referential wrapper.

use std::ops::Range;

use line_index::{LineIndex, TextSize};
use thiserror::Error;
use tree_sitter::{Language, Node, Parser, Tree};
use wf_ir::{Point, Span};

pub use tree_sitter_iter::TreeIter;

/// Errors raised while parsing a file into a [`Document`].
#[derive(Error, Debug)]
pub enum SyntaxError {
    /// The tree-sitter backend rejected the TypeScript grammar.
    #[error("malformed or unsupported tree-sitter grammar")]
    InvalidLanguage(#[from] tree_sitter::LanguageError),
    /// The parser produced no tree at all (should not happen for the
    /// TypeScript grammar, which is error-tolerant).
    #[error("parser produced no syntax tree")]
    NoTree,
}

/// A parsed TypeScript source file.
///
/// Construction never fails on malformed input the way a strict parser
/// would: tree-sitter's TypeScript grammar is error-tolerant and simply
/// marks broken subtrees with `ERROR` nodes, which the callback walker
/// treats as [`wf_ir::FlowNode::Unknown`] rather than aborting the whole
/// file. [`SyntaxError`] is reserved for cases where no tree comes back
/// at all.
pub struct Document {
    source: String,
    tree: Tree,
    line_index: LineIndex,
}

impl Document {
    /// Parses `source` as TypeScript.
    pub fn parse(source: impl Into<String>) -> Result<Self, SyntaxError> {
        let source = source.into();

        let mut parser = Parser::new();
        let language: Language = tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into();
        parser.set_language(&language)?;

        let tree = parser.parse(&source, None).ok_or(SyntaxError::NoTree)?;
        let line_index = LineIndex::new(&source);

        Ok(Self {
            source,
            tree,
            line_index,
        })
    }

    /// Whether the parsed tree contains any `ERROR` nodes.
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// The document's source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The root node of the syntax tree.
    pub fn root_node(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// The document's [`LineIndex`], for byte-offset <-> line/column
    /// conversions outside of [`Document::span`].
    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }

    /// The raw source text spanned by `node`.
    pub fn text<'doc>(&'doc self, node: Node<'_>) -> &'doc str {
        &self.source[node.byte_range()]
    }

    /// The raw source text spanned by a byte range.
    pub fn text_at<'doc>(&'doc self, range: Range<usize>) -> &'doc str {
        &self.source[range]
    }

    /// Converts a node's byte range into a [`Span`] with both byte offsets
    /// and 1-indexed-line/0-indexed-column points, per the adapter contract.
    pub fn span(&self, node: Node<'_>) -> Span {
        self.span_of(node.byte_range())
    }

    /// Converts an arbitrary byte range into a [`Span`].
    pub fn span_of(&self, range: Range<usize>) -> Span {
        let start = self.line_index.line_col(TextSize::new(range.start as u32));
        let end = self.line_index.line_col(TextSize::new(range.end as u32));

        Span {
            start_byte: range.start,
            end_byte: range.end,
            start_point: Point {
                line: start.line as usize + 1,
                column: start.col as usize,
            },
            end_point: Point {
                line: end.line as usize + 1,
                column: end.col as usize,
            },
        }
    }

    /// A pre-order iterator over every node in the tree.
    pub fn walk(&self) -> TreeIter<'_> {
        TreeIter::new(&self.tree)
    }
}

/// Named-child-by-role accessors required by §4.1, implemented as field
/// lookups over the TypeScript grammar's node fields.
pub trait NodeExt<'tree> {
    fn function_child(&self) -> Option<Node<'tree>>;
    fn arguments_child(&self) -> Option<Node<'tree>>;
    fn body_child(&self) -> Option<Node<'tree>>;
    fn parameters_child(&self) -> Option<Node<'tree>>;
    fn key_child(&self) -> Option<Node<'tree>>;
    fn value_child(&self) -> Option<Node<'tree>>;
    fn left_child(&self) -> Option<Node<'tree>>;
    fn right_child(&self) -> Option<Node<'tree>>;
    fn condition_child(&self) -> Option<Node<'tree>>;
    fn consequence_child(&self) -> Option<Node<'tree>>;
    fn alternative_child(&self) -> Option<Node<'tree>>;

    /// Every unnamed child, in source order (punctuation, keywords, ...).
    fn unnamed_children<'a>(&'a self) -> Vec<Node<'tree>>;

    /// Every named child, in source order.
    fn named_children_vec<'a>(&'a self) -> Vec<Node<'tree>>;
}

impl<'tree> NodeExt<'tree> for Node<'tree> {
    fn function_child(&self) -> Option<Node<'tree>> {
        self.child_by_field_name("function")
    }

    fn arguments_child(&self) -> Option<Node<'tree>> {
        self.child_by_field_name("arguments")
    }

    fn body_child(&self) -> Option<Node<'tree>> {
        self.child_by_field_name("body")
    }

    fn parameters_child(&self) -> Option<Node<'tree>> {
        self.child_by_field_name("parameters")
    }

    fn key_child(&self) -> Option<Node<'tree>> {
        self.child_by_field_name("key")
    }

    fn value_child(&self) -> Option<Node<'tree>> {
        self.child_by_field_name("value")
    }

    fn left_child(&self) -> Option<Node<'tree>> {
        self.child_by_field_name("left")
    }

    fn right_child(&self) -> Option<Node<'tree>> {
        self.child_by_field_name("right")
    }

    fn condition_child(&self) -> Option<Node<'tree>> {
        self.child_by_field_name("condition")
    }

    fn consequence_child(&self) -> Option<Node<'tree>> {
        self.child_by_field_name("consequence")
    }

    fn alternative_child(&self) -> Option<Node<'tree>> {
        self.child_by_field_name("alternative")
    }

    fn unnamed_children(&self) -> Vec<Node<'tree>> {
        let mut cursor = self.walk();
        self.children(&mut cursor)
            .filter(|c| !c.is_named())
            .collect()
    }

    fn named_children_vec(&self) -> Vec<Node<'tree>> {
        let mut cursor = self.walk();
        self.named_children(&mut cursor).collect()
    }
}

/// An optional semantic checker bound to a project's `tsconfig`.
///
/// The analyzer MUST function without one; type-dependent steps then skip
/// enrichment rather than guessing (§4.1, §9 "Checker coupling").
pub trait TypeChecker {
    /// The display form of the type of the expression at `span`, if the
    /// checker can resolve one.
    fn type_display_at(&self, span: Span) -> Option<String>;

    /// The generic type arguments applied at `span` (e.g. the `T, E` of a
    /// `Result<T, E>`-shaped return type), if any.
    fn generic_arguments_at(&self, span: Span) -> Option<Vec<String>>;
}

/// A [`TypeChecker`] that never resolves anything, for analyses run
/// without a bound project (tests, `--no-types`, missing `tsconfig.json`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullChecker;

impl TypeChecker for NullChecker {
    fn type_display_at(&self, _span: Span) -> Option<String> {
        None
    }

    fn generic_arguments_at(&self, _span: Span) -> Option<Vec<String>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_call_expression() {
        let doc = Document::parse("createWorkflow('x', {});").unwrap();
        assert!(!doc.has_errors());

        let call = doc
            .walk()
            .find(|n| n.kind() == "call_expression")
            .expect("a call_expression node");

        assert_eq!(doc.text(call.function_child().unwrap()), "createWorkflow");
        assert_eq!(call.arguments_child().unwrap().kind(), "arguments");
    }

    #[test]
    fn classifies_required_node_kinds() {
        let src = r#"
            async function run() {
                const x = await step('a', () => 1, { out: 'a' });
                if (x) {
                    return x;
                } else {
                    return 0;
                }
                for (const y of [1, 2]) {}
                while (false) {}
            }
        "#;
        let doc = Document::parse(src).unwrap();
        let kinds: std::collections::HashSet<&str> = doc.walk().map(|n| n.kind()).collect();

        for expected in [
            "call_expression",
            "identifier",
            "string",
            "arrow_function",
            "if_statement",
            "else_clause",
            "for_in_statement",
            "while_statement",
            "statement_block",
            "await_expression",
            "return_statement",
        ] {
            assert!(kinds.contains(expected), "missing node kind: {expected}");
        }
    }

    #[test]
    fn span_uses_one_indexed_lines_and_zero_indexed_columns() {
        let doc = Document::parse("a;\nb;").unwrap();
        let second_stmt = doc
            .walk()
            .find(|n| n.kind() == "expression_statement" && doc.text(*n) == "b;")
            .unwrap();

        let span = doc.span(second_stmt);
        assert_eq!(span.start_point.line, 2);
        assert_eq!(span.start_point.column, 0);
    }

    #[test]
    fn null_checker_resolves_nothing() {
        let checker = NullChecker;
        assert_eq!(checker.type_display_at(Span::zero()), None);
        assert_eq!(checker.generic_arguments_at(Span::zero()), None);
    }
}
