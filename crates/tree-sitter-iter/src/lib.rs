//! A very simple pre-order iterator for tree-sitter CSTs.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]
#![allow(clippy::redundant_field_names)]
#![forbid(unsafe_code)]

use tree_sitter::{Node, Tree, TreeCursor};

/// A pre-order iterator over the nodes of a tree-sitter syntax tree.
pub struct TreeIter<'tree> {
    cursor: Option<TreeCursor<'tree>>,
}

impl<'tree> TreeIter<'tree> {
    /// Creates a new `TreeSitterIter` for the given syntax tree.
    pub fn new(tree: &'tree Tree) -> Self {
        Self {
            cursor: Some(tree.root_node().walk()),
        }
    }

    /// Creates a pre-order iterator rooted at an arbitrary node, rather
    /// than a whole tree. Useful for scanning a single callback's subtree
    /// without walking the rest of the file.
    pub fn new_from_node(node: Node<'tree>) -> Self {
        Self {
            cursor: Some(node.walk()),
        }
    }
}

impl<'tree> Iterator for TreeIter<'tree> {
    type Item = Node<'tree>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = match &mut self.cursor {
            Some(cursor) => cursor,
            None => return None,
        };

        let node = cursor.node();

        if cursor.goto_first_child() || cursor.goto_next_sibling() {
            return Some(node);
        }

        loop {
            if !cursor.goto_parent() {
                // If we can't go to the parent, the walk will be
                // complete *after* the current node.
                self.cursor = None;
                break;
            }

            if cursor.goto_next_sibling() {
                break;
            }
        }

        Some(node)
    }
}

#[cfg(test)]
mod tests {
    // NOTE: these node counts will change if tree-sitter-typescript changes
    // its node structure. Hopefully that doesn't happen often.
    fn parse(src: &str) -> tree_sitter::Tree {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            .expect("Error loading TypeScript grammar");
        parser.parse(src, None).expect("Failed to parse source")
    }

    #[test]
    fn test_iter_is_total() {
        let testcases = &[
            "1;",
            "const x = 1;",
            "function f(a, b) { return a + b; }",
            "createWorkflow('x', {}, () => step('a', () => 1));",
        ];

        for src in testcases {
            let tree = parse(src);

            let node_count = tree.root_node().descendant_count();
            let iter_count = super::TreeIter::new(&tree).count();

            assert_eq!(node_count, iter_count, "mismatch for {src:?}");
        }
    }

    #[test]
    fn test_iter_visits_in_pre_order() {
        let tree = parse("const x = 1;");
        let kinds: Vec<&str> = super::TreeIter::new(&tree).map(|n| n.kind()).collect();

        // The program root must come before its statement, which must
        // come before the declarator and its children.
        let program_idx = kinds.iter().position(|k| *k == "program").unwrap();
        let decl_idx = kinds
            .iter()
            .position(|k| *k == "lexical_declaration")
            .unwrap();
        let declarator_idx = kinds
            .iter()
            .position(|k| *k == "variable_declarator")
            .unwrap();

        assert!(program_idx < decl_idx);
        assert!(decl_idx < declarator_idx);
    }
}
