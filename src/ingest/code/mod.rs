pub mod java;

use serde::Serialize;

pub use java::{JavaParser, ParseResult};

/// Indicates the quality/completeness of a parse result.
///
/// tree-sitter recovers from syntax errors, so a class with a broken method
/// still yields declarations for the rest of the file. Callers decide whether
/// partial results are good enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ParseQuality {
    /// Fully parsed without any syntax errors.
    Complete,
    /// Parsed but with syntax errors (tree-sitter `has_error` was true).
    Partial {
        /// Number of error lines found in the AST.
        error_count: usize,
        /// Line numbers where errors were detected (1-based).
        error_lines: Vec<u32>,
    },
}

impl ParseQuality {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Returns true if the declarations may be incomplete.
    #[must_use]
    pub fn fallback_recommended(&self) -> bool {
        !matches!(self, Self::Complete)
    }
}

/// Helper to find error nodes in a tree-sitter tree.
/// Returns 1-based line numbers of all ERROR nodes.
#[must_use]
pub fn find_error_lines(root: tree_sitter::Node) -> Vec<u32> {
    let mut errors = Vec::new();
    let mut cursor = root.walk();

    fn visit(cursor: &mut tree_sitter::TreeCursor, errors: &mut Vec<u32>) {
        loop {
            let node = cursor.node();
            if node.is_error() || node.is_missing() {
                let line = node.start_position().row as u32 + 1;
                if !errors.contains(&line) {
                    errors.push(line);
                }
            }
            if cursor.goto_first_child() {
                visit(cursor, errors);
                cursor.goto_parent();
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }

    visit(&mut cursor, &mut errors);
    errors.sort_unstable();
    errors
}
