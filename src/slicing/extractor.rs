//! Brace-balance extraction of method source from class text.
//!
//! Declarations carry a start line; the end is found by scanning forward
//! and counting braces, so the slice is the verbatim text the author wrote
//! (comments and formatting intact).

use crate::models::declaration::MethodDecl;

/// Inclusive, 1-based line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

impl LineSpan {
    #[must_use]
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Line-by-line brace counter that skips literals and comments.
#[derive(Debug, Default)]
struct BraceScanner {
    depth: i64,
    /// Parenthesis depth before the body opens (annotation arguments).
    parens: i64,
    started: bool,
    in_block_comment: bool,
    in_text_block: bool,
}

impl BraceScanner {
    fn feed_line(&mut self, line: &str) {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if self.in_block_comment {
                if c == '*' && next == Some('/') {
                    self.in_block_comment = false;
                    i += 1;
                }
                i += 1;
                continue;
            }
            if self.in_text_block {
                if starts_text_block(&chars, i) {
                    self.in_text_block = false;
                    i += 3;
                } else {
                    i += 1;
                }
                continue;
            }

            match c {
                '/' if next == Some('/') => return,
                '/' if next == Some('*') => {
                    self.in_block_comment = true;
                    i += 1;
                }
                '"' if starts_text_block(&chars, i) => {
                    self.in_text_block = true;
                    i += 2;
                }
                '"' | '\'' => i = skip_literal(&chars, i, c),
                '(' if !self.started => self.parens += 1,
                ')' if !self.started => self.parens -= 1,
                '{' => {
                    if self.started || self.parens <= 0 {
                        self.started = true;
                        self.depth += 1;
                    }
                }
                '}' => {
                    if self.started {
                        self.depth -= 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }
    }

    fn finished(&self) -> bool {
        self.started && self.depth <= 0
    }
}

fn starts_text_block(chars: &[char], i: usize) -> bool {
    chars.get(i..i + 3) == Some(&['"', '"', '"'])
}

/// Index of the closing quote of the literal opened at `start` (or end of line).
fn skip_literal(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i,
            _ => i += 1,
        }
    }
    chars.len()
}

/// Find the extent of the declaration starting at `start_line` (1-based).
///
/// The span ends on the first line where the brace balance returns to zero
/// after the body opened. Unbalanced input runs to the end of the text.
/// Returns `None` when `start_line` is not a line of `source`.
#[must_use]
pub fn find_span(source: &str, start_line: usize) -> Option<LineSpan> {
    let total = source.lines().count();
    if start_line == 0 || start_line > total {
        return None;
    }

    let mut scanner = BraceScanner::default();
    for (offset, line) in source.lines().skip(start_line - 1).enumerate() {
        scanner.feed_line(line);
        if scanner.finished() {
            return Some(LineSpan {
                start: start_line,
                end: start_line + offset,
            });
        }
    }
    Some(LineSpan {
        start: start_line,
        end: total,
    })
}

/// The lines covered by `span`, joined with `\n`.
#[must_use]
pub fn span_text(source: &str, span: LineSpan) -> String {
    source
        .lines()
        .skip(span.start.saturating_sub(1))
        .take(span.len())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Verbatim source for a brace-delimited declaration starting at `start_line`.
#[must_use]
pub fn extract_span(source: &str, start_line: usize) -> Option<String> {
    find_span(source, start_line).map(|span| span_text(source, span))
}

/// Verbatim source of a method, annotations included.
#[must_use]
pub fn extract_method_source(source: &str, method: &MethodDecl) -> Option<String> {
    extract_span(source, method.start_line)
}
