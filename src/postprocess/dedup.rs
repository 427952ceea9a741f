//! Structural duplicate detection for generated test methods.
//!
//! A test's `// given` and `// then` sections are reduced to their shape:
//! type names, literals and a fixed set of structural keywords survive,
//! every other identifier is dropped. Two tests whose reduced sections hash
//! the same are duplicates; `// when` lines never take part.

use std::collections::HashMap;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PunitoError, Result};
use crate::ingest::code::JavaParser;
use crate::ingest::hasher::hash_text;
use crate::models::declaration::{annotation_simple_name, MethodDecl};
use crate::slicing::extractor::{extract_span, find_span};

/// Non-capitalized identifiers that survive normalization.
const STRUCTURAL_WORDS: &[&str] = &[
    "assertEquals",
    "assertTrue",
    "assertFalse",
    "assertNull",
    "assertNotNull",
    "assertThrows",
    "assertSame",
    "assertThat",
    "verify",
    "when",
    "thenReturn",
    "thenThrow",
    "doReturn",
    "doThrow",
    "doNothing",
    "times",
    "never",
    "any",
    "eq",
    "true",
    "false",
    "null",
    "new",
    "return",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Given,
    When,
    Then,
}

/// Given/then lines of one test method, as written.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TestSections {
    pub given: Vec<String>,
    pub then: Vec<String>,
}

/// Split a method's lines on `// given`, `// when` and `// then` markers.
///
/// Lines before the first marker and under `// when` are dropped. A
/// combined `// when ... then` marker opens a then-section.
#[must_use]
pub fn split_sections(method_text: &str) -> TestSections {
    let mut sections = TestSections::default();
    let mut current = Section::Preamble;

    for line in method_text.lines() {
        let trimmed = line.trim();
        if let Some(comment) = trimmed.strip_prefix("//") {
            let marker = comment.trim().to_lowercase();
            if marker.starts_with("given") {
                current = Section::Given;
            } else if marker.starts_with("when") {
                current = if marker.contains("then") {
                    Section::Then
                } else {
                    Section::When
                };
            } else if marker.starts_with("then") {
                current = Section::Then;
            }
            continue;
        }
        match current {
            Section::Given => sections.given.push(trimmed.to_string()),
            Section::Then => sections.then.push(trimmed.to_string()),
            Section::Preamble | Section::When => {}
        }
    }
    sections
}

/// Reduces source lines to their structural tokens.
pub struct Normalizer {
    token: Regex,
}

impl Normalizer {
    pub fn new() -> Result<Self> {
        let token = Regex::new(
            r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|[A-Za-z_$][A-Za-z0-9_$]*|\d+(?:\.\d+)?[LlFfDd]?|[=.]"#,
        )
        .map_err(|e| PunitoError::Other(format!("invalid regex: {e}")))?;
        Ok(Self { token })
    }

    fn keep(token: &str) -> bool {
        let Some(first) = token.chars().next() else {
            return false;
        };
        first == '"'
            || first == '\''
            || first.is_ascii_digit()
            || first.is_uppercase()
            || token == "="
            || token == "."
            || STRUCTURAL_WORDS.contains(&token)
    }

    /// Kept tokens of one line joined by spaces.
    #[must_use]
    pub fn normalize_line(&self, line: &str) -> String {
        self.token
            .find_iter(line)
            .map(|m| m.as_str())
            .filter(|t| Self::keep(t))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Normalized non-empty lines, sorted and joined.
    #[must_use]
    pub fn normalize_section(&self, lines: &[String]) -> String {
        let mut normalized: Vec<String> = lines
            .iter()
            .map(|l| self.normalize_line(l))
            .filter(|l| !l.is_empty())
            .collect();
        normalized.sort();
        normalized.join("\n")
    }
}

/// A representative test and the tests structurally equal to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub representative: String,
    pub duplicates: Vec<String>,
}

/// A duplicate located in the source: its name and 1-based start line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Located {
    name: String,
    start_line: usize,
}

fn is_test_method(method: &MethodDecl) -> bool {
    method.name.starts_with("test")
        || method
            .annotations
            .iter()
            .any(|a| annotation_simple_name(a).ends_with("Test"))
}

fn detect(source: &str) -> Result<(Vec<DuplicateGroup>, Vec<Located>)> {
    let parsed = JavaParser::new().parse(source)?;
    if parsed.quality.fallback_recommended() {
        warn!(quality = ?parsed.quality, "test class has syntax errors, deduplicating what parsed");
    }
    let normalizer = Normalizer::new()?;

    let mut first_by_key: HashMap<(String, String), usize> = HashMap::new();
    let mut groups: Vec<DuplicateGroup> = Vec::new();
    let mut located = Vec::new();

    for method in parsed.unit.methods().filter(|m| is_test_method(m)) {
        let Some(text) = extract_span(source, method.start_line) else {
            continue;
        };
        let sections = split_sections(&text);
        let given = normalizer.normalize_section(&sections.given);
        let then = normalizer.normalize_section(&sections.then);
        if given.is_empty() && then.is_empty() {
            continue;
        }

        let key = (hash_text(&given), hash_text(&then));
        match first_by_key.get(&key) {
            Some(&group) => {
                debug!(
                    method = %method.name,
                    representative = %groups[group].representative,
                    "duplicate test"
                );
                groups[group].duplicates.push(method.name.clone());
                located.push(Located {
                    name: method.name.clone(),
                    start_line: method.start_line,
                });
            }
            None => {
                first_by_key.insert(key, groups.len());
                groups.push(DuplicateGroup {
                    representative: method.name.clone(),
                    duplicates: Vec::new(),
                });
            }
        }
    }

    groups.retain(|g| !g.duplicates.is_empty());
    Ok((groups, located))
}

/// Groups of structurally identical tests, in source order of their representatives.
pub fn find_duplicates(source: &str) -> Result<Vec<DuplicateGroup>> {
    detect(source).map(|(groups, _)| groups)
}

/// Delete every duplicate test, keeping the first of each group.
///
/// Returns the input unchanged when there is nothing to remove.
pub fn remove_duplicates(source: &str) -> Result<String> {
    let (groups, mut located) = detect(source)?;
    if located.is_empty() {
        return Ok(source.to_string());
    }

    let mut lines: Vec<&str> = source.lines().collect();
    // Descending start line keeps earlier indices valid.
    located.sort_by(|a, b| b.start_line.cmp(&a.start_line));
    for dup in &located {
        let Some(span) = find_span(source, dup.start_line) else {
            continue;
        };
        let mut end = span.end;
        if lines.get(end).is_some_and(|l| l.trim().is_empty()) {
            end += 1;
        }
        debug!(method = %dup.name, start = span.start, end, "removing duplicate test");
        lines.drain(span.start - 1..end.min(lines.len()));
    }

    info!(
        groups = groups.len(),
        removed = located.len(),
        "removed duplicate tests"
    );
    let mut out = lines.join("\n");
    if source.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASS: &str = r#"public class AccountMockitoTest {

    @Mock
    private Ledger ledger;

    @Test
    void depositsOne() {
        // given
        Account account = new Account(ledger);
        BigDecimal amount = BigDecimal.ONE;
        // when
        account.deposit(amount);
        // then
        verify(ledger).append(eq("owner"), eq(BigDecimal.ONE));
    }

    @Test
    void depositsAgain() {
        // Given
        BigDecimal value = BigDecimal.ONE;
        Account acc = new Account(ledger);
        // When
        acc.deposit(value.add(BigDecimal.ZERO));
        // Then
        verify(ledger).append(eq("owner"), eq(BigDecimal.ONE));
    }

    @Test
    void depositRejectsNull() {
        // given
        Account account = new Account(ledger);
        // when then
        assertThrows(IllegalArgumentException.class, () -> account.deposit(null));
    }

    private Account account() {
        return new Account(ledger);
    }
}
"#;

    #[test]
    fn sections_follow_markers() {
        let sections = split_sections(
            "void t() {\n    int ignored = 0;\n    // given\n    a();\n    // when\n    b();\n    // then\n    c();\n}",
        );
        assert_eq!(sections.given, vec!["a();"]);
        assert_eq!(sections.then, vec!["c();", "}"]);
    }

    #[test]
    fn normalization_erases_variable_names() {
        let normalizer = Normalizer::new().unwrap();
        assert_eq!(
            normalizer.normalize_line("Account account = new Account(ledger, 42, \"x\");"),
            "Account = new Account 42 \"x\""
        );
        assert_eq!(
            normalizer.normalize_line("Account acc = new Account(repo, 42, \"x\");"),
            normalizer.normalize_line("Account account = new Account(ledger, 42, \"x\");")
        );
        assert_eq!(normalizer.normalize_line("}"), "");
    }

    #[test]
    fn duplicates_are_detected_across_names_and_when_arguments() {
        let groups = find_duplicates(CLASS).unwrap();
        assert_eq!(
            groups,
            vec![DuplicateGroup {
                representative: "depositsOne".into(),
                duplicates: vec!["depositsAgain".into()],
            }]
        );
    }

    #[test]
    fn remover_keeps_the_first_test() {
        let out = remove_duplicates(CLASS).unwrap();
        assert!(out.contains("void depositsOne()"));
        assert!(!out.contains("void depositsAgain()"));
        assert!(out.contains("void depositRejectsNull()"));
        assert!(out.contains("private Account account()"));
        assert!(!out.contains("\n\n\n"));
        assert!(out.ends_with("}\n"));
    }

    #[test]
    fn remover_is_idempotent() {
        let once = remove_duplicates(CLASS).unwrap();
        let twice = remove_duplicates(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn different_literals_are_not_duplicates() {
        let source = r#"public class T {
    @Test
    void a() {
        // given
        int x = 1;
        // then
        assertEquals(1, x);
    }

    @Test
    void b() {
        // given
        int y = 2;
        // then
        assertEquals(2, y);
    }
}
"#;
        assert!(find_duplicates(source).unwrap().is_empty());
        assert_eq!(remove_duplicates(source).unwrap(), source);
    }

    #[test]
    fn tests_without_markers_are_never_duplicates() {
        let source = r#"public class T {
    @Test
    void a() {
        service.run();
    }

    @Test
    void b() {
        service.run();
    }
}
"#;
        assert!(find_duplicates(source).unwrap().is_empty());
    }

    #[test]
    fn test_prefix_marks_junit3_style_methods() {
        let source = r#"public class T {
    public void testOne() {
        // then
        assertTrue(Flag.ON);
    }

    public void testTwo() {
        // then
        assertTrue(Flag.ON);
    }

    public void helperOne() {
        // then
        assertTrue(Flag.ON);
    }
}
"#;
        let groups = find_duplicates(source).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].duplicates, vec!["testTwo"]);
    }
}
