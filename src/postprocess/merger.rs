use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};

use crate::error::{PunitoError, Result};
use crate::ingest::code::JavaParser;
use crate::slicing::extractor::{extract_span, span_text, LineSpan};

/// Field annotations that mark Mockito-managed fields.
pub const MOCKITO_FIELD_ANNOTATIONS: &[&str] = &["Mock", "Spy", "InjectMocks", "Captor"];

/// Remove a surrounding Markdown code fence, keeping the fenced body.
#[must_use]
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    // Skip the info string (```java) up to the end of the fence line.
    let after_open = &trimmed[open + 3..];
    let body_start = after_open.find('\n').map_or(after_open.len(), |i| i + 1);
    let body = &after_open[body_start..];
    let body = body.find("```").map_or(body, |close| &body[..close]);
    body.trim().to_string()
}

/// Class-level metadata taken from the first usable fragment.
#[derive(Debug, Default)]
struct ClassHeader {
    package: Option<String>,
    name: String,
    annotations: Vec<String>,
    superclass: Option<String>,
}

#[derive(Debug, Default)]
struct MergeState {
    header: Option<ClassHeader>,
    imports: BTreeSet<String>,
    field_names: HashSet<String>,
    mock_fields: Vec<String>,
    other_fields: Vec<String>,
    seen_members: HashSet<String>,
    tests: Vec<String>,
    helpers: Vec<String>,
}

impl MergeState {
    /// Fold one fragment in; returns false when it was skipped.
    fn absorb(&mut self, parser: &JavaParser, index: usize, raw: &str) -> Result<bool> {
        let text = strip_code_fences(raw);
        let parsed = parser.parse(&text)?;
        if parsed.quality.fallback_recommended() {
            warn!(fragment = index, quality = ?parsed.quality, "skipping fragment with syntax errors");
            return Ok(false);
        }
        let unit = parsed.unit;
        let Some(class) = unit.primary_type() else {
            warn!(fragment = index, "skipping fragment without a class declaration");
            return Ok(false);
        };

        if self.header.is_none() {
            self.header = Some(ClassHeader {
                package: unit.package.clone(),
                name: class.name.clone(),
                annotations: class.annotations.clone(),
                superclass: class.superclass.clone(),
            });
        }
        self.imports.extend(unit.imports.iter().cloned());

        for field in &class.fields {
            if field.names.iter().any(|n| self.field_names.contains(n)) {
                continue;
            }
            self.field_names.extend(field.names.iter().cloned());
            let span = LineSpan {
                start: field.start_line,
                end: field.end_line,
            };
            let field_text = span_text(&text, span);
            let is_mock = MOCKITO_FIELD_ANNOTATIONS
                .iter()
                .any(|a| field.has_annotation(a));
            if is_mock {
                self.mock_fields.push(field_text);
            } else {
                self.other_fields.push(field_text);
            }
        }

        for method in &class.methods {
            let Some(method_text) = extract_span(&text, method.start_line) else {
                continue;
            };
            if !self.seen_members.insert(method_text.clone()) {
                debug!(fragment = index, method = %method.name, "dropping identical method");
                continue;
            }
            if method.is_private() {
                self.helpers.push(method_text);
            } else {
                self.tests.push(method_text);
            }
        }

        // `@Nested` groups and other member classes are kept whole.
        for nested in unit.types.iter().filter(|t| t.parent.as_deref() == Some(class.name.as_str())) {
            let Some(nested_text) = extract_span(&text, nested.start_line) else {
                warn!(fragment = index, class = %nested.name, "dropping nested class without a body");
                continue;
            };
            if self.seen_members.insert(nested_text.clone()) {
                self.tests.push(nested_text);
            } else {
                debug!(fragment = index, class = %nested.name, "dropping identical nested class");
            }
        }
        Ok(true)
    }

    fn render(self, class_name: Option<&str>) -> Option<String> {
        let header = self.header?;
        let name = class_name.unwrap_or(&header.name);

        let mut out = String::new();
        if let Some(package) = &header.package {
            out.push_str(package);
            out.push_str("\n\n");
        }
        if !self.imports.is_empty() {
            let imports: Vec<&str> = self.imports.iter().map(String::as_str).collect();
            out.push_str(&imports.join("\n"));
            out.push_str("\n\n");
        }
        for annotation in &header.annotations {
            out.push_str(annotation);
            out.push('\n');
        }
        let extends = header
            .superclass
            .as_deref()
            .map(|s| format!(" {s}"))
            .unwrap_or_default();

        let fields: Vec<String> = self.mock_fields.into_iter().chain(self.other_fields).collect();
        let sections: Vec<String> = [fields, self.tests, self.helpers]
            .into_iter()
            .filter(|section| !section.is_empty())
            .map(|section| section.join("\n\n"))
            .collect();
        out.push_str(&format!("public class {name}{extends} {{\n"));
        if !sections.is_empty() {
            out.push('\n');
            out.push_str(&sections.join("\n\n"));
            out.push('\n');
        }
        out.push('}');
        Some(out)
    }
}

/// Merge generated test fragments into a single test class.
///
/// Fragments that fail to parse are skipped with a warning. Package, class
/// annotations and the extends clause come from the first usable fragment;
/// `class_name` overrides its name.
pub fn merge_fragments(class_name: Option<&str>, fragments: &[String]) -> Result<String> {
    let parser = JavaParser::new();
    let mut state = MergeState::default();
    let mut merged = 0usize;

    for (index, fragment) in fragments.iter().enumerate() {
        if state.absorb(&parser, index, fragment)? {
            merged += 1;
        }
    }
    debug!(fragments = fragments.len(), merged, "merged fragments");

    state.render(class_name).ok_or_else(|| PunitoError::NoFragments {
        class: class_name.unwrap_or("<unknown>").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAGMENT: &str = r#"```java
package com.example;

import static org.mockito.Mockito.verify;
import org.junit.jupiter.api.Test;
import static org.mockito.Mockito.verify;

@ExtendWith(MockitoExtension.class)
public class AccountTest extends BaseTest {
    @Mock
    private Ledger ledger;

    @InjectMocks
    private Account account;

    @Test
    void depositRecordsInLedger() {
        account.deposit(BigDecimal.ONE);
        verify(ledger).append(any(), eq(BigDecimal.ONE));
    }

    private BigDecimal amount() {
        return BigDecimal.ONE;
    }
}
```"#;

    #[test]
    fn strip_code_fences_keeps_the_body() {
        assert_eq!(strip_code_fences("```java\nclass A {}\n```"), "class A {}");
        assert_eq!(strip_code_fences("Here:\n```\nclass A {}\n```\nDone"), "class A {}");
        assert_eq!(strip_code_fences("  class A {}  "), "class A {}");
    }

    #[test]
    fn single_fragment_round_trip() {
        let merged = merge_fragments(None, &[FRAGMENT.to_string()]).unwrap();
        let expected_head = "package com.example;\n\n\
import org.junit.jupiter.api.Test;\n\
import static org.mockito.Mockito.verify;\n\n\
@ExtendWith(MockitoExtension.class)\n\
public class AccountTest extends BaseTest {\n\n";
        assert!(merged.starts_with(expected_head), "{merged}");
        assert_eq!(merged.matches("@Test").count(), 1);
        assert_eq!(merged.matches("private BigDecimal amount()").count(), 1);
        let test_pos = merged.find("void depositRecordsInLedger").unwrap();
        let helper_pos = merged.find("private BigDecimal amount()").unwrap();
        assert!(test_pos < helper_pos);
        assert!(merged.ends_with("\n}"));
    }

    #[test]
    fn fields_are_deduplicated_by_name_and_mocks_come_first() {
        let second = r#"
import org.mockito.Mock;

public class Other {
    private static final String NAME = "n";

    @Mock
    private Ledger ledger;

    @Mock
    private Clock clock;

    @Test
    void withdraws() {
        account.withdraw(BigDecimal.ONE);
    }
}
"#;
        let merged =
            merge_fragments(Some("AccountMockitoTest"), &[FRAGMENT.to_string(), second.to_string()])
                .unwrap();
        assert!(merged.contains("public class AccountMockitoTest extends BaseTest {"));
        assert_eq!(merged.matches("private Ledger ledger;").count(), 1);
        let clock = merged.find("private Clock clock;").unwrap();
        let name = merged.find("NAME = \"n\"").unwrap();
        assert!(clock < name);
        assert!(merged.contains("import org.mockito.Mock;"));
        let first_test = merged.find("depositRecordsInLedger").unwrap();
        let second_test = merged.find("withdraws").unwrap();
        assert!(first_test < second_test);
    }

    #[test]
    fn identical_methods_are_kept_once() {
        let merged =
            merge_fragments(None, &[FRAGMENT.to_string(), FRAGMENT.to_string()]).unwrap();
        assert_eq!(merged.matches("void depositRecordsInLedger").count(), 1);
        assert_eq!(merged.matches("private BigDecimal amount()").count(), 1);
    }

    #[test]
    fn unparseable_fragments_are_skipped() {
        let broken = "public class Broken {\n    @Test\n    void half( {\n}\n".to_string();
        let prose = "I could not generate tests for this method.".to_string();
        let merged = merge_fragments(None, &[broken, prose, FRAGMENT.to_string()]).unwrap();
        assert!(merged.contains("public class AccountTest"));
        assert!(!merged.contains("Broken"));
    }

    #[test]
    fn nested_test_classes_are_kept() {
        let fragment = r#"
import org.junit.jupiter.api.Nested;
import org.junit.jupiter.api.Test;

public class QueueTest {
    @Test
    void topLevel() {
        assertTrue(queue.isEmpty());
    }

    @Nested
    class WhenEmpty {
        @Test
        void nestedCase() {
            assertNull(queue.poll());
        }
    }
}
"#;
        let merged =
            merge_fragments(None, &[fragment.to_string(), fragment.to_string()]).unwrap();
        assert_eq!(merged.matches("void topLevel()").count(), 1);
        assert_eq!(merged.matches("class WhenEmpty {").count(), 1);
        assert!(merged.contains("    @Nested\n    class WhenEmpty {"), "{merged}");
        assert!(merged.contains("void nestedCase()"));
        let top = merged.find("void topLevel()").unwrap();
        let nested = merged.find("class WhenEmpty").unwrap();
        assert!(top < nested);
    }

    #[test]
    fn empty_sections_leave_no_blank_runs() {
        let fragment = "public class QueueTest {\n    @Test\n    void polls() {\n        queue.poll();\n    }\n}\n";
        let merged = merge_fragments(None, &[fragment.to_string()]).unwrap();
        assert!(merged.starts_with("public class QueueTest {"), "{merged}");
        assert!(merged.ends_with(
            "public class QueueTest {\n\n    @Test\n    void polls() {\n        queue.poll();\n    }\n}"
        ), "{merged}");
        assert!(!merged.contains("\n\n\n"));
    }

    #[test]
    fn no_usable_fragment_is_an_error() {
        let err = merge_fragments(Some("AccountMockitoTest"), &["no code".to_string()]).unwrap_err();
        assert!(matches!(err, PunitoError::NoFragments { .. }));
    }
}
