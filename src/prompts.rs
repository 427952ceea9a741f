//! YAML prompt templates with `{placeholder}` substitution.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{PunitoError, Result};
use crate::llm::ChatMessage;

const BUILTIN_PROMPTS: &[(&str, &str)] = &[
    (
        "planner_prompt",
        include_str!("../resources/prompts/planner_prompt.yaml"),
    ),
    (
        "tester_prompt",
        include_str!("../resources/prompts/tester_prompt.yaml"),
    ),
    (
        "reviewer_prompt",
        include_str!("../resources/prompts/reviewer_prompt.yaml"),
    ),
    (
        "refiner_prompt",
        include_str!("../resources/prompts/refiner_prompt.yaml"),
    ),
];

/// Example test class offered to the model when none is configured.
pub const BUILTIN_TEST_EXAMPLE: &str =
    include_str!("../resources/test_examples/ExampleMockitoTest.java");

/// A system + user message pair before substitution.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptTemplate {
    #[serde(skip)]
    pub name: String,
    pub system: String,
    pub user: String,
}

impl PromptTemplate {
    pub fn parse(name: &str, yaml: &str) -> Result<Self> {
        let mut template: Self = serde_yaml_ng::from_str(yaml).map_err(|e| PunitoError::Prompt {
            name: name.into(),
            detail: format!("expected 'system' and 'user' keys: {e}"),
        })?;
        template.name = name.to_string();
        Ok(template)
    }

    /// Substitute placeholders into both messages.
    pub fn render(&self, vars: &HashMap<String, String>) -> Result<Vec<ChatMessage>> {
        Ok(vec![
            ChatMessage::system(render(&self.name, &self.system, vars)?),
            ChatMessage::user(render(&self.name, &self.user, vars)?),
        ])
    }
}

/// Replace `{name}` with `vars[name]`; `{{` and `}}` yield literal braces.
pub fn render(prompt: &str, template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let error = |detail: String| PunitoError::Prompt {
        name: prompt.into(),
        detail,
    };

    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|(_, n)| *n) == Some('{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek().map(|(_, n)| *n) == Some('}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let rest = &template[i + 1..];
                let Some(close) = rest.find('}') else {
                    return Err(error(format!("unclosed placeholder at byte {i}")));
                };
                let key = &rest[..close];
                let value = vars
                    .get(key)
                    .ok_or_else(|| error(format!("unknown placeholder {{{key}}}")))?;
                out.push_str(value);
                // Skip the key and the closing brace.
                for _ in 0..=key.chars().count() {
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// Built-in templates, optionally overridden by files in a directory.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
}

impl PromptLibrary {
    #[must_use]
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self { override_dir }
    }

    /// Load `<name>.yaml` from the override directory, else the built-in copy.
    pub fn load(&self, name: &str) -> Result<PromptTemplate> {
        if let Some(dir) = &self.override_dir {
            let path = dir.join(format!("{name}.yaml"));
            if path.is_file() {
                let yaml = std::fs::read_to_string(&path)?;
                return PromptTemplate::parse(name, &yaml);
            }
        }
        let yaml = BUILTIN_PROMPTS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, yaml)| *yaml)
            .ok_or_else(|| PunitoError::Prompt {
                name: name.into(),
                detail: "no such prompt template".into(),
            })?;
        PromptTemplate::parse(name, yaml)
    }
}
