//! Chat model capability used by the generation pipeline.

pub mod openai;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

pub use openai::OpenAiCompatibleClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Speaker label used in saved prompt transcripts.
    #[must_use]
    pub fn transcript_label(&self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "Human",
            Self::Assistant => "AI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Render a conversation as `System: ...` / `Human: ...` blocks.
#[must_use]
pub fn transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.transcript_label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A language model that answers an ordered list of role-tagged messages.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_serialize_with_lowercase_roles() {
        let json = serde_json::to_string(&ChatMessage::system("be terse")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"be terse"}"#);
    }

    #[test]
    fn transcript_labels_each_message() {
        let text = transcript(&[ChatMessage::system("rules"), ChatMessage::user("code")]);
        assert_eq!(text, "System: rules\nHuman: code");
    }
}
