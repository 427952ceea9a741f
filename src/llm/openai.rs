use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::config::LlmSettings;
use crate::error::{PunitoError, Result};
use crate::llm::{ChatMessage, ChatModel};

/// Client for any server speaking the OpenAI chat-completions protocol.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    url: Url,
    model: String,
    streaming: bool,
    client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: &str,
        endpoint: &str,
        model: impl Into<String>,
        api_key: Option<&str>,
        streaming: bool,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let url = join_endpoint(base_url, endpoint)?;

        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|e| PunitoError::Config(format!("invalid api key: {e}")))?,
            );
        }
        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            url,
            model: model.into(),
            streaming,
            client: builder.build()?,
        })
    }

    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        if settings.model.is_empty() {
            return Err(PunitoError::Config("llm.model is not set".into()));
        }
        Self::new(
            &settings.base_url,
            &settings.endpoint,
            settings.model.clone(),
            settings.api_key.as_deref(),
            settings.streaming,
            settings.timeout_secs.map(Duration::from_secs),
        )
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            stream,
        };
        debug!(url = %self.url, stream, messages = messages.len(), "sending chat request");
        Ok(self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?)
    }

    async fn complete_once(&self, messages: &[ChatMessage]) -> Result<String> {
        let parsed: ChatCompletionResponse = self.send(messages, false).await?.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PunitoError::Llm("missing choices[0].message.content".into()))
    }

    async fn complete_streaming(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut bytes_stream = self.send(messages, true).await?.bytes_stream();
        let mut buffer = BytesMut::new();
        let mut output = String::new();

        while let Some(chunk) = bytes_stream.next().await {
            buffer.extend_from_slice(&chunk?);
            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line = buffer.split_to(pos + 1);
                if apply_stream_line(&line[..pos], &mut output) == StreamLine::Done {
                    return Ok(output);
                }
            }
        }
        // A final event may arrive without a trailing newline.
        if !buffer.is_empty() {
            apply_stream_line(&buffer, &mut output);
        }
        Ok(output)
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        if self.streaming {
            self.complete_streaming(messages).await
        } else {
            self.complete_once(messages).await
        }
    }
}

fn join_endpoint(base_url: &str, endpoint: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| PunitoError::Config(format!("invalid llm url {joined}: {e}")))
}

#[derive(Debug, PartialEq, Eq)]
enum StreamLine {
    Continue,
    Done,
}

/// Apply one server-sent-events line to the accumulated output.
fn apply_stream_line(line: &[u8], output: &mut String) -> StreamLine {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return StreamLine::Continue;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return StreamLine::Done;
    }
    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => {
            if let Some(content) = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
            {
                output.push_str(&content);
            }
        }
        Err(e) => warn!(error = %e, line = data, "skipping unparseable stream line"),
    }
    StreamLine::Continue
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChatCompletionChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunkChoice {
    delta: ChatCompletionDelta,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionDelta {
    content: Option<String>,
}
