//! Chat collaborator: one-turn completions from a local Ollama server.
//!
//! The reply text is returned exactly as the model produced it. No retries;
//! the HTTP client timeout is the only bound on a slow model.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use palaver_core::types::ChatConfig;

use crate::error::{PalaverError, Result};

/// A single entry in a conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Anything that turns a conversation into a reply.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, history: &[ChatMessage]) -> Result<String>;
}

/// Generate the reply to one user message, with no prior context.
///
/// The message goes out as a single `user`-role entry holding the raw text.
/// The role carries the speaker, so no `You:` prefix is added.
pub async fn generate_response(backend: &dyn ChatBackend, message: &str) -> Result<String> {
    let history = [ChatMessage::user(message)];
    backend.complete(&history).await
}

/// [`ChatBackend`] backed by Ollama's `/api/chat`.
pub struct OllamaClient {
    client: Client,
    url: String,
    model: String,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaReply,
}

#[derive(Deserialize)]
struct OllamaReply {
    #[serde(default)]
    content: String,
}

impl OllamaClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/api/chat", config.ollama_url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn complete(&self, history: &[ChatMessage]) -> Result<String> {
        let body = OllamaChatRequest {
            model: &self.model,
            messages: history,
            stream: false,
        };

        debug!(model = %self.model, turns = history.len(), "chat: POST {}", self.url);

        let resp = self.client.post(&self.url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PalaverError::Chat(format!("Ollama error {status}: {text}")));
        }

        let parsed: OllamaChatResponse = resp.json().await?;
        debug!("chat: reply {} chars", parsed.message.content.len());
        Ok(parsed.message.content)
    }
}
