//! Chat-completion clients used by the generate node.
//!
//! Both adapters issue HTTP requests directly to the provider and return the raw assistant
//! text. Responses are passed through untouched; refusals are ordinary answers.

use crate::config::{Config, LlmProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while requesting a chat completion.
#[derive(Debug, Error)]
pub enum ChatClientError {
    /// Provider was unreachable or the endpoint does not exist.
    #[error("Chat provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by chat-completion providers.
///
/// Implementations must tolerate concurrent independent calls.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Complete a two-message conversation and return the assistant text.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ChatClientError>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}

/// OpenAI `/chat/completions` client with temperature pinned to zero.
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiChatClient {
    /// Construct a client against `base_url` (for example `https://api.openai.com/v1`).
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ChatClientError> {
        let payload = json!({
            "model": self.model,
            "temperature": 0.0,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ]
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                ChatClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.endpoint()
                ))
            })?;

        let body: OpenAiChatResponse = decode_success(response, &self.endpoint()).await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ChatClientError::InvalidResponse("response contained no choices".into()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Ollama `/api/chat` client (non-streaming).
pub struct OllamaChatClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaChatClient {
    /// Construct a client against an Ollama runtime at `base_url`.
    pub fn new(http: Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
    done: bool,
}

#[async_trait]
impl ChatClient for OllamaChatClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ChatClientError> {
        let payload = json!({
            "model": self.model,
            "stream": false,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ],
            "options": {
                "temperature": 0.0,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                ChatClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        let body: OllamaChatResponse = decode_success(response, &self.endpoint()).await?;
        if !body.done {
            return Err(ChatClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }
        body.message
            .content
            .ok_or_else(|| ChatClientError::InvalidResponse("message had no content".into()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

async fn decode_success<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
    endpoint: &str,
) -> Result<T, ChatClientError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ChatClientError::ProviderUnavailable(format!(
            "endpoint {endpoint} returned 404"
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ChatClientError::GenerationFailed(format!(
            "provider returned {status}: {body}"
        )));
    }
    response.json().await.map_err(|error| {
        ChatClientError::InvalidResponse(format!("failed to decode response: {error}"))
    })
}

/// Build the chat client selected by configuration.
pub fn get_chat_client(config: &Config, http: &Client) -> Arc<dyn ChatClient> {
    match config.llm_provider {
        LlmProvider::OpenAI => Arc::new(OpenAiChatClient::new(
            http.clone(),
            config.openai_base_url.clone(),
            config.openai_api_key.clone().unwrap_or_default(),
            config.chat_model.clone(),
        )),
        LlmProvider::Ollama => Arc::new(OllamaChatClient::new(
            http.clone(),
            config.ollama_url.clone(),
            config.chat_model.clone(),
        )),
    }
}
