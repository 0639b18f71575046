use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed or did not match the request.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Produce the embedding of a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        self.generate_embeddings(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingClientError::InvalidResponse("no vector returned".into()))
    }

    /// Dimensionality of the vectors this client produces.
    fn dimension(&self) -> usize;
}

/// Deterministic offline embedding client based on feature hashing.
///
/// Each lowercase alphanumeric word is hashed into one slot of the vector and the result is
/// L2-normalized, so texts sharing vocabulary score high under cosine similarity.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    /// Construct a client producing vectors of `dimension` slots.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let word = word.to_lowercase();
            let position = (fnv1a(word.as_bytes()) % dimension as u64) as usize;
            embedding[position] += 1.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// OpenAI `/embeddings` client.
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingClient {
    /// Construct a client against `base_url` (for example `https://api.openai.com/v1`).
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        tracing::debug!(model = %self.model, texts = expected, "Requesting OpenAI embeddings");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.endpoint()
                ))
            })?;

        let body: OpenAiEmbeddingResponse = decode_success(response).await?;
        let mut items = body.data;
        items.sort_by_key(|item| item.index);
        let vectors: Vec<Vec<f32>> = items.into_iter().map(|item| item.embedding).collect();
        ensure_count(expected, vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Ollama `/api/embed` client.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbeddingClient {
    /// Construct a client against an Ollama runtime at `base_url`.
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            dimension,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        tracing::debug!(model = %self.model, texts = expected, "Requesting Ollama embeddings");

        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        let body: OllamaEmbedResponse = decode_success(response).await?;
        ensure_count(expected, body.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

async fn decode_success<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, EmbeddingClientError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(EmbeddingClientError::ProviderUnavailable(format!(
            "endpoint {} returned 404",
            response.url()
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbeddingClientError::GenerationFailed(format!(
            "provider returned {status}: {body}"
        )));
    }
    response.json().await.map_err(|error| {
        EmbeddingClientError::InvalidResponse(format!("failed to decode response: {error}"))
    })
}

fn ensure_count(
    expected: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    if vectors.len() != expected {
        return Err(EmbeddingClientError::InvalidResponse(format!(
            "expected {expected} vectors, got {}",
            vectors.len()
        )));
    }
    Ok(vectors)
}

/// Build an embedding client suitable for the supplied configuration.
pub fn get_embedding_client(config: &Config, http: &Client) -> Arc<dyn EmbeddingClient> {
    match config.embedding_provider {
        EmbeddingProvider::Hash => Arc::new(HashEmbeddingClient::new(config.embedding_dimension)),
        EmbeddingProvider::OpenAI => Arc::new(OpenAiEmbeddingClient::new(
            http.clone(),
            config.openai_base_url.clone(),
            config.openai_api_key.clone().unwrap_or_default(),
            config.embedding_model.clone(),
            config.embedding_dimension,
        )),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            http.clone(),
            config.ollama_url.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
        )),
    }
}
