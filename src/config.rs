use crate::splitter::{SplitUnit, SplitterConfig};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for a docqa instance.
///
/// The configuration is an explicit value handed to [`crate::qa::QaSystem::from_config`]; nothing
/// is cached process-wide, so two systems in one process may run with different settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default document source (filesystem path or `http(s)` URL).
    pub source: Option<String>,
    /// Chat-completion backend used by the generate node.
    pub llm_provider: LlmProvider,
    /// Chat model identifier passed to the provider.
    pub chat_model: String,
    /// Embedding backend used to build the vector index.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// API key for the OpenAI-compatible endpoints.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API.
    pub openai_base_url: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Similarity store backing the vector index.
    pub vector_store: VectorStoreKind,
    /// Base URL of the Qdrant instance (only used with [`VectorStoreKind::Qdrant`]).
    pub qdrant_url: String,
    /// Name of the Qdrant collection holding document chunks.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Maximum chunk length measured in [`Config::text_splitter_unit`].
    pub text_splitter_chunk_size: usize,
    /// Length shared between consecutive chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Unit used to measure chunk length.
    pub text_splitter_unit: SplitterUnitSetting,
    /// Number of chunks handed to the generate node per question.
    pub retriever_top_k: usize,
    /// Minimum cosine similarity a retrieved chunk must reach; `None` keeps every hit.
    pub retriever_score_threshold: Option<f32>,
    /// Upper bound on questions answered concurrently within one batch.
    pub max_concurrency: usize,
    /// Optional per-question deadline.
    pub query_timeout: Option<Duration>,
    /// Insert the rerank node between retrieve and generate.
    pub enable_rerank: bool,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported chat-completion backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI chat completions API.
    OpenAI,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Deterministic offline hashing, useful for demos and tests.
    Hash,
}

/// Supported similarity stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorStoreKind {
    /// Process-local store, rebuilt on every initialization.
    Memory,
    /// Remote Qdrant collection.
    Qdrant,
}

/// Unit used by the text splitter, as read from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SplitterUnitSetting {
    /// Count Unicode scalar values.
    Characters,
    /// Count BPE tokens of the named encoding or model.
    Tokens(String),
}

const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
const DEFAULT_OPENAI_EMBEDDING_DIMENSION: usize = 1536;
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_QDRANT_URL: &str = "http://127.0.0.1:6333";
const DEFAULT_QDRANT_COLLECTION: &str = "docqa";

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let llm_provider = match load_env_optional("LLM_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("LLM_PROVIDER".into()))?,
            None => LlmProvider::OpenAI,
        };
        let embedding_provider = match load_env_optional("EMBEDDING_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))?,
            None => EmbeddingProvider::OpenAI,
        };
        let vector_store = match load_env_optional("VECTOR_STORE") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("VECTOR_STORE".into()))?,
            None => VectorStoreKind::Memory,
        };
        let text_splitter_unit = match load_env_optional("TEXT_SPLITTER_UNIT") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("TEXT_SPLITTER_UNIT".into()))?,
            None => SplitterUnitSetting::Characters,
        };

        let openai_api_key = load_env_optional("OPENAI_API_KEY");
        let needs_openai_key = llm_provider == LlmProvider::OpenAI
            || embedding_provider == EmbeddingProvider::OpenAI;
        if needs_openai_key && openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".into()));
        }

        let embedding_model = load_env_optional("EMBEDDING_MODEL").unwrap_or_else(|| {
            match embedding_provider {
                EmbeddingProvider::Ollama => "nomic-embed-text".to_string(),
                _ => DEFAULT_OPENAI_EMBEDDING_MODEL.to_string(),
            }
        });
        let default_dimension = match embedding_provider {
            EmbeddingProvider::Ollama => 768,
            _ => DEFAULT_OPENAI_EMBEDDING_DIMENSION,
        };

        let config = Self {
            source: load_env_optional("DOCQA_SOURCE"),
            llm_provider,
            chat_model: load_env_optional("CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            embedding_provider,
            embedding_model,
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?
                .unwrap_or(default_dimension),
            openai_api_key,
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            vector_store,
            qdrant_url: load_env_optional("QDRANT_URL")
                .unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string()),
            qdrant_collection_name: load_env_optional("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| DEFAULT_QDRANT_COLLECTION.to_string()),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            text_splitter_chunk_size: parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?.unwrap_or(1000),
            text_splitter_chunk_overlap: parse_optional("TEXT_SPLITTER_CHUNK_OVERLAP")?
                .unwrap_or(20),
            text_splitter_unit,
            retriever_top_k: parse_optional("RETRIEVER_TOP_K")?.unwrap_or(3),
            retriever_score_threshold: validate_score_threshold(parse_optional(
                "RETRIEVER_SCORE_THRESHOLD",
            )?)?,
            max_concurrency: parse_optional("QA_MAX_CONCURRENCY")?.unwrap_or(8),
            query_timeout: parse_optional::<u64>("QA_QUERY_TIMEOUT_SECS")?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            enable_rerank: parse_optional::<BoolFlag>("QA_ENABLE_RERANK")?
                .map(|flag| flag.0)
                .unwrap_or(false),
            server_port: parse_optional("SERVER_PORT")?,
        };

        if config.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if config.retriever_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVER_TOP_K".into()));
        }
        if config.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue("QA_MAX_CONCURRENCY".into()));
        }

        Ok(config)
    }

    /// Load `.env` (when present) and then read the configuration from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            source = ?config.source,
            llm_provider = ?config.llm_provider,
            chat_model = %config.chat_model,
            embedding_provider = ?config.embedding_provider,
            vector_store = ?config.vector_store,
            server_port = ?config.server_port,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Splitter settings derived from the `TEXT_SPLITTER_*` variables.
    pub fn splitter_config(&self) -> SplitterConfig {
        SplitterConfig {
            chunk_size: self.text_splitter_chunk_size,
            chunk_overlap: self.text_splitter_chunk_overlap,
            unit: match &self.text_splitter_unit {
                SplitterUnitSetting::Characters => SplitUnit::Characters,
                SplitterUnitSetting::Tokens(encoding) => SplitUnit::Tokens {
                    encoding: encoding.clone(),
                },
            },
        }
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Similarity thresholds are cosine scores, so only finite values in `[-1, 1]` make sense.
fn validate_score_threshold(threshold: Option<f32>) -> Result<Option<f32>, ConfigError> {
    match threshold {
        Some(value) if !value.is_finite() || !(-1.0..=1.0).contains(&value) => Err(
            ConfigError::InvalidValue("RETRIEVER_SCORE_THRESHOLD".into()),
        ),
        other => Ok(other),
    }
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

struct BoolFlag(bool);

impl std::str::FromStr for BoolFlag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Self(true)),
            "0" | "false" | "no" | "off" => Ok(Self(false)),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for VectorStoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for SplitterUnitSetting {
    type Err = ();

    /// Accepts `characters`/`chars`, `tokens` (cl100k_base) or `tokens:<encoding-or-model>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "characters" | "chars" => Ok(Self::Characters),
            "tokens" => Ok(Self::Tokens("cl100k_base".into())),
            value => match value.strip_prefix("tokens:") {
                Some(encoding) if !encoding.trim().is_empty() => {
                    Ok(Self::Tokens(encoding.trim().to_string()))
                }
                _ => Err(()),
            },
        }
    }
}
