use crate::{
    config::ConfigError,
    document::LoadError,
    embedding::EmbeddingClientError,
    index::{IndexError, StoreError},
    llm::ChatClientError,
    splitter::SplitError,
};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`crate::qa::QaSystem`] and the pipeline graphs it drives.
#[derive(Debug, Error)]
pub enum QaError {
    /// A question arrived before `initialize` completed.
    #[error("QA system has not been initialized")]
    NotInitialized,
    /// The document could not be fetched or parsed.
    #[error("Failed to load document: {0}")]
    Load(#[from] LoadError),
    /// Splitter settings were rejected.
    #[error("Failed to configure text splitter: {0}")]
    Split(#[from] SplitError),
    /// Vector index build or retrieval failed.
    #[error("Vector index failure: {0}")]
    Index(#[from] IndexError),
    /// Similarity store could not be constructed.
    #[error("Vector store failure: {0}")]
    Store(#[from] StoreError),
    /// Embedding provider failed outside of index operations.
    #[error("Embedding failure: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Chat-completion provider failed.
    #[error("Chat completion failed: {0}")]
    Chat(#[from] ChatClientError),
    /// Reranker failed.
    #[error("Rerank failed: {0}")]
    Rerank(String),
    /// Configuration was incomplete or malformed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Shared HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    /// A question exceeded the configured deadline.
    #[error("Question timed out after {}s: {question}", limit.as_secs_f64())]
    Timeout {
        /// The question that timed out.
        question: String,
        /// Deadline that elapsed.
        limit: Duration,
    },
    /// Caller input was rejected.
    #[error("Invalid request: {0}")]
    InvalidInput(String),
}

/// Coarse error categories used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Used before setup; not retried.
    NotInitialized,
    /// Document source missing or unreachable.
    NotFound,
    /// Document present but unparseable.
    Format,
    /// Embedding, chat or store backend failed.
    Upstream,
    /// Deadline elapsed.
    Timeout,
    /// Request or configuration rejected.
    Invalid,
    /// Anything else.
    Internal,
}

impl QaError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QaError::NotInitialized | QaError::Index(IndexError::NotInitialized) => {
                ErrorKind::NotInitialized
            }
            QaError::Load(LoadError::NotFound(_)) => ErrorKind::NotFound,
            QaError::Load(LoadError::Format(_)) => ErrorKind::Format,
            QaError::Load(LoadError::Io(_)) | QaError::Http(_) => ErrorKind::Internal,
            QaError::Split(_)
            | QaError::Config(_)
            | QaError::InvalidInput(_)
            | QaError::Index(IndexError::InvalidTopK)
            | QaError::Store(StoreError::InvalidUrl(_)) => ErrorKind::Invalid,
            QaError::Index(_)
            | QaError::Store(_)
            | QaError::Embedding(_)
            | QaError::Chat(_)
            | QaError::Rerank(_) => ErrorKind::Upstream,
            QaError::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_not_initialized_from_both_layers() {
        assert_eq!(QaError::NotInitialized.kind(), ErrorKind::NotInitialized);
        assert_eq!(
            QaError::from(IndexError::NotInitialized).kind(),
            ErrorKind::NotInitialized
        );
    }

    #[test]
    fn classifies_document_failures() {
        assert_eq!(
            QaError::from(LoadError::NotFound("missing.pdf".into())).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            QaError::from(LoadError::Format("not a pdf".into())).kind(),
            ErrorKind::Format
        );
    }

    #[test]
    fn classifies_provider_failures_as_upstream() {
        let chat = QaError::from(ChatClientError::GenerationFailed("500".into()));
        assert_eq!(chat.kind(), ErrorKind::Upstream);
        let embed = QaError::from(IndexError::Embedding(
            EmbeddingClientError::ProviderUnavailable("down".into()),
        ));
        assert_eq!(embed.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn timeout_message_names_question() {
        let error = QaError::Timeout {
            question: "why?".into(),
            limit: Duration::from_secs(2),
        };
        assert_eq!(error.kind(), ErrorKind::Timeout);
        assert!(error.to_string().contains("why?"));
    }
}
