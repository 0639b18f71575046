//! Shared types for the vector index and its similarity stores.

use crate::{embedding::EmbeddingClientError, splitter::Chunk};
use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by a similarity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Remote store responded with an unexpected status code.
    #[error("Unexpected store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the store.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// A vector did not match the dimension the store was reset with.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured by the last reset.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// A stored payload could not be turned back into a chunk.
    #[error("Invalid stored payload: {0}")]
    InvalidPayload(String),
}

/// Errors raised by [`crate::index::VectorIndex`] and its retrievers.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Retrieval was requested before a successful `build`.
    #[error("vector index has not been built")]
    NotInitialized,
    /// `k` must be at least one.
    #[error("retriever top-k must be greater than zero")]
    InvalidTopK,
    /// Embedding provider failed.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Similarity store failed.
    #[error("Vector store request failed: {0}")]
    Store(#[from] StoreError),
    /// Embedding provider returned vectors of an unexpected size.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension advertised by the embedding client.
        expected: usize,
        /// Dimension actually returned.
        actual: usize,
    },
}

/// A chunk paired with its embedding, ready for storage.
#[derive(Debug, Clone)]
pub struct StoredPoint {
    /// Embedding of [`StoredPoint::chunk`].
    pub vector: Vec<f32>,
    /// The chunk payload.
    pub chunk: Chunk,
}

/// A search hit.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Matched chunk.
    pub chunk: Chunk,
    /// Similarity score, higher is closer.
    pub score: f32,
}

/// Nearest-neighbour storage for embedded chunks.
///
/// `search` returns hits best-first, at most `k` of them, and the same ordering for the same
/// query against unchanged contents.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Drop all stored points and prepare for vectors of `dimension` slots.
    async fn reset(&self, dimension: usize) -> Result<(), StoreError>;

    /// Store the supplied points, returning how many were written.
    async fn upsert(&self, points: Vec<StoredPoint>) -> Result<usize, StoreError>;

    /// Return up to `k` chunks closest to `vector`.
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, StoreError>;

    /// Number of stored points.
    async fn len(&self) -> Result<usize, StoreError>;

    /// Whether the store holds no points.
    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}
