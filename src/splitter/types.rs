//! Chunk type, splitter configuration, and splitter errors.

use anyhow::Error as TokenizerError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Free-form metadata attached to a chunk (`source`, `page`, `chunk_index`, `chunk_hash`).
pub type ChunkMetadata = Map<String, Value>;

/// A bounded span of document text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text as handed to the embedding and chat models.
    pub text: String,
    /// Provenance of the chunk.
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Build a chunk with empty metadata.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: ChunkMetadata::new(),
        }
    }

    /// Attach a metadata entry, returning the updated chunk.
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// One-based page number recorded by the splitter, if any.
    pub fn page(&self) -> Option<u64> {
        self.metadata.get("page").and_then(Value::as_u64)
    }
}

/// How chunk length is measured.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SplitUnit {
    /// Unicode scalar values.
    #[default]
    Characters,
    /// BPE tokens of the named encoding (`cl100k_base`, ...) or model.
    Tokens {
        /// Encoding or model name resolved through `tiktoken-rs`.
        encoding: String,
    },
}

/// Splitter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitterConfig {
    /// Maximum chunk length in [`SplitterConfig::unit`].
    pub chunk_size: usize,
    /// Length shared by consecutive chunks of one page.
    pub chunk_overlap: usize,
    /// Unit for both size and overlap.
    pub unit: SplitUnit,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 20,
            unit: SplitUnit::Characters,
        }
    }
}

/// Errors produced while configuring the splitter.
#[derive(Debug, Error)]
pub enum SplitError {
    /// The configured chunk size is zero.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// The overlap leaves no room for new content in each chunk.
    #[error("chunk overlap {overlap} leaves no room for content within chunk size {chunk_size}")]
    InvalidOverlap {
        /// Requested overlap.
        overlap: usize,
        /// Requested chunk size.
        chunk_size: usize,
    },
    /// Tokenizer resources were unavailable for the configured encoding.
    #[error("failed to initialize tokenizer '{encoding}': {source}")]
    Tokenizer {
        /// Encoding or model we attempted to load.
        encoding: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}
