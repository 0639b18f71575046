//! Vector index: embeds chunks, stores them, and serves nearest-neighbour retrieval.

mod memory;
mod qdrant;
pub mod types;
mod vector_index;

pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantVectorStore;
pub use types::{IndexError, ScoredChunk, StoreError, StoredPoint, VectorStore};
pub use vector_index::{Retriever, VectorIndex};

use crate::config::{Config, VectorStoreKind};
use reqwest::Client;
use std::sync::Arc;

/// Build the similarity store selected by configuration.
pub fn get_vector_store(
    config: &Config,
    http: &Client,
) -> Result<Arc<dyn VectorStore>, StoreError> {
    match config.vector_store {
        VectorStoreKind::Memory => Ok(Arc::new(InMemoryVectorStore::new())),
        VectorStoreKind::Qdrant => Ok(Arc::new(QdrantVectorStore::new(
            http.clone(),
            &config.qdrant_url,
            config.qdrant_api_key.clone(),
            config.qdrant_collection_name.clone(),
        )?)),
    }
}
