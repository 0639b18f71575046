use super::types::{IndexError, ScoredChunk, StoredPoint, VectorStore};
use crate::{
    embedding::{EmbeddingClient, EmbeddingClientError},
    splitter::Chunk,
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

const EMBEDDING_BATCH_SIZE: usize = 64;

/// Embedding-backed index over the chunks of one corpus.
///
/// The index is unusable until [`VectorIndex::build`] succeeds. Rebuilding replaces the
/// previous contents entirely.
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    built: AtomicBool,
    batch_size: usize,
}

impl VectorIndex {
    /// Create an unbuilt index writing to `store`.
    pub fn new(embedder: Arc<dyn EmbeddingClient>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            built: AtomicBool::new(false),
            batch_size: EMBEDDING_BATCH_SIZE,
        }
    }

    /// Override how many chunks are embedded per provider call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Whether a build has completed successfully.
    pub fn is_built(&self) -> bool {
        self.built.load(Ordering::Acquire)
    }

    /// Embed every chunk and store it, replacing any previous contents.
    ///
    /// Returns the number of stored chunks. An empty chunk list yields a built, empty index.
    pub async fn build(&self, chunks: Vec<Chunk>) -> Result<usize, IndexError> {
        self.built.store(false, Ordering::Release);
        let dimension = self.embedder.dimension();
        self.store.reset(dimension).await?;

        let mut points = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.embedder.generate_embeddings(texts).await?;
            if vectors.len() != batch.len() {
                return Err(IndexError::Embedding(EmbeddingClientError::InvalidResponse(
                    format!("expected {} vectors, received {}", batch.len(), vectors.len()),
                )));
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                ensure_dimension(dimension, &vector)?;
                points.push(StoredPoint {
                    vector,
                    chunk: chunk.clone(),
                });
            }
        }

        let stored = self.store.upsert(points).await?;
        self.built.store(true, Ordering::Release);
        tracing::info!(
            store = self.store.name(),
            chunks = stored,
            dimension,
            "Vector index built"
        );
        Ok(stored)
    }

    /// Obtain a retriever returning the `k` nearest chunks per query.
    pub fn retriever(&self, k: usize) -> Result<Retriever, IndexError> {
        if !self.is_built() {
            return Err(IndexError::NotInitialized);
        }
        if k == 0 {
            return Err(IndexError::InvalidTopK);
        }
        Ok(Retriever {
            embedder: Arc::clone(&self.embedder),
            store: Arc::clone(&self.store),
            k,
            score_threshold: None,
        })
    }
}

/// Read-only nearest-neighbour lookup bound to a built index.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    k: usize,
    score_threshold: Option<f32>,
}

impl Retriever {
    /// Drop hits whose similarity falls below `threshold`.
    pub fn with_score_threshold(mut self, threshold: Option<f32>) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Number of chunks returned per query.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Minimum similarity a hit must reach, if any.
    pub fn score_threshold(&self) -> Option<f32> {
        self.score_threshold
    }

    /// Return up to `k` chunks most similar to `query`, best first.
    ///
    /// With a score threshold set, fewer than `k` chunks (possibly none) may come back.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>, IndexError> {
        Ok(self
            .retrieve_scored(query)
            .await?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect())
    }

    /// Like [`Retriever::retrieve`] but keeps similarity scores.
    pub async fn retrieve_scored(&self, query: &str) -> Result<Vec<ScoredChunk>, IndexError> {
        let vector = self.embedder.embed(query).await?;
        ensure_dimension(self.embedder.dimension(), &vector)?;
        let mut hits = self.store.search(&vector, self.k).await?;
        hits.truncate(self.k);
        if let Some(threshold) = self.score_threshold {
            let found = hits.len();
            hits.retain(|hit| hit.score >= threshold);
            if hits.len() < found {
                tracing::debug!(
                    threshold,
                    dropped = found - hits.len(),
                    "Dropped hits below score threshold"
                );
            }
        }
        Ok(hits)
    }
}

fn ensure_dimension(expected: usize, vector: &[f32]) -> Result<(), IndexError> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(IndexError::DimensionMismatch {
            expected,
            actual: vector.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{embedding::HashEmbeddingClient, index::InMemoryVectorStore};
    use async_trait::async_trait;

    fn index() -> VectorIndex {
        VectorIndex::new(
            Arc::new(HashEmbeddingClient::new(256)),
            Arc::new(InMemoryVectorStore::new()),
        )
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts.iter().map(|text| Chunk::new(*text)).collect()
    }

    #[tokio::test]
    async fn retriever_before_build_is_not_initialized() {
        let index = index();
        assert!(matches!(
            index.retriever(3),
            Err(IndexError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn build_then_retrieve_ranks_relevant_chunk_first() {
        let index = index().with_batch_size(2);
        let stored = index
            .build(chunks(&[
                "the warranty lasts two years",
                "shipping takes five business days",
                "returns are accepted within thirty days",
            ]))
            .await
            .expect("build");
        assert_eq!(stored, 3);

        let retriever = index.retriever(2).expect("retriever");
        let hits = retriever
            .retrieve("how many business days until shipping takes place")
            .await
            .expect("retrieve");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "shipping takes five business days");
    }

    #[tokio::test]
    async fn retrieve_returns_fewer_than_k_when_corpus_is_small() {
        let index = index();
        index.build(chunks(&["only chunk"])).await.expect("build");
        let hits = index
            .retriever(5)
            .expect("retriever")
            .retrieve("anything")
            .await
            .expect("retrieve");
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn empty_corpus_builds_and_returns_no_context() {
        let index = index();
        assert_eq!(index.build(Vec::new()).await.expect("build"), 0);
        let hits = index
            .retriever(3)
            .expect("retriever")
            .retrieve("question")
            .await
            .expect("retrieve");
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn score_threshold_drops_weak_hits_and_keeps_order() {
        let index = index();
        index
            .build(chunks(&[
                "shipping takes five business days",
                "shipping takes five business days by courier",
                "the cafeteria serves soup on mondays",
            ]))
            .await
            .expect("build");

        let query = "shipping takes five business days";
        let unfiltered = index
            .retriever(3)
            .expect("retriever")
            .retrieve_scored(query)
            .await
            .expect("retrieve");
        assert_eq!(unfiltered.len(), 3);
        assert!(unfiltered[2].score < 0.5, "unrelated chunk scored {}", unfiltered[2].score);

        let retriever = index
            .retriever(3)
            .expect("retriever")
            .with_score_threshold(Some(0.5));
        assert_eq!(retriever.score_threshold(), Some(0.5));
        let hits = retriever.retrieve_scored(query).await.expect("retrieve");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "shipping takes five business days");
        assert_eq!(hits[1].chunk.text, "shipping takes five business days by courier");
        assert!(hits[0].score >= hits[1].score);
        assert!(hits.iter().all(|hit| hit.score >= 0.5));

        let none = index
            .retriever(3)
            .expect("retriever")
            .with_score_threshold(Some(1.0))
            .retrieve("completely different words here")
            .await
            .expect("retrieve");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn zero_top_k_is_rejected() {
        let index = index();
        index.build(chunks(&["text"])).await.expect("build");
        assert!(matches!(index.retriever(0), Err(IndexError::InvalidTopK)));
    }

    struct ShortVectors;

    #[async_trait]
    impl EmbeddingClient for ShortVectors {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    #[tokio::test]
    async fn failed_build_leaves_index_unbuilt() {
        let index = VectorIndex::new(
            Arc::new(ShortVectors),
            Arc::new(InMemoryVectorStore::new()),
        );
        let error = index.build(chunks(&["text"])).await.unwrap_err();
        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 4,
                actual: 1
            }
        ));
        assert!(!index.is_built());
        assert!(matches!(
            index.retriever(1),
            Err(IndexError::NotInitialized)
        ));
    }
}
