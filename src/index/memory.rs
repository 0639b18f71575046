//! Process-local similarity store.

use super::types::{ScoredChunk, StoreError, StoredPoint, VectorStore};
use async_trait::async_trait;
use std::sync::RwLock;

#[derive(Default)]
struct Contents {
    dimension: Option<usize>,
    points: Vec<StoredPoint>,
}

/// Brute-force cosine-similarity store held in memory.
///
/// Ties are broken by insertion order, so rankings are fully deterministic.
#[derive(Default)]
pub struct InMemoryVectorStore {
    contents: RwLock<Contents>,
}

impl InMemoryVectorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn reset(&self, dimension: usize) -> Result<(), StoreError> {
        let mut contents = self
            .contents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        contents.dimension = Some(dimension);
        contents.points.clear();
        Ok(())
    }

    async fn upsert(&self, points: Vec<StoredPoint>) -> Result<usize, StoreError> {
        let mut contents = self
            .contents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let expected = match contents.dimension {
            Some(dimension) => dimension,
            None => points.first().map(|point| point.vector.len()).unwrap_or(0),
        };
        if let Some(point) = points.iter().find(|point| point.vector.len() != expected) {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: point.vector.len(),
            });
        }
        contents.dimension = Some(expected);
        let written = points.len();
        contents.points.extend(points);
        Ok(written)
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        let contents = self
            .contents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if contents.points.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = contents.dimension
            && expected != vector.len()
        {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = contents
            .points
            .iter()
            .enumerate()
            .map(|(position, point)| (position, cosine_similarity(vector, &point.vector)))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(position, score)| ScoredChunk {
                chunk: contents.points[position].chunk.clone(),
                score,
            })
            .collect())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self
            .contents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .points
            .len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
