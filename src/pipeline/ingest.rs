//! Ingestion graph: load, split and index one document.

use crate::{
    document::{DocumentLoader, Page},
    error::QaError,
    index::VectorIndex,
    splitter::{Chunk, TextSplitter},
};
use serde::Serialize;

/// Stages of the ingestion graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    /// Extract pages from the source.
    LoadDocuments,
    /// Split pages into chunks and summarize the corpus.
    SummarizeDocuments,
    /// Embed and store chunks.
    CreateVectorDb,
    /// Terminal stage.
    Ready,
}

impl IngestStage {
    /// Stage name used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            IngestStage::LoadDocuments => "load_documents",
            IngestStage::SummarizeDocuments => "summarize_documents",
            IngestStage::CreateVectorDb => "create_vector_db",
            IngestStage::Ready => "ready",
        }
    }

    /// Successor stage.
    pub const fn next(self) -> IngestStage {
        match self {
            IngestStage::LoadDocuments => IngestStage::SummarizeDocuments,
            IngestStage::SummarizeDocuments => IngestStage::CreateVectorDb,
            IngestStage::CreateVectorDb | IngestStage::Ready => IngestStage::Ready,
        }
    }
}

/// Shape of the indexed corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorpusSummary {
    /// Path or URL the document came from.
    pub source: String,
    /// Number of extracted pages, including blank ones.
    pub pages: usize,
    /// Number of indexed chunks.
    pub chunks: usize,
    /// Characters of extracted text across all pages.
    pub characters: usize,
}

/// Run the ingestion graph to completion, leaving `index` built.
pub async fn ingest(
    loader: &dyn DocumentLoader,
    splitter: &TextSplitter,
    index: &VectorIndex,
) -> Result<CorpusSummary, QaError> {
    let mut stage = IngestStage::LoadDocuments;
    let mut pages: Vec<Page> = Vec::new();
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut summary = CorpusSummary {
        source: loader.source().to_string(),
        ..CorpusSummary::default()
    };

    while stage != IngestStage::Ready {
        tracing::debug!(stage = stage.name(), source = %summary.source, "Entering ingest stage");
        match stage {
            IngestStage::LoadDocuments => {
                pages = loader.load().await?;
                summary.pages = pages.len();
                summary.characters = pages.iter().map(|page| page.text.chars().count()).sum();
            }
            IngestStage::SummarizeDocuments => {
                chunks = splitter.split(&summary.source, &pages);
                summary.chunks = chunks.len();
            }
            IngestStage::CreateVectorDb => {
                index.build(std::mem::take(&mut chunks)).await?;
            }
            IngestStage::Ready => {}
        }
        stage = stage.next();
    }

    tracing::info!(
        source = %summary.source,
        pages = summary.pages,
        chunks = summary.chunks,
        characters = summary.characters,
        "Document ingested"
    );
    Ok(summary)
}
