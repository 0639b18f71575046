//! Query and ingestion graphs.
//!
//! The query graph is `Retrieve → [Rerank] → Generate → End`; the ingestion graph is
//! `LoadDocuments → SummarizeDocuments → CreateVectorDb → Ready`. Both are walked exactly once
//! per invocation with no loops or retries.

mod graph;
mod ingest;
mod nodes;
mod state;

pub use graph::{PipelineNode, QaPipeline};
pub use ingest::{CorpusSummary, IngestStage, ingest};
pub use nodes::{PassthroughReranker, Reranker, SYSTEM_PROMPT, build_system_prompt};
pub use state::PipelineState;
