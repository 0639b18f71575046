use crate::splitter::Chunk;

/// Record threaded through the query graph, created fresh for every question.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineState {
    /// The question being answered. Never modified after construction.
    pub query: String,
    /// Context chunks in retrieval (or rerank) order.
    pub documents: Vec<Chunk>,
    /// Model response, set only by the generate node.
    pub answer: Option<String>,
}

impl PipelineState {
    /// Start a run for `query`.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            documents: Vec::new(),
            answer: None,
        }
    }
}
