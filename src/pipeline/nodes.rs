//! Node bodies of the query graph.

use super::state::PipelineState;
use crate::{error::QaError, index::Retriever, llm::ChatClient, splitter::Chunk};
use async_trait::async_trait;

/// Instruction sent as the system message of every generate call.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based on the provided context. If the context does not contain the answer to the question, or if the context is not relevant to the question, simply respond with: 'I am sorry, but the provided context does not contain the answer to the question.'";

/// Reorders retrieved chunks before generation.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Return `documents` in the order they should appear in the prompt.
    async fn rerank(&self, query: &str, documents: Vec<Chunk>) -> Result<Vec<Chunk>, QaError>;
}

/// Reranker that keeps retrieval order.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughReranker;

#[async_trait]
impl Reranker for PassthroughReranker {
    async fn rerank(&self, _query: &str, documents: Vec<Chunk>) -> Result<Vec<Chunk>, QaError> {
        Ok(documents)
    }
}

/// Compose the system message: instruction followed by the context block.
pub fn build_system_prompt(documents: &[Chunk]) -> String {
    let context = documents
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    format!("{SYSTEM_PROMPT}\n\nContext:\n{context}")
}

pub(crate) async fn retrieve(
    state: &mut PipelineState,
    retriever: &Retriever,
) -> Result<(), QaError> {
    state.documents = retriever.retrieve(&state.query).await?;
    Ok(())
}

pub(crate) async fn rerank(
    state: &mut PipelineState,
    reranker: &dyn Reranker,
) -> Result<(), QaError> {
    let documents = std::mem::take(&mut state.documents);
    state.documents = reranker.rerank(&state.query, documents).await?;
    Ok(())
}

pub(crate) async fn generate(
    state: &mut PipelineState,
    chat: &dyn ChatClient,
) -> Result<(), QaError> {
    let system_prompt = build_system_prompt(&state.documents);
    let answer = chat.complete(&system_prompt, &state.query).await?;
    state.answer = Some(answer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_joins_context_in_order() {
        let prompt = build_system_prompt(&[Chunk::new("first"), Chunk::new("second")]);
        assert!(prompt.starts_with(SYSTEM_PROMPT));
        assert!(prompt.ends_with("\n\nContext:\nfirst\nsecond"));
    }

    #[test]
    fn prompt_with_no_context_keeps_header() {
        let prompt = build_system_prompt(&[]);
        assert_eq!(prompt, format!("{SYSTEM_PROMPT}\n\nContext:\n"));
    }

    #[tokio::test]
    async fn passthrough_reranker_is_identity() {
        let documents = vec![Chunk::new("b"), Chunk::new("a"), Chunk::new("c")];
        let reranked = PassthroughReranker
            .rerank("query", documents.clone())
            .await
            .expect("rerank");
        assert_eq!(reranked, documents);
    }
}
