use super::{
    nodes::{self, Reranker},
    state::PipelineState,
};
use crate::{error::QaError, index::Retriever, llm::ChatClient};
use std::sync::Arc;

/// Nodes of the query graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineNode {
    /// Fetch the top-k chunks for the query.
    Retrieve,
    /// Reorder retrieved chunks.
    Rerank,
    /// Ask the chat model for an answer.
    Generate,
    /// Terminal node.
    End,
}

impl PipelineNode {
    /// Node name used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            PipelineNode::Retrieve => "retrieve",
            PipelineNode::Rerank => "rerank",
            PipelineNode::Generate => "generate",
            PipelineNode::End => "end",
        }
    }

    /// Successor of `self`. The topology is linear; `Rerank` is skipped when disabled.
    pub const fn next(self, rerank_enabled: bool) -> PipelineNode {
        match self {
            PipelineNode::Retrieve if rerank_enabled => PipelineNode::Rerank,
            PipelineNode::Retrieve | PipelineNode::Rerank => PipelineNode::Generate,
            PipelineNode::Generate | PipelineNode::End => PipelineNode::End,
        }
    }
}

/// Compiled query graph bound to a retriever and a chat client.
///
/// Holds only shared, read-only handles, so one pipeline serves any number of concurrent runs.
pub struct QaPipeline {
    retriever: Retriever,
    chat: Arc<dyn ChatClient>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl QaPipeline {
    /// Build a `Retrieve → Generate` pipeline.
    pub fn new(retriever: Retriever, chat: Arc<dyn ChatClient>) -> Self {
        Self {
            retriever,
            chat,
            reranker: None,
        }
    }

    /// Insert a rerank node between retrieve and generate.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Nodes visited by every run, in order, excluding `End`.
    pub fn path(&self) -> Vec<PipelineNode> {
        let mut path = Vec::new();
        let mut node = PipelineNode::Retrieve;
        while node != PipelineNode::End {
            path.push(node);
            node = node.next(self.reranker.is_some());
        }
        path
    }

    /// Walk the graph once for `query` and return the final state.
    pub async fn run(&self, query: &str) -> Result<PipelineState, QaError> {
        let mut state = PipelineState::new(query);
        let mut node = PipelineNode::Retrieve;

        while node != PipelineNode::End {
            tracing::debug!(node = node.name(), query = %state.query, "Entering pipeline node");
            match node {
                PipelineNode::Retrieve => nodes::retrieve(&mut state, &self.retriever).await?,
                PipelineNode::Rerank => {
                    if let Some(reranker) = &self.reranker {
                        nodes::rerank(&mut state, reranker.as_ref()).await?;
                    }
                }
                PipelineNode::Generate => nodes::generate(&mut state, self.chat.as_ref()).await?,
                PipelineNode::End => {}
            }
            tracing::debug!(
                node = node.name(),
                documents = state.documents.len(),
                answered = state.answer.is_some(),
                "Leaving pipeline node"
            );
            node = node.next(self.reranker.is_some());
        }

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        embedding::HashEmbeddingClient,
        index::{InMemoryVectorStore, VectorIndex},
        llm::ChatClientError,
        pipeline::{PassthroughReranker, SYSTEM_PROMPT},
        splitter::Chunk,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChat {
        prompts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatClient for RecordingChat {
        async fn complete(
            &self,
            system_prompt: &str,
            user_prompt: &str,
        ) -> Result<String, ChatClientError> {
            self.prompts
                .lock()
                .expect("prompts lock")
                .push((system_prompt.to_string(), user_prompt.to_string()));
            Ok(format!("answer to {user_prompt}"))
        }

        fn model(&self) -> &str {
            "recording"
        }
    }

    async fn retriever(texts: &[&str], k: usize) -> Retriever {
        let index = VectorIndex::new(
            Arc::new(HashEmbeddingClient::new(128)),
            Arc::new(InMemoryVectorStore::new()),
        );
        index
            .build(texts.iter().map(|text| Chunk::new(*text)).collect())
            .await
            .expect("build");
        index.retriever(k).expect("retriever")
    }

    #[test]
    fn topology_is_linear() {
        assert_eq!(PipelineNode::Retrieve.next(false), PipelineNode::Generate);
        assert_eq!(PipelineNode::Retrieve.next(true), PipelineNode::Rerank);
        assert_eq!(PipelineNode::Rerank.next(true), PipelineNode::Generate);
        assert_eq!(PipelineNode::Generate.next(true), PipelineNode::End);
        assert_eq!(PipelineNode::End.next(false), PipelineNode::End);
    }

    #[tokio::test]
    async fn run_retrieves_then_generates() {
        let chat = Arc::new(RecordingChat::default());
        let pipeline = QaPipeline::new(retriever(&["alpha beta", "gamma"], 3).await, chat.clone());

        let state = pipeline.run("alpha?").await.expect("run");

        assert_eq!(state.query, "alpha?");
        assert_eq!(state.documents.len(), 2);
        assert_eq!(state.answer.as_deref(), Some("answer to alpha?"));

        let prompts = chat.prompts.lock().expect("prompts lock");
        assert_eq!(prompts.len(), 1);
        let (system, user) = &prompts[0];
        assert!(system.starts_with(SYSTEM_PROMPT));
        assert!(system.contains("\n\nContext:\nalpha beta\n"));
        assert_eq!(user, "alpha?");
    }

    #[tokio::test]
    async fn empty_context_still_generates() {
        let chat = Arc::new(RecordingChat::default());
        let pipeline = QaPipeline::new(retriever(&[], 3).await, chat.clone());

        let state = pipeline.run("anything").await.expect("run");

        assert!(state.documents.is_empty());
        assert!(state.answer.is_some());
        let prompts = chat.prompts.lock().expect("prompts lock");
        assert!(prompts[0].0.ends_with("Context:\n"));
    }

    #[tokio::test]
    async fn passthrough_rerank_keeps_retrieval_order() {
        let texts = ["red apples", "red cars", "blue sky"];
        let plain = QaPipeline::new(
            retriever(&texts, 3).await,
            Arc::new(RecordingChat::default()),
        );
        let reranked = QaPipeline::new(
            retriever(&texts, 3).await,
            Arc::new(RecordingChat::default()),
        )
        .with_reranker(Arc::new(PassthroughReranker));

        assert_eq!(
            reranked.path(),
            vec![
                PipelineNode::Retrieve,
                PipelineNode::Rerank,
                PipelineNode::Generate
            ]
        );
        let a = plain.run("red").await.expect("run");
        let b = reranked.run("red").await.expect("run");
        assert_eq!(a.documents, b.documents);
        assert_eq!(a.answer, b.answer);
    }
}
