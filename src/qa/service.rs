//! QA facade: owns the ingestion components and answers questions against the built pipeline.

use crate::{
    config::Config,
    document::{DocumentLoader, LopdfExtractor, loader_for_source},
    embedding::get_embedding_client,
    error::QaError,
    index::{VectorIndex, get_vector_store},
    llm::{ChatClient, get_chat_client},
    metrics::{MetricsSnapshot, QaMetrics},
    pipeline::{CorpusSummary, PassthroughReranker, QaPipeline, Reranker, ingest},
    qa::types::{QaOutput, QaResult, QueryInput},
    splitter::TextSplitter,
};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use reqwest::Client;
use std::{sync::Arc, time::Duration};
use tokio::sync::{RwLock, RwLockReadGuard};

/// Components a [`QaSystem`] drives.
pub struct QaComponents {
    /// Source of the document pages.
    pub loader: Box<dyn DocumentLoader>,
    /// Splitter turning pages into chunks.
    pub splitter: TextSplitter,
    /// Index the chunks are stored in.
    pub index: VectorIndex,
    /// Chat model used by the generate node.
    pub chat: Arc<dyn ChatClient>,
    /// Optional rerank node.
    pub reranker: Option<Arc<dyn Reranker>>,
}

/// Tunables for answering.
#[derive(Debug, Clone, PartialEq)]
pub struct QaSettings {
    /// Chunks retrieved per question.
    pub top_k: usize,
    /// Minimum similarity a retrieved chunk must reach.
    pub score_threshold: Option<f32>,
    /// Questions of one batch in flight at once.
    pub max_concurrency: usize,
    /// Per-question deadline.
    pub query_timeout: Option<Duration>,
}

impl Default for QaSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            score_threshold: None,
            max_concurrency: 8,
            query_timeout: None,
        }
    }
}

impl QaSettings {
    /// Settings taken from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retriever_top_k,
            score_threshold: config.retriever_score_threshold,
            max_concurrency: config.max_concurrency,
            query_timeout: config.query_timeout,
        }
    }
}

struct Ready {
    pipeline: QaPipeline,
    summary: CorpusSummary,
}

/// Question answering over a single document.
///
/// Call [`QaSystem::initialize`] once before answering; calling it again rebuilds everything
/// from the source. Answering is safe from many tasks at once.
pub struct QaSystem {
    components: QaComponents,
    settings: QaSettings,
    config: Option<Config>,
    ready: RwLock<Option<Ready>>,
    metrics: Arc<QaMetrics>,
}

/// Abstraction over the QA facade used by the HTTP surface.
#[async_trait]
pub trait QaApi: Send + Sync {
    /// Answer against the preloaded document.
    async fn answer(&self, input: QueryInput) -> Result<QaOutput, QaError>;

    /// Ingest `source` into a throwaway system and answer against it.
    async fn answer_from_source(
        &self,
        source: &str,
        input: QueryInput,
    ) -> Result<QaOutput, QaError>;

    /// Current counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl QaSystem {
    /// Assemble a system from explicit components.
    pub fn new(components: QaComponents, settings: QaSettings) -> Self {
        Self {
            components,
            settings,
            config: None,
            ready: RwLock::new(None),
            metrics: Arc::new(QaMetrics::new()),
        }
    }

    /// Build the providers selected by `config` for the document at `source`.
    pub fn from_config(config: &Config, source: &str) -> Result<Self, QaError> {
        let http = Client::builder().user_agent("docqa/0.1").build()?;
        let splitter = TextSplitter::new(config.splitter_config())?;
        let embedder = get_embedding_client(config, &http);
        let store = get_vector_store(config, &http)?;
        let chat = get_chat_client(config, &http);
        let reranker: Option<Arc<dyn Reranker>> = if config.enable_rerank {
            Some(Arc::new(PassthroughReranker))
        } else {
            None
        };
        tracing::info!(
            source,
            llm_provider = ?config.llm_provider,
            chat_model = %chat.model(),
            embedding_provider = ?config.embedding_provider,
            vector_store = store.name(),
            rerank = reranker.is_some(),
            "Configured QA system"
        );

        let components = QaComponents {
            loader: loader_for_source(source, http, Arc::new(LopdfExtractor::new())),
            splitter,
            index: VectorIndex::new(embedder, store),
            chat,
            reranker,
        };
        let mut system = Self::new(components, QaSettings::from_config(config));
        system.config = Some(config.clone());
        Ok(system)
    }

    /// Share `metrics` with another system instead of keeping private counters.
    pub fn with_metrics(mut self, metrics: Arc<QaMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Path or URL of the document this system answers about.
    pub fn source(&self) -> &str {
        self.components.loader.source()
    }

    /// Active settings.
    pub fn settings(&self) -> &QaSettings {
        &self.settings
    }

    /// Load, split and index the document, then install a fresh query pipeline.
    ///
    /// The rebuild starts once questions already in flight have finished; questions arriving
    /// while it runs fail with [`QaError::NotInitialized`].
    pub async fn initialize(&self) -> Result<CorpusSummary, QaError> {
        let mut ready = self.ready.write().await;
        ready.take();

        let components = &self.components;
        let summary = ingest(
            components.loader.as_ref(),
            &components.splitter,
            &components.index,
        )
        .await?;

        let retriever = components
            .index
            .retriever(self.settings.top_k)?
            .with_score_threshold(self.settings.score_threshold);
        let mut pipeline = QaPipeline::new(retriever, Arc::clone(&components.chat));
        if let Some(reranker) = &components.reranker {
            pipeline = pipeline.with_reranker(Arc::clone(reranker));
        }

        self.metrics.record_document(summary.chunks as u64);
        *ready = Some(Ready {
            pipeline,
            summary: summary.clone(),
        });
        Ok(summary)
    }

    /// Whether `initialize` has completed and no rebuild is running.
    pub async fn is_initialized(&self) -> bool {
        self.ready.try_read().is_ok_and(|ready| ready.is_some())
    }

    /// Corpus summary from the last successful `initialize`.
    pub async fn summary(&self) -> Option<CorpusSummary> {
        self.ready
            .read()
            .await
            .as_ref()
            .map(|ready| ready.summary.clone())
    }

    /// Answer one question or a batch.
    ///
    /// Batch results follow input order. The first failing question, in input order, fails the
    /// whole batch and cancels questions still in flight.
    pub async fn answer(&self, input: QueryInput) -> Result<QaOutput, QaError> {
        let pipeline = self.pipeline()?;
        match input {
            QueryInput::Single(question) => Ok(QaOutput::Single(
                self.run_question(&pipeline, question).await?,
            )),
            QueryInput::Batch(questions) => {
                tracing::debug!(
                    questions = questions.len(),
                    max_concurrency = self.settings.max_concurrency,
                    "Answering batch"
                );
                let results: Vec<QaResult> = stream::iter(questions)
                    .map(|question| self.run_question(&pipeline, question))
                    .buffered(self.settings.max_concurrency.max(1))
                    .try_collect()
                    .await?;
                Ok(QaOutput::Batch(results))
            }
        }
    }

    /// Answer a single question.
    pub async fn answer_one(&self, question: impl Into<String>) -> Result<QaResult, QaError> {
        let pipeline = self.pipeline()?;
        self.run_question(&pipeline, question.into()).await
    }

    /// Current counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Borrow the installed pipeline for the duration of a question.
    ///
    /// The guard keeps a rebuild from resetting the index under a running question.
    fn pipeline(&self) -> Result<RwLockReadGuard<'_, QaPipeline>, QaError> {
        let ready = self.ready.try_read().map_err(|_| QaError::NotInitialized)?;
        RwLockReadGuard::try_map(ready, |ready| ready.as_ref().map(|ready| &ready.pipeline))
            .map_err(|_| QaError::NotInitialized)
    }

    async fn run_question(
        &self,
        pipeline: &QaPipeline,
        question: String,
    ) -> Result<QaResult, QaError> {
        let run = pipeline.run(&question);
        let outcome = match self.settings.query_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => Err(QaError::Timeout {
                    question: question.clone(),
                    limit,
                }),
            },
            None => run.await,
        };

        match outcome {
            Ok(state) => {
                self.metrics.record_answer();
                Ok(QaResult {
                    question,
                    answer: state.answer.unwrap_or_default(),
                })
            }
            Err(error) => {
                self.metrics.record_failure();
                tracing::warn!(question = %question, error = %error, "Question failed");
                Err(error)
            }
        }
    }
}

#[async_trait]
impl QaApi for QaSystem {
    async fn answer(&self, input: QueryInput) -> Result<QaOutput, QaError> {
        QaSystem::answer(self, input).await
    }

    async fn answer_from_source(
        &self,
        source: &str,
        input: QueryInput,
    ) -> Result<QaOutput, QaError> {
        let config = self.config.as_ref().ok_or_else(|| {
            QaError::InvalidInput("answering from a URL requires a configured system".into())
        })?;
        let system = QaSystem::from_config(config, source)?.with_metrics(Arc::clone(&self.metrics));
        system.initialize().await?;
        system.answer(input).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        QaSystem::metrics_snapshot(self)
    }
}
