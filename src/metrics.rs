use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and answering activity.
#[derive(Default)]
pub struct QaMetrics {
    documents_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
    failed_questions: AtomicU64,
}

impl QaMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an indexed document and the number of chunks produced for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a question that produced an answer.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a question whose pipeline run failed.
    pub fn record_failure(&self) {
        self.failed_questions.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            failed_questions: self.failed_questions.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents indexed since startup (re-initialization counts again).
    pub documents_indexed: u64,
    /// Total chunk count produced across all indexed documents.
    pub chunks_indexed: u64,
    /// Number of questions answered successfully.
    pub questions_answered: u64,
    /// Number of questions whose pipeline run failed.
    pub failed_questions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = QaMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_indexed, 2);
        assert_eq!(snapshot.chunks_indexed, 5);
    }

    #[test]
    fn records_answers_and_failures() {
        let metrics = QaMetrics::new();
        metrics.record_answer();
        metrics.record_answer();
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.questions_answered, 2);
        assert_eq!(snapshot.failed_questions, 1);
    }

    #[test]
    fn snapshot_is_consistent() {
        let metrics = QaMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
